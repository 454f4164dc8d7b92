//! Class-file building blocks: constant pool, attributes, descriptors, and binary output
//!
//! Everything in this module maps one to one onto structures from the class-file format
//! specification. The policy of *how* a method body gets built out of these pieces lives in
//! [`crate::code`] and [`crate::lower`].

mod access_flags;
mod attributes;
mod bootstrap;
mod constant_pool;
mod descriptors;
mod emit;

pub use access_flags::*;
pub use attributes::*;
pub use bootstrap::*;
pub use constant_pool::*;
pub use descriptors::*;
pub use emit::*;

pub use crate::errors::Error;
