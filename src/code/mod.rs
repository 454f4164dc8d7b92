//! Method-body code generation: instructions, the emitting stream, and debug tables

mod debug;
mod instruction;
mod stream;

pub use debug::*;
pub use instruction::*;
pub use stream::*;
