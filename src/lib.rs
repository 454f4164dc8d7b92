//! Emit JVM method bytecode from resolved statement and expression trees.
//!
//! The input is a [`tree::MethodSpec`]: a method body that already went through name
//! resolution and type checking, so locals carry slot numbers and member references carry
//! descriptors. [`lower::compile_method`] turns it into a [`code::MethodCode`]: the code
//! bytes, stack and locals bounds, exception table, and debug tables, interning constants
//! into a class-scoped [`jvm::ConstantPool`] (and [`jvm::BootstrapMethodsTable`] for
//! `invokedynamic` sites) along the way.
//!
//! ```
//! use tree2class::jvm::{BootstrapMethodsTable, ConstantPool, MethodAccessFlags, MethodDescriptor};
//! use tree2class::lower::compile_method;
//! use tree2class::tree::{Const, Expr, FinallyStrategy, MethodSpec, Statement, StatementKind};
//!
//! // static int six() { return 6; }
//! let spec = MethodSpec {
//!     access_flags: MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
//!     name: "six".to_owned(),
//!     descriptor: MethodDescriptor::new(vec![], Some(tree2class::jvm::FieldType::INT)),
//!     body: vec![Statement::new(StatementKind::Return(Some(Expr::Const(Const::Int(6)))))],
//!     finally_strategy: FinallyStrategy::Duplicate,
//! };
//!
//! let mut pool = ConstantPool::new();
//! let mut bootstrap = BootstrapMethodsTable::new();
//! let method = compile_method(&spec, &mut pool, &mut bootstrap).unwrap();
//!
//! assert_eq!(method.code, vec![0x10, 6, 0xac]); // bipush 6; ireturn
//! assert_eq!(method.max_stack, 1);
//! ```

pub mod code;
pub mod errors;
pub mod jvm;
pub mod lower;
pub mod tree;
pub mod util;

pub use errors::Error;
