use crate::code::Label;
use crate::jvm::Constant;
use crate::util::Offset;

/// Errors that can occur while emitting a method
///
/// Most of these are class-file format limits being exceeded. Since the input tree has already
/// been semantically checked, hitting one of these means the method is genuinely too large (or
/// there is a bug upstream), so emission stops at the first error.
#[derive(Debug)]
pub enum Error {
    IoError(std::io::Error),

    /// Constant pool has no space left for this constant
    ConstantPoolOverflow { constant: Constant, offset: usize },

    /// Code array for the method has exceeded its maximum length of 65535 bytes
    MethodCodeMaxLengthExceeded { code_length: usize },

    /// Operand stack for the method has exceeded its maximum depth of 65535
    MethodCodeMaxStackExceeded { depth: usize },

    /// Local variable slots for the method have exceeded their maximum count of 65535
    MethodCodeMaxLocalsExceeded { slot: usize },

    /// An instruction would pop more values than the operand stack holds
    OperandStackUnderflow { at: Offset, popped: u16, depth: u16 },

    /// Label was marked a second time
    DuplicateLabel { label: Label, first_marked_at: Offset },

    /// The stack depth recorded at a branch to this label disagrees with the depth at its mark
    LabelStackMismatch {
        label: Label,
        branch_depth: u16,
        mark_depth: u16,
    },

    /// Method was finished while some referenced labels were never marked
    UnmarkedLabels { labels: Vec<Label> },

    /// A 2-byte branch cannot reach its target
    ///
    /// Only `goto` has a wide form, so a conditional branch spanning more than an `i16` offset
    /// is fatal.
    BranchTargetTooFar { from: Offset, to: Offset },

    /// A `break` or `continue` appeared outside of any enclosing loop
    NoEnclosingLoop,

    /// A `continue` appeared inside a `finally` block lowered with `jsr` subroutines
    ///
    /// Jumping out of a subroutine would leave its return address dangling.
    JumpOutOfSubroutine,

    /// Too many entries for an exception table, bootstrap method table, or other `u16`-counted
    /// class-file table
    TableOverflow { table: &'static str, count: usize },
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}
