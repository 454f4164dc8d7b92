//! Lowering from resolved trees to bytecode
//!
//! [`compile_method`] drives a [`CodeStream`] over a [`MethodSpec`]'s statements. Statement
//! and expression lowering are split across the submodules; boolean conditions go through the
//! translator in [`cond`], which folds decided conditions away instead of materializing them.

mod cond;
mod expr;
mod stmt;

use crate::code::{CodeStream, Instruction, Label, MethodCode};
use crate::errors::Error;
use crate::jvm::{BootstrapMethodsTable, ConstantPool};
use crate::tree::{Catch, FinallyStrategy, MethodSpec, Statement, StatementKind};
use crate::util::Offset;
use log::debug;

/// Emit the body of one method
///
/// The pool and bootstrap table are class scoped and shared across the methods of a class;
/// everything else about emission is local to this call.
pub fn compile_method(
    spec: &MethodSpec,
    pool: &mut ConstantPool,
    bootstrap: &mut BootstrapMethodsTable,
) -> Result<MethodCode, Error> {
    debug!("lowering {}{}", spec.name, spec.descriptor.render());

    let parameter_slots = spec.parameter_slots();
    let mut lowerer = Lowerer {
        pool,
        bootstrap,
        stream: CodeStream::new(parameter_slots),
        strategy: spec.finally_strategy,
        loops: vec![],
        finallies: vec![],
        next_temp: frame_slots(parameter_slots, &spec.body),
        subroutine_depth: 0,
    };
    lowerer.stream.reserve_locals(lowerer.next_temp);

    for statement in &spec.body {
        lowerer.lower_statement(statement)?;
    }
    // Void methods may fall off the end of the body
    if lowerer.stream.is_alive() && spec.descriptor.return_type.is_none() {
        lowerer.stream.emit(Instruction::Return)?;
    }
    lowerer.stream.finish()
}

/// Lowest slot free for emitter-internal temporaries
///
/// Resolution assigned slots to parameters, declarations, and catch variables; temporaries
/// (saved return values, in-flight exceptions, subroutine return addresses) stack above them.
fn frame_slots(parameter_slots: u16, body: &[Statement]) -> u16 {
    fn scan(statement: &Statement, top: &mut u16) {
        match &statement.kind {
            StatementKind::Declare { slot, ty, .. } => {
                *top = (*top).max(slot + ty.width());
            }
            StatementKind::Block(statements) => {
                for statement in statements {
                    scan(statement, top);
                }
            }
            StatementKind::If {
                then_branch,
                else_branch,
                ..
            } => {
                scan(then_branch, top);
                if let Some(else_branch) = else_branch {
                    scan(else_branch, top);
                }
            }
            StatementKind::While { body, .. } | StatementKind::DoWhile { body, .. } => {
                scan(body, top);
            }
            StatementKind::Try {
                body,
                catches,
                finally,
            } => {
                scan(body, top);
                for Catch { slot, body, .. } in catches {
                    *top = (*top).max(slot + 1);
                    scan(body, top);
                }
                if let Some(finally) = finally {
                    scan(finally, top);
                }
            }
            StatementKind::Expr(_)
            | StatementKind::Return(_)
            | StatementKind::Break
            | StatementKind::Continue
            | StatementKind::Throw(_) => {}
        }
    }

    let mut top = parameter_slots;
    for statement in body {
        scan(statement, &mut top);
    }
    top
}

/// Enclosing loop, for `break`/`continue`
struct LoopContext {
    continue_label: Label,
    break_label: Label,

    /// How many finally contexts were open when the loop started; jumps out of the loop run
    /// every finally opened since
    finally_depth: usize,
}

/// Enclosing `finally`, replayed on every edge that leaves its `try`
enum FinallyContext {
    /// Lower a fresh copy of the handler inline
    Duplicate {
        handler: Statement,

        /// Where each inline copy (and the rest of its exit edge) landed. The catch-all rows
        /// skip these ranges: an exception thrown by a copy must not re-enter the handler.
        copies: Vec<(Offset, Offset)>,
    },

    /// `jsr` to the shared subroutine
    Subroutine(Label),
}

struct Lowerer<'a> {
    pool: &'a mut ConstantPool,
    bootstrap: &'a mut BootstrapMethodsTable,
    stream: CodeStream,
    strategy: FinallyStrategy,
    loops: Vec<LoopContext>,
    finallies: Vec<FinallyContext>,
    next_temp: u16,

    /// Nonzero while lowering inside a `jsr` subroutine body
    subroutine_depth: usize,
}

impl Lowerer<'_> {
    fn alloc_temp(&mut self, width: u16) -> u16 {
        let slot = self.next_temp;
        self.next_temp += width;
        self.stream.reserve_locals(self.next_temp);
        slot
    }

    /// Temporaries release in LIFO order
    fn free_temp(&mut self, slot: u16) {
        self.next_temp = slot;
    }

    /// Run the pending finally handlers above `down_to`, innermost first
    ///
    /// Used on every edge that leaves the corresponding `try` statements: `return`, `break`,
    /// and `continue`.
    fn run_finallies(&mut self, down_to: usize) -> Result<(), Error> {
        if self.subroutine_depth > 0 && down_to < self.finallies.len() {
            return Err(Error::JumpOutOfSubroutine);
        }
        // The contexts are temporarily taken out so the replayed handler does not see itself
        let mut replay: Vec<FinallyContext> = self.finallies.split_off(down_to);
        let mut result = Ok(());
        for context in replay.iter_mut().rev() {
            result = match context {
                FinallyContext::Duplicate { handler, copies } => {
                    let start = self.stream.offset();
                    let lowered = self.lower_statement(handler);
                    copies.push((start, self.stream.offset()));
                    lowered
                }
                FinallyContext::Subroutine(subroutine) => {
                    self.stream.branch(crate::code::BranchKind::Jsr, *subroutine)
                }
            };
            if result.is_err() {
                break;
            }
        }
        self.finallies.extend(replay);
        result?;
        Ok(())
    }

    /// Stretch the copy ranges just recorded by `run_finallies` over the rest of the exit
    /// edge (the trailing load/return or `goto`)
    ///
    /// Once a context's copy has run, nothing later on the same edge may re-enter its handler,
    /// not even an outer finally copy that throws.
    fn seal_exit_edge(&mut self, down_to: usize) {
        let end = self.stream.offset();
        for context in &mut self.finallies[down_to..] {
            if let FinallyContext::Duplicate { copies, .. } = context {
                if let Some(copy) = copies.last_mut() {
                    copy.1 = end;
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::FieldType;
    use crate::tree::{Const, Expr};

    #[test]
    fn temporaries_sit_above_declared_slots() {
        let body = vec![Statement::new(StatementKind::Block(vec![Statement::new(
            StatementKind::Declare {
                slot: 1,
                name: "x".to_owned(),
                ty: FieldType::LONG,
                init: Some(Expr::Const(Const::Long(0))),
            },
        )]))];
        assert_eq!(frame_slots(1, &body), 3);
        assert_eq!(frame_slots(5, &body), 5);
    }
}
