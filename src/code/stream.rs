use crate::code::debug::{LineNumberTableBuilder, LocalVariableTableBuilder};
use crate::code::instruction::{BranchKind, Instruction};
use crate::errors::Error;
use crate::jvm::{
    Attribute, ClassIndex, Code, ConstantPool, ExceptionTableEntry, LineNumberEntry,
    LineNumberTable, LocalVariableEntry, LocalVariableTable, Utf8Index,
};
use crate::util::Offset;
use log::trace;

/// Forward reference to a code offset that is not known yet
///
/// Labels are cheap indices into the owning stream's label arena. A label is *marked* exactly
/// once, at which point all branches recorded against it get back-patched.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct Label(pub(crate) usize);

#[derive(Default)]
struct LabelState {
    /// Offset the label was marked at
    resolved: Option<Offset>,

    /// Branch operand positions still waiting for the offset
    patches: Vec<PatchSite>,

    /// Operand stack depth carried into the label by the first branch to it
    depth: Option<u16>,
}

struct PatchSite {
    /// Position of the 2-byte relative offset operand
    operand_at: usize,

    /// Offset of the branch opcode the operand is relative to
    from: usize,
}

/// Byte buffer a single method body is emitted into
///
/// The stream owns everything that accumulates while a method is lowered: the code bytes,
/// stack depth accounting, the label arena, the exception table, and the debug tables. Calling
/// [`finish`](CodeStream::finish) checks the end-of-method invariants and yields a
/// [`MethodCode`].
///
/// The stream tracks whether the current offset is reachable. Emitting into dead code is a
/// no-op, so callers can lower statements uniformly and let unreachable instructions drop out.
/// Marking a label something branched to revives the stream at the depth the branch recorded.
pub struct CodeStream {
    code: Vec<u8>,
    labels: Vec<LabelState>,
    stack: u16,
    max_stack: u16,
    max_locals: u16,
    alive: bool,
    exception_table: Vec<ExceptionTableEntry>,
    line_numbers: LineNumberTableBuilder,
    local_variables: LocalVariableTableBuilder,
}

impl CodeStream {
    /// Start a stream for a method whose parameters occupy `parameter_slots` locals
    pub fn new(parameter_slots: u16) -> CodeStream {
        CodeStream {
            code: vec![],
            labels: vec![],
            stack: 0,
            max_stack: 0,
            max_locals: parameter_slots,
            alive: true,
            exception_table: vec![],
            line_numbers: LineNumberTableBuilder::new(),
            local_variables: LocalVariableTableBuilder::new(),
        }
    }

    /// Offset the next instruction will be emitted at
    pub fn offset(&self) -> Offset {
        Offset(self.code.len())
    }

    /// Is the current offset reachable?
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Current operand stack depth
    pub fn stack_depth(&self) -> u16 {
        self.stack
    }

    /// Make sure `max_locals` covers slots `0..slots`
    pub fn reserve_locals(&mut self, slots: u16) {
        self.max_locals = self.max_locals.max(slots);
    }

    /// Emit one instruction, returning the offset it was placed at
    ///
    /// In dead code nothing is written and the current offset is returned unchanged.
    pub fn emit(&mut self, insn: Instruction) -> Result<Offset, Error> {
        let at = self.offset();
        if !self.alive {
            trace!("skipping {:?} at unreachable {:?}", insn, at);
            return Ok(at);
        }

        insn.encode(&mut self.code);
        self.check_code_length()?;

        let (pops, pushes) = insn.stack_effect();
        self.pop_stack(at, pops)?;
        self.push_stack(pushes)?;
        if let Some((slot, width)) = insn.local_use() {
            self.use_local(slot, width)?;
        }
        if insn.ends_flow() {
            self.alive = false;
        }
        Ok(at)
    }

    /// Allocate a fresh, unmarked label
    pub fn fresh_label(&mut self) -> Label {
        let label = Label(self.labels.len());
        self.labels.push(LabelState::default());
        label
    }

    /// Emit a branch to `target`, patching later if the target is not yet marked
    ///
    /// Backward `goto`s out of 2-byte range widen to `goto_w`. A forward branch that ends up
    /// out of range fails at mark time; conditional branches have no wide form at all.
    pub fn branch(&mut self, kind: BranchKind, target: Label) -> Result<(), Error> {
        let from = self.offset();
        if !self.alive {
            trace!("skipping {:?} -> {:?} at unreachable {:?}", kind, target, from);
            return Ok(());
        }

        self.pop_stack(from, kind.pops())?;
        let depth_at_target = match kind {
            // The subroutine starts with the return address on top
            BranchKind::Jsr => self.stack + 1,
            _ => self.stack,
        };
        self.note_depth(target, depth_at_target)?;

        match self.labels[target.0].resolved {
            Some(to) => {
                let relative = to.0 as i64 - from.0 as i64;
                if let Ok(relative) = i16::try_from(relative) {
                    self.code.push(kind.opcode());
                    self.code.extend_from_slice(&relative.to_be_bytes());
                } else if kind == BranchKind::Goto {
                    self.code.push(0xc8);
                    self.code.extend_from_slice(&(relative as i32).to_be_bytes());
                } else {
                    return Err(Error::BranchTargetTooFar { from, to });
                }
            }
            None => {
                self.code.push(kind.opcode());
                let operand_at = self.code.len();
                self.code.extend_from_slice(&[0, 0]);
                self.labels[target.0].patches.push(PatchSite {
                    operand_at,
                    from: from.0,
                });
            }
        }
        self.check_code_length()?;

        if kind.is_unconditional() {
            self.alive = false;
        }
        Ok(())
    }

    /// Place `label` at the current offset, back-patching every branch recorded against it
    ///
    /// In dead code, a label something branched to revives the stream at the recorded depth;
    /// a label nothing referenced resolves without reviving, so the code after it stays dead.
    pub fn mark(&mut self, label: Label) -> Result<Offset, Error> {
        let here = self.resolve(label)?;

        let state = &mut self.labels[label.0];
        if self.alive {
            match state.depth {
                Some(depth) if depth != self.stack => {
                    return Err(Error::LabelStackMismatch {
                        label,
                        branch_depth: depth,
                        mark_depth: self.stack,
                    });
                }
                Some(_) => {}
                None => state.depth = Some(self.stack),
            }
        } else if let Some(depth) = state.depth {
            self.stack = depth;
            self.alive = true;
        }
        Ok(here)
    }

    /// Has anything branched to this label?
    pub fn is_referenced(&self, label: Label) -> bool {
        let state = &self.labels[label.0];
        !state.patches.is_empty() || state.depth.is_some()
    }

    /// Place `label` as an exception handler entry point
    ///
    /// Handlers are entered with exactly the thrown reference on the stack, regardless of the
    /// depth where the exception was raised.
    pub fn mark_handler(&mut self, label: Label) -> Result<Offset, Error> {
        let here = self.resolve(label)?;
        self.labels[label.0].depth = Some(1);
        self.stack = 1;
        self.max_stack = self.max_stack.max(1);
        self.alive = true;
        Ok(here)
    }

    fn resolve(&mut self, label: Label) -> Result<Offset, Error> {
        let here = self.offset();
        let state = &mut self.labels[label.0];
        if let Some(first_marked_at) = state.resolved {
            return Err(Error::DuplicateLabel {
                label,
                first_marked_at,
            });
        }
        trace!("marking {:?} at {:?}", label, here);
        state.resolved = Some(here);

        for site in std::mem::take(&mut state.patches) {
            let relative = here.0 as i64 - site.from as i64;
            let relative = i16::try_from(relative).map_err(|_| Error::BranchTargetTooFar {
                from: Offset(site.from),
                to: here,
            })?;
            self.code[site.operand_at..site.operand_at + 2]
                .copy_from_slice(&relative.to_be_bytes());
        }
        Ok(here)
    }

    /// Record an exception table row; empty protected ranges are dropped
    pub fn add_exception_row(
        &mut self,
        start: Offset,
        end: Offset,
        handler: Offset,
        catch_type: Option<ClassIndex>,
    ) -> Result<(), Error> {
        if start == end {
            return Ok(());
        }
        if self.exception_table.len() >= u16::MAX as usize {
            return Err(Error::TableOverflow {
                table: "exception_table",
                count: self.exception_table.len() + 1,
            });
        }
        self.exception_table.push(ExceptionTableEntry {
            start_pc: start.0 as u16,
            end_pc: end.0 as u16,
            handler_pc: handler.0 as u16,
            catch_type,
        });
        Ok(())
    }

    /// Note that the code about to be emitted comes from this source line
    pub fn record_line(&mut self, line_number: u16) {
        if self.alive {
            self.line_numbers.record(self.offset(), line_number);
        }
    }

    /// A named local comes into scope at the current offset
    pub fn open_local(&mut self, slot: u16, name: Utf8Index, descriptor: Utf8Index) {
        self.local_variables.open(slot, self.offset(), name, descriptor);
    }

    /// The named local in this slot goes out of scope at the current offset
    pub fn close_local(&mut self, slot: u16) {
        self.local_variables.close(slot, self.offset());
    }

    /// Check end-of-method invariants and produce the finished method body
    pub fn finish(self) -> Result<MethodCode, Error> {
        let unmarked: Vec<Label> = self
            .labels
            .iter()
            .enumerate()
            .filter(|(_, state)| {
                state.resolved.is_none() && (!state.patches.is_empty() || state.depth.is_some())
            })
            .map(|(idx, _)| Label(idx))
            .collect();
        if !unmarked.is_empty() {
            return Err(Error::UnmarkedLabels { labels: unmarked });
        }

        let end = Offset(self.code.len());
        Ok(MethodCode {
            code: self.code,
            max_stack: self.max_stack,
            max_locals: self.max_locals,
            exception_table: self.exception_table,
            line_number_table: self.line_numbers.into_entries(),
            local_variable_table: self.local_variables.into_entries(end),
        })
    }

    fn check_code_length(&self) -> Result<(), Error> {
        if self.code.len() > u16::MAX as usize {
            return Err(Error::MethodCodeMaxLengthExceeded {
                code_length: self.code.len(),
            });
        }
        Ok(())
    }

    /// Record the stack depth carried into a label, checking against earlier records
    fn note_depth(&mut self, label: Label, depth: u16) -> Result<(), Error> {
        let state = &mut self.labels[label.0];
        match state.depth {
            Some(existing) if existing != depth => Err(Error::LabelStackMismatch {
                label,
                branch_depth: existing,
                mark_depth: depth,
            }),
            _ => {
                state.depth = Some(depth);
                Ok(())
            }
        }
    }

    fn pop_stack(&mut self, at: Offset, popped: u16) -> Result<(), Error> {
        if popped > self.stack {
            return Err(Error::OperandStackUnderflow {
                at,
                popped,
                depth: self.stack,
            });
        }
        self.stack -= popped;
        Ok(())
    }

    fn push_stack(&mut self, pushed: u16) -> Result<(), Error> {
        let depth = self.stack as usize + pushed as usize;
        if depth > u16::MAX as usize {
            return Err(Error::MethodCodeMaxStackExceeded { depth });
        }
        self.stack = depth as u16;
        self.max_stack = self.max_stack.max(self.stack);
        Ok(())
    }

    fn use_local(&mut self, slot: u16, width: u16) -> Result<(), Error> {
        let top = slot as usize + width as usize;
        if top > u16::MAX as usize + 1 {
            return Err(Error::MethodCodeMaxLocalsExceeded { slot: slot as usize });
        }
        self.max_locals = self.max_locals.max(top as u16);
        Ok(())
    }
}

/// Everything emitted for one method body
#[derive(Debug)]
pub struct MethodCode {
    pub code: Vec<u8>,
    pub max_stack: u16,
    pub max_locals: u16,
    pub exception_table: Vec<ExceptionTableEntry>,
    pub line_number_table: Vec<LineNumberEntry>,
    pub local_variable_table: Vec<LocalVariableEntry>,
}

impl MethodCode {
    /// Assemble the `Code` attribute (with its debug sub-attributes) for this body
    pub fn code_attribute(&self, pool: &mut ConstantPool) -> Result<Code, Error> {
        let mut attributes = vec![];
        if !self.line_number_table.is_empty() {
            attributes.push(Attribute::new(
                pool,
                LineNumberTable(self.line_number_table.clone()),
            )?);
        }
        if !self.local_variable_table.is_empty() {
            attributes.push(Attribute::new(
                pool,
                LocalVariableTable(self.local_variable_table.clone()),
            )?);
        }
        Ok(Code {
            max_stack: self.max_stack,
            max_locals: self.max_locals,
            code: self.code.clone(),
            exception_table: self.exception_table.clone(),
            attributes,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::code::instruction::OrdComparison;

    #[test]
    fn forward_branch_is_back_patched() {
        let mut stream = CodeStream::new(1);
        let end = stream.fresh_label();

        stream.emit(Instruction::ILoad(0)).unwrap();
        stream.branch(BranchKind::If(OrdComparison::EQ), end).unwrap();
        stream.emit(Instruction::IInc(0, 1)).unwrap();
        stream.mark(end).unwrap();
        stream.emit(Instruction::Return).unwrap();

        let method = stream.finish().unwrap();
        assert_eq!(
            method.code,
            vec![0x1a, 0x99, 0, 6, 0x84, 0, 1, 0xb1]
        );
        assert_eq!(method.max_stack, 1);
        assert_eq!(method.max_locals, 1);
    }

    #[test]
    fn backward_branch_is_encoded_immediately() {
        let mut stream = CodeStream::new(1);
        let top = stream.fresh_label();

        stream.mark(top).unwrap();
        stream.emit(Instruction::IInc(0, 1)).unwrap();
        stream.branch(BranchKind::Goto, top).unwrap();

        // -3: from the goto opcode back over the 3-byte iinc
        assert_eq!(stream.finish().unwrap().code, vec![0x84, 0, 1, 0xa7, 0xff, 0xfd]);
    }

    #[test]
    fn dead_code_is_dropped_until_a_referenced_mark() {
        let mut stream = CodeStream::new(0);
        let skip = stream.fresh_label();

        stream.branch(BranchKind::Goto, skip).unwrap();
        stream.emit(Instruction::IConst0).unwrap();
        stream.emit(Instruction::Pop).unwrap();
        stream.mark(skip).unwrap();
        stream.emit(Instruction::Return).unwrap();

        assert_eq!(stream.finish().unwrap().code, vec![0xa7, 0, 3, 0xb1]);
    }

    #[test]
    fn emits_after_return_are_no_ops() {
        let mut stream = CodeStream::new(0);
        stream.emit(Instruction::Return).unwrap();
        stream.emit(Instruction::IConst0).unwrap();
        stream.emit(Instruction::Pop).unwrap();

        assert_eq!(stream.finish().unwrap().code, vec![0xb1]);
    }

    #[test]
    fn duplicate_mark_is_an_error() {
        let mut stream = CodeStream::new(0);
        let label = stream.fresh_label();
        stream.mark(label).unwrap();
        assert!(matches!(
            stream.mark(label),
            Err(Error::DuplicateLabel { .. })
        ));
    }

    #[test]
    fn unmarked_referenced_label_fails_finish() {
        let mut stream = CodeStream::new(0);
        let nowhere = stream.fresh_label();
        stream.branch(BranchKind::Goto, nowhere).unwrap();
        assert!(matches!(
            stream.finish(),
            Err(Error::UnmarkedLabels { labels }) if labels == vec![nowhere]
        ));
    }

    #[test]
    fn unreferenced_labels_do_not_fail_finish() {
        let mut stream = CodeStream::new(0);
        let _scratch = stream.fresh_label();
        stream.emit(Instruction::Return).unwrap();
        assert!(stream.finish().is_ok());
    }

    #[test]
    fn stack_underflow_is_detected() {
        let mut stream = CodeStream::new(0);
        assert!(matches!(
            stream.emit(Instruction::Pop),
            Err(Error::OperandStackUnderflow { .. })
        ));
    }

    #[test]
    fn branch_depths_must_agree_at_merge_points() {
        let mut stream = CodeStream::new(0);
        let merge = stream.fresh_label();

        stream.emit(Instruction::IConst0).unwrap();
        stream.branch(BranchKind::If(OrdComparison::EQ), merge).unwrap();
        stream.emit(Instruction::IConst1).unwrap();
        assert!(matches!(
            stream.mark(merge),
            Err(Error::LabelStackMismatch { .. })
        ));
    }

    #[test]
    fn handler_marks_revive_at_depth_one() {
        let mut stream = CodeStream::new(1);
        let handler = stream.fresh_label();

        let start = stream.offset();
        stream.emit(Instruction::Return).unwrap();
        let end = stream.offset();
        stream.mark_handler(handler).unwrap();
        stream.emit(Instruction::AStore(0)).unwrap();
        stream.emit(Instruction::Return).unwrap();
        stream.add_exception_row(start, end, Offset(1), None).unwrap();

        let method = stream.finish().unwrap();
        assert_eq!(method.max_stack, 1);
        assert_eq!(method.code, vec![0xb1, 0x4b, 0xb1]);
    }
}
