use crate::code::{BranchKind, Instruction};
use crate::errors::Error;
use crate::jvm::FieldType;
use crate::lower::{FinallyContext, LoopContext, Lowerer};
use crate::tree::{Catch, Expr, FinallyStrategy, Statement, StatementKind};
use crate::util::Offset;

impl Lowerer<'_> {
    pub(super) fn lower_statement(&mut self, statement: &Statement) -> Result<(), Error> {
        if let Some(line) = statement.line {
            self.stream.record_line(line);
        }
        match &statement.kind {
            StatementKind::Expr(expr) => self.lower_effects(expr),

            StatementKind::Declare {
                slot,
                name,
                ty,
                init,
            } => {
                if let Some(init) = init {
                    self.lower_value(init)?;
                    self.store_local(*slot, ty)?;
                }
                // The named range starts once the variable holds its value
                let name = self.pool.add_utf8(name)?;
                let descriptor = self.pool.add_utf8(&ty.render())?;
                self.stream.open_local(*slot, name, descriptor);
                Ok(())
            }

            StatementKind::Block(statements) => {
                for statement in statements {
                    self.lower_statement(statement)?;
                }
                for statement in statements.iter().rev() {
                    if let StatementKind::Declare { slot, .. } = &statement.kind {
                        self.stream.close_local(*slot);
                    }
                }
                Ok(())
            }

            StatementKind::If {
                condition,
                then_branch,
                else_branch,
            } => self.lower_if(condition, then_branch, else_branch.as_deref()),

            StatementKind::While { condition, body } => self.lower_while(condition, body),

            StatementKind::DoWhile { body, condition } => self.lower_do_while(body, condition),

            StatementKind::Return(value) => self.lower_return(value.as_ref()),

            StatementKind::Break => {
                let context = self.loops.last().ok_or(Error::NoEnclosingLoop)?;
                let (target, depth) = (context.break_label, context.finally_depth);
                self.run_finallies(depth)?;
                self.stream.branch(BranchKind::Goto, target)?;
                self.seal_exit_edge(depth);
                Ok(())
            }

            StatementKind::Continue => {
                let context = self.loops.last().ok_or(Error::NoEnclosingLoop)?;
                let (target, depth) = (context.continue_label, context.finally_depth);
                self.run_finallies(depth)?;
                self.stream.branch(BranchKind::Goto, target)?;
                self.seal_exit_edge(depth);
                Ok(())
            }

            StatementKind::Throw(exception) => {
                self.lower_value(exception)?;
                self.stream.emit(Instruction::AThrow)?;
                Ok(())
            }

            StatementKind::Try {
                body,
                catches,
                finally,
            } => self.lower_try(body, catches, finally.as_deref()),
        }
    }

    fn lower_if(
        &mut self,
        condition: &Expr,
        then_branch: &Statement,
        else_branch: Option<&Statement>,
    ) -> Result<(), Error> {
        match condition.optimized_bool_const() {
            Some(true) => {
                self.lower_effects(condition)?;
                self.lower_statement(then_branch)
            }
            Some(false) => {
                self.lower_effects(condition)?;
                match else_branch {
                    Some(else_branch) => self.lower_statement(else_branch),
                    None => Ok(()),
                }
            }
            None => {
                let else_label = self.stream.fresh_label();
                self.lower_cond(condition, None, Some(else_label))?;
                self.lower_statement(then_branch)?;
                match else_branch {
                    None => {
                        self.stream.mark(else_label)?;
                    }
                    Some(else_branch) => {
                        let end = self.stream.fresh_label();
                        self.stream.branch(BranchKind::Goto, end)?;
                        self.stream.mark(else_label)?;
                        self.lower_statement(else_branch)?;
                        self.stream.mark(end)?;
                    }
                }
                Ok(())
            }
        }
    }

    /// Test-at-top loop; `continue` re-tests the condition
    fn lower_while(&mut self, condition: &Expr, body: &Statement) -> Result<(), Error> {
        if condition.optimized_bool_const() == Some(false) {
            return self.lower_effects(condition);
        }

        let top = self.stream.fresh_label();
        let break_label = self.stream.fresh_label();
        self.stream.mark(top)?;

        let decided_true = condition.optimized_bool_const() == Some(true);
        if decided_true {
            self.lower_effects(condition)?;
        } else {
            self.lower_cond(condition, None, Some(break_label))?;
        }

        self.loops.push(LoopContext {
            continue_label: top,
            break_label,
            finally_depth: self.finallies.len(),
        });
        self.lower_statement(body)?;
        self.loops.pop();

        self.stream.branch(BranchKind::Goto, top)?;
        if self.stream.is_referenced(break_label) {
            self.stream.mark(break_label)?;
        }
        Ok(())
    }

    fn lower_do_while(&mut self, body: &Statement, condition: &Expr) -> Result<(), Error> {
        let top = self.stream.fresh_label();
        let continue_label = self.stream.fresh_label();
        let break_label = self.stream.fresh_label();
        self.stream.mark(top)?;

        self.loops.push(LoopContext {
            continue_label,
            break_label,
            finally_depth: self.finallies.len(),
        });
        self.lower_statement(body)?;
        self.loops.pop();

        self.stream.mark(continue_label)?;
        match condition.optimized_bool_const() {
            Some(false) => self.lower_effects(condition)?,
            Some(true) => {
                self.lower_effects(condition)?;
                self.stream.branch(BranchKind::Goto, top)?;
            }
            None => self.lower_cond(condition, Some(top), None)?,
        }
        if self.stream.is_referenced(break_label) {
            self.stream.mark(break_label)?;
        }
        Ok(())
    }

    fn lower_return(&mut self, value: Option<&Expr>) -> Result<(), Error> {
        let value_ty = match value {
            None => None,
            Some(value) => {
                self.lower_value(value)?;
                // Resolution guarantees a type here: a void call cannot be returned
                value.ty()
            }
        };

        match value_ty {
            None => {
                self.run_finallies(0)?;
                self.stream.emit(Instruction::Return)?;
                self.seal_exit_edge(0);
            }
            Some(ty) => {
                if self.finallies.is_empty() {
                    self.stream.emit(return_instruction(&ty))?;
                } else {
                    // Stash the value so the finally handlers see an empty stack
                    let temp = self.alloc_temp(ty.width());
                    self.store_local(temp, &ty)?;
                    self.run_finallies(0)?;
                    self.load_local(temp, &ty)?;
                    self.stream.emit(return_instruction(&ty))?;
                    self.seal_exit_edge(0);
                    self.free_temp(temp);
                }
            }
        }
        Ok(())
    }

    fn lower_try(
        &mut self,
        body: &Statement,
        catches: &[Catch],
        finally: Option<&Statement>,
    ) -> Result<(), Error> {
        if !self.stream.is_alive() {
            return Ok(());
        }

        let end = self.stream.fresh_label();
        let subroutine = match (finally, self.strategy) {
            (Some(_), FinallyStrategy::Subroutine) => Some(self.stream.fresh_label()),
            _ => None,
        };

        if let Some(finally) = finally {
            self.finallies.push(match subroutine {
                Some(label) => FinallyContext::Subroutine(label),
                None => FinallyContext::Duplicate {
                    handler: finally.clone(),
                    copies: vec![],
                },
            });
        }

        let try_start = self.stream.offset();
        self.lower_statement(body)?;
        let try_end = self.stream.offset();
        if self.stream.is_alive() {
            self.replay_own_finally()?;
            self.stream.branch(BranchKind::Goto, end)?;
        }

        // Ranges the catch-all handler must also cover
        let mut protected = vec![(try_start, try_end)];
        let mut typed_rows = vec![];
        for catch in catches {
            let handler = self.stream.fresh_label();
            let handler_at = self.stream.mark_handler(handler)?;

            self.stream.emit(Instruction::AStore(catch.slot))?;
            let name = self.pool.add_utf8(&catch.name)?;
            let descriptor = self.pool.add_utf8(&FieldType::object(catch.class.clone()).render())?;
            self.stream.open_local(catch.slot, name, descriptor);
            self.lower_statement(&catch.body)?;
            self.stream.close_local(catch.slot);
            let catch_end = self.stream.offset();
            if self.stream.is_alive() {
                self.replay_own_finally()?;
                self.stream.branch(BranchKind::Goto, end)?;
            }

            let catch_type = self.pool.add_class(&catch.class)?;
            typed_rows.push((handler_at, catch_type));
            protected.push((handler_at, catch_end));
        }

        let mut copies = vec![];
        if finally.is_some() {
            if let Some(FinallyContext::Duplicate {
                copies: recorded, ..
            }) = self.finallies.pop()
            {
                copies = recorded;
            }
        }

        for (handler_at, catch_type) in typed_rows {
            self.stream
                .add_exception_row(try_start, try_end, handler_at, Some(catch_type))?;
        }

        if let Some(finally) = finally {
            let any = self.stream.fresh_label();
            let any_at = self.stream.mark_handler(any)?;

            let temp = self.alloc_temp(1);
            self.stream.emit(Instruction::AStore(temp))?;
            match subroutine {
                Some(label) => self.stream.branch(BranchKind::Jsr, label)?,
                None => self.lower_statement(finally)?,
            }
            self.stream.emit(Instruction::ALoad(temp))?;
            self.stream.emit(Instruction::AThrow)?;

            // The subroutine's return-address slot must not alias the saved exception
            if let Some(label) = subroutine {
                self.lower_subroutine(label, finally)?;
            }
            self.free_temp(temp);

            // Each protected range splits around the inline copies it overlaps: an exception
            // out of a copy belongs to the enclosing handler, not this one
            for (start, stop) in protected {
                let mut from = start;
                for &(copy_start, copy_end) in &copies {
                    if copy_end <= from || copy_start >= stop {
                        continue;
                    }
                    self.stream.add_exception_row(from, copy_start, any_at, None)?;
                    from = copy_end;
                }
                if from < stop {
                    self.stream.add_exception_row(from, stop, any_at, None)?;
                }
            }
        }

        self.stream.mark(end)?;
        Ok(())
    }

    /// The shared `finally` subroutine: save the return address, run the handler, `ret`
    fn lower_subroutine(&mut self, label: crate::code::Label, finally: &Statement) -> Result<(), Error> {
        self.stream.mark(label)?;
        let return_address = self.alloc_temp(1);
        self.stream.emit(Instruction::AStore(return_address))?;
        self.subroutine_depth += 1;
        let lowered = self.lower_statement(finally);
        self.subroutine_depth -= 1;
        lowered?;
        self.stream.emit(Instruction::Ret(return_address))?;
        self.free_temp(return_address);
        Ok(())
    }

    /// Replay just the innermost finally context (the one belonging to the `try` being lowered)
    fn replay_own_finally(&mut self) -> Result<(), Error> {
        let depth = self.finallies.len();
        if depth > 0 {
            self.run_finallies(depth - 1)?;
        }
        Ok(())
    }

    pub(super) fn store_local(&mut self, slot: u16, ty: &FieldType) -> Result<Offset, Error> {
        self.stream.emit(store_instruction(slot, ty))
    }

    pub(super) fn load_local(&mut self, slot: u16, ty: &FieldType) -> Result<Offset, Error> {
        self.stream.emit(load_instruction(slot, ty))
    }
}

pub(super) fn load_instruction(slot: u16, ty: &FieldType) -> Instruction {
    use crate::jvm::BaseType;
    match ty {
        FieldType::Object(_) | FieldType::Array(_) => Instruction::ALoad(slot),
        FieldType::Base(BaseType::Long) => Instruction::LLoad(slot),
        FieldType::Base(BaseType::Float) => Instruction::FLoad(slot),
        FieldType::Base(BaseType::Double) => Instruction::DLoad(slot),
        FieldType::Base(_) => Instruction::ILoad(slot),
    }
}

pub(super) fn store_instruction(slot: u16, ty: &FieldType) -> Instruction {
    use crate::jvm::BaseType;
    match ty {
        FieldType::Object(_) | FieldType::Array(_) => Instruction::AStore(slot),
        FieldType::Base(BaseType::Long) => Instruction::LStore(slot),
        FieldType::Base(BaseType::Float) => Instruction::FStore(slot),
        FieldType::Base(BaseType::Double) => Instruction::DStore(slot),
        FieldType::Base(_) => Instruction::IStore(slot),
    }
}

pub(super) fn return_instruction(ty: &FieldType) -> Instruction {
    use crate::jvm::BaseType;
    match ty {
        FieldType::Object(_) | FieldType::Array(_) => Instruction::AReturn,
        FieldType::Base(BaseType::Long) => Instruction::LReturn,
        FieldType::Base(BaseType::Float) => Instruction::FReturn,
        FieldType::Base(BaseType::Double) => Instruction::DReturn,
        FieldType::Base(_) => Instruction::IReturn,
    }
}
