use crate::code::{BranchKind, CompareMode, EqComparison, Instruction, Label, OrdComparison};
use crate::errors::Error;
use crate::jvm::{BaseType, FieldType};
use crate::lower::Lowerer;
use crate::tree::{BinOp, Const, Expr, UnOp};

impl Lowerer<'_> {
    /// Lower a boolean expression as control flow
    ///
    /// Jumps to `on_true` when the condition holds and to `on_false` when it does not; a
    /// `None` target means fall through. A condition whose optimized constant is known emits
    /// only the side effects of the operands that still execute, then at most one `goto`.
    pub(super) fn lower_cond(
        &mut self,
        expr: &Expr,
        on_true: Option<Label>,
        on_false: Option<Label>,
    ) -> Result<(), Error> {
        if let Some(decided) = expr.optimized_bool_const() {
            self.lower_effects(expr)?;
            let target = if decided { on_true } else { on_false };
            if let Some(target) = target {
                self.stream.branch(BranchKind::Goto, target)?;
            }
            return Ok(());
        }

        match expr {
            Expr::Unary {
                op: UnOp::Not,
                operand,
            } => self.lower_cond(operand, on_false, on_true),

            Expr::Binary {
                op: BinOp::AndAnd,
                lhs,
                rhs,
            } => {
                // A false left operand short-circuits past the right one
                let local_false = match on_false {
                    Some(_) => None,
                    None => Some(self.stream.fresh_label()),
                };
                let lhs_false = on_false.or(local_false);
                self.lower_cond(lhs, None, lhs_false)?;
                self.lower_cond(rhs, on_true, on_false)?;
                if let Some(label) = local_false {
                    self.stream.mark(label)?;
                }
                Ok(())
            }

            Expr::Binary {
                op: BinOp::OrOr,
                lhs,
                rhs,
            } => {
                let local_true = match on_true {
                    Some(_) => None,
                    None => Some(self.stream.fresh_label()),
                };
                let lhs_true = on_true.or(local_true);
                self.lower_cond(lhs, lhs_true, None)?;
                self.lower_cond(rhs, on_true, on_false)?;
                if let Some(label) = local_true {
                    self.stream.mark(label)?;
                }
                Ok(())
            }

            // Eager boolean connectives evaluate both operands to 0/1 and test the result
            Expr::Binary {
                op: op @ (BinOp::And | BinOp::Or | BinOp::Xor),
                lhs,
                rhs,
            } => {
                self.lower_value(lhs)?;
                self.lower_value(rhs)?;
                self.stream.emit(match op {
                    BinOp::And => Instruction::IAnd,
                    BinOp::Or => Instruction::IOr,
                    _ => Instruction::IXor,
                })?;
                self.branch_ord(BranchKind::If, OrdComparison::NE, on_true, on_false)
            }

            Expr::Binary { op, lhs, rhs } => {
                self.lower_comparison(*op, lhs, rhs, on_true, on_false)
            }

            Expr::Conditional {
                condition,
                then_value,
                else_value,
            } => match condition.optimized_bool_const() {
                Some(decided) => {
                    self.lower_effects(condition)?;
                    let arm = if decided { then_value } else { else_value };
                    self.lower_cond(arm, on_true, on_false)
                }
                None => {
                    let else_label = self.stream.fresh_label();
                    let end = self.stream.fresh_label();
                    self.lower_cond(condition, None, Some(else_label))?;
                    self.lower_cond(then_value, on_true, on_false)?;
                    self.stream.branch(BranchKind::Goto, end)?;
                    self.stream.mark(else_label)?;
                    self.lower_cond(else_value, on_true, on_false)?;
                    self.stream.mark(end)?;
                    Ok(())
                }
            },

            // Any other boolean-valued expression: evaluate it and test against zero
            _ => {
                self.lower_value(expr)?;
                self.branch_ord(BranchKind::If, OrdComparison::NE, on_true, on_false)
            }
        }
    }

    fn lower_comparison(
        &mut self,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
        on_true: Option<Label>,
        on_false: Option<Label>,
    ) -> Result<(), Error> {
        let cmp = match op {
            BinOp::Eq => OrdComparison::EQ,
            BinOp::Ne => OrdComparison::NE,
            BinOp::Lt => OrdComparison::LT,
            BinOp::Ge => OrdComparison::GE,
            BinOp::Gt => OrdComparison::GT,
            BinOp::Le => OrdComparison::LE,
            // lower_cond already dispatched every other operator
            _ => unreachable!("not a comparison: {:?}", op),
        };

        // `x == true` is `x`; `x == false` is `!x` (and dually for `!=`)
        for (bool_side, other) in [(lhs, rhs), (rhs, lhs)] {
            if let Expr::Const(Const::Boolean(value)) = bool_side {
                let same_sense = *value == (cmp == OrdComparison::EQ);
                return if same_sense {
                    self.lower_cond(other, on_true, on_false)
                } else {
                    self.lower_cond(other, on_false, on_true)
                };
            }
        }

        let operand_ty = lhs.ty().or_else(|| rhs.ty());
        match operand_ty {
            Some(FieldType::Object(_)) | Some(FieldType::Array(_)) => {
                let eq = match cmp {
                    OrdComparison::EQ => EqComparison::EQ,
                    _ => EqComparison::NE,
                };
                if matches!(rhs, Expr::Const(Const::Null)) {
                    self.lower_value(lhs)?;
                    self.branch_eq(BranchKind::IfNull, eq, on_true, on_false)
                } else if matches!(lhs, Expr::Const(Const::Null)) {
                    self.lower_value(rhs)?;
                    self.branch_eq(BranchKind::IfNull, eq, on_true, on_false)
                } else {
                    self.lower_value(lhs)?;
                    self.lower_value(rhs)?;
                    self.branch_eq(BranchKind::IfACmp, eq, on_true, on_false)
                }
            }

            Some(FieldType::Base(BaseType::Long)) => {
                self.lower_value(lhs)?;
                self.lower_value(rhs)?;
                self.stream.emit(Instruction::LCmp)?;
                self.branch_ord(BranchKind::If, cmp, on_true, on_false)
            }

            Some(FieldType::Base(BaseType::Float)) | Some(FieldType::Base(BaseType::Double)) => {
                // NaN must fail the source comparison whichever way the branch is negated
                let mode = match cmp {
                    OrdComparison::LT | OrdComparison::LE => CompareMode::G,
                    _ => CompareMode::L,
                };
                let double = operand_ty == Some(FieldType::DOUBLE);
                self.lower_value(lhs)?;
                self.lower_value(rhs)?;
                self.stream.emit(if double {
                    Instruction::DCmp(mode)
                } else {
                    Instruction::FCmp(mode)
                })?;
                self.branch_ord(BranchKind::If, cmp, on_true, on_false)
            }

            // int and the smaller integral types
            _ => {
                if matches!(rhs, Expr::Const(Const::Int(0))) {
                    self.lower_value(lhs)?;
                    self.branch_ord(BranchKind::If, cmp, on_true, on_false)
                } else if matches!(lhs, Expr::Const(Const::Int(0))) {
                    self.lower_value(rhs)?;
                    self.branch_ord(BranchKind::If, cmp.flip(), on_true, on_false)
                } else {
                    self.lower_value(lhs)?;
                    self.lower_value(rhs)?;
                    self.branch_ord(BranchKind::IfICmp, cmp, on_true, on_false)
                }
            }
        }
    }

    /// Emit the branch (or branches) sending a tested condition to its targets
    ///
    /// `cmp` is the comparison in the "condition holds" sense; branching to the false target
    /// uses its negation.
    fn branch_ord(
        &mut self,
        kind: impl Fn(OrdComparison) -> BranchKind,
        cmp: OrdComparison,
        on_true: Option<Label>,
        on_false: Option<Label>,
    ) -> Result<(), Error> {
        match (on_true, on_false) {
            (Some(on_true), None) => self.stream.branch(kind(cmp), on_true),
            (None, Some(on_false)) => self.stream.branch(kind(!cmp), on_false),
            (Some(on_true), Some(on_false)) => {
                self.stream.branch(kind(cmp), on_true)?;
                self.stream.branch(BranchKind::Goto, on_false)
            }
            (None, None) => Ok(()),
        }
    }

    fn branch_eq(
        &mut self,
        kind: impl Fn(EqComparison) -> BranchKind,
        cmp: EqComparison,
        on_true: Option<Label>,
        on_false: Option<Label>,
    ) -> Result<(), Error> {
        match (on_true, on_false) {
            (Some(on_true), None) => self.stream.branch(kind(cmp), on_true),
            (None, Some(on_false)) => self.stream.branch(kind(!cmp), on_false),
            (Some(on_true), Some(on_false)) => {
                self.stream.branch(kind(cmp), on_true)?;
                self.stream.branch(BranchKind::Goto, on_false)
            }
            (None, None) => Ok(()),
        }
    }
}
