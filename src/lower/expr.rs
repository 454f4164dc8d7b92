use crate::code::{BranchKind, Instruction, ShiftType};
use crate::errors::Error;
use crate::jvm::{BaseType, BootstrapMethod, FieldType, HandleKind, InvokeDynamicIndex};
use crate::lower::Lowerer;
use crate::tree::{BinOp, Const, Expr, LambdaSite, UnOp};

const METAFACTORY_DESCRIPTOR: &str = "(Ljava/lang/invoke/MethodHandles$Lookup;\
     Ljava/lang/String;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodType;\
     Ljava/lang/invoke/MethodHandle;Ljava/lang/invoke/MethodType;)\
     Ljava/lang/invoke/CallSite;";

const ALT_METAFACTORY_DESCRIPTOR: &str = "(Ljava/lang/invoke/MethodHandles$Lookup;\
     Ljava/lang/String;Ljava/lang/invoke/MethodType;[Ljava/lang/Object;)\
     Ljava/lang/invoke/CallSite;";

impl Lowerer<'_> {
    /// Lower an expression, leaving its value on the operand stack
    pub(super) fn lower_value(&mut self, expr: &Expr) -> Result<(), Error> {
        // A folded expression loads its value directly
        if !matches!(expr, Expr::Const(_)) {
            if let Some(constant) = expr.const_value() {
                return self.lower_const(&constant);
            }
        }

        match expr {
            Expr::Const(constant) => self.lower_const(constant),

            Expr::Local { slot, ty } => {
                self.load_local(*slot, ty)?;
                Ok(())
            }

            Expr::Assign { slot, ty, value } => {
                self.lower_value(value)?;
                self.stream.emit(if ty.width() == 2 {
                    Instruction::Dup2
                } else {
                    Instruction::Dup
                })?;
                self.store_local(*slot, ty)?;
                Ok(())
            }

            Expr::Unary {
                op: UnOp::Neg,
                operand,
            } => {
                self.lower_value(operand)?;
                let insn = match operand.ty() {
                    Some(FieldType::Base(BaseType::Long)) => Instruction::LNeg,
                    Some(FieldType::Base(BaseType::Float)) => Instruction::FNeg,
                    Some(FieldType::Base(BaseType::Double)) => Instruction::DNeg,
                    _ => Instruction::INeg,
                };
                self.stream.emit(insn)?;
                Ok(())
            }

            Expr::Unary { op: UnOp::Not, .. } => self.lower_bool_value(expr),

            Expr::Binary { op, lhs, rhs } => match op {
                BinOp::Eq
                | BinOp::Ne
                | BinOp::Lt
                | BinOp::Ge
                | BinOp::Gt
                | BinOp::Le
                | BinOp::AndAnd
                | BinOp::OrOr => self.lower_bool_value(expr),
                _ => {
                    self.lower_value(lhs)?;
                    self.lower_value(rhs)?;
                    self.stream.emit(arithmetic_instruction(*op, &lhs.ty())?)?;
                    Ok(())
                }
            },

            Expr::Conditional {
                condition,
                then_value,
                else_value,
            } => {
                if expr.ty() == Some(FieldType::BOOLEAN) {
                    return self.lower_bool_value(expr);
                }
                match condition.optimized_bool_const() {
                    Some(decided) => {
                        self.lower_effects(condition)?;
                        self.lower_value(if decided { then_value } else { else_value })
                    }
                    None => {
                        let else_label = self.stream.fresh_label();
                        let end = self.stream.fresh_label();
                        self.lower_cond(condition, None, Some(else_label))?;
                        self.lower_value(then_value)?;
                        self.stream.branch(BranchKind::Goto, end)?;
                        self.stream.mark(else_label)?;
                        self.lower_value(else_value)?;
                        self.stream.mark(end)?;
                        Ok(())
                    }
                }
            }

            Expr::FieldGet { object, field } => {
                let index = self
                    .pool
                    .add_fieldref(&field.class, &field.name, &field.ty.render())?;
                let width = field.ty.width();
                match object {
                    None => {
                        self.stream
                            .emit(Instruction::GetStatic { field: index, width })?;
                    }
                    Some(object) => {
                        self.lower_value(object)?;
                        self.stream
                            .emit(Instruction::GetField { field: index, width })?;
                    }
                }
                Ok(())
            }

            Expr::Call {
                invoke,
                receiver,
                method,
                args,
            } => {
                if let Some(receiver) = receiver {
                    self.lower_value(receiver)?;
                }
                for arg in args {
                    self.lower_value(arg)?;
                }
                let index = self.pool.add_methodref(
                    &method.class,
                    &method.name,
                    &method.descriptor.render(),
                    method.is_interface,
                )?;
                self.stream.emit(Instruction::Invoke {
                    kind: *invoke,
                    method: index,
                    args_width: method.descriptor.parameter_width(),
                    return_width: method.descriptor.return_width(),
                })?;
                Ok(())
            }

            Expr::Lambda(site) => {
                for capture in &site.captures {
                    self.lower_value(capture)?;
                }
                let call_site = self.lambda_call_site(site)?;
                self.stream.emit(Instruction::InvokeDynamic {
                    call_site,
                    args_width: site.factory.parameter_width(),
                    return_width: 1,
                })?;
                Ok(())
            }
        }
    }

    /// Lower an expression only for its side effects
    ///
    /// Value-producing subexpressions with no effects vanish; short-circuit operators keep
    /// their conditional evaluation of the right operand. Integral `/` and `%` whose divisor
    /// is not a known non-zero constant are evaluated and popped so the potential
    /// `ArithmeticException` survives; other exceptions a dropped pure subexpression could
    /// have thrown (null dereference) are not preserved.
    pub(super) fn lower_effects(&mut self, expr: &Expr) -> Result<(), Error> {
        match expr {
            Expr::Const(_) | Expr::Local { .. } => Ok(()),

            Expr::Assign { slot, ty, value } => {
                self.lower_value(value)?;
                self.store_local(*slot, ty)?;
                Ok(())
            }

            Expr::Unary { operand, .. } => self.lower_effects(operand),

            Expr::Binary {
                op: BinOp::AndAnd,
                lhs,
                rhs,
            } => self.lower_short_circuit_effects(lhs, rhs, false),

            Expr::Binary {
                op: BinOp::OrOr,
                lhs,
                rhs,
            } => self.lower_short_circuit_effects(lhs, rhs, true),

            Expr::Binary {
                op: op @ (BinOp::Div | BinOp::Rem),
                lhs,
                rhs,
            } => {
                if throwing_division(lhs, rhs) {
                    self.lower_value(lhs)?;
                    self.lower_value(rhs)?;
                    self.stream.emit(arithmetic_instruction(*op, &lhs.ty())?)?;
                    let wide = matches!(lhs.ty(), Some(FieldType::Base(BaseType::Long)));
                    self.stream.emit(if wide {
                        Instruction::Pop2
                    } else {
                        Instruction::Pop
                    })?;
                    Ok(())
                } else {
                    self.lower_effects(lhs)?;
                    self.lower_effects(rhs)
                }
            }

            Expr::Binary { lhs, rhs, .. } => {
                self.lower_effects(lhs)?;
                self.lower_effects(rhs)
            }

            Expr::Conditional {
                condition,
                then_value,
                else_value,
            } => match condition.optimized_bool_const() {
                Some(decided) => {
                    self.lower_effects(condition)?;
                    self.lower_effects(if decided { then_value } else { else_value })
                }
                None if !has_effects(then_value) && !has_effects(else_value) => {
                    self.lower_effects(condition)
                }
                None => {
                    let else_label = self.stream.fresh_label();
                    let end = self.stream.fresh_label();
                    self.lower_cond(condition, None, Some(else_label))?;
                    self.lower_effects(then_value)?;
                    self.stream.branch(BranchKind::Goto, end)?;
                    self.stream.mark(else_label)?;
                    self.lower_effects(else_value)?;
                    self.stream.mark(end)?;
                    Ok(())
                }
            },

            Expr::FieldGet { object, .. } => match object {
                Some(object) => self.lower_effects(object),
                None => Ok(()),
            },

            Expr::Call { method, .. } => {
                self.lower_value(expr)?;
                match method.descriptor.return_width() {
                    0 => {}
                    1 => {
                        self.stream.emit(Instruction::Pop)?;
                    }
                    _ => {
                        self.stream.emit(Instruction::Pop2)?;
                    }
                }
                Ok(())
            }

            Expr::Lambda(site) => {
                for capture in &site.captures {
                    self.lower_effects(capture)?;
                }
                Ok(())
            }
        }
    }

    /// `lhs && rhs` (or `||`, when `skip_on` is true) evaluated for effects only
    fn lower_short_circuit_effects(
        &mut self,
        lhs: &Expr,
        rhs: &Expr,
        skip_on: bool,
    ) -> Result<(), Error> {
        if !has_effects(rhs) {
            return self.lower_effects(lhs);
        }
        match lhs.optimized_bool_const() {
            Some(decided) if decided == skip_on => self.lower_effects(lhs),
            Some(_) => {
                self.lower_effects(lhs)?;
                self.lower_effects(rhs)
            }
            None => {
                let skip = self.stream.fresh_label();
                if skip_on {
                    self.lower_cond(lhs, Some(skip), None)?;
                } else {
                    self.lower_cond(lhs, None, Some(skip))?;
                }
                self.lower_effects(rhs)?;
                self.stream.mark(skip)?;
                Ok(())
            }
        }
    }

    /// Materialize a boolean expression as 0/1 on the stack
    pub(super) fn lower_bool_value(&mut self, expr: &Expr) -> Result<(), Error> {
        if let Some(decided) = expr.optimized_bool_const() {
            self.lower_effects(expr)?;
            self.stream.emit(if decided {
                Instruction::IConst1
            } else {
                Instruction::IConst0
            })?;
            return Ok(());
        }

        let false_label = self.stream.fresh_label();
        let end = self.stream.fresh_label();
        self.lower_cond(expr, None, Some(false_label))?;
        self.stream.emit(Instruction::IConst1)?;
        self.stream.branch(BranchKind::Goto, end)?;
        self.stream.mark(false_label)?;
        self.stream.emit(Instruction::IConst0)?;
        self.stream.mark(end)?;
        Ok(())
    }

    pub(super) fn lower_const(&mut self, constant: &Const) -> Result<(), Error> {
        let insn = match constant {
            Const::Int(value) => int_constant_instruction(*value, self)?,
            Const::Boolean(false) => Instruction::IConst0,
            Const::Boolean(true) => Instruction::IConst1,
            Const::Long(0) => Instruction::LConst0,
            Const::Long(1) => Instruction::LConst1,
            Const::Long(value) => Instruction::Ldc2(self.pool.add_long(*value)?),
            Const::Float(value) => {
                if value.to_bits() == 0f32.to_bits() {
                    Instruction::FConst0
                } else if *value == 1.0 {
                    Instruction::FConst1
                } else if *value == 2.0 {
                    Instruction::FConst2
                } else {
                    Instruction::Ldc(self.pool.add_float(*value)?)
                }
            }
            Const::Double(value) => {
                if value.to_bits() == 0f64.to_bits() {
                    Instruction::DConst0
                } else if *value == 1.0 {
                    Instruction::DConst1
                } else {
                    Instruction::Ldc2(self.pool.add_double(*value)?)
                }
            }
            Const::Str(value) => Instruction::Ldc(self.pool.add_string(value)?),
            Const::Null => Instruction::AConstNull,
        };
        self.stream.emit(insn)?;
        Ok(())
    }

    /// Intern the pool and bootstrap entries for a lambda creation site
    ///
    /// Plain sites link through `LambdaMetafactory.metafactory`; serializable sites and sites
    /// with marker interfaces or bridges link through `altMetafactory`, whose trailing
    /// `Object[]` carries a flags word followed by the optional marker and bridge lists.
    fn lambda_call_site(&mut self, site: &LambdaSite) -> Result<InvokeDynamicIndex, Error> {
        use crate::jvm::LambdaFlags;

        let mut arguments = vec![
            self.pool.add_method_type(&site.erased.render())?,
            {
                let implementation = self.pool.add_methodref(
                    &site.implementation.class,
                    &site.implementation.name,
                    &site.implementation.descriptor.render(),
                    site.implementation.is_interface,
                )?;
                self.pool
                    .add_method_handle(site.implementation.kind, implementation.into())?
            },
            self.pool.add_method_type(&site.instantiated.render())?,
        ];

        let mut flags = LambdaFlags::empty();
        flags.set(LambdaFlags::SERIALIZABLE, site.serializable);
        flags.set(LambdaFlags::MARKERS, !site.markers.is_empty());
        flags.set(LambdaFlags::BRIDGES, !site.bridges.is_empty());

        let bootstrap_method = if flags.is_empty() {
            self.pool.add_methodref(
                "java/lang/invoke/LambdaMetafactory",
                "metafactory",
                METAFACTORY_DESCRIPTOR,
                false,
            )?
        } else {
            arguments.push(self.pool.add_integer(flags.bits())?);
            if flags.contains(LambdaFlags::MARKERS) {
                arguments.push(self.pool.add_integer(site.markers.len() as i32)?);
                for marker in &site.markers {
                    arguments.push(self.pool.add_class(marker)?.into());
                }
            }
            if flags.contains(LambdaFlags::BRIDGES) {
                arguments.push(self.pool.add_integer(site.bridges.len() as i32)?);
                for bridge in &site.bridges {
                    arguments.push(self.pool.add_method_type(&bridge.render())?);
                }
            }
            self.pool.add_methodref(
                "java/lang/invoke/LambdaMetafactory",
                "altMetafactory",
                ALT_METAFACTORY_DESCRIPTOR,
                false,
            )?
        };
        let handle = self
            .pool
            .add_method_handle(HandleKind::InvokeStatic, bootstrap_method.into())?;

        let bootstrap_index = self.bootstrap.add(BootstrapMethod {
            bootstrap_method: handle,
            arguments,
        })?;
        let name_and_type = self
            .pool
            .add_name_and_type(&site.method_name, &site.factory.render())?;
        self.pool.add_invoke_dynamic(bootstrap_index, name_and_type)
    }
}

/// Could evaluating this expression be observed (writes, calls, a possible
/// `ArithmeticException`)?
pub(super) fn has_effects(expr: &Expr) -> bool {
    match expr {
        Expr::Const(_) | Expr::Local { .. } => false,
        Expr::Assign { .. } | Expr::Call { .. } => true,
        Expr::Unary { operand, .. } => has_effects(operand),
        Expr::Binary {
            op: BinOp::Div | BinOp::Rem,
            lhs,
            rhs,
        } => throwing_division(lhs, rhs) || has_effects(lhs) || has_effects(rhs),
        Expr::Binary { lhs, rhs, .. } => has_effects(lhs) || has_effects(rhs),
        Expr::Conditional {
            condition,
            then_value,
            else_value,
        } => has_effects(condition) || has_effects(then_value) || has_effects(else_value),
        Expr::FieldGet { object, .. } => object.as_deref().map_or(false, has_effects),
        Expr::Lambda(site) => site.captures.iter().any(has_effects),
    }
}

/// Integral `/` or `%` whose divisor is not a known non-zero constant can throw
fn throwing_division(lhs: &Expr, rhs: &Expr) -> bool {
    let integral = !matches!(
        lhs.ty(),
        Some(FieldType::Base(BaseType::Float)) | Some(FieldType::Base(BaseType::Double))
    );
    let safe = match rhs.const_value() {
        Some(Const::Int(divisor)) => divisor != 0,
        Some(Const::Long(divisor)) => divisor != 0,
        _ => false,
    };
    integral && !safe
}

fn arithmetic_instruction(op: BinOp, operand_ty: &Option<FieldType>) -> Result<Instruction, Error> {
    let wide = matches!(
        operand_ty,
        Some(FieldType::Base(BaseType::Long)) | Some(FieldType::Base(BaseType::Double))
    );
    let float = matches!(operand_ty, Some(FieldType::Base(BaseType::Float)));
    let double = matches!(operand_ty, Some(FieldType::Base(BaseType::Double)));
    let long = wide && !double;

    let insn = match op {
        BinOp::Add if long => Instruction::LAdd,
        BinOp::Add if float => Instruction::FAdd,
        BinOp::Add if double => Instruction::DAdd,
        BinOp::Add => Instruction::IAdd,
        BinOp::Sub if long => Instruction::LSub,
        BinOp::Sub if float => Instruction::FSub,
        BinOp::Sub if double => Instruction::DSub,
        BinOp::Sub => Instruction::ISub,
        BinOp::Mul if long => Instruction::LMul,
        BinOp::Mul if float => Instruction::FMul,
        BinOp::Mul if double => Instruction::DMul,
        BinOp::Mul => Instruction::IMul,
        BinOp::Div if long => Instruction::LDiv,
        BinOp::Div if float => Instruction::FDiv,
        BinOp::Div if double => Instruction::DDiv,
        BinOp::Div => Instruction::IDiv,
        BinOp::Rem if long => Instruction::LRem,
        BinOp::Rem if float => Instruction::FRem,
        BinOp::Rem if double => Instruction::DRem,
        BinOp::Rem => Instruction::IRem,
        BinOp::Shl if long => Instruction::LSh(ShiftType::Left),
        BinOp::Shl => Instruction::ISh(ShiftType::Left),
        BinOp::Shr if long => Instruction::LSh(ShiftType::ArithmeticRight),
        BinOp::Shr => Instruction::ISh(ShiftType::ArithmeticRight),
        BinOp::UShr if long => Instruction::LSh(ShiftType::LogicalRight),
        BinOp::UShr => Instruction::ISh(ShiftType::LogicalRight),
        BinOp::And if long => Instruction::LAnd,
        BinOp::And => Instruction::IAnd,
        BinOp::Or if long => Instruction::LOr,
        BinOp::Or => Instruction::IOr,
        BinOp::Xor if long => Instruction::LXor,
        BinOp::Xor => Instruction::IXor,
        BinOp::Eq
        | BinOp::Ne
        | BinOp::Lt
        | BinOp::Ge
        | BinOp::Gt
        | BinOp::Le
        | BinOp::AndAnd
        | BinOp::OrOr => unreachable!("comparisons lower through the condition translator"),
    };
    Ok(insn)
}

fn int_constant_instruction(value: i32, lowerer: &mut Lowerer<'_>) -> Result<Instruction, Error> {
    Ok(match value {
        -1 => Instruction::IConstM1,
        0 => Instruction::IConst0,
        1 => Instruction::IConst1,
        2 => Instruction::IConst2,
        3 => Instruction::IConst3,
        4 => Instruction::IConst4,
        5 => Instruction::IConst5,
        _ => {
            if let Ok(value) = i8::try_from(value) {
                Instruction::BiPush(value)
            } else if let Ok(value) = i16::try_from(value) {
                Instruction::SiPush(value)
            } else {
                Instruction::Ldc(lowerer.pool.add_integer(value)?)
            }
        }
    })
}
