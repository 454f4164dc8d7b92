//! The resolved method-body trees the emitter consumes
//!
//! Everything here has already been through name resolution and type checking: locals carry
//! their slot numbers, member references carry binary names and descriptors, and every
//! expression's type is recoverable without an environment. The emitter trusts these trees;
//! malformed input surfaces as an invariant-violation [`Error`](crate::errors::Error), not as
//! a diagnostic.

use crate::code::InvokeKind;
use crate::jvm::{FieldType, HandleKind, MethodAccessFlags, MethodDescriptor};

/// A compile-time constant value
#[derive(Clone, PartialEq, Debug)]
pub enum Const {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Boolean(bool),
    Str(String),
    Null,
}

impl Const {
    pub fn ty(&self) -> FieldType {
        match self {
            Const::Int(_) => FieldType::INT,
            Const::Long(_) => FieldType::LONG,
            Const::Float(_) => FieldType::FLOAT,
            Const::Double(_) => FieldType::DOUBLE,
            Const::Boolean(_) => FieldType::BOOLEAN,
            Const::Str(_) => FieldType::object("java/lang/String"),
            Const::Null => FieldType::object("java/lang/Object"),
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum UnOp {
    /// Arithmetic negation
    Neg,
    /// Boolean complement
    Not,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    UShr,

    /// Eager bitwise (or boolean) and
    And,
    /// Eager bitwise (or boolean) or
    Or,
    Xor,

    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,

    /// Short-circuit and
    AndAnd,
    /// Short-circuit or
    OrOr,
}

/// Reference to a resolved field
#[derive(Clone, PartialEq, Debug)]
pub struct FieldRef {
    pub class: String,
    pub name: String,
    pub ty: FieldType,
}

/// Reference to a resolved method
#[derive(Clone, PartialEq, Debug)]
pub struct MethodRef {
    pub class: String,
    pub name: String,
    pub descriptor: MethodDescriptor,
    pub is_interface: bool,
}

/// A method handle, as used for lambda implementation methods
#[derive(Clone, PartialEq, Debug)]
pub struct Handle {
    pub kind: HandleKind,
    pub class: String,
    pub name: String,
    pub descriptor: MethodDescriptor,
    pub is_interface: bool,
}

/// An `invokedynamic` lambda (or method reference) creation site
///
/// The shapes follow `LambdaMetafactory`: the factory descriptor takes the captured values and
/// returns the functional interface, `erased` is the interface method's erased signature, and
/// `instantiated` its signature at this site. Serializable lambdas and sites with marker
/// interfaces or bridges link through `altMetafactory` instead of `metafactory`.
#[derive(Clone, PartialEq, Debug)]
pub struct LambdaSite {
    pub interface: String,
    pub method_name: String,
    pub factory: MethodDescriptor,
    pub erased: MethodDescriptor,
    pub implementation: Handle,
    pub instantiated: MethodDescriptor,
    pub serializable: bool,
    pub markers: Vec<String>,
    pub bridges: Vec<MethodDescriptor>,
    pub captures: Vec<Expr>,
}

#[derive(Clone, PartialEq, Debug)]
pub enum Expr {
    Const(Const),

    /// Read of a local variable
    Local { slot: u16, ty: FieldType },

    /// Assignment to a local; as an expression its value is the assigned value
    Assign {
        slot: u16,
        ty: FieldType,
        value: Box<Expr>,
    },

    Unary {
        op: UnOp,
        operand: Box<Expr>,
    },

    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },

    /// Ternary `?:`
    Conditional {
        condition: Box<Expr>,
        then_value: Box<Expr>,
        else_value: Box<Expr>,
    },

    /// Field read; `object` is `None` for static fields
    FieldGet {
        object: Option<Box<Expr>>,
        field: FieldRef,
    },

    /// Method call; `receiver` is `None` exactly for static calls
    Call {
        invoke: InvokeKind,
        receiver: Option<Box<Expr>>,
        method: MethodRef,
        args: Vec<Expr>,
    },

    Lambda(LambdaSite),
}

impl Expr {
    /// Type of the expression (`None` for a `void` call)
    pub fn ty(&self) -> Option<FieldType> {
        match self {
            Expr::Const(constant) => Some(constant.ty()),
            Expr::Local { ty, .. } => Some(ty.clone()),
            Expr::Assign { ty, .. } => Some(ty.clone()),
            Expr::Unary { op: UnOp::Not, .. } => Some(FieldType::BOOLEAN),
            Expr::Unary { op: UnOp::Neg, operand } => operand.ty(),
            Expr::Binary { op, lhs, .. } => match op {
                BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Ge | BinOp::Gt | BinOp::Le
                | BinOp::AndAnd | BinOp::OrOr => Some(FieldType::BOOLEAN),
                _ => lhs.ty(),
            },
            Expr::Conditional { then_value, .. } => then_value.ty(),
            Expr::FieldGet { field, .. } => Some(field.ty.clone()),
            Expr::Call { method, .. } => method.descriptor.return_type.clone(),
            Expr::Lambda(site) => Some(FieldType::object(site.interface.clone())),
        }
    }

    /// Formal compile-time constant value of this expression, if it has one
    ///
    /// Folding covers integral arithmetic (wrapping, like the target machine), integral and
    /// boolean comparisons, and the boolean connectives. Division by a constant zero is *not*
    /// constant (it throws at the original expression's position). Floating-point expressions
    /// are never folded here.
    pub fn const_value(&self) -> Option<Const> {
        match self {
            Expr::Const(constant) => Some(constant.clone()),
            Expr::Unary { op, operand } => match (op, operand.const_value()?) {
                (UnOp::Not, Const::Boolean(b)) => Some(Const::Boolean(!b)),
                (UnOp::Neg, Const::Int(i)) => Some(Const::Int(i.wrapping_neg())),
                (UnOp::Neg, Const::Long(l)) => Some(Const::Long(l.wrapping_neg())),
                _ => None,
            },
            Expr::Binary { op, lhs, rhs } => {
                fold_binary(*op, lhs.const_value()?, rhs.const_value()?)
            }
            _ => None,
        }
    }

    /// The *optimized* boolean constant: the branch-level value of a condition whose outcome
    /// is decided even though the expression is not a formal constant
    ///
    /// `a && false` is decided (false) for any `a`; so is `a & false`, `a || true`, and their
    /// complements under `!`. The operand that decides the outcome may still require
    /// evaluation for side effects, which is the caller's concern.
    pub fn optimized_bool_const(&self) -> Option<bool> {
        if let Some(Const::Boolean(b)) = self.const_value() {
            return Some(b);
        }
        match self {
            Expr::Unary { op: UnOp::Not, operand } => {
                operand.optimized_bool_const().map(|b| !b)
            }
            Expr::Binary { op, lhs, rhs } => {
                if lhs.ty() != Some(FieldType::BOOLEAN) {
                    return None;
                }
                let lhs = lhs.optimized_bool_const();
                let rhs = rhs.optimized_bool_const();
                match op {
                    BinOp::AndAnd | BinOp::And => match (lhs, rhs) {
                        (Some(false), _) | (_, Some(false)) => Some(false),
                        (Some(true), other) | (other, Some(true)) => other,
                        _ => None,
                    },
                    BinOp::OrOr | BinOp::Or => match (lhs, rhs) {
                        (Some(true), _) | (_, Some(true)) => Some(true),
                        (Some(false), other) | (other, Some(false)) => other,
                        _ => None,
                    },
                    BinOp::Xor => Some(lhs? ^ rhs?),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

fn fold_binary(op: BinOp, lhs: Const, rhs: Const) -> Option<Const> {
    use Const::*;
    match (lhs, rhs) {
        (Int(a), Int(b)) => match op {
            BinOp::Add => Some(Int(a.wrapping_add(b))),
            BinOp::Sub => Some(Int(a.wrapping_sub(b))),
            BinOp::Mul => Some(Int(a.wrapping_mul(b))),
            BinOp::Div if b != 0 => Some(Int(a.wrapping_div(b))),
            BinOp::Rem if b != 0 => Some(Int(a.wrapping_rem(b))),
            BinOp::Shl => Some(Int(a.wrapping_shl(b as u32 & 31))),
            BinOp::Shr => Some(Int(a.wrapping_shr(b as u32 & 31))),
            BinOp::UShr => Some(Int(((a as u32).wrapping_shr(b as u32 & 31)) as i32)),
            BinOp::And => Some(Int(a & b)),
            BinOp::Or => Some(Int(a | b)),
            BinOp::Xor => Some(Int(a ^ b)),
            BinOp::Eq => Some(Boolean(a == b)),
            BinOp::Ne => Some(Boolean(a != b)),
            BinOp::Lt => Some(Boolean(a < b)),
            BinOp::Ge => Some(Boolean(a >= b)),
            BinOp::Gt => Some(Boolean(a > b)),
            BinOp::Le => Some(Boolean(a <= b)),
            _ => None,
        },
        (Long(a), Long(b)) => match op {
            BinOp::Add => Some(Long(a.wrapping_add(b))),
            BinOp::Sub => Some(Long(a.wrapping_sub(b))),
            BinOp::Mul => Some(Long(a.wrapping_mul(b))),
            BinOp::Div if b != 0 => Some(Long(a.wrapping_div(b))),
            BinOp::Rem if b != 0 => Some(Long(a.wrapping_rem(b))),
            BinOp::And => Some(Long(a & b)),
            BinOp::Or => Some(Long(a | b)),
            BinOp::Xor => Some(Long(a ^ b)),
            BinOp::Eq => Some(Boolean(a == b)),
            BinOp::Ne => Some(Boolean(a != b)),
            BinOp::Lt => Some(Boolean(a < b)),
            BinOp::Ge => Some(Boolean(a >= b)),
            BinOp::Gt => Some(Boolean(a > b)),
            BinOp::Le => Some(Boolean(a <= b)),
            _ => None,
        },
        (Long(a), Int(b)) => match op {
            BinOp::Shl => Some(Long(a.wrapping_shl(b as u32 & 63))),
            BinOp::Shr => Some(Long(a.wrapping_shr(b as u32 & 63))),
            BinOp::UShr => Some(Long(((a as u64).wrapping_shr(b as u32 & 63)) as i64)),
            _ => None,
        },
        (Boolean(a), Boolean(b)) => match op {
            BinOp::And | BinOp::AndAnd => Some(Boolean(a && b)),
            BinOp::Or | BinOp::OrOr => Some(Boolean(a || b)),
            BinOp::Xor => Some(Boolean(a ^ b)),
            BinOp::Eq => Some(Boolean(a == b)),
            BinOp::Ne => Some(Boolean(a != b)),
            _ => None,
        },
        _ => None,
    }
}

/// One statement, with the source line it starts on (when known)
#[derive(Clone, PartialEq, Debug)]
pub struct Statement {
    pub line: Option<u16>,
    pub kind: StatementKind,
}

impl Statement {
    pub fn new(kind: StatementKind) -> Statement {
        Statement { line: None, kind }
    }

    pub fn at_line(line: u16, kind: StatementKind) -> Statement {
        Statement {
            line: Some(line),
            kind,
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
pub enum StatementKind {
    /// Expression evaluated for its side effects
    Expr(Expr),

    /// Local variable declaration; the slot was assigned during resolution
    Declare {
        slot: u16,
        name: String,
        ty: FieldType,
        init: Option<Expr>,
    },

    Block(Vec<Statement>),

    If {
        condition: Expr,
        then_branch: Box<Statement>,
        else_branch: Option<Box<Statement>>,
    },

    While {
        condition: Expr,
        body: Box<Statement>,
    },

    DoWhile {
        body: Box<Statement>,
        condition: Expr,
    },

    Return(Option<Expr>),
    Break,
    Continue,
    Throw(Expr),

    Try {
        body: Box<Statement>,
        catches: Vec<Catch>,
        finally: Option<Box<Statement>>,
    },
}

/// One `catch` clause of a `try`
#[derive(Clone, PartialEq, Debug)]
pub struct Catch {
    /// Binary name of the caught class
    pub class: String,
    pub slot: u16,
    pub name: String,
    pub body: Statement,
}

/// How `finally` blocks are emitted
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum FinallyStrategy {
    /// Inline a copy of the handler on every exit edge (the modern scheme)
    Duplicate,

    /// `jsr`/`astore`/`ret` subroutines, for pre-1.6 class files
    Subroutine,
}

/// A resolved method ready for emission
#[derive(Clone, PartialEq, Debug)]
pub struct MethodSpec {
    pub access_flags: MethodAccessFlags,
    pub name: String,
    pub descriptor: MethodDescriptor,
    pub body: Vec<Statement>,
    pub finally_strategy: FinallyStrategy,
}

impl MethodSpec {
    /// Local slots occupied by `this` (if any) and the declared parameters
    pub fn parameter_slots(&self) -> u16 {
        let this = if self.access_flags.contains(MethodAccessFlags::STATIC) {
            0
        } else {
            1
        };
        this + self.descriptor.parameter_width()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn int(value: i32) -> Expr {
        Expr::Const(Const::Int(value))
    }

    fn local(slot: u16) -> Expr {
        Expr::Local {
            slot,
            ty: FieldType::INT,
        }
    }

    fn bin(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    #[test]
    fn integral_folding() {
        assert_eq!(
            bin(BinOp::Mul, int(6), int(7)).const_value(),
            Some(Const::Int(42))
        );
        assert_eq!(bin(BinOp::Div, int(1), int(0)).const_value(), None);
        assert_eq!(
            bin(BinOp::Lt, int(1), int(2)).const_value(),
            Some(Const::Boolean(true))
        );
    }

    #[test]
    fn optimized_constant_sees_through_non_constant_operands() {
        let i_eq_6 = bin(BinOp::Eq, local(1), int(6));
        assert_eq!(i_eq_6.const_value(), None);

        let and_false = bin(BinOp::AndAnd, i_eq_6.clone(), Expr::Const(Const::Boolean(false)));
        assert_eq!(and_false.const_value(), None);
        assert_eq!(and_false.optimized_bool_const(), Some(false));

        let or_true = bin(BinOp::OrOr, i_eq_6.clone(), Expr::Const(Const::Boolean(true)));
        assert_eq!(or_true.optimized_bool_const(), Some(true));

        let and_var = bin(BinOp::AndAnd, i_eq_6, Expr::Const(Const::Boolean(true)));
        assert_eq!(and_var.optimized_bool_const(), None);
    }

    #[test]
    fn negation_inverts_the_optimized_constant() {
        let decided = bin(
            BinOp::OrOr,
            bin(BinOp::Eq, local(1), int(0)),
            Expr::Const(Const::Boolean(true)),
        );
        let negated = Expr::Unary {
            op: UnOp::Not,
            operand: Box::new(decided),
        };
        assert_eq!(negated.optimized_bool_const(), Some(false));
    }
}
