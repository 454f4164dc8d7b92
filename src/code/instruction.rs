use crate::jvm::{ConstantIndex, FieldRefIndex, InvokeDynamicIndex, MethodRefIndex};
use std::ops::Not;

/// Non-branching JVM instructions
///
/// Only the instructions the lowering pass produces are represented. Branches are not in this
/// enum: their encoding depends on label resolution, so they go through
/// [`CodeStream::branch`](crate::code::CodeStream::branch) as a [`BranchKind`] instead.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-6.html
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum Instruction {
    Nop,

    AConstNull,
    IConstM1,
    IConst0,
    IConst1,
    IConst2,
    IConst3,
    IConst4,
    IConst5,
    LConst0,
    LConst1,
    FConst0,
    FConst1,
    FConst2,
    DConst0,
    DConst1,
    BiPush(i8),
    SiPush(i16),

    /// `ldc` or `ldc_w`, depending on the index
    Ldc(ConstantIndex),

    /// `ldc2_w` (the only form for `long`/`double` constants)
    Ldc2(ConstantIndex),

    ILoad(u16),
    LLoad(u16),
    FLoad(u16),
    DLoad(u16),
    ALoad(u16),
    IStore(u16),
    LStore(u16),
    FStore(u16),
    DStore(u16),
    AStore(u16),
    IInc(u16, i16),

    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Swap,

    IAdd,
    LAdd,
    FAdd,
    DAdd,
    ISub,
    LSub,
    FSub,
    DSub,
    IMul,
    LMul,
    FMul,
    DMul,
    IDiv,
    LDiv,
    FDiv,
    DDiv,
    IRem,
    LRem,
    FRem,
    DRem,
    INeg,
    LNeg,
    FNeg,
    DNeg,
    ISh(ShiftType),
    LSh(ShiftType),
    IAnd,
    LAnd,
    IOr,
    LOr,
    IXor,
    LXor,

    LCmp,
    FCmp(CompareMode),
    DCmp(CompareMode),

    GetStatic { field: FieldRefIndex, width: u16 },
    PutStatic { field: FieldRefIndex, width: u16 },
    GetField { field: FieldRefIndex, width: u16 },
    PutField { field: FieldRefIndex, width: u16 },

    Invoke {
        kind: InvokeKind,
        method: MethodRefIndex,
        /// Slots taken by the declared arguments (receiver not included)
        args_width: u16,
        return_width: u16,
    },
    InvokeDynamic {
        call_site: InvokeDynamicIndex,
        args_width: u16,
        return_width: u16,
    },

    IReturn,
    LReturn,
    FReturn,
    DReturn,
    AReturn,
    Return,
    AThrow,

    /// Return from a `jsr` subroutine through the return address in a local
    Ret(u16),
}

/// Write a local load or store, picking the shortest form
///
/// Slots 0-3 have dedicated one-byte opcodes, slots 4-255 use the two-byte form, and anything
/// above that needs a `wide` prefix.
fn encode_load_or_store(short_base: u8, general: u8, slot: u16, code: &mut Vec<u8>) {
    if slot < 4 {
        code.push(short_base + slot as u8);
    } else if slot < 256 {
        code.push(general);
        code.push(slot as u8);
    } else {
        code.push(0xc4);
        code.push(general);
        code.extend_from_slice(&slot.to_be_bytes());
    }
}

impl Instruction {
    /// Append the encoded instruction to a code buffer
    pub fn encode(&self, code: &mut Vec<u8>) {
        match *self {
            Instruction::Nop => code.push(0x00),
            Instruction::AConstNull => code.push(0x01),
            Instruction::IConstM1 => code.push(0x02),
            Instruction::IConst0 => code.push(0x03),
            Instruction::IConst1 => code.push(0x04),
            Instruction::IConst2 => code.push(0x05),
            Instruction::IConst3 => code.push(0x06),
            Instruction::IConst4 => code.push(0x07),
            Instruction::IConst5 => code.push(0x08),
            Instruction::LConst0 => code.push(0x09),
            Instruction::LConst1 => code.push(0x0a),
            Instruction::FConst0 => code.push(0x0b),
            Instruction::FConst1 => code.push(0x0c),
            Instruction::FConst2 => code.push(0x0d),
            Instruction::DConst0 => code.push(0x0e),
            Instruction::DConst1 => code.push(0x0f),
            Instruction::BiPush(byte) => {
                code.push(0x10);
                code.push(byte as u8);
            }
            Instruction::SiPush(short) => {
                code.push(0x11);
                code.extend_from_slice(&short.to_be_bytes());
            }
            Instruction::Ldc(index) => {
                if index.0 < 256 {
                    code.push(0x12);
                    code.push(index.0 as u8);
                } else {
                    code.push(0x13);
                    code.extend_from_slice(&index.0.to_be_bytes());
                }
            }
            Instruction::Ldc2(index) => {
                code.push(0x14);
                code.extend_from_slice(&index.0.to_be_bytes());
            }

            Instruction::ILoad(slot) => encode_load_or_store(0x1a, 0x15, slot, code),
            Instruction::LLoad(slot) => encode_load_or_store(0x1e, 0x16, slot, code),
            Instruction::FLoad(slot) => encode_load_or_store(0x22, 0x17, slot, code),
            Instruction::DLoad(slot) => encode_load_or_store(0x26, 0x18, slot, code),
            Instruction::ALoad(slot) => encode_load_or_store(0x2a, 0x19, slot, code),
            Instruction::IStore(slot) => encode_load_or_store(0x3b, 0x36, slot, code),
            Instruction::LStore(slot) => encode_load_or_store(0x3f, 0x37, slot, code),
            Instruction::FStore(slot) => encode_load_or_store(0x43, 0x38, slot, code),
            Instruction::DStore(slot) => encode_load_or_store(0x47, 0x39, slot, code),
            Instruction::AStore(slot) => encode_load_or_store(0x4b, 0x3a, slot, code),
            Instruction::IInc(slot, amount) => {
                if slot < 256 && i8::try_from(amount).is_ok() {
                    code.push(0x84);
                    code.push(slot as u8);
                    code.push(amount as u8);
                } else {
                    code.push(0xc4);
                    code.push(0x84);
                    code.extend_from_slice(&slot.to_be_bytes());
                    code.extend_from_slice(&amount.to_be_bytes());
                }
            }

            Instruction::Pop => code.push(0x57),
            Instruction::Pop2 => code.push(0x58),
            Instruction::Dup => code.push(0x59),
            Instruction::DupX1 => code.push(0x5a),
            Instruction::DupX2 => code.push(0x5b),
            Instruction::Dup2 => code.push(0x5c),
            Instruction::Swap => code.push(0x5f),

            Instruction::IAdd => code.push(0x60),
            Instruction::LAdd => code.push(0x61),
            Instruction::FAdd => code.push(0x62),
            Instruction::DAdd => code.push(0x63),
            Instruction::ISub => code.push(0x64),
            Instruction::LSub => code.push(0x65),
            Instruction::FSub => code.push(0x66),
            Instruction::DSub => code.push(0x67),
            Instruction::IMul => code.push(0x68),
            Instruction::LMul => code.push(0x69),
            Instruction::FMul => code.push(0x6a),
            Instruction::DMul => code.push(0x6b),
            Instruction::IDiv => code.push(0x6c),
            Instruction::LDiv => code.push(0x6d),
            Instruction::FDiv => code.push(0x6e),
            Instruction::DDiv => code.push(0x6f),
            Instruction::IRem => code.push(0x70),
            Instruction::LRem => code.push(0x71),
            Instruction::FRem => code.push(0x72),
            Instruction::DRem => code.push(0x73),
            Instruction::INeg => code.push(0x74),
            Instruction::LNeg => code.push(0x75),
            Instruction::FNeg => code.push(0x76),
            Instruction::DNeg => code.push(0x77),
            Instruction::ISh(shift) => code.push(match shift {
                ShiftType::Left => 0x78,
                ShiftType::ArithmeticRight => 0x7a,
                ShiftType::LogicalRight => 0x7c,
            }),
            Instruction::LSh(shift) => code.push(match shift {
                ShiftType::Left => 0x79,
                ShiftType::ArithmeticRight => 0x7b,
                ShiftType::LogicalRight => 0x7d,
            }),
            Instruction::IAnd => code.push(0x7e),
            Instruction::LAnd => code.push(0x7f),
            Instruction::IOr => code.push(0x80),
            Instruction::LOr => code.push(0x81),
            Instruction::IXor => code.push(0x82),
            Instruction::LXor => code.push(0x83),

            Instruction::LCmp => code.push(0x94),
            Instruction::FCmp(CompareMode::L) => code.push(0x95),
            Instruction::FCmp(CompareMode::G) => code.push(0x96),
            Instruction::DCmp(CompareMode::L) => code.push(0x97),
            Instruction::DCmp(CompareMode::G) => code.push(0x98),

            Instruction::GetStatic { field, .. } => {
                code.push(0xb2);
                code.extend_from_slice(&(field.0).0.to_be_bytes());
            }
            Instruction::PutStatic { field, .. } => {
                code.push(0xb3);
                code.extend_from_slice(&(field.0).0.to_be_bytes());
            }
            Instruction::GetField { field, .. } => {
                code.push(0xb4);
                code.extend_from_slice(&(field.0).0.to_be_bytes());
            }
            Instruction::PutField { field, .. } => {
                code.push(0xb5);
                code.extend_from_slice(&(field.0).0.to_be_bytes());
            }

            Instruction::Invoke {
                kind,
                method,
                args_width,
                ..
            } => {
                code.push(match kind {
                    InvokeKind::Virtual => 0xb6,
                    InvokeKind::Special => 0xb7,
                    InvokeKind::Static => 0xb8,
                    InvokeKind::Interface => 0xb9,
                });
                code.extend_from_slice(&(method.0).0.to_be_bytes());
                if kind == InvokeKind::Interface {
                    // Historical operands: argument slot count (receiver included), then zero
                    code.push(1 + args_width as u8);
                    code.push(0);
                }
            }
            Instruction::InvokeDynamic { call_site, .. } => {
                code.push(0xba);
                code.extend_from_slice(&(call_site.0).0.to_be_bytes());
                code.push(0);
                code.push(0);
            }

            Instruction::IReturn => code.push(0xac),
            Instruction::LReturn => code.push(0xad),
            Instruction::FReturn => code.push(0xae),
            Instruction::DReturn => code.push(0xaf),
            Instruction::AReturn => code.push(0xb0),
            Instruction::Return => code.push(0xb1),
            Instruction::AThrow => code.push(0xbf),

            Instruction::Ret(slot) => {
                if slot < 256 {
                    code.push(0xa9);
                    code.push(slot as u8);
                } else {
                    code.push(0xc4);
                    code.push(0xa9);
                    code.extend_from_slice(&slot.to_be_bytes());
                }
            }
        }
    }

    /// Operand stack slots this instruction pops and pushes
    pub fn stack_effect(&self) -> (u16, u16) {
        match *self {
            Instruction::Nop | Instruction::IInc(_, _) | Instruction::Return | Instruction::Ret(_) => (0, 0),

            Instruction::AConstNull
            | Instruction::IConstM1
            | Instruction::IConst0
            | Instruction::IConst1
            | Instruction::IConst2
            | Instruction::IConst3
            | Instruction::IConst4
            | Instruction::IConst5
            | Instruction::FConst0
            | Instruction::FConst1
            | Instruction::FConst2
            | Instruction::BiPush(_)
            | Instruction::SiPush(_)
            | Instruction::Ldc(_) => (0, 1),
            Instruction::LConst0
            | Instruction::LConst1
            | Instruction::DConst0
            | Instruction::DConst1
            | Instruction::Ldc2(_) => (0, 2),

            Instruction::ILoad(_) | Instruction::FLoad(_) | Instruction::ALoad(_) => (0, 1),
            Instruction::LLoad(_) | Instruction::DLoad(_) => (0, 2),
            Instruction::IStore(_) | Instruction::FStore(_) | Instruction::AStore(_) => (1, 0),
            Instruction::LStore(_) | Instruction::DStore(_) => (2, 0),

            Instruction::Pop => (1, 0),
            Instruction::Pop2 => (2, 0),
            Instruction::Dup => (1, 2),
            Instruction::DupX1 => (2, 3),
            Instruction::DupX2 => (3, 4),
            Instruction::Dup2 => (2, 4),
            Instruction::Swap => (2, 2),

            Instruction::IAdd
            | Instruction::ISub
            | Instruction::IMul
            | Instruction::IDiv
            | Instruction::IRem
            | Instruction::IAnd
            | Instruction::IOr
            | Instruction::IXor
            | Instruction::ISh(_)
            | Instruction::FAdd
            | Instruction::FSub
            | Instruction::FMul
            | Instruction::FDiv
            | Instruction::FRem => (2, 1),
            Instruction::LAdd
            | Instruction::LSub
            | Instruction::LMul
            | Instruction::LDiv
            | Instruction::LRem
            | Instruction::LAnd
            | Instruction::LOr
            | Instruction::LXor
            | Instruction::DAdd
            | Instruction::DSub
            | Instruction::DMul
            | Instruction::DDiv
            | Instruction::DRem => (4, 2),
            Instruction::LSh(_) => (3, 2),
            Instruction::INeg | Instruction::FNeg => (1, 1),
            Instruction::LNeg | Instruction::DNeg => (2, 2),

            Instruction::LCmp | Instruction::DCmp(_) => (4, 1),
            Instruction::FCmp(_) => (2, 1),

            Instruction::GetStatic { width, .. } => (0, width),
            Instruction::PutStatic { width, .. } => (width, 0),
            Instruction::GetField { width, .. } => (1, width),
            Instruction::PutField { width, .. } => (1 + width, 0),

            Instruction::Invoke {
                kind,
                args_width,
                return_width,
                ..
            } => {
                let receiver = if kind == InvokeKind::Static { 0 } else { 1 };
                (receiver + args_width, return_width)
            }
            Instruction::InvokeDynamic {
                args_width,
                return_width,
                ..
            } => (args_width, return_width),

            Instruction::IReturn | Instruction::FReturn | Instruction::AReturn | Instruction::AThrow => (1, 0),
            Instruction::LReturn | Instruction::DReturn => (2, 0),
        }
    }

    /// Local slot this instruction reads or writes, with the value's width
    pub fn local_use(&self) -> Option<(u16, u16)> {
        match *self {
            Instruction::ILoad(slot)
            | Instruction::FLoad(slot)
            | Instruction::ALoad(slot)
            | Instruction::IStore(slot)
            | Instruction::FStore(slot)
            | Instruction::AStore(slot)
            | Instruction::IInc(slot, _)
            | Instruction::Ret(slot) => Some((slot, 1)),
            Instruction::LLoad(slot)
            | Instruction::DLoad(slot)
            | Instruction::LStore(slot)
            | Instruction::DStore(slot) => Some((slot, 2)),
            _ => None,
        }
    }

    /// Does execution never continue to the following instruction?
    pub fn ends_flow(&self) -> bool {
        matches!(
            self,
            Instruction::IReturn
                | Instruction::LReturn
                | Instruction::FReturn
                | Instruction::DReturn
                | Instruction::AReturn
                | Instruction::Return
                | Instruction::AThrow
                | Instruction::Ret(_)
        )
    }
}

/// Conditional branches, `goto`, and `jsr`
///
/// The target label and final encoding (including `goto` vs. `goto_w` widening) are handled by
/// the code stream.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum BranchKind {
    /// `ifeq`/`ifne`/`iflt`/`ifge`/`ifgt`/`ifle`: compare an `int` against zero
    If(OrdComparison),

    /// `if_icmpXX`: compare two `int`s
    IfICmp(OrdComparison),

    /// `if_acmpeq`/`if_acmpne`: reference identity
    IfACmp(EqComparison),

    /// `ifnull`/`ifnonnull`
    IfNull(EqComparison),

    Goto,
    Jsr,
}

impl BranchKind {
    pub fn opcode(&self) -> u8 {
        match self {
            BranchKind::If(OrdComparison::EQ) => 0x99,
            BranchKind::If(OrdComparison::NE) => 0x9a,
            BranchKind::If(OrdComparison::LT) => 0x9b,
            BranchKind::If(OrdComparison::GE) => 0x9c,
            BranchKind::If(OrdComparison::GT) => 0x9d,
            BranchKind::If(OrdComparison::LE) => 0x9e,
            BranchKind::IfICmp(OrdComparison::EQ) => 0x9f,
            BranchKind::IfICmp(OrdComparison::NE) => 0xa0,
            BranchKind::IfICmp(OrdComparison::LT) => 0xa1,
            BranchKind::IfICmp(OrdComparison::GE) => 0xa2,
            BranchKind::IfICmp(OrdComparison::GT) => 0xa3,
            BranchKind::IfICmp(OrdComparison::LE) => 0xa4,
            BranchKind::IfACmp(EqComparison::EQ) => 0xa5,
            BranchKind::IfACmp(EqComparison::NE) => 0xa6,
            BranchKind::IfNull(EqComparison::EQ) => 0xc6,
            BranchKind::IfNull(EqComparison::NE) => 0xc7,
            BranchKind::Goto => 0xa7,
            BranchKind::Jsr => 0xa8,
        }
    }

    /// Operand stack slots the branch pops before jumping (or falling through)
    pub fn pops(&self) -> u16 {
        match self {
            BranchKind::If(_) | BranchKind::IfNull(_) => 1,
            BranchKind::IfICmp(_) | BranchKind::IfACmp(_) => 2,
            BranchKind::Goto | BranchKind::Jsr => 0,
        }
    }

    /// Is this an unconditional jump (no fall-through)?
    pub fn is_unconditional(&self) -> bool {
        matches!(self, BranchKind::Goto)
    }
}

/// Branch conditions on values admitting a full ordering
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum OrdComparison {
    EQ,
    NE,
    LT,
    GE,
    GT,
    LE,
}

/// Negation corresponds to branch inversion
impl Not for OrdComparison {
    type Output = OrdComparison;

    fn not(self) -> OrdComparison {
        match self {
            OrdComparison::EQ => OrdComparison::NE,
            OrdComparison::NE => OrdComparison::EQ,
            OrdComparison::LT => OrdComparison::GE,
            OrdComparison::GE => OrdComparison::LT,
            OrdComparison::GT => OrdComparison::LE,
            OrdComparison::LE => OrdComparison::GT,
        }
    }
}

impl OrdComparison {
    /// Comparison as seen with its operands swapped (`0 < x` is `x > 0`)
    pub fn flip(self) -> OrdComparison {
        match self {
            OrdComparison::LT => OrdComparison::GT,
            OrdComparison::GT => OrdComparison::LT,
            OrdComparison::LE => OrdComparison::GE,
            OrdComparison::GE => OrdComparison::LE,
            other => other,
        }
    }
}

/// Branch conditions on values admitting only an equality check
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum EqComparison {
    EQ,
    NE,
}

impl Not for EqComparison {
    type Output = EqComparison;

    fn not(self) -> EqComparison {
        match self {
            EqComparison::EQ => EqComparison::NE,
            EqComparison::NE => EqComparison::EQ,
        }
    }
}

/// `fcmpl`/`fcmpg` (and the `dcmp` pair) differ only in how they rank NaN
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum CompareMode {
    /// NaN compares as greater (use when branching on `<`/`<=`)
    G,
    /// NaN compares as less (use when branching on `>`/`>=`/`==`/`!=`)
    L,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ShiftType {
    Left,
    ArithmeticRight,
    LogicalRight,
}

/// Dispatch convention of a method call
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum InvokeKind {
    Virtual,
    Special,
    Static,
    Interface,
}
