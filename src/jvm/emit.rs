use byteorder::{BigEndian, WriteBytesExt};
use std::io::Result;

/// Binary output trait for class-file data
///
/// Everything in a class file is big-endian, tags are single bytes, and sequences are almost
/// always prefixed with a `u16` length. That is peculiar enough to warrant a small local trait
/// instead of a general serialization framework.
pub trait Emit {
    /// Write the construct to a binary output stream
    fn emit<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()>;
}

macro_rules! emit_numeric {
    ($($typ:ty => $write:ident),+ $(,)?) => {
        $(impl Emit for $typ {
            fn emit<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
                writer.$write::<BigEndian>(*self)
            }
        })+
    };
}

impl Emit for u8 {
    fn emit<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(*self)
    }
}

impl Emit for i8 {
    fn emit<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_i8(*self)
    }
}

emit_numeric! {
    u16 => write_u16,
    u32 => write_u32,
    i16 => write_i16,
    i32 => write_i32,
    i64 => write_i64,
    f32 => write_f32,
    f64 => write_f64,
}

/// Sequences emit their `u16` length first
impl<A: Emit> Emit for Vec<A> {
    fn emit<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        (self.len() as u16).emit(writer)?;
        for elem in self {
            elem.emit(writer)?;
        }
        Ok(())
    }
}
