use crate::errors::Error;
use crate::jvm::{BootstrapMethod, ClassIndex, ConstantPool, Emit, Utf8Index};
use byteorder::WriteBytesExt;

/// Attribute in its final form: a name index and an opaque payload
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7
#[derive(Debug)]
pub struct Attribute {
    pub name: Utf8Index,
    pub info: Vec<u8>,
}

impl Attribute {
    /// Serialize a structured attribute into its opaque form, interning its name
    pub fn new<A: AttributeLike>(pool: &mut ConstantPool, attribute: A) -> Result<Attribute, Error> {
        let name = pool.add_utf8(A::NAME)?;
        let mut info = vec![];
        attribute.emit(&mut info)?;
        Ok(Attribute { name, info })
    }
}

impl Emit for Attribute {
    fn emit<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.name.emit(writer)?;
        (self.info.len() as u32).emit(writer)?;
        writer.write_all(&self.info)
    }
}

/// Structured attributes know their class-file name
pub trait AttributeLike: Emit {
    const NAME: &'static str;
}

/// The `Code` attribute of a method
#[derive(Debug)]
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionTableEntry>,
    pub attributes: Vec<Attribute>,
}

impl AttributeLike for Code {
    const NAME: &'static str = "Code";
}

impl Emit for Code {
    fn emit<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.max_stack.emit(writer)?;
        self.max_locals.emit(writer)?;
        (self.code.len() as u32).emit(writer)?;
        writer.write_all(&self.code)?;
        self.exception_table.emit(writer)?;
        self.attributes.emit(writer)
    }
}

/// Row in a method's exception table
///
/// The protected range is `[start_pc, end_pc)`. A `catch_type` of `None` is the catch-all form
/// (class index 0) used for `finally` handlers.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct ExceptionTableEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    pub catch_type: Option<ClassIndex>,
}

impl Emit for ExceptionTableEntry {
    fn emit<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.start_pc.emit(writer)?;
        self.end_pc.emit(writer)?;
        self.handler_pc.emit(writer)?;
        match self.catch_type {
            None => 0u16.emit(writer),
            Some(class) => class.emit(writer),
        }
    }
}

/// The `LineNumberTable` attribute inside a `Code` attribute
#[derive(Debug)]
pub struct LineNumberTable(pub Vec<LineNumberEntry>);

impl AttributeLike for LineNumberTable {
    const NAME: &'static str = "LineNumberTable";
}

impl Emit for LineNumberTable {
    fn emit<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.emit(writer)
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct LineNumberEntry {
    pub start_pc: u16,
    pub line_number: u16,
}

impl Emit for LineNumberEntry {
    fn emit<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.start_pc.emit(writer)?;
        self.line_number.emit(writer)
    }
}

/// The `LocalVariableTable` attribute inside a `Code` attribute
#[derive(Debug)]
pub struct LocalVariableTable(pub Vec<LocalVariableEntry>);

impl AttributeLike for LocalVariableTable {
    const NAME: &'static str = "LocalVariableTable";
}

impl Emit for LocalVariableTable {
    fn emit<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.emit(writer)
    }
}

/// Row describing one live range of a named local variable
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct LocalVariableEntry {
    pub start_pc: u16,
    pub length: u16,
    pub name: Utf8Index,
    pub descriptor: Utf8Index,
    pub index: u16,
}

impl Emit for LocalVariableEntry {
    fn emit<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.start_pc.emit(writer)?;
        self.length.emit(writer)?;
        self.name.emit(writer)?;
        self.descriptor.emit(writer)?;
        self.index.emit(writer)
    }
}

/// The class-level `BootstrapMethods` attribute
#[derive(Debug)]
pub struct BootstrapMethods(pub Vec<BootstrapMethod>);

impl AttributeLike for BootstrapMethods {
    const NAME: &'static str = "BootstrapMethods";
}

impl Emit for BootstrapMethods {
    fn emit<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.emit(writer)
    }
}
