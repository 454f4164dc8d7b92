use crate::jvm::{Emit, Error};
use crate::util::{Offset, SlotVec, Width};
use byteorder::WriteBytesExt;
use std::collections::HashMap;

/// Per-class constant pool builder
///
/// The pool is append only: indices are 1-based, never change once assigned, and structurally
/// identical entries are never duplicated (every `add_*` operation is idempotent). `long` and
/// `double` entries occupy two slots, which is why entries live in a [`SlotVec`].
pub struct ConstantPool {
    constants: SlotVec<Constant>,

    utf8s: HashMap<String, Utf8Index>,
    integers: HashMap<i32, ConstantIndex>,
    floats: HashMap<u32, ConstantIndex>,
    longs: HashMap<i64, ConstantIndex>,
    doubles: HashMap<u64, ConstantIndex>,
    classes: HashMap<Utf8Index, ClassIndex>,
    strings: HashMap<Utf8Index, ConstantIndex>,
    name_and_types: HashMap<(Utf8Index, Utf8Index), NameAndTypeIndex>,
    fieldrefs: HashMap<(ClassIndex, NameAndTypeIndex), FieldRefIndex>,
    methodrefs: HashMap<(ClassIndex, NameAndTypeIndex, bool), MethodRefIndex>,
    method_handles: HashMap<(HandleKind, ConstantIndex), ConstantIndex>,
    method_types: HashMap<Utf8Index, ConstantIndex>,
    invoke_dynamics: HashMap<(u16, NameAndTypeIndex), InvokeDynamicIndex>,
}

impl ConstantPool {
    pub fn new() -> ConstantPool {
        ConstantPool {
            constants: SlotVec::starting_at(Offset(1)),
            utf8s: HashMap::new(),
            integers: HashMap::new(),
            floats: HashMap::new(),
            longs: HashMap::new(),
            doubles: HashMap::new(),
            classes: HashMap::new(),
            strings: HashMap::new(),
            name_and_types: HashMap::new(),
            fieldrefs: HashMap::new(),
            methodrefs: HashMap::new(),
            method_handles: HashMap::new(),
            method_types: HashMap::new(),
            invoke_dynamics: HashMap::new(),
        }
    }

    /// Number of slots the pool occupies (the value serialized as `constant_pool_count`)
    pub fn count(&self) -> u16 {
        self.constants.next_offset().0 as u16
    }

    /// Push a constant, provided there is space left for it
    ///
    /// The largest addressable index is 65535 and wide constants take two slots.
    fn push_constant(&mut self, constant: Constant) -> Result<ConstantIndex, Error> {
        let offset = self.constants.next_offset().0;
        if offset + constant.width() > u16::MAX as usize + 1 {
            return Err(Error::ConstantPoolOverflow { constant, offset });
        }
        let offset = self.constants.push(constant);
        Ok(ConstantIndex(offset.0 as u16))
    }

    pub fn add_utf8(&mut self, utf8: &str) -> Result<Utf8Index, Error> {
        if let Some(idx) = self.utf8s.get(utf8) {
            return Ok(*idx);
        }
        let idx = Utf8Index(self.push_constant(Constant::Utf8(utf8.to_owned()))?);
        self.utf8s.insert(utf8.to_owned(), idx);
        Ok(idx)
    }

    pub fn add_integer(&mut self, value: i32) -> Result<ConstantIndex, Error> {
        if let Some(idx) = self.integers.get(&value) {
            return Ok(*idx);
        }
        let idx = self.push_constant(Constant::Integer(value))?;
        self.integers.insert(value, idx);
        Ok(idx)
    }

    pub fn add_float(&mut self, value: f32) -> Result<ConstantIndex, Error> {
        // Keyed on the bit pattern so `NaN` and `-0.0` behave structurally
        if let Some(idx) = self.floats.get(&value.to_bits()) {
            return Ok(*idx);
        }
        let idx = self.push_constant(Constant::Float(value))?;
        self.floats.insert(value.to_bits(), idx);
        Ok(idx)
    }

    pub fn add_long(&mut self, value: i64) -> Result<ConstantIndex, Error> {
        if let Some(idx) = self.longs.get(&value) {
            return Ok(*idx);
        }
        let idx = self.push_constant(Constant::Long(value))?;
        self.longs.insert(value, idx);
        Ok(idx)
    }

    pub fn add_double(&mut self, value: f64) -> Result<ConstantIndex, Error> {
        if let Some(idx) = self.doubles.get(&value.to_bits()) {
            return Ok(*idx);
        }
        let idx = self.push_constant(Constant::Double(value))?;
        self.doubles.insert(value.to_bits(), idx);
        Ok(idx)
    }

    /// Get or insert a `CONSTANT_Class_info` for a binary class name (or array descriptor)
    pub fn add_class(&mut self, binary_name: &str) -> Result<ClassIndex, Error> {
        let name = self.add_utf8(binary_name)?;
        if let Some(idx) = self.classes.get(&name) {
            return Ok(*idx);
        }
        let idx = ClassIndex(self.push_constant(Constant::Class(name))?);
        self.classes.insert(name, idx);
        Ok(idx)
    }

    /// Get or insert a `CONSTANT_String_info`
    pub fn add_string(&mut self, value: &str) -> Result<ConstantIndex, Error> {
        let utf8 = self.add_utf8(value)?;
        if let Some(idx) = self.strings.get(&utf8) {
            return Ok(*idx);
        }
        let idx = self.push_constant(Constant::String(utf8))?;
        self.strings.insert(utf8, idx);
        Ok(idx)
    }

    pub fn add_name_and_type(
        &mut self,
        name: &str,
        descriptor: &str,
    ) -> Result<NameAndTypeIndex, Error> {
        let name = self.add_utf8(name)?;
        let descriptor = self.add_utf8(descriptor)?;
        if let Some(idx) = self.name_and_types.get(&(name, descriptor)) {
            return Ok(*idx);
        }
        let idx = NameAndTypeIndex(self.push_constant(Constant::NameAndType { name, descriptor })?);
        self.name_and_types.insert((name, descriptor), idx);
        Ok(idx)
    }

    pub fn add_fieldref(
        &mut self,
        class_name: &str,
        field_name: &str,
        descriptor: &str,
    ) -> Result<FieldRefIndex, Error> {
        let class = self.add_class(class_name)?;
        let name_and_type = self.add_name_and_type(field_name, descriptor)?;
        if let Some(idx) = self.fieldrefs.get(&(class, name_and_type)) {
            return Ok(*idx);
        }
        let idx = FieldRefIndex(self.push_constant(Constant::FieldRef {
            class,
            name_and_type,
        })?);
        self.fieldrefs.insert((class, name_and_type), idx);
        Ok(idx)
    }

    /// Get or insert a `CONSTANT_Methodref_info` (or `CONSTANT_InterfaceMethodref_info`)
    pub fn add_methodref(
        &mut self,
        class_name: &str,
        method_name: &str,
        descriptor: &str,
        is_interface: bool,
    ) -> Result<MethodRefIndex, Error> {
        let class = self.add_class(class_name)?;
        let name_and_type = self.add_name_and_type(method_name, descriptor)?;
        if let Some(idx) = self.methodrefs.get(&(class, name_and_type, is_interface)) {
            return Ok(*idx);
        }
        let idx = MethodRefIndex(self.push_constant(Constant::MethodRef {
            class,
            name_and_type,
            is_interface,
        })?);
        self.methodrefs
            .insert((class, name_and_type, is_interface), idx);
        Ok(idx)
    }

    pub fn add_method_handle(
        &mut self,
        handle_kind: HandleKind,
        member: ConstantIndex,
    ) -> Result<ConstantIndex, Error> {
        if let Some(idx) = self.method_handles.get(&(handle_kind, member)) {
            return Ok(*idx);
        }
        let idx = self.push_constant(Constant::MethodHandle {
            handle_kind,
            member,
        })?;
        self.method_handles.insert((handle_kind, member), idx);
        Ok(idx)
    }

    pub fn add_method_type(&mut self, descriptor: &str) -> Result<ConstantIndex, Error> {
        let descriptor = self.add_utf8(descriptor)?;
        if let Some(idx) = self.method_types.get(&descriptor) {
            return Ok(*idx);
        }
        let idx = self.push_constant(Constant::MethodType { descriptor })?;
        self.method_types.insert(descriptor, idx);
        Ok(idx)
    }

    /// Get or insert a `CONSTANT_InvokeDynamic_info` pointing at a bootstrap method
    pub fn add_invoke_dynamic(
        &mut self,
        bootstrap_method: u16,
        name_and_type: NameAndTypeIndex,
    ) -> Result<InvokeDynamicIndex, Error> {
        if let Some(idx) = self.invoke_dynamics.get(&(bootstrap_method, name_and_type)) {
            return Ok(*idx);
        }
        let idx = InvokeDynamicIndex(self.push_constant(Constant::InvokeDynamic {
            bootstrap_method,
            name_and_type,
        })?);
        self.invoke_dynamics
            .insert((bootstrap_method, name_and_type), idx);
        Ok(idx)
    }

    /// Consume the pool into its final entry list
    pub fn into_entries(self) -> SlotVec<Constant> {
        self.constants
    }
}

impl Default for ConstantPool {
    fn default() -> ConstantPool {
        ConstantPool::new()
    }
}

/// Entries of the constant pool
///
/// Only the constant forms this emitter produces are represented (notably: no `CONSTANT_Module`
/// or `CONSTANT_Dynamic`).
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.4
#[derive(Debug, Clone)]
pub enum Constant {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(Utf8Index),
    String(Utf8Index),
    FieldRef {
        class: ClassIndex,
        name_and_type: NameAndTypeIndex,
    },
    MethodRef {
        class: ClassIndex,
        name_and_type: NameAndTypeIndex,
        is_interface: bool,
    },
    NameAndType {
        name: Utf8Index,
        descriptor: Utf8Index,
    },
    MethodHandle {
        handle_kind: HandleKind,

        /// `FieldRef` for the field handle kinds, `MethodRef` for the rest
        member: ConstantIndex,
    },
    MethodType {
        descriptor: Utf8Index,
    },
    InvokeDynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method: u16,
        name_and_type: NameAndTypeIndex,
    },
}

/// 8-byte constants take up two pool slots; everything else takes one
impl Width for Constant {
    fn width(&self) -> usize {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

impl Emit for Constant {
    fn emit<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            Constant::Utf8(string) => {
                1u8.emit(writer)?;
                let buffer = encode_modified_utf8(string);
                (buffer.len() as u16).emit(writer)?;
                writer.write_all(&buffer)?;
            }
            Constant::Integer(value) => {
                3u8.emit(writer)?;
                value.emit(writer)?;
            }
            Constant::Float(value) => {
                4u8.emit(writer)?;
                value.emit(writer)?;
            }
            Constant::Long(value) => {
                5u8.emit(writer)?;
                value.emit(writer)?;
            }
            Constant::Double(value) => {
                6u8.emit(writer)?;
                value.emit(writer)?;
            }
            Constant::Class(name) => {
                7u8.emit(writer)?;
                name.emit(writer)?;
            }
            Constant::String(utf8) => {
                8u8.emit(writer)?;
                utf8.emit(writer)?;
            }
            Constant::FieldRef {
                class,
                name_and_type,
            } => {
                9u8.emit(writer)?;
                class.emit(writer)?;
                name_and_type.emit(writer)?;
            }
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                (if *is_interface { 11u8 } else { 10u8 }).emit(writer)?;
                class.emit(writer)?;
                name_and_type.emit(writer)?;
            }
            Constant::NameAndType { name, descriptor } => {
                12u8.emit(writer)?;
                name.emit(writer)?;
                descriptor.emit(writer)?;
            }
            Constant::MethodHandle {
                handle_kind,
                member,
            } => {
                15u8.emit(writer)?;
                handle_kind.emit(writer)?;
                member.emit(writer)?;
            }
            Constant::MethodType { descriptor } => {
                16u8.emit(writer)?;
                descriptor.emit(writer)?;
            }
            Constant::InvokeDynamic {
                bootstrap_method,
                name_and_type,
            } => {
                18u8.emit(writer)?;
                bootstrap_method.emit(writer)?;
                name_and_type.emit(writer)?;
            }
        }
        Ok(())
    }
}

/// Kind of method handle
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.4.8
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum HandleKind {
    GetField,
    GetStatic,
    PutField,
    PutStatic,
    InvokeVirtual,
    InvokeStatic,
    InvokeSpecial,
    NewInvokeSpecial,
    InvokeInterface,
}

impl Emit for HandleKind {
    fn emit<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        let tag: u8 = match self {
            HandleKind::GetField => 1,
            HandleKind::GetStatic => 2,
            HandleKind::PutField => 3,
            HandleKind::PutStatic => 4,
            HandleKind::InvokeVirtual => 5,
            HandleKind::InvokeStatic => 6,
            HandleKind::InvokeSpecial => 7,
            HandleKind::NewInvokeSpecial => 8,
            HandleKind::InvokeInterface => 9,
        };
        tag.emit(writer)
    }
}

macro_rules! constant_indices {
    ($($(#[$doc:meta])* $name:ident),+ $(,)?) => {
        $(
            $(#[$doc])*
            #[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
            pub struct $name(pub ConstantIndex);

            impl From<$name> for ConstantIndex {
                fn from(idx: $name) -> ConstantIndex {
                    idx.0
                }
            }

            impl Emit for $name {
                fn emit<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
                    self.0.emit(writer)
                }
            }
        )+
    };
}

/// Untyped 1-based index into the constant pool
#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct ConstantIndex(pub u16);

impl Emit for ConstantIndex {
    fn emit<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.emit(writer)
    }
}

constant_indices! {
    /// Index known to point at a `CONSTANT_Utf8_info`
    Utf8Index,
    /// Index known to point at a `CONSTANT_Class_info`
    ClassIndex,
    /// Index known to point at a `CONSTANT_NameAndType_info`
    NameAndTypeIndex,
    /// Index known to point at a `CONSTANT_Fieldref_info`
    FieldRefIndex,
    /// Index known to point at a `CONSTANT_Methodref_info`
    MethodRefIndex,
    /// Index known to point at a `CONSTANT_InvokeDynamic_info`
    InvokeDynamicIndex,
}

/// Modified UTF-8 as used in class files
///
/// Differences from standard UTF-8 (see the `DataInput` documentation): the null character is
/// encoded in the 2-byte form, only the 1-3 byte forms are used, and supplementary characters
/// are encoded as surrogate pairs.
pub fn encode_modified_utf8(string: &str) -> Vec<u8> {
    let mut buffer: Vec<u8> = Vec::with_capacity(string.len());
    for c in string.chars() {
        let code = c as u32;
        if code != 0 && code < 0x80 {
            buffer.push(code as u8);
        } else if code < 0x800 {
            buffer.push((code >> 6 & 0x1F) as u8 | 0b1100_0000);
            buffer.push((code & 0x3F) as u8 | 0b1000_0000);
        } else if code < 0x10000 {
            buffer.push((code >> 12 & 0x0F) as u8 | 0b1110_0000);
            buffer.push((code >> 6 & 0x3F) as u8 | 0b1000_0000);
            buffer.push((code & 0x3F) as u8 | 0b1000_0000);
        } else {
            // Surrogate pair encoding of supplementary characters
            let code = code - 0x10000;
            let high = 0xD800 + (code >> 10);
            let low = 0xDC00 + (code & 0x3FF);
            for surrogate in [high, low] {
                buffer.push((surrogate >> 12 & 0x0F) as u8 | 0b1110_0000);
                buffer.push((surrogate >> 6 & 0x3F) as u8 | 0b1000_0000);
                buffer.push((surrogate & 0x3F) as u8 | 0b1000_0000);
            }
        }
    }
    buffer
}
