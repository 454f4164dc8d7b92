use crate::util::Width;

/// Primitive value types
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BaseType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
}

impl Width for BaseType {
    fn width(&self) -> usize {
        match self {
            BaseType::Double | BaseType::Long => 2,
            _ => 1,
        }
    }
}

impl BaseType {
    fn descriptor_char(&self) -> char {
        match self {
            BaseType::Byte => 'B',
            BaseType::Char => 'C',
            BaseType::Double => 'D',
            BaseType::Float => 'F',
            BaseType::Int => 'I',
            BaseType::Long => 'J',
            BaseType::Short => 'S',
            BaseType::Boolean => 'Z',
        }
    }
}

/// Type of a field, local variable, or expression
///
/// Object types carry the class' binary name (eg. `java/lang/String`). The semantic analyzer
/// handing us the tree has already erased generics, so this is all the type information the
/// emitter ever needs.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum FieldType {
    Base(BaseType),
    Object(String),
    Array(Box<FieldType>),
}

impl FieldType {
    pub const INT: FieldType = FieldType::Base(BaseType::Int);
    pub const LONG: FieldType = FieldType::Base(BaseType::Long);
    pub const FLOAT: FieldType = FieldType::Base(BaseType::Float);
    pub const DOUBLE: FieldType = FieldType::Base(BaseType::Double);
    pub const BOOLEAN: FieldType = FieldType::Base(BaseType::Boolean);

    pub fn object(class_name: impl Into<String>) -> FieldType {
        FieldType::Object(class_name.into())
    }

    /// Number of local variable (or operand stack) slots a value of this type occupies
    pub fn width(&self) -> u16 {
        match self {
            FieldType::Base(base) => base.width() as u16,
            _ => 1,
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, FieldType::Object(_) | FieldType::Array(_))
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_to(&mut out);
        out
    }

    pub fn render_to(&self, out: &mut String) {
        match self {
            FieldType::Base(base) => out.push(base.descriptor_char()),
            FieldType::Object(class_name) => {
                out.push('L');
                out.push_str(class_name);
                out.push(';');
            }
            FieldType::Array(elem) => {
                out.push('[');
                elem.render_to(out);
            }
        }
    }
}

/// Type of a method: argument types and return type (`None` encodes `void`)
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct MethodDescriptor {
    pub parameters: Vec<FieldType>,
    pub return_type: Option<FieldType>,
}

impl MethodDescriptor {
    pub fn new(parameters: Vec<FieldType>, return_type: Option<FieldType>) -> MethodDescriptor {
        MethodDescriptor {
            parameters,
            return_type,
        }
    }

    /// Total slots taken up by the parameters
    pub fn parameter_width(&self) -> u16 {
        self.parameters.iter().map(FieldType::width).sum()
    }

    /// Slots the return value occupies on the stack (0 for `void`)
    pub fn return_width(&self) -> u16 {
        self.return_type.as_ref().map_or(0, FieldType::width)
    }

    pub fn render(&self) -> String {
        let mut out = String::from("(");
        for parameter in &self.parameters {
            parameter.render_to(&mut out);
        }
        out.push(')');
        match &self.return_type {
            None => out.push('V'),
            Some(typ) => typ.render_to(&mut out),
        }
        out
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn field_descriptors() {
        assert_eq!(FieldType::INT.render(), "I");
        assert_eq!(FieldType::object("java/lang/String").render(), "Ljava/lang/String;");
        assert_eq!(
            FieldType::Array(Box::new(FieldType::Array(Box::new(FieldType::DOUBLE)))).render(),
            "[[D"
        );
    }

    #[test]
    fn method_descriptors() {
        let descriptor = MethodDescriptor::new(
            vec![
                FieldType::INT,
                FieldType::LONG,
                FieldType::Array(Box::new(FieldType::object("java/lang/String"))),
            ],
            Some(FieldType::BOOLEAN),
        );
        assert_eq!(descriptor.render(), "(IJ[Ljava/lang/String;)Z");
        assert_eq!(descriptor.parameter_width(), 4);

        let void_descriptor = MethodDescriptor::new(vec![], None);
        assert_eq!(void_descriptor.render(), "()V");
        assert_eq!(void_descriptor.return_width(), 0);
    }
}
