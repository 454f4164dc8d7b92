use crate::errors::Error;
use crate::jvm::{ConstantIndex, Emit};
use byteorder::WriteBytesExt;
use std::collections::HashMap;

/// Builder for the class' `BootstrapMethods` attribute
///
/// Like the constant pool, the table is append only and deduplicating: two structurally equal
/// bootstrap methods (same handle, same arguments in the same order) share one entry, so every
/// structurally identical `invokedynamic` site links through the same index.
pub struct BootstrapMethodsTable {
    methods: Vec<BootstrapMethod>,
    cached: HashMap<BootstrapMethod, u16>,
}

impl BootstrapMethodsTable {
    pub fn new() -> BootstrapMethodsTable {
        BootstrapMethodsTable {
            methods: vec![],
            cached: HashMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Get or insert a bootstrap method, returning its index into the attribute
    pub fn add(&mut self, method: BootstrapMethod) -> Result<u16, Error> {
        if let Some(idx) = self.cached.get(&method) {
            return Ok(*idx);
        }
        let idx = self.methods.len();
        if idx > u16::MAX as usize {
            return Err(Error::TableOverflow {
                table: "BootstrapMethods",
                count: idx + 1,
            });
        }
        self.methods.push(method.clone());
        self.cached.insert(method, idx as u16);
        Ok(idx as u16)
    }

    /// Consume the table into the entry list of a `BootstrapMethods` attribute
    pub fn into_methods(self) -> Vec<BootstrapMethod> {
        self.methods
    }
}

impl Default for BootstrapMethodsTable {
    fn default() -> BootstrapMethodsTable {
        BootstrapMethodsTable::new()
    }
}

/// Entry in the `BootstrapMethods` attribute
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.23
#[derive(Clone, Hash, Eq, PartialEq, Debug)]
pub struct BootstrapMethod {
    /// Index of a `CONSTANT_MethodHandle_info`
    pub bootstrap_method: ConstantIndex,

    /// Static arguments, each an index of a loadable constant
    pub arguments: Vec<ConstantIndex>,
}

impl Emit for BootstrapMethod {
    fn emit<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.bootstrap_method.emit(writer)?;
        self.arguments.emit(writer)
    }
}

bitflags::bitflags! {
    /// Flags in the fourth static argument of `LambdaMetafactory.altMetafactory`
    ///
    /// [0]: https://docs.oracle.com/javase/8/docs/api/java/lang/invoke/LambdaMetafactory.html
    pub struct LambdaFlags: i32 {
        const SERIALIZABLE = 0x1;
        const MARKERS = 0x2;
        const BRIDGES = 0x4;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn structurally_equal_methods_share_an_entry() {
        let mut table = BootstrapMethodsTable::new();
        let method = BootstrapMethod {
            bootstrap_method: ConstantIndex(7),
            arguments: vec![ConstantIndex(8), ConstantIndex(9), ConstantIndex(10)],
        };

        let first = table.add(method.clone()).unwrap();
        let second = table.add(method).unwrap();
        assert_eq!(first, second);
        assert_eq!(table.into_methods().len(), 1);
    }

    #[test]
    fn different_arguments_get_distinct_entries() {
        let mut table = BootstrapMethodsTable::new();
        let first = table
            .add(BootstrapMethod {
                bootstrap_method: ConstantIndex(7),
                arguments: vec![ConstantIndex(8)],
            })
            .unwrap();
        let second = table
            .add(BootstrapMethod {
                bootstrap_method: ConstantIndex(7),
                arguments: vec![ConstantIndex(9)],
            })
            .unwrap();
        assert_eq!((first, second), (0, 1));
    }
}
