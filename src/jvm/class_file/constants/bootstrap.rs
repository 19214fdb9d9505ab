use super::EntryMap;
use crate::jvm::class_file::BufWriter;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Entry of the `BootstrapMethods` attribute
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.7.23
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct BootstrapMethod {
    /// Pool index of the `CONSTANT_MethodHandle_info`
    pub method: u16,

    /// Pool indices of the static arguments
    pub arguments: Vec<u16>,
}

/// Deduplicating table of bootstrap methods, indexed from 0
#[derive(Clone, Debug, Default)]
pub struct BootstrapMethods {
    methods: Vec<BootstrapMethod>,
    lookup: EntryMap,
}

impl BootstrapMethods {
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    pub fn get(&self, index: u16) -> Option<&BootstrapMethod> {
        self.methods.get(index as usize)
    }

    fn key(method: &BootstrapMethod) -> u32 {
        let mut hasher = DefaultHasher::new();
        method.hash(&mut hasher);
        EntryMap::key(hasher.finish())
    }

    /// Get or insert a bootstrap method
    pub fn intern(&mut self, method: BootstrapMethod) -> u16 {
        let key = Self::key(&method);
        if let Some(existing) = self
            .lookup
            .get(key)
            .find(|idx| self.methods[*idx as usize] == method)
        {
            return existing as u16;
        }
        self.push(key, method)
    }

    /// Append without deduplicating (used when loading a parsed table, to keep indices stable)
    pub fn push_raw(&mut self, method: BootstrapMethod) -> u16 {
        let key = Self::key(&method);
        self.push(key, method)
    }

    fn push(&mut self, key: u32, method: BootstrapMethod) -> u16 {
        let idx = self.methods.len() as u16;
        self.methods.push(method);
        self.lookup.insert(key, idx as u32);
        idx
    }

    /// Write the attribute payload (without the name and length)
    pub fn serialize(&self, writer: &mut BufWriter) {
        writer.write_u2(self.methods.len() as u16);
        for method in &self.methods {
            writer.write_u2(method.method);
            writer.write_u2(method.arguments.len() as u16);
            for argument in &method.arguments {
                writer.write_u2(*argument);
            }
        }
    }
}
