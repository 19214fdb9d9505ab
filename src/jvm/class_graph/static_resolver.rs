use super::{ClassHierarchyInfo, ClassHierarchyResolver};
use crate::jvm::BinaryName;
use std::collections::HashMap;

/// Resolver over a closed table of classes, built up front
#[derive(Clone, Debug, Default)]
pub struct StaticHierarchyResolver {
    classes: HashMap<BinaryName, ClassHierarchyInfo>,
}

impl StaticHierarchyResolver {
    pub fn new() -> StaticHierarchyResolver {
        StaticHierarchyResolver::default()
    }

    /// Add a (non-interface) class
    pub fn with_class(mut self, class: BinaryName, superclass: BinaryName) -> Self {
        self.classes
            .insert(class, ClassHierarchyInfo::class(Some(superclass)));
        self
    }

    pub fn with_interface(mut self, interface: BinaryName) -> Self {
        self.classes.insert(interface, ClassHierarchyInfo::interface());
        self
    }

    pub fn insert(&mut self, class: BinaryName, info: ClassHierarchyInfo) {
        self.classes.insert(class, info);
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl ClassHierarchyResolver for StaticHierarchyResolver {
    fn info(&self, class: &BinaryName) -> Option<ClassHierarchyInfo> {
        self.classes.get(class).cloned()
    }
}
