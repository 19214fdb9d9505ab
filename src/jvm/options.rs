//! Settings shared by the terminal code builders

use crate::jvm::class_graph::{java_core_resolver, ClassHierarchyResolver};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

#[derive(Clone)]
pub struct CodeOptions {
    /// What to do about the `StackMapTable` attribute
    pub stack_maps: StackMapsOption,

    /// What to do when a branch offset does not fit in the short (16-bit) form
    pub short_jumps: ShortJumpsOption,

    /// What to do with unreachable code found while generating stack maps
    pub dead_code: DeadCodeOption,

    /// What to do with debug elements (line numbers, local variables) referring to labels that
    /// were never bound
    pub dead_labels: DeadLabelsOption,

    /// Keep line numbers and local variable tables?
    pub debug_elements: DebugElementsOption,

    /// Class hierarchy consulted when merging reference types
    ///
    /// Generated code mentioning classes outside of the core `java.*` table should chain a
    /// resolver for those (see [`ClassHierarchyResolver::or_else`]). Unresolved classes merge to
    /// `java.lang.Object`.
    pub class_hierarchy: Arc<dyn ClassHierarchyResolver>,
}

impl Default for CodeOptions {
    fn default() -> Self {
        CodeOptions {
            stack_maps: StackMapsOption::Generate,
            short_jumps: ShortJumpsOption::Fix,
            dead_code: DeadCodeOption::Patch,
            dead_labels: DeadLabelsOption::Fail,
            debug_elements: DebugElementsOption::Pass,
            class_hierarchy: java_core_resolver(),
        }
    }
}

impl CodeOptions {
    pub fn with_class_hierarchy(mut self, resolver: Arc<dyn ClassHierarchyResolver>) -> Self {
        self.class_hierarchy = resolver;
        self
    }
}

impl Debug for CodeOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeOptions")
            .field("stack_maps", &self.stack_maps)
            .field("short_jumps", &self.short_jumps)
            .field("dead_code", &self.dead_code)
            .field("dead_labels", &self.dead_labels)
            .field("debug_elements", &self.debug_elements)
            .finish_non_exhaustive()
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum StackMapsOption {
    /// Compute frames from the final code
    Generate,

    /// Emit no `StackMapTable` (only valid for class files older than version 50)
    Drop,

    /// Use the frames passed in as `CodeElement::Frame` elements, as they are
    Provided,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ShortJumpsOption {
    /// Rewrite the jump into a wide form
    Fix,

    /// Fail with `Error::BranchOffsetOverflow`
    Fail,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum DeadCodeOption {
    /// Overwrite dead code with `nop`s ending in `athrow`, and cut it out of exception ranges
    Patch,

    /// Fail with `Error::DeadCode`
    Fail,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum DeadLabelsOption {
    /// Fail with `Error::UnboundLabel`
    Fail,

    /// Drop the debug element
    Drop,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum DebugElementsOption {
    Pass,
    Drop,
}
