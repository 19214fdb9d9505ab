//! Minimal class hierarchy information, as needed for merging types in stack map frames
//!
//! Nothing here loads or fully parses classes. A resolver only ever answers two questions about
//! a class: is it an interface, and what is its superclass? Resolution gaps are not errors: they
//! show up as `None` and callers fall back to assuming compatibility.

mod assignable;
mod caching;
mod java_classes;
mod static_resolver;

pub use caching::*;
pub use java_classes::*;
pub use static_resolver::*;

use crate::jvm::BinaryName;
use std::sync::Arc;

/// What is known about one class
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ClassHierarchyInfo {
    pub is_interface: bool,

    /// `None` for `java.lang.Object`, and for interfaces whose declaration was not seen
    pub superclass: Option<BinaryName>,
}

impl ClassHierarchyInfo {
    pub fn class(superclass: Option<BinaryName>) -> ClassHierarchyInfo {
        ClassHierarchyInfo {
            is_interface: false,
            superclass,
        }
    }

    pub fn interface() -> ClassHierarchyInfo {
        ClassHierarchyInfo {
            is_interface: true,
            superclass: None,
        }
    }
}

/// Source of class hierarchy information
///
/// Resolvers get shared across builds, possibly on several threads at once.
pub trait ClassHierarchyResolver: Send + Sync {
    /// Look up a class by its binary name
    fn info(&self, class: &BinaryName) -> Option<ClassHierarchyInfo>;

    /// Consult `other` for classes this resolver does not know
    fn or_else<R: ClassHierarchyResolver>(self, other: R) -> FallbackResolver<Self, R>
    where
        Self: Sized,
    {
        FallbackResolver {
            first: self,
            second: other,
        }
    }
}

impl<R: ClassHierarchyResolver + ?Sized> ClassHierarchyResolver for Arc<R> {
    fn info(&self, class: &BinaryName) -> Option<ClassHierarchyInfo> {
        (**self).info(class)
    }
}

impl<R: ClassHierarchyResolver + ?Sized> ClassHierarchyResolver for &R {
    fn info(&self, class: &BinaryName) -> Option<ClassHierarchyInfo> {
        (**self).info(class)
    }
}

/// Chain of two resolvers, see [`ClassHierarchyResolver::or_else`]
#[derive(Debug)]
pub struct FallbackResolver<A, B> {
    first: A,
    second: B,
}

impl<A: ClassHierarchyResolver, B: ClassHierarchyResolver> ClassHierarchyResolver
    for FallbackResolver<A, B>
{
    fn info(&self, class: &BinaryName) -> Option<ClassHierarchyInfo> {
        self.first
            .info(class)
            .or_else(|| self.second.info(class))
    }
}

/// Queries built on top of a resolver
#[derive(Clone, Copy)]
pub struct ClassHierarchy<'a> {
    resolver: &'a dyn ClassHierarchyResolver,
}

impl<'a> ClassHierarchy<'a> {
    pub fn new(resolver: &'a dyn ClassHierarchyResolver) -> ClassHierarchy<'a> {
        ClassHierarchy { resolver }
    }

    pub fn info(&self, class: &BinaryName) -> Option<ClassHierarchyInfo> {
        if class == &BinaryName::OBJECT {
            return Some(ClassHierarchyInfo::class(None));
        }
        self.resolver.info(class)
    }

    /// Is the class an interface? (`None` if the class is unknown)
    pub fn is_interface(&self, class: &BinaryName) -> Option<bool> {
        self.info(class).map(|info| info.is_interface)
    }

    /// Superclass of a class (`None` if the class is unknown or has no superclass)
    pub fn superclass(&self, class: &BinaryName) -> Option<BinaryName> {
        self.info(class).and_then(|info| info.superclass)
    }

    /// Full superclass chain, starting at the class itself and ending at `java.lang.Object`
    ///
    /// Returns `None` if some class on the way cannot be resolved.
    pub fn superclass_chain(&self, class: &BinaryName) -> Option<Vec<BinaryName>> {
        let mut chain = vec![class.clone()];
        let mut current = class.clone();
        while current != BinaryName::OBJECT {
            let info = self.info(&current)?;
            current = match info.superclass {
                Some(superclass) => superclass,
                None if info.is_interface => BinaryName::OBJECT,
                None => return None,
            };
            if chain.contains(&current) {
                log::warn!("Cyclic superclass chain through {}", current);
                return None;
            }
            chain.push(current.clone());
        }
        Some(chain)
    }

    /// First common superclass of two classes
    ///
    /// Interfaces are treated as `java.lang.Object`, which is the least precise (but always
    /// sound) answer. `None` means the answer is unknown because part of a chain is missing.
    pub fn common_ancestor(&self, a: &BinaryName, b: &BinaryName) -> Option<BinaryName> {
        if a == b {
            return Some(a.clone());
        }
        if self.is_interface(a)? || self.is_interface(b)? {
            return Some(BinaryName::OBJECT);
        }

        let a_chain = self.superclass_chain(a)?;
        let b_chain = self.superclass_chain(b)?;
        b_chain.into_iter().find(|class| a_chain.contains(class))
    }
}
