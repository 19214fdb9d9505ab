use super::{ClassHierarchyInfo, ClassHierarchyResolver, StaticHierarchyResolver};
use crate::jvm::BinaryName;
use once_cell::sync::Lazy;
use std::sync::Arc;

/// Table of well-known `java.*` classes, built on first use and read-only afterwards
static JAVA_CORE: Lazy<Arc<StaticHierarchyResolver>> = Lazy::new(|| {
    log::debug!("Building core class hierarchy table");
    Arc::new(StaticHierarchyResolver::java_core())
});

/// Shared resolver for the classes in [`StaticHierarchyResolver::java_core`]
pub fn java_core_resolver() -> Arc<dyn ClassHierarchyResolver> {
    JAVA_CORE.clone()
}

impl StaticHierarchyResolver {
    /// Classes and interfaces from `java.lang`, `java.io`, and `java.util` that generated code
    /// most often mentions (exceptions in particular, since they show up in handler frames)
    pub fn java_core() -> StaticHierarchyResolver {
        let mut resolver = StaticHierarchyResolver::new();
        resolver.insert(BinaryName::OBJECT, ClassHierarchyInfo::class(None));

        let classes = [
            (BinaryName::STRING, BinaryName::OBJECT),
            (BinaryName::CLASS, BinaryName::OBJECT),
            (BinaryName::NUMBER, BinaryName::OBJECT),
            (BinaryName::INTEGER, BinaryName::NUMBER),
            (BinaryName::LONG, BinaryName::NUMBER),
            (BinaryName::FLOAT, BinaryName::NUMBER),
            (BinaryName::DOUBLE, BinaryName::NUMBER),
            (BinaryName::BYTE, BinaryName::NUMBER),
            (BinaryName::SHORT, BinaryName::NUMBER),
            (BinaryName::BOOLEAN, BinaryName::OBJECT),
            (BinaryName::CHARACTER, BinaryName::OBJECT),
            (BinaryName::VOID, BinaryName::OBJECT),
            (BinaryName::MATH, BinaryName::OBJECT),
            (BinaryName::SYSTEM, BinaryName::OBJECT),
            (BinaryName::ENUM, BinaryName::OBJECT),
            (BinaryName::STRINGBUILDER, BinaryName::OBJECT),
            (BinaryName::THROWABLE, BinaryName::OBJECT),
            (BinaryName::ERROR, BinaryName::THROWABLE),
            (BinaryName::ASSERTIONERROR, BinaryName::ERROR),
            (BinaryName::EXCEPTION, BinaryName::THROWABLE),
            (BinaryName::RUNTIMEEXCEPTION, BinaryName::EXCEPTION),
            (BinaryName::ARITHMETICEXCEPTION, BinaryName::RUNTIMEEXCEPTION),
            (BinaryName::CLASSCASTEXCEPTION, BinaryName::RUNTIMEEXCEPTION),
            (BinaryName::ILLEGALARGUMENTEXCEPTION, BinaryName::RUNTIMEEXCEPTION),
            (BinaryName::ILLEGALSTATEEXCEPTION, BinaryName::RUNTIMEEXCEPTION),
            (BinaryName::NULLPOINTEREXCEPTION, BinaryName::RUNTIMEEXCEPTION),
            (BinaryName::METHODHANDLE, BinaryName::OBJECT),
            (BinaryName::METHODTYPE, BinaryName::OBJECT),
            (BinaryName::CALLSITE, BinaryName::OBJECT),
            (BinaryName::ARRAYLIST, BinaryName::OBJECT),
            (BinaryName::HASHMAP, BinaryName::OBJECT),
        ];
        for (class, superclass) in classes {
            resolver.insert(class, ClassHierarchyInfo::class(Some(superclass)));
        }

        let interfaces = [
            BinaryName::AUTOCLOSEABLE,
            BinaryName::CHARSEQUENCE,
            BinaryName::CLONEABLE,
            BinaryName::COMPARABLE,
            BinaryName::ITERABLE,
            BinaryName::RUNNABLE,
            BinaryName::SERIALIZABLE,
            BinaryName::COLLECTION,
            BinaryName::LIST,
            BinaryName::MAP,
        ];
        for interface in interfaces {
            resolver.insert(interface, ClassHierarchyInfo::interface());
        }

        resolver
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_graph::ClassHierarchy;

    #[test]
    fn exception_hierarchy() {
        let resolver = java_core_resolver();
        let hierarchy = ClassHierarchy::new(&*resolver);
        assert_eq!(
            hierarchy.common_ancestor(
                &BinaryName::ARITHMETICEXCEPTION,
                &BinaryName::NULLPOINTEREXCEPTION
            ),
            Some(BinaryName::RUNTIMEEXCEPTION)
        );
        assert_eq!(
            hierarchy.common_ancestor(&BinaryName::ASSERTIONERROR, &BinaryName::EXCEPTION),
            Some(BinaryName::THROWABLE)
        );
    }

    #[test]
    fn table_is_shared() {
        let first = java_core_resolver();
        let second = java_core_resolver();
        assert_eq!(first.info(&BinaryName::LIST), Some(ClassHierarchyInfo::interface()));
        assert!(Arc::ptr_eq(&first, &second), "one table per process");
    }
}
