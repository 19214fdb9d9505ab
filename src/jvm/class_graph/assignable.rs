use super::ClassHierarchy;
use crate::jvm::{BinaryName, FieldType, RefType};
use std::cmp::Ordering;

impl<'a> ClassHierarchy<'a> {
    /// Is a value of class `sub_type` assignable to a location of class `super_type`?
    ///
    /// This follows the verifier's rules rather than the language's: every class is assignable to
    /// an interface, and a class whose superclass chain cannot be resolved is optimistically
    /// assumed to be assignable.
    pub fn is_class_assignable(&self, sub_type: &BinaryName, super_type: &BinaryName) -> bool {
        if sub_type == super_type || super_type == &BinaryName::OBJECT {
            return true;
        }
        match self.is_interface(super_type) {
            Some(true) => return true,
            Some(false) => (),
            None => {
                log::trace!("Assuming {} <: {} (unresolved)", sub_type, super_type);
                return true;
            }
        }
        match self.superclass_chain(sub_type) {
            Some(chain) => chain.contains(super_type),
            None => {
                log::trace!("Assuming {} <: {} (unresolved chain)", sub_type, super_type);
                true
            }
        }
    }

    /// This matches the semantics of the prolog predicate `isJavaAssignable(sub_type, super_type)`
    /// in the JVM verifier specification (modulo the optimism of [`Self::is_class_assignable`]).
    pub fn is_assignable(&self, sub_type: &RefType, super_type: &RefType) -> bool {
        match (sub_type, super_type) {
            // Special superclass and interfaces of all arrays
            (RefType::PrimitiveArray(_) | RefType::ObjectArray(_), RefType::Object(object_type)) => {
                is_array_type_assignable(object_type)
            }

            // Primitive arrays must match in dimension and type
            (RefType::PrimitiveArray(arr1), RefType::PrimitiveArray(arr2)) => arr1 == arr2,

            // Higher dimensional primitive arrays can be subtypes of object arrays
            (RefType::PrimitiveArray(arr1), RefType::ObjectArray(arr2)) => {
                match arr1.additional_dimensions.cmp(&arr2.additional_dimensions) {
                    Ordering::Less | Ordering::Equal => false,
                    Ordering::Greater => is_array_type_assignable(&arr2.element_type),
                }
            }

            // Covariance of arrays
            (RefType::ObjectArray(arr1), RefType::ObjectArray(arr2)) => {
                match arr1.additional_dimensions.cmp(&arr2.additional_dimensions) {
                    Ordering::Less => false,
                    Ordering::Equal => {
                        self.is_class_assignable(&arr1.element_type, &arr2.element_type)
                    }
                    Ordering::Greater => is_array_type_assignable(&arr2.element_type),
                }
            }

            (RefType::Object(cls1), RefType::Object(cls2)) => self.is_class_assignable(cls1, cls2),

            _ => false,
        }
    }

    /// Can a location of type `target` hold a value of type `source`?
    pub fn is_assignable_from(&self, target: &RefType, source: &RefType) -> bool {
        self.is_assignable(source, target)
    }

    /// Least upper bound of two reference types at a control flow merge
    ///
    /// Returns `None` when the hierarchy is missing a class needed to answer.
    pub fn merge(&self, a: &RefType, b: &RefType) -> Option<RefType> {
        if a == b {
            return Some(a.clone());
        }
        match (a, b) {
            (RefType::Object(cls1), RefType::Object(cls2)) => self
                .common_ancestor(cls1, cls2)
                .map(RefType::Object),
            (RefType::Object(_), _) | (_, RefType::Object(_)) => Some(RefType::OBJECT),
            _ => match (a.component_type(), b.component_type()) {
                (Some(FieldType::Ref(comp1)), Some(FieldType::Ref(comp2))) => {
                    let merged = self.merge(&comp1, &comp2)?;
                    Some(RefType::array(FieldType::Ref(merged)))
                }
                _ => Some(RefType::OBJECT),
            },
        }
    }
}

/// Check if arrays can be assigned to a super type
///
/// This bakes in knowledge of the small, finite set of super types arrays have.
fn is_array_type_assignable(super_type: &BinaryName) -> bool {
    super_type == &BinaryName::OBJECT
        || super_type == &BinaryName::CLONEABLE
        || super_type == &BinaryName::SERIALIZABLE
}

#[cfg(test)]
mod test {
    use crate::jvm::class_graph::{ClassHierarchy, StaticHierarchyResolver};
    use crate::jvm::{BinaryName, FieldType, Name, RefType};

    fn object(name: BinaryName) -> RefType {
        RefType::Object(name)
    }

    #[test]
    fn transitive_classes() {
        let resolver = StaticHierarchyResolver::java_core();
        let hierarchy = ClassHierarchy::new(&resolver);

        let object_cls = &object(BinaryName::OBJECT);
        let number_cls = &object(BinaryName::NUMBER);
        let integer_cls = &object(BinaryName::INTEGER);

        assert!(
            hierarchy.is_assignable(number_cls, object_cls),
            "java.lang.Number <: java.lang.Object"
        );
        assert!(
            hierarchy.is_assignable(integer_cls, number_cls),
            "java.lang.Integer <: java.lang.Number"
        );
        assert!(
            !hierarchy.is_assignable(object_cls, number_cls),
            "java.lang.Object </: java.lang.Number"
        );
        assert!(
            !hierarchy.is_assignable(number_cls, integer_cls),
            "java.lang.Number </: java.lang.Integer"
        );
    }

    #[test]
    fn interfaces_accept_everything() {
        let resolver = StaticHierarchyResolver::java_core();
        let hierarchy = ClassHierarchy::new(&resolver);

        let object_cls = &object(BinaryName::OBJECT);
        let string_cls = &object(BinaryName::STRING);
        let charsequence_cls = &object(BinaryName::CHARSEQUENCE);

        assert!(
            hierarchy.is_assignable(string_cls, charsequence_cls),
            "java.lang.String <: java.lang.CharSequence"
        );
        assert!(
            hierarchy.is_assignable(charsequence_cls, object_cls),
            "java.lang.CharSequence <: java.lang.Object"
        );
        assert!(
            !hierarchy.is_assignable(charsequence_cls, string_cls),
            "java.lang.CharSequence </: java.lang.String"
        );
    }

    #[test]
    fn unresolved_classes_are_optimistic() {
        let resolver = StaticHierarchyResolver::java_core();
        let hierarchy = ClassHierarchy::new(&resolver);
        let unknown = &object(BinaryName::from_str("me/Unknown").unwrap());
        assert!(hierarchy.is_assignable(unknown, &object(BinaryName::NUMBER)));
        assert!(hierarchy.is_assignable(&object(BinaryName::NUMBER), unknown));
    }

    #[test]
    fn object_arrays() {
        let resolver = StaticHierarchyResolver::java_core();
        let hierarchy = ClassHierarchy::new(&resolver);

        let object_cls = &object(BinaryName::OBJECT);
        let int_array = &RefType::array(FieldType::int());
        let long_array = &RefType::array(FieldType::long());
        let integer_array = &RefType::array(FieldType::object(BinaryName::INTEGER));
        let number_array = &RefType::array(FieldType::object(BinaryName::NUMBER));

        assert!(hierarchy.is_assignable(int_array, object_cls), "[]int <: java.lang.Object");
        assert!(!hierarchy.is_assignable(int_array, long_array), "[]int </: []long");
        assert!(
            !hierarchy.is_assignable(int_array, integer_array),
            "[]int </: []java.lang.Integer"
        );
        assert!(
            hierarchy.is_assignable(integer_array, number_array),
            "[]java.lang.Integer <: []java.lang.Number"
        );
        assert!(
            !hierarchy.is_assignable(number_array, integer_array),
            "[]java.lang.Number </: []java.lang.Integer"
        );
        assert!(
            !hierarchy.is_assignable(object_cls, integer_array),
            "java.lang.Object </: []java.lang.Integer"
        );
    }

    #[test]
    fn nested_arrays() {
        let resolver = StaticHierarchyResolver::java_core();
        let hierarchy = ClassHierarchy::new(&resolver);

        let object_array = &RefType::array(FieldType::object(BinaryName::OBJECT));
        let nested_int_array = &RefType::array(FieldType::array(FieldType::int()));
        let nested_integer_array =
            &RefType::array(FieldType::array(FieldType::object(BinaryName::INTEGER)));
        let nested_number_array =
            &RefType::array(FieldType::array(FieldType::object(BinaryName::NUMBER)));

        assert!(
            hierarchy.is_assignable(nested_int_array, object_array),
            "[][]int <: []java.lang.Object"
        );
        assert!(
            hierarchy.is_assignable(nested_integer_array, nested_number_array),
            "[][]java.lang.Integer <: [][]java.lang.Number"
        );
        assert!(
            !hierarchy.is_assignable(object_array, nested_int_array),
            "[]java.lang.Object </: [][]int"
        );
    }

    #[test]
    fn merging() {
        let resolver = StaticHierarchyResolver::java_core();
        let hierarchy = ClassHierarchy::new(&resolver);

        let integer_array = RefType::array(FieldType::object(BinaryName::INTEGER));
        let long_array = RefType::array(FieldType::object(BinaryName::LONG));
        assert_eq!(
            hierarchy.merge(&integer_array, &long_array),
            Some(RefType::array(FieldType::object(BinaryName::NUMBER)))
        );
        assert_eq!(
            hierarchy.merge(
                &RefType::array(FieldType::int()),
                &RefType::array(FieldType::long())
            ),
            Some(RefType::OBJECT),
            "distinct primitive arrays"
        );
        assert_eq!(
            hierarchy.merge(&object(BinaryName::STRING), &integer_array),
            Some(RefType::OBJECT)
        );
        assert_eq!(
            hierarchy.merge(
                &object(BinaryName::STRING),
                &object(BinaryName::from_str("me/Unknown").unwrap())
            ),
            None
        );
    }
}
