use std::sync::Arc;

use crate::{
    descriptor::FieldType,
    runtime::{Class, NativeResult, Object, class_loader, heap, mtable},
};

/// source: class of the value being assigned
/// target: class of the variable, parameter or array element it goes into
pub(crate) fn is_assignable_to(source: &Arc<Class>, target: &Arc<Class>) -> bool {
    if Arc::ptr_eq(source, target) || source.name == target.name {
        return true;
    }
    if let Some(source_component) = &source.component {
        // source is array
        if let Some(target_component) = &target.component {
            if source_component.is_primitive() || target_component.is_primitive() {
                return source_component == target_component;
            }
            return match (component_class(source), component_class(target)) {
                (Some(s), Some(t)) => is_assignable_to(&s, &t),
                _ => false,
            };
        }
        return if target.is_interface() {
            target.name.as_ref() == "java/lang/Cloneable"
                || target.name.as_ref() == "java/io/Serializable"
        } else {
            target.name.as_ref() == "java/lang/Object"
        };
    }
    if target.is_interface() {
        is_class_implements(source, target)
    } else {
        is_same_or_sub_class_of(source, target)
    }
}

pub(crate) fn is_class_implements(class: &Arc<Class>, interface: &Arc<Class>) -> bool {
    mtable::all_interfaces(class)
        .iter()
        .any(|i| i.name == interface.name)
}

pub(crate) fn is_same_or_sub_class_of(source: &Arc<Class>, target: &Arc<Class>) -> bool {
    source.ancestors().any(|c| c.name == target.name)
}

/// Walks superclasses only; enough for matching catch types and Error checks.
pub(crate) fn is_subclass_named(class: &Arc<Class>, name: &str) -> bool {
    class.ancestors().any(|c| c.name.as_ref() == name)
}

fn component_class(array: &Class) -> Option<Arc<Class>> {
    match array.component.as_ref()? {
        component @ (FieldType::Object(_) | FieldType::Array(_)) => {
            class_loader::app().load(&component.class_name()?).ok()
        }
        _ => None,
    }
}

/// `instanceof` / `checkcast` against a resolved class.
pub(crate) fn is_instance_of(object: &Object, target: &Arc<Class>) -> NativeResult<bool> {
    Ok(is_assignable_to(&heap::class_of(object)?, target))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(name: &str) -> Arc<Class> {
        class_loader::app().load(name).unwrap()
    }

    #[test]
    fn test_classes_and_interfaces() {
        let integer = load("java/lang/Integer");
        assert!(is_assignable_to(&integer, &load("java/lang/Number")));
        assert!(is_assignable_to(&integer, &load("java/lang/Comparable")));
        assert!(is_assignable_to(&integer, &load("java/io/Serializable")));
        assert!(!is_assignable_to(&integer, &load("java/lang/String")));
        assert!(is_assignable_to(&load("java/io/Closeable"), &load("java/lang/AutoCloseable")));
    }

    #[test]
    fn test_arrays() {
        let strings = load("[Ljava/lang/String;");
        assert!(is_assignable_to(&strings, &load("[Ljava/lang/Object;")));
        assert!(is_assignable_to(&strings, &load("java/lang/Cloneable")));
        assert!(is_assignable_to(&strings, &load("java/lang/Object")));
        assert!(!is_assignable_to(&load("[Ljava/lang/Object;"), &strings));
        assert!(!is_assignable_to(&load("[I"), &load("[J")));
        assert!(!is_assignable_to(&load("[I"), &load("[Ljava/lang/Object;")));
        assert!(is_assignable_to(&load("[[I"), &load("[Ljava/lang/Object;")));
    }

    #[test]
    fn test_instance_of() {
        let s = heap::string_object("x");
        assert!(is_instance_of(&s, &load("java/lang/CharSequence")).unwrap());
        assert!(!is_instance_of(&s, &load("java/lang/Number")).unwrap());
        assert!(is_subclass_named(
            &load("java/lang/ArithmeticException"),
            "java/lang/RuntimeException"
        ));
    }
}
