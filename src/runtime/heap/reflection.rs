use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::{
    descriptor::FieldType,
    runtime::{
        Class, Exception, NativeResult, Object, ObjectRef, Value, class_loader, heap,
        string_pool,
    },
};

const CLASS_FIELD: &str = "$class";
const PRIMITIVE_FIELD: &str = "$primitive";

static PRIMITIVE_MIRRORS: Lazy<DashMap<&'static str, ObjectRef>> = Lazy::new(DashMap::new);

fn mirror_object(name: &str, primitive: bool) -> ObjectRef {
    let mirror = Object::new(string_pool::CLASS);
    mirror.set(CLASS_FIELD, "I", Value::int(string_pool::intern(name) as i32));
    mirror.set(PRIMITIVE_FIELD, "Z", Value::boolean(primitive));
    Arc::new(mirror)
}

pub(crate) fn class_mirror(class: &Arc<Class>) -> ObjectRef {
    class
        .mirror
        .get_or_init(|| mirror_object(&class.name, false))
        .clone()
}

/// `int.class` and friends; `void` included.
pub(crate) fn primitive_mirror(primitive: &FieldType) -> Option<ObjectRef> {
    let name = primitive.primitive_name()?;
    Some(primitive_mirror_named(name))
}

pub(crate) fn primitive_mirror_named(name: &'static str) -> ObjectRef {
    PRIMITIVE_MIRRORS
        .entry(name)
        .or_insert_with(|| mirror_object(name, true))
        .clone()
}

fn hidden_index(mirror: &Object) -> NativeResult<u32> {
    mirror
        .get_int(CLASS_FIELD)
        .map(|i| i as u32)
        .ok_or_else(|| Exception::fatal(format!("{mirror:?} is not a class mirror")))
}

/// Internal name (`java/lang/String`, `[I`) or primitive name (`int`).
pub(crate) fn mirror_name(mirror: &Object) -> NativeResult<Arc<str>> {
    Ok(string_pool::get(hidden_index(mirror)?))
}

pub(crate) fn is_primitive_mirror(mirror: &Object) -> bool {
    mirror.get_int(PRIMITIVE_FIELD) == Some(1)
}

/// The class a mirror stands for; `None` for primitive mirrors.
pub(crate) fn mirror_class(mirror: &Object) -> NativeResult<Option<Arc<Class>>> {
    if is_primitive_mirror(mirror) {
        return Ok(None);
    }
    let name = mirror_name(mirror)?;
    Ok(Some(class_loader::app().load(&name)?))
}

/// `Class.getName()`: dotted binary names, arrays in descriptor form.
pub(crate) fn java_name(mirror: &Object) -> NativeResult<String> {
    Ok(mirror_name(mirror)?.replace('/', "."))
}

pub(crate) fn mirror_of_type(field_type: &FieldType) -> NativeResult<ObjectRef> {
    match field_type.class_name() {
        Some(name) => Ok(class_mirror(&class_loader::app().load(&name)?)),
        None => primitive_mirror(field_type)
            .ok_or_else(|| Exception::fatal(format!("no mirror for {field_type}"))),
    }
}

/// Mirror of the runtime class of `object`.
pub(crate) fn mirror_of(object: &Object) -> NativeResult<ObjectRef> {
    Ok(class_mirror(&heap::class_of(object)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_mirrors_are_cached() {
        let string = class_loader::bootstrap().load("java/lang/String").unwrap();
        let a = class_mirror(&string);
        let b = class_mirror(&string);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(java_name(&a).unwrap(), "java.lang.String");
        assert!(!is_primitive_mirror(&a));
        assert!(Arc::ptr_eq(&mirror_class(&a).unwrap().unwrap(), &string));
    }

    #[test]
    fn test_primitive_mirrors() {
        let int = primitive_mirror(&FieldType::Int).unwrap();
        assert!(Arc::ptr_eq(&int, &primitive_mirror_named("int")));
        assert!(is_primitive_mirror(&int));
        assert_eq!(java_name(&int).unwrap(), "int");
        assert!(mirror_class(&int).unwrap().is_none());
        assert!(primitive_mirror(&FieldType::Object("x".into())).is_none());
    }
}
