use std::sync::Arc;

use crate::{
    descriptor::FieldType,
    runtime::{
        Class, Exception, FieldValue, NativeResult, Object, ObjectRef, Value, class_loader,
        method_area, string_pool,
    },
};

pub(crate) mod reflection;
pub(crate) mod string_table;

/// Upper bound on a single array's elements; also what `Runtime.maxMemory` reports.
pub(crate) const MAX_MEMORY: i64 = 1 << 32;

/// Instance of `java/lang/Object` with no fields.
pub(crate) fn empty_object() -> ObjectRef {
    Arc::new(Object::new(string_pool::OBJECT))
}

pub(crate) fn object_with_class_name(name: &str) -> ObjectRef {
    Arc::new(Object::with_class_name(name))
}

/// A fresh instance with every instance field of `class` and its superclasses
/// at its zero value.
pub(crate) fn new_object(class: &Arc<Class>) -> ObjectRef {
    let object = Object::new(class.name_index);
    let mut chain: Vec<_> = class.ancestors().collect();
    // the nearest declaration of a name decides its type
    chain.reverse();
    for current in chain {
        for field in current.fields.iter().filter(|f| !f.is_static()) {
            object.set_field(
                &field.name,
                &field.descriptor,
                FieldValue::default_for(&field.descriptor),
            );
        }
    }
    Arc::new(object)
}

/// A one-field holder such as a boxed primitive: `value` of type `descriptor`.
pub(crate) fn primitive_object(class: &str, descriptor: &str, value: Value) -> ObjectRef {
    let object = Object::with_class_name(class);
    object.set("value", descriptor, value);
    Arc::new(object)
}

fn array(class_name: &str, elements: FieldValue) -> ObjectRef {
    let object = Object::with_class_name(class_name);
    object.set_field("value", class_name, elements);
    Arc::new(object)
}

fn check_length(length: i32) -> NativeResult<usize> {
    if length < 0 {
        return Err(Exception::with_message(
            "java/lang/NegativeArraySizeException",
            length.to_string(),
        ));
    }
    Ok(length as usize)
}

fn out_of_memory() -> Exception {
    Exception::with_message("java/lang/OutOfMemoryError", "Java heap space")
}

/// `length` copies of `zero`, or `OutOfMemoryError` when the elements would
/// exceed [`MAX_MEMORY`] or the host refuses the allocation.
fn zeroed<T: Clone>(zero: T, length: usize) -> NativeResult<Vec<T>> {
    let bytes = length.saturating_mul(std::mem::size_of::<T>().max(1));
    if bytes as u64 > MAX_MEMORY as u64 {
        return Err(out_of_memory());
    }
    let mut elements = Vec::new();
    elements.try_reserve_exact(length).map_err(|_| out_of_memory())?;
    elements.resize(length, zero);
    Ok(elements)
}

/// `newarray`: zeroed array of the primitive named by its descriptor letter.
pub(crate) fn primitive_array(tag: u8, length: i32) -> NativeResult<ObjectRef> {
    let length = check_length(length)?;
    let elements = match tag {
        b'B' | b'Z' => FieldValue::Bytes(zeroed(0, length)?),
        b'C' | b'S' | b'I' | b'J' => FieldValue::Ints(zeroed(0, length)?),
        b'F' | b'D' => FieldValue::Floats(zeroed(0.0, length)?),
        _ => return Err(Exception::fatal(format!("bad primitive array tag {tag}"))),
    };
    Ok(array(&format!("[{}", tag as char), elements))
}

/// `anewarray`: array of nulls whose elements are of class `element`
/// (an internal name, or an array descriptor for nested arrays).
pub(crate) fn ref_array(element: &str, length: i32) -> NativeResult<ObjectRef> {
    let length = check_length(length)?;
    Ok(array(&array_class_name(element), FieldValue::Refs(zeroed(None, length)?)))
}

pub(crate) fn array_class_name(element: &str) -> String {
    if element.starts_with('[') {
        format!("[{element}")
    } else {
        format!("[L{element};")
    }
}

pub(crate) fn ref_array_from(element: &str, items: Vec<Option<ObjectRef>>) -> ObjectRef {
    array(&array_class_name(element), FieldValue::Refs(items))
}

pub(crate) fn int_array_from(tag: u8, items: Vec<i64>) -> ObjectRef {
    array(&format!("[{}", tag as char), FieldValue::Ints(items))
}

pub(crate) fn byte_array_from(items: Vec<i8>) -> ObjectRef {
    array("[B", FieldValue::Bytes(items))
}

/// Zeroed array of any array type.
pub(crate) fn array_of(array_type: &FieldType, length: i32) -> NativeResult<ObjectRef> {
    let FieldType::Array(component) = array_type else {
        return Err(Exception::fatal(format!("{array_type} is not an array type")));
    };
    match component.as_ref() {
        FieldType::Object(name) => ref_array(name, length),
        FieldType::Array(_) => ref_array(&component.to_descriptor(), length),
        primitive => primitive_array(primitive.to_descriptor().as_bytes()[0], length),
    }
}

/// `multianewarray`: nested arrays for the leading `lengths`, deeper levels null.
pub(crate) fn multi_array(array_type: &FieldType, lengths: &[i32]) -> NativeResult<ObjectRef> {
    for length in lengths {
        check_length(*length)?;
    }
    build_multi_array(array_type, lengths)
}

fn build_multi_array(array_type: &FieldType, lengths: &[i32]) -> NativeResult<ObjectRef> {
    let outer = array_of(array_type, lengths[0])?;
    if lengths.len() > 1 {
        let FieldType::Array(component) = array_type else {
            return Err(Exception::fatal("too many dimensions"));
        };
        let children = (0..lengths[0])
            .map(|_| build_multi_array(component, &lengths[1..]).map(Some))
            .collect::<NativeResult<Vec<_>>>()?;
        outer.set_field("value", &array_type.to_descriptor(), FieldValue::Refs(children));
    }
    Ok(outer)
}

/// Creates a `java/lang/String`; the contents are kept as UTF-8 bytes.
pub(crate) fn string_object(s: &str) -> ObjectRef {
    let bytes = s.as_bytes().iter().map(|b| *b as i8).collect();
    let object = Object::new(string_pool::STRING);
    object.set_field("value", "[B", FieldValue::Bytes(bytes));
    Arc::new(object)
}

pub(crate) fn string_from_utf16(units: &[u16]) -> ObjectRef {
    string_object(&String::from_utf16_lossy(units))
}

/// Contents of a `java/lang/String`.
pub(crate) fn rust_string(object: &Object) -> NativeResult<String> {
    if !object.is_string() {
        return Err(Exception::fatal(format!(
            "expected java.lang.String, found {}",
            object.class_name()
        )));
    }
    object
        .with_array(|value| match value {
            FieldValue::Bytes(bytes) => {
                let bytes: Vec<u8> = bytes.iter().map(|b| *b as u8).collect();
                Some(String::from_utf8_lossy(&bytes).into_owned())
            }
            _ => None,
        })
        .flatten()
        .ok_or_else(|| Exception::fatal("string without contents"))
}

/// `null` for a null reference.
pub(crate) fn rust_string_or_null(value: &Value) -> NativeResult<String> {
    match value.as_ref()? {
        Some(object) => rust_string(&object),
        None => Ok("null".to_string()),
    }
}

pub(crate) fn string_value(s: &str) -> Value {
    Value::Ref(string_object(s))
}

/// The class an object is an instance of.
pub(crate) fn class_of(object: &Object) -> NativeResult<Arc<Class>> {
    let name = object.class_name();
    match method_area::fetch(&name) {
        Some(class) => Ok(class),
        None => class_loader::app().load(&name),
    }
}

/// Box class and field descriptor of a primitive type.
pub(crate) fn box_class(primitive: &FieldType) -> Option<(&'static str, &'static str)> {
    Some(match primitive {
        FieldType::Byte => ("java/lang/Byte", "B"),
        FieldType::Char => ("java/lang/Character", "C"),
        FieldType::Double => ("java/lang/Double", "D"),
        FieldType::Float => ("java/lang/Float", "F"),
        FieldType::Int => ("java/lang/Integer", "I"),
        FieldType::Long => ("java/lang/Long", "J"),
        FieldType::Short => ("java/lang/Short", "S"),
        FieldType::Boolean => ("java/lang/Boolean", "Z"),
        _ => return None,
    })
}

/// Value held by a box (`Integer`, `Double`, ...); `None` for other objects.
pub(crate) fn unbox(object: &Object) -> Option<(FieldType, Value)> {
    let name = object.class_name();
    let primitive = match name.as_ref() {
        "java/lang/Byte" => FieldType::Byte,
        "java/lang/Character" => FieldType::Char,
        "java/lang/Double" => FieldType::Double,
        "java/lang/Float" => FieldType::Float,
        "java/lang/Integer" => FieldType::Int,
        "java/lang/Long" => FieldType::Long,
        "java/lang/Short" => FieldType::Short,
        "java/lang/Boolean" => FieldType::Boolean,
        _ => return None,
    };
    Some((primitive, object.get("value")?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strings_round_trip() {
        let s = string_object("héllo 🌍");
        assert_eq!(rust_string(&s).unwrap(), "héllo 🌍");
        assert!(s.is_string());
        assert_eq!(rust_string_or_null(&Value::Null).unwrap(), "null");
        assert!(rust_string(&empty_object()).unwrap_err().is_fatal());
    }

    #[test]
    fn test_arrays() {
        let ints = primitive_array(b'I', 3).unwrap();
        assert_eq!(ints.class_name().as_ref(), "[I");
        assert_eq!(ints.array_len(), Some(3));
        let strings = ref_array("java/lang/String", 2).unwrap();
        assert_eq!(strings.class_name().as_ref(), "[Ljava/lang/String;");
        let nested = ref_array("[I", 1).unwrap();
        assert_eq!(nested.class_name().as_ref(), "[[I");
        match primitive_array(b'J', -1).unwrap_err() {
            Exception::Vm { class_name, message } => {
                assert_eq!(class_name.as_ref(), "java/lang/NegativeArraySizeException");
                assert_eq!(message.as_deref(), Some("-1"));
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn test_huge_array_is_out_of_memory() {
        for err in [
            primitive_array(b'J', i32::MAX).unwrap_err(),
            ref_array("java/lang/Object", i32::MAX).unwrap_err(),
        ] {
            assert_eq!(err.to_string(), "java.lang.OutOfMemoryError: Java heap space");
        }
        assert_eq!(primitive_array(b'B', 0).unwrap().array_len(), Some(0));
    }

    #[test]
    fn test_multi_array() {
        let array_type = crate::descriptor::field_type("[[[D").unwrap();
        let cube = multi_array(&array_type, &[2, 3]).unwrap();
        assert_eq!(cube.class_name().as_ref(), "[[[D");
        let rows = cube
            .with_array(|v| match v {
                FieldValue::Refs(rows) => rows.clone(),
                _ => vec![],
            })
            .unwrap();
        assert_eq!(rows.len(), 2);
        let row = rows[0].as_ref().unwrap();
        assert_eq!(row.class_name().as_ref(), "[[D");
        assert_eq!(row.array_len(), Some(3));
    }

    #[test]
    fn test_boxes() {
        let boxed = primitive_object("java/lang/Integer", "I", Value::int(7));
        let (primitive, value) = unbox(&boxed).unwrap();
        assert_eq!(primitive, FieldType::Int);
        assert_eq!(value.as_int().unwrap(), 7);
        assert!(unbox(&empty_object()).is_none());
    }
}
