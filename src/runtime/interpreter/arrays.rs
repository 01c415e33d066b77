use paste::paste;

use super::{InterpreterEnv, null_pointer};
use crate::{
    descriptor,
    runtime::{
        Exception, FieldValue, NativeResult, ObjectRef, Value, class_loader, heap, inheritance,
    },
};

fn out_of_bounds(index: i32, length: usize) -> Exception {
    Exception::with_message(
        "java/lang/ArrayIndexOutOfBoundsException",
        format!("Index {index} out of bounds for length {length}"),
    )
}

fn checked(index: i32, length: usize) -> NativeResult<usize> {
    if index < 0 || index as usize >= length {
        return Err(out_of_bounds(index, length));
    }
    Ok(index as usize)
}

fn wrong_kind(array: &ObjectRef) -> Exception {
    Exception::fatal(format!("array instruction applied to {array:?}"))
}

/// `newarray` type codes.
fn primitive_tag(atype: u8) -> Option<u8> {
    Some(match atype {
        4 => b'Z',
        5 => b'C',
        6 => b'F',
        7 => b'D',
        8 => b'B',
        9 => b'S',
        10 => b'I',
        11 => b'J',
        _ => return None,
    })
}

macro_rules! array_access {
    ($($kind:ident => $variant:ident: $element:ty),* $(,)?) => {
        paste! {
            impl InterpreterEnv<'_> {
                $(
                    pub(super) fn [<load_ $kind>](&mut self) -> NativeResult<$element> {
                        let index = self.frame.pop_int()?;
                        let array = self.frame.pop_ref()?.ok_or_else(null_pointer)?;
                        array
                            .with_array(|elements| match elements {
                                FieldValue::$variant(elements) => {
                                    Ok(elements[checked(index, elements.len())?].clone())
                                }
                                _ => Err(wrong_kind(&array)),
                            })
                            .unwrap_or_else(|| Err(wrong_kind(&array)))
                    }

                    pub(super) fn [<store_ $kind>](&mut self, value: $element) -> NativeResult<()> {
                        let index = self.frame.pop_int()?;
                        let array = self.frame.pop_ref()?.ok_or_else(null_pointer)?;
                        array
                            .with_array_mut(|elements| match elements {
                                FieldValue::$variant(elements) => {
                                    let index = checked(index, elements.len())?;
                                    elements[index] = value;
                                    Ok(())
                                }
                                _ => Err(wrong_kind(&array)),
                            })
                            .unwrap_or_else(|| Err(wrong_kind(&array)))
                    }
                )*
            }
        }
    };
}

array_access! {
    bytes => Bytes: i8,
    ints => Ints: i64,
    floats => Floats: f64,
    refs => Refs: Option<ObjectRef>,
}

impl InterpreterEnv<'_> {
    /// `aastore`, checking the value against the array's component type.
    pub(super) fn store_reference(&mut self) -> NativeResult<()> {
        let value = self.frame.pop_ref()?;
        if let (Some(value), Some(array)) = (&value, self.frame.peek(1)?.as_ref()?) {
            let array_class = heap::class_of(&array)?;
            let component = array_class
                .component
                .as_ref()
                .and_then(|c| c.class_name())
                .ok_or_else(|| wrong_kind(&array))?;
            let component = class_loader::app().load(&component)?;
            if !inheritance::is_instance_of(value, &component)? {
                return Err(Exception::with_message(
                    "java/lang/ArrayStoreException",
                    value.class_name().replace('/', "."),
                ));
            }
        }
        self.store_refs(value)
    }

    pub(super) fn new_primitive_array(&mut self, atype: u8) -> NativeResult<()> {
        let tag = primitive_tag(atype)
            .ok_or_else(|| Exception::fatal(format!("newarray with type {atype}")))?;
        let length = self.frame.pop_int()?;
        let array = heap::primitive_array(tag, length)?;
        self.frame.push(Value::Ref(array))
    }

    pub(super) fn new_ref_array(&mut self, index: u16) -> NativeResult<()> {
        let element = self.resolve_class(index)?;
        let length = self.frame.pop_int()?;
        let array = heap::ref_array(&element.name, length)?;
        self.frame.push(Value::Ref(array))
    }

    pub(super) fn new_multi_array(&mut self, index: u16, dimensions: u8) -> NativeResult<()> {
        let array_class = self.resolve_class(index)?;
        let array_type = descriptor::field_type(&array_class.name).ok_or_else(|| {
            Exception::fatal(format!("multianewarray of {}", array_class.name))
        })?;
        let mut lengths = vec![0; dimensions as usize];
        for length in lengths.iter_mut().rev() {
            *length = self.frame.pop_int()?;
        }
        let array = heap::multi_array(&array_type, &lengths)?;
        self.frame.push(Value::Ref(array))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds() {
        assert_eq!(checked(0, 1).unwrap(), 0);
        let err = checked(2, 1).unwrap_err();
        assert_eq!(
            err.to_string(),
            "java.lang.ArrayIndexOutOfBoundsException: Index 2 out of bounds for length 1"
        );
        assert!(checked(-1, 5).is_err());
    }

    #[test]
    fn test_primitive_tags() {
        assert_eq!(primitive_tag(10), Some(b'I'));
        assert_eq!(primitive_tag(4), Some(b'Z'));
        assert_eq!(primitive_tag(3), None);
    }
}
