use std::sync::Arc;

use super::{InterpreterEnv, null_pointer};
use crate::runtime::{
    Class, Exception, FieldValue, NativeResult, Value, class_loader, heap, statics,
    structs::{ConstantPoolInfo, CpMemberRef},
};

fn field_ref(class: &Class, index: u16) -> NativeResult<&CpMemberRef> {
    match class.constant(index) {
        Some(ConstantPoolInfo::Fieldref(member)) => Ok(member),
        other => Err(Exception::fatal(format!(
            "constant {index} of {} is not a field reference: {other:?}",
            class.name
        ))),
    }
}

fn slots(descriptor: &str) -> usize {
    if matches!(descriptor.as_bytes().first(), Some(b'J' | b'D')) {
        2
    } else {
        1
    }
}

/// Values stored into `byte`, `char`, `short` and `boolean` fields are truncated.
fn narrow(descriptor: &str, value: Value) -> Value {
    let Value::Int(v) = value else {
        return value;
    };
    Value::Int(match descriptor.as_bytes().first() {
        Some(b'B') => v as i8 as i64,
        Some(b'C') => v as u16 as i64,
        Some(b'S') => v as i16 as i64,
        Some(b'Z') => v & 1,
        _ => v,
    })
}

fn default_value(descriptor: &str) -> Value {
    FieldValue::default_for(descriptor)
        .to_value()
        .unwrap_or_default()
}

enum StaticSlot {
    Ready(Arc<Class>),
    Initialize(Arc<Class>),
}

/// The class whose statics table entry holds `member`.
fn static_owner(class: &Class, member: &CpMemberRef) -> NativeResult<StaticSlot> {
    let referenced = class_loader::loader_of(class)
        .load(&member.class)
        .map_err(class_loader::linkage_error)?;
    let owner = match statics::declaring_class(&referenced, &member.name) {
        Some(owner) => owner,
        None => {
            if statics::needs_initialization(&referenced) {
                return Ok(StaticSlot::Initialize(referenced));
            }
            statics::table_owner(&referenced, &member.name).ok_or_else(|| {
                Exception::with_message("java/lang/NoSuchFieldError", member.name.to_string())
            })?
        }
    };
    Ok(if statics::needs_initialization(&owner) {
        StaticSlot::Initialize(owner)
    } else {
        StaticSlot::Ready(owner)
    })
}

impl InterpreterEnv<'_> {
    /// `Some(class)` when `class` must be initialized before the access.
    pub(super) fn get_static(&mut self) -> NativeResult<Option<Arc<Class>>> {
        let index = self.u16_arg();
        let class = Arc::clone(&self.frame.class);
        let member = field_ref(&class, index)?;
        let owner = match static_owner(&class, member)? {
            StaticSlot::Ready(owner) => owner,
            StaticSlot::Initialize(owner) => return Ok(Some(owner)),
        };
        let value = statics::get_static_value(&owner.name, &member.name)
            .unwrap_or_else(|| default_value(&member.descriptor));
        self.frame.push_slots(value, slots(&member.descriptor))?;
        Ok(None)
    }

    pub(super) fn put_static(&mut self) -> NativeResult<Option<Arc<Class>>> {
        let index = self.u16_arg();
        let class = Arc::clone(&self.frame.class);
        let member = field_ref(&class, index)?;
        let owner = match static_owner(&class, member)? {
            StaticSlot::Ready(owner) => owner,
            StaticSlot::Initialize(owner) => return Ok(Some(owner)),
        };
        let value = if slots(&member.descriptor) == 2 {
            self.frame.pop_wide()?
        } else {
            self.frame.pop()?
        };
        let value = narrow(&member.descriptor, value);
        if !statics::put(&owner.name, &member.name, value.clone()) {
            statics::set(&owner.name, &member.name, &member.descriptor, value);
        }
        Ok(None)
    }

    pub(super) fn get_field(&mut self) -> NativeResult<()> {
        let index = self.u16_arg();
        let class = Arc::clone(&self.frame.class);
        let member = field_ref(&class, index)?;
        let Some(object) = self.frame.pop_ref()? else {
            return Err(Exception::with_message(
                "java/lang/NullPointerException",
                format!("Cannot read field \"{}\" because value is null", member.name),
            ));
        };
        let value = object
            .get(&member.name)
            .unwrap_or_else(|| default_value(&member.descriptor));
        self.frame.push_slots(value, slots(&member.descriptor))
    }

    pub(super) fn put_field(&mut self) -> NativeResult<()> {
        let index = self.u16_arg();
        let class = Arc::clone(&self.frame.class);
        let member = field_ref(&class, index)?;
        let value = if slots(&member.descriptor) == 2 {
            self.frame.pop_wide()?
        } else {
            self.frame.pop()?
        };
        let Some(object) = self.frame.pop_ref()? else {
            return Err(Exception::with_message(
                "java/lang/NullPointerException",
                format!("Cannot assign field \"{}\" because value is null", member.name),
            ));
        };
        object.set(&member.name, &member.descriptor, narrow(&member.descriptor, value));
        Ok(())
    }

    /// `new`; `Some(class)` when the class must be initialized first.
    pub(super) fn new_object(&mut self) -> NativeResult<Option<Arc<Class>>> {
        let index = self.u16_arg();
        let class = self.resolve_class(index)?;
        if class.is_interface() || class.access_flags.contains(crate::consts::ClassAccessFlag::ABSTRACT) {
            return Err(Exception::with_message(
                "java/lang/InstantiationError",
                class.name.replace('/', "."),
            ));
        }
        if statics::needs_initialization(&class) {
            return Ok(Some(class));
        }
        self.frame.push(Value::Ref(heap::new_object(&class)))?;
        Ok(None)
    }

    pub(super) fn array_length(&mut self) -> NativeResult<()> {
        let array = self.frame.pop_ref()?.ok_or_else(null_pointer)?;
        let length = array
            .array_len()
            .ok_or_else(|| Exception::fatal(format!("arraylength of {array:?}")))?;
        self.frame.push_int(length as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_narrowing() {
        assert_eq!(narrow("B", Value::int(200)).as_int().unwrap(), -56);
        assert_eq!(narrow("C", Value::int(-1)).as_int().unwrap(), 0xffff);
        assert_eq!(narrow("S", Value::int(0x1_8000)).as_int().unwrap(), -32768);
        assert_eq!(narrow("Z", Value::int(3)).as_int().unwrap(), 1);
        assert_eq!(narrow("J", Value::long(1 << 40)).as_long().unwrap(), 1 << 40);
    }

    #[test]
    fn test_defaults_and_slots() {
        assert!(default_value("Ljava/lang/String;").is_null());
        assert_eq!(default_value("D").as_double().unwrap(), 0.0);
        assert_eq!(slots("J"), 2);
        assert_eq!(slots("[J"), 1);
    }
}
