use std::{collections::HashMap, fmt, sync::Arc};

use once_cell::sync::OnceCell;
use parking_lot::RwLock;

use crate::runtime::{Value, string_pool, structs::Monitor};

pub type ObjectRef = Arc<Object>;

/// Heap object. Arrays are objects whose `value` field holds the elements.
pub struct Object {
    /// string pool index of the class name
    pub(crate) class_index: u32,
    pub(crate) fields: RwLock<HashMap<String, Field>>,
    monitor: OnceCell<Monitor>,
}

#[derive(Debug, Clone)]
pub struct Field {
    pub(crate) ftype: Arc<str>,
    pub(crate) value: FieldValue,
}

#[derive(Debug, Clone)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Ref(ObjectRef),
    Null,
    /// `[B` and `[Z` elements
    Bytes(Vec<i8>),
    /// `[C`, `[S`, `[I` and `[J` elements
    Ints(Vec<i64>),
    /// `[F` and `[D` elements
    Floats(Vec<f64>),
    Refs(Vec<Option<ObjectRef>>),
}

impl FieldValue {
    pub(crate) fn to_value(&self) -> Option<Value> {
        Some(match self {
            FieldValue::Int(v) => Value::Int(*v),
            FieldValue::Float(v) => Value::Float(*v),
            FieldValue::Ref(obj) => Value::Ref(Arc::clone(obj)),
            FieldValue::Null => Value::Null,
            _ => return None,
        })
    }

    /// Zero value for a field of the given descriptor.
    pub(crate) fn default_for(descriptor: &str) -> FieldValue {
        match descriptor.as_bytes().first() {
            Some(b'F' | b'D') => FieldValue::Float(0.0),
            Some(b'L' | b'[') => FieldValue::Null,
            _ => FieldValue::Int(0),
        }
    }

    pub(crate) fn len(&self) -> Option<usize> {
        Some(match self {
            FieldValue::Bytes(v) => v.len(),
            FieldValue::Ints(v) => v.len(),
            FieldValue::Floats(v) => v.len(),
            FieldValue::Refs(v) => v.len(),
            _ => return None,
        })
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Int(v) => FieldValue::Int(v),
            Value::Float(v) => FieldValue::Float(v),
            Value::Ref(obj) => FieldValue::Ref(obj),
            Value::Null => FieldValue::Null,
        }
    }
}

impl Object {
    pub(crate) fn new(class_index: u32) -> Object {
        Object {
            class_index,
            fields: RwLock::new(HashMap::new()),
            monitor: OnceCell::new(),
        }
    }

    pub(crate) fn with_class_name(class_name: &str) -> Object {
        Self::new(string_pool::intern(class_name))
    }

    pub fn class_name(&self) -> Arc<str> {
        string_pool::get(self.class_index)
    }

    pub fn is_array(&self) -> bool {
        self.class_name().starts_with('[')
    }

    pub(crate) fn is_string(&self) -> bool {
        self.class_index == string_pool::STRING
    }

    /// Allocated on first use.
    pub(crate) fn monitor(&self) -> &Monitor {
        self.monitor.get_or_init(Monitor::default)
    }

    pub(crate) fn has_field(&self, name: &str) -> bool {
        self.fields.read().contains_key(name)
    }

    /// Scalar field value; `None` when absent or holding array contents.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.fields.read().get(name)?.value.to_value()
    }

    pub(crate) fn get_ref(&self, name: &str) -> Option<ObjectRef> {
        match self.get(name)? {
            Value::Ref(obj) => Some(obj),
            _ => None,
        }
    }

    pub(crate) fn get_int(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            Value::Int(v) => Some(v),
            _ => None,
        }
    }

    pub(crate) fn set(&self, name: &str, ftype: &str, value: Value) {
        self.set_field(name, ftype, value.into());
    }

    pub(crate) fn set_field(&self, name: &str, ftype: &str, value: FieldValue) {
        let mut fields = self.fields.write();
        match fields.get_mut(name) {
            Some(field) => field.value = value,
            None => {
                fields.insert(
                    name.to_string(),
                    Field {
                        ftype: Arc::from(ftype),
                        value,
                    },
                );
            }
        }
    }

    /// Replaces the value of an existing field, keeping its declared type.
    pub(crate) fn put(&self, name: &str, value: Value) -> bool {
        match self.fields.write().get_mut(name) {
            Some(field) => {
                field.value = value.into();
                true
            }
            None => false,
        }
    }

    /// Sets an integer field to `new` only if it currently holds `expected`.
    pub(crate) fn compare_and_put_int(&self, name: &str, expected: i64, new: Value) -> bool {
        let mut fields = self.fields.write();
        match fields.get_mut(name) {
            Some(field) if matches!(field.value, FieldValue::Int(v) if v == expected) => {
                field.value = new.into();
                true
            }
            _ => false,
        }
    }

        pub(crate) fn field_type(&self, name: &str) -> Option<Arc<str>> {
        self.fields.read().get(name).map(|f| Arc::clone(&f.ftype))
    }

    pub(crate) fn array_len(&self) -> Option<usize> {
        self.fields.read().get("value")?.value.len()
    }

    pub(crate) fn with_array<R>(&self, f: impl FnOnce(&FieldValue) -> R) -> Option<R> {
        let fields = self.fields.read();
        let field = fields.get("value")?;
        field.value.len()?;
        Some(f(&field.value))
    }

    pub(crate) fn with_array_mut<R>(&self, f: impl FnOnce(&mut FieldValue) -> R) -> Option<R> {
        let mut fields = self.fields.write();
        let field = fields.get_mut("value")?;
        field.value.len()?;
        Some(f(&mut field.value))
    }

    /// Shallow copy with a fresh monitor.
    pub(crate) fn shallow_clone(&self) -> Object {
        Object {
            class_index: self.class_index,
            fields: RwLock::new(self.fields.read().clone()),
            monitor: OnceCell::new(),
        }
    }

    /// Identity hash, stable for the object's lifetime.
    pub(crate) fn identity_hash(self: &Arc<Self>) -> i32 {
        let addr = Arc::as_ptr(self) as usize as u64;
        ((addr >> 4) ^ (addr >> 36)) as i32 & 0x7fff_ffff
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:p}", self.class_name(), self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_keep_declared_type() {
        let obj = Object::with_class_name("object/test/Point");
        obj.set("x", "I", Value::int(3));
        assert!(obj.put("x", Value::int(4)));
        assert!(!obj.put("y", Value::int(1)));
        assert_eq!(obj.get_int("x"), Some(4));
        assert_eq!(obj.field_type("x").as_deref(), Some("I"));
        assert_eq!(obj.class_name().as_ref(), "object/test/Point");
    }

    #[test]
    fn test_array_access() {
        let arr = Object::with_class_name("[I");
        arr.set_field("value", "[I", FieldValue::Ints(vec![0; 4]));
        assert_eq!(arr.array_len(), Some(4));
        arr.with_array_mut(|v| {
            if let FieldValue::Ints(v) = v {
                v[2] = 9;
            }
        });
        let third = arr.with_array(|v| match v {
            FieldValue::Ints(v) => v[2],
            _ => -1,
        });
        assert_eq!(third, Some(9));
        assert!(arr.is_array());
        assert!(arr.get("value").is_none());
    }

    #[test]
    fn test_compare_and_put_has_one_winner() {
        let obj = Arc::new(Object::with_class_name("java/lang/Thread"));
        obj.set("threadStatus", "I", Value::int(0));
        let winners: usize = (0..8)
            .map(|_| {
                let obj = obj.clone();
                std::thread::spawn(move || obj.compare_and_put_int("threadStatus", 0, Value::int(1)))
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|handle| handle.join().unwrap() as usize)
            .sum();
        assert_eq!(winners, 1);
        assert_eq!(obj.get_int("threadStatus"), Some(1));
        assert!(!obj.compare_and_put_int("missing", 0, Value::int(1)));
    }

    #[test]
    fn test_identity_hash_and_clone() {
        let a = Arc::new(Object::with_class_name("java/lang/Object"));
        assert_eq!(a.identity_hash(), a.identity_hash());
        a.set("n", "J", Value::long(7));
        let b = Arc::new(a.shallow_clone());
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(b.get_int("n"), Some(7));
    }
}
