use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::runtime::{NativeResult, Object, ObjectRef, heap, string_pool};

static STRING_TABLE: Lazy<DashMap<u32, ObjectRef>> = Lazy::new(DashMap::new);

pub(crate) fn intern(s: &str) -> ObjectRef {
    let index = string_pool::intern(s);
    STRING_TABLE
        .entry(index)
        .or_insert_with(|| heap::string_object(s))
        .value()
        .clone()
}

/// `String.intern()`: the canonical object with the same contents, which is
/// `string` itself when it is the first of its contents to be interned.
pub(crate) fn intern_object(string: &ObjectRef) -> NativeResult<ObjectRef> {
    let contents = heap::rust_string(string)?;
    let index = string_pool::intern(&contents);
    Ok(STRING_TABLE
        .entry(index)
        .or_insert_with(|| string.clone())
        .value()
        .clone())
}

pub(crate) fn is_interned(string: &Object) -> bool {
    let Ok(contents) = heap::rust_string(string) else {
        return false;
    };
    let index = string_pool::intern(&contents);
    STRING_TABLE
        .get(&index)
        .is_some_and(|s| std::ptr::eq(s.value().as_ref(), string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_literals_are_canonical() {
        let a = intern("table-xy");
        let b = intern("table-xy");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(is_interned(&a));
    }

    #[test]
    fn test_intern_object() {
        let first = heap::string_object("table-fresh");
        let canonical = intern_object(&first).unwrap();
        assert!(Arc::ptr_eq(&first, &canonical));

        let copy = heap::string_object("table-fresh");
        assert!(!is_interned(&copy));
        assert!(Arc::ptr_eq(&intern_object(&copy).unwrap(), &first));
    }
}
