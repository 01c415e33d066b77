use std::{collections::HashMap, sync::Arc};

use once_cell::sync::Lazy;
use parking_lot::RwLock;

pub(crate) const EMPTY: u32 = 0;
pub(crate) const OBJECT: u32 = 1;
pub(crate) const STRING: u32 = 2;
pub(crate) const THREAD: u32 = 3;
pub(crate) const CLASS: u32 = 4;

const PREALLOCATED: [&str; 5] = [
    "",
    "java/lang/Object",
    "java/lang/String",
    "java/lang/Thread",
    "java/lang/Class",
];

struct StringPool {
    strings: Vec<Arc<str>>,
    index: HashMap<Arc<str>, u32>,
}

static POOL: Lazy<RwLock<StringPool>> = Lazy::new(|| {
    let mut pool = StringPool {
        strings: Vec::with_capacity(1024),
        index: HashMap::with_capacity(1024),
    };
    for name in PREALLOCATED {
        pool.push(name);
    }
    RwLock::new(pool)
});

impl StringPool {
    fn push(&mut self, s: &str) -> u32 {
        let string: Arc<str> = Arc::from(s);
        let index = self.strings.len() as u32;
        self.strings.push(Arc::clone(&string));
        self.index.insert(string, index);
        index
    }
}

/// Returns the index of `s`, appending it first if it is new.
pub(crate) fn intern(s: &str) -> u32 {
    if let Some(index) = POOL.read().index.get(s) {
        return *index;
    }
    let mut pool = POOL.write();
    // another writer may have won the race between the two locks
    if let Some(index) = pool.index.get(s) {
        return *index;
    }
    pool.push(s)
}

/// The index of `s` if it was interned before; never grows the pool.
pub(crate) fn find(s: &str) -> Option<u32> {
    POOL.read().index.get(s).copied()
}

/// Looks up an index previously returned by [`intern`].
pub(crate) fn get(index: u32) -> Arc<str> {
    match POOL.read().strings.get(index as usize) {
        Some(string) => Arc::clone(string),
        None => {
            log::error!("string pool index {index} out of range");
            Arc::from("")
        }
    }
}

pub(crate) fn size() -> usize {
    POOL.read().strings.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preallocated_indices() {
        assert_eq!(get(EMPTY).as_ref(), "");
        assert_eq!(get(OBJECT).as_ref(), "java/lang/Object");
        assert_eq!(get(STRING).as_ref(), "java/lang/String");
        assert_eq!(get(THREAD).as_ref(), "java/lang/Thread");
        assert_eq!(get(CLASS).as_ref(), "java/lang/Class");
        assert_eq!(intern("java/lang/String"), STRING);
    }

    #[test]
    fn test_intern_is_stable() {
        let before = size();
        let a = intern("pool/test/Alpha");
        let b = intern("pool/test/Beta");
        assert_ne!(a, b);
        assert_eq!(intern("pool/test/Alpha"), a);
        assert_eq!(get(b).as_ref(), "pool/test/Beta");
        assert!(size() >= before + 2);
    }

    #[test]
    fn test_find_does_not_intern() {
        assert_eq!(find("java/lang/Thread"), Some(THREAD));
        assert_eq!(find("pool/test/NeverInterned"), None);
        assert!(!POOL.read().index.contains_key("pool/test/NeverInterned"));
        let index = intern("pool/test/Later");
        assert_eq!(find("pool/test/Later"), Some(index));
    }

    #[test]
    fn test_concurrent_interning_agrees() {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                std::thread::spawn(|| {
                    (0..100)
                        .map(|i| intern(&format!("pool/race/N{i}")))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for result in &results[1..] {
            assert_eq!(result, &results[0]);
        }
    }
}
