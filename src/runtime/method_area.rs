use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use dashmap::DashMap;
use once_cell::sync::{Lazy, OnceCell};

use crate::runtime::{Class, ClinitStatus, NativeResult, string_pool};

#[derive(Debug, Default)]
pub(crate) struct ClassEntry {
    cell: OnceCell<Arc<Class>>,
    loading: AtomicBool,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ClassStatus {
    Absent,
    Loading,
    Loaded,
    Initializing,
    Initialized,
    /// `<clinit>` completed abruptly
    Erroneous,
}

static METHOD_AREA: Lazy<DashMap<u32, Arc<ClassEntry>>> = Lazy::new(DashMap::new);

impl ClassEntry {
    /// Runs `define` unless the class is already published; concurrent
    /// callers wait for the first one to finish.
    pub(crate) fn get_or_define(
        &self,
        define: impl FnOnce() -> NativeResult<Arc<Class>>,
    ) -> NativeResult<Arc<Class>> {
        let class = self.cell.get_or_try_init(|| {
            self.loading.store(true, Ordering::Release);
            let result = define();
            self.loading.store(false, Ordering::Release);
            result
        })?;
        Ok(Arc::clone(class))
    }
}

pub(crate) fn entry(name: &str) -> Arc<ClassEntry> {
    let index = string_pool::intern(name);
    Arc::clone(METHOD_AREA.entry(index).or_default().value())
}

/// Publishes `class` under `name`; the first publication wins.
pub(crate) fn insert(name: &str, class: Arc<Class>) -> Arc<Class> {
    let entry = entry(name);
    let published = entry.cell.get_or_init(|| class);
    Arc::clone(published)
}

pub(crate) fn fetch(name: &str) -> Option<Arc<Class>> {
    let index = string_pool::find(name)?;
    let entry = METHOD_AREA.get(&index)?;
    entry.cell.get().cloned()
}

pub fn status(name: &str) -> ClassStatus {
    let Some(index) = string_pool::find(name) else {
        return ClassStatus::Absent;
    };
    let Some(entry) = METHOD_AREA.get(&index).map(|e| Arc::clone(e.value())) else {
        return ClassStatus::Absent;
    };
    match entry.cell.get() {
        None if entry.loading.load(Ordering::Acquire) => ClassStatus::Loading,
        None => ClassStatus::Absent,
        Some(class) => match class.clinit_status() {
            ClinitStatus::Pending => ClassStatus::Loaded,
            ClinitStatus::Running => ClassStatus::Initializing,
            ClinitStatus::Done => ClassStatus::Initialized,
            ClinitStatus::Failed => ClassStatus::Erroneous,
        },
    }
}

/// Names of all published classes.
pub(crate) fn loaded_classes() -> Vec<Arc<str>> {
    METHOD_AREA
        .iter()
        .filter(|e| e.value().cell.get().is_some())
        .map(|e| string_pool::get(*e.key()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::class_loader::builtin::synthetic_class;

    #[test]
    fn test_insert_then_fetch() {
        assert_eq!(status("area/test/Fresh"), ClassStatus::Absent);
        let class = synthetic_class("area/test/Fresh", None, &[]);
        let published = insert("area/test/Fresh", Arc::clone(&class));
        assert!(Arc::ptr_eq(&published, &class));
        // the first publication wins
        let again = insert("area/test/Fresh", synthetic_class("area/test/Fresh", None, &[]));
        assert!(Arc::ptr_eq(&again, &class));
        assert!(fetch("area/test/Fresh").is_some());
        assert_eq!(status("area/test/Fresh"), ClassStatus::Loaded);
        assert!(loaded_classes().iter().any(|n| n.as_ref() == "area/test/Fresh"));
    }

    #[test]
    fn test_lookups_leave_string_pool_alone() {
        assert!(fetch("area/test/NeverLoaded").is_none());
        assert_eq!(status("area/test/NeverLoaded"), ClassStatus::Absent);
        assert_eq!(string_pool::find("area/test/NeverLoaded"), None);
    }

    #[test]
    fn test_failed_definition_leaves_entry_absent() {
        let entry = entry("area/test/Broken");
        let err = entry.get_or_define(|| Err(crate::runtime::Exception::new("java/lang/LinkageError")));
        assert!(err.is_err());
        assert_eq!(status("area/test/Broken"), ClassStatus::Absent);
    }

    #[test]
    fn test_concurrent_loaders_define_once() {
        use std::sync::atomic::AtomicUsize;
        static DEFINED: AtomicUsize = AtomicUsize::new(0);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                std::thread::spawn(|| {
                    entry("area/test/Once").get_or_define(|| {
                        DEFINED.fetch_add(1, Ordering::SeqCst);
                        std::thread::sleep(std::time::Duration::from_millis(20));
                        Ok(synthetic_class("area/test/Once", None, &[]))
                    })
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }
        assert_eq!(DEFINED.load(Ordering::SeqCst), 1);
    }
}
