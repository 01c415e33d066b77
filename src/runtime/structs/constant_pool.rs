use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::runtime::{Class, NativeResult, mtable::MethodEntry};

/// Constant pool image with symbolic references spelled out.
#[derive(Debug)]
pub enum ConstantPoolInfo {
    Utf8(Arc<str>),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(CpClassInfo),
    String(Arc<str>),
    Fieldref(CpMemberRef),
    Methodref(CpMemberRef),
    InterfaceMethodref(CpMemberRef),
    NameAndType(CpNameAndTypeInfo),
    MethodHandle {
        reference_kind: u8,
        reference: CpMemberRef,
    },
    MethodType(Arc<str>),
    Dynamic {
        bootstrap_index: u16,
        name_and_type: CpNameAndTypeInfo,
    },
    InvokeDynamic {
        bootstrap_index: u16,
        name_and_type: CpNameAndTypeInfo,
    },
    Module(Arc<str>),
    Package(Arc<str>),
    Empty,
}

#[derive(Debug)]
pub struct CpClassInfo {
    pub(crate) name: Arc<str>,
    pub(crate) class: OnceCell<Arc<Class>>,
}

impl CpClassInfo {
    pub(crate) fn new(name: Arc<str>) -> Self {
        CpClassInfo {
            name,
            class: OnceCell::new(),
        }
    }

    pub(crate) fn get_or_load_class(
        &self,
        resolver: impl FnOnce() -> NativeResult<Arc<Class>>,
    ) -> NativeResult<Arc<Class>> {
        Ok(Arc::clone(self.class.get_or_try_init(resolver)?))
    }
}

impl Clone for CpClassInfo {
    fn clone(&self) -> Self {
        CpClassInfo::new(Arc::clone(&self.name))
    }
}

#[derive(Debug, Clone)]
pub struct CpNameAndTypeInfo {
    pub(crate) name: Arc<str>,
    pub(crate) descriptor: Arc<str>,
}

/// Field or method reference. Non-virtual call sites cache their target.
#[derive(Debug)]
pub struct CpMemberRef {
    pub(crate) class: Arc<str>,
    pub(crate) name: Arc<str>,
    pub(crate) descriptor: Arc<str>,
    pub(crate) resolved: OnceCell<Arc<MethodEntry>>,
}

impl CpMemberRef {
    pub(crate) fn new(class: Arc<str>, name_and_type: CpNameAndTypeInfo) -> Self {
        CpMemberRef {
            class,
            name: name_and_type.name,
            descriptor: name_and_type.descriptor,
            resolved: OnceCell::new(),
        }
    }

    /// MTable key of the referenced method.
    pub(crate) fn key(&self) -> String {
        format!("{}.{}{}", self.class, self.name, self.descriptor)
    }
}

impl Clone for CpMemberRef {
    fn clone(&self) -> Self {
        CpMemberRef {
            class: Arc::clone(&self.class),
            name: Arc::clone(&self.name),
            descriptor: Arc::clone(&self.descriptor),
            resolved: OnceCell::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Exception;

    #[test]
    fn test_member_ref_key() {
        let member = CpMemberRef::new(
            "java/io/PrintStream".into(),
            CpNameAndTypeInfo {
                name: "println".into(),
                descriptor: "(Ljava/lang/String;)V".into(),
            },
        );
        assert_eq!(member.key(), "java/io/PrintStream.println(Ljava/lang/String;)V");
    }

    #[test]
    fn test_class_resolution_failure_is_not_cached() {
        let info = CpClassInfo::new("cp/test/Missing".into());
        let err = info.get_or_load_class(|| Err(Exception::new("java/lang/NoClassDefFoundError")));
        assert!(err.is_err());
        assert!(info.class.get().is_none());
        assert!(info.clone().class.get().is_none());
    }
}
