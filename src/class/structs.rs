use std::sync::Arc;

mod constant_pool;
pub(crate) mod java_str;

pub use constant_pool::ConstantPoolInfo;
pub(crate) use constant_pool::validate_constant_pool;

use crate::{
    class::ClassFormatError,
    consts::{ClassAccessFlag, FieldAccessFlag, MethodAccessFlag},
};

#[derive(Debug)]
pub struct Class {
    pub(crate) minor_version: u16,
    pub(crate) major_version: u16,
    pub(crate) constant_pool: Vec<ConstantPoolInfo>,
    pub(crate) access_flags: ClassAccessFlag,
    pub(crate) this_class: u16,
    pub(crate) super_class: u16,
    pub(crate) interfaces: Vec<u16>,
    pub(crate) fields: Vec<FieldInfo>,
    pub(crate) methods: Vec<MethodInfo>,
    pub(crate) attributes: Vec<AttributeInfo>,
}

#[derive(Debug)]
pub struct FieldInfo {
    pub(crate) access_flags: FieldAccessFlag,
    pub(crate) name_index: u16,
    pub(crate) descriptor_index: u16,
    pub(crate) attributes: Vec<AttributeInfo>,
}

#[derive(Debug)]
pub struct MethodInfo {
    pub(crate) access_flags: MethodAccessFlag,
    pub(crate) name_index: u16,
    pub(crate) descriptor_index: u16,
    pub(crate) attributes: Vec<AttributeInfo>,
}

#[derive(Debug)]
pub struct AttributeInfo {
    pub(crate) attribute_name_index: u16,
    pub(crate) info: Vec<u8>,
}

impl Class {
    /// Slot lookup using class-file numbering (slot 0 is never valid).
    pub fn constant(&self, index: u16) -> Option<&ConstantPoolInfo> {
        constant(&self.constant_pool, index)
    }

    pub fn class_name(&self) -> Result<Arc<str>, ClassFormatError> {
        resolve_class_name(&self.constant_pool, self.this_class)
    }

    pub fn major_version(&self) -> u16 {
        self.major_version
    }

    pub fn minor_version(&self) -> u16 {
        self.minor_version
    }
}

pub(crate) fn constant(pool: &[ConstantPoolInfo], index: u16) -> Option<&ConstantPoolInfo> {
    if index == 0 {
        return None;
    }
    pool.get(index as usize - 1)
}

pub(crate) fn resolve_utf8(
    pool: &[ConstantPoolInfo],
    index: u16,
) -> Result<Arc<str>, ClassFormatError> {
    match constant(pool, index) {
        Some(ConstantPoolInfo::Utf8(value)) => Ok(Arc::clone(value)),
        _ => Err(ClassFormatError::new(format!(
            "Constant pool index {index} is not a UTF-8 entry"
        ))),
    }
}

pub(crate) fn resolve_class_name(
    pool: &[ConstantPoolInfo],
    index: u16,
) -> Result<Arc<str>, ClassFormatError> {
    match constant(pool, index) {
        Some(ConstantPoolInfo::Class { name_index }) => resolve_utf8(pool, *name_index),
        _ => Err(ClassFormatError::new(format!(
            "Constant pool index {index} is not a class entry"
        ))),
    }
}
