use std::sync::Arc;

use crate::class::ClassFormatError;

#[derive(Debug, Clone, PartialEq)]
pub enum ConstantPoolInfo {
    Utf8(Arc<str>),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class {
        name_index: u16,
    },
    String {
        string_index: u16,
    },
    Fieldref {
        class_index: u16,
        name_and_type_index: u16,
    },
    Methodref {
        class_index: u16,
        name_and_type_index: u16,
    },
    InterfaceMethodref {
        class_index: u16,
        name_and_type_index: u16,
    },
    NameAndType {
        name_index: u16,
        descriptor_index: u16,
    },
    MethodHandle {
        reference_kind: u8,
        reference_index: u16,
    },
    MethodType {
        descriptor_index: u16,
    },
    Dynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    InvokeDynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    Module {
        name_index: u16,
    },
    Package {
        name_index: u16,
    },
    /// second slot of a Long or Double
    Empty,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Kind {
    Utf8,
    Class,
    NameAndType,
    Fieldref,
    AnyMethodref,
}

impl ConstantPoolInfo {
    fn is_kind(&self, kind: Kind) -> bool {
        match kind {
            Kind::Utf8 => matches!(self, ConstantPoolInfo::Utf8(_)),
            Kind::Class => matches!(self, ConstantPoolInfo::Class { .. }),
            Kind::NameAndType => matches!(self, ConstantPoolInfo::NameAndType { .. }),
            Kind::Fieldref => matches!(self, ConstantPoolInfo::Fieldref { .. }),
            Kind::AnyMethodref => matches!(
                self,
                ConstantPoolInfo::Methodref { .. } | ConstantPoolInfo::InterfaceMethodref { .. }
            ),
        }
    }
}

/// Every cross reference inside the pool must land on an entry of the right kind.
pub(crate) fn validate_constant_pool(pool: &[ConstantPoolInfo]) -> Result<(), ClassFormatError> {
    let expect = |from: usize, index: u16, kind: Kind| -> Result<(), ClassFormatError> {
        match super::constant(pool, index) {
            Some(entry) if entry.is_kind(kind) => Ok(()),
            _ => Err(ClassFormatError::new(format!(
                "Invalid constant pool reference #{index} from #{} (expected {kind:?})",
                from + 1
            ))),
        }
    };

    for (slot, entry) in pool.iter().enumerate() {
        match entry {
            ConstantPoolInfo::Class { name_index }
            | ConstantPoolInfo::Module { name_index }
            | ConstantPoolInfo::Package { name_index } => expect(slot, *name_index, Kind::Utf8)?,
            ConstantPoolInfo::String { string_index } => expect(slot, *string_index, Kind::Utf8)?,
            ConstantPoolInfo::MethodType { descriptor_index } => {
                expect(slot, *descriptor_index, Kind::Utf8)?
            }
            ConstantPoolInfo::Fieldref {
                class_index,
                name_and_type_index,
            }
            | ConstantPoolInfo::Methodref {
                class_index,
                name_and_type_index,
            }
            | ConstantPoolInfo::InterfaceMethodref {
                class_index,
                name_and_type_index,
            } => {
                expect(slot, *class_index, Kind::Class)?;
                expect(slot, *name_and_type_index, Kind::NameAndType)?;
            }
            ConstantPoolInfo::NameAndType {
                name_index,
                descriptor_index,
            } => {
                expect(slot, *name_index, Kind::Utf8)?;
                expect(slot, *descriptor_index, Kind::Utf8)?;
            }
            ConstantPoolInfo::MethodHandle {
                reference_kind,
                reference_index,
            } => match reference_kind {
                1..=4 => expect(slot, *reference_index, Kind::Fieldref)?,
                5..=9 => expect(slot, *reference_index, Kind::AnyMethodref)?,
                _ => {
                    return Err(ClassFormatError::new(format!(
                        "Bad method handle kind {reference_kind} at #{}",
                        slot + 1
                    )));
                }
            },
            ConstantPoolInfo::Dynamic {
                name_and_type_index,
                ..
            }
            | ConstantPoolInfo::InvokeDynamic {
                name_and_type_index,
                ..
            } => expect(slot, *name_and_type_index, Kind::NameAndType)?,
            ConstantPoolInfo::Utf8(_)
            | ConstantPoolInfo::Integer(_)
            | ConstantPoolInfo::Float(_)
            | ConstantPoolInfo::Long(_)
            | ConstantPoolInfo::Double(_)
            | ConstantPoolInfo::Empty => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_wrong_kind() {
        let pool = vec![
            ConstantPoolInfo::Utf8("A".into()),
            ConstantPoolInfo::Class { name_index: 1 },
            // points at a class entry instead of UTF-8
            ConstantPoolInfo::String { string_index: 2 },
        ];
        let err = validate_constant_pool(&pool).unwrap_err();
        assert!(err.to_string().contains("#2 from #3"), "{err}");
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let pool = vec![ConstantPoolInfo::Class { name_index: 7 }];
        assert!(validate_constant_pool(&pool).is_err());
        let pool = vec![ConstantPoolInfo::Class { name_index: 0 }];
        assert!(validate_constant_pool(&pool).is_err());
    }

    #[test]
    fn test_validate_accepts_well_formed() {
        let pool = vec![
            ConstantPoolInfo::Utf8("java/lang/Object".into()),
            ConstantPoolInfo::Class { name_index: 1 },
            ConstantPoolInfo::Utf8("<init>".into()),
            ConstantPoolInfo::Utf8("()V".into()),
            ConstantPoolInfo::NameAndType {
                name_index: 3,
                descriptor_index: 4,
            },
            ConstantPoolInfo::Methodref {
                class_index: 2,
                name_and_type_index: 5,
            },
            ConstantPoolInfo::MethodHandle {
                reference_kind: 6,
                reference_index: 6,
            },
            ConstantPoolInfo::Long(1),
            ConstantPoolInfo::Empty,
        ];
        validate_constant_pool(&pool).unwrap();
    }
}
