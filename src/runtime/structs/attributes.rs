use std::sync::Arc;

use crate::descriptor::{FieldType, ReturnType};

#[derive(Debug, Clone)]
pub enum AttributeInfo {
    Code(Arc<CodeAttribute>),
    ConstantValue(Const),
    SourceFile(Arc<str>),
    LineNumberTable(Vec<LineNumberTableItem>),
    LocalVariableTable(Vec<LocalVariable>),
    /// frame count and the raw frames; not verified
    StackMapTable {
        entries: u16,
        frames: Arc<[u8]>,
    },
    Exceptions(Vec<Arc<str>>),
    MethodParameters(Vec<MethodParameter>),
    Signature(Arc<str>),
    Deprecated,
    RuntimeVisibleAnnotations(Vec<Annotation>),
    InnerClasses(Vec<InnerClass>),
    EnclosingMethod {
        class: Arc<str>,
        method: Option<(Arc<str>, Arc<str>)>,
    },
    BootstrapMethods(Vec<BootstrapMethod>),
    Module(Module),
    ModulePackages(Vec<Arc<str>>),
    NestHost(Arc<str>),
    NestMembers(Vec<Arc<str>>),
    PermittedSubclasses(Vec<Arc<str>>),
    Record(Vec<RecordComponent>),
    Unknown {
        name: Arc<str>,
        info: Arc<[u8]>,
    },
}

#[derive(Debug)]
pub struct CodeAttribute {
    pub(crate) max_stack: u16,
    pub(crate) max_locals: u16,
    pub(crate) code: Arc<[u8]>,
    pub(crate) exception_table: Vec<ExceptionTableItem>,
    pub(crate) attributes: Vec<AttributeInfo>,
}

impl CodeAttribute {
    /// Source line of the greatest table entry whose pc does not exceed `pc`.
    pub(crate) fn line_number(&self, pc: usize) -> Option<u16> {
        let mut best: Option<&LineNumberTableItem> = None;
        for attribute in &self.attributes {
            let AttributeInfo::LineNumberTable(items) = attribute else {
                continue;
            };
            for item in items {
                if item.start_pc as usize <= pc
                    && best.is_none_or(|b| item.start_pc >= b.start_pc)
                {
                    best = Some(item);
                }
            }
        }
        best.map(|item| item.line_number)
    }
}

#[derive(Debug, Clone)]
pub struct Annotation {
    pub(crate) type_descriptor: FieldType,
    pub(crate) element_value_pairs: Vec<ElementValuePair>,
}

#[derive(Debug, Clone)]
pub struct ElementValuePair {
    pub(crate) element_name: Arc<str>,
    pub(crate) value: ElementValue,
}

#[derive(Debug, Clone)]
pub enum ElementValue {
    Const(Const),
    Enum {
        type_name: Arc<str>,
        const_name: Arc<str>,
    },
    Class(ReturnType),
    Annotation(Annotation),
    Array(Vec<ElementValue>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Const {
    Byte(i32),
    Char(i32),
    Double(f64),
    Float(f32),
    Int(i32),
    Long(i64),
    Short(i32),
    Boolean(i32),
    String(Arc<str>),
}

impl Const {
    /// Reinterprets an `Int` constant as the narrower type named by an element tag.
    pub(crate) fn narrow(self, tag: u8) -> Option<Self> {
        let Const::Int(v) = self else {
            return matches!(tag, b'D' | b'F' | b'J' | b's').then_some(self);
        };
        Some(match tag {
            b'B' => Const::Byte(v),
            b'C' => Const::Char(v),
            b'S' => Const::Short(v),
            b'Z' => Const::Boolean(v),
            b'I' => Const::Int(v),
            _ => return None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct LineNumberTableItem {
    pub(crate) start_pc: u16,
    pub(crate) line_number: u16,
}

#[derive(Debug, Clone)]
pub struct ExceptionTableItem {
    pub(crate) start_pc: u16,
    pub(crate) end_pc: u16,
    pub(crate) handler_pc: u16,
    /// `None` catches everything (`finally`)
    pub(crate) catch_type: Option<Arc<str>>,
}

impl ExceptionTableItem {
    pub(crate) fn covers(&self, pc: usize) -> bool {
        (self.start_pc as usize..self.end_pc as usize).contains(&pc)
    }
}

#[derive(Debug, Clone)]
pub struct LocalVariable {
    pub(crate) start_pc: u16,
    pub(crate) length: u16,
    pub(crate) name: Arc<str>,
    pub(crate) descriptor: FieldType,
    pub(crate) index: u16,
}

#[derive(Debug, Clone)]
pub struct MethodParameter {
    pub(crate) name: Option<Arc<str>>,
    pub(crate) access_flags: u16,
}

#[derive(Debug, Clone)]
pub struct InnerClass {
    pub(crate) inner_class: Arc<str>,
    pub(crate) outer_class: Option<Arc<str>>,
    pub(crate) inner_name: Option<Arc<str>>,
    pub(crate) access_flags: u16,
}

#[derive(Debug, Clone)]
pub struct BootstrapMethod {
    /// constant pool index of the `MethodHandle`
    pub(crate) method_ref: u16,
    pub(crate) arguments: Vec<u16>,
}

#[derive(Debug, Clone)]
pub struct RecordComponent {
    pub(crate) name: Arc<str>,
    pub(crate) descriptor: Arc<str>,
    pub(crate) attributes: Vec<AttributeInfo>,
}

#[derive(Debug, Clone)]
pub struct Module {
    pub(crate) name: Arc<str>,
    pub(crate) flags: u16,
    pub(crate) requires: Vec<Arc<str>>,
    pub(crate) exports: Vec<ModuleExport>,
}

#[derive(Debug, Clone)]
pub struct ModuleExport {
    pub(crate) exports: Arc<str>,
    pub(crate) exports_flags: u16,
    pub(crate) exports_to: Vec<Arc<str>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_number_lookup() {
        let code = CodeAttribute {
            max_stack: 1,
            max_locals: 1,
            code: Arc::from(vec![0u8; 20]),
            exception_table: vec![],
            attributes: vec![AttributeInfo::LineNumberTable(vec![
                LineNumberTableItem {
                    start_pc: 0,
                    line_number: 3,
                },
                LineNumberTableItem {
                    start_pc: 8,
                    line_number: 5,
                },
                LineNumberTableItem {
                    start_pc: 4,
                    line_number: 4,
                },
            ])],
        };
        assert_eq!(code.line_number(0), Some(3));
        assert_eq!(code.line_number(5), Some(4));
        assert_eq!(code.line_number(19), Some(5));
    }

    #[test]
    fn test_const_narrow() {
        assert_eq!(Const::Int(1).narrow(b'Z'), Some(Const::Boolean(1)));
        assert_eq!(Const::Long(2).narrow(b'J'), Some(Const::Long(2)));
        assert_eq!(Const::Long(2).narrow(b'B'), None);
    }
}
