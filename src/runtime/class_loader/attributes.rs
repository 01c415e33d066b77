use std::sync::Arc;

use nom::{
    bytes::complete::take,
    number::complete::{be_u16, be_u32, u8},
};

use crate::{
    class::{self, ClassFormatError, ConstantPoolInfo, resolve_class_name, resolve_utf8},
    descriptor::{self, FieldDescriptor},
    runtime::{
        Annotation, AttributeInfo, BootstrapMethod, CodeAttribute, Const, ElementValue,
        ElementValuePair, ExceptionTableItem, InnerClass, LineNumberTableItem, LocalVariable,
        MethodParameter, Module, ModuleExport, RecordComponent,
    },
};

type PResult<'a, T> = Result<(&'a [u8], T), ClassFormatError>;

pub(super) fn convert_attributes(
    attributes: &[class::AttributeInfo],
    cp: &[ConstantPoolInfo],
) -> Result<Vec<AttributeInfo>, ClassFormatError> {
    attributes
        .iter()
        .map(|a| parse_attribute(a.attribute_name_index, &a.info, cp))
        .collect()
}

fn repeat<'a, T>(
    mut input: &'a [u8],
    n: usize,
    mut f: impl FnMut(&'a [u8]) -> PResult<'a, T>,
) -> PResult<'a, Vec<T>> {
    let mut items = Vec::with_capacity(n);
    for _ in 0..n {
        let item;
        (input, item) = f(input)?;
        items.push(item);
    }
    Ok((input, items))
}

fn optional_utf8(cp: &[ConstantPoolInfo], index: u16) -> Result<Option<Arc<str>>, ClassFormatError> {
    if index == 0 {
        return Ok(None);
    }
    resolve_utf8(cp, index).map(Some)
}

fn optional_class(cp: &[ConstantPoolInfo], index: u16) -> Result<Option<Arc<str>>, ClassFormatError> {
    if index == 0 {
        return Ok(None);
    }
    resolve_class_name(cp, index).map(Some)
}

fn resolve_named(
    cp: &[ConstantPoolInfo],
    index: u16,
    kind: &str,
) -> Result<Arc<str>, ClassFormatError> {
    match class::constant(cp, index) {
        Some(
            ConstantPoolInfo::Package { name_index } | ConstantPoolInfo::Module { name_index },
        ) => resolve_utf8(cp, *name_index),
        _ => Err(ClassFormatError::new(format!(
            "Constant pool index {index} is not a {kind} entry"
        ))),
    }
}

pub(super) fn resolve_constant_value(
    cp: &[ConstantPoolInfo],
    index: u16,
) -> Result<Const, ClassFormatError> {
    Ok(match class::constant(cp, index) {
        Some(ConstantPoolInfo::Integer(i)) => Const::Int(*i),
        Some(ConstantPoolInfo::Float(f)) => Const::Float(*f),
        Some(ConstantPoolInfo::Long(l)) => Const::Long(*l),
        Some(ConstantPoolInfo::Double(d)) => Const::Double(*d),
        Some(ConstantPoolInfo::String { string_index }) => {
            Const::String(resolve_utf8(cp, *string_index)?)
        }
        Some(ConstantPoolInfo::Utf8(string)) => Const::String(Arc::clone(string)),
        _ => {
            return Err(ClassFormatError::new(format!(
                "Bad constant value index {index}"
            )));
        }
    })
}

fn parse_field_type(text: &str) -> Result<crate::descriptor::FieldType, ClassFormatError> {
    descriptor::parse_field_descriptor(text)
        .map(|(_, FieldDescriptor(field_type))| field_type)
        .map_err(|_| ClassFormatError::new(format!("Illegal field descriptor {text}")))
}

/// Decodes one attribute; its body must be consumed exactly.
pub(super) fn parse_attribute(
    attribute_name_index: u16,
    input: &[u8],
    cp: &[ConstantPoolInfo],
) -> Result<AttributeInfo, ClassFormatError> {
    let attribute_name = resolve_utf8(cp, attribute_name_index)?;
    let (rest, attribute) = parse_attribute_body(&attribute_name, input, cp).map_err(|e| {
        match e {
            ClassFormatError::Format(message) if message == "Truncated class file" => {
                ClassFormatError::new(format!("Truncated {attribute_name} attribute"))
            }
            other => other,
        }
    })?;
    if !rest.is_empty() {
        return Err(ClassFormatError::new(format!(
            "Wrong length for {attribute_name} attribute ({} bytes left)",
            rest.len()
        )));
    }
    Ok(attribute)
}

fn parse_attribute_body<'a>(
    attribute_name: &Arc<str>,
    mut input: &'a [u8],
    cp: &[ConstantPoolInfo],
) -> PResult<'a, AttributeInfo> {
    let attribute_info = match attribute_name.as_ref() {
        "Code" => {
            let code;
            (input, code) = parse_code_attribute(input, cp)?;
            AttributeInfo::Code(Arc::new(code))
        }
        "ConstantValue" => {
            let constantvalue_index;
            (input, constantvalue_index) = be_u16(input)?;
            AttributeInfo::ConstantValue(resolve_constant_value(cp, constantvalue_index)?)
        }
        "RuntimeVisibleAnnotations" => {
            let num_annotations;
            (input, num_annotations) = be_u16(input)?;
            let annotations;
            (input, annotations) =
                repeat(input, num_annotations as _, |i| parse_annotation(i, cp))?;
            AttributeInfo::RuntimeVisibleAnnotations(annotations)
        }
        "LocalVariableTable" => {
            let length;
            (input, length) = be_u16(input)?;
            let table;
            (input, table) = repeat(input, length as _, |i| parse_local_variable(i, cp))?;
            AttributeInfo::LocalVariableTable(table)
        }
        "Signature" => {
            let signature_index;
            (input, signature_index) = be_u16(input)?;
            AttributeInfo::Signature(resolve_utf8(cp, signature_index)?)
        }
        "Deprecated" => AttributeInfo::Deprecated,
        "StackMapTable" => {
            let entries;
            (input, entries) = be_u16(input)?;
            let frames = Arc::from(input);
            input = &[];
            AttributeInfo::StackMapTable { entries, frames }
        }
        "Exceptions" => {
            let count;
            (input, count) = be_u16(input)?;
            let exceptions;
            (input, exceptions) = repeat(input, count as _, |i| {
                let (i, index) = be_u16(i)?;
                Ok((i, resolve_class_name(cp, index)?))
            })?;
            AttributeInfo::Exceptions(exceptions)
        }
        "MethodParameters" => {
            let count;
            (input, count) = u8(input)?;
            let parameters;
            (input, parameters) = repeat(input, count as _, |i| {
                let (i, name_index) = be_u16(i)?;
                let (i, access_flags) = be_u16(i)?;
                Ok((
                    i,
                    MethodParameter {
                        name: optional_utf8(cp, name_index)?,
                        access_flags,
                    },
                ))
            })?;
            AttributeInfo::MethodParameters(parameters)
        }
        "SourceFile" => {
            let sourcefile_index;
            (input, sourcefile_index) = be_u16(input)?;
            AttributeInfo::SourceFile(resolve_utf8(cp, sourcefile_index)?)
        }
        "LineNumberTable" => {
            let length;
            (input, length) = be_u16(input)?;
            let table;
            (input, table) = repeat(input, length as _, |i| {
                let (i, start_pc) = be_u16(i)?;
                let (i, line_number) = be_u16(i)?;
                Ok((
                    i,
                    LineNumberTableItem {
                        start_pc,
                        line_number,
                    },
                ))
            })?;
            AttributeInfo::LineNumberTable(table)
        }
        "InnerClasses" => {
            let count;
            (input, count) = be_u16(input)?;
            let classes;
            (input, classes) = repeat(input, count as _, |i| {
                let (i, inner_index) = be_u16(i)?;
                let (i, outer_index) = be_u16(i)?;
                let (i, name_index) = be_u16(i)?;
                let (i, access_flags) = be_u16(i)?;
                Ok((
                    i,
                    InnerClass {
                        inner_class: resolve_class_name(cp, inner_index)?,
                        outer_class: optional_class(cp, outer_index)?,
                        inner_name: optional_utf8(cp, name_index)?,
                        access_flags,
                    },
                ))
            })?;
            AttributeInfo::InnerClasses(classes)
        }
        "EnclosingMethod" => {
            let (class_index, method_index);
            (input, class_index) = be_u16(input)?;
            (input, method_index) = be_u16(input)?;
            let method = match class::constant(cp, method_index) {
                None => None,
                Some(ConstantPoolInfo::NameAndType {
                    name_index,
                    descriptor_index,
                }) => Some((
                    resolve_utf8(cp, *name_index)?,
                    resolve_utf8(cp, *descriptor_index)?,
                )),
                Some(_) => {
                    return Err(ClassFormatError::new(
                        "Bad method index in EnclosingMethod attribute",
                    ));
                }
            };
            AttributeInfo::EnclosingMethod {
                class: resolve_class_name(cp, class_index)?,
                method,
            }
        }
        "BootstrapMethods" => {
            let count;
            (input, count) = be_u16(input)?;
            let methods;
            (input, methods) = repeat(input, count as _, |i| {
                let (i, method_ref) = be_u16(i)?;
                if !matches!(
                    class::constant(cp, method_ref),
                    Some(ConstantPoolInfo::MethodHandle { .. })
                ) {
                    return Err(ClassFormatError::new(format!(
                        "Bootstrap method #{method_ref} is not a method handle"
                    )));
                }
                let (i, argument_count) = be_u16(i)?;
                let (i, arguments) = repeat(i, argument_count as _, |i| Ok(be_u16(i)?))?;
                Ok((
                    i,
                    BootstrapMethod {
                        method_ref,
                        arguments,
                    },
                ))
            })?;
            AttributeInfo::BootstrapMethods(methods)
        }
        "NestHost" => {
            let host_index;
            (input, host_index) = be_u16(input)?;
            AttributeInfo::NestHost(resolve_class_name(cp, host_index)?)
        }
        "NestMembers" | "PermittedSubclasses" => {
            let count;
            (input, count) = be_u16(input)?;
            let classes;
            (input, classes) = repeat(input, count as _, |i| {
                let (i, index) = be_u16(i)?;
                Ok((i, resolve_class_name(cp, index)?))
            })?;
            if attribute_name.as_ref() == "NestMembers" {
                AttributeInfo::NestMembers(classes)
            } else {
                AttributeInfo::PermittedSubclasses(classes)
            }
        }
        "Record" => {
            let count;
            (input, count) = be_u16(input)?;
            let components;
            (input, components) = repeat(input, count as _, |i| {
                let (i, name_index) = be_u16(i)?;
                let (i, descriptor_index) = be_u16(i)?;
                let (i, attributes) = parse_nested_attributes(i, cp)?;
                Ok((
                    i,
                    RecordComponent {
                        name: resolve_utf8(cp, name_index)?,
                        descriptor: resolve_utf8(cp, descriptor_index)?,
                        attributes,
                    },
                ))
            })?;
            AttributeInfo::Record(components)
        }
        "Module" => {
            let module;
            (input, module) = parse_module(input, cp)?;
            AttributeInfo::Module(module)
        }
        "ModulePackages" => {
            let count;
            (input, count) = be_u16(input)?;
            let packages;
            (input, packages) = repeat(input, count as _, |i| {
                let (i, index) = be_u16(i)?;
                Ok((i, resolve_named(cp, index, "package")?))
            })?;
            AttributeInfo::ModulePackages(packages)
        }
        _ => {
            log::trace!("keeping unknown attribute {attribute_name}");
            let info = Arc::from(input);
            input = &[];
            AttributeInfo::Unknown {
                name: Arc::clone(attribute_name),
                info,
            }
        }
    };

    Ok((input, attribute_info))
}

fn parse_nested_attributes<'a>(
    input: &'a [u8],
    cp: &[ConstantPoolInfo],
) -> PResult<'a, Vec<AttributeInfo>> {
    let (input, attributes_count) = be_u16(input)?;
    repeat(input, attributes_count as _, |i| {
        let (i, attribute_name_index) = be_u16(i)?;
        let (i, attribute_length) = be_u32(i)?;
        let (i, body) = take(attribute_length)(i)?;
        Ok((i, parse_attribute(attribute_name_index, body, cp)?))
    })
}

fn parse_code_attribute<'a>(input: &'a [u8], cp: &[ConstantPoolInfo]) -> PResult<'a, CodeAttribute> {
    let (input, max_stack) = be_u16(input)?;
    let (input, max_locals) = be_u16(input)?;

    let (input, code_length) = be_u32(input)?;
    if code_length == 0 || code_length >= 65536 {
        return Err(ClassFormatError::new(format!(
            "Invalid method Code length {code_length}"
        )));
    }
    let (input, code) = take(code_length)(input)?;

    let (input, exception_table_length) = be_u16(input)?;
    let (input, exception_table) = repeat(input, exception_table_length as _, |i| {
        let (i, start_pc) = be_u16(i)?;
        let (i, end_pc) = be_u16(i)?;
        let (i, handler_pc) = be_u16(i)?;
        let (i, catch_type) = be_u16(i)?;
        if start_pc >= end_pc || end_pc as u32 > code_length || handler_pc as u32 >= code_length {
            return Err(ClassFormatError::new(format!(
                "Illegal exception table range [{start_pc}, {end_pc}) -> {handler_pc} in code of length {code_length}"
            )));
        }
        Ok((
            i,
            ExceptionTableItem {
                start_pc,
                end_pc,
                handler_pc,
                catch_type: optional_class(cp, catch_type)?,
            },
        ))
    })?;

    let (input, attributes) = parse_nested_attributes(input, cp)?;

    Ok((
        input,
        CodeAttribute {
            max_stack,
            max_locals,
            code: Arc::from(code),
            exception_table,
            attributes,
        },
    ))
}

fn parse_annotation<'a>(input: &'a [u8], cp: &[ConstantPoolInfo]) -> PResult<'a, Annotation> {
    let (input, type_index) = be_u16(input)?;
    let type_descriptor = parse_field_type(&resolve_utf8(cp, type_index)?)?;
    let (input, num_element_value_pairs) = be_u16(input)?;
    let (input, element_value_pairs) = repeat(input, num_element_value_pairs as _, |i| {
        let (i, element_name_index) = be_u16(i)?;
        let (i, value) = parse_element_value(i, cp)?;
        Ok((
            i,
            ElementValuePair {
                element_name: resolve_utf8(cp, element_name_index)?,
                value,
            },
        ))
    })?;

    Ok((
        input,
        Annotation {
            type_descriptor,
            element_value_pairs,
        },
    ))
}

fn parse_element_value<'a>(input: &'a [u8], cp: &[ConstantPoolInfo]) -> PResult<'a, ElementValue> {
    let (mut input, tag) = u8(input)?;
    let value = match tag {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' => {
            let const_value_index;
            (input, const_value_index) = be_u16(input)?;
            let value = resolve_constant_value(cp, const_value_index)?;
            let Some(value) = value.narrow(tag) else {
                return Err(ClassFormatError::new(format!(
                    "Element value of tag {} does not match its constant",
                    tag as char
                )));
            };
            ElementValue::Const(value)
        }
        b'e' => {
            let (type_name_index, const_name_index);
            (input, type_name_index) = be_u16(input)?;
            (input, const_name_index) = be_u16(input)?;
            ElementValue::Enum {
                type_name: resolve_utf8(cp, type_name_index)?,
                const_name: resolve_utf8(cp, const_name_index)?,
            }
        }
        b'c' => {
            let class_info_index;
            (input, class_info_index) = be_u16(input)?;
            let class_info = resolve_utf8(cp, class_info_index)?;
            let (_, class) = descriptor::parse_return_type_descriptor(&class_info)
                .map_err(|_| ClassFormatError::new(format!("Illegal class info {class_info}")))?;
            ElementValue::Class(class)
        }
        b'@' => {
            let annotation;
            (input, annotation) = parse_annotation(input, cp)?;
            ElementValue::Annotation(annotation)
        }
        b'[' => {
            let num_values;
            (input, num_values) = be_u16(input)?;
            let values;
            (input, values) = repeat(input, num_values as _, |i| parse_element_value(i, cp))?;
            ElementValue::Array(values)
        }
        _ => {
            return Err(ClassFormatError::new(format!(
                "Unknown element value tag {tag}"
            )));
        }
    };
    Ok((input, value))
}

fn parse_local_variable<'a>(input: &'a [u8], cp: &[ConstantPoolInfo]) -> PResult<'a, LocalVariable> {
    let (input, start_pc) = be_u16(input)?;
    let (input, length) = be_u16(input)?;
    let (input, name_index) = be_u16(input)?;
    let (input, descriptor_index) = be_u16(input)?;
    let (input, index) = be_u16(input)?;
    Ok((
        input,
        LocalVariable {
            start_pc,
            length,
            name: resolve_utf8(cp, name_index)?,
            descriptor: parse_field_type(&resolve_utf8(cp, descriptor_index)?)?,
            index,
        },
    ))
}

fn parse_module<'a>(input: &'a [u8], cp: &[ConstantPoolInfo]) -> PResult<'a, Module> {
    let (input, module_name_index) = be_u16(input)?;
    let (input, flags) = be_u16(input)?;
    let (input, _module_version_index) = be_u16(input)?;

    let (input, requires_count) = be_u16(input)?;
    let (input, requires) = repeat(input, requires_count as _, |i| {
        let (i, requires_index) = be_u16(i)?;
        let (i, _requires_flags) = be_u16(i)?;
        let (i, _requires_version_index) = be_u16(i)?;
        Ok((i, resolve_named(cp, requires_index, "module")?))
    })?;

    let (input, exports_count) = be_u16(input)?;
    let (input, exports) = repeat(input, exports_count as _, |i| {
        let (i, exports_index) = be_u16(i)?;
        let (i, exports_flags) = be_u16(i)?;
        let (i, exports_to_count) = be_u16(i)?;
        let (i, exports_to) = repeat(i, exports_to_count as _, |i| {
            let (i, index) = be_u16(i)?;
            Ok((i, resolve_named(cp, index, "module")?))
        })?;
        Ok((
            i,
            ModuleExport {
                exports: resolve_named(cp, exports_index, "package")?,
                exports_flags,
                exports_to,
            },
        ))
    })?;

    // opens share the layout of exports
    let (input, opens_count) = be_u16(input)?;
    let (input, _) = repeat(input, opens_count as _, |i| {
        let (i, _opens_index) = be_u16(i)?;
        let (i, _opens_flags) = be_u16(i)?;
        let (i, opens_to_count) = be_u16(i)?;
        let (i, _) = take(opens_to_count as usize * 2)(i)?;
        Ok((i, ()))
    })?;

    let (input, uses_count) = be_u16(input)?;
    let (input, _) = take(uses_count as usize * 2)(input)?;

    let (input, provides_count) = be_u16(input)?;
    let (input, _) = repeat(input, provides_count as _, |i| {
        let (i, _provides_index) = be_u16(i)?;
        let (i, provides_with_count) = be_u16(i)?;
        let (i, _) = take(provides_with_count as usize * 2)(i)?;
        Ok((i, ()))
    })?;

    Ok((
        input,
        Module {
            name: resolve_named(cp, module_name_index, "module")?,
            flags,
            requires,
            exports,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> Vec<ConstantPoolInfo> {
        vec![
            ConstantPoolInfo::Utf8("Code".into()),
            ConstantPoolInfo::Utf8("LineNumberTable".into()),
            ConstantPoolInfo::Utf8("SourceFile".into()),
            ConstantPoolInfo::Utf8("Main.java".into()),
            ConstantPoolInfo::Utf8("java/lang/Exception".into()),
            ConstantPoolInfo::Class { name_index: 5 },
            ConstantPoolInfo::Utf8("Exceptions".into()),
            ConstantPoolInfo::Utf8("Custom".into()),
        ]
    }

    #[test]
    fn test_code_with_line_numbers() {
        let cp = pool();
        let mut body = vec![0, 2, 0, 1, 0, 0, 0, 2, 0x03, 0xac];
        // one handler covering the whole method
        body.extend_from_slice(&[0, 1, 0, 0, 0, 2, 0, 1, 0, 6]);
        body.extend_from_slice(&[0, 1, 0, 2, 0, 0, 0, 6, 0, 1, 0, 0, 0, 7]);
        let AttributeInfo::Code(code) = parse_attribute(1, &body, &cp).unwrap() else {
            panic!("not code");
        };
        assert_eq!(code.max_stack, 2);
        assert_eq!(code.code.as_ref(), &[0x03, 0xac]);
        assert_eq!(code.exception_table[0].catch_type.as_deref(), Some("java/lang/Exception"));
        assert_eq!(code.line_number(1), Some(7));
    }

    #[test]
    fn test_exception_range_checked() {
        let cp = pool();
        let mut body = vec![0, 1, 0, 1, 0, 0, 0, 1, 0xb1];
        body.extend_from_slice(&[0, 1, 0, 0, 0, 5, 0, 0, 0, 0]);
        body.extend_from_slice(&[0, 0]);
        let err = parse_attribute(1, &body, &cp).unwrap_err();
        assert!(err.to_string().starts_with("Illegal exception table range"), "{err}");
    }

    #[test]
    fn test_length_mismatch() {
        let cp = pool();
        let err = parse_attribute(3, &[0, 4, 0], &cp).unwrap_err();
        assert!(err.to_string().starts_with("Wrong length for SourceFile"), "{err}");
        let err = parse_attribute(3, &[0], &cp).unwrap_err();
        assert_eq!(err.to_string(), "Truncated SourceFile attribute");
    }

    #[test]
    fn test_exceptions_and_unknown() {
        let cp = pool();
        let AttributeInfo::Exceptions(list) = parse_attribute(7, &[0, 1, 0, 6], &cp).unwrap()
        else {
            panic!("not exceptions");
        };
        assert_eq!(list[0].as_ref(), "java/lang/Exception");
        let AttributeInfo::Unknown { name, info } = parse_attribute(8, &[1, 2], &cp).unwrap()
        else {
            panic!("not unknown");
        };
        assert_eq!(name.as_ref(), "Custom");
        assert_eq!(info.as_ref(), &[1, 2]);
    }
}
