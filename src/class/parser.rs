use crate::{
    class::{
        AttributeInfo, Class, ClassFormatError, ConstantPoolInfo, FieldInfo, MethodInfo,
        structs::{java_str, resolve_class_name, resolve_utf8, validate_constant_pool},
    },
    consts::{
        ClassAccessFlag, FieldAccessFlag, MAX_SUPPORTED_MAJOR, MIN_SUPPORTED_MAJOR,
        MethodAccessFlag,
    },
};
use nom::{
    IResult, Parser,
    bytes::complete::{tag, take},
    error_position,
    multi::count,
    number::complete::{be_f32, be_f64, be_i32, be_i64, be_u16, be_u32, u8},
};

pub fn class_file(input: &[u8]) -> Result<Class, ClassFormatError> {
    let (input, (minor, major)) = parse_header(input)?;
    if !(MIN_SUPPORTED_MAJOR..=MAX_SUPPORTED_MAJOR).contains(&major) {
        return Err(ClassFormatError::UnsupportedVersion { major, minor });
    }
    let (input, constant_pool) = parse_constant_pool(input)?;

    let (input, access_flags) = be_u16(input)?;
    let (input, this_class) = be_u16(input)?;
    let (input, super_class) = be_u16(input)?;
    let (input, interfaces) = parse_interfaces(input)?;
    let (input, fields) = parse_fields(input)?;
    let (input, methods) = parse_methods(input)?;
    let (input, attributes) = parse_attributes(input)?;

    if !input.is_empty() {
        return Err(ClassFormatError::new(format!(
            "Extra bytes at the end of class file ({} left)",
            input.len()
        )));
    }

    let class = Class {
        major_version: major,
        minor_version: minor,
        access_flags: ClassAccessFlag::from_bits_retain(access_flags),
        this_class,
        super_class,
        constant_pool,
        interfaces,
        fields,
        methods,
        attributes,
    };
    check_references(&class)?;
    Ok(class)
}

fn check_references(class: &Class) -> Result<(), ClassFormatError> {
    let pool = &class.constant_pool;
    validate_constant_pool(pool)?;

    resolve_class_name(pool, class.this_class)?;
    if class.super_class != 0 {
        resolve_class_name(pool, class.super_class)?;
    }
    for interface in &class.interfaces {
        resolve_class_name(pool, *interface)?;
    }
    let check_attributes = |attributes: &[AttributeInfo]| {
        attributes
            .iter()
            .try_for_each(|a| resolve_utf8(pool, a.attribute_name_index).map(drop))
    };
    for field in &class.fields {
        resolve_utf8(pool, field.name_index)?;
        resolve_utf8(pool, field.descriptor_index)?;
        check_attributes(&field.attributes)?;
    }
    for method in &class.methods {
        resolve_utf8(pool, method.name_index)?;
        resolve_utf8(pool, method.descriptor_index)?;
        check_attributes(&method.attributes)?;
    }
    check_attributes(&class.attributes)
}

fn parse_header(input: &[u8]) -> IResult<&[u8], (u16, u16)> {
    let (input, _) = tag(&[0xcau8, 0xfe, 0xba, 0xbe] as &[u8])(input)?;
    let (input, minor) = be_u16(input)?;
    let (input, major) = be_u16(input)?;
    Ok((input, (minor, major)))
}

fn parse_constant_pool(input: &[u8]) -> IResult<&[u8], Vec<ConstantPoolInfo>> {
    let (input, constant_pool_count) = be_u16(input)?;
    if constant_pool_count == 0 {
        return Err(nom::Err::Failure(error_position!(
            input,
            nom::error::ErrorKind::Count
        )));
    }

    let mut constant_pool = Vec::with_capacity(constant_pool_count as usize - 1);

    let mut input = input;

    while constant_pool.len() < constant_pool_count as usize - 1 {
        let constant;
        (input, constant) = parse_constant(input)?;
        let need_empty = matches!(
            constant,
            ConstantPoolInfo::Long(_) | ConstantPoolInfo::Double(_)
        );
        constant_pool.push(constant);
        if need_empty {
            constant_pool.push(ConstantPoolInfo::Empty);
        }
    }
    // a trailing long/double may not spill past the declared count
    constant_pool.truncate(constant_pool_count as usize - 1);

    Ok((input, constant_pool))
}

fn parse_constant(mut input: &[u8]) -> IResult<&[u8], ConstantPoolInfo> {
    let tag;
    (input, tag) = u8(input)?;
    let cp_info = match tag {
        1 => {
            let length;
            (input, length) = be_u16(input)?;
            let bytes;
            (input, bytes) = take(length)(input)?;
            let Some(text) = java_str::decode(bytes) else {
                return Err(nom::Err::Failure(error_position!(
                    bytes,
                    nom::error::ErrorKind::Verify
                )));
            };
            ConstantPoolInfo::Utf8(text.as_ref().into())
        }
        3 => {
            let int;
            (input, int) = be_i32(input)?;
            ConstantPoolInfo::Integer(int)
        }
        4 => {
            let float;
            (input, float) = be_f32(input)?;
            ConstantPoolInfo::Float(float)
        }
        5 => {
            let long;
            (input, long) = be_i64(input)?;
            ConstantPoolInfo::Long(long)
        }
        6 => {
            let double;
            (input, double) = be_f64(input)?;
            ConstantPoolInfo::Double(double)
        }
        7 => {
            let name_index;
            (input, name_index) = be_u16(input)?;

            ConstantPoolInfo::Class { name_index }
        }
        8 => {
            let string_index;
            (input, string_index) = be_u16(input)?;

            ConstantPoolInfo::String { string_index }
        }
        9 => {
            let (class_index, name_and_type_index);
            (input, class_index) = be_u16(input)?;
            (input, name_and_type_index) = be_u16(input)?;
            ConstantPoolInfo::Fieldref {
                class_index,
                name_and_type_index,
            }
        }
        10 => {
            let (class_index, name_and_type_index);
            (input, class_index) = be_u16(input)?;
            (input, name_and_type_index) = be_u16(input)?;
            ConstantPoolInfo::Methodref {
                class_index,
                name_and_type_index,
            }
        }
        11 => {
            let (class_index, name_and_type_index);
            (input, class_index) = be_u16(input)?;
            (input, name_and_type_index) = be_u16(input)?;
            ConstantPoolInfo::InterfaceMethodref {
                class_index,
                name_and_type_index,
            }
        }
        12 => {
            let (name_index, descriptor_index);
            (input, name_index) = be_u16(input)?;
            (input, descriptor_index) = be_u16(input)?;
            ConstantPoolInfo::NameAndType {
                name_index,
                descriptor_index,
            }
        }
        15 => {
            let (reference_kind, reference_index);
            (input, reference_kind) = u8(input)?;
            (input, reference_index) = be_u16(input)?;
            ConstantPoolInfo::MethodHandle {
                reference_kind,
                reference_index,
            }
        }
        16 => {
            let descriptor_index;
            (input, descriptor_index) = be_u16(input)?;
            ConstantPoolInfo::MethodType { descriptor_index }
        }
        17 => {
            let (bootstrap_method_attr_index, name_and_type_index);
            (input, bootstrap_method_attr_index) = be_u16(input)?;
            (input, name_and_type_index) = be_u16(input)?;
            ConstantPoolInfo::Dynamic {
                bootstrap_method_attr_index,
                name_and_type_index,
            }
        }
        18 => {
            let (bootstrap_method_attr_index, name_and_type_index);
            (input, bootstrap_method_attr_index) = be_u16(input)?;
            (input, name_and_type_index) = be_u16(input)?;
            ConstantPoolInfo::InvokeDynamic {
                bootstrap_method_attr_index,
                name_and_type_index,
            }
        }
        19 => {
            let name_index;
            (input, name_index) = be_u16(input)?;
            ConstantPoolInfo::Module { name_index }
        }
        20 => {
            let name_index;
            (input, name_index) = be_u16(input)?;
            ConstantPoolInfo::Package { name_index }
        }
        _ => {
            log::debug!("unknown constant pool tag {tag}");
            return Err(nom::Err::Failure(error_position!(
                input,
                nom::error::ErrorKind::Switch
            )));
        }
    };
    Ok((input, cp_info))
}

fn parse_interfaces(input: &[u8]) -> IResult<&[u8], Vec<u16>> {
    let (input, interface_count) = be_u16(input)?;

    let (input, interfaces) = count(be_u16, interface_count as _).parse(input)?;

    Ok((input, interfaces))
}

fn parse_fields(input: &[u8]) -> IResult<&[u8], Vec<FieldInfo>> {
    let (input, field_count) = be_u16(input)?;
    let (input, fields) = count(parse_field, field_count as _).parse(input)?;
    Ok((input, fields))
}

fn parse_field(input: &[u8]) -> IResult<&[u8], FieldInfo> {
    let (input, access_flags) = be_u16(input)?;
    let (input, name_index) = be_u16(input)?;
    let (input, descriptor_index) = be_u16(input)?;

    let (input, attributes) = parse_attributes(input)?;
    Ok((
        input,
        FieldInfo {
            access_flags: FieldAccessFlag::from_bits_retain(access_flags),
            name_index,
            descriptor_index,
            attributes,
        },
    ))
}

pub(crate) fn parse_attributes(input: &[u8]) -> IResult<&[u8], Vec<AttributeInfo>> {
    let (input, attributes_count) = be_u16(input)?;

    let (input, attributes) = count(parse_attribute, attributes_count as _).parse(input)?;

    Ok((input, attributes))
}

fn parse_attribute(input: &[u8]) -> IResult<&[u8], AttributeInfo> {
    let (input, attribute_name_index) = be_u16(input)?;
    let (input, attribute_length) = be_u32(input)?;
    let (input, info) = take(attribute_length)(input)?;

    Ok((
        input,
        AttributeInfo {
            attribute_name_index,
            info: info.to_vec(),
        },
    ))
}

fn parse_methods(input: &[u8]) -> IResult<&[u8], Vec<MethodInfo>> {
    let (input, methods_count) = be_u16(input)?;

    let (input, methods) = count(parse_method, methods_count as _).parse(input)?;

    Ok((input, methods))
}

fn parse_method(input: &[u8]) -> IResult<&[u8], MethodInfo> {
    let (input, access_flags) = be_u16(input)?;
    let (input, name_index) = be_u16(input)?;
    let (input, descriptor_index) = be_u16(input)?;
    let (input, attributes) = parse_attributes(input)?;

    Ok((
        input,
        MethodInfo {
            access_flags: MethodAccessFlag::from_bits_retain(access_flags),
            name_index,
            descriptor_index,
            attributes,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::builder::ClassBuilder;

    #[test]
    fn test_parse_constant_pool_round_trip() {
        let mut builder = ClassBuilder::new("test/ParserPool", "java/lang/Object");
        let text = builder.utf8("h\u{e9}llo \u{1F600}");
        let int = builder.integer(-7);
        let long = builder.long(i64::MIN);
        let double = builder.double(2.5);
        let float = builder.float(-0.0);
        let bytes = builder.build();

        let class = class_file(&bytes).unwrap();
        assert_eq!(class.class_name().unwrap().as_ref(), "test/ParserPool");
        assert_eq!(
            class.constant(text),
            Some(&ConstantPoolInfo::Utf8("h\u{e9}llo \u{1F600}".into()))
        );
        assert_eq!(class.constant(int), Some(&ConstantPoolInfo::Integer(-7)));
        assert_eq!(class.constant(long), Some(&ConstantPoolInfo::Long(i64::MIN)));
        assert_eq!(class.constant(long + 1), Some(&ConstantPoolInfo::Empty));
        assert_eq!(class.constant(double), Some(&ConstantPoolInfo::Double(2.5)));
        let Some(ConstantPoolInfo::Float(f)) = class.constant(float) else {
            panic!("float constant missing");
        };
        assert!(f.is_sign_negative());
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = ClassBuilder::new("test/BadMagic", "java/lang/Object").build();
        bytes[0] = 0xCB;
        assert_eq!(
            class_file(&bytes).unwrap_err(),
            ClassFormatError::new("Incompatible magic value")
        );
    }

    #[test]
    fn test_unsupported_version() {
        let mut bytes = ClassBuilder::new("test/Future", "java/lang/Object").build();
        bytes[6] = 0x00;
        bytes[7] = 99;
        assert_eq!(
            class_file(&bytes).unwrap_err(),
            ClassFormatError::UnsupportedVersion {
                major: 99,
                minor: 0
            }
        );
    }

    #[test]
    fn test_truncated_and_trailing() {
        let bytes = ClassBuilder::new("test/Short", "java/lang/Object").build();
        let err = class_file(&bytes[..bytes.len() - 3]).unwrap_err();
        assert_eq!(err, ClassFormatError::new("Truncated class file"));

        let mut longer = bytes.clone();
        longer.push(0);
        assert!(
            class_file(&longer)
                .unwrap_err()
                .to_string()
                .starts_with("Extra bytes")
        );
    }

    #[test]
    fn test_unknown_tag() {
        let mut bytes = ClassBuilder::new("test/Tag", "java/lang/Object").build();
        // the first constant pool entry starts right after the count
        bytes[10] = 2;
        assert_eq!(
            class_file(&bytes).unwrap_err(),
            ClassFormatError::new("Unknown constant pool tag")
        );
    }
}
