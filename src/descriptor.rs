use std::fmt::{self, Display};

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::take_until,
    character::complete::{char, one_of},
    combinator::{eof, map},
    multi::many0,
    sequence::delimited,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldDescriptor(pub(crate) FieldType);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    pub(crate) parameters: Vec<FieldType>,
    pub(crate) return_type: ReturnType,
}

pub type ReturnType = Option<FieldType>;

#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub enum FieldType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Object(String),
    Short,
    Boolean,
    Array(Box<FieldType>),
}

impl FieldType {
    /// long and double take two local/operand slots
    pub fn is_wide(&self) -> bool {
        matches!(self, FieldType::Long | FieldType::Double)
    }

    pub fn slots(&self) -> usize {
        if self.is_wide() { 2 } else { 1 }
    }

    pub fn is_primitive(&self) -> bool {
        !matches!(self, FieldType::Object(_) | FieldType::Array(_))
    }

    pub fn is_reference(&self) -> bool {
        !self.is_primitive()
    }

    pub fn to_descriptor(&self) -> String {
        let mut out = String::new();
        self.write_descriptor(&mut out);
        out
    }

    fn write_descriptor(&self, out: &mut String) {
        match self {
            FieldType::Byte => out.push('B'),
            FieldType::Char => out.push('C'),
            FieldType::Double => out.push('D'),
            FieldType::Float => out.push('F'),
            FieldType::Int => out.push('I'),
            FieldType::Long => out.push('J'),
            FieldType::Short => out.push('S'),
            FieldType::Boolean => out.push('Z'),
            FieldType::Object(name) => {
                out.push('L');
                out.push_str(name);
                out.push(';');
            }
            FieldType::Array(element) => {
                out.push('[');
                element.write_descriptor(out);
            }
        }
    }

    /// Internal class name of a reference type: `java/lang/String` or `[I`.
    pub fn class_name(&self) -> Option<String> {
        match self {
            FieldType::Object(name) => Some(name.clone()),
            FieldType::Array(_) => Some(self.to_descriptor()),
            _ => None,
        }
    }

    /// Source-level name of primitive types, as `Class.getName` reports them.
    pub fn primitive_name(&self) -> Option<&'static str> {
        Some(match self {
            FieldType::Byte => "byte",
            FieldType::Char => "char",
            FieldType::Double => "double",
            FieldType::Float => "float",
            FieldType::Int => "int",
            FieldType::Long => "long",
            FieldType::Short => "short",
            FieldType::Boolean => "boolean",
            _ => return None,
        })
    }

    pub fn from_primitive_tag(tag: u8) -> Option<FieldType> {
        Some(match tag {
            b'B' => FieldType::Byte,
            b'C' => FieldType::Char,
            b'D' => FieldType::Double,
            b'F' => FieldType::Float,
            b'I' => FieldType::Int,
            b'J' => FieldType::Long,
            b'S' => FieldType::Short,
            b'Z' => FieldType::Boolean,
            _ => return None,
        })
    }
}

impl Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_descriptor())
    }
}

impl MethodDescriptor {
    pub fn param_slots(&self) -> usize {
        self.parameters.iter().map(FieldType::slots).sum()
    }

    pub fn return_slots(&self) -> usize {
        self.return_type.as_ref().map_or(0, FieldType::slots)
    }
}

impl Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for parameter in &self.parameters {
            Display::fmt(parameter, f)?;
        }
        f.write_str(")")?;
        match &self.return_type {
            Some(return_type) => Display::fmt(return_type, f),
            None => f.write_str("V"),
        }
    }
}

pub fn parse_field_descriptor(input: &str) -> IResult<&str, FieldDescriptor> {
    let (input, field_type) = parse_field_type(input)?;
    eof(input)?;
    Ok((input, FieldDescriptor(field_type)))
}

pub fn parse_method_descriptor(input: &str) -> IResult<&str, MethodDescriptor> {
    let (input, parameters) =
        delimited(char('('), many0(parse_field_type), char(')')).parse(input)?;

    let (input, return_type) = parse_return_type_descriptor(input)?;

    eof(input)?;
    Ok((
        input,
        MethodDescriptor {
            parameters,
            return_type,
        },
    ))
}

pub fn parse_return_type_descriptor(input: &str) -> IResult<&str, ReturnType> {
    alt((map(parse_field_type, Some), parse_void_type)).parse(input)
}

/// Convenience wrapper for descriptors that come from trusted tables.
pub fn field_type(descriptor: &str) -> Option<FieldType> {
    parse_field_descriptor(descriptor)
        .ok()
        .map(|(_, FieldDescriptor(field_type))| field_type)
}

pub fn method_descriptor(descriptor: &str) -> Option<MethodDescriptor> {
    parse_method_descriptor(descriptor).ok().map(|(_, d)| d)
}

fn parse_field_type(input: &str) -> IResult<&str, FieldType> {
    alt((parse_base_type, parse_object_type, parse_array_type)).parse(input)
}

fn parse_base_type(input: &str) -> IResult<&str, FieldType> {
    let (input, ch) = one_of("BCDFIJSZ").parse(input)?;
    let field_type = match ch {
        'B' => FieldType::Byte,
        'C' => FieldType::Char,
        'D' => FieldType::Double,
        'F' => FieldType::Float,
        'I' => FieldType::Int,
        'J' => FieldType::Long,
        'S' => FieldType::Short,
        _ => FieldType::Boolean,
    };
    Ok((input, field_type))
}

fn parse_object_type(input: &str) -> IResult<&str, FieldType> {
    let (input, _) = char('L').parse(input)?;

    let (input, class_name) = take_until(";").parse(input)?;

    let (input, _) = char(';').parse(input)?;

    Ok((input, FieldType::Object(class_name.to_string())))
}

fn parse_array_type(input: &str) -> IResult<&str, FieldType> {
    let (input, _) = char('[').parse(input)?;

    let (input, field_type) = parse_field_type(input)?;

    Ok((input, FieldType::Array(Box::new(field_type))))
}

fn parse_void_type(input: &str) -> IResult<&str, Option<FieldType>> {
    let (input, _) = char('V').parse(input)?;
    Ok((input, None))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_descriptor_slots() {
        let descriptor = method_descriptor("(IDLjava/lang/String;[I)J").unwrap();
        assert_eq!(
            descriptor.parameters,
            vec![
                FieldType::Int,
                FieldType::Double,
                FieldType::Object("java/lang/String".to_string()),
                FieldType::Array(Box::new(FieldType::Int)),
            ]
        );
        assert_eq!(descriptor.param_slots(), 5);
        assert_eq!(descriptor.return_slots(), 2);
        assert_eq!(descriptor.to_string(), "(IDLjava/lang/String;[I)J");
    }

    #[test]
    fn test_void_and_empty() {
        let descriptor = method_descriptor("()V").unwrap();
        assert!(descriptor.parameters.is_empty());
        assert_eq!(descriptor.return_type, None);
        assert_eq!(descriptor.return_slots(), 0);
    }

    #[test]
    fn test_field_descriptor() {
        assert_eq!(
            field_type("[[Ljava/lang/Object;").unwrap().class_name().unwrap(),
            "[[Ljava/lang/Object;"
        );
        assert_eq!(field_type("Z"), Some(FieldType::Boolean));
        assert!(field_type("Ljava/lang/Object").is_none());
        assert!(field_type("II").is_none());
        assert!(method_descriptor("(I").is_none());
    }
}
