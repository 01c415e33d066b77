#[cfg(test)]
pub(crate) mod builder;
mod parser;
mod structs;

pub use parser::class_file;
pub use structs::*;
pub(crate) use structs::{constant, resolve_class_name, resolve_utf8};

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClassFormatError {
    #[error("{0}")]
    Format(String),
    #[error("class file version {major}.{minor} is not supported")]
    UnsupportedVersion { major: u16, minor: u16 },
}

impl ClassFormatError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        ClassFormatError::Format(message.into())
    }

    /// Name of the `java/lang` error the VM throws for this failure.
    pub fn java_class_name(&self) -> &'static str {
        match self {
            ClassFormatError::Format(_) => "java/lang/ClassFormatError",
            ClassFormatError::UnsupportedVersion { .. } => {
                "java/lang/UnsupportedClassVersionError"
            }
        }
    }
}

impl From<nom::Err<nom::error::Error<&[u8]>>> for ClassFormatError {
    fn from(err: nom::Err<nom::error::Error<&[u8]>>) -> Self {
        match err {
            nom::Err::Incomplete(_) => ClassFormatError::new("Truncated class file"),
            nom::Err::Error(e) | nom::Err::Failure(e) => match e.code {
                nom::error::ErrorKind::Tag => ClassFormatError::new("Incompatible magic value"),
                nom::error::ErrorKind::Verify => {
                    ClassFormatError::new("Illegal modified UTF-8 in constant pool")
                }
                nom::error::ErrorKind::Switch => {
                    ClassFormatError::new("Unknown constant pool tag")
                }
                _ => ClassFormatError::new("Truncated class file"),
            },
        }
    }
}
