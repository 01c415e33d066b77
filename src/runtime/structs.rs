use std::{cell::Cell, collections::HashMap, fmt, sync::Arc};

use once_cell::sync::OnceCell;

pub use attributes::*;
pub use constant_pool::*;
pub use monitor::{Monitor, MonitorError};
pub use object::*;

use crate::{
    class::ClassFormatError,
    consts::{ClassAccessFlag, FieldAccessFlag, MethodAccessFlag},
    descriptor::{FieldType, MethodDescriptor},
};

mod attributes;
mod constant_pool;
mod monitor;
mod object;

/// A linked class as published into the method area.
#[derive(Debug)]
pub struct Class {
    pub(crate) name: Arc<str>,
    pub(crate) name_index: u32,
    pub(crate) access_flags: ClassAccessFlag,
    pub(crate) super_class: Option<Arc<Class>>,
    pub(crate) interfaces: Vec<Arc<Class>>,
    pub(crate) constant_pool: Vec<ConstantPoolInfo>,
    pub(crate) fields: Vec<FieldInfo>,
    /// keyed by name followed by descriptor, e.g. `main([Ljava/lang/String;)V`
    pub(crate) methods: HashMap<String, Arc<MethodInfo>>,
    pub(crate) attributes: Vec<AttributeInfo>,
    pub(crate) source_file: Option<Arc<str>>,
    pub(crate) bootstrap_methods: Vec<BootstrapMethod>,
    /// `bootstrap` or `app`
    pub(crate) loader: &'static str,
    /// element type for array classes
    pub(crate) component: Option<FieldType>,
    pub(crate) clinit: parking_lot::ReentrantMutex<Cell<ClinitStatus>>,
    pub(crate) mirror: OnceCell<ObjectRef>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ClinitStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl Class {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn constant(&self, index: u16) -> Option<&ConstantPoolInfo> {
        if index == 0 {
            return None;
        }
        self.constant_pool.get(index as usize - 1)
    }

    pub(crate) fn is_interface(&self) -> bool {
        self.access_flags.contains(ClassAccessFlag::INTERFACE)
    }

    pub(crate) fn is_array(&self) -> bool {
        self.name.starts_with('[')
    }

    pub(crate) fn package_name(&self) -> &str {
        match self.name.rsplit_once('/') {
            Some((package, _)) if !self.is_array() => package,
            _ => "",
        }
    }

    pub(crate) fn module_name(&self) -> Option<&'static str> {
        (self.loader == "bootstrap").then_some("java.base")
    }

    pub(crate) fn declared_method(&self, name: &str, descriptor: &str) -> Option<&Arc<MethodInfo>> {
        self.methods.get(&format!("{name}{descriptor}"))
    }

    pub(crate) fn declared_field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name.as_ref() == name)
    }

    /// This class followed by its superclasses, nearest first.
    pub(crate) fn ancestors(self: &Arc<Self>) -> impl Iterator<Item = Arc<Class>> {
        let mut next = Some(Arc::clone(self));
        std::iter::from_fn(move || {
            let current = next.take()?;
            next = current.super_class.clone();
            Some(current)
        })
    }

    pub(crate) fn clinit_status(&self) -> ClinitStatus {
        self.clinit.lock().get()
    }
}

#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub(crate) access_flags: FieldAccessFlag,
    pub(crate) name: Arc<str>,
    pub(crate) descriptor: Arc<str>,
    pub(crate) field_type: FieldType,
    pub(crate) constant_value: Option<Const>,
    pub(crate) attributes: Vec<AttributeInfo>,
}

impl FieldInfo {
    pub(crate) fn is_static(&self) -> bool {
        self.access_flags.contains(FieldAccessFlag::STATIC)
    }
}

#[derive(Debug)]
pub struct MethodInfo {
    pub(crate) access_flags: MethodAccessFlag,
    pub(crate) name: Arc<str>,
    pub(crate) descriptor: Arc<str>,
    pub(crate) parsed: MethodDescriptor,
    pub(crate) code: Option<Arc<CodeAttribute>>,
    pub(crate) attributes: Vec<AttributeInfo>,
}

impl MethodInfo {
    pub(crate) fn is_public(&self) -> bool {
        self.access_flags.contains(MethodAccessFlag::PUBLIC)
    }

    pub(crate) fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlag::STATIC)
    }

    pub(crate) fn is_native(&self) -> bool {
        self.access_flags.contains(MethodAccessFlag::NATIVE)
    }

    pub(crate) fn is_abstract(&self) -> bool {
        self.access_flags.contains(MethodAccessFlag::ABSTRACT)
    }

    pub(crate) fn is_synchronized(&self) -> bool {
        self.access_flags.contains(MethodAccessFlag::SYNCHRONIZED)
    }

    pub(crate) fn is_deprecated(&self) -> bool {
        self.attributes
            .iter()
            .any(|a| matches!(a, AttributeInfo::Deprecated))
    }

    pub(crate) fn arg_slots(&self) -> usize {
        self.parsed.param_slots() + usize::from(!self.is_static())
    }
}

/// Operand stack and local variable slot.
///
/// `long` and `double` occupy two consecutive slots holding the same value.
/// Every integral type narrower than `long` is kept sign-extended in `Int`.
#[derive(Debug, Clone, Default)]
pub enum Value {
    Int(i64),
    Float(f64),
    Ref(ObjectRef),
    #[default]
    Null,
}

impl Value {
    pub fn int(v: i32) -> Self {
        Value::Int(v as i64)
    }

    pub fn long(v: i64) -> Self {
        Value::Int(v)
    }

    pub fn float(v: f32) -> Self {
        Value::Float(v as f64)
    }

    pub fn double(v: f64) -> Self {
        Value::Float(v)
    }

    pub fn boolean(v: bool) -> Self {
        Value::Int(v as i64)
    }

    pub fn reference(obj: Option<ObjectRef>) -> Self {
        match obj {
            Some(obj) => Value::Ref(obj),
            None => Value::Null,
        }
    }

    pub fn as_int(&self) -> NativeResult<i32> {
        match self {
            Value::Int(v) => Ok(*v as i32),
            other => Err(Exception::fatal(format!("expected int, found {other:?}"))),
        }
    }

    pub fn as_long(&self) -> NativeResult<i64> {
        match self {
            Value::Int(v) => Ok(*v),
            other => Err(Exception::fatal(format!("expected long, found {other:?}"))),
        }
    }

    pub fn as_bool(&self) -> NativeResult<bool> {
        Ok(self.as_int()? != 0)
    }

    pub fn as_float(&self) -> NativeResult<f32> {
        match self {
            Value::Float(v) => Ok(*v as f32),
            other => Err(Exception::fatal(format!("expected float, found {other:?}"))),
        }
    }

    pub fn as_double(&self) -> NativeResult<f64> {
        match self {
            Value::Float(v) => Ok(*v),
            other => Err(Exception::fatal(format!("expected double, found {other:?}"))),
        }
    }

    pub fn as_ref(&self) -> NativeResult<Option<ObjectRef>> {
        match self {
            Value::Ref(obj) => Ok(Some(Arc::clone(obj))),
            Value::Null => Ok(None),
            other => Err(Exception::fatal(format!(
                "expected reference, found {other:?}"
            ))),
        }
    }

    /// Like [`Value::as_ref`], raising `NullPointerException` for null.
    pub fn as_object(&self) -> NativeResult<ObjectRef> {
        self.as_ref()?
            .ok_or_else(|| Exception::new("java/lang/NullPointerException"))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub(crate) fn same_ref(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Ref(a), Value::Ref(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// A Java-visible failure, or a VM fault that no handler may catch.
#[derive(Debug, Clone)]
pub enum Exception {
    /// Raised by the VM or a G-function; becomes a Throwable at the call site.
    Vm {
        class_name: Arc<str>,
        message: Option<String>,
    },
    /// An already constructed Throwable.
    Thrown(ObjectRef),
    /// `System.exit` unwinding the calling thread; never caught.
    Exit(i32),
    Fatal(String),
}

impl Exception {
    pub(crate) fn new(class_name: &str) -> Self {
        Exception::Vm {
            class_name: Arc::from(class_name),
            message: None,
        }
    }

    pub(crate) fn with_message(class_name: &str, message: impl Into<String>) -> Self {
        Exception::Vm {
            class_name: Arc::from(class_name),
            message: Some(message.into()),
        }
    }

    pub(crate) fn fatal(message: impl Into<String>) -> Self {
        Exception::Fatal(message.into())
    }

    pub(crate) fn is_fatal(&self) -> bool {
        matches!(self, Exception::Fatal(_))
    }

    /// Fatal faults and exit requests pass every handler.
    pub(crate) fn is_catchable(&self) -> bool {
        !matches!(self, Exception::Fatal(_) | Exception::Exit(_))
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exception::Vm {
                class_name,
                message: Some(message),
            } => write!(f, "{}: {message}", class_name.replace('/', ".")),
            Exception::Vm { class_name, .. } => f.write_str(&class_name.replace('/', ".")),
            Exception::Thrown(obj) => write!(f, "{}", obj.class_name().replace('/', ".")),
            Exception::Exit(code) => write!(f, "exit({code})"),
            Exception::Fatal(message) => write!(f, "internal error: {message}"),
        }
    }
}

impl From<ClassFormatError> for Exception {
    fn from(err: ClassFormatError) -> Self {
        Exception::with_message(err.java_class_name(), err.to_string())
    }
}

impl From<nom::Err<nom::error::Error<&[u8]>>> for Exception {
    fn from(err: nom::Err<nom::error::Error<&[u8]>>) -> Self {
        ClassFormatError::from(err).into()
    }
}

pub type NativeResult<T> = ::std::result::Result<T, Exception>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::int(-3).as_int().unwrap(), -3);
        assert_eq!(Value::long(1 << 40).as_long().unwrap(), 1 << 40);
        assert_eq!(Value::float(1.5).as_float().unwrap(), 1.5);
        assert!(Value::boolean(true).as_bool().unwrap());
        assert!(Value::Null.as_ref().unwrap().is_none());
        assert!(Value::int(1).as_double().unwrap_err().is_fatal());
        match Value::Null.as_object().unwrap_err() {
            Exception::Vm { class_name, .. } => {
                assert_eq!(class_name.as_ref(), "java/lang/NullPointerException")
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn test_exception_display() {
        let e = Exception::with_message("java/lang/ArithmeticException", "/ by zero");
        assert_eq!(e.to_string(), "java.lang.ArithmeticException: / by zero");
        let e: Exception = ClassFormatError::UnsupportedVersion {
            major: 70,
            minor: 0,
        }
        .into();
        assert!(e.to_string().starts_with("java.lang.UnsupportedClassVersionError"));
    }
}
