use std::{cell::Cell, collections::HashMap, sync::Arc};

use once_cell::sync::OnceCell;
use parking_lot::ReentrantMutex;

use crate::{
    consts::ClassAccessFlag,
    descriptor::FieldType,
    runtime::{
        Class, ClinitStatus, NativeResult, class_loader::ClassLoader, string_pool,
    },
};

pub(crate) struct Builtin {
    name: &'static str,
    super_name: Option<&'static str>,
    interfaces: &'static [&'static str],
    flags: ClassAccessFlag,
}

const PUBLIC: ClassAccessFlag = ClassAccessFlag::PUBLIC.union(ClassAccessFlag::SUPER);
const FINAL: ClassAccessFlag = PUBLIC.union(ClassAccessFlag::FINAL);
const ABSTRACT: ClassAccessFlag = PUBLIC.union(ClassAccessFlag::ABSTRACT);
const INTERFACE: ClassAccessFlag = ClassAccessFlag::PUBLIC
    .union(ClassAccessFlag::INTERFACE)
    .union(ClassAccessFlag::ABSTRACT);
const ENUM: ClassAccessFlag = FINAL.union(ClassAccessFlag::ENUM);

const OBJECT: Option<&str> = Some("java/lang/Object");
const SERIALIZABLE: &[&str] = &["java/io/Serializable"];
const COMPARABLE: &[&str] = &["java/io/Serializable", "java/lang/Comparable"];

macro_rules! builtin {
    ($name:literal, $flags:expr) => {
        builtin!($name, OBJECT, &[], $flags)
    };
    ($name:literal, $super:expr, $interfaces:expr, $flags:expr) => {
        Builtin {
            name: $name,
            super_name: $super,
            interfaces: $interfaces,
            flags: $flags,
        }
    };
}

macro_rules! throwable {
    ($name:literal, $super:literal) => {
        builtin!($name, Some($super), &[], PUBLIC)
    };
}

static BUILTINS: &[Builtin] = &[
    builtin!("java/lang/Object", None, &[], PUBLIC),
    // interfaces
    builtin!("java/io/Serializable", INTERFACE),
    builtin!("java/lang/Cloneable", INTERFACE),
    builtin!("java/lang/Comparable", INTERFACE),
    builtin!("java/lang/CharSequence", INTERFACE),
    builtin!("java/lang/Runnable", INTERFACE),
    builtin!("java/lang/Appendable", INTERFACE),
    builtin!("java/lang/AutoCloseable", INTERFACE),
    builtin!("java/lang/Iterable", INTERFACE),
    builtin!("java/io/Closeable", OBJECT, &["java/lang/AutoCloseable"], INTERFACE),
    builtin!("java/lang/Thread$UncaughtExceptionHandler", INTERFACE),
    // java.lang
    builtin!(
        "java/lang/String",
        OBJECT,
        &["java/io/Serializable", "java/lang/Comparable", "java/lang/CharSequence"],
        FINAL
    ),
    builtin!(
        "java/lang/StringBuilder",
        OBJECT,
        &["java/io/Serializable", "java/lang/Appendable", "java/lang/CharSequence"],
        FINAL
    ),
    builtin!(
        "java/lang/StringBuffer",
        OBJECT,
        &["java/io/Serializable", "java/lang/Appendable", "java/lang/CharSequence"],
        FINAL
    ),
    builtin!("java/lang/Class", OBJECT, SERIALIZABLE, FINAL),
    builtin!("java/lang/Number", OBJECT, SERIALIZABLE, ABSTRACT),
    builtin!("java/lang/Byte", Some("java/lang/Number"), COMPARABLE, FINAL),
    builtin!("java/lang/Short", Some("java/lang/Number"), COMPARABLE, FINAL),
    builtin!("java/lang/Integer", Some("java/lang/Number"), COMPARABLE, FINAL),
    builtin!("java/lang/Long", Some("java/lang/Number"), COMPARABLE, FINAL),
    builtin!("java/lang/Float", Some("java/lang/Number"), COMPARABLE, FINAL),
    builtin!("java/lang/Double", Some("java/lang/Number"), COMPARABLE, FINAL),
    builtin!("java/lang/Character", OBJECT, COMPARABLE, FINAL),
    builtin!("java/lang/Boolean", OBJECT, COMPARABLE, FINAL),
    builtin!("java/lang/Void", FINAL),
    builtin!("java/lang/Math", FINAL),
    builtin!("java/lang/StrictMath", FINAL),
    builtin!("java/lang/System", FINAL),
    builtin!("java/lang/Runtime", PUBLIC),
    builtin!("java/lang/Thread", OBJECT, &["java/lang/Runnable"], PUBLIC),
    builtin!("java/lang/Enum", OBJECT, COMPARABLE, ABSTRACT),
    builtin!("java/lang/Record", ABSTRACT),
    builtin!("java/lang/Thread$State", Some("java/lang/Enum"), &[], ENUM),
    builtin!(
        "java/lang/ThreadGroup",
        OBJECT,
        &["java/lang/Thread$UncaughtExceptionHandler"],
        PUBLIC
    ),
    builtin!("java/lang/StackTraceElement", OBJECT, SERIALIZABLE, FINAL),
    builtin!("java/lang/reflect/Modifier", PUBLIC),
    builtin!("java/lang/SecurityManager", PUBLIC),
    builtin!("java/lang/Compiler", FINAL),
    builtin!("java/util/Objects", FINAL),
    builtin!("java/io/OutputStream", OBJECT, &["java/io/Closeable"], ABSTRACT),
    builtin!(
        "java/io/PrintStream",
        Some("java/io/OutputStream"),
        &["java/lang/Appendable", "java/io/Closeable"],
        PUBLIC
    ),
    // throwables
    builtin!("java/lang/Throwable", OBJECT, SERIALIZABLE, PUBLIC),
    throwable!("java/lang/Exception", "java/lang/Throwable"),
    throwable!("java/lang/Error", "java/lang/Throwable"),
    throwable!("java/lang/RuntimeException", "java/lang/Exception"),
    throwable!("java/lang/ReflectiveOperationException", "java/lang/Exception"),
    throwable!("java/lang/ClassNotFoundException", "java/lang/ReflectiveOperationException"),
    throwable!("java/lang/NoSuchMethodException", "java/lang/ReflectiveOperationException"),
    throwable!("java/lang/NoSuchFieldException", "java/lang/ReflectiveOperationException"),
    throwable!("java/lang/InstantiationException", "java/lang/ReflectiveOperationException"),
    throwable!("java/lang/IllegalAccessException", "java/lang/ReflectiveOperationException"),
    throwable!("java/lang/InterruptedException", "java/lang/Exception"),
    throwable!("java/lang/CloneNotSupportedException", "java/lang/Exception"),
    throwable!("java/io/IOException", "java/lang/Exception"),
    throwable!("java/lang/ArithmeticException", "java/lang/RuntimeException"),
    throwable!("java/lang/ArrayStoreException", "java/lang/RuntimeException"),
    throwable!("java/lang/ClassCastException", "java/lang/RuntimeException"),
    throwable!("java/lang/IllegalArgumentException", "java/lang/RuntimeException"),
    throwable!("java/lang/NumberFormatException", "java/lang/IllegalArgumentException"),
    throwable!("java/lang/IllegalThreadStateException", "java/lang/IllegalArgumentException"),
    throwable!("java/lang/IllegalStateException", "java/lang/RuntimeException"),
    throwable!("java/lang/IllegalMonitorStateException", "java/lang/RuntimeException"),
    throwable!("java/lang/IndexOutOfBoundsException", "java/lang/RuntimeException"),
    throwable!(
        "java/lang/ArrayIndexOutOfBoundsException",
        "java/lang/IndexOutOfBoundsException"
    ),
    throwable!(
        "java/lang/StringIndexOutOfBoundsException",
        "java/lang/IndexOutOfBoundsException"
    ),
    throwable!("java/lang/NegativeArraySizeException", "java/lang/RuntimeException"),
    throwable!("java/lang/NullPointerException", "java/lang/RuntimeException"),
    throwable!("java/lang/UnsupportedOperationException", "java/lang/RuntimeException"),
    throwable!("java/lang/SecurityException", "java/lang/RuntimeException"),
    throwable!("java/util/NoSuchElementException", "java/lang/RuntimeException"),
    throwable!("java/util/IllegalFormatException", "java/lang/IllegalArgumentException"),
    throwable!(
        "java/util/MissingFormatArgumentException",
        "java/util/IllegalFormatException"
    ),
    throwable!(
        "java/util/UnknownFormatConversionException",
        "java/util/IllegalFormatException"
    ),
    throwable!(
        "java/util/IllegalFormatConversionException",
        "java/util/IllegalFormatException"
    ),
    throwable!(
        "java/util/IllegalFormatCodePointException",
        "java/util/IllegalFormatException"
    ),
    throwable!(
        "java/util/regex/PatternSyntaxException",
        "java/lang/IllegalArgumentException"
    ),
    throwable!("java/lang/LinkageError", "java/lang/Error"),
    throwable!("java/lang/NoClassDefFoundError", "java/lang/LinkageError"),
    throwable!("java/lang/ClassFormatError", "java/lang/LinkageError"),
    throwable!("java/lang/UnsupportedClassVersionError", "java/lang/ClassFormatError"),
    throwable!("java/lang/ClassCircularityError", "java/lang/LinkageError"),
    throwable!("java/lang/VerifyError", "java/lang/LinkageError"),
    throwable!("java/lang/UnsatisfiedLinkError", "java/lang/LinkageError"),
    throwable!("java/lang/BootstrapMethodError", "java/lang/LinkageError"),
    throwable!("java/lang/ExceptionInInitializerError", "java/lang/LinkageError"),
    throwable!("java/lang/IncompatibleClassChangeError", "java/lang/LinkageError"),
    throwable!("java/lang/NoSuchMethodError", "java/lang/IncompatibleClassChangeError"),
    throwable!("java/lang/NoSuchFieldError", "java/lang/IncompatibleClassChangeError"),
    throwable!("java/lang/AbstractMethodError", "java/lang/IncompatibleClassChangeError"),
    throwable!("java/lang/IllegalAccessError", "java/lang/IncompatibleClassChangeError"),
    throwable!("java/lang/InstantiationError", "java/lang/IncompatibleClassChangeError"),
    throwable!("java/lang/VirtualMachineError", "java/lang/Error"),
    throwable!("java/lang/StackOverflowError", "java/lang/VirtualMachineError"),
    throwable!("java/lang/OutOfMemoryError", "java/lang/VirtualMachineError"),
    throwable!("java/lang/InternalError", "java/lang/VirtualMachineError"),
    throwable!("java/lang/AssertionError", "java/lang/Error"),
];

static INDEX: once_cell::sync::Lazy<HashMap<&'static str, &'static Builtin>> =
    once_cell::sync::Lazy::new(|| BUILTINS.iter().map(|b| (b.name, b)).collect());

pub(crate) fn find(name: &str) -> Option<&'static Builtin> {
    INDEX.get(name).copied()
}

/// Every class the bootstrap loader can define without bytes.
pub(crate) fn names() -> impl Iterator<Item = &'static str> {
    BUILTINS.iter().map(|b| b.name)
}

impl Builtin {
    pub(super) fn define(&self, loader: &'static ClassLoader) -> NativeResult<Arc<Class>> {
        let super_class = match self.super_name {
            Some(name) => Some(loader.load(name)?),
            None => None,
        };
        let interfaces = self
            .interfaces
            .iter()
            .map(|name| loader.load(name))
            .collect::<NativeResult<Vec<_>>>()?;
        log::debug!("[Loaded {} from builtin]", self.name.replace('/', "."));
        Ok(Arc::new(bare_class(
            self.name,
            self.flags,
            super_class,
            interfaces,
            None,
        )))
    }
}

fn bare_class(
    name: &str,
    access_flags: ClassAccessFlag,
    super_class: Option<Arc<Class>>,
    interfaces: Vec<Arc<Class>>,
    component: Option<FieldType>,
) -> Class {
    Class {
        name: Arc::from(name),
        name_index: string_pool::intern(name),
        access_flags,
        super_class,
        interfaces,
        constant_pool: Vec::new(),
        fields: Vec::new(),
        methods: HashMap::new(),
        attributes: Vec::new(),
        source_file: None,
        bootstrap_methods: Vec::new(),
        loader: "bootstrap",
        component,
        clinit: ReentrantMutex::new(Cell::new(ClinitStatus::Pending)),
        mirror: OnceCell::new(),
    }
}

/// `[I`, `[[Ljava/lang/String;` and so on. Array classes have nothing to initialize.
pub(crate) fn array_class(
    name: &str,
    array_type: FieldType,
    object: Arc<Class>,
    interfaces: &[Arc<Class>],
) -> Arc<Class> {
    let component = match array_type {
        FieldType::Array(component) => *component,
        other => other,
    };
    let class = bare_class(
        name,
        ClassAccessFlag::PUBLIC | ClassAccessFlag::FINAL | ClassAccessFlag::ABSTRACT,
        Some(object),
        interfaces.to_vec(),
        Some(component),
    );
    class.clinit.lock().set(ClinitStatus::Done);
    Arc::new(class)
}

/// A class with no members, for tests that need a published class quickly.
#[cfg(test)]
pub(crate) fn synthetic_class(
    name: &str,
    super_class: Option<Arc<Class>>,
    interfaces: &[Arc<Class>],
) -> Arc<Class> {
    Arc::new(bare_class(
        name,
        PUBLIC,
        super_class,
        interfaces.to_vec(),
        None,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::class_loader;

    #[test]
    fn test_every_builtin_super_is_builtin() {
        for builtin in BUILTINS {
            if let Some(super_name) = builtin.super_name {
                assert!(find(super_name).is_some(), "{}", builtin.name);
            }
            for interface in builtin.interfaces {
                let interface = find(interface).unwrap();
                assert!(interface.flags.contains(ClassAccessFlag::INTERFACE));
            }
        }
    }

    #[test]
    fn test_exception_hierarchy() {
        let aioobe = class_loader::bootstrap()
            .load("java/lang/ArrayIndexOutOfBoundsException")
            .unwrap();
        let chain: Vec<_> = aioobe.ancestors().map(|c| c.name().to_string()).collect();
        assert_eq!(
            chain,
            [
                "java/lang/ArrayIndexOutOfBoundsException",
                "java/lang/IndexOutOfBoundsException",
                "java/lang/RuntimeException",
                "java/lang/Exception",
                "java/lang/Throwable",
                "java/lang/Object",
            ]
        );
    }

    #[test]
    fn test_array_class_shape() {
        let object = synthetic_class("builtin/test/Root", None, &[]);
        let array = array_class("[J", FieldType::Array(Box::new(FieldType::Long)), object, &[]);
        assert_eq!(array.component, Some(FieldType::Long));
        assert_eq!(array.clinit_status(), ClinitStatus::Done);
        assert!(array.is_array());
    }
}
