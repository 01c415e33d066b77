use std::sync::Arc;

use super::{NativeReturn, bool_result, int_result, nop, string_arg, string_result};
use crate::{
    consts::ClassAccessFlag,
    runtime::{
        Class, Exception, NativeResult, Object, ObjectRef, Value, class_loader, global, heap,
        inheritance,
        mtable::{self, NativeEnv},
        reflection, statics,
    },
};

const CLASS: &str = "java/lang/Class";

const PRIMITIVES: [&str; 9] = [
    "boolean", "byte", "char", "short", "int", "long", "float", "double", "void",
];

/// The class behind the receiver mirror; `None` for primitive types.
fn this_class(args: &[Value]) -> NativeResult<Option<Arc<Class>>> {
    reflection::mirror_class(&*args[0].as_object()?)
}

fn mirror_result(class: Option<&Arc<Class>>) -> NativeReturn {
    Ok(Some(Value::reference(class.map(reflection::class_mirror))))
}

fn simple_name(class: &Class) -> NativeResult<String> {
    if let Some(component) = &class.component {
        let mirror = reflection::mirror_of_type(component)?;
        let inner = match reflection::mirror_class(&mirror)? {
            Some(component) => simple_name(&component)?,
            None => reflection::java_name(&mirror)?,
        };
        return Ok(format!("{inner}[]"));
    }
    let name = class.name.rsplit('/').next().unwrap_or_default();
    let name = name.rsplit('$').next().unwrap_or(name);
    // anonymous classes have no simple name
    if name.chars().all(|c| c.is_ascii_digit()) {
        return Ok(String::new());
    }
    Ok(name.to_string())
}

fn modifiers(class: &Class) -> i32 {
    if class.is_array() {
        return (ClassAccessFlag::PUBLIC | ClassAccessFlag::FINAL | ClassAccessFlag::ABSTRACT).bits() as i32;
    }
    (class.access_flags - ClassAccessFlag::SUPER - ClassAccessFlag::SYNTHETIC).bits() as i32
}

pub(super) fn is_enum(class: &Arc<Class>) -> bool {
    class.access_flags.contains(ClassAccessFlag::ENUM)
        && class
            .super_class
            .as_ref()
            .is_some_and(|s| s.name.as_ref() == "java/lang/Enum")
}

fn is_instance(mirror: &Object, object: Option<&ObjectRef>) -> NativeResult<bool> {
    match (reflection::mirror_class(mirror)?, object) {
        (Some(class), Some(object)) => inheritance::is_instance_of(object, &class),
        _ => Ok(false),
    }
}

// public String getName()
fn get_name(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    string_result(&reflection::java_name(&*args[0].as_object()?)?)
}

// public String getSimpleName()
fn get_simple_name(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    match this_class(&args)? {
        Some(class) => string_result(&simple_name(&class)?),
        None => string_result(&reflection::java_name(&*args[0].as_object()?)?),
    }
}

// public String getTypeName()
fn get_type_name(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let mut mirror = args[0].as_object()?;
    let mut dimensions = 0;
    while let Some(component) = reflection::mirror_class(&mirror)?.and_then(|c| c.component.clone()) {
        mirror = reflection::mirror_of_type(&component)?;
        dimensions += 1;
    }
    string_result(&format!("{}{}", reflection::java_name(&mirror)?, "[]".repeat(dimensions)))
}

// public String getPackageName()
fn get_package_name(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    match this_class(&args)? {
        Some(class) => string_result(&class.package_name().replace('/', ".")),
        None => string_result("java.lang"),
    }
}

// public String toString()
fn to_string(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let name = reflection::java_name(&*args[0].as_object()?)?;
    match this_class(&args)? {
        Some(class) if class.is_interface() => string_result(&format!("interface {name}")),
        Some(_) => string_result(&format!("class {name}")),
        None => string_result(&name),
    }
}

// public native boolean isArray()
fn is_array(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    bool_result(this_class(&args)?.is_some_and(|c| c.is_array()))
}

// public native boolean isPrimitive()
fn is_primitive(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    bool_result(reflection::is_primitive_mirror(&*args[0].as_object()?))
}

// public native boolean isInterface()
fn is_interface(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    bool_result(this_class(&args)?.is_some_and(|c| c.is_interface()))
}

// public boolean isEnum()
fn is_enum_class(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    bool_result(this_class(&args)?.is_some_and(|c| is_enum(&c)))
}

// public native int getModifiers()
fn get_modifiers(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    match this_class(&args)? {
        Some(class) => int_result(modifiers(&class)),
        None => int_result(
            (ClassAccessFlag::PUBLIC | ClassAccessFlag::FINAL | ClassAccessFlag::ABSTRACT).bits() as i32,
        ),
    }
}

// public native Class<? super T> getSuperclass()
fn get_superclass(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    match this_class(&args)? {
        Some(class) if !class.is_interface() => mirror_result(class.super_class.as_ref()),
        _ => mirror_result(None),
    }
}

// public Class<?>[] getInterfaces()
fn get_interfaces(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let mirrors = this_class(&args)?
        .map(|class| {
            class
                .interfaces
                .iter()
                .map(|i| Some(reflection::class_mirror(i)))
                .collect()
        })
        .unwrap_or_default();
    Ok(Some(Value::Ref(heap::ref_array_from(CLASS, mirrors))))
}

// public native Class<?> getComponentType()
fn get_component_type(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    match this_class(&args)?.and_then(|c| c.component.clone()) {
        Some(component) => Ok(Some(Value::Ref(reflection::mirror_of_type(&component)?))),
        None => Ok(Some(Value::Null)),
    }
}

// public native boolean isInstance(Object obj)
fn is_instance_native(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    bool_result(is_instance(&*args[0].as_object()?, args[1].as_ref()?.as_ref())?)
}

// public native boolean isAssignableFrom(Class<?> cls)
fn is_assignable_from(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let (this, other) = (args[0].as_object()?, args[1].as_object()?);
    let this_class = reflection::mirror_class(&this)?;
    let other_class = reflection::mirror_class(&other)?;
    match (this_class, other_class) {
        (Some(this), Some(other)) => bool_result(inheritance::is_assignable_to(&other, &this)),
        (None, None) => bool_result(Arc::ptr_eq(&this, &other)),
        _ => bool_result(false),
    }
}

// public T cast(Object obj)
fn cast(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let mirror = args[0].as_object()?;
    let Some(object) = args[1].as_ref()? else {
        return Ok(Some(Value::Null));
    };
    if !is_instance(&mirror, Some(&object))? {
        let from = reflection::java_name(&*reflection::mirror_of(&object)?)?;
        return Err(Exception::with_message(
            "java/lang/ClassCastException",
            format!("Cannot cast {from} to {}", reflection::java_name(&mirror)?),
        ));
    }
    Ok(Some(Value::Ref(object)))
}

// public boolean desiredAssertionStatus()
fn desired_assertion_status(_: &mut NativeEnv, _: Vec<Value>) -> NativeReturn {
    bool_result(global::options().assertions)
}

// public ClassLoader getClassLoader()
fn get_class_loader(_: &mut NativeEnv, _: Vec<Value>) -> NativeReturn {
    Ok(Some(Value::Null))
}

// public static Class<?> forName(String className)
fn for_name(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let name = string_arg(&args[0])?;
    // dotted names only; `java/lang/String` is not a binary name
    if name.contains('/') {
        return Err(Exception::with_message("java/lang/ClassNotFoundException", name));
    }
    let class = class_loader::app().load(&name)?;
    statics::initialize(env.ctx()?, &class)?;
    mirror_result(Some(&class))
}

// static native Class<?> getPrimitiveClass(String name)
fn get_primitive_class(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let name = string_arg(&args[0])?;
    match PRIMITIVES.iter().find(|p| **p == name) {
        Some(primitive) => Ok(Some(Value::Ref(reflection::primitive_mirror_named(primitive)))),
        None => Err(Exception::with_message("java/lang/ClassNotFoundException", name)),
    }
}

pub(super) fn register_natives() {
    use mtable::{register, register_ctx};

    register(CLASS, "registerNatives", "()V", nop);
    register(CLASS, "getName", "()Ljava/lang/String;", get_name);
    register(CLASS, "getSimpleName", "()Ljava/lang/String;", get_simple_name);
    register(CLASS, "getTypeName", "()Ljava/lang/String;", get_type_name);
    register(CLASS, "getPackageName", "()Ljava/lang/String;", get_package_name);
    register(CLASS, "toString", "()Ljava/lang/String;", to_string);
    register(CLASS, "isArray", "()Z", is_array);
    register(CLASS, "isPrimitive", "()Z", is_primitive);
    register(CLASS, "isInterface", "()Z", is_interface);
    register(CLASS, "isEnum", "()Z", is_enum_class);
    register(CLASS, "getModifiers", "()I", get_modifiers);
    register(CLASS, "getSuperclass", "()Ljava/lang/Class;", get_superclass);
    register(CLASS, "getInterfaces", "()[Ljava/lang/Class;", get_interfaces);
    register(CLASS, "getComponentType", "()Ljava/lang/Class;", get_component_type);
    register(CLASS, "componentType", "()Ljava/lang/Class;", get_component_type);
    register(CLASS, "isInstance", "(Ljava/lang/Object;)Z", is_instance_native);
    register(CLASS, "isAssignableFrom", "(Ljava/lang/Class;)Z", is_assignable_from);
    register(CLASS, "cast", "(Ljava/lang/Object;)Ljava/lang/Object;", cast);
    register(CLASS, "desiredAssertionStatus", "()Z", desired_assertion_status);
    register(CLASS, "getClassLoader", "()Ljava/lang/ClassLoader;", get_class_loader);
    register_ctx(CLASS, "forName", "(Ljava/lang/String;)Ljava/lang/Class;", for_name);
    register(CLASS, "getPrimitiveClass", "(Ljava/lang/String;)Ljava/lang/Class;", get_primitive_class);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(name: &str) -> Arc<Class> {
        class_loader::bootstrap().load(name).unwrap()
    }

    #[test]
    fn test_simple_names() {
        assert_eq!(simple_name(&load("java/lang/String")).unwrap(), "String");
        assert_eq!(simple_name(&load("[[Ljava/lang/String;")).unwrap(), "String[][]");
        assert_eq!(simple_name(&load("[I")).unwrap(), "int[]");
        assert_eq!(simple_name(&load("java/lang/Thread$State")).unwrap(), "State");
    }

    #[test]
    fn test_modifiers_and_kinds() {
        let array = load("[I");
        assert_eq!(modifiers(&array), 0x0411);
        assert!(!is_enum(&load("java/lang/Enum")));
        assert!(is_enum(&load("java/lang/Thread$State")));
        assert!(load("java/lang/Runnable").is_interface());
    }
}
