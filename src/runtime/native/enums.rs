use std::sync::Arc;

use super::{NativeReturn, bool_result, class::is_enum, int_result};
use crate::runtime::{
    Class, Exception, NativeResult, ObjectRef, Value, heap,
    mtable::{self, NativeEnv},
    reflection, statics,
};

const CLASS: &str = "java/lang/Enum";

fn this(args: &[Value]) -> NativeResult<ObjectRef> {
    args[0].as_object()
}

/// The enum type itself, skipping the subclass of a constant with a body.
fn declaring_class(constant: &ObjectRef) -> NativeResult<Arc<Class>> {
    let class = heap::class_of(constant)?;
    match &class.super_class {
        Some(parent) if parent.name.as_ref() != CLASS => Ok(Arc::clone(parent)),
        _ => Ok(class),
    }
}

fn ordinal(constant: &ObjectRef) -> i32 {
    constant.get_int("ordinal").unwrap_or(0) as i32
}

// protected Enum(String name, int ordinal)
fn init(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let this = this(&args)?;
    this.set("name", "Ljava/lang/String;", args[1].clone());
    this.set("ordinal", "I", Value::int(args[2].as_int()?));
    Ok(None)
}

// public final String name()
fn name(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    Ok(Some(this(&args)?.get("name").unwrap_or_default()))
}

// public final int ordinal()
fn get_ordinal(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    int_result(ordinal(&this(&args)?))
}

// public final boolean equals(Object other)
fn equals(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    bool_result(args[0].same_ref(&args[1]))
}

// public final int hashCode()
fn hash_code(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    int_result(this(&args)?.identity_hash())
}

// public final int compareTo(E o)
fn compare_to(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let (this, other) = (this(&args)?, args[1].as_object()?);
    let (mine, theirs) = (declaring_class(&this)?, declaring_class(&other)?);
    if mine.name != theirs.name {
        return Err(Exception::with_message(
            "java/lang/ClassCastException",
            format!(
                "class {} cannot be cast to class {}",
                theirs.name.replace('/', "."),
                mine.name.replace('/', ".")
            ),
        ));
    }
    int_result(ordinal(&this) - ordinal(&other))
}

// public final Class<E> getDeclaringClass()
fn get_declaring_class(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let class = declaring_class(&this(&args)?)?;
    Ok(Some(Value::Ref(reflection::class_mirror(&class))))
}

// protected final Object clone()
fn clone(_: &mut NativeEnv, _: Vec<Value>) -> NativeReturn {
    Err(Exception::new("java/lang/CloneNotSupportedException"))
}

// public static <T extends Enum<T>> T valueOf(Class<T> enumClass, String name)
fn value_of(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let mirror = args[0].as_object()?;
    let Some(name) = args[1].as_ref()? else {
        return Err(Exception::with_message("java/lang/NullPointerException", "Name is null"));
    };
    let name = heap::rust_string(&name)?;
    let java_name = reflection::java_name(&mirror)?;
    let class = match reflection::mirror_class(&mirror)? {
        Some(class) if is_enum(&class) => class,
        _ => {
            return Err(Exception::with_message(
                "java/lang/IllegalArgumentException",
                format!("{java_name} is not an enum class"),
            ));
        }
    };
    statics::initialize(env.ctx()?, &class)?;
    let constant = statics::get_static_value(&class.name, &name)
        .and_then(|v| v.as_ref().ok().flatten())
        .filter(|c| {
            c.get("name")
                .and_then(|n| heap::rust_string_or_null(&n).ok())
                .is_some_and(|n| n == name)
        });
    match constant {
        Some(constant) => Ok(Some(Value::Ref(constant))),
        None => Err(Exception::with_message(
            "java/lang/IllegalArgumentException",
            format!("No enum constant {}.{name}", java_name.replace('$', ".")),
        )),
    }
}

// public String toString()
fn to_string(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    name(env, args)
}

pub(super) fn register_natives() {
    use mtable::{register, register_ctx};

    register(CLASS, "<init>", "(Ljava/lang/String;I)V", init);
    register(CLASS, "name", "()Ljava/lang/String;", name);
    register(CLASS, "ordinal", "()I", get_ordinal);
    register(CLASS, "toString", "()Ljava/lang/String;", to_string);
    register(CLASS, "equals", "(Ljava/lang/Object;)Z", equals);
    register(CLASS, "hashCode", "()I", hash_code);
    register(CLASS, "compareTo", "(Ljava/lang/Enum;)I", compare_to);
    register(CLASS, "compareTo", "(Ljava/lang/Object;)I", compare_to);
    register(CLASS, "getDeclaringClass", "()Ljava/lang/Class;", get_declaring_class);
    register(CLASS, "clone", "()Ljava/lang/Object;", clone);
    register_ctx(
        CLASS,
        "valueOf",
        "(Ljava/lang/Class;Ljava/lang/String;)Ljava/lang/Enum;",
        value_of,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{class_loader, thread::ThreadContext};

    fn state_mirror() -> Value {
        let class = class_loader::bootstrap().load("java/lang/Thread$State").unwrap();
        Value::Ref(reflection::class_mirror(&class))
    }

    #[test]
    fn test_value_of_finds_constant() {
        crate::runtime::native::register_natives();
        let mut ctx = ThreadContext::new();
        let mut env = NativeEnv::new(Some(&mut ctx));
        let waiting = value_of(&mut env, vec![state_mirror(), heap::string_value("WAITING")])
            .unwrap()
            .unwrap()
            .as_object()
            .unwrap();
        assert_eq!(ordinal(&waiting), 3);
        let runnable = statics::get_static_value("java/lang/Thread$State", "RUNNABLE").unwrap();
        let order = compare_to(&mut env, vec![Value::Ref(waiting), runnable]).unwrap().unwrap();
        assert_eq!(order.as_int().unwrap(), 2);
    }

    #[test]
    fn test_value_of_unknown_name() {
        crate::runtime::native::register_natives();
        let mut ctx = ThreadContext::new();
        let mut env = NativeEnv::new(Some(&mut ctx));
        let err = value_of(&mut env, vec![state_mirror(), heap::string_value("SLEEPING")]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "java.lang.IllegalArgumentException: No enum constant java.lang.Thread.State.SLEEPING"
        );
    }
}
