use once_cell::sync::Lazy;

use super::{NativeReturn, bool_result, int_result, string_result};
use crate::runtime::{
    Exception, NativeResult, ObjectRef, Value, heap,
    mtable::{self, NativeEnv},
    reflection, statics,
};

const CLASS: &str = "java/lang/Boolean";

static TRUE: Lazy<ObjectRef> = Lazy::new(|| heap::primitive_object(CLASS, "Z", Value::boolean(true)));
static FALSE: Lazy<ObjectRef> = Lazy::new(|| heap::primitive_object(CLASS, "Z", Value::boolean(false)));

pub(super) fn boxed(b: bool) -> ObjectRef {
    if b { TRUE.clone() } else { FALSE.clone() }
}

fn this(args: &[Value]) -> NativeResult<bool> {
    args[0]
        .as_object()?
        .get("value")
        .ok_or_else(|| Exception::fatal("Boolean without value"))?
        .as_bool()
}

fn parse(value: &Value) -> NativeResult<bool> {
    Ok(match value.as_ref()? {
        Some(s) => heap::rust_string(&s)?.eq_ignore_ascii_case("true"),
        None => false,
    })
}

// public static Boolean valueOf(boolean b)
fn value_of(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    Ok(Some(Value::Ref(boxed(args[0].as_bool()?))))
}

// public static Boolean valueOf(String s)
fn value_of_string(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    Ok(Some(Value::Ref(boxed(parse(&args[0])?))))
}

// public static boolean parseBoolean(String s)
fn parse_boolean(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    bool_result(parse(&args[0])?)
}

// public boolean booleanValue()
fn boolean_value(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    bool_result(this(&args)?)
}

// public static String toString(boolean b)
fn to_string_static(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    string_result(if args[0].as_bool()? { "true" } else { "false" })
}

// public String toString()
fn to_string(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    string_result(if this(&args)? { "true" } else { "false" })
}

fn hash(b: bool) -> i32 {
    if b { 1231 } else { 1237 }
}

// public int hashCode()
fn hash_code(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    int_result(hash(this(&args)?))
}

// public static int hashCode(boolean value)
fn hash_code_static(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    int_result(hash(args[0].as_bool()?))
}

// public boolean equals(Object obj)
fn equals(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    match args[1].as_ref()? {
        Some(other) if other.class_name().as_ref() == CLASS => {
            bool_result(this(&args)? == this(&args[1..])?)
        }
        _ => bool_result(false),
    }
}

// public static int compare(boolean x, boolean y)
fn compare(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    int_result(args[0].as_bool()?.cmp(&args[1].as_bool()?) as i32)
}

// public int compareTo(Boolean b)
fn compare_to(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    int_result(this(&args)?.cmp(&this(&args[1..])?) as i32)
}

// public static boolean logicalAnd(boolean a, boolean b)
fn logical_and(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    bool_result(args[0].as_bool()? && args[1].as_bool()?)
}

// public static boolean logicalOr(boolean a, boolean b)
fn logical_or(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    bool_result(args[0].as_bool()? || args[1].as_bool()?)
}

// public static boolean logicalXor(boolean a, boolean b)
fn logical_xor(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    bool_result(args[0].as_bool()? ^ args[1].as_bool()?)
}

// static { ... }
fn clinit(_: &mut NativeEnv, _: Vec<Value>) -> NativeReturn {
    statics::set(CLASS, "TRUE", "Ljava/lang/Boolean;", Value::Ref(boxed(true)));
    statics::set(CLASS, "FALSE", "Ljava/lang/Boolean;", Value::Ref(boxed(false)));
    statics::set(
        CLASS,
        "TYPE",
        "Ljava/lang/Class;",
        Value::Ref(reflection::primitive_mirror_named("boolean")),
    );
    Ok(None)
}

pub(super) fn register_natives() {
    use mtable::register;

    register(CLASS, "<clinit>", "()V", clinit);
    register(CLASS, "valueOf", "(Z)Ljava/lang/Boolean;", value_of);
    register(CLASS, "valueOf", "(Ljava/lang/String;)Ljava/lang/Boolean;", value_of_string);
    register(CLASS, "parseBoolean", "(Ljava/lang/String;)Z", parse_boolean);
    register(CLASS, "booleanValue", "()Z", boolean_value);
    register(CLASS, "toString", "(Z)Ljava/lang/String;", to_string_static);
    register(CLASS, "toString", "()Ljava/lang/String;", to_string);
    register(CLASS, "hashCode", "()I", hash_code);
    register(CLASS, "hashCode", "(Z)I", hash_code_static);
    register(CLASS, "equals", "(Ljava/lang/Object;)Z", equals);
    register(CLASS, "compare", "(ZZ)I", compare);
    register(CLASS, "compareTo", "(Ljava/lang/Boolean;)I", compare_to);
    register(CLASS, "compareTo", "(Ljava/lang/Object;)I", compare_to);
    register(CLASS, "logicalAnd", "(ZZ)Z", logical_and);
    register(CLASS, "logicalOr", "(ZZ)Z", logical_or);
    register(CLASS, "logicalXor", "(ZZ)Z", logical_xor);
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_canonical_boxes() {
        assert!(Arc::ptr_eq(&boxed(true), &boxed(true)));
        assert!(!Arc::ptr_eq(&boxed(true), &boxed(false)));
    }

    #[test]
    fn test_parse_ignores_case() {
        assert!(parse(&heap::string_value("TrUe")).unwrap());
        assert!(!parse(&heap::string_value("yes")).unwrap());
        assert!(!parse(&Value::Null).unwrap());
    }
}
