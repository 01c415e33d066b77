use super::{NativeReturn, bool_result, call_virtual, display, int_result, string_arg, string_result};
use crate::runtime::{
    Exception, FieldValue, NativeResult, ObjectRef, Value,
    mtable::{self, NativeEnv},
    thread::ThreadContext,
};

const CLASS: &str = "java/util/Objects";

fn equal(ctx: &mut ThreadContext, a: &Value, b: &Value) -> NativeResult<bool> {
    if a.same_ref(b) {
        return Ok(true);
    }
    match a.as_ref()? {
        Some(a) => Ok(call_virtual(ctx, &a, "equals", "(Ljava/lang/Object;)Z", vec![b.clone()])?
            .unwrap_or_default()
            .as_bool()?),
        None => Ok(false),
    }
}

fn hash_of(ctx: &mut ThreadContext, value: Option<&ObjectRef>) -> NativeResult<i32> {
    match value {
        Some(object) => call_virtual(ctx, object, "hashCode", "()I", Vec::new())?
            .unwrap_or_default()
            .as_int(),
        None => Ok(0),
    }
}

// public static boolean equals(Object a, Object b)
fn equals(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    bool_result(equal(env.ctx()?, &args[0], &args[1])?)
}

// public static int hashCode(Object o)
fn hash_code(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let value = args[0].as_ref()?;
    int_result(hash_of(env.ctx()?, value.as_ref())?)
}

// public static int hash(Object... values)
fn hash(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let Some(array) = args[0].as_ref()? else {
        return int_result(0);
    };
    let values = array
        .with_array(|v| match v {
            FieldValue::Refs(refs) => refs.clone(),
            _ => Vec::new(),
        })
        .unwrap_or_default();
    let ctx = env.ctx()?;
    let mut result = 1i32;
    for value in &values {
        result = result.wrapping_mul(31).wrapping_add(hash_of(ctx, value.as_ref())?);
    }
    int_result(result)
}

// public static String toString(Object o)
fn to_string(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let value = args[0].as_ref()?;
    string_result(&display(env.ctx()?, value.as_ref())?)
}

// public static String toString(Object o, String nullDefault)
fn to_string_or(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    match args[0].as_ref()? {
        Some(value) => string_result(&display(env.ctx()?, Some(&value))?),
        None => Ok(Some(args[1].clone())),
    }
}

// public static boolean isNull(Object obj)
fn is_null(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    bool_result(args[0].is_null())
}

// public static boolean nonNull(Object obj)
fn non_null(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    bool_result(!args[0].is_null())
}

// public static <T> T requireNonNull(T obj)
fn require_non_null(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    if args[0].is_null() {
        return Err(Exception::new("java/lang/NullPointerException"));
    }
    Ok(Some(args[0].clone()))
}

// public static <T> T requireNonNull(T obj, String message)
fn require_non_null_message(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    if args[0].is_null() {
        return Err(if args[1].is_null() {
            Exception::new("java/lang/NullPointerException")
        } else {
            Exception::with_message("java/lang/NullPointerException", string_arg(&args[1])?)
        });
    }
    Ok(Some(args[0].clone()))
}

// public static <T> T requireNonNullElse(T obj, T defaultObj)
fn require_non_null_else(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    for value in &args {
        if !value.is_null() {
            return Ok(Some(value.clone()));
        }
    }
    Err(Exception::with_message("java/lang/NullPointerException", "defaultObj"))
}

/// `Index 5 out of bounds for length 3`.
fn check_bounds(index: i64, length: i64) -> NativeResult<()> {
    if index < 0 || index >= length {
        return Err(Exception::with_message(
            "java/lang/IndexOutOfBoundsException",
            format!("Index {index} out of bounds for length {length}"),
        ));
    }
    Ok(())
}

// public static int checkIndex(int index, int length)
fn check_index(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let index = args[0].as_int()?;
    check_bounds(index as i64, args[1].as_int()? as i64)?;
    int_result(index)
}

// public static long checkIndex(long index, long length)
fn check_index_long(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let index = args[0].as_long()?;
    check_bounds(index, args[1].as_long()?)?;
    Ok(Some(Value::long(index)))
}

pub(super) fn register_natives() {
    use mtable::{register, register_ctx};

    register_ctx(CLASS, "equals", "(Ljava/lang/Object;Ljava/lang/Object;)Z", equals);
    register_ctx(CLASS, "hashCode", "(Ljava/lang/Object;)I", hash_code);
    register_ctx(CLASS, "hash", "([Ljava/lang/Object;)I", hash);
    register_ctx(CLASS, "toString", "(Ljava/lang/Object;)Ljava/lang/String;", to_string);
    register_ctx(
        CLASS,
        "toString",
        "(Ljava/lang/Object;Ljava/lang/String;)Ljava/lang/String;",
        to_string_or,
    );
    register(CLASS, "isNull", "(Ljava/lang/Object;)Z", is_null);
    register(CLASS, "nonNull", "(Ljava/lang/Object;)Z", non_null);
    register(CLASS, "requireNonNull", "(Ljava/lang/Object;)Ljava/lang/Object;", require_non_null);
    register(
        CLASS,
        "requireNonNull",
        "(Ljava/lang/Object;Ljava/lang/String;)Ljava/lang/Object;",
        require_non_null_message,
    );
    register(
        CLASS,
        "requireNonNullElse",
        "(Ljava/lang/Object;Ljava/lang/Object;)Ljava/lang/Object;",
        require_non_null_else,
    );
    register(CLASS, "checkIndex", "(II)I", check_index);
    register(CLASS, "checkIndex", "(JJ)J", check_index_long);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::heap;

    #[test]
    fn test_null_checks() {
        let mut env = NativeEnv::new(None);
        let message = heap::string_value("config");
        let err = require_non_null_message(&mut env, vec![Value::Null, message]).unwrap_err();
        assert_eq!(err.to_string(), "java.lang.NullPointerException: config");
        let fallback = heap::string_value("fallback");
        let chosen = require_non_null_else(&mut env, vec![Value::Null, fallback.clone()]).unwrap();
        assert!(chosen.unwrap().same_ref(&fallback));
        assert!(require_non_null_else(&mut env, vec![Value::Null, Value::Null]).is_err());
    }

    #[test]
    fn test_check_index_message() {
        let mut env = NativeEnv::new(None);
        let err = check_index(&mut env, vec![Value::int(5), Value::int(3)]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "java.lang.IndexOutOfBoundsException: Index 5 out of bounds for length 3"
        );
        let ok = check_index(&mut env, vec![Value::int(2), Value::int(3)]).unwrap();
        assert_eq!(ok.unwrap().as_int().unwrap(), 2);
    }

    #[test]
    fn test_hash_of_empty_and_null() {
        let mut ctx = ThreadContext::new();
        let mut env = NativeEnv::new(Some(&mut ctx));
        let empty = heap::ref_array_from("java/lang/Object", vec![None, None]);
        let value = hash(&mut env, vec![Value::Ref(empty)]).unwrap().unwrap();
        assert_eq!(value.as_int().unwrap(), 961);
    }
}
