mod boolean;
mod char_sequence;
mod character;
mod class;
mod double;
mod enums;
mod float;
mod format;
mod integers;
mod lang_runtime;
mod math;
mod modifier;
mod object;
mod objects;
mod pattern;
mod print_stream;
pub(crate) mod string;
mod string_builder;
mod system;
mod thread;
mod throwable;
mod traps;

use std::sync::{Arc, Once};

use crate::runtime::{
    Exception, NativeResult, ObjectRef, Value, heap, interpreter, mtable, thread::ThreadContext,
};

pub(crate) use string::stringify;

/// Return type of every G-function.
pub(crate) type NativeReturn = NativeResult<Option<Value>>;

/// Fills the MTable; later calls do nothing.
pub(crate) fn register_natives() {
    static REGISTERED: Once = Once::new();
    REGISTERED.call_once(|| {
        object::register_natives();
        class::register_natives();
        string::register_natives();
        pattern::register_natives();
        string_builder::register_natives();
        char_sequence::register_natives();
        integers::register_natives();
        character::register_natives();
        float::register_natives();
        double::register_natives();
        boolean::register_natives();
        math::register_natives();
        system::register_natives();
        lang_runtime::register_natives();
        thread::register_natives();
        throwable::register_natives();
        modifier::register_natives();
        print_stream::register_natives();
        enums::register_natives();
        objects::register_natives();
        traps::register_natives();
        log::debug!("{} G-functions registered", mtable::size());
    });
}

/// Contents of a `String` argument; `NullPointerException` for null.
pub(crate) fn string_arg(value: &Value) -> NativeResult<String> {
    heap::rust_string(&*value.as_object()?)
}

pub(crate) fn string_result(s: &str) -> NativeReturn {
    Ok(Some(heap::string_value(s)))
}

fn int_result(v: i32) -> NativeReturn {
    Ok(Some(Value::int(v)))
}

fn bool_result(v: bool) -> NativeReturn {
    Ok(Some(Value::boolean(v)))
}

fn void() -> NativeReturn {
    Ok(None)
}

fn nop(_: &mut mtable::NativeEnv, _: Vec<Value>) -> NativeReturn {
    Ok(None)
}

/// Calls the override of `name` + `descriptor` selected by `receiver`'s class.
pub(crate) fn call_virtual(
    ctx: &mut ThreadContext,
    receiver: &ObjectRef,
    name: &str,
    descriptor: &str,
    args: Vec<Value>,
) -> NativeReturn {
    let class = heap::class_of(receiver)?;
    let entry = mtable::resolve_virtual(&class, name, descriptor)?;
    let mut full = Vec::with_capacity(args.len() + 1);
    full.push(Value::Ref(Arc::clone(receiver)));
    full.extend(args);
    interpreter::invoke_method(ctx, &entry, full)
}

/// `String.valueOf(Object)`: the contents of a string, `toString()` of
/// anything else.
pub(crate) fn display(ctx: &mut ThreadContext, object: Option<&ObjectRef>) -> NativeResult<String> {
    let Some(object) = object else {
        return Ok("null".to_string());
    };
    if object.is_string() {
        return heap::rust_string(object);
    }
    let text = call_virtual(ctx, object, "toString", "()Ljava/lang/String;", Vec::new())?;
    heap::rust_string_or_null(&text.unwrap_or_default())
}

/// `index` within `[0, length)`, else `StringIndexOutOfBoundsException`.
fn string_index(index: i32, length: usize) -> NativeResult<usize> {
    if index < 0 || index as usize >= length {
        return Err(Exception::with_message(
            "java/lang/StringIndexOutOfBoundsException",
            format!("index {index}, length {length}"),
        ));
    }
    Ok(index as usize)
}

/// `[begin, end)` within `[0, length]`.
fn string_range(begin: i32, end: i32, length: usize) -> NativeResult<(usize, usize)> {
    if begin < 0 || end < begin || end as usize > length {
        return Err(Exception::with_message(
            "java/lang/StringIndexOutOfBoundsException",
            format!("begin {begin}, end {end}, length {length}"),
        ));
    }
    Ok((begin as usize, end as usize))
}

fn number_format(input: &str) -> Exception {
    Exception::with_message(
        "java/lang/NumberFormatException",
        format!("For input string: \"{input}\""),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration() {
        register_natives();
        register_natives();
        assert!(mtable::lookup("java/lang/Object.hashCode()I").is_some());
        assert!(mtable::lookup("java/io/PrintStream.println(Ljava/lang/String;)V").is_some());
    }

    #[test]
    fn test_string_ranges() {
        assert_eq!(string_index(1, 2).unwrap(), 1);
        assert!(string_index(2, 2).is_err());
        assert_eq!(string_range(0, 2, 2).unwrap(), (0, 2));
        let err = string_range(3, 1, 5).unwrap_err();
        assert_eq!(
            err.to_string(),
            "java.lang.StringIndexOutOfBoundsException: begin 3, end 1, length 5"
        );
    }
}
