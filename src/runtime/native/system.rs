use std::time::{SystemTime, UNIX_EPOCH};

use super::{NativeReturn, int_result, nop, print_stream, string_arg, string_result};
use crate::{
    descriptor,
    runtime::{
        Exception, FieldValue, NativeResult, Object, ObjectRef, Value, class_loader, global,
        inheritance,
        mtable::{self, NativeEnv},
        statics,
    },
};

const CLASS: &str = "java/lang/System";

/// How `arraycopy` messages name an array's elements: `int` or `object array`.
fn element_label(array: &Object) -> String {
    let name = array.class_name();
    descriptor::field_type(&name[1..])
        .and_then(|t| t.primitive_name())
        .unwrap_or("object array")
        .to_string()
}

fn array_label(array: &Object, length: usize) -> String {
    format!("{}[{length}]", element_label(array))
}

fn store_error(message: String) -> Exception {
    Exception::with_message("java/lang/ArrayStoreException", format!("arraycopy: {message}"))
}

fn bounds_error(message: String) -> Exception {
    Exception::with_message(
        "java/lang/ArrayIndexOutOfBoundsException",
        format!("arraycopy: {message}"),
    )
}

fn slice(values: &FieldValue, from: usize, to: usize) -> FieldValue {
    match values {
        FieldValue::Bytes(v) => FieldValue::Bytes(v[from..to].to_vec()),
        FieldValue::Ints(v) => FieldValue::Ints(v[from..to].to_vec()),
        FieldValue::Floats(v) => FieldValue::Floats(v[from..to].to_vec()),
        FieldValue::Refs(v) => FieldValue::Refs(v[from..to].to_vec()),
        other => other.clone(),
    }
}

fn write(values: &mut FieldValue, at: usize, part: FieldValue) -> bool {
    match (values, part) {
        (FieldValue::Bytes(v), FieldValue::Bytes(p)) => v[at..at + p.len()].copy_from_slice(&p),
        (FieldValue::Ints(v), FieldValue::Ints(p)) => v[at..at + p.len()].copy_from_slice(&p),
        (FieldValue::Floats(v), FieldValue::Floats(p)) => v[at..at + p.len()].copy_from_slice(&p),
        (FieldValue::Refs(v), FieldValue::Refs(p)) => {
            v.splice(at..at + p.len(), p);
        }
        _ => return false,
    }
    true
}

/// Copies `length` elements; reference elements are checked one by one when
/// the destination's element type is narrower than the source's.
fn array_copy(src: &ObjectRef, src_pos: i32, dest: &ObjectRef, dest_pos: i32, length: i32) -> NativeResult<()> {
    let (src_name, dest_name) = (src.class_name(), dest.class_name());
    if !src.is_array() {
        return Err(store_error(format!("source type {} is not an array", src_name.replace('/', "."))));
    }
    if !dest.is_array() {
        return Err(store_error(format!(
            "destination type {} is not an array",
            dest_name.replace('/', ".")
        )));
    }
    let src_refs = matches!(src_name.as_bytes()[1], b'L' | b'[');
    let dest_refs = matches!(dest_name.as_bytes()[1], b'L' | b'[');
    if (!src_refs || !dest_refs) && src_name != dest_name {
        return Err(store_error(format!(
            "type mismatch: can not copy {}[] into {}[]",
            element_label(src),
            element_label(dest)
        )));
    }

    let src_len = src.array_len().unwrap_or_default();
    let dest_len = dest.array_len().unwrap_or_default();
    if src_pos < 0 {
        return Err(bounds_error(format!(
            "source index {src_pos} out of bounds for {}",
            array_label(src, src_len)
        )));
    }
    if dest_pos < 0 {
        return Err(bounds_error(format!(
            "destination index {dest_pos} out of bounds for {}",
            array_label(dest, dest_len)
        )));
    }
    if length < 0 {
        return Err(bounds_error(format!("length {length} is negative")));
    }
    let (src_pos, dest_pos, length) = (src_pos as usize, dest_pos as usize, length as usize);
    if src_pos + length > src_len {
        return Err(bounds_error(format!(
            "last source index {} out of bounds for {}",
            src_pos + length,
            array_label(src, src_len)
        )));
    }
    if dest_pos + length > dest_len {
        return Err(bounds_error(format!(
            "last destination index {} out of bounds for {}",
            dest_pos + length,
            array_label(dest, dest_len)
        )));
    }
    if length == 0 {
        return Ok(());
    }

    let mut part = src
        .with_array(|v| slice(v, src_pos, src_pos + length))
        .ok_or_else(|| Exception::fatal("array without elements"))?;

    let mut failure = None;
    if src_refs && src_name != dest_name {
        let src_class = class_loader::app().load(&src_name)?;
        let dest_class = class_loader::app().load(&dest_name)?;
        if !inheritance::is_assignable_to(&src_class, &dest_class) {
            let element = class_loader::app().load(&dest_name[1..])?;
            if let FieldValue::Refs(items) = &mut part {
                let mut offending = None;
                for (i, item) in items.iter().enumerate() {
                    if let Some(item) = item {
                        if !inheritance::is_instance_of(item, &element)? {
                            offending = Some(i);
                            break;
                        }
                    }
                }
                if let Some(i) = offending {
                    // elements before the offending one are still copied
                    items.truncate(i);
                    failure = Some(store_error(format!(
                        "element type mismatch: can not cast one of the elements of {}[] to the type of the destination array, {}",
                        src_name[1..].trim_start_matches('L').trim_end_matches(';').replace('/', "."),
                        element.name.replace('/', ".")
                    )));
                }
            }
        }
    }

    let written = dest.with_array_mut(|v| write(v, dest_pos, part)).unwrap_or(false);
    if !written {
        return Err(Exception::fatal(format!("arraycopy between {src_name} and {dest_name}")));
    }
    failure.map_or(Ok(()), Err)
}

/// Values the VM reports when no `-D` overrides them.
fn default_property(name: &str) -> Option<String> {
    let value = match name {
        "java.version" | "java.specification.version" | "java.vm.specification.version" => "17",
        "java.class.version" => "61.0",
        "java.vendor" | "java.vm.vendor" => "cafevm",
        "java.vm.name" => "cafevm",
        "java.vm.version" => env!("CARGO_PKG_VERSION"),
        "java.home" => "",
        "file.encoding" | "sun.jnu.encoding" | "native.encoding" => "UTF-8",
        "file.separator" => std::path::MAIN_SEPARATOR_STR,
        "path.separator" => {
            if cfg!(windows) {
                ";"
            } else {
                ":"
            }
        }
        "line.separator" => line_separator(),
        "os.name" => std::env::consts::OS,
        "os.arch" => std::env::consts::ARCH,
        "user.dir" => return std::env::current_dir().ok().map(|d| d.display().to_string()),
        "user.home" => return std::env::var("HOME").ok(),
        "user.name" => return std::env::var("USER").ok(),
        "java.io.tmpdir" => return Some(std::env::temp_dir().display().to_string()),
        "java.class.path" => {
            let paths: Vec<String> = global::options()
                .class_path
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            return Some(paths.join(if cfg!(windows) { ";" } else { ":" }));
        }
        _ => return None,
    };
    Some(value.to_string())
}

fn property(name: &str) -> Option<String> {
    global::property(name)
        .map(str::to_string)
        .or_else(|| default_property(name))
}

fn line_separator() -> &'static str {
    if cfg!(windows) { "\r\n" } else { "\n" }
}

// public static native void arraycopy(Object src, int srcPos, Object dest, int destPos, int length)
fn arraycopy(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let src = args[0].as_object()?;
    let dest = args[2].as_object()?;
    array_copy(&src, args[1].as_int()?, &dest, args[3].as_int()?, args[4].as_int()?)?;
    Ok(None)
}

// public static native long currentTimeMillis()
fn current_time_millis(_: &mut NativeEnv, _: Vec<Value>) -> NativeReturn {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as i64);
    Ok(Some(Value::long(millis)))
}

// public static native long nanoTime()
fn nano_time(_: &mut NativeEnv, _: Vec<Value>) -> NativeReturn {
    Ok(Some(Value::long(global::START.elapsed().as_nanos() as i64)))
}

// public static native int identityHashCode(Object x)
fn identity_hash_code(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    match args[0].as_ref()? {
        Some(object) => int_result(object.identity_hash()),
        None => int_result(0),
    }
}

// public static void exit(int status)
fn exit(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    Err(Exception::Exit(args[0].as_int()?))
}

// public static String getProperty(String key)
fn get_property(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let key = string_arg(&args[0])?;
    if key.is_empty() {
        return Err(Exception::with_message("java/lang/IllegalArgumentException", "key can't be empty"));
    }
    match property(&key) {
        Some(value) => string_result(&value),
        None => Ok(Some(Value::Null)),
    }
}

// public static String getProperty(String key, String def)
fn get_property_or(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let key = string_arg(&args[0])?;
    match property(&key) {
        Some(value) => string_result(&value),
        None => Ok(Some(args[1].clone())),
    }
}

// public static String lineSeparator()
fn get_line_separator(_: &mut NativeEnv, _: Vec<Value>) -> NativeReturn {
    string_result(line_separator())
}

// public static String getenv(String name)
fn getenv(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    match std::env::var(string_arg(&args[0])?) {
        Ok(value) => string_result(&value),
        Err(_) => Ok(Some(Value::Null)),
    }
}

// public static void setOut(PrintStream out)
fn set_out(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    statics::set(CLASS, "out", "Ljava/io/PrintStream;", args[0].clone());
    Ok(None)
}

// public static void setErr(PrintStream err)
fn set_err(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    statics::set(CLASS, "err", "Ljava/io/PrintStream;", args[0].clone());
    Ok(None)
}

// public static SecurityManager getSecurityManager()
fn get_security_manager(_: &mut NativeEnv, _: Vec<Value>) -> NativeReturn {
    Ok(Some(Value::Null))
}

// static { ... }
fn clinit(_: &mut NativeEnv, _: Vec<Value>) -> NativeReturn {
    statics::set(CLASS, "in", "Ljava/io/InputStream;", Value::Null);
    statics::set(CLASS, "out", "Ljava/io/PrintStream;", Value::Ref(print_stream::stream(1)));
    statics::set(CLASS, "err", "Ljava/io/PrintStream;", Value::Ref(print_stream::stream(2)));
    Ok(None)
}

pub(super) fn register_natives() {
    use mtable::register;

    register(CLASS, "<clinit>", "()V", clinit);
    register(CLASS, "registerNatives", "()V", nop);
    register(CLASS, "arraycopy", "(Ljava/lang/Object;ILjava/lang/Object;II)V", arraycopy);
    register(CLASS, "currentTimeMillis", "()J", current_time_millis);
    register(CLASS, "nanoTime", "()J", nano_time);
    register(CLASS, "identityHashCode", "(Ljava/lang/Object;)I", identity_hash_code);
    register(CLASS, "exit", "(I)V", exit);
    register(CLASS, "gc", "()V", nop);
    register(CLASS, "runFinalization", "()V", nop);
    register(CLASS, "getProperty", "(Ljava/lang/String;)Ljava/lang/String;", get_property);
    register(
        CLASS,
        "getProperty",
        "(Ljava/lang/String;Ljava/lang/String;)Ljava/lang/String;",
        get_property_or,
    );
    register(CLASS, "lineSeparator", "()Ljava/lang/String;", get_line_separator);
    register(CLASS, "getenv", "(Ljava/lang/String;)Ljava/lang/String;", getenv);
    register(CLASS, "setOut", "(Ljava/io/PrintStream;)V", set_out);
    register(CLASS, "setErr", "(Ljava/io/PrintStream;)V", set_err);
    register(CLASS, "getSecurityManager", "()Ljava/lang/SecurityManager;", get_security_manager);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::heap;

    fn ints(values: &[i64]) -> ObjectRef {
        heap::int_array_from(b'I', values.to_vec())
    }

    fn contents(array: &Object) -> Vec<i64> {
        array
            .with_array(|v| match v {
                FieldValue::Ints(v) => v.clone(),
                _ => Vec::new(),
            })
            .unwrap()
    }

    #[test]
    fn test_copy_overlapping() {
        let array = ints(&[1, 2, 3, 4, 5]);
        array_copy(&array, 0, &array, 1, 4).unwrap();
        assert_eq!(contents(&array), [1, 1, 2, 3, 4]);
    }

    #[test]
    fn test_bounds_messages() {
        let src = ints(&[1, 2, 3, 4, 5]);
        let dest = ints(&[0; 5]);
        let err = array_copy(&src, 3, &dest, 0, 4).unwrap_err();
        assert_eq!(
            err.to_string(),
            "java.lang.ArrayIndexOutOfBoundsException: arraycopy: last source index 7 out of bounds for int[5]"
        );
        let err = array_copy(&src, 0, &dest, 0, -1).unwrap_err();
        assert_eq!(
            err.to_string(),
            "java.lang.ArrayIndexOutOfBoundsException: arraycopy: length -1 is negative"
        );
    }

    #[test]
    fn test_type_mismatch() {
        let src = ints(&[1]);
        let dest = heap::int_array_from(b'J', vec![0]);
        let err = array_copy(&src, 0, &dest, 0, 1).unwrap_err();
        assert_eq!(
            err.to_string(),
            "java.lang.ArrayStoreException: arraycopy: type mismatch: can not copy int[] into long[]"
        );
        let not_array = heap::string_object("x");
        assert!(array_copy(&not_array, 0, &dest, 0, 0).is_err());
    }

    #[test]
    fn test_element_mismatch_copies_prefix() {
        let src = heap::ref_array_from(
            "java/lang/Object",
            vec![Some(heap::string_object("a")), Some(heap::string_object("b")), Some(heap::empty_object())],
        );
        let dest = heap::ref_array("java/lang/String", 3).unwrap();
        let err = array_copy(&src, 0, &dest, 0, 3).unwrap_err();
        assert!(err.to_string().starts_with("java.lang.ArrayStoreException: arraycopy: element type mismatch"));
        let copied = dest
            .with_array(|v| match v {
                FieldValue::Refs(v) => v.iter().filter(|r| r.is_some()).count(),
                _ => 0,
            })
            .unwrap();
        assert_eq!(copied, 2);
    }

    #[test]
    fn test_properties() {
        assert_eq!(property("java.version").as_deref(), Some("17"));
        assert_eq!(property("line.separator").as_deref(), Some(line_separator()));
        assert!(property("no.such.property").is_none());
    }
}
