use super::{
    NativeReturn, display, double::double_text, float::float_text, int_result, string_arg,
    string_index, string_range, string_result,
    string::{char_text, char_units},
};
use crate::runtime::{
    Exception, FieldValue, NativeResult, Object, Value, heap,
    mtable::{self, NativeEnv},
};

const BUILDER: &str = "java/lang/StringBuilder";
const BUFFER: &str = "java/lang/StringBuffer";
const VALUE: &str = "value";

fn units(builder: &Object) -> Vec<u16> {
    builder
        .with_array(|v| match v {
            FieldValue::Ints(units) => units.iter().map(|u| *u as u16).collect(),
            _ => Vec::new(),
        })
        .unwrap_or_default()
}

fn store(builder: &Object, units: &[u16]) {
    let units = units.iter().map(|u| *u as i64).collect();
    builder.set_field(VALUE, "[C", FieldValue::Ints(units));
}

/// Runs `f` on the contents in place.
fn edit<R>(builder: &Object, f: impl FnOnce(&mut Vec<i64>) -> R) -> NativeResult<R> {
    if !builder.has_field(VALUE) {
        store(builder, &[]);
    }
    builder
        .with_array_mut(|v| match v {
            FieldValue::Ints(units) => Some(f(units)),
            _ => None,
        })
        .flatten()
        .ok_or_else(|| Exception::fatal(format!("{builder:?} has no character contents")))
}

/// Contents of a builder as a Rust string.
pub(super) fn contents(builder: &Object) -> NativeResult<String> {
    Ok(String::from_utf16_lossy(&units(builder)))
}

fn range_error(what: &str, start: i32, end: i32, length: usize) -> Exception {
    Exception::with_message(
        "java/lang/StringIndexOutOfBoundsException",
        format!("{what} {start}, end {end}, length {length}"),
    )
}

fn offset_check(offset: i32, length: usize) -> NativeResult<usize> {
    if offset < 0 || offset as usize > length {
        return Err(Exception::with_message(
            "java/lang/StringIndexOutOfBoundsException",
            format!("offset {offset}, length {length}"),
        ));
    }
    Ok(offset as usize)
}

fn append_str(args: &[Value], s: &str) -> NativeReturn {
    edit(&*args[0].as_object()?, |units| {
        units.extend(s.encode_utf16().map(i64::from))
    })?;
    Ok(Some(args[0].clone()))
}

fn insert_str(args: &[Value], s: &str) -> NativeReturn {
    let this = args[0].as_object()?;
    let offset = args[1].as_int()?;
    edit(&this, |units| -> NativeResult<()> {
        let at = offset_check(offset, units.len())?;
        units.splice(at..at, s.encode_utf16().map(i64::from));
        Ok(())
    })??;
    Ok(Some(args[0].clone()))
}

// public StringBuilder()
fn init(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    store(&*args[0].as_object()?, &[]);
    Ok(None)
}

// public StringBuilder(int capacity)
fn init_capacity(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let capacity = args[1].as_int()?;
    if capacity < 0 {
        return Err(Exception::with_message(
            "java/lang/NegativeArraySizeException",
            capacity.to_string(),
        ));
    }
    store(&*args[0].as_object()?, &[]);
    Ok(None)
}

// public StringBuilder(String str)
fn init_string(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let initial = string_arg(&args[1])?;
    let units: Vec<u16> = initial.encode_utf16().collect();
    store(&*args[0].as_object()?, &units);
    Ok(None)
}

// public StringBuilder(CharSequence seq)
fn init_sequence(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let sequence = args[1].as_object()?;
    let initial = display(env.ctx()?, Some(&sequence))?;
    let units: Vec<u16> = initial.encode_utf16().collect();
    store(&*args[0].as_object()?, &units);
    Ok(None)
}

// public StringBuilder append(String str)
fn append_string(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let s = heap::rust_string_or_null(&args[1])?;
    append_str(&args, &s)
}

// public StringBuilder append(Object obj)
fn append_object(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let s = display(env.ctx()?, args[1].as_ref()?.as_ref())?;
    append_str(&args, &s)
}

// public StringBuilder append(CharSequence s, int start, int end)
fn append_sequence_range(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let s = display(env.ctx()?, args[1].as_ref()?.as_ref())?;
    let units: Vec<u16> = s.encode_utf16().collect();
    let (start, end) = (args[2].as_int()?, args[3].as_int()?);
    if start < 0 || start > end || end as usize > units.len() {
        return Err(Exception::with_message(
            "java/lang/IndexOutOfBoundsException",
            format!("start {start}, end {end}, length {}", units.len()),
        ));
    }
    append_str(&args, &String::from_utf16_lossy(&units[start as usize..end as usize]))
}

// public StringBuilder append(int i)
fn append_int(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    append_str(&args, &args[1].as_int()?.to_string())
}

// public StringBuilder append(long lng)
fn append_long(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    append_str(&args, &args[1].as_long()?.to_string())
}

// public StringBuilder append(char c)
fn append_char(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let c = args[1].as_int()? as u16 as i64;
    edit(&*args[0].as_object()?, |units| units.push(c))?;
    Ok(Some(args[0].clone()))
}

// public StringBuilder append(boolean b)
fn append_boolean(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    append_str(&args, if args[1].as_bool()? { "true" } else { "false" })
}

// public StringBuilder append(float f)
fn append_float(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    append_str(&args, &float_text(args[1].as_float()?))
}

// public StringBuilder append(double d)
fn append_double(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    append_str(&args, &double_text(args[1].as_double()?))
}

// public StringBuilder append(char[] str)
fn append_chars(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let chars = char_units(&*args[1].as_object()?)?;
    append_str(&args, &String::from_utf16_lossy(&chars))
}

// public StringBuilder append(char[] str, int offset, int len)
fn append_chars_range(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let chars = char_units(&*args[1].as_object()?)?;
    let (offset, len) = (args[2].as_int()?, args[3].as_int()?);
    let end = offset.checked_add(len).unwrap_or(-1);
    if offset < 0 || len < 0 || end as usize > chars.len() {
        return Err(Exception::with_message(
            "java/lang/IndexOutOfBoundsException",
            format!("offset {offset}, count {len}, length {}", chars.len()),
        ));
    }
    append_str(&args, &String::from_utf16_lossy(&chars[offset as usize..end as usize]))
}

// public StringBuilder appendCodePoint(int codePoint)
fn append_code_point(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let code_point = args[1].as_int()?;
    if (0xD800..=0xDFFF).contains(&code_point) {
        edit(&*args[0].as_object()?, |units| units.push(code_point as i64))?;
        return Ok(Some(args[0].clone()));
    }
    match u32::try_from(code_point).ok().and_then(char::from_u32) {
        Some(c) => append_str(&args, c.encode_utf8(&mut [0; 4])),
        None => Err(Exception::with_message(
            "java/lang/IllegalArgumentException",
            format!("Not a valid Unicode code point: 0x{:X}", code_point as u32),
        )),
    }
}

// public String toString()
fn to_string(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    string_result(&contents(&*args[0].as_object()?)?)
}

// public int length()
fn length(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    int_result(units(&*args[0].as_object()?).len() as i32)
}

// public int capacity()
fn capacity(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    int_result((units(&*args[0].as_object()?).len() as i32).max(16))
}

// public char charAt(int index)
fn char_at(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let units = units(&*args[0].as_object()?);
    let index = string_index(args[1].as_int()?, units.len())?;
    int_result(units[index] as i32)
}

// public void setCharAt(int index, char ch)
fn set_char_at(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let (index, c) = (args[1].as_int()?, args[2].as_int()?);
    edit(&*args[0].as_object()?, |units| -> NativeResult<()> {
        let at = string_index(index, units.len())?;
        units[at] = c as u16 as i64;
        Ok(())
    })??;
    Ok(None)
}

// public StringBuilder insert(int offset, String str)
fn insert_string(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let s = heap::rust_string_or_null(&args[2])?;
    insert_str(&args, &s)
}

// public StringBuilder insert(int offset, Object obj)
fn insert_object(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let s = display(env.ctx()?, args[2].as_ref()?.as_ref())?;
    insert_str(&args, &s)
}

// public StringBuilder insert(int offset, char c)
fn insert_char(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    insert_str(&args, &char_text(args[2].as_int()?))
}

// public StringBuilder insert(int offset, int i)
fn insert_int(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    insert_str(&args, &args[2].as_int()?.to_string())
}

// public StringBuilder insert(int offset, long l)
fn insert_long(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    insert_str(&args, &args[2].as_long()?.to_string())
}

// public StringBuilder insert(int offset, boolean b)
fn insert_boolean(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    insert_str(&args, if args[2].as_bool()? { "true" } else { "false" })
}

// public StringBuilder deleteCharAt(int index)
fn delete_char_at(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let index = args[1].as_int()?;
    edit(&*args[0].as_object()?, |units| -> NativeResult<()> {
        let at = string_index(index, units.len())?;
        units.remove(at);
        Ok(())
    })??;
    Ok(Some(args[0].clone()))
}

// public StringBuilder delete(int start, int end)
fn delete(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let (start, end) = (args[1].as_int()?, args[2].as_int()?);
    edit(&*args[0].as_object()?, |units| -> NativeResult<()> {
        let end = end.min(units.len() as i32);
        if start < 0 || start > end {
            return Err(range_error("start", start, end, units.len()));
        }
        units.drain(start as usize..end as usize);
        Ok(())
    })??;
    Ok(Some(args[0].clone()))
}

// public StringBuilder replace(int start, int end, String str)
fn replace(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let (start, end) = (args[1].as_int()?, args[2].as_int()?);
    let replacement = string_arg(&args[3])?;
    edit(&*args[0].as_object()?, |units| -> NativeResult<()> {
        let length = units.len();
        if start < 0 || start as usize > length || start > end {
            return Err(range_error("start", start, end, length));
        }
        let end = (end as usize).min(length);
        units.splice(start as usize..end, replacement.encode_utf16().map(i64::from));
        Ok(())
    })??;
    Ok(Some(args[0].clone()))
}

// public StringBuilder reverse()
fn reverse(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let this = args[0].as_object()?;
    // surrogate pairs keep their order
    let reversed: String = contents(&this)?.chars().rev().collect();
    let units: Vec<u16> = reversed.encode_utf16().collect();
    store(&this, &units);
    Ok(Some(args[0].clone()))
}

// public void setLength(int newLength)
fn set_length(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let length = args[1].as_int()?;
    if length < 0 {
        return Err(Exception::with_message(
            "java/lang/StringIndexOutOfBoundsException",
            format!("String index out of range: {length}"),
        ));
    }
    edit(&*args[0].as_object()?, |units| units.resize(length as usize, 0))?;
    Ok(None)
}

fn index_in(haystack: &[u16], needle: &[u16], from: usize) -> i32 {
    if needle.is_empty() {
        return from.min(haystack.len()) as i32;
    }
    (from..haystack.len())
        .find(|&i| haystack[i..].starts_with(needle))
        .map_or(-1, |i| i as i32)
}

// public int indexOf(String str)
fn index_of(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let needle: Vec<u16> = string_arg(&args[1])?.encode_utf16().collect();
    int_result(index_in(&units(&*args[0].as_object()?), &needle, 0))
}

// public int indexOf(String str, int fromIndex)
fn index_of_from(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let needle: Vec<u16> = string_arg(&args[1])?.encode_utf16().collect();
    let from = args[2].as_int()?.max(0) as usize;
    int_result(index_in(&units(&*args[0].as_object()?), &needle, from))
}

// public int lastIndexOf(String str)
fn last_index_of(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let needle: Vec<u16> = string_arg(&args[1])?.encode_utf16().collect();
    let haystack = units(&*args[0].as_object()?);
    let found = (0..=haystack.len().saturating_sub(needle.len()))
        .rev()
        .find(|&i| haystack[i..].starts_with(&needle));
    int_result(match found {
        Some(i) if needle.len() <= haystack.len() => i as i32,
        _ => -1,
    })
}

// public String substring(int start)
fn substring(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let units = units(&*args[0].as_object()?);
    let (begin, end) = string_range(args[1].as_int()?, units.len() as i32, units.len())?;
    string_result(&String::from_utf16_lossy(&units[begin..end]))
}

// public String substring(int start, int end)
fn substring_range(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let units = units(&*args[0].as_object()?);
    let (begin, end) = string_range(args[1].as_int()?, args[2].as_int()?, units.len())?;
    string_result(&String::from_utf16_lossy(&units[begin..end]))
}

// public void ensureCapacity(int minimumCapacity)
fn ensure_capacity(_: &mut NativeEnv, _: Vec<Value>) -> NativeReturn {
    Ok(None)
}

pub(super) fn register_natives() {
    use mtable::{register, register_ctx};

    for class in [BUILDER, BUFFER] {
        let this = format!("L{class};");
        let appends: [(&str, mtable::GFunction); 10] = [
            ("Ljava/lang/String;", append_string),
            ("I", append_int),
            ("J", append_long),
            ("C", append_char),
            ("Z", append_boolean),
            ("F", append_float),
            ("D", append_double),
            ("[C", append_chars),
            ("[CII", append_chars_range),
            // StringBuilder.append(StringBuffer) copies the contents as-is
            ("Ljava/lang/StringBuffer;", append_string_buffer),
        ];
        for (params, function) in appends {
            register(class, "append", &format!("({params}){this}"), function);
        }
        register_ctx(class, "append", &format!("(Ljava/lang/Object;){this}"), append_object);
        register_ctx(class, "append", &format!("(Ljava/lang/CharSequence;){this}"), append_object);
        register_ctx(class, "append", &format!("(Ljava/lang/CharSequence;II){this}"), append_sequence_range);
        register(class, "appendCodePoint", &format!("(I){this}"), append_code_point);

        let inserts: [(&str, mtable::GFunction); 5] = [
            ("Ljava/lang/String;", insert_string),
            ("C", insert_char),
            ("I", insert_int),
            ("J", insert_long),
            ("Z", insert_boolean),
        ];
        for (param, function) in inserts {
            register(class, "insert", &format!("(I{param}){this}"), function);
        }
        register_ctx(class, "insert", &format!("(ILjava/lang/Object;){this}"), insert_object);

        register(class, "<init>", "()V", init);
        register(class, "<init>", "(I)V", init_capacity);
        register(class, "<init>", "(Ljava/lang/String;)V", init_string);
        register_ctx(class, "<init>", "(Ljava/lang/CharSequence;)V", init_sequence);
        register(class, "toString", "()Ljava/lang/String;", to_string);
        register(class, "length", "()I", length);
        register(class, "capacity", "()I", capacity);
        register(class, "charAt", "(I)C", char_at);
        register(class, "setCharAt", "(IC)V", set_char_at);
        register(class, "deleteCharAt", &format!("(I){this}"), delete_char_at);
        register(class, "delete", &format!("(II){this}"), delete);
        register(class, "replace", &format!("(IILjava/lang/String;){this}"), replace);
        register(class, "reverse", &format!("(){this}"), reverse);
        register(class, "setLength", "(I)V", set_length);
        register(class, "indexOf", "(Ljava/lang/String;)I", index_of);
        register(class, "indexOf", "(Ljava/lang/String;I)I", index_of_from);
        register(class, "lastIndexOf", "(Ljava/lang/String;)I", last_index_of);
        register(class, "substring", "(I)Ljava/lang/String;", substring);
        register(class, "substring", "(II)Ljava/lang/String;", substring_range);
        register(class, "subSequence", "(II)Ljava/lang/CharSequence;", substring_range);
        register(class, "ensureCapacity", "(I)V", ensure_capacity);
        register(class, "trimToSize", "()V", ensure_capacity);
    }
}

// public StringBuilder append(StringBuffer sb)
fn append_string_buffer(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let s = match args[1].as_ref()? {
        Some(buffer) => contents(&buffer)?,
        None => "null".to_string(),
    };
    append_str(&args, &s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder(text: &str) -> Value {
        let builder = heap::object_with_class_name(BUILDER);
        let units: Vec<u16> = text.encode_utf16().collect();
        store(&builder, &units);
        Value::Ref(builder)
    }

    fn text(value: &Value) -> String {
        contents(&value.as_object().unwrap()).unwrap()
    }

    #[test]
    fn test_append_and_insert() {
        let mut env = NativeEnv::new(None);
        let b = builder("ac");
        append_int(&mut env, vec![b.clone(), Value::int(-7)]).unwrap();
        insert_char(&mut env, vec![b.clone(), Value::int(1), Value::int('b' as i32)]).unwrap();
        append_double(&mut env, vec![b.clone(), Value::double(1.5)]).unwrap();
        assert_eq!(text(&b), "abc-71.5");
        let err = insert_int(&mut env, vec![b.clone(), Value::int(99), Value::int(0)]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "java.lang.StringIndexOutOfBoundsException: offset 99, length 8"
        );
    }

    #[test]
    fn test_delete_and_replace() {
        let mut env = NativeEnv::new(None);
        let b = builder("hello world");
        delete(&mut env, vec![b.clone(), Value::int(5), Value::int(100)]).unwrap();
        assert_eq!(text(&b), "hello");
        replace(&mut env, vec![b.clone(), Value::int(0), Value::int(1), heap::string_value("J")]).unwrap();
        assert_eq!(text(&b), "Jello");
        delete_char_at(&mut env, vec![b.clone(), Value::int(4)]).unwrap();
        assert_eq!(text(&b), "Jell");
        assert!(delete(&mut env, vec![b.clone(), Value::int(3), Value::int(1)]).is_err());
    }

    #[test]
    fn test_reverse_keeps_surrogate_pairs() {
        let mut env = NativeEnv::new(None);
        let b = builder("a😀b");
        reverse(&mut env, vec![b.clone()]).unwrap();
        assert_eq!(text(&b), "b😀a");
    }

    #[test]
    fn test_set_length_pads_with_nul() {
        let mut env = NativeEnv::new(None);
        let b = builder("abc");
        set_length(&mut env, vec![b.clone(), Value::int(1)]).unwrap();
        assert_eq!(text(&b), "a");
        set_length(&mut env, vec![b.clone(), Value::int(2)]).unwrap();
        assert_eq!(text(&b), "a\0");
    }

    #[test]
    fn test_index_of() {
        assert_eq!(index_in(&[1, 2, 3, 2, 3], &[2, 3], 2), 3);
        assert_eq!(index_in(&[1, 2], &[], 5), 2);
        assert_eq!(index_in(&[1, 2], &[3], 0), -1);
    }
}
