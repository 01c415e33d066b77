use super::{
    NativeReturn, bool_result, display, double::double_text, float::float_text, format, int_result,
    string_arg, string_index, string_range, string_result, void,
};
use crate::{
    descriptor::{self, FieldType},
    runtime::{
        Exception, FieldValue, NativeResult, Object, ObjectRef, Value, heap,
        mtable::{self, NativeEnv},
        string_table,
        thread::ThreadContext,
    },
};

const CLASS: &str = "java/lang/String";

fn units_of(s: &str) -> Vec<u16> {
    s.encode_utf16().collect()
}

fn from_units(units: &[u16]) -> String {
    String::from_utf16_lossy(units)
}

pub(super) fn char_text(c: i32) -> String {
    from_units(&[c as u16])
}

pub(super) fn char_units(array: &Object) -> NativeResult<Vec<u16>> {
    array
        .with_array(|v| match v {
            FieldValue::Ints(units) => Some(units.iter().map(|u| *u as u16).collect()),
            _ => None,
        })
        .flatten()
        .ok_or_else(|| Exception::fatal(format!("{array:?} is not a char[]")))
}

pub(super) fn char_array(units: &[u16]) -> ObjectRef {
    heap::int_array_from(b'C', units.iter().map(|u| *u as i64).collect())
}

fn find(haystack: &[u16], needle: &[u16], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    if needle.is_empty() {
        return Some(from);
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}

fn rfind(haystack: &[u16], needle: &[u16]) -> Option<usize> {
    if needle.is_empty() {
        return Some(haystack.len());
    }
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

fn code_point_units(code_point: i32) -> Vec<u16> {
    match char::from_u32(code_point as u32) {
        Some(c) => units_of(c.encode_utf8(&mut [0; 4])),
        None => vec![code_point as u16],
    }
}

fn position(found: Option<usize>) -> NativeReturn {
    int_result(found.map_or(-1, |i| i as i32))
}

fn this(args: &[Value]) -> NativeResult<String> {
    string_arg(&args[0])
}

fn set_contents(receiver: &Value, s: &str) -> NativeReturn {
    let bytes = s.as_bytes().iter().map(|b| *b as i8).collect();
    receiver
        .as_object()?
        .set_field("value", "[B", FieldValue::Bytes(bytes));
    void()
}

/// Textual form of a value of type `field_type`, as string concatenation
/// renders it.
pub(crate) fn stringify(ctx: &mut ThreadContext, value: &Value, field_type: &FieldType) -> NativeResult<String> {
    Ok(match field_type {
        FieldType::Boolean => value.as_bool()?.to_string(),
        FieldType::Char => char_text(value.as_int()?),
        FieldType::Byte | FieldType::Short | FieldType::Int => value.as_int()?.to_string(),
        FieldType::Long => value.as_long()?.to_string(),
        FieldType::Float => float_text(value.as_float()?),
        FieldType::Double => double_text(value.as_double()?),
        FieldType::Object(_) | FieldType::Array(_) => display(ctx, value.as_ref()?.as_ref())?,
    })
}

/// Target of the string concatenation call sites. Arguments: the recipe,
/// the call site descriptor, the recipe constants, then the site's own
/// arguments. In the recipe `\u{1}` takes the next argument and `\u{2}` the
/// next constant.
pub(crate) fn concat_with_constants(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let recipe = string_arg(&args[0])?;
    let site = string_arg(&args[1])?;
    let site = descriptor::method_descriptor(&site)
        .ok_or_else(|| Exception::fatal(format!("bad call site descriptor {site}")))?;
    let constants = args[2]
        .as_object()?
        .with_array(|v| match v {
            FieldValue::Refs(refs) => refs.clone(),
            _ => Vec::new(),
        })
        .unwrap_or_default();
    let ctx = env.ctx()?;

    let mut values = args[3..].iter().zip(&site.parameters);
    let mut constants = constants.into_iter();
    let mut out = String::with_capacity(recipe.len());
    for c in recipe.chars() {
        match c {
            '\u{1}' => {
                let (value, field_type) = values
                    .next()
                    .ok_or_else(|| Exception::fatal("concatenation recipe wants more arguments"))?;
                out.push_str(&stringify(ctx, value, field_type)?);
            }
            '\u{2}' => {
                let constant = constants.next().flatten();
                out.push_str(&display(ctx, constant.as_ref())?);
            }
            c => out.push(c),
        }
    }
    string_result(&out)
}

// public String()
fn init_empty(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    set_contents(&args[0], "")
}

// public String(String original)
fn init_string(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let original = string_arg(&args[1])?;
    set_contents(&args[0], &original)
}

// public String(char[] value)
fn init_chars(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let units = char_units(&*args[1].as_object()?)?;
    set_contents(&args[0], &from_units(&units))
}

// public String(char[] value, int offset, int count)
fn init_chars_range(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let units = char_units(&*args[1].as_object()?)?;
    let offset = args[2].as_int()?;
    let count = args[3].as_int()?;
    let (begin, end) = string_range(offset, offset.saturating_add(count), units.len())?;
    set_contents(&args[0], &from_units(&units[begin..end]))
}

// public String(byte[] bytes)
fn init_bytes(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let bytes = args[1]
        .as_object()?
        .with_array(|v| match v {
            FieldValue::Bytes(bytes) => bytes.iter().map(|b| *b as u8).collect(),
            _ => Vec::new(),
        })
        .unwrap_or_default();
    set_contents(&args[0], &String::from_utf8_lossy(&bytes))
}

// public String(StringBuilder builder)
fn init_builder(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let contents = super::string_builder::contents(&*args[1].as_object()?)?;
    set_contents(&args[0], &contents)
}

// public int length()
fn length(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    int_result(this(&args)?.encode_utf16().count() as i32)
}

// public boolean isEmpty()
fn is_empty(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    bool_result(this(&args)?.is_empty())
}

// public char charAt(int index)
fn char_at(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let units = units_of(&this(&args)?);
    let index = string_index(args[1].as_int()?, units.len())?;
    int_result(units[index] as i32)
}

// public int codePointAt(int index)
fn code_point_at(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let units = units_of(&this(&args)?);
    let index = string_index(args[1].as_int()?, units.len())?;
    int_result(code_point_in(&units, index))
}

/// The code point starting at `index`; a lone surrogate stands for itself.
pub(super) fn code_point_in(units: &[u16], index: usize) -> i32 {
    let end = (index + 2).min(units.len());
    match char::decode_utf16(units[index..end].iter().copied()).next() {
        Some(Ok(c)) => c as i32,
        _ => units[index] as i32,
    }
}

// public int codePointCount(int beginIndex, int endIndex)
fn code_point_count(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let units = units_of(&this(&args)?);
    let (begin, end) = string_range(args[1].as_int()?, args[2].as_int()?, units.len())?;
    int_result(char::decode_utf16(units[begin..end].iter().copied()).count() as i32)
}

// public boolean equals(Object anObject)
fn equals(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    if args[0].same_ref(&args[1]) {
        return bool_result(true);
    }
    match args[1].as_ref()? {
        Some(other) if other.is_string() => {
            bool_result(this(&args)? == heap::rust_string(&other)?)
        }
        _ => bool_result(false),
    }
}

// public boolean equalsIgnoreCase(String anotherString)
fn equals_ignore_case(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let Some(other) = args[1].as_ref()? else {
        return bool_result(false);
    };
    let this = this(&args)?;
    let other = heap::rust_string(&other)?;
    bool_result(this.to_lowercase() == other.to_lowercase())
}

/// `s[0]*31^(n-1) + ... + s[n-1]` over the UTF-16 units.
pub(super) fn java_hash(s: &str) -> i32 {
    s.encode_utf16()
        .fold(0i32, |h, u| h.wrapping_mul(31).wrapping_add(u as i32))
}

// public int hashCode()
fn hash_code(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    int_result(java_hash(&this(&args)?))
}

fn compare_units(a: &str, b: &str) -> i32 {
    let a = units_of(a);
    let b = units_of(b);
    for (x, y) in a.iter().zip(&b) {
        if x != y {
            return *x as i32 - *y as i32;
        }
    }
    a.len() as i32 - b.len() as i32
}

// public int compareTo(String anotherString)
fn compare_to(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    int_result(compare_units(&this(&args)?, &string_arg(&args[1])?))
}

// public int compareToIgnoreCase(String str)
fn compare_to_ignore_case(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let this = this(&args)?.to_lowercase();
    int_result(compare_units(&this, &string_arg(&args[1])?.to_lowercase()))
}

// public int indexOf(int ch)
fn index_of_char(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let units = units_of(&this(&args)?);
    position(find(&units, &code_point_units(args[1].as_int()?), 0))
}

// public int indexOf(int ch, int fromIndex)
fn index_of_char_from(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let units = units_of(&this(&args)?);
    let from = args[2].as_int()?.max(0) as usize;
    position(find(&units, &code_point_units(args[1].as_int()?), from))
}

// public int indexOf(String str)
fn index_of(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let units = units_of(&this(&args)?);
    position(find(&units, &units_of(&string_arg(&args[1])?), 0))
}

// public int indexOf(String str, int fromIndex)
fn index_of_from(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let units = units_of(&this(&args)?);
    let from = args[2].as_int()?.max(0) as usize;
    position(find(&units, &units_of(&string_arg(&args[1])?), from))
}

// public int lastIndexOf(int ch)
fn last_index_of_char(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let units = units_of(&this(&args)?);
    position(rfind(&units, &code_point_units(args[1].as_int()?)))
}

// public int lastIndexOf(String str)
fn last_index_of(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let units = units_of(&this(&args)?);
    position(rfind(&units, &units_of(&string_arg(&args[1])?)))
}

// public boolean contains(CharSequence s)
fn contains(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let this = this(&args)?;
    let needle = display(env.ctx()?, Some(&args[1].as_object()?))?;
    bool_result(this.contains(&needle))
}

// public boolean startsWith(String prefix)
fn starts_with(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    bool_result(this(&args)?.starts_with(&string_arg(&args[1])?))
}

// public boolean startsWith(String prefix, int toffset)
fn starts_with_offset(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let units = units_of(&this(&args)?);
    let prefix = units_of(&string_arg(&args[1])?);
    let offset = args[2].as_int()?;
    if offset < 0 || offset as usize > units.len() {
        return bool_result(false);
    }
    bool_result(units[offset as usize..].starts_with(&prefix))
}

// public boolean endsWith(String suffix)
fn ends_with(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    bool_result(this(&args)?.ends_with(&string_arg(&args[1])?))
}

// public String substring(int beginIndex)
fn substring_from(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let units = units_of(&this(&args)?);
    let (begin, end) = string_range(args[1].as_int()?, units.len() as i32, units.len())?;
    string_result(&from_units(&units[begin..end]))
}

// public String substring(int beginIndex, int endIndex)
fn substring(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let units = units_of(&this(&args)?);
    let (begin, end) = string_range(args[1].as_int()?, args[2].as_int()?, units.len())?;
    string_result(&from_units(&units[begin..end]))
}

// public String concat(String str)
fn concat(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let other = string_arg(&args[1])?;
    if other.is_empty() {
        return Ok(Some(args[0].clone()));
    }
    string_result(&(this(&args)? + &other))
}

// public String replace(char oldChar, char newChar)
fn replace_char(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let from = args[1].as_int()? as u16;
    let to = args[2].as_int()? as u16;
    let units: Vec<u16> = units_of(&this(&args)?)
        .into_iter()
        .map(|u| if u == from { to } else { u })
        .collect();
    string_result(&from_units(&units))
}

// public String replace(CharSequence target, CharSequence replacement)
fn replace(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let this = this(&args)?;
    let ctx = env.ctx()?;
    let target = display(ctx, Some(&args[1].as_object()?))?;
    let replacement = display(ctx, Some(&args[2].as_object()?))?;
    if target.is_empty() {
        // an empty target matches between every pair of characters
        let mut out = replacement.clone();
        for c in this.chars() {
            out.push(c);
            out.push_str(&replacement);
        }
        return string_result(&out);
    }
    string_result(&this.replace(&target, &replacement))
}

// public String toUpperCase()
fn to_upper_case(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    string_result(&this(&args)?.to_uppercase())
}

// public String toLowerCase()
fn to_lower_case(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    string_result(&this(&args)?.to_lowercase())
}

// public String trim()
fn trim(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    string_result(this(&args)?.trim_matches(|c: char| c <= ' '))
}

// public String strip()
fn strip(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    string_result(this(&args)?.trim())
}

// public String stripLeading()
fn strip_leading(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    string_result(this(&args)?.trim_start())
}

// public String stripTrailing()
fn strip_trailing(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    string_result(this(&args)?.trim_end())
}

// public boolean isBlank()
fn is_blank(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    bool_result(this(&args)?.trim().is_empty())
}

// public String repeat(int count)
fn repeat(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let count = args[1].as_int()?;
    if count < 0 {
        return Err(Exception::with_message(
            "java/lang/IllegalArgumentException",
            format!("count is negative: {count}"),
        ));
    }
    string_result(&this(&args)?.repeat(count as usize))
}

// public char[] toCharArray()
fn to_char_array(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    Ok(Some(Value::Ref(char_array(&units_of(&this(&args)?)))))
}

// public byte[] getBytes()
fn get_bytes(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let bytes = this(&args)?.bytes().map(|b| b as i8).collect();
    Ok(Some(Value::Ref(heap::byte_array_from(bytes))))
}

// public native String intern()
fn intern(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    Ok(Some(Value::Ref(string_table::intern_object(&args[0].as_object()?)?)))
}

// public String toString()
fn to_string(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    Ok(Some(args[0].clone()))
}

// public static String valueOf(boolean b)
fn value_of_boolean(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    string_result(&args[0].as_bool()?.to_string())
}

// public static String valueOf(char c)
fn value_of_char(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    string_result(&char_text(args[0].as_int()?))
}

// public static String valueOf(int i)
fn value_of_int(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    string_result(&args[0].as_int()?.to_string())
}

// public static String valueOf(long l)
fn value_of_long(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    string_result(&args[0].as_long()?.to_string())
}

// public static String valueOf(float f)
fn value_of_float(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    string_result(&float_text(args[0].as_float()?))
}

// public static String valueOf(double d)
fn value_of_double(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    string_result(&double_text(args[0].as_double()?))
}

// public static String valueOf(Object obj)
fn value_of_object(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let text = display(env.ctx()?, args[0].as_ref()?.as_ref())?;
    string_result(&text)
}

// public static String valueOf(char[] data)
fn value_of_chars(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    string_result(&from_units(&char_units(&*args[0].as_object()?)?))
}

// public static String join(CharSequence delimiter, CharSequence... elements)
fn join(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let ctx = env.ctx()?;
    let delimiter = display(ctx, Some(&args[0].as_object()?))?;
    let elements = args[1]
        .as_object()?
        .with_array(|v| match v {
            FieldValue::Refs(refs) => refs.clone(),
            _ => Vec::new(),
        })
        .unwrap_or_default();
    let parts = elements
        .iter()
        .map(|e| display(ctx, e.as_ref()))
        .collect::<NativeResult<Vec<_>>>()?;
    string_result(&parts.join(&delimiter))
}

// public static String format(String format, Object... args)
fn format(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let pattern = string_arg(&args[0])?;
    let values = format::varargs(&args[1])?;
    let text = format::format(env.ctx()?, &pattern, &values)?;
    string_result(&text)
}

pub(super) fn register_natives() {
    use mtable::{register, register_ctx};

    register(CLASS, "<init>", "()V", init_empty);
    register(CLASS, "<init>", "(Ljava/lang/String;)V", init_string);
    register(CLASS, "<init>", "([C)V", init_chars);
    register(CLASS, "<init>", "([CII)V", init_chars_range);
    register(CLASS, "<init>", "([B)V", init_bytes);
    register(CLASS, "<init>", "(Ljava/lang/StringBuilder;)V", init_builder);
    register(CLASS, "<init>", "(Ljava/lang/StringBuffer;)V", init_builder);
    register(CLASS, "length", "()I", length);
    register(CLASS, "isEmpty", "()Z", is_empty);
    register(CLASS, "charAt", "(I)C", char_at);
    register(CLASS, "codePointAt", "(I)I", code_point_at);
    register(CLASS, "codePointCount", "(II)I", code_point_count);
    register(CLASS, "equals", "(Ljava/lang/Object;)Z", equals);
    register(CLASS, "equalsIgnoreCase", "(Ljava/lang/String;)Z", equals_ignore_case);
    register(CLASS, "hashCode", "()I", hash_code);
    register(CLASS, "compareTo", "(Ljava/lang/String;)I", compare_to);
    register(CLASS, "compareTo", "(Ljava/lang/Object;)I", compare_to);
    register(CLASS, "compareToIgnoreCase", "(Ljava/lang/String;)I", compare_to_ignore_case);
    register(CLASS, "indexOf", "(I)I", index_of_char);
    register(CLASS, "indexOf", "(II)I", index_of_char_from);
    register(CLASS, "indexOf", "(Ljava/lang/String;)I", index_of);
    register(CLASS, "indexOf", "(Ljava/lang/String;I)I", index_of_from);
    register(CLASS, "lastIndexOf", "(I)I", last_index_of_char);
    register(CLASS, "lastIndexOf", "(Ljava/lang/String;)I", last_index_of);
    register_ctx(CLASS, "contains", "(Ljava/lang/CharSequence;)Z", contains);
    register(CLASS, "startsWith", "(Ljava/lang/String;)Z", starts_with);
    register(CLASS, "startsWith", "(Ljava/lang/String;I)Z", starts_with_offset);
    register(CLASS, "endsWith", "(Ljava/lang/String;)Z", ends_with);
    register(CLASS, "substring", "(I)Ljava/lang/String;", substring_from);
    register(CLASS, "substring", "(II)Ljava/lang/String;", substring);
    register(CLASS, "subSequence", "(II)Ljava/lang/CharSequence;", substring);
    register(CLASS, "concat", "(Ljava/lang/String;)Ljava/lang/String;", concat);
    register(CLASS, "replace", "(CC)Ljava/lang/String;", replace_char);
    register_ctx(
        CLASS,
        "replace",
        "(Ljava/lang/CharSequence;Ljava/lang/CharSequence;)Ljava/lang/String;",
        replace,
    );
    register(CLASS, "toUpperCase", "()Ljava/lang/String;", to_upper_case);
    register(CLASS, "toLowerCase", "()Ljava/lang/String;", to_lower_case);
    register(CLASS, "trim", "()Ljava/lang/String;", trim);
    register(CLASS, "strip", "()Ljava/lang/String;", strip);
    register(CLASS, "stripLeading", "()Ljava/lang/String;", strip_leading);
    register(CLASS, "stripTrailing", "()Ljava/lang/String;", strip_trailing);
    register(CLASS, "isBlank", "()Z", is_blank);
    register(CLASS, "repeat", "(I)Ljava/lang/String;", repeat);
    register(CLASS, "toCharArray", "()[C", to_char_array);
    register(CLASS, "getBytes", "()[B", get_bytes);
    register(CLASS, "intern", "()Ljava/lang/String;", intern);
    register(CLASS, "toString", "()Ljava/lang/String;", to_string);
    register(CLASS, "valueOf", "(Z)Ljava/lang/String;", value_of_boolean);
    register(CLASS, "valueOf", "(C)Ljava/lang/String;", value_of_char);
    register(CLASS, "valueOf", "(I)Ljava/lang/String;", value_of_int);
    register(CLASS, "valueOf", "(J)Ljava/lang/String;", value_of_long);
    register(CLASS, "valueOf", "(F)Ljava/lang/String;", value_of_float);
    register(CLASS, "valueOf", "(D)Ljava/lang/String;", value_of_double);
    register_ctx(CLASS, "valueOf", "(Ljava/lang/Object;)Ljava/lang/String;", value_of_object);
    register(CLASS, "valueOf", "([C)Ljava/lang/String;", value_of_chars);
    register(CLASS, "copyValueOf", "([C)Ljava/lang/String;", value_of_chars);
    register_ctx(
        CLASS,
        "join",
        "(Ljava/lang/CharSequence;[Ljava/lang/CharSequence;)Ljava/lang/String;",
        join,
    );
    register_ctx(
        CLASS,
        "format",
        "(Ljava/lang/String;[Ljava/lang/Object;)Ljava/lang/String;",
        format,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(f: fn(&mut NativeEnv, Vec<Value>) -> NativeReturn, args: Vec<Value>) -> NativeReturn {
        f(&mut NativeEnv::new(None), args)
    }

    fn text(result: NativeReturn) -> String {
        heap::rust_string_or_null(&result.unwrap().unwrap()).unwrap()
    }

    #[test]
    fn test_indices_count_utf16_units() {
        let s = heap::string_value("a😀b");
        assert_eq!(call(length, vec![s.clone()]).unwrap().unwrap().as_int().unwrap(), 4);
        let b = call(char_at, vec![s.clone(), Value::int(3)]).unwrap().unwrap();
        assert_eq!(b.as_int().unwrap(), 'b' as i32);
        let emoji = call(code_point_at, vec![s.clone(), Value::int(1)]).unwrap().unwrap();
        assert_eq!(emoji.as_int().unwrap(), 0x1F600);
        let count = call(code_point_count, vec![s.clone(), Value::int(0), Value::int(4)]);
        assert_eq!(count.unwrap().unwrap().as_int().unwrap(), 3);
        assert_eq!(text(call(substring, vec![s, Value::int(1), Value::int(3)])), "😀");
    }

    #[test]
    fn test_hash_and_compare() {
        assert_eq!(java_hash(""), 0);
        assert_eq!(java_hash("hello"), 99162322);
        assert!(compare_units("apple", "banana") < 0);
        assert_eq!(compare_units("ab", "abc"), -1);
        assert_eq!(compare_units("b", "a"), 1);
    }

    #[test]
    fn test_search() {
        let s = heap::string_value("abcabc");
        let found = call(index_of_from, vec![s.clone(), heap::string_value("bc"), Value::int(2)]);
        assert_eq!(found.unwrap().unwrap().as_int().unwrap(), 4);
        let last = call(last_index_of_char, vec![s.clone(), Value::int('a' as i32)]);
        assert_eq!(last.unwrap().unwrap().as_int().unwrap(), 3);
        let missing = call(index_of, vec![s, heap::string_value("x")]);
        assert_eq!(missing.unwrap().unwrap().as_int().unwrap(), -1);
    }

    #[test]
    fn test_out_of_range() {
        let err = call(char_at, vec![heap::string_value("ab"), Value::int(5)]).unwrap_err();
        assert!(err.to_string().starts_with("java.lang.StringIndexOutOfBoundsException"));
        let err = call(repeat, vec![heap::string_value("ab"), Value::int(-1)]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "java.lang.IllegalArgumentException: count is negative: -1"
        );
    }

    #[test]
    fn test_stringify_primitives() {
        let mut ctx = ThreadContext::new();
        let cases = [
            (Value::int(1), FieldType::Boolean, "true"),
            (Value::int('x' as i32), FieldType::Char, "x"),
            (Value::long(-5), FieldType::Long, "-5"),
            (Value::double(2.0), FieldType::Double, "2.0"),
            (Value::Null, FieldType::Object("java/lang/Object".into()), "null"),
        ];
        for (value, field_type, expected) in cases {
            assert_eq!(stringify(&mut ctx, &value, &field_type).unwrap(), expected);
        }
    }

    #[test]
    fn test_trim_and_equals() {
        assert_eq!(text(call(trim, vec![heap::string_value("\t x \n")])), "x");
        let same = call(equals, vec![heap::string_value("q"), heap::string_value("q")]);
        assert!(same.unwrap().unwrap().as_bool().unwrap());
        let null = call(equals, vec![heap::string_value("q"), Value::Null]);
        assert!(!null.unwrap().unwrap().as_bool().unwrap());
    }
}
