use super::{
    NativeReturn, bool_result, display, int_result, integers,
    string::{char_text, char_units, code_point_in},
    string_result,
};
use crate::runtime::{
    Exception, NativeResult, Value,
    mtable::{self, NativeEnv},
    reflection, statics,
};

const CLASS: &str = "java/lang/Character";

const MIN_RADIX: i32 = 2;
const MAX_RADIX: i32 = 36;

fn this(args: &[Value]) -> NativeResult<i32> {
    Ok(args[0]
        .as_object()?
        .get("value")
        .ok_or_else(|| Exception::fatal("Character without value"))?
        .as_int()?)
}

/// The code point argument as a Rust `char`, `None` for surrogates and
/// values outside the Unicode range.
fn code_point(value: &Value) -> NativeResult<Option<char>> {
    Ok(char::from_u32(value.as_int()? as u32))
}

fn test(args: &[Value], predicate: impl Fn(char) -> bool) -> NativeReturn {
    bool_result(code_point(&args[0])?.is_some_and(predicate))
}

/// Single-character case mapping; mappings that expand to several
/// characters leave the input unchanged, as the JDK does.
fn map_case<I: Iterator<Item = char>>(c: i32, map: impl Fn(char) -> I) -> i32 {
    let Some(ch) = char::from_u32(c as u32) else {
        return c;
    };
    let mut mapped = map(ch);
    match (mapped.next(), mapped.next()) {
        (Some(single), None) => single as i32,
        _ => c,
    }
}

fn digit(c: i32, radix: i32) -> i32 {
    if !(MIN_RADIX..=MAX_RADIX).contains(&radix) {
        return -1;
    }
    char::from_u32(c as u32)
        .and_then(|ch| ch.to_digit(radix as u32))
        .map_or(-1, |d| d as i32)
}

// public static Character valueOf(char c)
fn value_of(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let c = args[0].as_int()? as u16 as i64;
    Ok(Some(Value::Ref(integers::cached(CLASS, "C", c, 0, 127))))
}

// public char charValue()
fn char_value(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    int_result(this(&args)?)
}

// public String toString()
fn to_string(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    string_result(&char_text(this(&args)?))
}

// public static String toString(char c)
fn to_string_static(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    string_result(&char_text(args[0].as_int()?))
}

// public int hashCode()
fn hash_code(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    int_result(this(&args)?)
}

// public static int hashCode(char value)
fn hash_code_static(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    int_result(args[0].as_int()?)
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

// public int compareTo(Character anotherCharacter)
fn compare_to(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    int_result(this(&args)? - this(&args[1..])?)
}

// public static int compare(char x, char y)
fn compare(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    int_result(args[0].as_int()? - args[1].as_int()?)
}

// public static boolean isDigit(char ch)
fn is_digit(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    test(&args, char::is_numeric)
}

// public static boolean isLetter(char ch)
fn is_letter(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    test(&args, char::is_alphabetic)
}

// public static boolean isLetterOrDigit(char ch)
fn is_letter_or_digit(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    test(&args, char::is_alphanumeric)
}

// public static boolean isWhitespace(char ch)
fn is_whitespace(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    // no-break spaces are not Java whitespace
    test(&args, |c| {
        c.is_whitespace() && !matches!(c, '\u{00A0}' | '\u{2007}' | '\u{202F}') || ('\u{1C}'..='\u{1F}').contains(&c)
    })
}

// public static boolean isSpaceChar(char ch)
fn is_space_char(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    test(&args, |c| c.is_whitespace() && !c.is_control())
}

// public static boolean isUpperCase(char ch)
fn is_upper_case(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    test(&args, char::is_uppercase)
}

// public static boolean isLowerCase(char ch)
fn is_lower_case(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    test(&args, char::is_lowercase)
}

// public static boolean isISOControl(char ch)
fn is_iso_control(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    test(&args, char::is_control)
}

// public static char toUpperCase(char ch)
fn to_upper_case(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    int_result(map_case(args[0].as_int()?, char::to_uppercase))
}

// public static char toLowerCase(char ch)
fn to_lower_case(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    int_result(map_case(args[0].as_int()?, char::to_lowercase))
}

// public static int digit(char ch, int radix)
fn digit_of(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    int_result(digit(args[0].as_int()?, args[1].as_int()?))
}

// public static char forDigit(int digit, int radix)
fn for_digit(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let (d, radix) = (args[0].as_int()?, args[1].as_int()?);
    if !(MIN_RADIX..=MAX_RADIX).contains(&radix) || !(0..radix).contains(&d) {
        return int_result(0);
    }
    int_result(char::from_digit(d as u32, radix as u32).map_or(0, |c| c as i32))
}

// public static int getNumericValue(char ch)
fn get_numeric_value(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    int_result(digit(args[0].as_int()?, MAX_RADIX))
}

// public static boolean isSurrogate(char ch)
fn is_surrogate(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    bool_result((0xD800..=0xDFFF).contains(&args[0].as_int()?))
}

// public static boolean isHighSurrogate(char ch)
fn is_high_surrogate(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    bool_result((0xD800..=0xDBFF).contains(&args[0].as_int()?))
}

// public static boolean isLowSurrogate(char ch)
fn is_low_surrogate(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    bool_result((0xDC00..=0xDFFF).contains(&args[0].as_int()?))
}

// public static boolean isValidCodePoint(int codePoint)
fn is_valid_code_point(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    bool_result((0..=0x10FFFF).contains(&args[0].as_int()?))
}

// public static int charCount(int codePoint)
fn char_count(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    int_result(if args[0].as_int()? >= 0x10000 { 2 } else { 1 })
}

// public static char[] toChars(int codePoint)
fn to_chars(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let c = args[0].as_int()?;
    let ch = u32::try_from(c).ok().and_then(char::from_u32);
    let units: Vec<u16> = match ch {
        Some(ch) => ch.encode_utf16(&mut [0; 2]).to_vec(),
        None if (0xD800..=0xDFFF).contains(&c) => vec![c as u16],
        None => {
            return Err(Exception::with_message(
                "java/lang/IllegalArgumentException",
                format!("Not a valid Unicode code point: 0x{:X}", c as u32),
            ));
        }
    };
    Ok(Some(Value::Ref(super::string::char_array(&units))))
}

// public static int codePointAt(char[] a, int index)
fn code_point_at_chars(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let units = char_units(&*args[0].as_object()?)?;
    let index = args[1].as_int()?;
    if index < 0 || index as usize >= units.len() {
        return Err(Exception::with_message(
            "java/lang/ArrayIndexOutOfBoundsException",
            format!("Index {index} out of bounds for length {}", units.len()),
        ));
    }
    int_result(code_point_in(&units, index as usize))
}

// public static int codePointAt(CharSequence seq, int index)
fn code_point_at_sequence(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let sequence = args[0].as_object()?;
    let text = display(env.ctx()?, Some(&sequence))?;
    let units: Vec<u16> = text.encode_utf16().collect();
    let index = super::string_index(args[1].as_int()?, units.len())?;
    int_result(code_point_in(&units, index))
}

// static { ... }
fn clinit(_: &mut NativeEnv, _: Vec<Value>) -> NativeReturn {
    statics::set(CLASS, "MIN_VALUE", "C", Value::int(0));
    statics::set(CLASS, "MAX_VALUE", "C", Value::int(0xFFFF));
    statics::set(CLASS, "MIN_RADIX", "I", Value::int(MIN_RADIX));
    statics::set(CLASS, "MAX_RADIX", "I", Value::int(MAX_RADIX));
    statics::set(CLASS, "MIN_CODE_POINT", "I", Value::int(0));
    statics::set(CLASS, "MAX_CODE_POINT", "I", Value::int(0x10FFFF));
    statics::set(CLASS, "SIZE", "I", Value::int(16));
    statics::set(CLASS, "BYTES", "I", Value::int(2));
    statics::set(
        CLASS,
        "TYPE",
        "Ljava/lang/Class;",
        Value::Ref(reflection::primitive_mirror_named("char")),
    );
    Ok(None)
}

pub(super) fn register_natives() {
    use mtable::{register, register_ctx};

    register(CLASS, "<clinit>", "()V", clinit);
    register(CLASS, "valueOf", "(C)Ljava/lang/Character;", value_of);
    register(CLASS, "charValue", "()C", char_value);
    register(CLASS, "toString", "()Ljava/lang/String;", to_string);
    register(CLASS, "toString", "(C)Ljava/lang/String;", to_string_static);
    register(CLASS, "hashCode", "()I", hash_code);
    register(CLASS, "hashCode", "(C)I", hash_code_static);
    register(CLASS, "equals", "(Ljava/lang/Object;)Z", equals);
    register(CLASS, "compareTo", "(Ljava/lang/Character;)I", compare_to);
    register(CLASS, "compareTo", "(Ljava/lang/Object;)I", compare_to);
    register(CLASS, "compare", "(CC)I", compare);
    // char and int (code point) overloads share one implementation
    for arg in ["C", "I"] {
        register(CLASS, "isDigit", &format!("({arg})Z"), is_digit);
        register(CLASS, "isLetter", &format!("({arg})Z"), is_letter);
        register(CLASS, "isLetterOrDigit", &format!("({arg})Z"), is_letter_or_digit);
        register(CLASS, "isAlphabetic", &format!("({arg})Z"), is_letter);
        register(CLASS, "isWhitespace", &format!("({arg})Z"), is_whitespace);
        register(CLASS, "isSpaceChar", &format!("({arg})Z"), is_space_char);
        register(CLASS, "isUpperCase", &format!("({arg})Z"), is_upper_case);
        register(CLASS, "isLowerCase", &format!("({arg})Z"), is_lower_case);
        register(CLASS, "isISOControl", &format!("({arg})Z"), is_iso_control);
        register(CLASS, "toUpperCase", &format!("({arg}){arg}"), to_upper_case);
        register(CLASS, "toLowerCase", &format!("({arg}){arg}"), to_lower_case);
        register(CLASS, "digit", &format!("({arg}I)I"), digit_of);
        register(CLASS, "getNumericValue", &format!("({arg})I"), get_numeric_value);
    }
    register(CLASS, "forDigit", "(II)C", for_digit);
    register(CLASS, "isSurrogate", "(C)Z", is_surrogate);
    register(CLASS, "isHighSurrogate", "(C)Z", is_high_surrogate);
    register(CLASS, "isLowSurrogate", "(C)Z", is_low_surrogate);
    register(CLASS, "isValidCodePoint", "(I)Z", is_valid_code_point);
    register(CLASS, "charCount", "(I)I", char_count);
    register(CLASS, "toChars", "(I)[C", to_chars);
    register(CLASS, "codePointAt", "([CI)I", code_point_at_chars);
    register_ctx(CLASS, "codePointAt", "(Ljava/lang/CharSequence;I)I", code_point_at_sequence);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_mapping() {
        assert_eq!(map_case('a' as i32, char::to_uppercase), 'A' as i32);
        assert_eq!(map_case('Z' as i32, char::to_lowercase), 'z' as i32);
        // 'ß' upper-cases to "SS" and stays put
        assert_eq!(map_case('ß' as i32, char::to_uppercase), 'ß' as i32);
        assert_eq!(map_case(0xD800, char::to_uppercase), 0xD800);
    }

    #[test]
    fn test_digit() {
        assert_eq!(digit('7' as i32, 10), 7);
        assert_eq!(digit('f' as i32, 16), 15);
        assert_eq!(digit('F' as i32, 16), 15);
        assert_eq!(digit('g' as i32, 16), -1);
        assert_eq!(digit('1' as i32, 1), -1);
    }
}
