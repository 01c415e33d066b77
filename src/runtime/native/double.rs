use super::{NativeReturn, bool_result, int_result, number_format, string_arg, string_result};
use crate::runtime::{
    Exception, NativeResult, Value, heap,
    mtable::{self, NativeEnv},
    reflection, statics,
};

const CLASS: &str = "java/lang/Double";
const CANONICAL_NAN: i64 = 0x7ff8_0000_0000_0000;

/// Java's decimal rendering of a number given in Rust's shortest `{:e}`
/// form: plain notation for magnitudes in `[1e-3, 1e7)`, computerized
/// scientific notation (`1.0E10`) otherwise.
pub(super) fn decimal_text(scientific: &str) -> String {
    let (negative, rest) = match scientific.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, scientific),
    };
    let (mantissa, exponent) = rest.split_once('e').unwrap_or((rest, "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let mut out = String::new();
    if negative {
        out.push('-');
    }
    if (-3..7).contains(&exponent) {
        if exponent >= 0 {
            let int_len = exponent as usize + 1;
            let padded = format!("{digits:0<int_len$}");
            let (int_part, frac) = padded.split_at(int_len);
            out.push_str(int_part);
            out.push('.');
            out.push_str(if frac.is_empty() { "0" } else { frac });
        } else {
            out.push_str("0.");
            out.push_str(&"0".repeat((-exponent - 1) as usize));
            out.push_str(&digits);
        }
    } else {
        let (first, rest) = digits.split_at(1);
        out.push_str(first);
        out.push('.');
        out.push_str(if rest.is_empty() { "0" } else { rest });
        out.push('E');
        out.push_str(&exponent.to_string());
    }
    out
}

/// `Double.toString(d)`.
pub(crate) fn double_text(d: f64) -> String {
    if d.is_nan() {
        "NaN".to_string()
    } else if d.is_infinite() {
        if d > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if d == 0.0 {
        if d.is_sign_negative() { "-0.0" } else { "0.0" }.to_string()
    } else {
        decimal_text(&format!("{d:e}"))
    }
}

/// `Double.parseDouble`: surrounding whitespace and a trailing `d`/`f`
/// type suffix are accepted, as are `NaN` and `Infinity`.
pub(super) fn parse_decimal(input: &str) -> NativeResult<f64> {
    let trimmed = input.trim_matches(|c: char| c <= ' ');
    if trimmed.is_empty() {
        return Err(Exception::with_message(
            "java/lang/NumberFormatException",
            "empty String",
        ));
    }
    let (sign, unsigned) = match trimmed.as_bytes()[0] {
        b'-' => (-1.0, &trimmed[1..]),
        b'+' => (1.0, &trimmed[1..]),
        _ => (1.0, trimmed),
    };
    match unsigned {
        "NaN" => return Ok(f64::NAN),
        "Infinity" => return Ok(sign * f64::INFINITY),
        _ => {}
    }
    let body = unsigned
        .strip_suffix(['d', 'D', 'f', 'F'])
        .unwrap_or(unsigned);
    let well_formed = !body.is_empty()
        && body.bytes().any(|b| b.is_ascii_digit())
        && body
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'));
    if !well_formed {
        return Err(number_format(input));
    }
    body.parse::<f64>()
        .map(|v| sign * v)
        .map_err(|_| number_format(input))
}

/// `Double.compare`: `-0.0 < 0.0` and NaN above everything, equal to itself.
pub(super) fn compare(a: f64, b: f64) -> i32 {
    if a < b {
        return -1;
    }
    if a > b {
        return 1;
    }
    let a = to_long_bits(a);
    let b = to_long_bits(b);
    a.cmp(&b) as i32
}

fn to_long_bits(d: f64) -> i64 {
    if d.is_nan() { CANONICAL_NAN } else { d.to_bits() as i64 }
}

fn value_of_this(args: &[Value]) -> NativeResult<f64> {
    args[0]
        .as_object()?
        .get("value")
        .ok_or_else(|| Exception::fatal("Double without value"))?
        .as_double()
}

fn boxed(d: f64) -> NativeReturn {
    Ok(Some(Value::Ref(heap::primitive_object(CLASS, "D", Value::double(d)))))
}

// public static native long doubleToRawLongBits(double value)
fn double_to_raw_long_bits(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    Ok(Some(Value::long(args[0].as_double()?.to_bits() as i64)))
}

// public static long doubleToLongBits(double value)
fn double_to_long_bits(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    Ok(Some(Value::long(to_long_bits(args[0].as_double()?))))
}

// public static native double longBitsToDouble(long bits)
fn long_bits_to_double(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    Ok(Some(Value::double(f64::from_bits(args[0].as_long()? as u64))))
}

// public static Double valueOf(double d)
fn value_of(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    boxed(args[0].as_double()?)
}

// public static Double valueOf(String s)
fn value_of_string(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    boxed(parse_decimal(&string_arg(&args[0])?)?)
}

// public static double parseDouble(String s)
fn parse_double(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    Ok(Some(Value::double(parse_decimal(&string_arg(&args[0])?)?)))
}

// public static String toString(double d)
fn to_string_static(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    string_result(&double_text(args[0].as_double()?))
}

// public String toString()
fn to_string(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    string_result(&double_text(value_of_this(&args)?))
}

// public double doubleValue()
fn double_value(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    Ok(Some(Value::double(value_of_this(&args)?)))
}

// public float floatValue()
fn float_value(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    Ok(Some(Value::float(value_of_this(&args)? as f32)))
}

// public int intValue()
fn int_value(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    int_result(value_of_this(&args)? as i32)
}

// public long longValue()
fn long_value(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    Ok(Some(Value::long(value_of_this(&args)? as i64)))
}

// public static boolean isNaN(double v)
fn is_nan(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    bool_result(args[0].as_double()?.is_nan())
}

// public boolean isNaN()
fn is_nan_this(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    bool_result(value_of_this(&args)?.is_nan())
}

// public static boolean isInfinite(double v)
fn is_infinite(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    bool_result(args[0].as_double()?.is_infinite())
}

// public static boolean isFinite(double d)
fn is_finite(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    bool_result(args[0].as_double()?.is_finite())
}

// public static int compare(double d1, double d2)
fn compare_static(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    int_result(compare(args[0].as_double()?, args[1].as_double()?))
}

// public int compareTo(Double anotherDouble)
fn compare_to(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let other = value_of_this(&args[1..])?;
    int_result(compare(value_of_this(&args)?, other))
}

// public boolean equals(Object obj)
fn equals(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let this = value_of_this(&args)?;
    match args[1].as_ref()? {
        Some(other) if other.class_name().as_ref() == CLASS => {
            let other = value_of_this(&args[1..])?;
            bool_result(to_long_bits(this) == to_long_bits(other))
        }
        _ => bool_result(false),
    }
}

// public int hashCode()
fn hash_code(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let bits = to_long_bits(value_of_this(&args)?);
    int_result((bits ^ (bits >> 32)) as i32)
}

// public static double sum(double a, double b)
fn sum(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    Ok(Some(Value::double(args[0].as_double()? + args[1].as_double()?)))
}

// static { ... }
fn clinit(_: &mut NativeEnv, _: Vec<Value>) -> NativeReturn {
    let constants = [
        ("MAX_VALUE", f64::MAX),
        ("MIN_VALUE", f64::from_bits(1)),
        ("MIN_NORMAL", f64::MIN_POSITIVE),
        ("POSITIVE_INFINITY", f64::INFINITY),
        ("NEGATIVE_INFINITY", f64::NEG_INFINITY),
        ("NaN", f64::NAN),
    ];
    for (name, value) in constants {
        statics::set(CLASS, name, "D", Value::double(value));
    }
    statics::set(CLASS, "SIZE", "I", Value::int(64));
    statics::set(CLASS, "BYTES", "I", Value::int(8));
    statics::set(
        CLASS,
        "TYPE",
        "Ljava/lang/Class;",
        Value::Ref(reflection::primitive_mirror_named("double")),
    );
    Ok(None)
}

pub(super) fn register_natives() {
    use mtable::register;

    register(CLASS, "<clinit>", "()V", clinit);
    register(CLASS, "doubleToRawLongBits", "(D)J", double_to_raw_long_bits);
    register(CLASS, "doubleToLongBits", "(D)J", double_to_long_bits);
    register(CLASS, "longBitsToDouble", "(J)D", long_bits_to_double);
    register(CLASS, "valueOf", "(D)Ljava/lang/Double;", value_of);
    register(CLASS, "valueOf", "(Ljava/lang/String;)Ljava/lang/Double;", value_of_string);
    register(CLASS, "parseDouble", "(Ljava/lang/String;)D", parse_double);
    register(CLASS, "toString", "(D)Ljava/lang/String;", to_string_static);
    register(CLASS, "toString", "()Ljava/lang/String;", to_string);
    register(CLASS, "doubleValue", "()D", double_value);
    register(CLASS, "floatValue", "()F", float_value);
    register(CLASS, "intValue", "()I", int_value);
    register(CLASS, "longValue", "()J", long_value);
    register(CLASS, "isNaN", "(D)Z", is_nan);
    register(CLASS, "isNaN", "()Z", is_nan_this);
    register(CLASS, "isInfinite", "(D)Z", is_infinite);
    register(CLASS, "isFinite", "(D)Z", is_finite);
    register(CLASS, "compare", "(DD)I", compare_static);
    register(CLASS, "compareTo", "(Ljava/lang/Double;)I", compare_to);
    register(CLASS, "compareTo", "(Ljava/lang/Object;)I", compare_to);
    register(CLASS, "equals", "(Ljava/lang/Object;)Z", equals);
    register(CLASS, "hashCode", "()I", hash_code);
    register(CLASS, "sum", "(DD)D", sum);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_text() {
        let cases = [
            (1.0, "1.0"),
            (0.1, "0.1"),
            (-2.5, "-2.5"),
            (100.0, "100.0"),
            (1234567.0, "1234567.0"),
            (1.0e7, "1.0E7"),
            (0.001, "0.001"),
            (0.0001, "1.0E-4"),
            (1.5e-10, "1.5E-10"),
            (-0.0, "-0.0"),
            (f64::NAN, "NaN"),
            (f64::NEG_INFINITY, "-Infinity"),
        ];
        for (value, expected) in cases {
            assert_eq!(double_text(value), expected, "{value:e}");
        }
    }

    #[test]
    fn test_compare() {
        assert_eq!(compare(f64::NAN, f64::NAN), 0);
        assert_eq!(compare(f64::NAN, f64::INFINITY), 1);
        assert_eq!(compare(0.0, -0.0), 1);
        assert_eq!(compare(1.0, 2.0), -1);
    }

    #[test]
    fn test_bits() {
        let weird_nan = f64::from_bits(0x7ff0_0000_0000_0001);
        assert_eq!(to_long_bits(weird_nan), CANONICAL_NAN);
        for d in [0.0, -0.0, 1.5, f64::MAX, f64::from_bits(1)] {
            assert_eq!(f64::from_bits(d.to_bits()).to_bits(), d.to_bits());
        }
    }

    #[test]
    fn test_parse() {
        assert_eq!(parse_decimal(" 1.5 ").unwrap(), 1.5);
        assert_eq!(parse_decimal("2d").unwrap(), 2.0);
        assert_eq!(parse_decimal("-1e3").unwrap(), -1000.0);
        assert_eq!(parse_decimal("-Infinity").unwrap(), f64::NEG_INFINITY);
        assert!(parse_decimal("NaN").unwrap().is_nan());
        assert_eq!(
            parse_decimal("abc").unwrap_err().to_string(),
            "java.lang.NumberFormatException: For input string: \"abc\""
        );
        assert!(parse_decimal("").is_err());
        assert!(parse_decimal("inf").is_err());
    }
}
