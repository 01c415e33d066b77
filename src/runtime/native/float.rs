use super::{
    NativeReturn, bool_result,
    double::{compare as compare_double, decimal_text, parse_decimal},
    int_result, string_arg, string_result,
};
use crate::runtime::{
    Exception, NativeResult, Value, heap,
    mtable::{self, NativeEnv},
    reflection, statics,
};

const CLASS: &str = "java/lang/Float";
const CANONICAL_NAN: i32 = 0x7fc0_0000;

/// `Float.toString(f)`: the shortest digits that identify the `float`.
pub(crate) fn float_text(f: f32) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if f == 0.0 {
        if f.is_sign_negative() { "-0.0" } else { "0.0" }.to_string()
    } else {
        decimal_text(&format!("{f:e}"))
    }
}

fn to_int_bits(f: f32) -> i32 {
    if f.is_nan() { CANONICAL_NAN } else { f.to_bits() as i32 }
}

fn value_of_this(args: &[Value]) -> NativeResult<f32> {
    args[0]
        .as_object()?
        .get("value")
        .ok_or_else(|| Exception::fatal("Float without value"))?
        .as_float()
}

fn boxed(f: f32) -> NativeReturn {
    Ok(Some(Value::Ref(heap::primitive_object(CLASS, "F", Value::float(f)))))
}

// public static native int floatToRawIntBits(float value)
fn float_to_raw_int_bits(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    int_result(args[0].as_float()?.to_bits() as i32)
}

// public static int floatToIntBits(float value)
fn float_to_int_bits(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    int_result(to_int_bits(args[0].as_float()?))
}

// public static native float intBitsToFloat(int bits)
fn int_bits_to_float(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    Ok(Some(Value::float(f32::from_bits(args[0].as_int()? as u32))))
}

// public static Float valueOf(float f)
fn value_of(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    boxed(args[0].as_float()?)
}

// public static Float valueOf(String s)
fn value_of_string(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    boxed(parse_decimal(&string_arg(&args[0])?)? as f32)
}

// public static float parseFloat(String s)
fn parse_float(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    Ok(Some(Value::float(parse_decimal(&string_arg(&args[0])?)? as f32)))
}

// public static String toString(float f)
fn to_string_static(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    string_result(&float_text(args[0].as_float()?))
}

// public String toString()
fn to_string(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    string_result(&float_text(value_of_this(&args)?))
}

// public float floatValue()
fn float_value(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    Ok(Some(Value::float(value_of_this(&args)?)))
}

// public double doubleValue()
fn double_value(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    Ok(Some(Value::double(value_of_this(&args)? as f64)))
}

// public int intValue()
fn int_value(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    int_result(value_of_this(&args)? as i32)
}

// public long longValue()
fn long_value(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    Ok(Some(Value::long(value_of_this(&args)? as i64)))
}

// public static boolean isNaN(float v)
fn is_nan(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    bool_result(args[0].as_float()?.is_nan())
}

// public static boolean isInfinite(float v)
fn is_infinite(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    bool_result(args[0].as_float()?.is_infinite())
}

// public static int compare(float f1, float f2)
fn compare(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    int_result(compare_double(
        args[0].as_float()? as f64,
        args[1].as_float()? as f64,
    ))
}

// public int compareTo(Float anotherFloat)
fn compare_to(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let other = value_of_this(&args[1..])?;
    int_result(compare_double(value_of_this(&args)? as f64, other as f64))
}

// public boolean equals(Object obj)
fn equals(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let this = value_of_this(&args)?;
    match args[1].as_ref()? {
        Some(other) if other.class_name().as_ref() == CLASS => {
            bool_result(to_int_bits(this) == to_int_bits(value_of_this(&args[1..])?))
        }
        _ => bool_result(false),
    }
}

// public int hashCode()
fn hash_code(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    int_result(to_int_bits(value_of_this(&args)?))
}

// static { ... }
fn clinit(_: &mut NativeEnv, _: Vec<Value>) -> NativeReturn {
    let constants = [
        ("MAX_VALUE", f32::MAX),
        ("MIN_VALUE", f32::from_bits(1)),
        ("MIN_NORMAL", f32::MIN_POSITIVE),
        ("POSITIVE_INFINITY", f32::INFINITY),
        ("NEGATIVE_INFINITY", f32::NEG_INFINITY),
        ("NaN", f32::NAN),
    ];
    for (name, value) in constants {
        statics::set(CLASS, name, "F", Value::float(value));
    }
    statics::set(CLASS, "SIZE", "I", Value::int(32));
    statics::set(CLASS, "BYTES", "I", Value::int(4));
    statics::set(
        CLASS,
        "TYPE",
        "Ljava/lang/Class;",
        Value::Ref(reflection::primitive_mirror_named("float")),
    );
    Ok(None)
}

pub(super) fn register_natives() {
    use mtable::register;

    register(CLASS, "<clinit>", "()V", clinit);
    register(CLASS, "floatToRawIntBits", "(F)I", float_to_raw_int_bits);
    register(CLASS, "floatToIntBits", "(F)I", float_to_int_bits);
    register(CLASS, "intBitsToFloat", "(I)F", int_bits_to_float);
    register(CLASS, "valueOf", "(F)Ljava/lang/Float;", value_of);
    register(CLASS, "valueOf", "(Ljava/lang/String;)Ljava/lang/Float;", value_of_string);
    register(CLASS, "parseFloat", "(Ljava/lang/String;)F", parse_float);
    register(CLASS, "toString", "(F)Ljava/lang/String;", to_string_static);
    register(CLASS, "toString", "()Ljava/lang/String;", to_string);
    register(CLASS, "floatValue", "()F", float_value);
    register(CLASS, "doubleValue", "()D", double_value);
    register(CLASS, "intValue", "()I", int_value);
    register(CLASS, "longValue", "()J", long_value);
    register(CLASS, "isNaN", "(F)Z", is_nan);
    register(CLASS, "isInfinite", "(F)Z", is_infinite);
    register(CLASS, "compare", "(FF)I", compare);
    register(CLASS, "compareTo", "(Ljava/lang/Float;)I", compare_to);
    register(CLASS, "compareTo", "(Ljava/lang/Object;)I", compare_to);
    register(CLASS, "equals", "(Ljava/lang/Object;)Z", equals);
    register(CLASS, "hashCode", "()I", hash_code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_text_uses_float_precision() {
        assert_eq!(float_text(0.1), "0.1");
        assert_eq!(float_text(3.0), "3.0");
        assert_eq!(float_text(1.0e10), "1.0E10");
        assert_eq!(float_text(f32::NAN), "NaN");
    }

    #[test]
    fn test_bits() {
        assert_eq!(to_int_bits(f32::from_bits(0x7f80_0001)), CANONICAL_NAN);
        assert_eq!(to_int_bits(1.0), 0x3f80_0000);
    }
}
