use dashmap::DashMap;
use once_cell::sync::Lazy;
use paste::paste;

use super::{NativeReturn, bool_result, int_result, string_result};
use crate::runtime::{
    Exception, NativeResult, ObjectRef, Value, heap,
    mtable::{self, NativeEnv},
    reflection, statics,
};

/// Canonical boxes handed out by `valueOf`, keyed by class and value.
static CACHE: Lazy<DashMap<(&'static str, i64), ObjectRef>> = Lazy::new(DashMap::new);

/// A box of `value`, shared for values in `low..=high`.
pub(super) fn cached(class: &'static str, descriptor: &str, value: i64, low: i64, high: i64) -> ObjectRef {
    if !(low..=high).contains(&value) {
        return heap::primitive_object(class, descriptor, Value::long(value));
    }
    CACHE
        .entry((class, value))
        .or_insert_with(|| heap::primitive_object(class, descriptor, Value::long(value)))
        .clone()
}

/// The primitive held by a box.
fn held(value: &Value) -> NativeResult<i64> {
    value
        .as_object()?
        .get("value")
        .ok_or_else(|| Exception::fatal("box without value"))?
        .as_long()
}

fn parse_error(input: &str, radix: i32) -> Exception {
    let mut message = format!("For input string: \"{input}\"");
    if radix != 10 {
        message.push_str(&format!(" under radix {radix}"));
    }
    Exception::with_message("java/lang/NumberFormatException", message)
}

/// `Integer.parseInt` and friends for a type spanning `min..=max`.
fn parse_integral(input: &Value, radix: i32, min: i64, max: i64) -> NativeResult<i64> {
    let Some(input) = input.as_ref()? else {
        return Err(Exception::with_message(
            "java/lang/NumberFormatException",
            "Cannot parse null string: null",
        ));
    };
    let input = heap::rust_string(&input)?;
    if !(2..=36).contains(&radix) {
        return Err(Exception::with_message(
            "java/lang/NumberFormatException",
            format!("radix {radix} out of range"),
        ));
    }
    let value = i128::from_str_radix(&input, radix as u32).map_err(|_| parse_error(&input, radix))?;
    // Byte and Short report range errors after a successful int parse
    let int_range = (i32::MIN as i128)..=(i32::MAX as i128);
    if (min as i128..=max as i128).contains(&value) {
        Ok(value as i64)
    } else if max < i32::MAX as i64 && int_range.contains(&value) {
        Err(Exception::with_message(
            "java/lang/NumberFormatException",
            format!("Value out of range. Value:\"{input}\" Radix:{radix}"),
        ))
    } else {
        Err(parse_error(&input, radix))
    }
}

/// Signed digits in `radix`, as `Integer.toString(i, radix)` prints them.
fn radix_text(value: i64, radix: i32) -> String {
    let radix = if (2..=36).contains(&radix) { radix as u32 } else { 10 };
    if value == 0 {
        return "0".to_string();
    }
    let mut magnitude = value.unsigned_abs();
    let mut digits = Vec::new();
    while magnitude > 0 {
        let digit = (magnitude % radix as u64) as u32;
        digits.push(char::from_digit(digit, radix).unwrap_or('?'));
        magnitude /= radix as u64;
    }
    if value < 0 {
        digits.push('-');
    }
    digits.iter().rev().collect()
}

macro_rules! integral {
    ($module:ident, $name:ident, $class:literal, $descriptor:literal, $rust:ty, $primitive:literal) => {
        mod $module {
            use super::*;

            const CLASS: &str = $class;
            const DESCRIPTOR: &str = $descriptor;
            const MIN: i64 = <$rust>::MIN as i64;
            const MAX: i64 = <$rust>::MAX as i64;

            fn boxed(value: i64) -> NativeReturn {
                Ok(Some(Value::Ref(cached(CLASS, DESCRIPTOR, value, -128, 127))))
            }

            fn this(args: &[Value]) -> NativeResult<$rust> {
                Ok(held(&args[0])? as $rust)
            }

            // public static T valueOf(t value)
            fn value_of(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
                boxed(args[0].as_long()? as $rust as i64)
            }

            // public static T valueOf(String s)
            fn value_of_string(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
                boxed(parse_integral(&args[0], 10, MIN, MAX)?)
            }

            // public static T valueOf(String s, int radix)
            fn value_of_radix(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
                boxed(parse_integral(&args[0], args[1].as_int()?, MIN, MAX)?)
            }

            // public static t parseT(String s)
            fn parse(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
                Ok(Some(Value::long(parse_integral(&args[0], 10, MIN, MAX)?)))
            }

            // public static t parseT(String s, int radix)
            fn parse_radix(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
                let radix = args[1].as_int()?;
                Ok(Some(Value::long(parse_integral(&args[0], radix, MIN, MAX)?)))
            }

            // public String toString()
            fn to_string(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
                string_result(&this(&args)?.to_string())
            }

            // public static String toString(t value)
            fn to_string_static(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
                string_result(&(args[0].as_long()? as $rust).to_string())
            }

            // public static String toString(t value, int radix)
            fn to_string_radix(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
                let value = args[0].as_long()? as $rust as i64;
                string_result(&radix_text(value, args[1].as_int()?))
            }

            // public byte byteValue()
            fn byte_value(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
                int_result(this(&args)? as i8 as i32)
            }

            // public short shortValue()
            fn short_value(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
                int_result(this(&args)? as i16 as i32)
            }

            // public int intValue()
            fn int_value(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
                int_result(this(&args)? as i32)
            }

            // public long longValue()
            fn long_value(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
                Ok(Some(Value::long(this(&args)? as i64)))
            }

            // public float floatValue()
            fn float_value(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
                Ok(Some(Value::float(this(&args)? as f32)))
            }

            // public double doubleValue()
            fn double_value(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
                Ok(Some(Value::double(this(&args)? as f64)))
            }

            fn hash(value: i64) -> i32 {
                (value ^ ((value as u64) >> 32) as i64) as i32
            }

            // public int hashCode()
            fn hash_code(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
                int_result(hash(this(&args)? as i64))
            }

            // public static int hashCode(t value)
            fn hash_code_static(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
                int_result(hash(args[0].as_long()? as $rust as i64))
            }

            // public boolean equals(Object obj)
            fn equals(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
                match args[1].as_ref()? {
                    Some(other) if other.class_name().as_ref() == CLASS => {
                        bool_result(held(&args[0])? == held(&args[1])?)
                    }
                    _ => bool_result(false),
                }
            }

            // public static int compare(t x, t y)
            fn compare(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
                int_result(args[0].as_long()?.cmp(&args[1].as_long()?) as i32)
            }

            // public int compareTo(T another)
            fn compare_to(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
                let other = held(&args[1])?;
                int_result(held(&args[0])?.cmp(&other) as i32)
            }

            // static { ... }
            fn clinit(_: &mut NativeEnv, _: Vec<Value>) -> NativeReturn {
                statics::set(CLASS, "MIN_VALUE", DESCRIPTOR, Value::long(MIN));
                statics::set(CLASS, "MAX_VALUE", DESCRIPTOR, Value::long(MAX));
                statics::set(CLASS, "SIZE", "I", Value::int(<$rust>::BITS as i32));
                statics::set(CLASS, "BYTES", "I", Value::int(<$rust>::BITS as i32 / 8));
                statics::set(
                    CLASS,
                    "TYPE",
                    "Ljava/lang/Class;",
                    Value::Ref(reflection::primitive_mirror_named($primitive)),
                );
                Ok(None)
            }

            pub(super) fn register_natives() {
                use mtable::register;

                let boxed_type = format!("L{CLASS};");
                register(CLASS, "<clinit>", "()V", clinit);
                register(CLASS, "valueOf", &format!("({DESCRIPTOR}){boxed_type}"), value_of);
                register(CLASS, "valueOf", &format!("(Ljava/lang/String;){boxed_type}"), value_of_string);
                register(CLASS, "valueOf", &format!("(Ljava/lang/String;I){boxed_type}"), value_of_radix);
                paste! {
                    register(CLASS, stringify!([<parse $name>]), &format!("(Ljava/lang/String;){DESCRIPTOR}"), parse);
                    register(CLASS, stringify!([<parse $name>]), &format!("(Ljava/lang/String;I){DESCRIPTOR}"), parse_radix);
                }
                register(CLASS, "toString", "()Ljava/lang/String;", to_string);
                register(CLASS, "toString", &format!("({DESCRIPTOR})Ljava/lang/String;"), to_string_static);
                register(CLASS, "toString", &format!("({DESCRIPTOR}I)Ljava/lang/String;"), to_string_radix);
                register(CLASS, "byteValue", "()B", byte_value);
                register(CLASS, "shortValue", "()S", short_value);
                register(CLASS, "intValue", "()I", int_value);
                register(CLASS, "longValue", "()J", long_value);
                register(CLASS, "floatValue", "()F", float_value);
                register(CLASS, "doubleValue", "()D", double_value);
                register(CLASS, "hashCode", "()I", hash_code);
                register(CLASS, "hashCode", &format!("({DESCRIPTOR})I"), hash_code_static);
                register(CLASS, "equals", "(Ljava/lang/Object;)Z", equals);
                register(CLASS, "compare", &format!("({DESCRIPTOR}{DESCRIPTOR})I"), compare);
                register(CLASS, "compareTo", &format!("({boxed_type})I"), compare_to);
                register(CLASS, "compareTo", "(Ljava/lang/Object;)I", compare_to);
            }
        }
    };
}

macro_rules! bit_ops {
    ($module:ident, $class:literal, $descriptor:literal, $rust:ty, $unsigned:ty) => {
        mod $module {
            use super::*;

            const CLASS: &str = $class;
            const DESCRIPTOR: &str = $descriptor;

            fn arg(args: &[Value], i: usize) -> NativeResult<$rust> {
                Ok(args[i].as_long()? as $rust)
            }

            fn wide(value: $rust) -> NativeReturn {
                Ok(Some(Value::long(value as i64)))
            }

            // public static String toHexString(t i)
            fn to_hex_string(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
                string_result(&format!("{:x}", arg(&args, 0)? as $unsigned))
            }

            // public static String toOctalString(t i)
            fn to_octal_string(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
                string_result(&format!("{:o}", arg(&args, 0)? as $unsigned))
            }

            // public static String toBinaryString(t i)
            fn to_binary_string(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
                string_result(&format!("{:b}", arg(&args, 0)? as $unsigned))
            }

            // public static int bitCount(t i)
            fn bit_count(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
                int_result(arg(&args, 0)?.count_ones() as i32)
            }

            // public static int numberOfLeadingZeros(t i)
            fn number_of_leading_zeros(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
                int_result(arg(&args, 0)?.leading_zeros() as i32)
            }

            // public static int numberOfTrailingZeros(t i)
            fn number_of_trailing_zeros(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
                int_result(arg(&args, 0)?.trailing_zeros() as i32)
            }

            // public static t highestOneBit(t i)
            fn highest_one_bit(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
                let value = arg(&args, 0)? as $unsigned;
                wide(if value == 0 { 0 } else { (1 as $unsigned).rotate_right(value.leading_zeros() + 1) as $rust })
            }

            // public static t lowestOneBit(t i)
            fn lowest_one_bit(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
                let value = arg(&args, 0)?;
                wide(value & value.wrapping_neg())
            }

            // public static t reverse(t i)
            fn reverse(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
                wide(arg(&args, 0)?.reverse_bits())
            }

            // public static t reverseBytes(t i)
            fn reverse_bytes(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
                wide(arg(&args, 0)?.swap_bytes())
            }

            // public static t rotateLeft(t i, int distance)
            fn rotate_left(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
                let distance = args[1].as_int()? as u32 % <$rust>::BITS;
                wide(arg(&args, 0)?.rotate_left(distance))
            }

            // public static t rotateRight(t i, int distance)
            fn rotate_right(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
                let distance = args[1].as_int()? as u32 % <$rust>::BITS;
                wide(arg(&args, 0)?.rotate_right(distance))
            }

            // public static int signum(t i)
            fn signum(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
                int_result(arg(&args, 0)?.signum() as i32)
            }

            // public static t max(t a, t b)
            fn max(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
                wide(arg(&args, 0)?.max(arg(&args, 1)?))
            }

            // public static t min(t a, t b)
            fn min(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
                wide(arg(&args, 0)?.min(arg(&args, 1)?))
            }

            // public static t sum(t a, t b)
            fn sum(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
                wide(arg(&args, 0)?.wrapping_add(arg(&args, 1)?))
            }

            // public static int compareUnsigned(t x, t y)
            fn compare_unsigned(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
                let x = arg(&args, 0)? as $unsigned;
                int_result(x.cmp(&(arg(&args, 1)? as $unsigned)) as i32)
            }

            pub(super) fn register_natives() {
                use mtable::register;

                let unary = format!("({DESCRIPTOR}){DESCRIPTOR}");
                let binary = format!("({DESCRIPTOR}{DESCRIPTOR}){DESCRIPTOR}");
                let shift = format!("({DESCRIPTOR}I){DESCRIPTOR}");
                let to_int = format!("({DESCRIPTOR})I");
                let to_string = format!("({DESCRIPTOR})Ljava/lang/String;");
                register(CLASS, "toHexString", &to_string, to_hex_string);
                register(CLASS, "toOctalString", &to_string, to_octal_string);
                register(CLASS, "toBinaryString", &to_string, to_binary_string);
                register(CLASS, "bitCount", &to_int, bit_count);
                register(CLASS, "numberOfLeadingZeros", &to_int, number_of_leading_zeros);
                register(CLASS, "numberOfTrailingZeros", &to_int, number_of_trailing_zeros);
                register(CLASS, "signum", &to_int, signum);
                register(CLASS, "highestOneBit", &unary, highest_one_bit);
                register(CLASS, "lowestOneBit", &unary, lowest_one_bit);
                register(CLASS, "reverse", &unary, reverse);
                register(CLASS, "reverseBytes", &unary, reverse_bytes);
                register(CLASS, "rotateLeft", &shift, rotate_left);
                register(CLASS, "rotateRight", &shift, rotate_right);
                register(CLASS, "max", &binary, max);
                register(CLASS, "min", &binary, min);
                register(CLASS, "sum", &binary, sum);
                register(CLASS, "compareUnsigned", &format!("({DESCRIPTOR}{DESCRIPTOR})I"), compare_unsigned);
            }
        }
    };
}

integral!(byte, Byte, "java/lang/Byte", "B", i8, "byte");
integral!(short, Short, "java/lang/Short", "S", i16, "short");
integral!(integer, Int, "java/lang/Integer", "I", i32, "int");
integral!(long, Long, "java/lang/Long", "J", i64, "long");
bit_ops!(integer_bits, "java/lang/Integer", "I", i32, u32);
bit_ops!(long_bits, "java/lang/Long", "J", i64, u64);

pub(super) fn register_natives() {
    byte::register_natives();
    short::register_natives();
    integer::register_natives();
    long::register_natives();
    integer_bits::register_natives();
    long_bits::register_natives();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn parse(s: &str, min: i64, max: i64) -> NativeResult<i64> {
        parse_integral(&heap::string_value(s), 10, min, max)
    }

    #[test]
    fn test_parse_bounds() {
        assert_eq!(parse("127", -128, 127).unwrap(), 127);
        assert_eq!(
            parse("128", -128, 127).unwrap_err().to_string(),
            "java.lang.NumberFormatException: Value out of range. Value:\"128\" Radix:10"
        );
        assert_eq!(parse("2147483647", i32::MIN as i64, i32::MAX as i64).unwrap(), 2147483647);
        assert_eq!(
            parse("2147483648", i32::MIN as i64, i32::MAX as i64)
                .unwrap_err()
                .to_string(),
            "java.lang.NumberFormatException: For input string: \"2147483648\""
        );
        assert_eq!(parse("-9223372036854775808", i64::MIN, i64::MAX).unwrap(), i64::MIN);
        assert!(parse("", i64::MIN, i64::MAX).is_err());
        assert!(parse("-", i64::MIN, i64::MAX).is_err());
        assert!(parse_integral(&Value::Null, 10, 0, 1).is_err());
    }

    #[test]
    fn test_round_trip_through_text() {
        for n in [0, 1, -1, 42, i32::MIN, i32::MAX] {
            let text = n.to_string();
            assert_eq!(parse(&text, i32::MIN as i64, i32::MAX as i64).unwrap(), n as i64);
        }
        let hex = parse_integral(&heap::string_value("-ff"), 16, i64::MIN, i64::MAX);
        assert_eq!(hex.unwrap(), -255);
    }

    #[test]
    fn test_radix_text() {
        assert_eq!(radix_text(255, 16), "ff");
        assert_eq!(radix_text(-8, 2), "-1000");
        assert_eq!(radix_text(i64::MIN, 10), i64::MIN.to_string());
        assert_eq!(radix_text(7, 99), "7");
    }

    #[test]
    fn test_box_cache() {
        let a = cached("java/lang/Integer", "I", 100, -128, 127);
        let b = cached("java/lang/Integer", "I", 100, -128, 127);
        assert!(Arc::ptr_eq(&a, &b));
        let c = cached("java/lang/Integer", "I", 1000, -128, 127);
        let d = cached("java/lang/Integer", "I", 1000, -128, 127);
        assert!(!Arc::ptr_eq(&c, &d));
        assert!(!Arc::ptr_eq(&a, &cached("java/lang/Long", "J", 100, -128, 127)));
    }
}
