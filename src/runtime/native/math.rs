use std::{
    sync::atomic::{AtomicI64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use once_cell::sync::Lazy;

use super::{NativeReturn, int_result};
use crate::runtime::{
    Exception, NativeResult, Value,
    mtable::{self, NativeEnv},
    statics,
};

const MATH: &str = "java/lang/Math";
const STRICT_MATH: &str = "java/lang/StrictMath";

const MULTIPLIER: i64 = 0x5_DEEC_E66D;
const ADDEND: i64 = 0xB;
const MASK: i64 = (1 << 48) - 1;

/// `java.util.Random`'s 48-bit generator, seeded once from the clock.
static SEED: Lazy<AtomicI64> = Lazy::new(|| {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos() as i64);
    AtomicI64::new((nanos ^ MULTIPLIER) & MASK)
});

fn next_bits(bits: u32) -> i64 {
    let mut seed = SEED.load(Ordering::Relaxed);
    loop {
        let next = (seed.wrapping_mul(MULTIPLIER).wrapping_add(ADDEND)) & MASK;
        match SEED.compare_exchange_weak(seed, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next >> (48 - bits),
            Err(actual) => seed = actual,
        }
    }
}

fn next_double() -> f64 {
    ((next_bits(26) << 27) + next_bits(27)) as f64 * (1.0 / (1u64 << 53) as f64)
}

fn overflow(kind: &str) -> Exception {
    Exception::with_message("java/lang/ArithmeticException", format!("{kind} overflow"))
}

fn by_zero() -> Exception {
    Exception::with_message("java/lang/ArithmeticException", "/ by zero")
}

fn int(args: &[Value], i: usize) -> NativeResult<i32> {
    args[i].as_int()
}

fn long(args: &[Value], i: usize) -> NativeResult<i64> {
    args[i].as_long()
}

fn float(args: &[Value], i: usize) -> NativeResult<f32> {
    args[i].as_float()
}

fn double(args: &[Value], i: usize) -> NativeResult<f64> {
    args[i].as_double()
}

fn long_result(v: i64) -> NativeReturn {
    Ok(Some(Value::long(v)))
}

fn float_result(v: f32) -> NativeReturn {
    Ok(Some(Value::float(v)))
}

fn double_result(v: f64) -> NativeReturn {
    Ok(Some(Value::double(v)))
}

/// `Math.max` for floating point: NaN wins, and `+0.0` beats `-0.0`.
fn java_max(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else if a == 0.0 && b == 0.0 {
        if a.is_sign_positive() { a } else { b }
    } else {
        a.max(b)
    }
}

fn java_min(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else if a == 0.0 && b == 0.0 {
        if a.is_sign_negative() { a } else { b }
    } else {
        a.min(b)
    }
}

/// `Math.round(double)`: floor of `x + 0.5`, saturating; NaN rounds to 0.
fn round_double(x: f64) -> i64 {
    if x.is_nan() {
        0
    } else {
        (x + 0.5).floor() as i64
    }
}

fn round_float(x: f32) -> i32 {
    if x.is_nan() {
        0
    } else {
        (x as f64 + 0.5).floor() as i32
    }
}

/// Round half to even, as `Math.rint` does.
fn rint(x: f64) -> f64 {
    let rounded = x.round();
    if (x - x.trunc()).abs() == 0.5 {
        2.0 * (x / 2.0).round()
    } else {
        rounded
    }
}

macro_rules! double_unary {
    ($($name:ident => $op:expr),* $(,)?) => {
        $(
            fn $name(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
                let f: fn(f64) -> f64 = $op;
                double_result(f(double(&args, 0)?))
            }
        )*
    };
}

double_unary! {
    sqrt => f64::sqrt,
    cbrt => f64::cbrt,
    exp => f64::exp,
    expm1 => f64::exp_m1,
    log => f64::ln,
    log10 => f64::log10,
    log1p => f64::ln_1p,
    sin => f64::sin,
    cos => f64::cos,
    tan => f64::tan,
    asin => f64::asin,
    acos => f64::acos,
    atan => f64::atan,
    sinh => f64::sinh,
    cosh => f64::cosh,
    tanh => f64::tanh,
    floor => f64::floor,
    ceil => f64::ceil,
    rint_double => rint,
    abs_double => f64::abs,
    to_radians => f64::to_radians,
    to_degrees => f64::to_degrees,
    signum_double => |x| if x == 0.0 || x.is_nan() { x } else { x.signum() },
}

// public static double pow(double a, double b)
fn pow(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    double_result(double(&args, 0)?.powf(double(&args, 1)?))
}

// public static double atan2(double y, double x)
fn atan2(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    double_result(double(&args, 0)?.atan2(double(&args, 1)?))
}

// public static double hypot(double x, double y)
fn hypot(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    double_result(double(&args, 0)?.hypot(double(&args, 1)?))
}

// public static double IEEEremainder(double f1, double f2)
fn ieee_remainder(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let (x, y) = (double(&args, 0)?, double(&args, 1)?);
    double_result(x - y * rint(x / y))
}

// public static int abs(int a)
fn abs_int(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    int_result(int(&args, 0)?.wrapping_abs())
}

// public static long abs(long a)
fn abs_long(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    long_result(long(&args, 0)?.wrapping_abs())
}

// public static float abs(float a)
fn abs_float(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    float_result(float(&args, 0)?.abs())
}

// public static int max(int a, int b)
fn max_int(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    int_result(int(&args, 0)?.max(int(&args, 1)?))
}

// public static int min(int a, int b)
fn min_int(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    int_result(int(&args, 0)?.min(int(&args, 1)?))
}

// public static long max(long a, long b)
fn max_long(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    long_result(long(&args, 0)?.max(long(&args, 1)?))
}

// public static long min(long a, long b)
fn min_long(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    long_result(long(&args, 0)?.min(long(&args, 1)?))
}

// public static float max(float a, float b)
fn max_float(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    float_result(java_max(float(&args, 0)? as f64, float(&args, 1)? as f64) as f32)
}

// public static float min(float a, float b)
fn min_float(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    float_result(java_min(float(&args, 0)? as f64, float(&args, 1)? as f64) as f32)
}

// public static double max(double a, double b)
fn max_double(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    double_result(java_max(double(&args, 0)?, double(&args, 1)?))
}

// public static double min(double a, double b)
fn min_double(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    double_result(java_min(double(&args, 0)?, double(&args, 1)?))
}

// public static long round(double a)
fn round_d(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    long_result(round_double(double(&args, 0)?))
}

// public static int round(float a)
fn round_f(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    int_result(round_float(float(&args, 0)?))
}

// public static float signum(float f)
fn signum_float(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let x = float(&args, 0)?;
    float_result(if x == 0.0 || x.is_nan() { x } else { x.signum() })
}

// public static int floorDiv(int x, int y)
fn floor_div_int(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let (x, y) = (int(&args, 0)?, int(&args, 1)?);
    if y == 0 {
        return Err(by_zero());
    }
    int_result(x.wrapping_div(y) - ((x.wrapping_rem(y) != 0) && ((x ^ y) < 0)) as i32)
}

// public static int floorMod(int x, int y)
fn floor_mod_int(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let (x, y) = (int(&args, 0)?, int(&args, 1)?);
    if y == 0 {
        return Err(by_zero());
    }
    let m = x.wrapping_rem(y);
    int_result(if m != 0 && ((m ^ y) < 0) { m + y } else { m })
}

// public static long floorDiv(long x, long y)
fn floor_div_long(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let (x, y) = (long(&args, 0)?, long(&args, 1)?);
    if y == 0 {
        return Err(by_zero());
    }
    long_result(x.wrapping_div(y) - ((x.wrapping_rem(y) != 0) && ((x ^ y) < 0)) as i64)
}

// public static long floorMod(long x, long y)
fn floor_mod_long(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let (x, y) = (long(&args, 0)?, long(&args, 1)?);
    if y == 0 {
        return Err(by_zero());
    }
    let m = x.wrapping_rem(y);
    long_result(if m != 0 && ((m ^ y) < 0) { m + y } else { m })
}

macro_rules! exact {
    ($($name:ident, $arg:ident, $result:ident, $op:ident, $kind:literal;)*) => {
        $(
            fn $name(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
                $arg(&args, 0)?
                    .$op($arg(&args, 1)?)
                    .map_or_else(|| Err(overflow($kind)), $result)
            }
        )*
    };
}

exact! {
    add_exact_int, int, int_result, checked_add, "integer";
    subtract_exact_int, int, int_result, checked_sub, "integer";
    multiply_exact_int, int, int_result, checked_mul, "integer";
    add_exact_long, long, long_result, checked_add, "long";
    subtract_exact_long, long, long_result, checked_sub, "long";
    multiply_exact_long, long, long_result, checked_mul, "long";
}

// public static int negateExact(int a)
fn negate_exact_int(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    int(&args, 0)?.checked_neg().map_or_else(|| Err(overflow("integer")), int_result)
}

// public static long negateExact(long a)
fn negate_exact_long(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    long(&args, 0)?.checked_neg().map_or_else(|| Err(overflow("long")), long_result)
}

// public static int incrementExact(int a)
fn increment_exact_int(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    int(&args, 0)?.checked_add(1).map_or_else(|| Err(overflow("integer")), int_result)
}

// public static int decrementExact(int a)
fn decrement_exact_int(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    int(&args, 0)?.checked_sub(1).map_or_else(|| Err(overflow("integer")), int_result)
}

// public static int toIntExact(long value)
fn to_int_exact(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    i32::try_from(long(&args, 0)?).map_or_else(|_| Err(overflow("integer")), int_result)
}

// public static double random()
fn random(_: &mut NativeEnv, _: Vec<Value>) -> NativeReturn {
    double_result(next_double())
}

fn clinit_for(class: &str) {
    statics::set(class, "PI", "D", Value::double(std::f64::consts::PI));
    statics::set(class, "E", "D", Value::double(std::f64::consts::E));
}

fn clinit(_: &mut NativeEnv, _: Vec<Value>) -> NativeReturn {
    clinit_for(MATH);
    Ok(None)
}

fn strict_clinit(_: &mut NativeEnv, _: Vec<Value>) -> NativeReturn {
    clinit_for(STRICT_MATH);
    Ok(None)
}

pub(super) fn register_natives() {
    use mtable::register;

    register(MATH, "<clinit>", "()V", clinit);
    register(STRICT_MATH, "<clinit>", "()V", strict_clinit);
    for class in [MATH, STRICT_MATH] {
        let unary = [
            ("sqrt", sqrt as mtable::GFunction),
            ("cbrt", cbrt),
            ("exp", exp),
            ("expm1", expm1),
            ("log", log),
            ("log10", log10),
            ("log1p", log1p),
            ("sin", sin),
            ("cos", cos),
            ("tan", tan),
            ("asin", asin),
            ("acos", acos),
            ("atan", atan),
            ("sinh", sinh),
            ("cosh", cosh),
            ("tanh", tanh),
            ("floor", floor),
            ("ceil", ceil),
            ("rint", rint_double),
            ("abs", abs_double),
            ("toRadians", to_radians),
            ("toDegrees", to_degrees),
            ("signum", signum_double),
        ];
        for (name, function) in unary {
            register(class, name, "(D)D", function);
        }
        register(class, "pow", "(DD)D", pow);
        register(class, "atan2", "(DD)D", atan2);
        register(class, "hypot", "(DD)D", hypot);
        register(class, "IEEEremainder", "(DD)D", ieee_remainder);
        register(class, "abs", "(I)I", abs_int);
        register(class, "abs", "(J)J", abs_long);
        register(class, "abs", "(F)F", abs_float);
        register(class, "max", "(II)I", max_int);
        register(class, "min", "(II)I", min_int);
        register(class, "max", "(JJ)J", max_long);
        register(class, "min", "(JJ)J", min_long);
        register(class, "max", "(FF)F", max_float);
        register(class, "min", "(FF)F", min_float);
        register(class, "max", "(DD)D", max_double);
        register(class, "min", "(DD)D", min_double);
        register(class, "round", "(D)J", round_d);
        register(class, "round", "(F)I", round_f);
        register(class, "signum", "(F)F", signum_float);
        register(class, "floorDiv", "(II)I", floor_div_int);
        register(class, "floorMod", "(II)I", floor_mod_int);
        register(class, "floorDiv", "(JJ)J", floor_div_long);
        register(class, "floorMod", "(JJ)J", floor_mod_long);
        register(class, "addExact", "(II)I", add_exact_int);
        register(class, "subtractExact", "(II)I", subtract_exact_int);
        register(class, "multiplyExact", "(II)I", multiply_exact_int);
        register(class, "addExact", "(JJ)J", add_exact_long);
        register(class, "subtractExact", "(JJ)J", subtract_exact_long);
        register(class, "multiplyExact", "(JJ)J", multiply_exact_long);
        register(class, "negateExact", "(I)I", negate_exact_int);
        register(class, "negateExact", "(J)J", negate_exact_long);
        register(class, "incrementExact", "(I)I", increment_exact_int);
        register(class, "decrementExact", "(I)I", decrement_exact_int);
        register(class, "toIntExact", "(J)I", to_int_exact);
        register(class, "random", "()D", random);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounding() {
        assert_eq!(round_double(2.5), 3);
        assert_eq!(round_double(-2.5), -2);
        assert_eq!(round_double(f64::NAN), 0);
        assert_eq!(round_double(1e300), i64::MAX);
        assert_eq!(round_float(-0.5), 0);
        assert_eq!(rint(2.5), 2.0);
        assert_eq!(rint(3.5), 4.0);
        assert_eq!(rint(-2.5), -2.0);
        assert_eq!(rint(2.4), 2.0);
    }

    #[test]
    fn test_min_max_zero_and_nan() {
        assert!(java_max(-0.0, 0.0).is_sign_positive());
        assert!(java_min(0.0, -0.0).is_sign_negative());
        assert!(java_max(1.0, f64::NAN).is_nan());
    }

    #[test]
    fn test_random_in_unit_interval() {
        for _ in 0..1000 {
            let r = next_double();
            assert!((0.0..1.0).contains(&r));
        }
    }
}
