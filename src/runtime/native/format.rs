use bitflags::bitflags;

use super::display;
use crate::{
    descriptor::FieldType,
    runtime::{
        Exception, FieldValue, NativeResult, ObjectRef, Value, heap, thread::ThreadContext,
    },
};

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
    struct Flags: u8 {
        const LEFT = 1 << 0;
        const ALTERNATE = 1 << 1;
        const PLUS = 1 << 2;
        const SPACE = 1 << 3;
        const ZERO = 1 << 4;
        const GROUP = 1 << 5;
        const PAREN = 1 << 6;
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Index {
    Next,
    Explicit(usize),
    Previous,
}

#[derive(Debug)]
struct Specifier {
    /// as written, for error messages
    text: String,
    index: Index,
    flags: Flags,
    width: Option<usize>,
    precision: Option<usize>,
    conversion: char,
}

impl Specifier {
    fn takes_argument(&self) -> bool {
        !matches!(self.conversion, 'n' | '%')
    }
}

enum Piece {
    Literal(String),
    Specifier(Specifier),
}

/// Elements of an `Object...` parameter; a null array counts as no arguments.
pub(super) fn varargs(array: &Value) -> NativeResult<Vec<Option<ObjectRef>>> {
    let Some(array) = array.as_ref()? else {
        return Ok(Vec::new());
    };
    Ok(array
        .with_array(|v| match v {
            FieldValue::Refs(refs) => refs.clone(),
            _ => Vec::new(),
        })
        .unwrap_or_default())
}

fn unknown_conversion(conversion: char) -> Exception {
    Exception::with_message(
        "java/util/UnknownFormatConversionException",
        format!("Conversion = '{conversion}'"),
    )
}

fn digits(chars: &[char], pos: &mut usize) -> Option<usize> {
    let start = *pos;
    while *pos < chars.len() && chars[*pos].is_ascii_digit() {
        *pos += 1;
    }
    if *pos == start {
        return None;
    }
    chars[start..*pos].iter().collect::<String>().parse().ok()
}

fn parse(pattern: &str) -> NativeResult<Vec<Piece>> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut pieces = Vec::new();
    let mut literal = String::new();
    let mut pos = 0;
    while pos < chars.len() {
        if chars[pos] != '%' {
            literal.push(chars[pos]);
            pos += 1;
            continue;
        }
        if !literal.is_empty() {
            pieces.push(Piece::Literal(std::mem::take(&mut literal)));
        }
        let start = pos;
        pos += 1;

        let mut index = Index::Next;
        let rewind = pos;
        match digits(&chars, &mut pos) {
            Some(n) if chars.get(pos) == Some(&'$') => {
                pos += 1;
                index = Index::Explicit(n);
            }
            _ => pos = rewind,
        }

        let mut flags = Flags::empty();
        while let Some(c) = chars.get(pos) {
            let flag = match c {
                '-' => Flags::LEFT,
                '#' => Flags::ALTERNATE,
                '+' => Flags::PLUS,
                ' ' => Flags::SPACE,
                '0' => Flags::ZERO,
                ',' => Flags::GROUP,
                '(' => Flags::PAREN,
                '<' => {
                    index = Index::Previous;
                    pos += 1;
                    continue;
                }
                _ => break,
            };
            flags |= flag;
            pos += 1;
        }

        let width = digits(&chars, &mut pos);
        let precision = if chars.get(pos) == Some(&'.') {
            pos += 1;
            match digits(&chars, &mut pos) {
                Some(precision) => Some(precision),
                None => return Err(unknown_conversion('.')),
            }
        } else {
            None
        };

        let Some(&conversion) = chars.get(pos) else {
            return Err(unknown_conversion('%'));
        };
        pos += 1;
        if !"bBhHsScCdoxXeEfn%".contains(conversion) {
            return Err(unknown_conversion(conversion));
        }
        pieces.push(Piece::Specifier(Specifier {
            text: chars[start..pos].iter().collect(),
            index,
            flags,
            width,
            precision,
            conversion,
        }));
    }
    if !literal.is_empty() {
        pieces.push(Piece::Literal(literal));
    }
    Ok(pieces)
}

/// Expands `pattern` against `args`.
pub(super) fn format(
    ctx: &mut ThreadContext,
    pattern: &str,
    args: &[Option<ObjectRef>],
) -> NativeResult<String> {
    let mut out = String::new();
    let mut next = 0;
    let mut last: Option<usize> = None;
    for piece in parse(pattern)? {
        let spec = match piece {
            Piece::Literal(text) => {
                out.push_str(&text);
                continue;
            }
            Piece::Specifier(spec) => spec,
        };
        let arg = if spec.takes_argument() {
            let position = match spec.index {
                Index::Next => {
                    next += 1;
                    Some(next - 1)
                }
                Index::Explicit(n) => n.checked_sub(1),
                Index::Previous => last,
            };
            match position.filter(|p| *p < args.len()) {
                Some(position) => {
                    last = Some(position);
                    args[position].clone()
                }
                None => {
                    return Err(Exception::with_message(
                        "java/util/MissingFormatArgumentException",
                        format!("Format specifier '{}'", spec.text),
                    ));
                }
            }
        } else {
            None
        };
        out.push_str(&convert(ctx, &spec, arg.as_ref())?);
    }
    Ok(out)
}

fn mismatch(spec: &Specifier, arg: &ObjectRef) -> Exception {
    Exception::with_message(
        "java/util/IllegalFormatConversionException",
        format!(
            "{} != {}",
            spec.conversion.to_ascii_lowercase(),
            arg.class_name().replace('/', ".")
        ),
    )
}

fn convert(ctx: &mut ThreadContext, spec: &Specifier, arg: Option<&ObjectRef>) -> NativeResult<String> {
    let text = match spec.conversion.to_ascii_lowercase() {
        'n' => return Ok("\n".to_string()),
        '%' => justify(spec, "%".to_string()),
        'b' => {
            let truth = match arg {
                None => false,
                Some(arg) => match heap::unbox(arg) {
                    Some((FieldType::Boolean, value)) => value.as_bool()?,
                    _ => true,
                },
            };
            justify(spec, truncate(spec, truth.to_string()))
        }
        'h' => {
            let text = match arg {
                None => "null".to_string(),
                Some(arg) => {
                    let hash = super::call_virtual(ctx, arg, "hashCode", "()I", Vec::new())?
                        .unwrap_or_default()
                        .as_int()?;
                    format!("{:x}", hash as u32)
                }
            };
            justify(spec, truncate(spec, text))
        }
        's' => justify(spec, truncate(spec, display(ctx, arg)?)),
        'c' => justify(spec, character(spec, arg)?),
        'd' | 'o' | 'x' => match arg {
            None => justify(spec, "null".to_string()),
            Some(arg) => integral(spec, arg)?,
        },
        'e' | 'f' => match arg {
            None => justify(spec, "null".to_string()),
            Some(arg) => floating(spec, arg)?,
        },
        other => return Err(unknown_conversion(other)),
    };
    Ok(if spec.conversion.is_ascii_uppercase() {
        text.to_uppercase()
    } else {
        text
    })
}

fn truncate(spec: &Specifier, text: String) -> String {
    match spec.precision {
        Some(precision) => text.chars().take(precision).collect(),
        None => text,
    }
}

fn justify(spec: &Specifier, text: String) -> String {
    let width = spec.width.unwrap_or(0);
    let len = text.chars().count();
    if len >= width {
        return text;
    }
    let padding = " ".repeat(width - len);
    if spec.flags.contains(Flags::LEFT) {
        text + &padding
    } else {
        padding + &text
    }
}

fn character(spec: &Specifier, arg: Option<&ObjectRef>) -> NativeResult<String> {
    let Some(arg) = arg else {
        return Ok("null".to_string());
    };
    let code_point = match heap::unbox(arg) {
        Some((FieldType::Char | FieldType::Byte | FieldType::Short | FieldType::Int, value)) => {
            value.as_int()?
        }
        _ => return Err(mismatch(spec, arg)),
    };
    match u32::try_from(code_point).ok().and_then(char::from_u32) {
        Some(c) => Ok(c.to_string()),
        None => Err(Exception::with_message(
            "java/util/IllegalFormatCodePointException",
            format!("Code point = {code_point:#x}"),
        )),
    }
}

fn group(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Applies sign flags, zero padding and justification to a number.
fn finish_number(spec: &Specifier, negative: bool, prefix: &str, digits: &str) -> String {
    let flags = spec.flags;
    let (sign, suffix) = if negative {
        if flags.contains(Flags::PAREN) { ("(", ")") } else { ("-", "") }
    } else if flags.contains(Flags::PLUS) {
        ("+", "")
    } else if flags.contains(Flags::SPACE) {
        (" ", "")
    } else {
        ("", "")
    };
    let mut text = format!("{sign}{prefix}");
    let used = text.len() + digits.len() + suffix.len();
    if flags.contains(Flags::ZERO) {
        let width = spec.width.unwrap_or(0);
        if width > used {
            text.push_str(&"0".repeat(width - used));
        }
    }
    text.push_str(digits);
    text.push_str(suffix);
    justify(spec, text)
}

fn integral(spec: &Specifier, arg: &ObjectRef) -> NativeResult<String> {
    let (value, bits) = match heap::unbox(arg) {
        Some((FieldType::Byte, v)) => (v.as_int()? as i64, 8),
        Some((FieldType::Short, v)) => (v.as_int()? as i64, 16),
        Some((FieldType::Int, v)) => (v.as_int()? as i64, 32),
        Some((FieldType::Long, v)) => (v.as_long()?, 64),
        _ => return Err(mismatch(spec, arg)),
    };
    if spec.conversion == 'd' {
        let magnitude = value.unsigned_abs().to_string();
        let magnitude = if spec.flags.contains(Flags::GROUP) {
            group(&magnitude)
        } else {
            magnitude
        };
        return Ok(finish_number(spec, value < 0, "", &magnitude));
    }
    // two's complement in the width of the argument type
    let unsigned = if bits == 64 {
        value as u64
    } else {
        (value as u64) & ((1u64 << bits) - 1)
    };
    let alternate = spec.flags.contains(Flags::ALTERNATE);
    let (prefix, digits) = match spec.conversion.to_ascii_lowercase() {
        'o' => (if alternate { "0" } else { "" }, format!("{unsigned:o}")),
        _ => (if alternate { "0x" } else { "" }, format!("{unsigned:x}")),
    };
    Ok(finish_number(spec, false, prefix, &digits))
}

fn floating(spec: &Specifier, arg: &ObjectRef) -> NativeResult<String> {
    let value = match heap::unbox(arg) {
        Some((FieldType::Float | FieldType::Double, v)) => v.as_double()?,
        _ => return Err(mismatch(spec, arg)),
    };
    if value.is_nan() {
        return Ok(justify(spec, "NaN".to_string()));
    }
    let negative = value.is_sign_negative();
    if value.is_infinite() {
        let text = match (negative, spec.flags.contains(Flags::PAREN)) {
            (true, true) => "(Infinity)",
            (true, false) => "-Infinity",
            (false, _) if spec.flags.contains(Flags::PLUS) => "+Infinity",
            (false, _) => "Infinity",
        };
        return Ok(justify(spec, text.to_string()));
    }
    let precision = spec.precision.unwrap_or(6);
    let mut digits = if spec.conversion == 'f' {
        let (int_part, frac) = fixed(value.abs(), precision);
        let int_part = if spec.flags.contains(Flags::GROUP) {
            group(&int_part)
        } else {
            int_part
        };
        if frac.is_empty() {
            int_part
        } else {
            format!("{int_part}.{frac}")
        }
    } else {
        scientific(value.abs(), precision)
    };
    if precision == 0 && spec.flags.contains(Flags::ALTERNATE) && spec.conversion == 'f' {
        digits.push('.');
    }
    Ok(finish_number(spec, negative, "", &digits))
}

/// Shortest round-trip digits of a finite non-negative `v` and the position
/// of the decimal point relative to the first digit.
fn shortest_digits(v: f64) -> (Vec<u8>, i32) {
    let text = format!("{v:e}");
    let (mantissa, exponent) = text.split_once('e').unwrap_or((&text, "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let digits = mantissa
        .bytes()
        .filter(u8::is_ascii_digit)
        .map(|b| b - b'0')
        .collect();
    (digits, exponent + 1)
}

/// Keeps `keep` digits, rounding half-up; `true` when the carry ran off the
/// front (all nines).
fn round_half_up(digits: &mut Vec<u8>, keep: usize) -> bool {
    if digits.len() < keep {
        digits.resize(keep, 0);
        return false;
    }
    let round_up = digits.get(keep).is_some_and(|d| *d >= 5);
    digits.truncate(keep);
    if !round_up {
        return false;
    }
    for digit in digits.iter_mut().rev() {
        if *digit == 9 {
            *digit = 0;
        } else {
            *digit += 1;
            return false;
        }
    }
    true
}

fn digit_text(digits: &[u8]) -> String {
    digits.iter().map(|d| char::from(b'0' + d)).collect()
}

/// `%f`: integer and fraction digits of `v` with `precision` decimals.
fn fixed(v: f64, precision: usize) -> (String, String) {
    let (mut digits, point) = shortest_digits(v);
    let mut point = if point <= 0 {
        let zeros = (1 - point) as usize;
        digits.splice(0..0, std::iter::repeat_n(0, zeros));
        1
    } else {
        point as usize
    };
    if round_half_up(&mut digits, point + precision) {
        digits.insert(0, 1);
        point += 1;
    }
    let (int_part, frac) = digits.split_at(point);
    (digit_text(int_part), digit_text(frac))
}

fn scientific(v: f64, precision: usize) -> String {
    let (mut digits, point) = shortest_digits(v);
    let mut exponent = if v == 0.0 { 0 } else { point - 1 };
    if round_half_up(&mut digits, precision + 1) {
        digits.insert(0, 1);
        digits.truncate(precision + 1);
        exponent += 1;
    }
    let mut text = digit_text(&digits[..1]);
    if precision > 0 {
        text.push('.');
        text.push_str(&digit_text(&digits[1..]));
    }
    let sign = if exponent < 0 { '-' } else { '+' };
    text.push_str(&format!("e{sign}{:02}", exponent.abs()));
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(v: i32) -> Option<ObjectRef> {
        Some(heap::primitive_object("java/lang/Integer", "I", Value::int(v)))
    }

    fn double(v: f64) -> Option<ObjectRef> {
        Some(heap::primitive_object("java/lang/Double", "D", Value::double(v)))
    }

    fn run(pattern: &str, args: &[Option<ObjectRef>]) -> NativeResult<String> {
        let mut ctx = ThreadContext::new();
        format(&mut ctx, pattern, args)
    }

    #[test]
    fn test_integers() {
        assert_eq!(run("%d|%5d|%-5d|%05d", &[int(42), int(42), int(42), int(-42)]).unwrap(), "42|   42|42   |-0042");
        assert_eq!(run("%,d %+d %(d", &[int(1234567), int(3), int(-3)]).unwrap(), "1,234,567 +3 (3)");
        assert_eq!(run("%x %X %#x %o", &[int(255), int(-1), int(255), int(8)]).unwrap(), "ff FFFFFFFF 0xff 10");
    }

    #[test]
    fn test_floats_round_half_up() {
        assert_eq!(run("%.2f", &[double(3.14159)]).unwrap(), "3.14");
        assert_eq!(run("%.1f %.0f", &[double(0.25), double(2.5)]).unwrap(), "0.3 3");
        assert_eq!(run("%f", &[double(1.0)]).unwrap(), "1.000000");
        assert_eq!(run("%.1f", &[double(0.96)]).unwrap(), "1.0");
        assert_eq!(run("%08.2f", &[double(-3.5)]).unwrap(), "-0003.50");
        assert_eq!(run("%,.2f", &[double(1234567.891)]).unwrap(), "1,234,567.89");
        assert_eq!(run("%.3e %E", &[double(12345.678), double(0.0)]).unwrap(), "1.235e+04 0.000000E+00");
        assert_eq!(run("%e", &[double(9.9999999)]).unwrap(), "1.000000e+01");
        assert_eq!(run("%f %5.1f", &[double(f64::NAN), double(f64::NEG_INFINITY)]).unwrap(), "NaN -Infinity");
    }

    #[test]
    fn test_strings_and_indices() {
        let s = Some(heap::string_object("abc"));
        assert_eq!(run("[%5s][%-5s][%.2s]", &[s.clone(), s.clone(), s.clone()]).unwrap(), "[  abc][abc  ][ab]");
        assert_eq!(run("%S %s", &[s.clone(), None]).unwrap(), "ABC null");
        let (a, b) = (Some(heap::string_object("a")), Some(heap::string_object("b")));
        assert_eq!(run("%2$s %1$s %<s", &[a, b]).unwrap(), "b a a");
        assert_eq!(run("%b %b %n%%", &[None, int(0)]).unwrap(), "false true \n%");
        let c = Some(heap::primitive_object("java/lang/Character", "C", Value::int('x' as i32)));
        assert_eq!(run("%c%c", &[c, int(0x1F600)]).unwrap(), "x\u{1F600}");
    }

    #[test]
    fn test_errors() {
        let missing = run("%s %s", &[Some(heap::string_object("only"))]).unwrap_err();
        assert_eq!(
            missing.to_string(),
            "java.util.MissingFormatArgumentException: Format specifier '%s'"
        );
        let unknown = run("%q", &[]).unwrap_err();
        assert_eq!(
            unknown.to_string(),
            "java.util.UnknownFormatConversionException: Conversion = 'q'"
        );
        let wrong = run("%d", &[Some(heap::string_object("x"))]).unwrap_err();
        assert_eq!(
            wrong.to_string(),
            "java.util.IllegalFormatConversionException: d != java.lang.String"
        );
    }
}
