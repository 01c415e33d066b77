use super::{
    NativeReturn, bool_result, display, double::double_text, float::float_text, format,
    string::{char_text, char_units},
};
use crate::runtime::{
    Exception, FieldValue, NativeResult, Object, ObjectRef, Value, console, heap,
    mtable::{self, NativeEnv},
};

const CLASS: &str = "java/io/PrintStream";
const FD: &str = "$fd";

/// A stream writing to `fd` (1 for out, 2 for err).
pub(super) fn stream(fd: i64) -> ObjectRef {
    let stream = heap::object_with_class_name(CLASS);
    stream.set(FD, "J", Value::long(fd));
    stream
}

/// Target of a stream created by [`stream`]; standard output otherwise.
pub(super) fn fd_of(stream: &Object) -> i64 {
    stream.get_int(FD).unwrap_or(1)
}

fn emit(args: &[Value], text: &str, newline: bool) -> NativeReturn {
    let fd = fd_of(&*args[0].as_object()?);
    if newline {
        let mut line = String::with_capacity(text.len() + 1);
        line.push_str(text);
        line.push('\n');
        console::write_fd(fd, line.as_bytes());
    } else {
        console::write_fd(fd, text.as_bytes());
    }
    Ok(None)
}

/// `print(x)` and `println(x)` for one parameter type.
macro_rules! printers {
    ($($print:ident, $println:ident, |$env:ident, $arg:ident| $text:expr;)*) => {
        $(
            fn $print($env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
                let $arg = &args[1];
                let text: String = $text;
                emit(&args, &text, false)
            }

            fn $println($env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
                let $arg = &args[1];
                let text: String = $text;
                emit(&args, &text, true)
            }
        )*
    };
}

printers! {
    print_boolean, println_boolean, |_env, v| (if v.as_bool()? { "true" } else { "false" }).to_string();
    print_char, println_char, |_env, v| char_text(v.as_int()?);
    print_int, println_int, |_env, v| v.as_int()?.to_string();
    print_long, println_long, |_env, v| v.as_long()?.to_string();
    print_float, println_float, |_env, v| float_text(v.as_float()?);
    print_double, println_double, |_env, v| double_text(v.as_double()?);
    print_chars, println_chars, |_env, v| String::from_utf16_lossy(&char_units(&*v.as_object()?)?);
    print_string, println_string, |_env, v| heap::rust_string_or_null(v)?;
    print_object, println_object, |env, v| display(env.ctx()?, v.as_ref()?.as_ref())?;
}

// public void println()
fn println(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    emit(&args, "", true)
}

// public PrintStream printf(String format, Object... args)
fn printf(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let pattern = super::string_arg(&args[1])?;
    let values = format::varargs(&args[2])?;
    let text = format::format(env.ctx()?, &pattern, &values)?;
    emit(&args, &text, false)?;
    Ok(Some(args[0].clone()))
}

// public void write(int b)
fn write_byte(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let fd = fd_of(&*args[0].as_object()?);
    console::write_fd(fd, &[args[1].as_int()? as u8]);
    Ok(None)
}

fn bytes_of(array: &Value) -> NativeResult<Vec<u8>> {
    Ok(array
        .as_object()?
        .with_array(|v| match v {
            FieldValue::Bytes(bytes) => bytes.iter().map(|b| *b as u8).collect(),
            _ => Vec::new(),
        })
        .unwrap_or_default())
}

// public void write(byte[] buf, int off, int len)
fn write_bytes_range(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let bytes = bytes_of(&args[1])?;
    let (off, len) = (args[2].as_int()?, args[3].as_int()?);
    if off < 0 || len < 0 || off as usize + len as usize > bytes.len() {
        return Err(Exception::with_message(
            "java/lang/IndexOutOfBoundsException",
            format!("Range [{off}, {off} + {len}) out of bounds for length {}", bytes.len()),
        ));
    }
    let fd = fd_of(&*args[0].as_object()?);
    console::write_fd(fd, &bytes[off as usize..(off + len) as usize]);
    Ok(None)
}

// public void write(byte[] buf)
fn write_bytes(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let bytes = bytes_of(&args[1])?;
    let fd = fd_of(&*args[0].as_object()?);
    console::write_fd(fd, &bytes);
    Ok(None)
}

// public void flush()
fn flush(_: &mut NativeEnv, _: Vec<Value>) -> NativeReturn {
    console::flush();
    Ok(None)
}

// public boolean checkError()
fn check_error(_: &mut NativeEnv, _: Vec<Value>) -> NativeReturn {
    console::flush();
    bool_result(false)
}

pub(super) fn register_natives() {
    use mtable::{register, register_ctx};

    let printers: [(&str, mtable::GFunction, mtable::GFunction); 8] = [
        ("Z", print_boolean, println_boolean),
        ("C", print_char, println_char),
        ("I", print_int, println_int),
        ("J", print_long, println_long),
        ("F", print_float, println_float),
        ("D", print_double, println_double),
        ("[C", print_chars, println_chars),
        ("Ljava/lang/String;", print_string, println_string),
    ];
    for (param, print, println) in printers {
        register(CLASS, "print", &format!("({param})V"), print);
        register(CLASS, "println", &format!("({param})V"), println);
    }
    register_ctx(CLASS, "print", "(Ljava/lang/Object;)V", print_object);
    register_ctx(CLASS, "println", "(Ljava/lang/Object;)V", println_object);
    register(CLASS, "println", "()V", println);
    let printf_descriptor = "(Ljava/lang/String;[Ljava/lang/Object;)Ljava/io/PrintStream;";
    register_ctx(CLASS, "printf", printf_descriptor, printf);
    register_ctx(CLASS, "format", printf_descriptor, printf);
    register(CLASS, "write", "(I)V", write_byte);
    register(CLASS, "write", "([BII)V", write_bytes_range);
    register(CLASS, "write", "([B)V", write_bytes);
    register(CLASS, "flush", "()V", flush);
    register(CLASS, "close", "()V", flush);
    register(CLASS, "checkError", "()Z", check_error);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::console::Capture;

    #[test]
    fn test_println_goes_to_stream_target() {
        let capture = Capture::default();
        console::redirect(Some(capture.clone()));
        let mut env = NativeEnv::new(None);
        let out = Value::Ref(stream(1));
        let err = Value::Ref(stream(2));
        println_int(&mut env, vec![out.clone(), Value::int(42)]).unwrap();
        print_string(&mut env, vec![err.clone(), Value::Null]).unwrap();
        println_double(&mut env, vec![out, Value::double(0.5)]).unwrap();
        console::redirect(None);
        let output = capture.lock();
        assert_eq!(String::from_utf8_lossy(&output.out), "42\n0.5\n");
        assert_eq!(String::from_utf8_lossy(&output.err), "null");
    }
}
