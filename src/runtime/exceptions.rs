use std::sync::Arc;

use crate::runtime::{
    Exception, FieldValue, NativeResult, Object, ObjectRef, Value, class_loader, console, heap,
    inheritance, statics, thread::ThreadContext,
};

const ELEMENT_CLASS: &str = "java/lang/StackTraceElement";
const STRING: &str = "Ljava/lang/String;";

/// Turns an error into a Throwable object; VM faults and exits stay errors.
pub(crate) fn materialize(ctx: &mut ThreadContext, err: Exception) -> NativeResult<ObjectRef> {
    match err {
        Exception::Thrown(thrown) => Ok(thrown),
        Exception::Vm {
            class_name,
            message,
        } => new_throwable(ctx, &class_name, message.as_deref(), None),
        err => Err(err),
    }
}

/// Creates a Throwable of `class_name` with its stack trace filled in from
/// the current frames.
pub(crate) fn new_throwable(
    ctx: &mut ThreadContext,
    class_name: &str,
    message: Option<&str>,
    cause: Option<ObjectRef>,
) -> NativeResult<ObjectRef> {
    let class = class_loader::app().load(class_name)?;
    statics::initialize(ctx, &class)?;
    let throwable = heap::new_object(&class);
    set_message(&throwable, message);
    throwable.set("cause", "Ljava/lang/Throwable;", Value::reference(cause));
    fill_in_stack_trace(ctx, &throwable)?;
    Ok(throwable)
}

pub(crate) fn set_message(throwable: &Object, message: Option<&str>) {
    throwable.set(
        "detailMessage",
        STRING,
        Value::reference(message.map(heap::string_object)),
    );
}

pub(crate) fn message(throwable: &Object) -> NativeResult<Option<String>> {
    match throwable.get_ref("detailMessage") {
        Some(message) => Ok(Some(heap::rust_string(&message)?)),
        None => Ok(None),
    }
}

/// Records the thread's frames into `stackTrace`, innermost first. Frames of
/// the throwable's own constructors are left out.
pub(crate) fn fill_in_stack_trace(ctx: &ThreadContext, throwable: &ObjectRef) -> NativeResult<()> {
    let class = heap::class_of(throwable)?;
    let mut elements = Vec::with_capacity(ctx.frames.len());
    let mut in_constructors = true;
    for frame in &ctx.frames {
        if in_constructors
            && frame.method.name.as_ref() == "<init>"
            && inheritance::is_subclass_named(&class, &frame.class.name)
        {
            continue;
        }
        in_constructors = false;
        let line = frame.line_number().map_or(-1, i32::from);
        let element = stack_trace_element(
            &frame.class,
            &frame.method.name,
            if frame.method.is_native() { -2 } else { line },
        );
        elements.push(Some(element));
    }
    throwable.set(
        "stackTrace",
        "[Ljava/lang/StackTraceElement;",
        Value::Ref(heap::ref_array_from(ELEMENT_CLASS, elements)),
    );
    Ok(())
}

fn stack_trace_element(class: &crate::runtime::Class, method: &str, line: i32) -> ObjectRef {
    let element = heap::object_with_class_name(ELEMENT_CLASS);
    let string_or_null = |s: Option<&str>| Value::reference(s.map(heap::string_object));
    element.set(
        "declaringClass",
        STRING,
        heap::string_value(&class.name.replace('/', ".")),
    );
    element.set("methodName", STRING, heap::string_value(method));
    element.set("fileName", STRING, string_or_null(class.source_file.as_deref()));
    element.set("lineNumber", "I", Value::int(line));
    element.set(
        "classLoaderName",
        STRING,
        string_or_null((class.loader != "bootstrap").then_some(class.loader)),
    );
    element.set("moduleName", STRING, string_or_null(class.module_name()));
    element
}

pub(crate) fn stack_trace(throwable: &Object) -> Vec<ObjectRef> {
    throwable
        .get_ref("stackTrace")
        .and_then(|array| {
            array.with_array(|elements| match elements {
                FieldValue::Refs(refs) => refs.iter().flatten().cloned().collect(),
                _ => Vec::new(),
            })
        })
        .unwrap_or_default()
}

fn string_field(object: &Object, name: &str) -> Option<String> {
    object
        .get_ref(name)
        .and_then(|s| heap::rust_string(&s).ok())
}

/// `StackTraceElement.toString()`: `java.base/java.lang.Integer.parseInt(Integer.java:652)`.
pub(crate) fn element_text(element: &Object) -> String {
    let mut text = String::new();
    if let Some(module) = string_field(element, "moduleName") {
        text.push_str(&module);
        text.push('/');
    }
    text.push_str(&string_field(element, "declaringClass").unwrap_or_default());
    text.push('.');
    text.push_str(&string_field(element, "methodName").unwrap_or_default());
    let line = element.get_int("lineNumber").unwrap_or(-1);
    let location = match (string_field(element, "fileName"), line) {
        (_, -2) => "Native Method".to_string(),
        (Some(file), line) if line >= 0 => format!("{file}:{line}"),
        (Some(file), _) => file,
        (None, _) => "Unknown Source".to_string(),
    };
    text.push('(');
    text.push_str(&location);
    text.push(')');
    text
}

/// `Throwable.toString()` for a Throwable whose `toString` is not overridden.
pub(crate) fn describe(throwable: &Object) -> NativeResult<String> {
    let name = throwable.class_name().replace('/', ".");
    Ok(match message(throwable)? {
        Some(message) => format!("{name}: {message}"),
        None => name,
    })
}

/// `printStackTrace()` text: the trace, then each cause with the frames it
/// shares with the enclosing trace folded into `... n more`.
pub(crate) fn stack_trace_text(throwable: &ObjectRef) -> NativeResult<String> {
    let mut text = String::new();
    let mut current = throwable.clone();
    let mut enclosing: Vec<String> = Vec::new();
    let mut seen: Vec<ObjectRef> = Vec::new();
    loop {
        let is_cause = !seen.is_empty();
        seen.push(current.clone());
        let frames: Vec<String> = stack_trace(&current)
            .iter()
            .map(|e| element_text(e))
            .collect();
        let in_common = frames
            .iter()
            .rev()
            .zip(enclosing.iter().rev())
            .take_while(|(a, b)| a == b)
            .count();
        if is_cause {
            text.push_str("Caused by: ");
        }
        text.push_str(&describe(&current)?);
        text.push('\n');
        for frame in &frames[..frames.len() - in_common] {
            text.push_str("\tat ");
            text.push_str(frame);
            text.push('\n');
        }
        if in_common > 0 {
            text.push_str(&format!("\t... {in_common} more\n"));
        }
        match current.get_ref("cause") {
            Some(cause) if !seen.iter().any(|s| Arc::ptr_eq(s, &cause)) => {
                enclosing = frames;
                current = cause;
            }
            _ => break,
        }
    }
    Ok(text)
}

pub(crate) fn uncaught(ctx: &mut ThreadContext, err: Exception) {
    let name = ctx.name();
    let text = match materialize(ctx, err) {
        Ok(thrown) => stack_trace_text(&thrown),
        Err(err) => Err(err),
    };
    let report = match text {
        Ok(text) => format!("Exception in thread \"{name}\" {text}"),
        Err(err) => {
            log::error!("thread {name} failed: {err}");
            format!("Exception in thread \"{name}\" {err}\n")
        }
    };
    console::write_err(report.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn throwable(class_name: &str, message: Option<&str>) -> ObjectRef {
        let mut ctx = ThreadContext::new();
        new_throwable(&mut ctx, class_name, message, None).unwrap()
    }

    #[test]
    fn test_materialize_vm_exception() {
        let mut ctx = ThreadContext::new();
        let thrown = materialize(
            &mut ctx,
            Exception::with_message("java/lang/ArithmeticException", "/ by zero"),
        )
        .unwrap();
        assert_eq!(thrown.class_name().as_ref(), "java/lang/ArithmeticException");
        assert_eq!(describe(&thrown).unwrap(), "java.lang.ArithmeticException: / by zero");
        assert!(stack_trace(&thrown).is_empty());
        assert!(materialize(&mut ctx, Exception::fatal("boom")).is_err());
        assert!(matches!(
            materialize(&mut ctx, Exception::Exit(3)),
            Err(Exception::Exit(3))
        ));
    }

    #[test]
    fn test_cause_chain_text() {
        let cause = throwable("java/lang/IllegalStateException", Some("inner"));
        let mut ctx = ThreadContext::new();
        let outer = new_throwable(&mut ctx, "java/lang/RuntimeException", None, Some(cause)).unwrap();
        let text = stack_trace_text(&outer).unwrap();
        assert_eq!(
            text,
            "java.lang.RuntimeException\nCaused by: java.lang.IllegalStateException: inner\n"
        );
    }

    #[test]
    fn test_element_text() {
        let string = class_loader::bootstrap().load("java/lang/String").unwrap();
        let element = stack_trace_element(&string, "charAt", -2);
        assert_eq!(element_text(&element), "java.base/java.lang.String.charAt(Native Method)");
        let element = stack_trace_element(&string, "length", 12);
        assert_eq!(element_text(&element), "java.base/java.lang.String.length(Unknown Source)");
    }

    #[test]
    fn test_uncaught_report() {
        let capture = console::Capture::default();
        console::redirect(Some(capture.clone()));
        let mut ctx = ThreadContext::new();
        uncaught(&mut ctx, Exception::with_message("java/lang/IllegalArgumentException", "bad"));
        console::redirect(None);
        let err = String::from_utf8(capture.lock().err.clone()).unwrap();
        assert_eq!(
            err,
            "Exception in thread \"main\" java.lang.IllegalArgumentException: bad\n"
        );
    }
}
