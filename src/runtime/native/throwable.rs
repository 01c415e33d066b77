use std::sync::Arc;

use super::{NativeReturn, bool_result, call_virtual, display, int_result, print_stream, string_result};
use crate::runtime::{
    Exception, FieldValue, NativeResult, ObjectRef, Value, console, exceptions, heap,
    mtable::{self, NativeEnv},
    thread::ThreadContext,
};

const CLASS: &str = "java/lang/Throwable";
const ELEMENT: &str = "java/lang/StackTraceElement";
const THROWABLE_TYPE: &str = "Ljava/lang/Throwable;";
/// Set once a cause has been given, by a constructor or `initCause`.
const CAUSE_SET: &str = "$causeSet";

fn this(args: &[Value]) -> NativeResult<ObjectRef> {
    args[0].as_object()
}

fn construct(
    ctx: &mut ThreadContext,
    this: &ObjectRef,
    message: Option<String>,
    cause: Option<Option<ObjectRef>>,
) -> NativeReturn {
    exceptions::set_message(this, message.as_deref());
    if let Some(cause) = cause {
        this.set("cause", THROWABLE_TYPE, Value::reference(cause));
        this.set(CAUSE_SET, "Z", Value::boolean(true));
    }
    exceptions::fill_in_stack_trace(ctx, this)?;
    Ok(None)
}

fn optional_string(value: &Value) -> NativeResult<Option<String>> {
    match value.as_ref()? {
        Some(string) => Ok(Some(heap::rust_string(&string)?)),
        None => Ok(None),
    }
}

// public Throwable()
fn init(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    construct(env.ctx()?, &this(&args)?, None, None)
}

// public Throwable(String message)
fn init_message(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let message = optional_string(&args[1])?;
    construct(env.ctx()?, &this(&args)?, message, None)
}

// public Throwable(String message, Throwable cause)
fn init_message_cause(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let message = optional_string(&args[1])?;
    let cause = args[2].as_ref()?;
    construct(env.ctx()?, &this(&args)?, message, Some(cause))
}

// public Throwable(Throwable cause)
fn init_cause(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let cause = args[1].as_ref()?;
    let ctx = env.ctx()?;
    let message = match &cause {
        Some(cause) => Some(display(ctx, Some(cause))?),
        None => None,
    };
    construct(ctx, &this(&args)?, message, Some(cause))
}

// protected Throwable(String message, Throwable cause, boolean enableSuppression, boolean writableStackTrace)
fn init_full(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let this = this(&args)?;
    let message = optional_string(&args[1])?;
    let cause = args[2].as_ref()?;
    construct(env.ctx()?, &this, message, Some(cause))?;
    if !args[4].as_bool()? {
        this.set(
            "stackTrace",
            "[Ljava/lang/StackTraceElement;",
            Value::Ref(heap::ref_array_from(ELEMENT, Vec::new())),
        );
    }
    Ok(None)
}

// public String getMessage()
fn get_message(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    Ok(Some(this(&args)?.get("detailMessage").unwrap_or_default()))
}

// public String getLocalizedMessage()
fn get_localized_message(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let this = this(&args)?;
    call_virtual(env.ctx()?, &this, "getMessage", "()Ljava/lang/String;", Vec::new())
}

// public synchronized Throwable getCause()
fn get_cause(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    Ok(Some(Value::reference(this(&args)?.get_ref("cause"))))
}

// public synchronized Throwable initCause(Throwable cause)
fn init_cause_once(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let this = this(&args)?;
    let cause = args[1].as_ref()?;
    if this.get_int(CAUSE_SET).unwrap_or(0) != 0 {
        let current = match this.get_ref("cause") {
            Some(current) => display(env.ctx()?, Some(&current))?,
            None => "a null".to_string(),
        };
        return Err(Exception::with_message(
            "java/lang/IllegalStateException",
            format!("Can't overwrite cause with {current}"),
        ));
    }
    if cause.as_ref().is_some_and(|c| Arc::ptr_eq(c, &this)) {
        return Err(Exception::with_message(
            "java/lang/IllegalArgumentException",
            "Self-causation not permitted",
        ));
    }
    this.set("cause", THROWABLE_TYPE, Value::reference(cause));
    this.set(CAUSE_SET, "Z", Value::boolean(true));
    Ok(Some(Value::Ref(this)))
}

// public String toString()
fn to_string(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let this = this(&args)?;
    let name = this.class_name().replace('/', ".");
    let message = call_virtual(
        env.ctx()?,
        &this,
        "getLocalizedMessage",
        "()Ljava/lang/String;",
        Vec::new(),
    )?
    .unwrap_or_default();
    match message.as_ref()? {
        Some(message) => string_result(&format!("{name}: {}", heap::rust_string(&message)?)),
        None => string_result(&name),
    }
}

fn trace_text(ctx: &mut ThreadContext, this: &ObjectRef) -> NativeResult<String> {
    let mut text = exceptions::stack_trace_text(this)?;
    // the headline honours an overridden toString
    let headline = display(ctx, Some(this))?;
    let default = exceptions::describe(this)?;
    if headline != default {
        text.replace_range(..default.len(), &headline);
    }
    Ok(text)
}

// public void printStackTrace()
fn print_stack_trace(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let text = trace_text(env.ctx()?, &this(&args)?)?;
    console::write_err(text.as_bytes());
    Ok(None)
}

// public void printStackTrace(PrintStream s)
fn print_stack_trace_to(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let stream = args[1].as_object()?;
    let text = trace_text(env.ctx()?, &this(&args)?)?;
    console::write_fd(print_stream::fd_of(&stream), text.as_bytes());
    Ok(None)
}

// public synchronized Throwable fillInStackTrace()
fn fill_in_stack_trace(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let this = this(&args)?;
    exceptions::fill_in_stack_trace(env.ctx()?, &this)?;
    Ok(Some(Value::Ref(this)))
}

// public StackTraceElement[] getStackTrace()
fn get_stack_trace(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let elements = exceptions::stack_trace(&*this(&args)?);
    let copy = heap::ref_array_from(ELEMENT, elements.into_iter().map(Some).collect());
    Ok(Some(Value::Ref(copy)))
}

// public void setStackTrace(StackTraceElement[] stackTrace)
fn set_stack_trace(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let this = this(&args)?;
    let elements = args[1]
        .as_object()?
        .with_array(|v| match v {
            FieldValue::Refs(refs) => refs.clone(),
            _ => Vec::new(),
        })
        .unwrap_or_default();
    if let Some(index) = elements.iter().position(Option::is_none) {
        return Err(Exception::with_message(
            "java/lang/NullPointerException",
            format!("stackTrace[{index}]"),
        ));
    }
    this.set(
        "stackTrace",
        "[Ljava/lang/StackTraceElement;",
        Value::Ref(heap::ref_array_from(ELEMENT, elements)),
    );
    Ok(None)
}

fn suppressed(this: &ObjectRef) -> Vec<Option<ObjectRef>> {
    this.get_ref("suppressedExceptions")
        .and_then(|array| {
            array.with_array(|v| match v {
                FieldValue::Refs(refs) => refs.clone(),
                _ => Vec::new(),
            })
        })
        .unwrap_or_default()
}

// public final synchronized void addSuppressed(Throwable exception)
fn add_suppressed(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let this = this(&args)?;
    let Some(exception) = args[1].as_ref()? else {
        return Err(Exception::with_message(
            "java/lang/NullPointerException",
            "Cannot suppress a null exception.",
        ));
    };
    if Arc::ptr_eq(&exception, &this) {
        return Err(Exception::with_message(
            "java/lang/IllegalArgumentException",
            "Self-suppression not permitted",
        ));
    }
    let mut all = suppressed(&this);
    all.push(Some(exception));
    this.set(
        "suppressedExceptions",
        "[Ljava/lang/Throwable;",
        Value::Ref(heap::ref_array_from(CLASS, all)),
    );
    Ok(None)
}

// public final synchronized Throwable[] getSuppressed()
fn get_suppressed(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let all = suppressed(&this(&args)?);
    Ok(Some(Value::Ref(heap::ref_array_from(CLASS, all))))
}

// public String getClassName() and the other StackTraceElement getters
fn element_field(args: &[Value], name: &str) -> NativeReturn {
    Ok(Some(args[0].as_object()?.get(name).unwrap_or_default()))
}

fn element_class_name(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    element_field(&args, "declaringClass")
}

fn element_method_name(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    element_field(&args, "methodName")
}

fn element_file_name(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    element_field(&args, "fileName")
}

fn element_module_name(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    element_field(&args, "moduleName")
}

// public int getLineNumber()
fn element_line_number(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    int_result(args[0].as_object()?.get_int("lineNumber").unwrap_or(-1) as i32)
}

// public boolean isNativeMethod()
fn element_is_native(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    bool_result(args[0].as_object()?.get_int("lineNumber") == Some(-2))
}

// public String toString()
fn element_to_string(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    string_result(&exceptions::element_text(&*args[0].as_object()?))
}

// public boolean equals(Object obj)
fn element_equals(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let this = args[0].as_object()?;
    let Some(other) = args[1].as_ref()? else {
        return bool_result(false);
    };
    if other.class_name() != this.class_name() {
        return bool_result(false);
    }
    bool_result(exceptions::element_text(&this) == exceptions::element_text(&other))
}

// public int hashCode()
fn element_hash_code(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let text = exceptions::element_text(&*args[0].as_object()?);
    int_result(super::string::java_hash(&text))
}

pub(super) fn register_natives() {
    use mtable::{register, register_ctx};

    register_ctx(CLASS, "<init>", "()V", init);
    register_ctx(CLASS, "<init>", "(Ljava/lang/String;)V", init_message);
    register_ctx(CLASS, "<init>", "(Ljava/lang/String;Ljava/lang/Throwable;)V", init_message_cause);
    register_ctx(CLASS, "<init>", "(Ljava/lang/Throwable;)V", init_cause);
    register_ctx(CLASS, "<init>", "(Ljava/lang/String;Ljava/lang/Throwable;ZZ)V", init_full);
    register(CLASS, "getMessage", "()Ljava/lang/String;", get_message);
    register_ctx(CLASS, "getLocalizedMessage", "()Ljava/lang/String;", get_localized_message);
    register(CLASS, "getCause", "()Ljava/lang/Throwable;", get_cause);
    register_ctx(CLASS, "initCause", "(Ljava/lang/Throwable;)Ljava/lang/Throwable;", init_cause_once);
    register_ctx(CLASS, "toString", "()Ljava/lang/String;", to_string);
    register_ctx(CLASS, "printStackTrace", "()V", print_stack_trace);
    register_ctx(CLASS, "printStackTrace", "(Ljava/io/PrintStream;)V", print_stack_trace_to);
    register_ctx(CLASS, "fillInStackTrace", "()Ljava/lang/Throwable;", fill_in_stack_trace);
    register(CLASS, "getStackTrace", "()[Ljava/lang/StackTraceElement;", get_stack_trace);
    register(CLASS, "setStackTrace", "([Ljava/lang/StackTraceElement;)V", set_stack_trace);
    register(CLASS, "addSuppressed", "(Ljava/lang/Throwable;)V", add_suppressed);
    register(CLASS, "getSuppressed", "()[Ljava/lang/Throwable;", get_suppressed);

    register(ELEMENT, "getClassName", "()Ljava/lang/String;", element_class_name);
    register(ELEMENT, "getMethodName", "()Ljava/lang/String;", element_method_name);
    register(ELEMENT, "getFileName", "()Ljava/lang/String;", element_file_name);
    register(ELEMENT, "getModuleName", "()Ljava/lang/String;", element_module_name);
    register(ELEMENT, "getLineNumber", "()I", element_line_number);
    register(ELEMENT, "isNativeMethod", "()Z", element_is_native);
    register(ELEMENT, "toString", "()Ljava/lang/String;", element_to_string);
    register(ELEMENT, "equals", "(Ljava/lang/Object;)Z", element_equals);
    register(ELEMENT, "hashCode", "()I", element_hash_code);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exception(message: &str) -> ObjectRef {
        let mut ctx = ThreadContext::new();
        exceptions::new_throwable(&mut ctx, "java/lang/RuntimeException", Some(message), None).unwrap()
    }

    #[test]
    fn test_init_cause_only_once() {
        let mut ctx = ThreadContext::new();
        let mut env = NativeEnv::new(Some(&mut ctx));
        let outer = exception("outer");
        let inner = exception("inner");
        let this = Value::Ref(outer.clone());
        let self_cause = init_cause_once(&mut env, vec![this.clone(), this.clone()]);
        assert!(matches!(self_cause, Err(Exception::Vm { ref class_name, .. })
            if class_name.as_ref() == "java/lang/IllegalArgumentException"));
        init_cause_once(&mut env, vec![this.clone(), Value::Ref(inner.clone())]).unwrap();
        assert!(Arc::ptr_eq(&outer.get_ref("cause").unwrap(), &inner));
        let again = init_cause_once(&mut env, vec![this, Value::Null]);
        assert!(matches!(again, Err(Exception::Vm { ref class_name, .. })
            if class_name.as_ref() == "java/lang/IllegalStateException"));
    }

    #[test]
    fn test_suppressed_accumulates() {
        let mut env = NativeEnv::new(None);
        let primary = exception("primary");
        let this = Value::Ref(primary.clone());
        assert!(add_suppressed(&mut env, vec![this.clone(), Value::Null]).is_err());
        add_suppressed(&mut env, vec![this.clone(), Value::Ref(exception("a"))]).unwrap();
        add_suppressed(&mut env, vec![this.clone(), Value::Ref(exception("b"))]).unwrap();
        let array = get_suppressed(&mut env, vec![this]).unwrap().unwrap().as_object().unwrap();
        assert_eq!(array.array_len(), Some(2));
    }

    #[test]
    fn test_element_accessors() {
        let mut env = NativeEnv::new(None);
        let element = heap::object_with_class_name(ELEMENT);
        element.set("declaringClass", "Ljava/lang/String;", heap::string_value("demo.Main"));
        element.set("methodName", "Ljava/lang/String;", heap::string_value("main"));
        element.set("fileName", "Ljava/lang/String;", heap::string_value("Main.java"));
        element.set("lineNumber", "I", Value::int(7));
        let this = vec![Value::Ref(element)];
        let text = element_to_string(&mut env, this.clone()).unwrap().unwrap();
        assert_eq!(heap::rust_string_or_null(&text).unwrap(), "demo.Main.main(Main.java:7)");
        let native = element_is_native(&mut env, this).unwrap().unwrap();
        assert!(!native.as_bool().unwrap());
    }
}
