use once_cell::sync::Lazy;

use super::{NativeReturn, bool_result, int_result, nop};
use crate::runtime::{
    Exception, ObjectRef, Value, console, heap,
    mtable::{self, NativeEnv},
    vm,
};

const CLASS: &str = "java/lang/Runtime";

/// Objects are reference counted and there is no fixed heap to measure.
const TOTAL_MEMORY: i64 = 256 << 20;

static RUNTIME: Lazy<ObjectRef> = Lazy::new(|| heap::object_with_class_name(CLASS));

// public static Runtime getRuntime()
fn get_runtime(_: &mut NativeEnv, _: Vec<Value>) -> NativeReturn {
    Ok(Some(Value::Ref(RUNTIME.clone())))
}

// public native int availableProcessors()
fn available_processors(_: &mut NativeEnv, _: Vec<Value>) -> NativeReturn {
    let count = std::thread::available_parallelism().map_or(1, |n| n.get());
    int_result(count as i32)
}

// public native long maxMemory()
fn max_memory(_: &mut NativeEnv, _: Vec<Value>) -> NativeReturn {
    Ok(Some(Value::long(heap::MAX_MEMORY)))
}

// public native long totalMemory()
fn total_memory(_: &mut NativeEnv, _: Vec<Value>) -> NativeReturn {
    Ok(Some(Value::long(TOTAL_MEMORY)))
}

// public native long freeMemory()
fn free_memory(_: &mut NativeEnv, _: Vec<Value>) -> NativeReturn {
    Ok(Some(Value::long(TOTAL_MEMORY / 2)))
}

// public void exit(int status)
fn exit(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    Err(Exception::Exit(args[1].as_int()?))
}

// public void halt(int status)
fn halt(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let status = args[1].as_int()?;
    log::debug!("Runtime.halt({status})");
    console::flush();
    std::process::exit(status)
}

// public void addShutdownHook(Thread hook)
fn add_shutdown_hook(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    vm::add_shutdown_hook(args[1].as_object()?)?;
    Ok(None)
}

// public boolean removeShutdownHook(Thread hook)
fn remove_shutdown_hook(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    bool_result(vm::remove_shutdown_hook(&args[1].as_object()?)?)
}

pub(super) fn register_natives() {
    use mtable::register;

    register(CLASS, "getRuntime", "()Ljava/lang/Runtime;", get_runtime);
    register(CLASS, "availableProcessors", "()I", available_processors);
    register(CLASS, "maxMemory", "()J", max_memory);
    register(CLASS, "totalMemory", "()J", total_memory);
    register(CLASS, "freeMemory", "()J", free_memory);
    register(CLASS, "gc", "()V", nop);
    register(CLASS, "runFinalization", "()V", nop);
    register(CLASS, "exit", "(I)V", exit);
    register(CLASS, "halt", "(I)V", halt);
    register(CLASS, "addShutdownHook", "(Ljava/lang/Thread;)V", add_shutdown_hook);
    register(CLASS, "removeShutdownHook", "(Ljava/lang/Thread;)Z", remove_shutdown_hook);
}
