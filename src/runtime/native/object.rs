use std::{sync::Arc, time::Duration};

use super::{NativeReturn, bool_result, call_virtual, int_result, nop, string_result};
use crate::runtime::{
    Exception, NativeResult, ObjectRef, Value, class_loader, heap, inheritance,
    mtable::{self, NativeEnv},
    reflection,
    structs::MonitorError,
    thread::{self, ThreadContext},
};

const CLASS: &str = "java/lang/Object";

fn monitor_error(err: MonitorError) -> Exception {
    match err {
        MonitorError::NotOwner => Exception::with_message(
            "java/lang/IllegalMonitorStateException",
            "current thread is not owner",
        ),
        MonitorError::Interrupted => Exception::new("java/lang/InterruptedException"),
    }
}

fn wait_on(ctx: &mut ThreadContext, object: &ObjectRef, millis: i64) -> NativeResult<()> {
    if millis < 0 {
        return Err(Exception::with_message(
            "java/lang/IllegalArgumentException",
            "timeout value is negative",
        ));
    }
    let me = ctx.current_thread();
    if thread::take_interrupt(&me) {
        return Err(monitor_error(MonitorError::Interrupted));
    }
    let timeout = (millis > 0).then(|| Duration::from_millis(millis as u64));
    thread::set_state(&me, if timeout.is_some() { thread::TIMED_WAITING } else { thread::WAITING });
    let result = object
        .monitor()
        .wait(ctx.id, timeout, || thread::is_interrupted(&me));
    thread::set_state(&me, thread::RUNNABLE);
    if result == Err(MonitorError::Interrupted) {
        thread::take_interrupt(&me);
    }
    result.map_err(monitor_error)
}

// public native int hashCode()
fn hash_code(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    int_result(args[0].as_object()?.identity_hash())
}

// public boolean equals(Object obj)
fn equals(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    bool_result(args[0].same_ref(&args[1]))
}

// public String toString()
fn to_string(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let this = args[0].as_object()?;
    let hash = call_virtual(env.ctx()?, &this, "hashCode", "()I", Vec::new())?
        .unwrap_or_default()
        .as_int()?;
    let class = heap::class_of(&this)?;
    let mirror = reflection::class_mirror(&class);
    let name = reflection::java_name(&mirror)?;
    string_result(&format!("{name}@{:x}", hash as u32))
}

// public final native Class<?> getClass()
fn get_class(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    Ok(Some(Value::Ref(reflection::mirror_of(&*args[0].as_object()?)?)))
}

// protected native Object clone() throws CloneNotSupportedException
fn clone(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let this = args[0].as_object()?;
    if !this.is_array() {
        let cloneable = class_loader::bootstrap().load("java/lang/Cloneable")?;
        let class = heap::class_of(&this)?;
        if !inheritance::is_assignable_to(&class, &cloneable) {
            return Err(Exception::with_message(
                "java/lang/CloneNotSupportedException",
                reflection::java_name(&reflection::class_mirror(&class))?,
            ));
        }
    }
    Ok(Some(Value::Ref(Arc::new(this.shallow_clone()))))
}

// public final void wait() throws InterruptedException
fn wait(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let this = args[0].as_object()?;
    wait_on(env.ctx()?, &this, 0)?;
    Ok(None)
}

// public final native void wait(long timeoutMillis) throws InterruptedException
fn wait_millis(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let this = args[0].as_object()?;
    wait_on(env.ctx()?, &this, args[1].as_long()?)?;
    Ok(None)
}

// public final void wait(long timeoutMillis, int nanos) throws InterruptedException
fn wait_nanos(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let this = args[0].as_object()?;
    let (millis, nanos) = (args[1].as_long()?, args[2].as_int()?);
    if !(0..=999_999).contains(&nanos) {
        return Err(Exception::with_message(
            "java/lang/IllegalArgumentException",
            "nanosecond timeout value out of range",
        ));
    }
    let millis = if nanos > 0 && millis < i64::MAX { millis + 1 } else { millis };
    wait_on(env.ctx()?, &this, millis)?;
    Ok(None)
}

// public final native void notify()
fn notify(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let this = args[0].as_object()?;
    this.monitor().notify(env.ctx()?.id).map_err(monitor_error)?;
    Ok(None)
}

// public final native void notifyAll()
fn notify_all(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let this = args[0].as_object()?;
    this.monitor().notify_all(env.ctx()?.id).map_err(monitor_error)?;
    Ok(None)
}

pub(super) fn register_natives() {
    use mtable::{register, register_ctx};

    register(CLASS, "<init>", "()V", nop);
    register(CLASS, "<clinit>", "()V", nop);
    register(CLASS, "registerNatives", "()V", nop);
    register(CLASS, "hashCode", "()I", hash_code);
    register(CLASS, "equals", "(Ljava/lang/Object;)Z", equals);
    register_ctx(CLASS, "toString", "()Ljava/lang/String;", to_string);
    register(CLASS, "getClass", "()Ljava/lang/Class;", get_class);
    register(CLASS, "clone", "()Ljava/lang/Object;", clone);
    register(CLASS, "finalize", "()V", nop);
    register_ctx(CLASS, "wait", "()V", wait);
    register_ctx(CLASS, "wait", "(J)V", wait_millis);
    register_ctx(CLASS, "wait", "(JI)V", wait_nanos);
    register_ctx(CLASS, "notify", "()V", notify);
    register_ctx(CLASS, "notifyAll", "()V", notify_all);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_requires_ownership() {
        let mut ctx = ThreadContext::new();
        let object = heap::object_with_class_name(CLASS);
        let err = wait_on(&mut ctx, &object, 1).unwrap_err();
        assert_eq!(
            err.to_string(),
            "java.lang.IllegalMonitorStateException: current thread is not owner"
        );
    }

    #[test]
    fn test_timed_wait_returns_owning_monitor() {
        let mut ctx = ThreadContext::new();
        let object = heap::object_with_class_name(CLASS);
        object.monitor().enter(ctx.id);
        wait_on(&mut ctx, &object, 5).unwrap();
        assert!(object.monitor().holds(ctx.id));
        object.monitor().exit(ctx.id).unwrap();
    }

    #[test]
    fn test_interrupted_wait() {
        let mut ctx = ThreadContext::new();
        let me = ctx.current_thread();
        let object = heap::object_with_class_name(CLASS);
        object.monitor().enter(ctx.id);
        thread::interrupt(&me);
        let err = wait_on(&mut ctx, &object, 0).unwrap_err();
        assert_eq!(err.to_string(), "java.lang.InterruptedException");
        assert!(!thread::is_interrupted(&me));
    }
}
