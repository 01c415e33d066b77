use std::sync::Arc;

use super::{NativeReturn, bool_result, call_virtual, int_result, nop, string_arg, string_result};
use crate::runtime::{
    Exception, NativeResult, ObjectRef, Value, class_loader, heap,
    mtable::{self, NativeEnv},
    statics,
    thread::{self, MAX_PRIORITY, MIN_PRIORITY, NORM_PRIORITY, STATE_NAMES, ThreadContext},
};

const CLASS: &str = "java/lang/Thread";
const STATE: &str = "java/lang/Thread$State";
const GROUP: &str = "java/lang/ThreadGroup";

fn this(args: &[Value]) -> NativeResult<ObjectRef> {
    args[0].as_object()
}

/// Sets up a new thread; it inherits the creator's daemon status.
fn construct(ctx: &mut ThreadContext, args: &[Value], target: Option<ObjectRef>, name: Option<String>) -> NativeReturn {
    let thread = this(args)?;
    thread::init_new(&thread, target, name);
    let creator = ctx.current_thread();
    thread.set("daemon", "Z", Value::boolean(thread::is_daemon(&creator)));
    Ok(None)
}

// public Thread()
fn init(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    construct(env.ctx()?, &args, None, None)
}

// public Thread(Runnable task)
fn init_runnable(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let target = args[1].as_ref()?;
    construct(env.ctx()?, &args, target, None)
}

// public Thread(Runnable task, String name)
fn init_runnable_named(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let target = args[1].as_ref()?;
    let name = string_arg(&args[2])?;
    construct(env.ctx()?, &args, target, Some(name))
}

// public Thread(String name)
fn init_named(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let name = string_arg(&args[1])?;
    construct(env.ctx()?, &args, None, Some(name))
}

// public static native Thread currentThread()
fn current_thread(env: &mut NativeEnv, _: Vec<Value>) -> NativeReturn {
    Ok(Some(Value::Ref(env.ctx()?.current_thread())))
}

// public synchronized void start()
fn start(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    thread::start(&this(&args)?)?;
    Ok(None)
}

// public void run()
fn run(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let Some(target) = this(&args)?.get_ref("target") else {
        return Ok(None);
    };
    call_virtual(env.ctx()?, &target, "run", "()V", Vec::new())?;
    Ok(None)
}

// public final void join()
fn join(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    thread::join(env.ctx()?, &this(&args)?, 0)?;
    Ok(None)
}

// public final synchronized void join(long millis)
fn join_millis(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    thread::join(env.ctx()?, &this(&args)?, args[1].as_long()?)?;
    Ok(None)
}

// public static native void sleep(long millis)
fn sleep(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    thread::sleep(env.ctx()?, args[0].as_long()?)?;
    Ok(None)
}

// public static void sleep(long millis, int nanos)
fn sleep_nanos(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let (millis, nanos) = (args[0].as_long()?, args[1].as_int()?);
    if !(0..=999_999).contains(&nanos) {
        return Err(Exception::with_message(
            "java/lang/IllegalArgumentException",
            "nanosecond timeout value out of range",
        ));
    }
    thread::sleep(env.ctx()?, millis + (nanos > 0) as i64)?;
    Ok(None)
}

// public static native void yield()
fn yield_now(_: &mut NativeEnv, _: Vec<Value>) -> NativeReturn {
    std::thread::yield_now();
    Ok(None)
}

// public void interrupt()
fn interrupt(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    thread::interrupt(&this(&args)?);
    Ok(None)
}

// public boolean isInterrupted()
fn is_interrupted(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    bool_result(thread::is_interrupted(&this(&args)?))
}

// public static boolean interrupted()
fn interrupted(env: &mut NativeEnv, _: Vec<Value>) -> NativeReturn {
    let me = env.ctx()?.current_thread();
    bool_result(thread::take_interrupt(&me))
}

// public final native boolean isAlive()
fn is_alive(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    bool_result(thread::is_alive(&this(&args)?))
}

// public final void setDaemon(boolean on)
fn set_daemon(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let thread = this(&args)?;
    if thread::is_alive(&thread) {
        return Err(Exception::new("java/lang/IllegalThreadStateException"));
    }
    thread.set("daemon", "Z", Value::boolean(args[1].as_bool()?));
    Ok(None)
}

// public final boolean isDaemon()
fn is_daemon(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    bool_result(thread::is_daemon(&this(&args)?))
}

// public final String getName()
fn get_name(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    Ok(Some(this(&args)?.get("name").unwrap_or_default()))
}

// public final synchronized void setName(String name)
fn set_name(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let name = string_arg(&args[1])?;
    this(&args)?.set("name", "Ljava/lang/String;", heap::string_value(&name));
    Ok(None)
}

// public long getId()
fn get_id(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    Ok(Some(Value::long(thread::thread_id(&this(&args)?))))
}

fn priority(thread: &ObjectRef) -> i32 {
    thread.get_int("priority").unwrap_or(NORM_PRIORITY as i64) as i32
}

// public final int getPriority()
fn get_priority(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    int_result(priority(&this(&args)?))
}

// public final void setPriority(int newPriority)
fn set_priority(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let priority = args[1].as_int()?;
    if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&priority) {
        return Err(Exception::new("java/lang/IllegalArgumentException"));
    }
    let thread = this(&args)?;
    let ceiling = thread
        .get_ref("group")
        .and_then(|g| g.get_int("maxPriority"))
        .unwrap_or(MAX_PRIORITY as i64) as i32;
    thread.set("priority", "I", Value::int(priority.min(ceiling)));
    Ok(None)
}

// public final ThreadGroup getThreadGroup()
fn get_thread_group(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let thread = this(&args)?;
    // terminated threads leave their group
    if thread::state(&thread) == thread::TERMINATED {
        return Ok(Some(Value::Null));
    }
    Ok(Some(Value::reference(thread.get_ref("group"))))
}

// public String toString()
fn to_string(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let thread = this(&args)?;
    let name = heap::rust_string_or_null(&thread.get("name").unwrap_or_default())?;
    let group = match thread.get_ref("group") {
        Some(group) => heap::rust_string_or_null(&group.get("name").unwrap_or_default())?,
        None => String::new(),
    };
    string_result(&format!("Thread[{name},{},{group}]", priority(&thread)))
}

// public State getState()
fn get_state(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let state = thread::state(&this(&args)?);
    let class = class_loader::bootstrap().load(STATE)?;
    statics::initialize(env.ctx()?, &class)?;
    let name = STATE_NAMES.get(state as usize).copied().unwrap_or("NEW");
    Ok(Some(statics::get_static_value(STATE, name).unwrap_or_default()))
}

// public static native boolean holdsLock(Object obj)
fn holds_lock(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let object = args[0].as_object()?;
    bool_result(object.monitor().holds(env.ctx()?.id))
}

// static { ... }
fn clinit(_: &mut NativeEnv, _: Vec<Value>) -> NativeReturn {
    statics::set(CLASS, "MIN_PRIORITY", "I", Value::int(MIN_PRIORITY));
    statics::set(CLASS, "NORM_PRIORITY", "I", Value::int(NORM_PRIORITY));
    statics::set(CLASS, "MAX_PRIORITY", "I", Value::int(MAX_PRIORITY));
    Ok(None)
}

/// `Thread$State` constants, created the way a compiled enum initializer would.
fn state_clinit(_: &mut NativeEnv, _: Vec<Value>) -> NativeReturn {
    let this_type = format!("L{STATE};");
    let mut constants = Vec::with_capacity(STATE_NAMES.len());
    for (ordinal, name) in STATE_NAMES.iter().enumerate() {
        let constant = heap::object_with_class_name(STATE);
        constant.set("name", "Ljava/lang/String;", heap::string_value(name));
        constant.set("ordinal", "I", Value::int(ordinal as i32));
        statics::set(STATE, name, &this_type, Value::Ref(Arc::clone(&constant)));
        constants.push(Some(constant));
    }
    let values = heap::ref_array_from(STATE, constants);
    statics::set(STATE, "$VALUES", &format!("[{this_type}"), Value::Ref(values));
    Ok(None)
}

// public static State[] values()
fn state_values(_: &mut NativeEnv, _: Vec<Value>) -> NativeReturn {
    let values = statics::get_static_value(STATE, "$VALUES")
        .ok_or_else(|| Exception::fatal("Thread$State is not initialized"))?
        .as_object()?;
    Ok(Some(Value::Ref(Arc::new(values.shallow_clone()))))
}

// public static State valueOf(String name)
fn state_value_of(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let name = string_arg(&args[0])?;
    match STATE_NAMES.iter().find(|n| **n == name) {
        Some(name) => Ok(Some(statics::get_static_value(STATE, name).unwrap_or_default())),
        None => Err(Exception::with_message(
            "java/lang/IllegalArgumentException",
            format!("No enum constant java.lang.Thread.State.{name}"),
        )),
    }
}

// public final String getName()
fn group_name(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    Ok(Some(this(&args)?.get("name").unwrap_or_default()))
}

// public final int getMaxPriority()
fn group_max_priority(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    int_result(this(&args)?.get_int("maxPriority").unwrap_or(MAX_PRIORITY as i64) as i32)
}

// public final ThreadGroup getParent()
fn group_parent(_: &mut NativeEnv, _: Vec<Value>) -> NativeReturn {
    Ok(Some(Value::Null))
}

// public int activeCount()
fn group_active_count(_: &mut NativeEnv, _: Vec<Value>) -> NativeReturn {
    // started threads plus main
    int_result(thread::live_threads() as i32 + 1)
}

pub(super) fn register_natives() {
    use mtable::{register, register_ctx};

    register(CLASS, "<clinit>", "()V", clinit);
    register(CLASS, "registerNatives", "()V", nop);
    register_ctx(CLASS, "<init>", "()V", init);
    register_ctx(CLASS, "<init>", "(Ljava/lang/Runnable;)V", init_runnable);
    register_ctx(CLASS, "<init>", "(Ljava/lang/Runnable;Ljava/lang/String;)V", init_runnable_named);
    register_ctx(CLASS, "<init>", "(Ljava/lang/String;)V", init_named);
    register_ctx(CLASS, "currentThread", "()Ljava/lang/Thread;", current_thread);
    register(CLASS, "start", "()V", start);
    register_ctx(CLASS, "run", "()V", run);
    register_ctx(CLASS, "join", "()V", join);
    register_ctx(CLASS, "join", "(J)V", join_millis);
    register_ctx(CLASS, "sleep", "(J)V", sleep);
    register_ctx(CLASS, "sleep", "(JI)V", sleep_nanos);
    register(CLASS, "yield", "()V", yield_now);
    register(CLASS, "onSpinWait", "()V", yield_now);
    register(CLASS, "interrupt", "()V", interrupt);
    register(CLASS, "isInterrupted", "()Z", is_interrupted);
    register_ctx(CLASS, "interrupted", "()Z", interrupted);
    register(CLASS, "isAlive", "()Z", is_alive);
    register(CLASS, "setDaemon", "(Z)V", set_daemon);
    register(CLASS, "isDaemon", "()Z", is_daemon);
    register(CLASS, "getName", "()Ljava/lang/String;", get_name);
    register(CLASS, "setName", "(Ljava/lang/String;)V", set_name);
    register(CLASS, "getId", "()J", get_id);
    register(CLASS, "threadId", "()J", get_id);
    register(CLASS, "getPriority", "()I", get_priority);
    register(CLASS, "setPriority", "(I)V", set_priority);
    register(CLASS, "getThreadGroup", "()Ljava/lang/ThreadGroup;", get_thread_group);
    register(CLASS, "toString", "()Ljava/lang/String;", to_string);
    register_ctx(CLASS, "getState", "()Ljava/lang/Thread$State;", get_state);
    register_ctx(CLASS, "holdsLock", "(Ljava/lang/Object;)Z", holds_lock);

    register(STATE, "<clinit>", "()V", state_clinit);
    register(STATE, "values", "()[Ljava/lang/Thread$State;", state_values);
    register(STATE, "valueOf", "(Ljava/lang/String;)Ljava/lang/Thread$State;", state_value_of);

    register(GROUP, "getName", "()Ljava/lang/String;", group_name);
    register(GROUP, "getMaxPriority", "()I", group_max_priority);
    register(GROUP, "getParent", "()Ljava/lang/ThreadGroup;", group_parent);
    register(GROUP, "activeCount", "()I", group_active_count);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructed_thread_fields() {
        let mut ctx = ThreadContext::new();
        let mut env = NativeEnv::new(Some(&mut ctx));
        let thread = heap::object_with_class_name(CLASS);
        init_named(&mut env, vec![Value::Ref(thread.clone()), heap::string_value("worker")]).unwrap();
        assert_eq!(thread::state(&thread), thread::NEW);
        assert!(!thread::is_daemon(&thread));
        let text = to_string(&mut env, vec![Value::Ref(thread.clone())]).unwrap().unwrap();
        assert_eq!(heap::rust_string_or_null(&text).unwrap(), "Thread[worker,5,main]");
    }

    #[test]
    fn test_priority_bounds() {
        let mut env = NativeEnv::new(None);
        let thread = heap::object_with_class_name(CLASS);
        thread::init_new(&thread, None, None);
        let receiver = Value::Ref(thread.clone());
        assert!(set_priority(&mut env, vec![receiver.clone(), Value::int(11)]).is_err());
        set_priority(&mut env, vec![receiver, Value::int(MAX_PRIORITY)]).unwrap();
        assert_eq!(priority(&thread), MAX_PRIORITY);
    }

    #[test]
    fn test_interrupted_clears_flag() {
        let mut ctx = ThreadContext::new();
        let me = ctx.current_thread();
        thread::interrupt(&me);
        let mut env = NativeEnv::new(Some(&mut ctx));
        let first = interrupted(&mut env, Vec::new()).unwrap().unwrap();
        let second = interrupted(&mut env, Vec::new()).unwrap().unwrap();
        assert!(first.as_bool().unwrap());
        assert!(!second.as_bool().unwrap());
    }
}
