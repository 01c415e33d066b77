use std::{
    collections::{HashMap, VecDeque},
    sync::atomic::{AtomicI64, Ordering},
    time::{Duration, Instant},
};

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::runtime::{
    Exception, NativeResult, ObjectRef, Value, console, exceptions, heap, interpreter,
    interpreter::Frame, mtable, vm,
};

pub(crate) const NEW: i32 = 0;
pub(crate) const RUNNABLE: i32 = 1;
pub(crate) const BLOCKED: i32 = 2;
pub(crate) const WAITING: i32 = 3;
pub(crate) const TIMED_WAITING: i32 = 4;
pub(crate) const TERMINATED: i32 = 5;

pub(crate) const STATE_NAMES: [&str; 6] = [
    "NEW",
    "RUNNABLE",
    "BLOCKED",
    "WAITING",
    "TIMED_WAITING",
    "TERMINATED",
];

pub(crate) const MIN_PRIORITY: i32 = 1;
pub(crate) const NORM_PRIORITY: i32 = 5;
pub(crate) const MAX_PRIORITY: i32 = 10;

pub(crate) const STACK_SIZE: usize = 16 * 1024 * 1024;
const POLL: Duration = Duration::from_millis(1);

static NEXT_ID: AtomicI64 = AtomicI64::new(1);
static THREAD_NUMBER: AtomicI64 = AtomicI64::new(0);
static REGISTRY: Lazy<RwLock<HashMap<i64, ObjectRef>>> = Lazy::new(|| RwLock::new(HashMap::new()));
static MAIN_GROUP: Lazy<ObjectRef> = Lazy::new(|| {
    let group = heap::object_with_class_name("java/lang/ThreadGroup");
    group.set("name", "Ljava/lang/String;", heap::string_value("main"));
    group.set("maxPriority", "I", Value::int(MAX_PRIORITY));
    group
});

/// Per-thread interpreter state. The current frame is the front of `frames`.
pub struct ThreadContext {
    pub(crate) id: i64,
    pub(crate) frames: VecDeque<Frame>,
    pub(crate) thread_obj: Option<ObjectRef>,
}

impl ThreadContext {
    /// A context for a thread the VM did not start itself (the main thread);
    /// its `Thread` object is created on first use.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        ThreadContext {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            frames: VecDeque::new(),
            thread_obj: None,
        }
    }

    fn for_thread(thread: ObjectRef) -> Self {
        ThreadContext {
            id: thread_id(&thread),
            frames: VecDeque::new(),
            thread_obj: Some(thread),
        }
    }

    pub(crate) fn current_thread(&mut self) -> ObjectRef {
        if let Some(thread) = &self.thread_obj {
            return thread.clone();
        }
        let thread = heap::object_with_class_name("java/lang/Thread");
        init_fields(&thread, self.id, None, Some("main".to_string()));
        set_state(&thread, RUNNABLE);
        self.thread_obj = Some(thread.clone());
        thread
    }

    pub(crate) fn name(&self) -> String {
        self.thread_obj
            .as_ref()
            .and_then(|t| t.get("name"))
            .and_then(|name| heap::rust_string_or_null(&name).ok())
            .unwrap_or_else(|| "main".to_string())
    }

    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }
}

pub(crate) fn main_group() -> ObjectRef {
    MAIN_GROUP.clone()
}

/// Sets up the fields of a new, unstarted thread.
pub(crate) fn init_fields(thread: &ObjectRef, id: i64, target: Option<ObjectRef>, name: Option<String>) {
    let name = name.unwrap_or_else(|| {
        format!("Thread-{}", THREAD_NUMBER.fetch_add(1, Ordering::Relaxed))
    });
    thread.set("tid", "J", Value::long(id));
    thread.set("name", "Ljava/lang/String;", heap::string_value(&name));
    thread.set("priority", "I", Value::int(NORM_PRIORITY));
    thread.set("daemon", "Z", Value::boolean(false));
    thread.set("interrupted", "Z", Value::boolean(false));
    thread.set("threadStatus", "I", Value::int(NEW));
    thread.set("group", "Ljava/lang/ThreadGroup;", Value::Ref(main_group()));
    thread.set("target", "Ljava/lang/Runnable;", Value::reference(target));
}

pub(crate) fn init_new(thread: &ObjectRef, target: Option<ObjectRef>, name: Option<String>) {
    init_fields(thread, NEXT_ID.fetch_add(1, Ordering::Relaxed), target, name);
}

pub(crate) fn thread_id(thread: &ObjectRef) -> i64 {
    thread.get_int("tid").unwrap_or(0)
}

pub(crate) fn state(thread: &ObjectRef) -> i32 {
    thread.get_int("threadStatus").unwrap_or(NEW as i64) as i32
}

pub(crate) fn set_state(thread: &ObjectRef, state: i32) {
    thread.set("threadStatus", "I", Value::int(state));
}

/// Enters the monitor of `object`. While another thread owns it the current
/// thread reports `BLOCKED`.
pub(crate) fn enter_monitor(ctx: &mut ThreadContext, object: &ObjectRef) {
    if object.monitor().try_enter(ctx.id) {
        return;
    }
    let me = ctx.current_thread();
    set_state(&me, BLOCKED);
    object.monitor().enter(ctx.id);
    set_state(&me, RUNNABLE);
}

pub(crate) fn is_alive(thread: &ObjectRef) -> bool {
    !matches!(state(thread), NEW | TERMINATED)
}

pub(crate) fn is_daemon(thread: &ObjectRef) -> bool {
    thread.get_int("daemon") == Some(1)
}

pub(crate) fn interrupt(thread: &ObjectRef) {
    thread.set("interrupted", "Z", Value::boolean(true));
}

pub(crate) fn is_interrupted(thread: &ObjectRef) -> bool {
    thread.get_int("interrupted") == Some(1)
}

pub(crate) fn take_interrupt(thread: &ObjectRef) -> bool {
    let was = is_interrupted(thread);
    if was {
        thread.set("interrupted", "Z", Value::boolean(false));
    }
    was
}

fn interrupted_exception(message: &str) -> Exception {
    Exception::with_message("java/lang/InterruptedException", message)
}

pub(crate) fn live_non_daemon() -> Vec<ObjectRef> {
    REGISTRY
        .read()
        .values()
        .filter(|t| !is_daemon(t))
        .cloned()
        .collect()
}

pub(crate) fn live_threads() -> usize {
    REGISTRY.read().len()
}

pub(crate) fn registered(id: i64) -> Option<ObjectRef> {
    REGISTRY.read().get(&id).cloned()
}

/// `Thread.start()`: runs `run()` of `thread` on a new OS thread.
pub(crate) fn start(thread: &ObjectRef) -> NativeResult<()> {
    if !thread.compare_and_put_int("threadStatus", NEW as i64, Value::int(RUNNABLE)) {
        return Err(Exception::new("java/lang/IllegalThreadStateException"));
    }
    let id = thread_id(thread);
    REGISTRY.write().insert(id, thread.clone());

    let capture = console::current();
    let name = thread
        .get("name")
        .and_then(|n| heap::rust_string_or_null(&n).ok())
        .unwrap_or_default();
    let runner = thread.clone();
    let spawned = std::thread::Builder::new()
        .name(name)
        .stack_size(STACK_SIZE)
        .spawn(move || {
            console::redirect(capture);
            run(runner);
        });
    if let Err(err) = spawned {
        REGISTRY.write().remove(&id);
        set_state(thread, NEW);
        return Err(Exception::with_message(
            "java/lang/OutOfMemoryError",
            format!("unable to create native thread: {err}"),
        ));
    }
    log::debug!("started thread {id}");
    Ok(())
}

fn run(thread: ObjectRef) {
    let mut ctx = ThreadContext::for_thread(thread.clone());
    let result = heap::class_of(&thread)
        .and_then(|class| mtable::resolve_virtual(&class, "run", "()V"))
        .and_then(|entry| {
            interpreter::invoke_method(&mut ctx, &entry, vec![Value::Ref(thread.clone())])
        });
    match ending(result) {
        Ending::Finished => {}
        Ending::Exit(code) => vm::exit_process(code),
        Ending::Fault(message) => vm::abort(&ctx.name(), &message),
        Ending::Uncaught(err) => exceptions::uncaught(&mut ctx, err),
    }
    terminate(&thread);
}

#[derive(Debug)]
enum Ending {
    Finished,
    Exit(i32),
    /// A VM fault takes the whole VM down, hooks included.
    Fault(String),
    Uncaught(Exception),
}

fn ending(result: NativeResult<Option<Value>>) -> Ending {
    match result {
        Ok(_) => Ending::Finished,
        Err(Exception::Exit(code)) => Ending::Exit(code),
        Err(Exception::Fatal(message)) => Ending::Fault(message),
        Err(err) => Ending::Uncaught(err),
    }
}

fn terminate(thread: &ObjectRef) {
    set_state(thread, TERMINATED);
    REGISTRY.write().remove(&thread_id(thread));
    log::debug!("thread {} terminated", thread_id(thread));
}

/// `Thread.sleep(millis)`, waking early with `InterruptedException`.
pub(crate) fn sleep(ctx: &mut ThreadContext, millis: i64) -> NativeResult<()> {
    if millis < 0 {
        return Err(Exception::with_message(
            "java/lang/IllegalArgumentException",
            "timeout value is negative",
        ));
    }
    let me = ctx.current_thread();
    let deadline = Instant::now() + Duration::from_millis(millis as u64);
    set_state(&me, TIMED_WAITING);
    let result = loop {
        if take_interrupt(&me) {
            break Err(interrupted_exception("sleep interrupted"));
        }
        let now = Instant::now();
        if now >= deadline {
            break Ok(());
        }
        std::thread::sleep((deadline - now).min(POLL * 10));
    };
    set_state(&me, RUNNABLE);
    result
}

/// `Thread.join(millis)`; `0` waits without a deadline.
pub(crate) fn join(ctx: &mut ThreadContext, target: &ObjectRef, millis: i64) -> NativeResult<()> {
    if millis < 0 {
        return Err(Exception::with_message(
            "java/lang/IllegalArgumentException",
            "timeout value is negative",
        ));
    }
    let me = ctx.current_thread();
    let deadline = (millis > 0).then(|| Instant::now() + Duration::from_millis(millis as u64));
    set_state(&me, if deadline.is_some() { TIMED_WAITING } else { WAITING });
    let result = loop {
        if !is_alive(target) {
            break Ok(());
        }
        if take_interrupt(&me) {
            break Err(interrupted_exception("join interrupted"));
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break Ok(());
        }
        std::thread::yield_now();
        std::thread::sleep(POLL);
    };
    set_state(&me, RUNNABLE);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_thread_is_main() {
        let mut ctx = ThreadContext::new();
        let me = ctx.current_thread();
        assert!(std::sync::Arc::ptr_eq(&me, &ctx.current_thread()));
        assert_eq!(ctx.name(), "main");
        assert_eq!(thread_id(&me), ctx.id);
        assert_eq!(state(&me), RUNNABLE);
    }

    #[test]
    fn test_interrupt_flag() {
        let thread = heap::object_with_class_name("java/lang/Thread");
        init_new(&thread, None, None);
        assert!(!is_alive(&thread));
        interrupt(&thread);
        assert!(is_interrupted(&thread));
        assert!(take_interrupt(&thread));
        assert!(!is_interrupted(&thread));
    }

    #[test]
    fn test_sleep_observes_interrupt() {
        let mut ctx = ThreadContext::new();
        let me = ctx.current_thread();
        interrupt(&me);
        let err = sleep(&mut ctx, 1_000).unwrap_err();
        assert!(err.to_string().contains("InterruptedException"), "{err}");
        assert!(!is_interrupted(&me));
        sleep(&mut ctx, 1).unwrap();
        assert!(sleep(&mut ctx, -1).is_err());
    }

    #[test]
    fn test_vm_fault_in_thread_is_not_uncaught() {
        assert!(matches!(ending(Ok(None)), Ending::Finished));
        assert!(matches!(ending(Err(Exception::Exit(4))), Ending::Exit(4)));
        match ending(Err(Exception::fatal("unknown opcode 0xcb"))) {
            Ending::Fault(message) => assert_eq!(message, "unknown opcode 0xcb"),
            other => panic!("unexpected {other:?}"),
        }
        let thrown = ending(Err(Exception::new("java/lang/IllegalStateException")));
        assert!(matches!(thrown, Ending::Uncaught(Exception::Vm { .. })));
    }

    #[test]
    fn test_contended_monitor_reports_blocked() {
        let object = heap::object_with_class_name("java/lang/Object");
        let owner = ThreadContext::new();
        object.monitor().enter(owner.id);

        let contender = heap::object_with_class_name("java/lang/Thread");
        init_new(&contender, None, Some("contender".into()));
        set_state(&contender, RUNNABLE);
        let (lock, me) = (object.clone(), contender.clone());
        let handle = std::thread::spawn(move || {
            let mut ctx = ThreadContext::for_thread(me);
            enter_monitor(&mut ctx, &lock);
            lock.monitor().exit(ctx.id).unwrap();
        });

        let deadline = Instant::now() + Duration::from_secs(5);
        while state(&contender) != BLOCKED {
            assert!(Instant::now() < deadline, "contender never blocked");
            std::thread::sleep(POLL);
        }
        assert_eq!(STATE_NAMES[state(&contender) as usize], "BLOCKED");
        object.monitor().exit(owner.id).unwrap();
        handle.join().unwrap();
        assert_eq!(state(&contender), RUNNABLE);
    }

    #[test]
    fn test_start_requires_new_thread() {
        let thread = heap::object_with_class_name("java/lang/Thread");
        init_new(&thread, None, None);
        set_state(&thread, TERMINATED);
        let err = start(&thread).unwrap_err();
        assert_eq!(err.to_string(), "java.lang.IllegalThreadStateException");
        assert_eq!(state(&thread), TERMINATED);
    }

    #[test]
    fn test_join_unstarted_returns() {
        let mut ctx = ThreadContext::new();
        let other = heap::object_with_class_name("java/lang/Thread");
        init_new(&other, None, Some("worker".into()));
        join(&mut ctx, &other, 0).unwrap();
        assert_eq!(
            heap::rust_string_or_null(&other.get("name").unwrap()).unwrap(),
            "worker"
        );
    }
}
