use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use thiserror::Error;

use crate::{
    config::VmOptions,
    runtime::{
        Class, Exception, NativeResult, ObjectRef, Value, class_loader, console, exceptions,
        famous_classes, global, heap, interpreter, mtable, statics,
        thread::{self, ThreadContext},
    },
};

const MAIN_DESCRIPTOR: &str = "([Ljava/lang/String;)V";
/// Set before `<clinit>` so `assert` follows `-ea`/`-da`.
const ASSERTIONS_DISABLED: &str = "$assertionsDisabled";

pub const JAVA_VERSION: &str = "17";

static HOOKS: Lazy<Mutex<Vec<ObjectRef>>> = Lazy::new(|| Mutex::new(Vec::new()));
static SHUTTING_DOWN: AtomicBool = AtomicBool::new(false);

/// Failures that keep a program from starting at all.
#[derive(Debug, Error)]
pub enum VmError {
    #[error("no main class specified")]
    NoMainClass,
    #[error("Could not find or load main class {name}\nCaused by: {cause}")]
    MainClassNotFound { name: String, cause: String },
    #[error(
        "Main method not found in class {0}, please define the main method as:\n   public static void main(String[] args)"
    )]
    MainMethodNotFound(String),
    #[error("could not start the main thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

pub fn version_text() -> String {
    format!(
        "java version \"{JAVA_VERSION}\"\n{} (build {})\n{} VM (build {}, interpreted mode)\n",
        "CafeVM Runtime Environment",
        env!("CARGO_PKG_VERSION"),
        "CafeVM",
        env!("CARGO_PKG_VERSION"),
    )
}

/// Runs the program described by `options` and returns its exit status.
pub fn run(options: VmOptions) -> Result<i32, VmError> {
    if !global::install(options.clone()) {
        log::debug!("VM options already installed; keeping the first set");
    }
    SHUTTING_DOWN.store(false, Ordering::SeqCst);
    for path in &options.class_path {
        if let Err(err) = class_loader::app().add_class_path(path) {
            log::warn!("skipping class path entry {}: {err}", path.display());
        }
    }
    let main_class = options.main_class.clone().ok_or(VmError::NoMainClass)?;
    let args = options.args.clone();

    let capture = console::current();
    let main = std::thread::Builder::new()
        .name("main".to_string())
        .stack_size(thread::STACK_SIZE)
        .spawn(move || {
            console::redirect(capture);
            run_main(&main_class, args)
        })?;
    let status = main
        .join()
        .map_err(|_| VmError::Internal("the main thread panicked".to_string()))?;
    console::flush();
    status
}

fn run_main(class_name: &str, args: Vec<String>) -> Result<i32, VmError> {
    let mut ctx = ThreadContext::new();
    if let Err(err) = famous_classes::preload(&mut ctx) {
        return Err(VmError::Internal(format!("core classes: {err}")));
    }
    let dotted = class_name.replace('/', ".");
    let class = class_loader::app()
        .load(&class_name.replace('.', "/"))
        .map_err(|err| VmError::MainClassNotFound {
            name: dotted.clone(),
            cause: err.to_string(),
        })?;
    let is_main = class
        .declared_method("main", MAIN_DESCRIPTOR)
        .is_some_and(|m| m.is_static() && m.is_public());
    if !is_main {
        return Err(VmError::MainMethodNotFound(dotted));
    }

    let me = ctx.current_thread();
    log::info!("running {dotted}.main with {} argument(s)", args.len());
    let result = invoke_main(&mut ctx, &class, args);
    thread::set_state(&me, thread::TERMINATED);
    let status = match result {
        Ok(()) => 0,
        Err(Exception::Exit(code)) => {
            run_shutdown_hooks();
            return Ok(code);
        }
        Err(Exception::Fatal(message)) => {
            log::error!("VM fault in main: {message}");
            return Err(VmError::Internal(message));
        }
        Err(err) => {
            exceptions::uncaught(&mut ctx, err);
            1
        }
    };
    wait_for_non_daemon_threads();
    run_shutdown_hooks();
    Ok(status)
}

fn invoke_main(ctx: &mut ThreadContext, class: &Arc<Class>, args: Vec<String>) -> NativeResult<()> {
    if class
        .declared_field(ASSERTIONS_DISABLED)
        .is_some_and(|f| f.is_static())
    {
        let disabled = !global::options().assertions;
        statics::set(&class.name, ASSERTIONS_DISABLED, "Z", Value::boolean(disabled));
    }
    statics::initialize(ctx, class)?;
    let strings = args
        .iter()
        .map(|arg| Some(heap::string_object(arg)))
        .collect();
    let array = heap::ref_array_from("java/lang/String", strings);
    let entry = mtable::resolve_static(class, "main", MAIN_DESCRIPTOR)?;
    interpreter::invoke_method(ctx, &entry, vec![Value::Ref(array)])?;
    Ok(())
}

fn wait_for_non_daemon_threads() {
    loop {
        let live = thread::live_non_daemon();
        if live.is_empty() {
            return;
        }
        log::trace!("waiting for {} non-daemon thread(s)", live.len());
        std::thread::sleep(Duration::from_millis(2));
    }
}

/// `System.exit` from a thread other than `main`: hooks run, then the process ends.
pub(crate) fn exit_process(code: i32) -> ! {
    run_shutdown_hooks();
    console::flush();
    std::process::exit(code)
}

/// A VM fault on a thread other than `main`: the process ends with status 1
/// and shutdown hooks do not run.
pub(crate) fn abort(thread: &str, message: &str) -> ! {
    log::error!("VM fault in thread {thread}: {message}");
    console::write_err(format!("Error: internal error in thread \"{thread}\": {message}\n").as_bytes());
    console::flush();
    std::process::exit(1)
}

pub(crate) fn add_shutdown_hook(hook: ObjectRef) -> NativeResult<()> {
    if SHUTTING_DOWN.load(Ordering::SeqCst) {
        return Err(Exception::with_message(
            "java/lang/IllegalStateException",
            "Shutdown in progress",
        ));
    }
    if thread::state(&hook) != thread::NEW {
        return Err(Exception::with_message(
            "java/lang/IllegalArgumentException",
            "Hook already running",
        ));
    }
    let mut hooks = HOOKS.lock();
    if hooks.iter().any(|h| Arc::ptr_eq(h, &hook)) {
        return Err(Exception::with_message(
            "java/lang/IllegalArgumentException",
            "Hook previously registered",
        ));
    }
    hooks.push(hook);
    Ok(())
}

pub(crate) fn remove_shutdown_hook(hook: &ObjectRef) -> NativeResult<bool> {
    if SHUTTING_DOWN.load(Ordering::SeqCst) {
        return Err(Exception::with_message(
            "java/lang/IllegalStateException",
            "Shutdown in progress",
        ));
    }
    let mut hooks = HOOKS.lock();
    let before = hooks.len();
    hooks.retain(|h| !Arc::ptr_eq(h, hook));
    Ok(hooks.len() != before)
}

/// Starts every registered hook and waits for all of them. Runs at most once
/// per shutdown.
fn run_shutdown_hooks() {
    if SHUTTING_DOWN.swap(true, Ordering::SeqCst) {
        return;
    }
    let hooks = std::mem::take(&mut *HOOKS.lock());
    if hooks.is_empty() {
        return;
    }
    log::debug!("running {} shutdown hook(s)", hooks.len());
    for hook in &hooks {
        if let Err(err) = thread::start(hook) {
            log::warn!("shutdown hook did not start: {err}");
        }
    }
    for hook in &hooks {
        while thread::is_alive(hook) {
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unstarted_thread() -> ObjectRef {
        let hook = heap::object_with_class_name("java/lang/Thread");
        thread::init_new(&hook, None, None);
        hook
    }

    #[test]
    fn test_hook_registration_rules() {
        let _vm = crate::runtime::tests::exclusive_vm();
        SHUTTING_DOWN.store(false, Ordering::SeqCst);
        let hook = unstarted_thread();
        add_shutdown_hook(hook.clone()).unwrap();
        let again = add_shutdown_hook(hook.clone()).unwrap_err();
        assert_eq!(
            again.to_string(),
            "java.lang.IllegalArgumentException: Hook previously registered"
        );
        assert!(remove_shutdown_hook(&hook).unwrap());
        assert!(!remove_shutdown_hook(&hook).unwrap());
    }

    #[test]
    fn test_missing_main_class() {
        let _vm = crate::runtime::tests::exclusive_vm();
        let options = VmOptions {
            main_class: Some("vm.test.Absent".to_string()),
            class_path: Vec::new(),
            ..VmOptions::default()
        };
        match run(options) {
            Err(VmError::MainClassNotFound { name, cause }) => {
                assert_eq!(name, "vm.test.Absent");
                assert_eq!(cause, "java.lang.ClassNotFoundException: vm.test.Absent");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            run(VmOptions::default()),
            Err(VmError::NoMainClass)
        ));
    }
}
