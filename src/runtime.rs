pub(crate) mod class_loader;
pub mod console;
pub(crate) mod exceptions;
mod famous_classes;
pub(crate) mod global;
pub(crate) mod heap;
pub(crate) mod inheritance;
pub(crate) mod interpreter;
pub(crate) mod method_area;
pub(crate) mod mtable;
pub(crate) mod native;
pub(crate) mod statics;
pub(crate) mod string_pool;
pub(crate) mod structs;
pub(crate) mod thread;
pub mod vm;

pub(crate) use heap::{reflection, string_table};
pub(crate) use structs::*;

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use once_cell::sync::Lazy;
    use parking_lot::{Mutex, MutexGuard};

    use crate::{
        class::builder::{Asm, ClassBuilder, Code},
        config::VmOptions,
        runtime::{class_loader, console, vm},
    };

    static VM: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    /// Shutdown state is process-wide, so whole-program runs take turns.
    pub(crate) fn exclusive_vm() -> MutexGuard<'static, ()> {
        VM.lock()
    }

    const MAIN: &str = "([Ljava/lang/String;)V";
    const PRINTLN: &str = "(Ljava/lang/String;)V";

    /// Runs `class` as a program and returns its status with everything it printed.
    fn run_program(class: &str) -> (i32, String, String) {
        let _vm = exclusive_vm();
        let capture = console::Capture::default();
        console::redirect(Some(Arc::clone(&capture)));
        let options = VmOptions {
            main_class: Some(class.replace('/', ".")),
            args: vec!["first".to_string()],
            ..VmOptions::default()
        };
        let status = vm::run(options).unwrap();
        console::redirect(None);
        let output = capture.lock();
        (
            status,
            String::from_utf8_lossy(&output.out).into_owned(),
            String::from_utf8_lossy(&output.err).into_owned(),
        )
    }

    fn define(mut builder: ClassBuilder, name: &str) {
        class_loader::app().define_in_memory(name, builder.build());
    }

    /// `getstatic System.out; ldc text; invokevirtual println`
    fn print(builder: &mut ClassBuilder, asm: &mut Asm, text: &str) {
        let out = builder.field_ref("java/lang/System", "out", "Ljava/io/PrintStream;");
        let text = builder.string(text);
        let println = builder.method_ref("java/io/PrintStream", "println", PRINTLN);
        asm.op_u16(0xb2, out).op_u16(0x13, text).op_u16(0xb6, println);
    }

    fn printing_method(builder: &mut ClassBuilder, flags: u16, name: &str, descriptor: &str, text: &str) {
        let mut asm = Asm::new();
        print(builder, &mut asm, text);
        let code = asm.op(0xb1).finish();
        builder.method(flags, name, descriptor, Some(Code::new(2, 1, code)));
    }

    #[test]
    fn test_hello_world() {
        let mut builder = ClassBuilder::new("e2e/Hello", "java/lang/Object");
        printing_method(&mut builder, 0x0009, "main", MAIN, "Hello, World!");
        define(builder, "e2e/Hello");

        let (status, out, err) = run_program("e2e/Hello");
        assert_eq!(status, 0);
        assert_eq!(out, "Hello, World!\n");
        assert_eq!(err, "");
    }

    #[test]
    fn test_uncaught_exception_exits_with_one() {
        let mut builder = ClassBuilder::new("e2e/Crash", "java/lang/Object");
        // iconst_1 iconst_0 idiv pop return
        let code = Code::new(2, 1, vec![0x04, 0x03, 0x6c, 0x57, 0xb1]).line(0, 7);
        builder.source_file("Crash.java");
        builder.method(0x0009, "main", MAIN, Some(code));
        define(builder, "e2e/Crash");

        let (status, out, err) = run_program("e2e/Crash");
        assert_eq!(status, 1);
        assert_eq!(out, "");
        assert!(
            err.starts_with(
                "Exception in thread \"main\" java.lang.ArithmeticException: / by zero\n\
                 \tat e2e.Crash.main(Crash.java:7)"
            ),
            "{err}"
        );
    }

    #[test]
    fn test_uncaught_trace_through_nested_frames() {
        let mut builder = ClassBuilder::new("e2e/Nested", "java/lang/Object");
        builder.source_file("Nested.java");
        let helper = builder.method_ref("e2e/Nested", "helper", "()V");
        // iconst_1 iconst_0 idiv pop return
        let failing = Code::new(2, 0, vec![0x04, 0x03, 0x6c, 0x57, 0xb1]).line(0, 11).line(2, 12);
        builder.method(0x0009, "helper", "()V", Some(failing));
        let code = Asm::new().op_u16(0xb8, helper).op(0xb1).finish();
        builder.method(0x0009, "main", MAIN, Some(Code::new(0, 1, code).line(0, 5)));
        define(builder, "e2e/Nested");

        let (status, _, err) = run_program("e2e/Nested");
        assert_eq!(status, 1);
        assert!(
            err.starts_with(
                "Exception in thread \"main\" java.lang.ArithmeticException: / by zero\n\
                 \tat e2e.Nested.helper(Nested.java:12)\n\
                 \tat e2e.Nested.main(Nested.java:5)\n"
            ),
            "{err}"
        );
    }

    #[test]
    fn test_join_sees_static_written_by_thread() {
        let mut worker = ClassBuilder::new("e2e/Joiner", "java/lang/Thread");
        worker.default_constructor();
        worker.field(0x0009, "value", "I");
        let value = worker.field_ref("e2e/Joiner", "value", "I");
        let code = Asm::new().op_u8(0x10, 42).op_u16(0xb3, value).op(0xb1).finish();
        worker.method(0x0001, "run", "()V", Some(Code::new(1, 1, code)));
        define(worker, "e2e/Joiner");

        let mut main = ClassBuilder::new("e2e/JoinMain", "java/lang/Object");
        let class = main.class("e2e/Joiner");
        let init = main.method_ref("e2e/Joiner", "<init>", "()V");
        let start = main.method_ref("e2e/Joiner", "start", "()V");
        let join = main.method_ref("e2e/Joiner", "join", "()V");
        let value = main.field_ref("e2e/Joiner", "value", "I");
        let out = main.field_ref("java/lang/System", "out", "Ljava/io/PrintStream;");
        let println = main.method_ref("java/io/PrintStream", "println", "(I)V");
        let code = Asm::new()
            .op_u16(0xbb, class)
            .op(0x59)
            .op_u16(0xb7, init)
            .op(0x4c) // astore_1
            .op(0x2b) // aload_1
            .op_u16(0xb6, start)
            .op(0x2b)
            .op_u16(0xb6, join)
            .op_u16(0xb2, out)
            .op_u16(0xb2, value)
            .op_u16(0xb6, println)
            .op(0xb1)
            .finish();
        main.method(0x0009, "main", MAIN, Some(Code::new(2, 2, code)));
        define(main, "e2e/JoinMain");

        let (status, out, _) = run_program("e2e/JoinMain");
        assert_eq!(status, 0);
        assert_eq!(out, "42\n");
    }

    #[test]
    fn test_system_exit_status() {
        let mut builder = ClassBuilder::new("e2e/Quit", "java/lang/Object");
        let exit = builder.method_ref("java/lang/System", "exit", "(I)V");
        let mut asm = Asm::new();
        asm.op(0x06).op_u16(0xb8, exit);
        print(&mut builder, &mut asm, "unreachable");
        let code = asm.op(0xb1).finish();
        builder.method(0x0009, "main", MAIN, Some(Code::new(2, 1, code)));
        define(builder, "e2e/Quit");

        let (status, out, _) = run_program("e2e/Quit");
        assert_eq!(status, 3);
        assert_eq!(out, "");
    }

    #[test]
    fn test_main_waits_for_started_thread() {
        let mut worker = ClassBuilder::new("e2e/Worker", "java/lang/Thread");
        worker.default_constructor();
        printing_method(&mut worker, 0x0001, "run", "()V", "from worker");
        define(worker, "e2e/Worker");

        let mut main = ClassBuilder::new("e2e/Spawner", "java/lang/Object");
        let class = main.class("e2e/Worker");
        let init = main.method_ref("e2e/Worker", "<init>", "()V");
        let start = main.method_ref("e2e/Worker", "start", "()V");
        let code = Asm::new()
            .op_u16(0xbb, class)
            .op(0x59)
            .op_u16(0xb7, init)
            .op_u16(0xb6, start)
            .op(0xb1)
            .finish();
        main.method(0x0009, "main", MAIN, Some(Code::new(2, 1, code)));
        define(main, "e2e/Spawner");

        let (status, out, _) = run_program("e2e/Spawner");
        assert_eq!(status, 0);
        assert_eq!(out, "from worker\n");
    }

    #[test]
    fn test_shutdown_hook_runs_last() {
        let mut hook = ClassBuilder::new("e2e/Hook", "java/lang/Thread");
        hook.default_constructor();
        printing_method(&mut hook, 0x0001, "run", "()V", "bye");
        define(hook, "e2e/Hook");

        let mut main = ClassBuilder::new("e2e/Hooked", "java/lang/Object");
        let get_runtime = main.method_ref("java/lang/Runtime", "getRuntime", "()Ljava/lang/Runtime;");
        let class = main.class("e2e/Hook");
        let init = main.method_ref("e2e/Hook", "<init>", "()V");
        let add = main.method_ref("java/lang/Runtime", "addShutdownHook", "(Ljava/lang/Thread;)V");
        let mut asm = Asm::new();
        asm.op_u16(0xb8, get_runtime)
            .op_u16(0xbb, class)
            .op(0x59)
            .op_u16(0xb7, init)
            .op_u16(0xb6, add);
        print(&mut main, &mut asm, "main done");
        let code = asm.op(0xb1).finish();
        main.method(0x0009, "main", MAIN, Some(Code::new(3, 1, code)));
        define(main, "e2e/Hooked");

        let (status, out, _) = run_program("e2e/Hooked");
        assert_eq!(status, 0);
        assert_eq!(out, "main done\nbye\n");
    }

    #[test]
    fn test_string_concatenation_site() {
        let mut builder = ClassBuilder::new("e2e/Concat", "java/lang/Object");
        let out = builder.field_ref("java/lang/System", "out", "Ljava/io/PrintStream;");
        let recipe = builder.string("args=\u{1}, n=\u{1}");
        let site = builder.invoke_dynamic(
            (
                "java/lang/invoke/StringConcatFactory",
                "makeConcatWithConstants",
                "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;\
                 Ljava/lang/invoke/MethodType;Ljava/lang/String;[Ljava/lang/Object;)\
                 Ljava/lang/invoke/CallSite;",
            ),
            vec![recipe],
            "makeConcatWithConstants",
            "(II)Ljava/lang/String;",
        );
        let println = builder.method_ref("java/io/PrintStream", "println", PRINTLN);
        let code = Asm::new()
            .op_u16(0xb2, out)
            .op(0x2a) // aload_0
            .op(0xbe) // arraylength
            .op_u8(0x10, 42)
            .op_u16(0xba, site)
            .bytes(&[0, 0])
            .op_u16(0xb6, println)
            .op(0xb1)
            .finish();
        builder.method(0x0009, "main", MAIN, Some(Code::new(3, 1, code)));
        define(builder, "e2e/Concat");

        let (status, out, _) = run_program("e2e/Concat");
        assert_eq!(status, 0);
        assert_eq!(out, "args=1, n=42\n");
    }
}
