use super::*;
use crate::{
    class::builder::{Asm, ClassBuilder, Code},
    runtime::{ClinitStatus, exceptions, mtable, native},
};

fn define(mut builder: ClassBuilder, name: &str) -> Arc<Class> {
    class_loader::app().define_in_memory(name, builder.build());
    class_loader::app().load(name).unwrap()
}

fn call(class: &Arc<Class>, name: &str, descriptor: &str, args: Vec<Value>) -> NativeResult<Option<Value>> {
    let mut ctx = ThreadContext::new();
    let entry = mtable::resolve_static(class, name, descriptor)?;
    invoke_method(&mut ctx, &entry, args)
}

fn int_result(result: NativeResult<Option<Value>>) -> i32 {
    result.unwrap().unwrap().as_int().unwrap()
}

#[test]
fn test_counting_loop() {
    let code = Asm::new()
        .op(0x03) // iconst_0
        .op(0x3c) // istore_1
        .op(0x04) // iconst_1
        .op(0x3d) // istore_2
        .label("loop")
        .op(0x1c) // iload_2
        .op(0x1a) // iload_0
        .branch(0xa3, "done") // if_icmpgt
        .op(0x1b) // iload_1
        .op(0x1c) // iload_2
        .op(0x60) // iadd
        .op(0x3c) // istore_1
        .bytes(&[0x84, 2, 1]) // iinc 2 1
        .branch(0xa7, "loop") // goto
        .label("done")
        .op(0x1b) // iload_1
        .op(0xac) // ireturn
        .finish();
    let mut builder = ClassBuilder::new("interp/test/Loop", "java/lang/Object");
    builder.method(0x0009, "sum", "(I)I", Some(Code::new(2, 3, code)));
    let class = define(builder, "interp/test/Loop");

    assert_eq!(int_result(call(&class, "sum", "(I)I", vec![Value::int(10)])), 55);
    assert_eq!(int_result(call(&class, "sum", "(I)I", vec![Value::int(0)])), 0);
}

#[test]
fn test_long_arithmetic_wraps() {
    let mut builder = ClassBuilder::new("interp/test/Longs", "java/lang/Object");
    // lload_0 lload_2 lmul lreturn
    builder.method(0x0009, "mul", "(JJ)J", Some(Code::new(4, 4, vec![0x1e, 0x20, 0x69, 0xad])));
    let class = define(builder, "interp/test/Longs");

    let product = call(&class, "mul", "(JJ)J", vec![Value::long(1 << 40), Value::long(3)]);
    assert_eq!(product.unwrap().unwrap().as_long().unwrap(), 3 << 40);
    let product = call(&class, "mul", "(JJ)J", vec![Value::long(i64::MAX), Value::long(2)]);
    assert_eq!(product.unwrap().unwrap().as_long().unwrap(), -2);
}

#[test]
fn test_handler_catches_division_by_zero() {
    native::register_natives();
    let mut builder = ClassBuilder::new("interp/test/Divide", "java/lang/Object");
    let arithmetic = builder.class("java/lang/ArithmeticException");
    // iload_0 iload_1 idiv ireturn | astore_2 iconst_m1 ireturn
    let code = Code::new(2, 3, vec![0x1a, 0x1b, 0x6c, 0xac, 0x4d, 0x02, 0xac]).handler(0, 4, 4, arithmetic);
    builder.method(0x0009, "safe", "(II)I", Some(code));
    builder.method(0x0009, "raw", "(II)I", Some(Code::new(2, 2, vec![0x1a, 0x1b, 0x6c, 0xac])));
    let class = define(builder, "interp/test/Divide");

    assert_eq!(int_result(call(&class, "safe", "(II)I", vec![Value::int(9), Value::int(2)])), 4);
    assert_eq!(int_result(call(&class, "safe", "(II)I", vec![Value::int(9), Value::int(0)])), -1);

    let err = call(&class, "raw", "(II)I", vec![Value::int(1), Value::int(0)]).unwrap_err();
    assert!(err.to_string().starts_with("java.lang.ArithmeticException"), "{err}");
    let mut ctx = ThreadContext::new();
    let throwable = exceptions::materialize(&mut ctx, err).unwrap();
    assert_eq!(exceptions::message(&throwable).unwrap().as_deref(), Some("/ by zero"));
}

#[test]
fn test_instance_fields_and_virtual_calls() {
    let mut counter = ClassBuilder::new("interp/test/Counter", "java/lang/Object");
    counter.default_constructor();
    counter.field(0x0001, "n", "I");
    let n = counter.field_ref("interp/test/Counter", "n", "I");
    let [hi, lo] = n.to_be_bytes();
    // aload_0 dup getfield n iconst_1 iadd putfield n return
    counter.method(
        0x0001,
        "inc",
        "()V",
        Some(Code::new(3, 1, vec![0x2a, 0x59, 0xb4, hi, lo, 0x04, 0x60, 0xb5, hi, lo, 0xb1])),
    );
    define(counter, "interp/test/Counter");

    let mut driver = ClassBuilder::new("interp/test/CounterDriver", "java/lang/Object");
    let class = driver.class("interp/test/Counter");
    let init = driver.method_ref("interp/test/Counter", "<init>", "()V");
    let inc = driver.method_ref("interp/test/Counter", "inc", "()V");
    let n = driver.field_ref("interp/test/Counter", "n", "I");
    let code = Asm::new()
        .op_u16(0xbb, class) // new
        .op(0x59) // dup
        .op_u16(0xb7, init) // invokespecial
        .op(0x4b) // astore_0
        .op(0x2a)
        .op_u16(0xb6, inc) // invokevirtual
        .op(0x2a)
        .op_u16(0xb6, inc)
        .op(0x2a)
        .op_u16(0xb4, n) // getfield
        .op(0xac)
        .finish();
    driver.method(0x0009, "run", "()I", Some(Code::new(2, 1, code)));
    let driver = define(driver, "interp/test/CounterDriver");

    assert_eq!(int_result(call(&driver, "run", "()I", vec![])), 2);
}

#[test]
fn test_getstatic_runs_class_initializer() {
    let mut builder = ClassBuilder::new("interp/test/Config", "java/lang/Object");
    builder.field(0x0008, "X", "I");
    let x = builder.field_ref("interp/test/Config", "X", "I");
    let [hi, lo] = x.to_be_bytes();
    // bipush 42 putstatic X return
    builder.method(0x0008, "<clinit>", "()V", Some(Code::new(1, 0, vec![0x10, 42, 0xb3, hi, lo, 0xb1])));
    // getstatic X ireturn
    builder.method(0x0009, "get", "()I", Some(Code::new(1, 0, vec![0xb2, hi, lo, 0xac])));
    let class = define(builder, "interp/test/Config");

    assert_eq!(int_result(call(&class, "get", "()I", vec![])), 42);
    assert_eq!(class.clinit_status(), ClinitStatus::Done);
}

#[test]
fn test_int_arrays() {
    native::register_natives();
    let code = Asm::new()
        .op(0x06) // iconst_3
        .op_u8(0xbc, 10) // newarray int
        .op(0x4b) // astore_0
        .op(0x2a)
        .op(0x04)
        .op_u8(0x10, 7) // bipush 7
        .op(0x4f) // iastore
        .op(0x2a)
        .op(0x04)
        .op(0x2e) // iaload
        .op(0x2a)
        .op(0xbe) // arraylength
        .op(0x60)
        .op(0xac)
        .finish();
    let mut builder = ClassBuilder::new("interp/test/Arrays", "java/lang/Object");
    builder.method(0x0009, "fill", "()I", Some(Code::new(3, 1, code)));
    // iconst_3 newarray int iconst_3 iaload ireturn
    builder.method(0x0009, "overrun", "()I", Some(Code::new(2, 0, vec![0x06, 0xbc, 10, 0x06, 0x2e, 0xac])));
    let class = define(builder, "interp/test/Arrays");

    assert_eq!(int_result(call(&class, "fill", "()I", vec![])), 10);
    let err = call(&class, "overrun", "()I", vec![]).unwrap_err();
    let mut ctx = ThreadContext::new();
    let throwable = exceptions::materialize(&mut ctx, err).unwrap();
    assert_eq!(&*throwable.class_name(), "java/lang/ArrayIndexOutOfBoundsException");
    assert_eq!(
        exceptions::message(&throwable).unwrap().as_deref(),
        Some("Index 3 out of bounds for length 3")
    );
}

#[test]
fn test_unbounded_recursion_overflows() {
    native::register_natives();
    let mut builder = ClassBuilder::new("interp/test/Recurse", "java/lang/Object");
    let me = builder.method_ref("interp/test/Recurse", "down", "()V");
    let [hi, lo] = me.to_be_bytes();
    builder.method(0x0009, "down", "()V", Some(Code::new(0, 0, vec![0xb8, hi, lo, 0xb1])));
    let class = define(builder, "interp/test/Recurse");

    let err = call(&class, "down", "()V", vec![]).unwrap_err();
    assert!(err.to_string().starts_with("java.lang.StackOverflowError"), "{err}");
}

#[test]
fn test_string_constant_and_native_call() {
    native::register_natives();
    let mut builder = ClassBuilder::new("interp/test/Strings", "java/lang/Object");
    let hello = builder.string("hello");
    let length = builder.method_ref("java/lang/String", "length", "()I");
    let code = Asm::new()
        .op_u8(0x12, hello as u8) // ldc
        .op_u16(0xb6, length)
        .op(0xac)
        .finish();
    builder.method(0x0009, "len", "()I", Some(Code::new(1, 0, code)));
    let class = define(builder, "interp/test/Strings");

    assert_eq!(int_result(call(&class, "len", "()I", vec![])), 5);
}

#[test]
fn test_failed_class_initializer() {
    native::register_natives();
    let mut builder = ClassBuilder::new("interp/test/Broken", "java/lang/Object");
    builder.field(0x0008, "X", "I");
    let x = builder.field_ref("interp/test/Broken", "X", "I");
    // iconst_1 iconst_0 idiv pop return
    builder.method(0x0008, "<clinit>", "()V", Some(Code::new(2, 0, vec![0x04, 0x03, 0x6c, 0x57, 0xb1])));
    let [hi, lo] = x.to_be_bytes();
    builder.method(0x0009, "get", "()I", Some(Code::new(1, 0, vec![0xb2, hi, lo, 0xac])));
    let class = define(builder, "interp/test/Broken");

    let mut ctx = ThreadContext::new();
    let first = call(&class, "get", "()I", vec![]).unwrap_err();
    let first = exceptions::materialize(&mut ctx, first).unwrap();
    assert_eq!(&*first.class_name(), "java/lang/ExceptionInInitializerError");
    let cause = first.get_ref("cause").unwrap();
    assert_eq!(&*cause.class_name(), "java/lang/ArithmeticException");
    assert_eq!(class.clinit_status(), ClinitStatus::Failed);

    let second = call(&class, "get", "()I", vec![]).unwrap_err();
    let second = exceptions::materialize(&mut ctx, second).unwrap();
    assert_eq!(&*second.class_name(), "java/lang/NoClassDefFoundError");
    assert_eq!(
        exceptions::message(&second).unwrap().as_deref(),
        Some("Could not initialize class interp.test.Broken")
    );
}
