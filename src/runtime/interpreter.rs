mod arrays;
mod fields;
pub(crate) mod frame;
mod indy;
mod instructions;
mod invoke;

use std::sync::Arc;

pub(crate) use frame::Frame;

use crate::runtime::{
    Class, Exception, MonitorError, NativeResult, ObjectRef, Value, class_loader, exceptions,
    global, heap, inheritance,
    mtable::{GmEntry, JmEntry, MethodEntry, NativeEnv},
    reflection, statics, string_table,
    structs::ConstantPoolInfo,
    thread::{self, ThreadContext},
};

/// What the dispatch loop needs from [`run`].
pub(crate) enum Next {
    /// Call `entry`; `pc` already points past the invoke instruction.
    Invoke(Arc<MethodEntry>, Vec<Value>),
    Return(Option<Value>),
    Throw(Exception),
    /// Initialize the class, then retry the instruction at `exception_pc`.
    Initialize(Arc<Class>),
    /// `monitorenter` on a monitor another thread holds.
    Block(ObjectRef),
}

struct InterpreterEnv<'f> {
    frame: &'f mut Frame,
    thread_id: i64,
}

/// Runs `entry` with `args` (one value per parameter, receiver first) and
/// returns its result. Exceptions not handled inside come back as `Err`.
pub(crate) fn invoke_method(
    ctx: &mut ThreadContext,
    entry: &Arc<MethodEntry>,
    args: Vec<Value>,
) -> NativeResult<Option<Value>> {
    match entry.as_ref() {
        MethodEntry::Native(gm) => call_native(ctx, gm, args),
        MethodEntry::Java(jm) => {
            let base = ctx.frames.len();
            push_frame(ctx, jm, args)?;
            run(ctx, base)
        }
    }
}

fn call_native(ctx: &mut ThreadContext, gm: &GmEntry, args: Vec<Value>) -> NativeResult<Option<Value>> {
    log::trace!("native {}", gm.key);
    let mut env = NativeEnv::new(if gm.needs_context { Some(ctx) } else { None });
    (gm.function)(&mut env, args)
}

fn push_frame(ctx: &mut ThreadContext, jm: &JmEntry, args: Vec<Value>) -> NativeResult<()> {
    if ctx.frames.len() >= global::max_frame_depth() {
        return Err(Exception::new("java/lang/StackOverflowError"));
    }
    let monitor = if jm.method.is_synchronized() {
        let monitor = if jm.method.is_static() {
            reflection::class_mirror(&jm.class)
        } else {
            args.first()
                .ok_or_else(|| Exception::fatal("synchronized method without receiver"))?
                .as_object()?
        };
        thread::enter_monitor(ctx, &monitor);
        Some(monitor)
    } else {
        None
    };
    log::trace!("invoke {}.{}{}", jm.class.name, jm.method.name, jm.method.descriptor);
    let frame = Frame::new(jm, args, monitor)?;
    ctx.frames.push_front(frame);
    Ok(())
}

fn pop_frame(ctx: &mut ThreadContext) -> NativeResult<Frame> {
    let frame = ctx
        .frames
        .pop_front()
        .ok_or_else(|| Exception::fatal("frame stack underflow"))?;
    if let Some(monitor) = &frame.monitor {
        monitor
            .monitor()
            .exit(ctx.id)
            .map_err(|_| Exception::new("java/lang/IllegalMonitorStateException"))?;
    }
    Ok(frame)
}

fn current_frame(ctx: &mut ThreadContext) -> NativeResult<&mut Frame> {
    ctx.frames
        .front_mut()
        .ok_or_else(|| Exception::fatal("no current frame"))
}

fn run(ctx: &mut ThreadContext, base: usize) -> NativeResult<Option<Value>> {
    loop {
        let thread_id = ctx.id;
        let next = InterpreterEnv {
            frame: current_frame(ctx)?,
            thread_id,
        }
        .execute();

        let outcome = match next {
            Next::Invoke(entry, args) => invoke(ctx, &entry, args),
            Next::Return(value) => {
                let frame = pop_frame(ctx)?;
                if ctx.frames.len() <= base {
                    return Ok(value);
                }
                match value {
                    Some(value) => current_frame(ctx)?
                        .push_slots(value, frame.method.parsed.return_slots()),
                    None => Ok(()),
                }
            }
            Next::Throw(err) => Err(err),
            Next::Initialize(class) => statics::initialize(ctx, &class),
            Next::Block(object) => {
                thread::enter_monitor(ctx, &object);
                Ok(())
            }
        };
        if let Err(err) = outcome {
            unwind(ctx, base, err)?;
        }
    }
}

fn invoke(ctx: &mut ThreadContext, entry: &Arc<MethodEntry>, args: Vec<Value>) -> NativeResult<()> {
    match entry.as_ref() {
        MethodEntry::Java(jm) => push_frame(ctx, jm, args),
        MethodEntry::Native(gm) => {
            let result = call_native(ctx, gm, args)?;
            let slots = gm.descriptor.return_slots();
            match result {
                Some(value) if slots > 0 => current_frame(ctx)?.push_slots(value, slots),
                _ => Ok(()),
            }
        }
    }
}

/// Transfers control to the nearest handler for `err`. Returns the error when
/// no frame above `base` handles it; those frames are gone by then.
fn unwind(ctx: &mut ThreadContext, base: usize, err: Exception) -> NativeResult<()> {
    let thrown = if err.is_catchable() {
        exceptions::materialize(ctx, err)
    } else {
        Err(err)
    };
    let thrown = match thrown {
        Ok(thrown) => thrown,
        Err(err) => {
            while ctx.frames.len() > base {
                let _ = pop_frame(ctx);
            }
            return Err(err);
        }
    };
    let class = heap::class_of(&thrown)?;

    while ctx.frames.len() > base {
        let frame = current_frame(ctx)?;
        if let Some(handler) = find_handler(frame, &class) {
            log::trace!(
                "{} caught in {}.{} at pc {}",
                class.name,
                frame.class.name,
                frame.method.name,
                frame.exception_pc
            );
            frame.clear_stack();
            frame.push(Value::Ref(thrown))?;
            frame.pc = handler;
            return Ok(());
        }
        let _ = pop_frame(ctx);
    }
    Err(Exception::Thrown(thrown))
}

fn find_handler(frame: &Frame, thrown: &Arc<Class>) -> Option<usize> {
    frame
        .code
        .exception_table
        .iter()
        .find(|item| {
            item.covers(frame.exception_pc)
                && item
                    .catch_type
                    .as_ref()
                    .is_none_or(|catch| inheritance::is_subclass_named(thrown, catch))
        })
        .map(|item| item.handler_pc as usize)
}

fn null_pointer() -> Exception {
    Exception::new("java/lang/NullPointerException")
}

impl InterpreterEnv<'_> {
    fn execute(&mut self) -> Next {
        macro_rules! except {
            ($expr:expr $(,)?) => {
                match $expr {
                    ::std::result::Result::Ok(val) => val,
                    ::std::result::Result::Err(err) => {
                        return Next::Throw(err);
                    }
                }
            };
        }
        macro_rules! initialize_first {
            ($expr:expr) => {
                if let Some(class) = except!($expr) {
                    self.frame.pc = self.frame.exception_pc;
                    return Next::Initialize(class);
                }
            };
        }
        macro_rules! leave {
            ($expr:expr) => {{
                let next = except!($expr);
                match next {
                    Next::Invoke(..) | Next::Return(_) | Next::Block(_) => self.frame.pc += 1,
                    Next::Throw(_) | Next::Initialize(_) => self.frame.pc = self.frame.exception_pc,
                }
                return next;
            }};
        }
        macro_rules! binary {
            ($pop:ident, $push:ident, |$a:ident, $b:ident| $body:expr) => {{
                let $b = except!(self.frame.$pop());
                let $a = except!(self.frame.$pop());
                except!(self.frame.$push($body));
            }};
        }
        macro_rules! unary {
            ($pop:ident, $push:ident, |$a:ident| $body:expr) => {{
                let $a = except!(self.frame.$pop());
                except!(self.frame.$push($body));
            }};
        }
        macro_rules! branch_if {
            ($cond:expr) => {{
                let offset = self.i16_arg() as isize;
                if $cond {
                    self.jump(offset);
                    continue;
                }
            }};
        }

        use instructions as inst;
        loop {
            self.frame.exception_pc = self.frame.pc;
            let Some(&op) = self.frame.code.code.get(self.frame.pc) else {
                return Next::Throw(Exception::fatal(format!(
                    "pc {} outside the code of {}.{}",
                    self.frame.pc, self.frame.class.name, self.frame.method.name
                )));
            };
            match op {
                inst::NOP => {}

                // constants
                inst::ACONST_NULL => except!(self.frame.push(Value::Null)),
                inst::ICONST_M1..=inst::ICONST_5 => {
                    except!(self.frame.push_int(op as i32 - inst::ICONST_0 as i32))
                }
                inst::LCONST_0 | inst::LCONST_1 => {
                    except!(self.frame.push_long((op - inst::LCONST_0) as i64))
                }
                inst::FCONST_0..=inst::FCONST_2 => {
                    except!(self.frame.push_float((op - inst::FCONST_0) as f32))
                }
                inst::DCONST_0 | inst::DCONST_1 => {
                    except!(self.frame.push_double((op - inst::DCONST_0) as f64))
                }
                inst::BIPUSH => {
                    let v = self.i8_arg();
                    except!(self.frame.push_int(v as i32));
                }
                inst::SIPUSH => {
                    let v = self.i16_arg();
                    except!(self.frame.push_int(v as i32));
                }
                inst::LDC => {
                    let index = self.u8_arg() as u16;
                    except!(self.ldc(index));
                }
                inst::LDC_W | inst::LDC2_W => {
                    let index = self.u16_arg();
                    except!(self.ldc(index));
                }

                // loads
                inst::ILOAD | inst::FLOAD | inst::ALOAD => {
                    let index = self.u8_arg() as usize;
                    except!(self.load(index, 1));
                }
                inst::LLOAD | inst::DLOAD => {
                    let index = self.u8_arg() as usize;
                    except!(self.load(index, 2));
                }
                inst::ILOAD_0..=inst::ILOAD_3 => except!(self.load((op - inst::ILOAD_0) as usize, 1)),
                inst::FLOAD_0..=inst::FLOAD_3 => except!(self.load((op - inst::FLOAD_0) as usize, 1)),
                inst::ALOAD_0..=inst::ALOAD_3 => except!(self.load((op - inst::ALOAD_0) as usize, 1)),
                inst::LLOAD_0..=inst::LLOAD_3 => except!(self.load((op - inst::LLOAD_0) as usize, 2)),
                inst::DLOAD_0..=inst::DLOAD_3 => except!(self.load((op - inst::DLOAD_0) as usize, 2)),
                inst::IALOAD | inst::CALOAD | inst::SALOAD => {
                    let v = except!(self.load_ints());
                    except!(self.frame.push_int(v as i32));
                }
                inst::LALOAD => {
                    let v = except!(self.load_ints());
                    except!(self.frame.push_long(v));
                }
                inst::BALOAD => {
                    let v = except!(self.load_bytes());
                    except!(self.frame.push_int(v as i32));
                }
                inst::FALOAD => {
                    let v = except!(self.load_floats());
                    except!(self.frame.push(Value::Float(v)));
                }
                inst::DALOAD => {
                    let v = except!(self.load_floats());
                    except!(self.frame.push_double(v));
                }
                inst::AALOAD => {
                    let v = except!(self.load_refs());
                    except!(self.frame.push(Value::reference(v)));
                }

                // stores
                inst::ISTORE | inst::FSTORE | inst::ASTORE => {
                    let index = self.u8_arg() as usize;
                    except!(self.store(index, 1));
                }
                inst::LSTORE | inst::DSTORE => {
                    let index = self.u8_arg() as usize;
                    except!(self.store(index, 2));
                }
                inst::ISTORE_0..=inst::ISTORE_3 => except!(self.store((op - inst::ISTORE_0) as usize, 1)),
                inst::FSTORE_0..=inst::FSTORE_3 => except!(self.store((op - inst::FSTORE_0) as usize, 1)),
                inst::ASTORE_0..=inst::ASTORE_3 => except!(self.store((op - inst::ASTORE_0) as usize, 1)),
                inst::LSTORE_0..=inst::LSTORE_3 => except!(self.store((op - inst::LSTORE_0) as usize, 2)),
                inst::DSTORE_0..=inst::DSTORE_3 => except!(self.store((op - inst::DSTORE_0) as usize, 2)),
                inst::IASTORE => {
                    let v = except!(self.frame.pop_int());
                    except!(self.store_ints(v as i64));
                }
                inst::CASTORE => {
                    let v = except!(self.frame.pop_int());
                    except!(self.store_ints(v as u16 as i64));
                }
                inst::SASTORE => {
                    let v = except!(self.frame.pop_int());
                    except!(self.store_ints(v as i16 as i64));
                }
                inst::LASTORE => {
                    let v = except!(self.frame.pop_long());
                    except!(self.store_ints(v));
                }
                inst::BASTORE => {
                    let v = except!(self.frame.pop_int());
                    except!(self.store_bytes(v as i8));
                }
                inst::FASTORE => {
                    let v = except!(self.frame.pop_float());
                    except!(self.store_floats(v as f64));
                }
                inst::DASTORE => {
                    let v = except!(self.frame.pop_double());
                    except!(self.store_floats(v));
                }
                inst::AASTORE => except!(self.store_reference()),

                // stack
                inst::POP => {
                    except!(self.frame.pop());
                }
                inst::POP2 => {
                    except!(self.frame.pop());
                    except!(self.frame.pop());
                }
                inst::DUP => {
                    let v = except!(self.frame.peek(0)).clone();
                    except!(self.frame.push(v));
                }
                inst::DUP_X1 => except!(self.shuffle(2, &[0, 1, 0])),
                inst::DUP_X2 => except!(self.shuffle(3, &[0, 2, 1, 0])),
                inst::DUP2 => except!(self.shuffle(2, &[1, 0, 1, 0])),
                inst::DUP2_X1 => except!(self.shuffle(3, &[1, 0, 2, 1, 0])),
                inst::DUP2_X2 => except!(self.shuffle(4, &[1, 0, 3, 2, 1, 0])),
                inst::SWAP => except!(self.shuffle(2, &[0, 1])),

                // arithmetic
                inst::IADD => binary!(pop_int, push_int, |a, b| a.wrapping_add(b)),
                inst::LADD => binary!(pop_long, push_long, |a, b| a.wrapping_add(b)),
                inst::FADD => binary!(pop_float, push_float, |a, b| a + b),
                inst::DADD => binary!(pop_double, push_double, |a, b| a + b),
                inst::ISUB => binary!(pop_int, push_int, |a, b| a.wrapping_sub(b)),
                inst::LSUB => binary!(pop_long, push_long, |a, b| a.wrapping_sub(b)),
                inst::FSUB => binary!(pop_float, push_float, |a, b| a - b),
                inst::DSUB => binary!(pop_double, push_double, |a, b| a - b),
                inst::IMUL => binary!(pop_int, push_int, |a, b| a.wrapping_mul(b)),
                inst::LMUL => binary!(pop_long, push_long, |a, b| a.wrapping_mul(b)),
                inst::FMUL => binary!(pop_float, push_float, |a, b| a * b),
                inst::DMUL => binary!(pop_double, push_double, |a, b| a * b),
                inst::IDIV => {
                    let b = except!(self.frame.pop_int());
                    let a = except!(self.frame.pop_int());
                    except!(check_divisor(b as i64));
                    except!(self.frame.push_int(a.wrapping_div(b)));
                }
                inst::LDIV => {
                    let b = except!(self.frame.pop_long());
                    let a = except!(self.frame.pop_long());
                    except!(check_divisor(b));
                    except!(self.frame.push_long(a.wrapping_div(b)));
                }
                inst::FDIV => binary!(pop_float, push_float, |a, b| a / b),
                inst::DDIV => binary!(pop_double, push_double, |a, b| a / b),
                inst::IREM => {
                    let b = except!(self.frame.pop_int());
                    let a = except!(self.frame.pop_int());
                    except!(check_divisor(b as i64));
                    except!(self.frame.push_int(a.wrapping_rem(b)));
                }
                inst::LREM => {
                    let b = except!(self.frame.pop_long());
                    let a = except!(self.frame.pop_long());
                    except!(check_divisor(b));
                    except!(self.frame.push_long(a.wrapping_rem(b)));
                }
                inst::FREM => binary!(pop_float, push_float, |a, b| a % b),
                inst::DREM => binary!(pop_double, push_double, |a, b| a % b),
                inst::INEG => unary!(pop_int, push_int, |a| a.wrapping_neg()),
                inst::LNEG => unary!(pop_long, push_long, |a| a.wrapping_neg()),
                inst::FNEG => unary!(pop_float, push_float, |a| -a),
                inst::DNEG => unary!(pop_double, push_double, |a| -a),
                inst::ISHL => binary!(pop_int, push_int, |a, b| a.wrapping_shl(b as u32 & 0x1f)),
                inst::ISHR => binary!(pop_int, push_int, |a, b| a.wrapping_shr(b as u32 & 0x1f)),
                inst::IUSHR => {
                    binary!(pop_int, push_int, |a, b| ((a as u32) >> (b as u32 & 0x1f)) as i32)
                }
                inst::LSHL | inst::LSHR | inst::LUSHR => {
                    let shift = except!(self.frame.pop_int()) as u32 & 0x3f;
                    let v = except!(self.frame.pop_long());
                    let result = match op {
                        inst::LSHL => v.wrapping_shl(shift),
                        inst::LSHR => v.wrapping_shr(shift),
                        _ => ((v as u64) >> shift) as i64,
                    };
                    except!(self.frame.push_long(result));
                }
                inst::IAND => binary!(pop_int, push_int, |a, b| a & b),
                inst::LAND => binary!(pop_long, push_long, |a, b| a & b),
                inst::IOR => binary!(pop_int, push_int, |a, b| a | b),
                inst::LOR => binary!(pop_long, push_long, |a, b| a | b),
                inst::IXOR => binary!(pop_int, push_int, |a, b| a ^ b),
                inst::LXOR => binary!(pop_long, push_long, |a, b| a ^ b),
                inst::IINC => {
                    let index = self.u8_arg() as usize;
                    let delta = self.i8_arg() as i32;
                    except!(self.iinc(index, delta));
                }

                // conversions; float to integer casts saturate and map NaN to 0
                inst::I2L => unary!(pop_int, push_long, |a| a as i64),
                inst::I2F => unary!(pop_int, push_float, |a| a as f32),
                inst::I2D => unary!(pop_int, push_double, |a| a as f64),
                inst::L2I => unary!(pop_long, push_int, |a| a as i32),
                inst::L2F => unary!(pop_long, push_float, |a| a as f32),
                inst::L2D => unary!(pop_long, push_double, |a| a as f64),
                inst::F2I => unary!(pop_float, push_int, |a| a as i32),
                inst::F2L => unary!(pop_float, push_long, |a| a as i64),
                inst::F2D => unary!(pop_float, push_double, |a| a as f64),
                inst::D2I => unary!(pop_double, push_int, |a| a as i32),
                inst::D2L => unary!(pop_double, push_long, |a| a as i64),
                inst::D2F => unary!(pop_double, push_float, |a| a as f32),
                inst::I2B => unary!(pop_int, push_int, |a| a as i8 as i32),
                inst::I2C => unary!(pop_int, push_int, |a| a as u16 as i32),
                inst::I2S => unary!(pop_int, push_int, |a| a as i16 as i32),

                // comparisons
                inst::LCMP => binary!(pop_long, push_int, |a, b| a.cmp(&b) as i32),
                inst::FCMPL => binary!(pop_float, push_int, |a, b| compare_floats(a as f64, b as f64, -1)),
                inst::FCMPG => binary!(pop_float, push_int, |a, b| compare_floats(a as f64, b as f64, 1)),
                inst::DCMPL => binary!(pop_double, push_int, |a, b| compare_floats(a, b, -1)),
                inst::DCMPG => binary!(pop_double, push_int, |a, b| compare_floats(a, b, 1)),
                inst::IFEQ..=inst::IFLE => {
                    let v = except!(self.frame.pop_int());
                    branch_if!(match op {
                        inst::IFEQ => v == 0,
                        inst::IFNE => v != 0,
                        inst::IFLT => v < 0,
                        inst::IFGE => v >= 0,
                        inst::IFGT => v > 0,
                        _ => v <= 0,
                    });
                }
                inst::IF_ICMPEQ..=inst::IF_ICMPLE => {
                    let b = except!(self.frame.pop_int());
                    let a = except!(self.frame.pop_int());
                    branch_if!(match op {
                        inst::IF_ICMPEQ => a == b,
                        inst::IF_ICMPNE => a != b,
                        inst::IF_ICMPLT => a < b,
                        inst::IF_ICMPGE => a >= b,
                        inst::IF_ICMPGT => a > b,
                        _ => a <= b,
                    });
                }
                inst::IF_ACMPEQ | inst::IF_ACMPNE => {
                    let b = except!(self.frame.pop());
                    let a = except!(self.frame.pop());
                    branch_if!(a.same_ref(&b) == (op == inst::IF_ACMPEQ));
                }
                inst::IFNULL | inst::IFNONNULL => {
                    let v = except!(self.frame.pop());
                    branch_if!(v.is_null() == (op == inst::IFNULL));
                }

                // control
                inst::GOTO => branch_if!(true),
                inst::GOTO_W => {
                    let offset = self.i32_arg() as isize;
                    self.jump(offset);
                    continue;
                }
                inst::JSR | inst::JSR_W => {
                    let offset = if op == inst::JSR {
                        self.i16_arg() as isize
                    } else {
                        self.i32_arg() as isize
                    };
                    let return_address = self.frame.pc + 1;
                    except!(self.frame.push(Value::long(return_address as i64)));
                    self.jump(offset);
                    continue;
                }
                inst::RET => {
                    let index = self.u8_arg() as usize;
                    let target = except!(except!(self.frame.load(index)).as_long());
                    self.frame.pc = target as usize;
                    continue;
                }
                inst::TABLESWITCH => {
                    let target = except!(self.table_switch());
                    self.frame.pc = target;
                    continue;
                }
                inst::LOOKUPSWITCH => {
                    let target = except!(self.lookup_switch());
                    self.frame.pc = target;
                    continue;
                }

                // returns
                inst::IRETURN | inst::FRETURN | inst::ARETURN => {
                    let v = except!(self.frame.pop());
                    return Next::Return(Some(v));
                }
                inst::LRETURN | inst::DRETURN => {
                    let v = except!(self.frame.pop_wide());
                    return Next::Return(Some(v));
                }
                inst::RETURN => return Next::Return(None),

                // fields
                inst::GETSTATIC => initialize_first!(self.get_static()),
                inst::PUTSTATIC => initialize_first!(self.put_static()),
                inst::GETFIELD => except!(self.get_field()),
                inst::PUTFIELD => except!(self.put_field()),

                // invocation
                inst::INVOKEVIRTUAL => leave!(self.invoke_virtual(false)),
                inst::INVOKEINTERFACE => leave!(self.invoke_virtual(true)),
                inst::INVOKESPECIAL => leave!(self.invoke_special()),
                inst::INVOKESTATIC => leave!(self.invoke_static()),
                inst::INVOKEDYNAMIC => leave!(self.invoke_dynamic()),

                // objects
                inst::NEW => initialize_first!(self.new_object()),
                inst::NEWARRAY => {
                    let tag = self.u8_arg();
                    except!(self.new_primitive_array(tag));
                }
                inst::ANEWARRAY => {
                    let index = self.u16_arg();
                    except!(self.new_ref_array(index));
                }
                inst::MULTIANEWARRAY => {
                    let index = self.u16_arg();
                    let dimensions = self.u8_arg();
                    except!(self.new_multi_array(index, dimensions));
                }
                inst::ARRAYLENGTH => except!(self.array_length()),
                inst::ATHROW => {
                    let thrown = except!(self.frame.pop_ref());
                    return Next::Throw(match thrown {
                        Some(thrown) => Exception::Thrown(thrown),
                        None => null_pointer(),
                    });
                }
                inst::CHECKCAST => {
                    let index = self.u16_arg();
                    except!(self.check_cast(index));
                }
                inst::INSTANCEOF => {
                    let index = self.u16_arg();
                    except!(self.instance_of(index));
                }
                inst::MONITORENTER => {
                    let object = except!(except!(self.frame.pop()).as_object());
                    if !object.monitor().try_enter(self.thread_id) {
                        self.frame.pc += 1;
                        return Next::Block(object);
                    }
                }
                inst::MONITOREXIT => {
                    let object = except!(except!(self.frame.pop()).as_object());
                    except!(monitor_exit(&object, self.thread_id));
                }

                inst::WIDE => except!(self.wide()),

                _ => {
                    return Next::Throw(Exception::fatal(format!(
                        "unknown opcode {op:#04x} at {}.{} pc {}",
                        self.frame.class.name, self.frame.method.name, self.frame.pc
                    )));
                }
            }

            self.frame.pc += 1;
        }
    }

    #[inline]
    fn u8_arg(&mut self) -> u8 {
        self.frame.pc += 1;
        self.frame.code.code.get(self.frame.pc).copied().unwrap_or(0)
    }

    #[inline]
    fn i8_arg(&mut self) -> i8 {
        self.u8_arg() as i8
    }

    #[inline]
    fn u16_arg(&mut self) -> u16 {
        let high = self.u8_arg() as u16;
        let low = self.u8_arg() as u16;
        (high << 8) | low
    }

    #[inline]
    fn i16_arg(&mut self) -> i16 {
        self.u16_arg() as i16
    }

    #[inline]
    fn i32_arg(&mut self) -> i32 {
        let high = self.u16_arg() as u32;
        let low = self.u16_arg() as u32;
        ((high << 16) | low) as i32
    }

    fn i32_at(&self, at: usize) -> NativeResult<i32> {
        let bytes = self
            .frame
            .code
            .code
            .get(at..at + 4)
            .ok_or_else(|| Exception::fatal("switch operands past the end of the code"))?;
        Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn jump(&mut self, offset: isize) {
        self.frame.pc = (self.frame.exception_pc as isize + offset) as usize;
    }

    fn load(&mut self, index: usize, slots: usize) -> NativeResult<()> {
        let value = self.frame.load(index)?;
        self.frame.push_slots(value, slots)
    }

    fn store(&mut self, index: usize, slots: usize) -> NativeResult<()> {
        let value = if slots == 2 {
            self.frame.pop_wide()?
        } else {
            self.frame.pop()?
        };
        if slots == 2 {
            self.frame.store(index + 1, value.clone())?;
        }
        self.frame.store(index, value)
    }

    fn iinc(&mut self, index: usize, delta: i32) -> NativeResult<()> {
        let v = self.frame.load(index)?.as_int()?;
        self.frame.store(index, Value::int(v.wrapping_add(delta)))
    }

    /// Pops `count` slots and pushes them back in `order`, given as depths
    /// from the original top (0 is the top).
    fn shuffle(&mut self, count: usize, order: &[usize]) -> NativeResult<()> {
        let mut popped = Vec::with_capacity(count);
        for _ in 0..count {
            popped.push(self.frame.pop()?);
        }
        for depth in order {
            self.frame.push(popped[*depth].clone())?;
        }
        Ok(())
    }

    fn wide(&mut self) -> NativeResult<()> {
        use instructions as inst;
        let op = self.u8_arg();
        let index = self.u16_arg() as usize;
        match op {
            inst::ILOAD | inst::FLOAD | inst::ALOAD => self.load(index, 1),
            inst::LLOAD | inst::DLOAD => self.load(index, 2),
            inst::ISTORE | inst::FSTORE | inst::ASTORE => self.store(index, 1),
            inst::LSTORE | inst::DSTORE => self.store(index, 2),
            inst::IINC => {
                let delta = self.i16_arg() as i32;
                self.iinc(index, delta)
            }
            inst::RET => {
                let target = self.frame.load(index)?.as_long()?;
                // the dispatch loop adds one after every instruction
                self.frame.pc = (target as usize).wrapping_sub(1);
                Ok(())
            }
            _ => Err(Exception::fatal(format!("wide applied to opcode {op:#04x}"))),
        }
    }

    fn switch_operands(&self) -> usize {
        (self.frame.exception_pc + 4) & !3
    }

    fn table_switch(&mut self) -> NativeResult<usize> {
        let key = self.frame.pop_int()?;
        let at = self.switch_operands();
        let default = self.i32_at(at)?;
        let low = self.i32_at(at + 4)?;
        let high = self.i32_at(at + 8)?;
        let offset = if key < low || key > high {
            default
        } else {
            self.i32_at(at + 12 + 4 * (key - low) as usize)?
        };
        Ok((self.frame.exception_pc as isize + offset as isize) as usize)
    }

    fn lookup_switch(&mut self) -> NativeResult<usize> {
        let key = self.frame.pop_int()?;
        let at = self.switch_operands();
        let default = self.i32_at(at)?;
        let pairs = self.i32_at(at + 4)?.max(0) as usize;
        let mut offset = default;
        for pair in 0..pairs {
            let pair_at = at + 8 + pair * 8;
            if self.i32_at(pair_at)? == key {
                offset = self.i32_at(pair_at + 4)?;
                break;
            }
        }
        Ok((self.frame.exception_pc as isize + offset as isize) as usize)
    }

    fn ldc(&mut self, index: u16) -> NativeResult<()> {
        let class = Arc::clone(&self.frame.class);
        match class.constant(index) {
            Some(ConstantPoolInfo::Integer(v)) => self.frame.push_int(*v),
            Some(ConstantPoolInfo::Float(v)) => self.frame.push_float(*v),
            Some(ConstantPoolInfo::Long(v)) => self.frame.push_long(*v),
            Some(ConstantPoolInfo::Double(v)) => self.frame.push_double(*v),
            Some(ConstantPoolInfo::String(s)) => self.frame.push(Value::Ref(string_table::intern(s))),
            Some(ConstantPoolInfo::Class(_)) => {
                let target = self.resolve_class(index)?;
                self.frame.push(Value::Ref(reflection::class_mirror(&target)))
            }
            Some(
                ConstantPoolInfo::MethodType(_)
                | ConstantPoolInfo::MethodHandle { .. }
                | ConstantPoolInfo::Dynamic { .. },
            ) => Err(Exception::with_message(
                "java/lang/UnsupportedOperationException",
                "dynamically-computed constants",
            )),
            other => Err(Exception::fatal(format!("ldc of {other:?}"))),
        }
    }

    fn resolve_class(&self, index: u16) -> NativeResult<Arc<Class>> {
        let class = &self.frame.class;
        let Some(ConstantPoolInfo::Class(info)) = class.constant(index) else {
            return Err(Exception::fatal(format!(
                "constant {index} of {} is not a class",
                class.name
            )));
        };
        info.get_or_load_class(|| {
            class_loader::loader_of(class)
                .load(&info.name)
                .map_err(class_loader::linkage_error)
        })
    }

    fn check_cast(&mut self, index: u16) -> NativeResult<()> {
        let Some(object) = self.frame.peek(0)?.as_ref()? else {
            return Ok(());
        };
        let target = self.resolve_class(index)?;
        if inheritance::is_instance_of(&object, &target)? {
            return Ok(());
        }
        Err(Exception::with_message(
            "java/lang/ClassCastException",
            format!(
                "class {} cannot be cast to class {}",
                object.class_name().replace('/', "."),
                target.name.replace('/', ".")
            ),
        ))
    }

    fn instance_of(&mut self, index: u16) -> NativeResult<()> {
        let result = match self.frame.pop_ref()? {
            Some(object) => inheritance::is_instance_of(&object, &self.resolve_class(index)?)?,
            None => false,
        };
        self.frame.push_int(result as i32)
    }
}

fn check_divisor(divisor: i64) -> NativeResult<()> {
    if divisor == 0 {
        return Err(Exception::with_message("java/lang/ArithmeticException", "/ by zero"));
    }
    Ok(())
}

fn compare_floats(a: f64, b: f64, nan: i32) -> i32 {
    match a.partial_cmp(&b) {
        Some(ordering) => ordering as i32,
        None => nan,
    }
}

pub(crate) fn monitor_exit(object: &ObjectRef, thread_id: i64) -> NativeResult<()> {
    object.monitor().exit(thread_id).map_err(|err| match err {
        MonitorError::NotOwner => Exception::new("java/lang/IllegalMonitorStateException"),
        MonitorError::Interrupted => Exception::new("java/lang/InterruptedException"),
    })
}

#[cfg(test)]
mod tests;
