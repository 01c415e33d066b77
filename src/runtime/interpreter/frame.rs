use std::sync::Arc;

use crate::runtime::{
    Class, CodeAttribute, Exception, MethodInfo, NativeResult, ObjectRef, Value, mtable::JmEntry,
};

/// Slots allowed past `max_stack` before a push is treated as a VM fault.
pub(crate) const STACK_MARGIN: usize = 2;

/// Activation record of one bytecode method.
///
/// `tos` is the index of the topmost operand, `-1` when the stack is empty.
pub(crate) struct Frame {
    pub(crate) class: Arc<Class>,
    pub(crate) method: Arc<MethodInfo>,
    pub(crate) code: Arc<CodeAttribute>,
    pub(crate) pc: usize,
    /// start of the instruction being executed; exception handlers and stack
    /// traces are matched against it
    pub(crate) exception_pc: usize,
    pub(crate) locals: Vec<Value>,
    stack: Vec<Value>,
    tos: isize,
    /// held for the whole activation of a synchronized method
    pub(crate) monitor: Option<ObjectRef>,
}

impl Frame {
    /// A frame for `entry` whose low locals hold `args` (one value per
    /// parameter, receiver first). Wide arguments take two locals.
    pub(crate) fn new(entry: &JmEntry, args: Vec<Value>, monitor: Option<ObjectRef>) -> NativeResult<Frame> {
        let code = Arc::clone(&entry.code);
        let method = Arc::clone(&entry.method);
        let slots = (code.max_locals as usize).max(method.arg_slots());
        let mut locals = vec![Value::Null; slots];

        let receiver = usize::from(!method.is_static());
        if args.len() != method.parsed.parameters.len() + receiver {
            return Err(Exception::fatal(format!(
                "{}.{}{} called with {} arguments",
                entry.class.name,
                method.name,
                method.descriptor,
                args.len()
            )));
        }
        let mut slot = 0;
        for (i, arg) in args.into_iter().enumerate() {
            let wide = i >= receiver && method.parsed.parameters[i - receiver].is_wide();
            if wide {
                locals[slot + 1] = arg.clone();
            }
            locals[slot] = arg;
            slot += if wide { 2 } else { 1 };
        }

        Ok(Frame {
            class: Arc::clone(&entry.class),
            stack: vec![Value::Null; code.max_stack as usize + STACK_MARGIN],
            method,
            code,
            pc: 0,
            exception_pc: 0,
            locals,
            tos: -1,
            monitor,
        })
    }

    pub(crate) fn tos(&self) -> isize {
        self.tos
    }

    #[inline]
    pub(crate) fn push(&mut self, value: Value) -> NativeResult<()> {
        let next = (self.tos + 1) as usize;
        let Some(slot) = self.stack.get_mut(next) else {
            return Err(Exception::fatal(format!(
                "operand stack overflow in {}.{} at pc {}",
                self.class.name, self.method.name, self.exception_pc
            )));
        };
        *slot = value;
        self.tos += 1;
        Ok(())
    }

    #[inline]
    pub(crate) fn pop(&mut self) -> NativeResult<Value> {
        if self.tos < 0 {
            return Err(Exception::fatal(format!(
                "operand stack underflow in {}.{} at pc {}",
                self.class.name, self.method.name, self.exception_pc
            )));
        }
        let value = std::mem::take(&mut self.stack[self.tos as usize]);
        self.tos -= 1;
        Ok(value)
    }

    pub(crate) fn peek(&self, depth: usize) -> NativeResult<&Value> {
        let index = self.tos - depth as isize;
        if index < 0 {
            return Err(Exception::fatal("operand stack underflow on peek"));
        }
        Ok(&self.stack[index as usize])
    }

    pub(crate) fn clear_stack(&mut self) {
        while self.tos >= 0 {
            self.stack[self.tos as usize] = Value::Null;
            self.tos -= 1;
        }
    }

    /// Pushes a value taking `slots` slots (0 pushes nothing).
    pub(crate) fn push_slots(&mut self, value: Value, slots: usize) -> NativeResult<()> {
        for _ in 1..slots {
            self.push(value.clone())?;
        }
        if slots > 0 {
            self.push(value)?;
        }
        Ok(())
    }

    pub(crate) fn push_int(&mut self, v: i32) -> NativeResult<()> {
        self.push(Value::int(v))
    }

    pub(crate) fn push_long(&mut self, v: i64) -> NativeResult<()> {
        self.push_slots(Value::long(v), 2)
    }

    pub(crate) fn push_float(&mut self, v: f32) -> NativeResult<()> {
        self.push(Value::float(v))
    }

    pub(crate) fn push_double(&mut self, v: f64) -> NativeResult<()> {
        self.push_slots(Value::double(v), 2)
    }

    pub(crate) fn pop_int(&mut self) -> NativeResult<i32> {
        self.pop()?.as_int()
    }

    /// Both halves hold the value; the upper one is discarded.
    pub(crate) fn pop_wide(&mut self) -> NativeResult<Value> {
        self.pop()?;
        self.pop()
    }

    pub(crate) fn pop_long(&mut self) -> NativeResult<i64> {
        self.pop_wide()?.as_long()
    }

    pub(crate) fn pop_float(&mut self) -> NativeResult<f32> {
        self.pop()?.as_float()
    }

    pub(crate) fn pop_double(&mut self) -> NativeResult<f64> {
        self.pop_wide()?.as_double()
    }

    pub(crate) fn pop_ref(&mut self) -> NativeResult<Option<ObjectRef>> {
        self.pop()?.as_ref()
    }

    pub(crate) fn load(&self, index: usize) -> NativeResult<Value> {
        self.locals
            .get(index)
            .cloned()
            .ok_or_else(|| Exception::fatal(format!("local {index} out of range")))
    }

    pub(crate) fn store(&mut self, index: usize, value: Value) -> NativeResult<()> {
        let slot = self
            .locals
            .get_mut(index)
            .ok_or_else(|| Exception::fatal(format!("local {index} out of range")))?;
        *slot = value;
        Ok(())
    }

    pub(crate) fn line_number(&self) -> Option<u16> {
        self.code.line_number(self.exception_pc)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}{} pc={} tos={}",
            self.class.name, self.method.name, self.method.descriptor, self.pc, self.tos
        )
    }
}
