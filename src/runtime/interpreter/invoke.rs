use std::sync::Arc;

use super::{InterpreterEnv, Next, null_pointer};
use crate::{
    descriptor::MethodDescriptor,
    runtime::{
        Class, Exception, NativeResult, Value, class_loader, heap,
        mtable::{self, MethodEntry},
        statics,
        structs::{ConstantPoolInfo, CpMemberRef},
    },
};

/// Argument slots of a method descriptor, scanned without building a
/// [`MethodDescriptor`].
pub(super) fn arg_slots(descriptor: &str) -> usize {
    let mut slots = 0;
    let mut chars = descriptor.chars().skip(1);
    while let Some(c) = chars.next() {
        match c {
            ')' => break,
            'J' | 'D' => slots += 2,
            'L' => {
                for c in chars.by_ref() {
                    if c == ';' {
                        break;
                    }
                }
                slots += 1;
            }
            '[' => {
                let mut c = chars.next();
                while c == Some('[') {
                    c = chars.next();
                }
                if c == Some('L') {
                    for c in chars.by_ref() {
                        if c == ';' {
                            break;
                        }
                    }
                }
                slots += 1;
            }
            _ => slots += 1,
        }
    }
    slots
}

fn method_ref(class: &Class, index: u16) -> NativeResult<&CpMemberRef> {
    match class.constant(index) {
        Some(ConstantPoolInfo::Methodref(member) | ConstantPoolInfo::InterfaceMethodref(member)) => {
            Ok(member)
        }
        other => Err(Exception::fatal(format!(
            "constant {index} of {} is not a method reference: {other:?}",
            class.name
        ))),
    }
}

fn referenced_class(class: &Class, member: &CpMemberRef) -> NativeResult<Arc<Class>> {
    class_loader::loader_of(class)
        .load(&member.class)
        .map_err(class_loader::linkage_error)
}

/// Resolves once per call site; later executions use the cached entry.
fn resolve_cached(
    class: &Class,
    member: &CpMemberRef,
    resolve: fn(&Arc<Class>, &str, &str) -> NativeResult<Arc<MethodEntry>>,
) -> NativeResult<Arc<MethodEntry>> {
    if let Some(entry) = member.resolved.get() {
        return Ok(Arc::clone(entry));
    }
    let target = referenced_class(class, member)?;
    let entry = resolve(&target, &member.name, &member.descriptor)?;
    Ok(Arc::clone(member.resolved.get_or_init(|| entry)))
}

impl InterpreterEnv<'_> {
    /// Pops the arguments of `descriptor` (and the receiver), first argument first.
    pub(super) fn pop_args(&mut self, descriptor: &MethodDescriptor, receiver: bool) -> NativeResult<Vec<Value>> {
        let mut args = Vec::with_capacity(descriptor.parameters.len() + 1);
        for parameter in descriptor.parameters.iter().rev() {
            args.push(if parameter.is_wide() {
                self.frame.pop_wide()?
            } else {
                self.frame.pop()?
            });
        }
        if receiver {
            args.push(self.frame.pop()?);
        }
        args.reverse();
        Ok(args)
    }

    pub(super) fn invoke_static(&mut self) -> NativeResult<Next> {
        let index = self.u16_arg();
        let class = Arc::clone(&self.frame.class);
        let member = method_ref(&class, index)?;
        let entry = resolve_cached(&class, member, mtable::resolve_static)?;

        let owner = match entry.as_ref() {
            MethodEntry::Java(jm) => Arc::clone(&jm.class),
            MethodEntry::Native(_) => referenced_class(&class, member)?,
        };
        if statics::needs_initialization(&owner) {
            return Ok(Next::Initialize(owner));
        }
        let args = self.pop_args(entry.descriptor(), false)?;
        Ok(Next::Invoke(entry, args))
    }

    /// Constructors, private methods and `super.m()` calls.
    pub(super) fn invoke_special(&mut self) -> NativeResult<Next> {
        let index = self.u16_arg();
        let class = Arc::clone(&self.frame.class);
        let member = method_ref(&class, index)?;
        let entry = resolve_cached(&class, member, mtable::resolve_special)?;
        let args = self.pop_args(entry.descriptor(), true)?;
        if args[0].is_null() {
            return Err(null_pointer());
        }
        Ok(Next::Invoke(entry, args))
    }

    /// `invokevirtual`, or `invokeinterface` with its two trailing operand bytes.
    pub(super) fn invoke_virtual(&mut self, interface: bool) -> NativeResult<Next> {
        let index = self.u16_arg();
        if interface {
            self.u16_arg();
        }
        let class = Arc::clone(&self.frame.class);
        let member = method_ref(&class, index)?;

        let receiver = self.frame.peek(arg_slots(&member.descriptor))?.clone();
        let Some(receiver) = receiver.as_ref()? else {
            return Err(Exception::with_message(
                "java/lang/NullPointerException",
                format!(
                    "Cannot invoke \"{}.{}()\" because value is null",
                    member.class.replace('/', "."),
                    member.name
                ),
            ));
        };
        let receiver_class = heap::class_of(&receiver)?;
        let entry = mtable::resolve_virtual(&receiver_class, &member.name, &member.descriptor)?;
        let args = self.pop_args(entry.descriptor(), true)?;
        Ok(Next::Invoke(entry, args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arg_slots() {
        assert_eq!(arg_slots("()V"), 0);
        assert_eq!(arg_slots("(IJ)V"), 3);
        assert_eq!(arg_slots("(Ljava/lang/String;D[J[[Ljava/lang/Object;Z)I"), 6);
    }
}
