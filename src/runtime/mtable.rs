use std::{collections::VecDeque, sync::Arc};

use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::{
    descriptor::{self, MethodDescriptor},
    runtime::{
        Class, CodeAttribute, Exception, MethodInfo, NativeResult, Value, thread::ThreadContext,
    },
};

/// Host implementation of a Java method. Arguments are one [`Value`] per
/// declared parameter (a `long` is a single value), preceded by the receiver
/// for instance methods.
pub(crate) type GFunction = fn(&mut NativeEnv, Vec<Value>) -> NativeResult<Option<Value>>;

/// What a G-function sees of its caller.
pub(crate) struct NativeEnv<'a> {
    ctx: Option<&'a mut ThreadContext>,
}

impl<'a> NativeEnv<'a> {
    pub(crate) fn new(ctx: Option<&'a mut ThreadContext>) -> Self {
        NativeEnv { ctx }
    }

    /// The calling thread; only functions registered with [`register_ctx`] get one.
    pub(crate) fn ctx(&mut self) -> NativeResult<&mut ThreadContext> {
        self.ctx
            .as_deref_mut()
            .ok_or_else(|| Exception::fatal("G-function called without a thread context"))
    }
}

#[derive(Debug)]
pub(crate) enum MethodEntry {
    Java(JmEntry),
    Native(GmEntry),
}

#[derive(Debug)]
pub(crate) struct JmEntry {
    pub(crate) class: Arc<Class>,
    pub(crate) method: Arc<MethodInfo>,
    pub(crate) code: Arc<CodeAttribute>,
}

pub(crate) struct GmEntry {
    pub(crate) key: Arc<str>,
    pub(crate) descriptor: MethodDescriptor,
    pub(crate) param_slots: usize,
    pub(crate) function: GFunction,
    /// receives the calling thread and may call back into Java
    pub(crate) needs_context: bool,
}

impl std::fmt::Debug for GmEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GmEntry")
            .field("key", &self.key)
            .field("param_slots", &self.param_slots)
            .field("needs_context", &self.needs_context)
            .finish()
    }
}

impl GmEntry {
    pub(crate) fn new(key: &str, descriptor: MethodDescriptor, function: GFunction, needs_context: bool) -> Self {
        GmEntry {
            key: Arc::from(key),
            param_slots: descriptor.param_slots(),
            descriptor,
            function,
            needs_context,
        }
    }
}

impl MethodEntry {
    pub(crate) fn descriptor(&self) -> &MethodDescriptor {
        match self {
            MethodEntry::Java(jm) => &jm.method.parsed,
            MethodEntry::Native(gm) => &gm.descriptor,
        }
    }

    pub(crate) fn is_native(&self) -> bool {
        matches!(self, MethodEntry::Native(_))
    }
}

static MTABLE: Lazy<DashMap<String, Arc<MethodEntry>>> = Lazy::new(DashMap::new);
/// `<receiver class>.<name><descriptor>` to the override selected for it
static VIRTUAL: Lazy<DashMap<String, Arc<MethodEntry>>> = Lazy::new(DashMap::new);

fn insert_native(class: &str, name: &str, descriptor: &str, function: GFunction, needs_context: bool) {
    let key = format!("{class}.{name}{descriptor}");
    let Some(parsed) = descriptor::method_descriptor(descriptor) else {
        log::error!("not registering {key}: malformed descriptor");
        return;
    };
    let entry = GmEntry::new(&key, parsed, function, needs_context);
    MTABLE.insert(key, Arc::new(MethodEntry::Native(entry)));
}

pub(crate) fn register(class: &str, name: &str, descriptor: &str, function: GFunction) {
    insert_native(class, name, descriptor, function, false);
}

pub(crate) fn register_ctx(class: &str, name: &str, descriptor: &str, function: GFunction) {
    insert_native(class, name, descriptor, function, true);
}

pub(crate) fn lookup(key: &str) -> Option<Arc<MethodEntry>> {
    MTABLE.get(key).map(|e| Arc::clone(e.value()))
}

pub(crate) fn size() -> usize {
    MTABLE.len()
}

fn find_in(class: &Arc<Class>, name: &str, descriptor: &str) -> NativeResult<Option<Arc<MethodEntry>>> {
    let key = format!("{}.{name}{descriptor}", class.name);
    if let Some(entry) = lookup(&key) {
        return Ok(Some(entry));
    }
    let Some(method) = class.declared_method(name, descriptor) else {
        return Ok(None);
    };
    if method.is_abstract() {
        return Ok(None);
    }
    let Some(code) = &method.code else {
        return Err(Exception::with_message(
            "java/lang/UnsatisfiedLinkError",
            format!("'{}'", pretty_method(&class.name, name, descriptor)),
        ));
    };
    let entry = Arc::new(MethodEntry::Java(JmEntry {
        class: Arc::clone(class),
        method: Arc::clone(method),
        code: Arc::clone(code),
    }));
    log::trace!("mtable: adding {key}");
    Ok(Some(Arc::clone(MTABLE.entry(key).or_insert(entry).value())))
}

fn declares_abstract(class: &Class, name: &str, descriptor: &str) -> bool {
    class
        .declared_method(name, descriptor)
        .is_some_and(|m| m.is_abstract())
}

fn no_such_method(class: &str, name: &str, descriptor: &str) -> Exception {
    Exception::with_message(
        "java/lang/NoSuchMethodError",
        format!("'{}'", pretty_method(class, name, descriptor)),
    )
}

fn pretty_method(class: &str, name: &str, descriptor: &str) -> String {
    let class = class.replace('/', ".");
    let Some(parsed) = descriptor::method_descriptor(descriptor) else {
        return format!("{class}.{name}{descriptor}");
    };
    let java_name = |t: &descriptor::FieldType| match t.primitive_name() {
        Some(p) => p.to_string(),
        None => match t {
            descriptor::FieldType::Array(_) => {
                let mut dims = 0;
                let mut element = t;
                while let descriptor::FieldType::Array(inner) = element {
                    dims += 1;
                    element = inner;
                }
                let base = element
                    .primitive_name()
                    .map(str::to_string)
                    .or_else(|| element.class_name().map(|n| n.replace('/', ".")))
                    .unwrap_or_default();
                format!("{base}{}", "[]".repeat(dims))
            }
            _ => t.class_name().unwrap_or_default().replace('/', "."),
        },
    };
    let params: Vec<_> = parsed.parameters.iter().map(java_name).collect();
    let ret = parsed
        .return_type
        .as_ref()
        .map_or_else(|| "void".to_string(), java_name);
    format!("{ret} {class}.{name}({})", params.join(", "))
}

/// `invokestatic`: the named class, then its superclasses.
pub(crate) fn resolve_static(class: &Arc<Class>, name: &str, descriptor: &str) -> NativeResult<Arc<MethodEntry>> {
    for current in class.ancestors() {
        if let Some(entry) = find_in(&current, name, descriptor)? {
            return Ok(entry);
        }
    }
    Err(no_such_method(&class.name, name, descriptor))
}

/// `invokespecial`: the declared class first. Constructors of synthetic core
/// classes are shared along the hierarchy, so the walk continues upwards.
pub(crate) fn resolve_special(class: &Arc<Class>, name: &str, descriptor: &str) -> NativeResult<Arc<MethodEntry>> {
    for current in class.ancestors() {
        if let Some(entry) = find_in(&current, name, descriptor)? {
            return Ok(entry);
        }
    }
    if let Some(entry) = find_default(class, name, descriptor)? {
        return Ok(entry);
    }
    Err(no_such_method(&class.name, name, descriptor))
}

/// `invokevirtual` and `invokeinterface`: the receiver's class and its
/// superclasses, then default methods of the interfaces it implements.
pub(crate) fn resolve_virtual(receiver: &Arc<Class>, name: &str, descriptor: &str) -> NativeResult<Arc<MethodEntry>> {
    let cache_key = format!("{}.{name}{descriptor}", receiver.name);
    if let Some(entry) = VIRTUAL.get(&cache_key) {
        return Ok(Arc::clone(entry.value()));
    }

    let mut found = None;
    for current in receiver.ancestors() {
        if let Some(entry) = find_in(&current, name, descriptor)? {
            found = Some(entry);
            break;
        }
    }
    if found.is_none() {
        found = find_default(receiver, name, descriptor)?;
    }
    let Some(entry) = found else {
        let declared_abstract = receiver.ancestors().any(|c| declares_abstract(&c, name, descriptor))
            || all_interfaces(receiver)
                .iter()
                .any(|i| declares_abstract(i, name, descriptor));
        return Err(if declared_abstract {
            Exception::with_message(
                "java/lang/AbstractMethodError",
                format!(
                    "Receiver class {} does not define or inherit an implementation of the resolved method '{}'",
                    receiver.name.replace('/', "."),
                    pretty_method(&receiver.name, name, descriptor)
                ),
            )
        } else {
            no_such_method(&receiver.name, name, descriptor)
        });
    };
    VIRTUAL.insert(cache_key, Arc::clone(&entry));
    Ok(entry)
}

/// Every interface `class` implements, directly or through superclasses and
/// superinterfaces, nearest first.
pub(crate) fn all_interfaces(class: &Arc<Class>) -> Vec<Arc<Class>> {
    let mut result: Vec<Arc<Class>> = Vec::new();
    let mut queue: VecDeque<Arc<Class>> = VecDeque::new();
    for current in class.ancestors() {
        queue.extend(current.interfaces.iter().cloned());
    }
    if class.is_interface() {
        queue.push_front(Arc::clone(class));
    }
    while let Some(interface) = queue.pop_front() {
        if result.iter().any(|i| Arc::ptr_eq(i, &interface)) {
            continue;
        }
        queue.extend(interface.interfaces.iter().cloned());
        result.push(interface);
    }
    result
}

fn find_default(class: &Arc<Class>, name: &str, descriptor: &str) -> NativeResult<Option<Arc<MethodEntry>>> {
    for interface in all_interfaces(class) {
        if let Some(entry) = find_in(&interface, name, descriptor)? {
            return Ok(Some(entry));
        }
    }
    Ok(None)
}

pub(crate) fn resolve_clinit(class: &Arc<Class>) -> NativeResult<Option<Arc<MethodEntry>>> {
    find_in(class, "<clinit>", "()V")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        class::builder::{ClassBuilder, Code},
        runtime::class_loader,
    };

    fn native_answer(_: &mut NativeEnv, _: Vec<Value>) -> NativeResult<Option<Value>> {
        Ok(Some(Value::int(42)))
    }

    #[test]
    fn test_register_and_lookup() {
        register("mtable/test/Host", "answer", "(JI)I", native_answer);
        let entry = lookup("mtable/test/Host.answer(JI)I").unwrap();
        match entry.as_ref() {
            MethodEntry::Native(gm) => {
                assert_eq!(gm.param_slots, 3);
                assert!(!gm.needs_context);
            }
            other => panic!("{other:?}"),
        }
        assert!(lookup("mtable/test/Host.answer()I").is_none());
    }

    #[test]
    fn test_virtual_resolution_walks_hierarchy() {
        let mut base = ClassBuilder::new("mtable/test/Base", "java/lang/Object");
        base.default_constructor();
        base.method(0x0001, "name", "()I", Some(Code::new(1, 1, vec![0x04, 0xac])));
        base.method(0x0401, "missing", "()V", None);
        base.access_flags(0x0421);
        class_loader::app().define_in_memory("mtable/test/Base", base.build());
        let mut derived = ClassBuilder::new("mtable/test/Derived", "mtable/test/Base");
        derived.default_constructor();
        class_loader::app().define_in_memory("mtable/test/Derived", derived.build());

        let derived = class_loader::app().load("mtable/test/Derived").unwrap();
        match resolve_virtual(&derived, "name", "()I").unwrap().as_ref() {
            MethodEntry::Java(jm) => assert_eq!(jm.class.name(), "mtable/test/Base"),
            other => panic!("{other:?}"),
        }
        let err = resolve_virtual(&derived, "missing", "()V").unwrap_err();
        assert!(err.to_string().starts_with("java.lang.AbstractMethodError"), "{err}");
        let err = resolve_virtual(&derived, "nothing", "()V").unwrap_err();
        assert!(err.to_string().starts_with("java.lang.NoSuchMethodError"), "{err}");
    }

    #[test]
    fn test_pretty_method() {
        assert_eq!(
            pretty_method("java/lang/Integer", "parseInt", "(Ljava/lang/String;[[I)I"),
            "int java.lang.Integer.parseInt(java.lang.String, int[][])"
        );
    }
}
