use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::runtime::{
    Class, ClinitStatus, Const, Exception, FieldValue, NativeResult, Value, exceptions, heap,
    inheritance, interpreter, mtable, string_table, thread::ThreadContext,
};

#[derive(Debug, Clone)]
pub(crate) struct Static {
    pub(crate) ftype: Arc<str>,
    pub(crate) value: Value,
}

static STATICS: Lazy<DashMap<String, Static>> = Lazy::new(DashMap::new);

fn key(class: &str, field: &str) -> String {
    format!("{class}.{field}")
}

pub(crate) fn add_static(key: &str, value: Static) {
    STATICS.insert(key.to_string(), value);
}

pub(crate) fn query_static(class: &str, field: &str) -> Option<Static> {
    STATICS.get(&key(class, field)).map(|s| s.value().clone())
}

pub(crate) fn get_static_value(class: &str, field: &str) -> Option<Value> {
    query_static(class, field).map(|s| s.value)
}

pub(crate) fn set(class: &str, field: &str, ftype: &str, value: Value) {
    add_static(
        &key(class, field),
        Static {
            ftype: Arc::from(ftype),
            value,
        },
    );
}

pub(crate) fn put(class: &str, field: &str, value: Value) -> bool {
    match STATICS.get_mut(&key(class, field)) {
        Some(mut s) => {
            s.value = value;
            true
        }
        None => false,
    }
}

/// The class that declares static `field` as seen from `class`: the class
/// itself, then its superinterfaces, then its superclass.
pub(crate) fn declaring_class(class: &Arc<Class>, field: &str) -> Option<Arc<Class>> {
    if class
        .declared_field(field)
        .is_some_and(|f| f.is_static())
    {
        return Some(Arc::clone(class));
    }
    for interface in &class.interfaces {
        if let Some(owner) = declaring_class(interface, field) {
            return Some(owner);
        }
    }
    class
        .super_class
        .as_ref()
        .and_then(|s| declaring_class(s, field))
}

/// Statics a G-function `<clinit>` created have no field info; they are found
/// by key along the superclass chain.
pub(crate) fn table_owner(class: &Arc<Class>, field: &str) -> Option<Arc<Class>> {
    class
        .ancestors()
        .find(|c| STATICS.contains_key(&key(&c.name, field)))
}

pub(crate) fn needs_initialization(class: &Class) -> bool {
    matches!(
        class.clinit_status(),
        ClinitStatus::Pending | ClinitStatus::Failed
    )
}

fn const_value(constant: &Const) -> Value {
    match constant {
        Const::Byte(v)
        | Const::Char(v)
        | Const::Int(v)
        | Const::Short(v)
        | Const::Boolean(v) => Value::int(*v),
        Const::Long(v) => Value::long(*v),
        Const::Float(v) => Value::float(*v),
        Const::Double(v) => Value::double(*v),
        Const::String(s) => Value::Ref(string_table::intern(s)),
    }
}

fn populate(class: &Class) {
    for field in class.fields.iter().filter(|f| f.is_static()) {
        let key = key(&class.name, &field.name);
        match &field.constant_value {
            Some(constant) => add_static(
                &key,
                Static {
                    ftype: Arc::clone(&field.descriptor),
                    value: const_value(constant),
                },
            ),
            None => {
                let default = FieldValue::default_for(&field.descriptor)
                    .to_value()
                    .unwrap_or_default();
                // preloaded values win over defaults
                STATICS.entry(key).or_insert(Static {
                    ftype: Arc::clone(&field.descriptor),
                    value: default,
                });
            }
        }
    }
}

/// Runs `<clinit>` of `class` (after its superclass) unless it already ran.
///
/// Other threads block until the initializing thread is done; the initializing
/// thread itself may re-enter and sees the class as usable.
pub(crate) fn initialize(ctx: &mut ThreadContext, class: &Arc<Class>) -> NativeResult<()> {
    let status = class.clinit.lock();
    match status.get() {
        ClinitStatus::Done | ClinitStatus::Running => return Ok(()),
        ClinitStatus::Failed => {
            return Err(Exception::with_message(
                "java/lang/NoClassDefFoundError",
                format!("Could not initialize class {}", class.name.replace('/', ".")),
            ));
        }
        ClinitStatus::Pending => status.set(ClinitStatus::Running),
    }

    let result = run_initializers(ctx, class);
    match result {
        Ok(()) => {
            status.set(ClinitStatus::Done);
            Ok(())
        }
        Err(err) => {
            status.set(ClinitStatus::Failed);
            Err(initializer_error(ctx, err))
        }
    }
}

fn run_initializers(ctx: &mut ThreadContext, class: &Arc<Class>) -> NativeResult<()> {
    if !class.is_interface() {
        if let Some(super_class) = &class.super_class {
            initialize(ctx, super_class)?;
        }
    }
    populate(class);
    if let Some(clinit) = mtable::resolve_clinit(class)? {
        log::debug!("running {}.<clinit>", class.name);
        interpreter::invoke_method(ctx, &clinit, Vec::new())?;
    }
    Ok(())
}

/// Errors pass through; anything else is wrapped in `ExceptionInInitializerError`.
fn initializer_error(ctx: &mut ThreadContext, err: Exception) -> Exception {
    if !err.is_catchable() {
        return err;
    }
    let thrown = match exceptions::materialize(ctx, err) {
        Ok(thrown) => thrown,
        Err(err) => return err,
    };
    let is_error = heap::class_of(&thrown)
        .map(|c| inheritance::is_subclass_named(&c, "java/lang/Error"))
        .unwrap_or(false);
    if is_error {
        return Exception::Thrown(thrown);
    }
    match exceptions::new_throwable(
        ctx,
        "java/lang/ExceptionInInitializerError",
        None,
        Some(thrown),
    ) {
        Ok(wrapper) => Exception::Thrown(wrapper),
        Err(err) => err,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_operations() {
        set("statics/test/A", "x", "I", Value::int(1));
        assert!(put("statics/test/A", "x", Value::int(2)));
        assert!(!put("statics/test/A", "y", Value::int(2)));
        let value = query_static("statics/test/A", "x").unwrap();
        assert_eq!(value.ftype.as_ref(), "I");
        assert_eq!(value.value.as_int().unwrap(), 2);
        assert!(get_static_value("statics/test/A", "y").is_none());
    }

    #[test]
    fn test_constant_values() {
        assert_eq!(const_value(&Const::Char(65)).as_int().unwrap(), 65);
        assert_eq!(const_value(&Const::Double(0.5)).as_double().unwrap(), 0.5);
        let s = const_value(&Const::String("statics-const".into()));
        assert!(s.same_ref(&Value::Ref(string_table::intern("statics-const"))));
    }
}
