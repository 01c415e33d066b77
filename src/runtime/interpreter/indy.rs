use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;

use super::{InterpreterEnv, Next};
use crate::{
    descriptor,
    runtime::{
        Class, Exception, NativeResult, ObjectRef, Value, heap,
        mtable::{GmEntry, MethodEntry},
        native, reflection, string_table,
        structs::ConstantPoolInfo,
    },
};

const CONCAT_FACTORY: &str = "java/lang/invoke/StringConcatFactory";
/// Leading parameters of the concatenation G-function: recipe, site
/// descriptor and the constants of the recipe.
const CONCAT_PREFIX: &str = "(Ljava/lang/String;Ljava/lang/String;[Ljava/lang/Object;";

/// One G-function entry per call site shape.
static CONCAT_ENTRIES: Lazy<DashMap<String, Arc<MethodEntry>>> = Lazy::new(DashMap::new);

fn unsupported(message: String) -> Exception {
    Exception::with_message("java/lang/UnsupportedOperationException", message)
}

fn concat_entry(site_descriptor: &str) -> NativeResult<Arc<MethodEntry>> {
    if let Some(entry) = CONCAT_ENTRIES.get(site_descriptor) {
        return Ok(Arc::clone(entry.value()));
    }
    let parameters = site_descriptor
        .strip_prefix('(')
        .and_then(|d| d.split_once(')'))
        .map(|(parameters, _)| parameters)
        .ok_or_else(|| Exception::fatal(format!("bad call site descriptor {site_descriptor}")))?;
    let descriptor = format!("{CONCAT_PREFIX}{parameters})Ljava/lang/String;");
    let parsed = descriptor::method_descriptor(&descriptor)
        .ok_or_else(|| Exception::fatal(format!("bad call site descriptor {site_descriptor}")))?;
    let key = format!("{CONCAT_FACTORY}.makeConcatWithConstants{descriptor}");
    let entry = Arc::new(MethodEntry::Native(GmEntry::new(
        &key,
        parsed,
        native::string::concat_with_constants,
        true,
    )));
    Ok(Arc::clone(
        CONCAT_ENTRIES
            .entry(site_descriptor.to_string())
            .or_insert(entry)
            .value(),
    ))
}

/// A static bootstrap argument as an object.
fn constant_object(class: &Arc<Class>, index: u16) -> NativeResult<Option<ObjectRef>> {
    Ok(Some(match class.constant(index) {
        Some(ConstantPoolInfo::String(s)) => string_table::intern(s),
        Some(ConstantPoolInfo::Integer(v)) => {
            heap::primitive_object("java/lang/Integer", "I", Value::int(*v))
        }
        Some(ConstantPoolInfo::Long(v)) => heap::primitive_object("java/lang/Long", "J", Value::long(*v)),
        Some(ConstantPoolInfo::Float(v)) => {
            heap::primitive_object("java/lang/Float", "F", Value::float(*v))
        }
        Some(ConstantPoolInfo::Double(v)) => {
            heap::primitive_object("java/lang/Double", "D", Value::double(*v))
        }
        Some(ConstantPoolInfo::Class(info)) => {
            let loaded = crate::runtime::class_loader::loader_of(class).load(&info.name)?;
            reflection::class_mirror(&loaded)
        }
        other => return Err(unsupported(format!("bootstrap argument {other:?}"))),
    }))
}

impl InterpreterEnv<'_> {
    pub(super) fn invoke_dynamic(&mut self) -> NativeResult<Next> {
        let index = self.u16_arg();
        self.u16_arg();
        let class = Arc::clone(&self.frame.class);
        let Some(ConstantPoolInfo::InvokeDynamic {
            bootstrap_index,
            name_and_type,
        }) = class.constant(index)
        else {
            return Err(Exception::fatal(format!(
                "constant {index} of {} is not an invokedynamic",
                class.name
            )));
        };
        let bootstrap = class
            .bootstrap_methods
            .get(*bootstrap_index as usize)
            .ok_or_else(|| Exception::fatal(format!("missing bootstrap method {bootstrap_index}")))?;
        let Some(ConstantPoolInfo::MethodHandle { reference, .. }) = class.constant(bootstrap.method_ref)
        else {
            return Err(Exception::fatal("bootstrap method is not a method handle"));
        };
        if reference.class.as_ref() != CONCAT_FACTORY
            || reference.name.as_ref() != "makeConcatWithConstants"
        {
            return Err(unsupported(format!(
                "invokedynamic {} bootstrapped by {}.{}",
                name_and_type.name,
                reference.class.replace('/', "."),
                reference.name
            )));
        }

        let recipe = match bootstrap.arguments.first().and_then(|i| class.constant(*i)) {
            Some(ConstantPoolInfo::String(recipe)) => string_table::intern(recipe),
            other => return Err(Exception::fatal(format!("concatenation recipe {other:?}"))),
        };
        let constants = bootstrap.arguments[1..]
            .iter()
            .map(|i| constant_object(&class, *i))
            .collect::<NativeResult<Vec<_>>>()?;
        let site = descriptor::method_descriptor(&name_and_type.descriptor).ok_or_else(|| {
            Exception::fatal(format!("bad call site descriptor {}", name_and_type.descriptor))
        })?;
        let entry = concat_entry(&name_and_type.descriptor)?;

        let mut args = vec![
            Value::Ref(recipe),
            Value::Ref(string_table::intern(&name_and_type.descriptor)),
            Value::Ref(heap::ref_array_from("java/lang/Object", constants)),
        ];
        args.extend(self.pop_args(&site, false)?);
        Ok(Next::Invoke(entry, args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concat_entries_are_shared_per_shape() {
        let a = concat_entry("(ILjava/lang/String;)Ljava/lang/String;").unwrap();
        let b = concat_entry("(ILjava/lang/String;)Ljava/lang/String;").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        match a.as_ref() {
            MethodEntry::Native(gm) => {
                assert_eq!(gm.descriptor.parameters.len(), 5);
                assert!(gm.needs_context);
            }
            other => panic!("{other:?}"),
        }
        assert!(concat_entry("garbage").is_err());
    }
}
