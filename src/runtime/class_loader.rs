use std::{
    cell::{Cell, RefCell},
    collections::{HashMap, VecDeque},
    io,
    path::Path,
    sync::Arc,
};

use once_cell::sync::{Lazy, OnceCell};
use parking_lot::{ReentrantMutex, RwLock};

mod attributes;
mod bootstrap;
pub(crate) mod builtin;

pub use bootstrap::{ArchiveSource, ClassSource, DirSource, MemorySource, source_for_path};

use crate::{
    class::{self, ClassFormatError, resolve_class_name, resolve_utf8},
    consts::{ClassAccessFlag, MethodAccessFlag},
    descriptor::{self, FieldDescriptor},
    runtime::{
        AttributeInfo, Class, ClinitStatus, ConstantPoolInfo, CpClassInfo, CpMemberRef,
        CpNameAndTypeInfo, Exception, FieldInfo, MethodInfo, NativeResult, method_area,
        string_pool,
    },
};

pub struct ClassLoader {
    name: &'static str,
    parent: Option<&'static ClassLoader>,
    sources: RwLock<Vec<Box<dyn ClassSource>>>,
    memory: MemorySource,
}

static BOOTSTRAP: Lazy<ClassLoader> = Lazy::new(|| ClassLoader::new("bootstrap", None));
static SYSTEM: Lazy<ClassLoader> =
    Lazy::new(|| ClassLoader::new("system", Some(Lazy::force(&BOOTSTRAP))));
static APP: Lazy<ClassLoader> =
    Lazy::new(|| ClassLoader::new("app", Some(Lazy::force(&SYSTEM))));

thread_local! {
    /// classes being defined on this thread, innermost last
    static LOADING: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
    /// classes named by constant pools of freshly defined classes
    static PENDING: RefCell<VecDeque<String>> = const { RefCell::new(VecDeque::new()) };
    static DRAINING: Cell<bool> = const { Cell::new(false) };
}

pub fn bootstrap() -> &'static ClassLoader {
    &BOOTSTRAP
}

pub fn system() -> &'static ClassLoader {
    &SYSTEM
}

pub fn app() -> &'static ClassLoader {
    &APP
}

/// The loader that resolves symbolic references made by `class`.
pub(crate) fn loader_of(class: &Class) -> &'static ClassLoader {
    if class.loader == "bootstrap" {
        bootstrap()
    } else {
        app()
    }
}

/// `java.lang.String`, `java/lang/String` and `Ljava/lang/String;` all name the same class.
pub(crate) fn canonical_name(name: &str) -> String {
    let name = match name.strip_prefix('L').and_then(|n| n.strip_suffix(';')) {
        Some(inner) => inner,
        None => name,
    };
    name.replace('.', "/")
}

/// `ClassNotFoundException` from a linking step surfaces as `NoClassDefFoundError`.
pub(crate) fn linkage_error(err: Exception) -> Exception {
    match err {
        Exception::Vm {
            class_name,
            message,
        } if class_name.as_ref() == "java/lang/ClassNotFoundException" => Exception::Vm {
            class_name: Arc::from("java/lang/NoClassDefFoundError"),
            message: message.map(|m| m.replace('.', "/")),
        },
        other => other,
    }
}

impl ClassLoader {
    fn new(name: &'static str, parent: Option<&'static ClassLoader>) -> Self {
        ClassLoader {
            name,
            parent,
            sources: RwLock::new(Vec::new()),
            memory: MemorySource::default(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn parent(&self) -> Option<&'static ClassLoader> {
        self.parent
    }

    pub fn add_source(&self, source: Box<dyn ClassSource>) {
        log::debug!("{} loader: adding class source {}", self.name, source.name());
        self.sources.write().push(source);
    }

    pub fn add_class_path(&self, path: impl AsRef<Path>) -> io::Result<()> {
        self.add_source(source_for_path(path)?);
        Ok(())
    }

    /// Makes `bytes` loadable under `name` without touching the file system.
    pub fn define_in_memory(&self, name: &str, bytes: impl Into<Arc<[u8]>>) {
        self.memory.add(&canonical_name(name), bytes);
    }

    /// Root first, ending with `self`.
    fn chain(&'static self) -> Vec<&'static ClassLoader> {
        let mut chain = vec![self];
        let mut current = self;
        while let Some(parent) = current.parent {
            chain.push(parent);
            current = parent;
        }
        chain.reverse();
        chain
    }

    pub fn load(&'static self, name: &str) -> NativeResult<Arc<Class>> {
        let name = canonical_name(name);
        if let Some(class) = method_area::fetch(&name) {
            return Ok(class);
        }
        if name.starts_with('[') {
            return self.load_array(&name);
        }

        let circular = LOADING.with(|loading| loading.borrow().iter().any(|n| *n == name));
        if circular {
            return Err(Exception::with_message(
                "java/lang/ClassCircularityError",
                name.replace('/', "."),
            ));
        }

        LOADING.with(|loading| loading.borrow_mut().push(name.clone()));
        let result = method_area::entry(&name).get_or_define(|| self.define_by_delegation(&name));
        LOADING.with(|loading| loading.borrow_mut().pop());

        let class = result?;
        self.drain_pending();
        Ok(class)
    }

    fn define_by_delegation(&'static self, name: &str) -> NativeResult<Arc<Class>> {
        for loader in self.chain() {
            if loader.parent.is_none() {
                if let Some(builtin) = builtin::find(name) {
                    return builtin.define(loader);
                }
            }
            if let Some((bytes, source)) = loader.find_bytes(name)? {
                return loader.define(name, &bytes, &source);
            }
        }
        Err(Exception::with_message(
            "java/lang/ClassNotFoundException",
            name.replace('/', "."),
        ))
    }

    fn find_bytes(&self, name: &str) -> NativeResult<Option<(Vec<u8>, String)>> {
        let io_error = |source: &str, e: io::Error| {
            Exception::with_message(
                "java/lang/NoClassDefFoundError",
                format!("{name} (reading {source}: {e})"),
            )
        };
        if let Some(bytes) = self.memory.find(name).map_err(|e| io_error("memory", e))? {
            return Ok(Some((bytes, self.memory.name().to_string())));
        }
        for source in self.sources.read().iter() {
            if let Some(bytes) = source.find(name).map_err(|e| io_error(source.name(), e))? {
                return Ok(Some((bytes, source.name().to_string())));
            }
        }
        Ok(None)
    }

    fn load_array(&'static self, name: &str) -> NativeResult<Arc<Class>> {
        let Some(array_type) = descriptor::field_type(name) else {
            return Err(Exception::with_message(
                "java/lang/NoClassDefFoundError",
                format!("{name} (illegal array descriptor)"),
            ));
        };
        let descriptor::FieldType::Array(component) = &array_type else {
            return Err(Exception::fatal(format!("{name} is not an array type")));
        };
        if let Some(component_name) = component.class_name() {
            self.load(&component_name)?;
        }
        let object = BOOTSTRAP.load("java/lang/Object")?;
        let interfaces = [
            BOOTSTRAP.load("java/lang/Cloneable")?,
            BOOTSTRAP.load("java/io/Serializable")?,
        ];
        method_area::entry(name)
            .get_or_define(|| Ok(builtin::array_class(name, array_type.clone(), object, &interfaces)))
    }

    /// Loads what newly defined classes refer to; only the outermost load on a
    /// thread does this, and failures wait until the class is really used.
    fn drain_pending(&'static self) {
        let outermost = LOADING.with(|loading| loading.borrow().is_empty());
        if !outermost || DRAINING.with(Cell::get) {
            return;
        }
        DRAINING.with(|d| d.set(true));
        while let Some(name) = PENDING.with(|pending| pending.borrow_mut().pop_front()) {
            if method_area::fetch(&name).is_some() {
                continue;
            }
            if let Err(err) = self.load(&name) {
                log::debug!("deferred resolution of {name} failed: {err}");
            }
        }
        DRAINING.with(|d| d.set(false));
    }

    fn define(&'static self, name: &str, bytes: &[u8], source: &str) -> NativeResult<Arc<Class>> {
        let class_file = class::class_file(bytes)?;
        let actual_name = class_file.class_name()?;
        if actual_name.as_ref() != name {
            return Err(Exception::with_message(
                "java/lang/NoClassDefFoundError",
                format!("{name} (wrong name: {actual_name})"),
            ));
        }
        let raw_pool = &class_file.constant_pool;
        let access_flags = class_file.access_flags;

        let super_class = if class_file.super_class == 0 {
            if name != "java/lang/Object" {
                return Err(ClassFormatError::new(format!(
                    "Invalid superclass index 0 in class file {name}"
                ))
                .into());
            }
            None
        } else {
            let super_name = resolve_class_name(raw_pool, class_file.super_class)?;
            let super_class = self.load(&super_name).map_err(linkage_error)?;
            if super_class.is_interface() {
                return Err(Exception::with_message(
                    "java/lang/IncompatibleClassChangeError",
                    format!(
                        "class {} has interface {} as super class",
                        name.replace('/', "."),
                        super_name.replace('/', ".")
                    ),
                ));
            }
            if super_class.access_flags.contains(ClassAccessFlag::FINAL) {
                return Err(Exception::with_message(
                    "java/lang/VerifyError",
                    format!(
                        "Cannot inherit from final class {}",
                        super_name.replace('/', ".")
                    ),
                ));
            }
            Some(super_class)
        };

        let mut interfaces = Vec::with_capacity(class_file.interfaces.len());
        for index in &class_file.interfaces {
            let interface_name = resolve_class_name(raw_pool, *index)?;
            let interface = self.load(&interface_name).map_err(linkage_error)?;
            if !interface.is_interface() {
                return Err(Exception::with_message(
                    "java/lang/IncompatibleClassChangeError",
                    format!(
                        "class {} can not implement {}, because it is not an interface",
                        name.replace('/', "."),
                        interface_name.replace('/', ".")
                    ),
                ));
            }
            interfaces.push(interface);
        }

        let fields = class_file
            .fields
            .iter()
            .map(|f| convert_field(raw_pool, f))
            .collect::<Result<Vec<_>, _>>()?;
        let mut methods = HashMap::with_capacity(class_file.methods.len());
        for method in &class_file.methods {
            let method = convert_method(raw_pool, method, name)?;
            methods.insert(
                format!("{}{}", method.name, method.descriptor),
                Arc::new(method),
            );
        }
        let attributes = attributes::convert_attributes(&class_file.attributes, raw_pool)?;
        let source_file = attributes.iter().find_map(|a| match a {
            AttributeInfo::SourceFile(file) => Some(Arc::clone(file)),
            _ => None,
        });
        let bootstrap_methods = attributes
            .iter()
            .find_map(|a| match a {
                AttributeInfo::BootstrapMethods(methods) => Some(methods.clone()),
                _ => None,
            })
            .unwrap_or_default();
        let constant_pool = convert_constant_pool(raw_pool)?;

        for constant in &constant_pool {
            if let ConstantPoolInfo::Class(info) = constant {
                if info.name.as_ref() != name {
                    PENDING.with(|pending| pending.borrow_mut().push_back(info.name.to_string()));
                }
            }
        }

        log::info!("[Loaded {} from {source}]", name.replace('/', "."));
        Ok(Arc::new(Class {
            name: Arc::from(name),
            name_index: string_pool::intern(name),
            access_flags,
            super_class,
            interfaces,
            constant_pool,
            fields,
            methods,
            attributes,
            source_file,
            bootstrap_methods,
            loader: if self.parent.is_none() { "bootstrap" } else { "app" },
            component: None,
            clinit: ReentrantMutex::new(Cell::new(ClinitStatus::Pending)),
            mirror: OnceCell::new(),
        }))
    }
}

fn convert_constant_pool(
    cp: &[class::ConstantPoolInfo],
) -> Result<Vec<ConstantPoolInfo>, ClassFormatError> {
    let name_and_type = |index: u16| -> Result<CpNameAndTypeInfo, ClassFormatError> {
        match class::constant(cp, index) {
            Some(class::ConstantPoolInfo::NameAndType {
                name_index,
                descriptor_index,
            }) => Ok(CpNameAndTypeInfo {
                name: resolve_utf8(cp, *name_index)?,
                descriptor: resolve_utf8(cp, *descriptor_index)?,
            }),
            _ => Err(ClassFormatError::new(format!(
                "Constant pool index {index} is not a name and type entry"
            ))),
        }
    };
    let member = |class_index: u16, nat_index: u16| -> Result<CpMemberRef, ClassFormatError> {
        Ok(CpMemberRef::new(
            resolve_class_name(cp, class_index)?,
            name_and_type(nat_index)?,
        ))
    };

    cp.iter()
        .map(|info| {
            type Cpi = ConstantPoolInfo;
            Ok(match info {
                class::ConstantPoolInfo::Utf8(v) => Cpi::Utf8(Arc::clone(v)),
                class::ConstantPoolInfo::Integer(v) => Cpi::Integer(*v),
                class::ConstantPoolInfo::Float(v) => Cpi::Float(*v),
                class::ConstantPoolInfo::Long(v) => Cpi::Long(*v),
                class::ConstantPoolInfo::Double(v) => Cpi::Double(*v),
                class::ConstantPoolInfo::Class { name_index } => {
                    Cpi::Class(CpClassInfo::new(resolve_utf8(cp, *name_index)?))
                }
                class::ConstantPoolInfo::String { string_index } => {
                    Cpi::String(resolve_utf8(cp, *string_index)?)
                }
                class::ConstantPoolInfo::Fieldref {
                    class_index,
                    name_and_type_index,
                } => Cpi::Fieldref(member(*class_index, *name_and_type_index)?),
                class::ConstantPoolInfo::Methodref {
                    class_index,
                    name_and_type_index,
                } => Cpi::Methodref(member(*class_index, *name_and_type_index)?),
                class::ConstantPoolInfo::InterfaceMethodref {
                    class_index,
                    name_and_type_index,
                } => Cpi::InterfaceMethodref(member(*class_index, *name_and_type_index)?),
                class::ConstantPoolInfo::NameAndType {
                    name_index,
                    descriptor_index,
                } => Cpi::NameAndType(CpNameAndTypeInfo {
                    name: resolve_utf8(cp, *name_index)?,
                    descriptor: resolve_utf8(cp, *descriptor_index)?,
                }),
                class::ConstantPoolInfo::MethodHandle {
                    reference_kind,
                    reference_index,
                } => {
                    let reference = match class::constant(cp, *reference_index) {
                        Some(
                            class::ConstantPoolInfo::Fieldref {
                                class_index,
                                name_and_type_index,
                            }
                            | class::ConstantPoolInfo::Methodref {
                                class_index,
                                name_and_type_index,
                            }
                            | class::ConstantPoolInfo::InterfaceMethodref {
                                class_index,
                                name_and_type_index,
                            },
                        ) => member(*class_index, *name_and_type_index)?,
                        _ => {
                            return Err(ClassFormatError::new(format!(
                                "Bad method handle reference {reference_index}"
                            )));
                        }
                    };
                    Cpi::MethodHandle {
                        reference_kind: *reference_kind,
                        reference,
                    }
                }
                class::ConstantPoolInfo::MethodType { descriptor_index } => {
                    Cpi::MethodType(resolve_utf8(cp, *descriptor_index)?)
                }
                class::ConstantPoolInfo::Dynamic {
                    bootstrap_method_attr_index,
                    name_and_type_index,
                } => Cpi::Dynamic {
                    bootstrap_index: *bootstrap_method_attr_index,
                    name_and_type: name_and_type(*name_and_type_index)?,
                },
                class::ConstantPoolInfo::InvokeDynamic {
                    bootstrap_method_attr_index,
                    name_and_type_index,
                } => Cpi::InvokeDynamic {
                    bootstrap_index: *bootstrap_method_attr_index,
                    name_and_type: name_and_type(*name_and_type_index)?,
                },
                class::ConstantPoolInfo::Module { name_index } => {
                    Cpi::Module(resolve_utf8(cp, *name_index)?)
                }
                class::ConstantPoolInfo::Package { name_index } => {
                    Cpi::Package(resolve_utf8(cp, *name_index)?)
                }
                class::ConstantPoolInfo::Empty => Cpi::Empty,
            })
        })
        .collect()
}

fn convert_field(
    cp: &[class::ConstantPoolInfo],
    field: &class::FieldInfo,
) -> Result<FieldInfo, ClassFormatError> {
    let name = resolve_utf8(cp, field.name_index)?;
    let descriptor = resolve_utf8(cp, field.descriptor_index)?;
    let (_, FieldDescriptor(field_type)) = descriptor::parse_field_descriptor(&descriptor)
        .map_err(|_| {
            ClassFormatError::new(format!("Field \"{name}\" has illegal signature \"{descriptor}\""))
        })?;
    let attributes = attributes::convert_attributes(&field.attributes, cp)?;
    let constant_value = attributes.iter().find_map(|a| match a {
        AttributeInfo::ConstantValue(value) => Some(value.clone()),
        _ => None,
    });
    Ok(FieldInfo {
        access_flags: field.access_flags,
        name,
        descriptor,
        field_type,
        constant_value,
        attributes,
    })
}

fn convert_method(
    cp: &[class::ConstantPoolInfo],
    method: &class::MethodInfo,
    class_name: &str,
) -> Result<MethodInfo, ClassFormatError> {
    let name = resolve_utf8(cp, method.name_index)?;
    let descriptor = resolve_utf8(cp, method.descriptor_index)?;
    let (_, parsed) = descriptor::parse_method_descriptor(&descriptor).map_err(|_| {
        ClassFormatError::new(format!(
            "Method \"{name}\" in class {class_name} has illegal signature \"{descriptor}\""
        ))
    })?;
    let attributes = attributes::convert_attributes(&method.attributes, cp)?;
    let code = attributes.iter().find_map(|a| match a {
        AttributeInfo::Code(code) => Some(Arc::clone(code)),
        _ => None,
    });

    let bodiless = method
        .access_flags
        .intersects(MethodAccessFlag::NATIVE | MethodAccessFlag::ABSTRACT);
    match (&code, bodiless) {
        (None, false) => {
            return Err(ClassFormatError::new(format!(
                "Absent Code attribute in method that is not native or abstract in class file {class_name}"
            )));
        }
        (Some(_), true) => {
            return Err(ClassFormatError::new(format!(
                "Code attribute in native or abstract methods in class file {class_name}"
            )));
        }
        _ => {}
    }

    let method = MethodInfo {
        access_flags: method.access_flags,
        name,
        descriptor,
        parsed,
        code,
        attributes,
    };
    if let Some(code) = &method.code {
        if (code.max_locals as usize) < method.arg_slots() {
            return Err(ClassFormatError::new(format!(
                "Arguments can't fit into locals in class file {class_name}"
            )));
        }
    }
    Ok(method)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        class::builder::{ClassBuilder, Code},
        runtime::method_area::{ClassStatus, status},
    };

    #[test]
    fn test_canonical_names() {
        assert_eq!(canonical_name("java.lang.String"), "java/lang/String");
        assert_eq!(canonical_name("Ljava/lang/String;"), "java/lang/String");
        assert_eq!(canonical_name("[I"), "[I");
    }

    #[test]
    fn test_builtin_classes_through_delegation() {
        let string = app().load("java.lang.String").unwrap();
        assert_eq!(string.loader, "bootstrap");
        assert_eq!(string.super_class.as_ref().unwrap().name(), "java/lang/Object");
        assert!(string.interfaces.iter().any(|i| i.name() == "java/lang/CharSequence"));
        assert!(Arc::ptr_eq(&string, &bootstrap().load("java/lang/String").unwrap()));
    }

    #[test]
    fn test_load_from_memory_and_queue_references() {
        let mut builder = ClassBuilder::new("loader/test/Main", "java/lang/Object");
        builder.class("loader/test/Helper");
        builder.default_constructor();
        app().define_in_memory("loader/test/Main", builder.build());
        app().define_in_memory(
            "loader/test/Helper",
            ClassBuilder::new("loader/test/Helper", "java/lang/Object").build(),
        );

        let main = app().load("loader/test/Main").unwrap();
        assert_eq!(main.loader, "app");
        assert!(main.declared_method("<init>", "()V").is_some());
        assert_eq!(status("loader/test/Main"), ClassStatus::Loaded);
        // referenced classes are loaded but not initialized
        assert_eq!(status("loader/test/Helper"), ClassStatus::Loaded);
    }

    #[test]
    fn test_missing_class() {
        match app().load("loader/test/Nowhere").unwrap_err() {
            Exception::Vm { class_name, message } => {
                assert_eq!(class_name.as_ref(), "java/lang/ClassNotFoundException");
                assert_eq!(message.as_deref(), Some("loader.test.Nowhere"));
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn test_wrong_name_and_bad_super() {
        app().define_in_memory(
            "loader/test/Alias",
            ClassBuilder::new("loader/test/Real", "java/lang/Object").build(),
        );
        let err = app().load("loader/test/Alias").unwrap_err();
        assert!(err.to_string().contains("wrong name: loader/test/Real"), "{err}");

        app().define_in_memory(
            "loader/test/FromString",
            ClassBuilder::new("loader/test/FromString", "java/lang/String").build(),
        );
        let err = app().load("loader/test/FromString").unwrap_err();
        assert!(err.to_string().starts_with("java.lang.VerifyError"), "{err}");

        app().define_in_memory(
            "loader/test/Orphan",
            ClassBuilder::new("loader/test/Orphan", "loader/test/Gone").build(),
        );
        let err = app().load("loader/test/Orphan").unwrap_err();
        assert!(err.to_string().starts_with("java.lang.NoClassDefFoundError"), "{err}");
    }

    #[test]
    fn test_circularity_detected() {
        app().define_in_memory(
            "loader/test/CycleA",
            ClassBuilder::new("loader/test/CycleA", "loader/test/CycleB").build(),
        );
        app().define_in_memory(
            "loader/test/CycleB",
            ClassBuilder::new("loader/test/CycleB", "loader/test/CycleA").build(),
        );
        let err = app().load("loader/test/CycleA").unwrap_err();
        assert!(err.to_string().starts_with("java.lang.ClassCircularityError"), "{err}");
    }

    #[test]
    fn test_method_checks() {
        let mut builder = ClassBuilder::new("loader/test/NoCode", "java/lang/Object");
        builder.method(0x0009, "f", "()V", None);
        app().define_in_memory("loader/test/NoCode", builder.build());
        let err = app().load("loader/test/NoCode").unwrap_err();
        assert!(err.to_string().contains("Absent Code attribute"), "{err}");

        let mut builder = ClassBuilder::new("loader/test/Cramped", "java/lang/Object");
        builder.method(0x0009, "f", "(JJ)V", Some(Code::new(0, 2, vec![0xb1])));
        app().define_in_memory("loader/test/Cramped", builder.build());
        let err = app().load("loader/test/Cramped").unwrap_err();
        assert!(err.to_string().contains("can't fit into locals"), "{err}");
    }

    #[test]
    fn test_array_classes() {
        let array = app().load("[[Ljava/lang/String;").unwrap();
        assert!(array.is_array());
        assert_eq!(array.super_class.as_ref().unwrap().name(), "java/lang/Object");
        assert_eq!(array.interfaces.len(), 2);
        assert!(Arc::ptr_eq(&array, &app().load("[[Ljava/lang/String;").unwrap()));
        assert!(app().load("[Lloader/test/Missing;").is_err());
    }

    #[test]
    fn test_class_path_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("loader/test")).unwrap();
        std::fs::write(
            dir.path().join("loader/test/OnDisk.class"),
            ClassBuilder::new("loader/test/OnDisk", "java/lang/Object").build(),
        )
        .unwrap();
        app().add_class_path(dir.path()).unwrap();
        let class = app().load("loader.test.OnDisk").unwrap();
        assert_eq!(class.name(), "loader/test/OnDisk");
    }
}
