use std::collections::HashMap;

use crate::class::structs::java_str;

#[derive(Clone, PartialEq)]
enum Constant {
    Utf8(String),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(u16),
    String(u16),
    Fieldref(u16, u16),
    Methodref(u16, u16),
    InterfaceMethodref(u16, u16),
    NameAndType(u16, u16),
    MethodHandle(u8, u16),
    InvokeDynamic(u16, u16),
}

impl Constant {
    fn width(&self) -> u16 {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }

    fn write(&self, out: &mut Vec<u8>) {
        match self {
            Constant::Utf8(text) => {
                let bytes = java_str::encode(text);
                out.push(1);
                out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
                out.extend_from_slice(&bytes);
            }
            Constant::Integer(v) => {
                out.push(3);
                out.extend_from_slice(&v.to_be_bytes());
            }
            Constant::Float(bits) => {
                out.push(4);
                out.extend_from_slice(&bits.to_be_bytes());
            }
            Constant::Long(v) => {
                out.push(5);
                out.extend_from_slice(&v.to_be_bytes());
            }
            Constant::Double(bits) => {
                out.push(6);
                out.extend_from_slice(&bits.to_be_bytes());
            }
            Constant::Class(name) => {
                out.push(7);
                out.extend_from_slice(&name.to_be_bytes());
            }
            Constant::String(value) => {
                out.push(8);
                out.extend_from_slice(&value.to_be_bytes());
            }
            Constant::Fieldref(class, nat) => write_pair(out, 9, *class, *nat),
            Constant::Methodref(class, nat) => write_pair(out, 10, *class, *nat),
            Constant::InterfaceMethodref(class, nat) => write_pair(out, 11, *class, *nat),
            Constant::NameAndType(name, descriptor) => write_pair(out, 12, *name, *descriptor),
            Constant::MethodHandle(kind, index) => {
                out.push(15);
                out.push(*kind);
                out.extend_from_slice(&index.to_be_bytes());
            }
            Constant::InvokeDynamic(bootstrap, nat) => write_pair(out, 18, *bootstrap, *nat),
        }
    }
}

fn write_pair(out: &mut Vec<u8>, tag: u8, a: u16, b: u16) {
    out.push(tag);
    out.extend_from_slice(&a.to_be_bytes());
    out.extend_from_slice(&b.to_be_bytes());
}

fn u16_bytes(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

/// Body of a `Code` attribute.
pub(crate) struct Code {
    pub(crate) max_stack: u16,
    pub(crate) max_locals: u16,
    pub(crate) bytes: Vec<u8>,
    /// (start, end, handler, catch class index or 0)
    pub(crate) handlers: Vec<(u16, u16, u16, u16)>,
    /// (pc, line)
    pub(crate) lines: Vec<(u16, u16)>,
}

impl Code {
    pub(crate) fn new(max_stack: u16, max_locals: u16, bytes: Vec<u8>) -> Self {
        Code {
            max_stack,
            max_locals,
            bytes,
            handlers: vec![],
            lines: vec![],
        }
    }

    pub(crate) fn handler(mut self, start: u16, end: u16, handler: u16, catch_type: u16) -> Self {
        self.handlers.push((start, end, handler, catch_type));
        self
    }

    pub(crate) fn line(mut self, pc: u16, line: u16) -> Self {
        self.lines.push((pc, line));
        self
    }
}

pub(crate) struct ClassBuilder {
    constants: Vec<Constant>,
    next_index: u16,
    access_flags: u16,
    this_class: u16,
    super_class: u16,
    super_name: Option<String>,
    interfaces: Vec<u16>,
    fields: Vec<Vec<u8>>,
    methods: Vec<Vec<u8>>,
    source_file: Option<u16>,
    bootstrap_methods: Vec<(u16, Vec<u16>)>,
    lookup: HashMap<Vec<u8>, u16>,
    major_version: u16,
}

impl ClassBuilder {
    pub(crate) fn new(name: &str, super_name: &str) -> Self {
        let mut builder = ClassBuilder {
            constants: vec![],
            next_index: 1,
            access_flags: 0x0021,
            this_class: 0,
            super_class: 0,
            super_name: None,
            interfaces: vec![],
            fields: vec![],
            methods: vec![],
            source_file: None,
            bootstrap_methods: vec![],
            lookup: HashMap::new(),
            major_version: 61,
        };
        builder.this_class = builder.class(name);
        if !super_name.is_empty() {
            builder.super_class = builder.class(super_name);
            builder.super_name = Some(super_name.to_string());
        }
        builder
    }

    pub(crate) fn access_flags(&mut self, flags: u16) -> &mut Self {
        self.access_flags = flags;
        self
    }

    pub(crate) fn interface(&mut self, name: &str) -> &mut Self {
        let index = self.class(name);
        self.interfaces.push(index);
        self
    }

    fn push(&mut self, constant: Constant) -> u16 {
        let mut key = vec![];
        constant.write(&mut key);
        if let Some(index) = self.lookup.get(&key) {
            return *index;
        }
        let index = self.next_index;
        self.next_index += constant.width();
        self.constants.push(constant);
        self.lookup.insert(key, index);
        index
    }

    pub(crate) fn utf8(&mut self, text: &str) -> u16 {
        self.push(Constant::Utf8(text.to_string()))
    }

    pub(crate) fn class(&mut self, name: &str) -> u16 {
        let name = self.utf8(name);
        self.push(Constant::Class(name))
    }

    pub(crate) fn string(&mut self, text: &str) -> u16 {
        let text = self.utf8(text);
        self.push(Constant::String(text))
    }

    pub(crate) fn integer(&mut self, value: i32) -> u16 {
        self.push(Constant::Integer(value))
    }

    pub(crate) fn float(&mut self, value: f32) -> u16 {
        self.push(Constant::Float(value.to_bits()))
    }

    pub(crate) fn long(&mut self, value: i64) -> u16 {
        self.push(Constant::Long(value))
    }

    pub(crate) fn double(&mut self, value: f64) -> u16 {
        self.push(Constant::Double(value.to_bits()))
    }

    pub(crate) fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);
        self.push(Constant::NameAndType(name, descriptor))
    }

    pub(crate) fn field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class = self.class(class);
        let nat = self.name_and_type(name, descriptor);
        self.push(Constant::Fieldref(class, nat))
    }

    pub(crate) fn method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class = self.class(class);
        let nat = self.name_and_type(name, descriptor);
        self.push(Constant::Methodref(class, nat))
    }

    pub(crate) fn interface_method_ref(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> u16 {
        let class = self.class(class);
        let nat = self.name_and_type(name, descriptor);
        self.push(Constant::InterfaceMethodref(class, nat))
    }

    /// Registers a bootstrap method whose handle invokes `class.name descriptor` statically,
    /// and returns an `InvokeDynamic` entry pointing at it.
    pub(crate) fn invoke_dynamic(
        &mut self,
        bootstrap: (&str, &str, &str),
        static_args: Vec<u16>,
        name: &str,
        descriptor: &str,
    ) -> u16 {
        let method = self.method_ref(bootstrap.0, bootstrap.1, bootstrap.2);
        let handle = self.push(Constant::MethodHandle(6, method));
        self.utf8("BootstrapMethods");
        let bootstrap_index = self.bootstrap_methods.len() as u16;
        self.bootstrap_methods.push((handle, static_args));
        let nat = self.name_and_type(name, descriptor);
        self.push(Constant::InvokeDynamic(bootstrap_index, nat))
    }

    pub(crate) fn field(&mut self, flags: u16, name: &str, descriptor: &str) -> &mut Self {
        self.field_with_constant(flags, name, descriptor, None)
    }

    pub(crate) fn field_with_constant(
        &mut self,
        flags: u16,
        name: &str,
        descriptor: &str,
        constant_value: Option<u16>,
    ) -> &mut Self {
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);
        let mut out = vec![];
        u16_bytes(&mut out, flags);
        u16_bytes(&mut out, name);
        u16_bytes(&mut out, descriptor);
        match constant_value {
            Some(value) => {
                let attribute_name = self.utf8("ConstantValue");
                u16_bytes(&mut out, 1);
                u16_bytes(&mut out, attribute_name);
                out.extend_from_slice(&2u32.to_be_bytes());
                u16_bytes(&mut out, value);
            }
            None => u16_bytes(&mut out, 0),
        }
        self.fields.push(out);
        self
    }

    pub(crate) fn method(
        &mut self,
        flags: u16,
        name: &str,
        descriptor: &str,
        code: Option<Code>,
    ) -> &mut Self {
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);
        let mut out = vec![];
        u16_bytes(&mut out, flags);
        u16_bytes(&mut out, name);
        u16_bytes(&mut out, descriptor);
        match code {
            Some(code) => {
                u16_bytes(&mut out, 1);
                let attribute = self.code_attribute(code);
                out.extend_from_slice(&attribute);
            }
            None => u16_bytes(&mut out, 0),
        }
        self.methods.push(out);
        self
    }

    /// `aload_0; invokespecial super.<init>()V; return`
    pub(crate) fn default_constructor(&mut self) -> &mut Self {
        let super_name = self
            .super_name
            .clone()
            .unwrap_or_else(|| "java/lang/Object".to_string());
        let init = self.method_ref(&super_name, "<init>", "()V");
        let [hi, lo] = init.to_be_bytes();
        self.method(
            0x0001,
            "<init>",
            "()V",
            Some(Code::new(1, 1, vec![0x2a, 0xb7, hi, lo, 0xb1])),
        )
    }

    pub(crate) fn source_file(&mut self, file: &str) -> &mut Self {
        self.utf8("SourceFile");
        self.source_file = Some(self.utf8(file));
        self
    }

    fn code_attribute(&mut self, code: Code) -> Vec<u8> {
        let code_name = self.utf8("Code");
        let mut body = vec![];
        u16_bytes(&mut body, code.max_stack);
        u16_bytes(&mut body, code.max_locals);
        body.extend_from_slice(&(code.bytes.len() as u32).to_be_bytes());
        body.extend_from_slice(&code.bytes);
        u16_bytes(&mut body, code.handlers.len() as u16);
        for (start, end, handler, catch_type) in &code.handlers {
            u16_bytes(&mut body, *start);
            u16_bytes(&mut body, *end);
            u16_bytes(&mut body, *handler);
            u16_bytes(&mut body, *catch_type);
        }
        if code.lines.is_empty() {
            u16_bytes(&mut body, 0);
        } else {
            let lines_name = self.utf8("LineNumberTable");
            u16_bytes(&mut body, 1);
            u16_bytes(&mut body, lines_name);
            body.extend_from_slice(&(2 + 4 * code.lines.len() as u32).to_be_bytes());
            u16_bytes(&mut body, code.lines.len() as u16);
            for (pc, line) in &code.lines {
                u16_bytes(&mut body, *pc);
                u16_bytes(&mut body, *line);
            }
        }

        let mut out = vec![];
        u16_bytes(&mut out, code_name);
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        out.extend_from_slice(&body);
        out
    }

    pub(crate) fn build(&mut self) -> Vec<u8> {
        let mut attributes: Vec<Vec<u8>> = vec![];
        if let Some(file) = self.source_file {
            let name = self.utf8("SourceFile");
            let mut out = vec![];
            u16_bytes(&mut out, name);
            out.extend_from_slice(&2u32.to_be_bytes());
            u16_bytes(&mut out, file);
            attributes.push(out);
        }
        if !self.bootstrap_methods.is_empty() {
            let name = self.utf8("BootstrapMethods");
            let mut body = vec![];
            u16_bytes(&mut body, self.bootstrap_methods.len() as u16);
            for (handle, args) in &self.bootstrap_methods {
                u16_bytes(&mut body, *handle);
                u16_bytes(&mut body, args.len() as u16);
                for arg in args {
                    u16_bytes(&mut body, *arg);
                }
            }
            let mut out = vec![];
            u16_bytes(&mut out, name);
            out.extend_from_slice(&(body.len() as u32).to_be_bytes());
            out.extend_from_slice(&body);
            attributes.push(out);
        }

        let mut out = vec![0xca, 0xfe, 0xba, 0xbe];
        u16_bytes(&mut out, 0);
        u16_bytes(&mut out, self.major_version);
        u16_bytes(&mut out, self.next_index);
        for constant in &self.constants {
            constant.write(&mut out);
        }
        u16_bytes(&mut out, self.access_flags);
        u16_bytes(&mut out, self.this_class);
        u16_bytes(&mut out, self.super_class);
        u16_bytes(&mut out, self.interfaces.len() as u16);
        for interface in &self.interfaces {
            u16_bytes(&mut out, *interface);
        }
        u16_bytes(&mut out, self.fields.len() as u16);
        for field in &self.fields {
            out.extend_from_slice(field);
        }
        u16_bytes(&mut out, self.methods.len() as u16);
        for method in &self.methods {
            out.extend_from_slice(method);
        }
        u16_bytes(&mut out, attributes.len() as u16);
        for attribute in &attributes {
            out.extend_from_slice(attribute);
        }
        out
    }
}

/// Bytecode assembler with forward/backward labels for branch offsets.
#[derive(Default)]
pub(crate) struct Asm {
    code: Vec<u8>,
    labels: HashMap<&'static str, usize>,
    /// (position of the offset bytes, instruction start, label, wide offset)
    fixups: Vec<(usize, usize, &'static str, bool)>,
}

impl Asm {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn pc(&self) -> u16 {
        self.code.len() as u16
    }

    pub(crate) fn op(&mut self, op: u8) -> &mut Self {
        self.code.push(op);
        self
    }

    pub(crate) fn op_u8(&mut self, op: u8, arg: u8) -> &mut Self {
        self.code.extend_from_slice(&[op, arg]);
        self
    }

    pub(crate) fn op_u16(&mut self, op: u8, arg: u16) -> &mut Self {
        self.code.push(op);
        self.code.extend_from_slice(&arg.to_be_bytes());
        self
    }

    pub(crate) fn bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.code.extend_from_slice(bytes);
        self
    }

    pub(crate) fn label(&mut self, name: &'static str) -> &mut Self {
        self.labels.insert(name, self.code.len());
        self
    }

    pub(crate) fn branch(&mut self, op: u8, label: &'static str) -> &mut Self {
        let start = self.code.len();
        self.code.extend_from_slice(&[op, 0, 0]);
        self.fixups.push((start + 1, start, label, false));
        self
    }

    pub(crate) fn finish(&mut self) -> Vec<u8> {
        for (at, start, label, wide) in &self.fixups {
            let target = self.labels[label] as i64;
            let offset = target - *start as i64;
            if *wide {
                self.code[*at..*at + 4].copy_from_slice(&(offset as i32).to_be_bytes());
            } else {
                self.code[*at..*at + 2].copy_from_slice(&(offset as i16).to_be_bytes());
            }
        }
        std::mem::take(&mut self.code)
    }
}
