use super::{NativeReturn, bool_result, string_result};
use crate::runtime::{
    Value,
    mtable::{self, NativeEnv},
};

const CLASS: &str = "java/lang/reflect/Modifier";

/// Flags in the order `Modifier.toString` lists them.
const NAMES: [(i32, &str); 12] = [
    (0x0001, "public"),
    (0x0004, "protected"),
    (0x0002, "private"),
    (0x0400, "abstract"),
    (0x0008, "static"),
    (0x0010, "final"),
    (0x0080, "transient"),
    (0x0040, "volatile"),
    (0x0020, "synchronized"),
    (0x0100, "native"),
    (0x0800, "strictfp"),
    (0x0200, "interface"),
];

pub(crate) fn modifier_text(modifiers: i32) -> String {
    NAMES
        .iter()
        .filter(|(flag, _)| modifiers & flag != 0)
        .map(|(_, name)| *name)
        .collect::<Vec<_>>()
        .join(" ")
}

macro_rules! predicates {
    ($($name:ident => $flag:expr,)*) => {
        $(
            fn $name(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
                bool_result(args[0].as_int()? & $flag != 0)
            }
        )*
    };
}

predicates! {
    is_public => 0x0001,
    is_private => 0x0002,
    is_protected => 0x0004,
    is_static => 0x0008,
    is_final => 0x0010,
    is_synchronized => 0x0020,
    is_volatile => 0x0040,
    is_transient => 0x0080,
    is_native => 0x0100,
    is_interface => 0x0200,
    is_abstract => 0x0400,
    is_strict => 0x0800,
}

// public static String toString(int mod)
fn to_string(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    string_result(&modifier_text(args[0].as_int()?))
}

pub(super) fn register_natives() {
    use mtable::register;

    let predicates: [(&str, mtable::GFunction); 12] = [
        ("isPublic", is_public),
        ("isPrivate", is_private),
        ("isProtected", is_protected),
        ("isStatic", is_static),
        ("isFinal", is_final),
        ("isSynchronized", is_synchronized),
        ("isVolatile", is_volatile),
        ("isTransient", is_transient),
        ("isNative", is_native),
        ("isInterface", is_interface),
        ("isAbstract", is_abstract),
        ("isStrict", is_strict),
    ];
    for (name, function) in predicates {
        register(CLASS, name, "(I)Z", function);
    }
    register(CLASS, "toString", "(I)Ljava/lang/String;", to_string);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modifier_text_order() {
        assert_eq!(modifier_text(0x0019), "public static final");
        assert_eq!(modifier_text(0x0411), "public abstract final");
        assert_eq!(modifier_text(0), "");
    }
}
