use super::{NativeReturn, bool_result, nop};
use crate::runtime::{
    Exception, Value,
    mtable::{self, NativeEnv},
};

const SECURITY_MANAGER: &str = "java/lang/SecurityManager";

fn security_manager_removed(_: &mut NativeEnv, _: Vec<Value>) -> NativeReturn {
    Err(Exception::with_message(
        "java/lang/UnsupportedOperationException",
        "The Security Manager is deprecated and will be removed in a future release",
    ))
}

fn unsupported(_: &mut NativeEnv, _: Vec<Value>) -> NativeReturn {
    Err(Exception::new("java/lang/UnsupportedOperationException"))
}

// public static boolean compileClass(Class<?> clazz) and friends
fn not_compiled(_: &mut NativeEnv, _: Vec<Value>) -> NativeReturn {
    bool_result(false)
}

// public static Object command(Object any)
fn no_command(_: &mut NativeEnv, _: Vec<Value>) -> NativeReturn {
    Ok(Some(Value::Null))
}

pub(super) fn register_natives() {
    use mtable::register;

    register(
        "java/lang/System",
        "setSecurityManager",
        "(Ljava/lang/SecurityManager;)V",
        security_manager_removed,
    );
    register(SECURITY_MANAGER, "<init>", "()V", security_manager_removed);
    register(SECURITY_MANAGER, "checkPermission", "(Ljava/security/Permission;)V", security_manager_removed);
    register(SECURITY_MANAGER, "checkExit", "(I)V", security_manager_removed);
    register(SECURITY_MANAGER, "checkRead", "(Ljava/lang/String;)V", security_manager_removed);
    register(SECURITY_MANAGER, "checkWrite", "(Ljava/lang/String;)V", security_manager_removed);
    register(SECURITY_MANAGER, "checkPropertyAccess", "(Ljava/lang/String;)V", security_manager_removed);

    for name in ["stop", "suspend", "resume"] {
        register("java/lang/Thread", name, "()V", unsupported);
    }
    register("java/lang/Thread", "countStackFrames", "()I", unsupported);

    let compiler = "java/lang/Compiler";
    register(compiler, "compileClass", "(Ljava/lang/Class;)Z", not_compiled);
    register(compiler, "compileClasses", "(Ljava/lang/String;)Z", not_compiled);
    register(compiler, "command", "(Ljava/lang/Object;)Ljava/lang/Object;", no_command);
    register(compiler, "enable", "()V", nop);
    register(compiler, "disable", "()V", nop);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_manager_message() {
        let mut env = NativeEnv::new(None);
        let err = security_manager_removed(&mut env, vec![Value::Null]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "java.lang.UnsupportedOperationException: \
             The Security Manager is deprecated and will be removed in a future release"
        );
    }
}
