use crate::runtime::{NativeResult, class_loader, native, statics, thread::ThreadContext};

/// Loaded before the main class. The first four are initialized too, so
/// `System.out` and the `Thread` priority constants exist before any user
/// code runs.
const FAMOUS_CLASSES: [&str; 8] = [
    "java/lang/Object",
    "java/lang/String",
    "java/lang/System",
    "java/lang/Thread",
    "java/lang/Class",
    "java/lang/Throwable",
    "java/lang/StackTraceElement",
    "[Ljava/lang/String;",
];

const INITIALIZED: usize = 4;

pub(super) fn preload(ctx: &mut ThreadContext) -> NativeResult<()> {
    native::register_natives();
    let bootstrap = class_loader::bootstrap();
    for (i, name) in FAMOUS_CLASSES.iter().enumerate() {
        let class = bootstrap.load(name)?;
        if i < INITIALIZED {
            statics::initialize(ctx, &class)?;
        }
    }
    log::debug!("{} famous classes preloaded", FAMOUS_CLASSES.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ClinitStatus;

    #[test]
    fn test_preload_initializes_system() {
        let mut ctx = ThreadContext::new();
        preload(&mut ctx).unwrap();
        let system = class_loader::bootstrap().load("java/lang/System").unwrap();
        assert_eq!(system.clinit_status(), ClinitStatus::Done);
        assert!(statics::get_static_value("java/lang/System", "out").is_some_and(|v| !v.is_null()));
        let max = statics::get_static_value("java/lang/Thread", "MAX_PRIORITY").unwrap();
        assert_eq!(max.as_int().unwrap(), 10);
    }
}
