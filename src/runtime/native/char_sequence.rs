use super::{NativeReturn, bool_result, call_virtual, display, int_result};
use crate::runtime::{
    Value,
    mtable::{self, NativeEnv},
};

const CLASS: &str = "java/lang/CharSequence";

// default boolean isEmpty()
fn is_empty(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let this = args[0].as_object()?;
    let length = call_virtual(env.ctx()?, &this, "length", "()I", Vec::new())?
        .unwrap_or_default()
        .as_int()?;
    bool_result(length == 0)
}

// public static int compare(CharSequence cs1, CharSequence cs2)
fn compare(env: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let (first, second) = (args[0].as_object()?, args[1].as_object()?);
    let ctx = env.ctx()?;
    let first: Vec<u16> = display(ctx, Some(&first))?.encode_utf16().collect();
    let second: Vec<u16> = display(ctx, Some(&second))?.encode_utf16().collect();
    let differing = first.iter().zip(&second).find(|(a, b)| a != b);
    int_result(match differing {
        Some((a, b)) => *a as i32 - *b as i32,
        None => first.len() as i32 - second.len() as i32,
    })
}

pub(super) fn register_natives() {
    use mtable::register_ctx;

    register_ctx(CLASS, "isEmpty", "()Z", is_empty);
    register_ctx(
        CLASS,
        "compare",
        "(Ljava/lang/CharSequence;Ljava/lang/CharSequence;)I",
        compare,
    );
}
