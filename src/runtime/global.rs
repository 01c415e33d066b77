use std::{sync::OnceLock, time::Instant};

use once_cell::sync::Lazy;

use crate::config::VmOptions;

static OPTIONS: OnceLock<VmOptions> = OnceLock::new();
static DEFAULT_OPTIONS: Lazy<VmOptions> = Lazy::new(VmOptions::default);
pub(crate) static START: Lazy<Instant> = Lazy::new(Instant::now);

/// Installs the launcher configuration; only the first call has an effect.
pub(crate) fn install(options: VmOptions) -> bool {
    Lazy::force(&START);
    OPTIONS.set(options).is_ok()
}

pub(crate) fn options() -> &'static VmOptions {
    OPTIONS.get().unwrap_or(&DEFAULT_OPTIONS)
}

pub(crate) fn max_frame_depth() -> usize {
    options().max_frame_depth
}

/// `System.getProperty` entries given with `-D`.
pub(crate) fn property(name: &str) -> Option<&'static str> {
    options().properties.get(name).map(String::as_str)
}
