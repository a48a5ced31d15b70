//! Logging setup
//!
//! Library code logs through the `log` macros directly; binaries call one of
//! these once at startup.

/// Initialize the logging system
///
/// Reads the filter from `RUST_LOG`. Safe to call more than once; later calls
/// are ignored.
pub fn init() {
    let _ = env_logger::try_init();
}

/// Initialize the logging system with a default filter
///
/// `level` is used when `RUST_LOG` is unset (for example the `log_level` field
/// of [`RegistryConfig`](crate::core::config::RegistryConfig)).
pub fn init_with_level(level: &str) {
    let env = env_logger::Env::default().default_filter_or(level);
    let _ = env_logger::Builder::from_env(env).try_init();
}
