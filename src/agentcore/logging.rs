//! Logging setup helper.
//!
//! A library must never install global logging state on its own, so nothing
//! in this crate calls `env_logger::init()` implicitly. Binaries and tests
//! that want `HICA_LOG_LEVEL` honored in addition to the conventional
//! `RUST_LOG` can call [`init`] once at startup.

/// Initialize `env_logger`, honoring `HICA_LOG_LEVEL` as a fallback when
/// `RUST_LOG` is unset.
///
/// Safe to call more than once; subsequent calls are no-ops, matching
/// `env_logger::try_init`'s behavior.
///
/// Requires the `logging-init` feature; without it this is a no-op so the
/// crate never pulls `env_logger` into a consumer's dependency tree
/// unasked.
pub fn init() {
    #[cfg(feature = "logging-init")]
    {
        if std::env::var("RUST_LOG").is_err() {
            if let Ok(level) = std::env::var("HICA_LOG_LEVEL") {
                std::env::set_var("RUST_LOG", level);
            }
        }
        let _ = env_logger::try_init();
    }
}
