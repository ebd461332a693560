//! Logging setup
//!
//! `RUST_LOG` overrides the default `info` filter.

/// Installs the global logger. Call once, before the server starts.
pub fn setup_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}
