//! Package-level constants.

/// Current version of the daemon (sourced from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name, reported in `/health` responses and log spans.
pub const NAME: &str = "gasoline";
