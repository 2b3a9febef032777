//! Build version information

/// Crate version, as set in `Cargo.toml`
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the current crate version
pub fn get_version() -> &'static str {
    VERSION
}
