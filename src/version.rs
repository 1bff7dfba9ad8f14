//! Version information.

/// Package version from Cargo.toml.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// `User-Agent` header sent with every request: `huginn/{version}`.
pub fn user_agent() -> String {
    format!("huginn/{PKG_VERSION}")
}
