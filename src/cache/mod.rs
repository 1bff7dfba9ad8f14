//! Caching subsystem.
//!
//! [`response::ResponseCache`] persists successful, cache-eligible responses
//! on disk, keyed on a content hash of endpoint and payload. It is opened by
//! [`HuginnBuilder::build()`](crate::HuginnBuilder::build) unless disabled
//! via [`CacheConfig::enabled`].

pub mod response;

pub use response::{CacheConfig, ResponseCache, request_key};
