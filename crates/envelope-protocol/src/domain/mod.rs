//! # Domain Layer
//!
//! Message metadata, schemes, key sources, rotation and the key cache.
//! No I/O; everything here is synchronous and independently testable.

pub mod errors;
pub mod key_cache;
pub mod key_source;
pub mod metadata;
pub mod rotation;
pub mod scheme;
pub mod session_key;
