//! # Adapters Module
//!
//! In-process implementations of the outbound ports, used by tests and the
//! demo node in place of a real KMS and certificate directory.

pub mod directory;
pub mod kms;
