//! # Ports Layer
//!
//! Trait definitions for the hexagonal architecture.
//! - **Inbound (Driving)**: what the application calls to protect and open messages
//! - **Outbound (Driven)**: the remote KMS and certificate directory this crate needs

pub mod inbound;
pub mod outbound;
