//! Skein Wire Protocol - Binary envelope format
//!
//! This crate implements the wire format for overlay messages:
//! - Fixed header (16 bytes) carrying version, kind, ttl and message id
//! - JSON body holding the kind-specific payload

pub mod frame;
pub mod header;
pub mod message;

pub use frame::*;
pub use header::*;
pub use message::*;
