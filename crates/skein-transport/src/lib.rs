//! Skein Transport Layer - UDP sockets and delivery confirmation
//!
//! This crate provides:
//! - UDP transport bound to a request or feed endpoint
//! - Acknowledged delivery with bounded retries

pub mod delivery;
pub mod udp;

pub use delivery::*;
pub use udp::*;
