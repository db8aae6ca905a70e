//! Skein Core - Fundamental types of the timeline overlay
//!
//! This crate defines the types shared by every layer of the overlay:
//! - Identifiers (MessageId)
//! - Host identity records and neighbors
//! - Probabilistic timeline filters
//! - Timelines and posts
//! - Overlay configuration

pub mod config;
pub mod error;
pub mod filter;
pub mod host;
pub mod id;
pub mod timeline;

pub use config::*;
pub use error::*;
pub use filter::*;
pub use host::*;
pub use id::*;
pub use timeline::*;
