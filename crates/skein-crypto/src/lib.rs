//! Skein Crypto - Keys, authentication and content signatures
//!
//! Provides the cryptographic collaborators of the overlay:
//! - Key pairs (Ed25519)
//! - The `Authenticator` capability and an in-memory authority
//! - Signing and verification of timelines and posts

pub mod auth;
pub mod identity;
pub mod signing;

pub use auth::*;
pub use identity::*;
pub use signing::*;
