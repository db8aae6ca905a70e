//! Skein Test Harness - Multi-peer scenarios over localhost UDP
//!
//! This crate provides:
//! - `TestNet`: a set of real peers bound on 127.0.0.1 with short timeouts
//! - End-to-end scenarios for topology, flooding and subscriptions

pub mod harness;
pub mod scenarios;

pub use harness::*;
