//! Skein Runtime - A running overlay peer
//!
//! Composes the layers in dependency order:
//! - `PromiseTable`: request/response correlation
//! - `MessageSender`: acknowledged sends and correlated requests
//! - `Router`: protocol handling of every inbound message kind
//! - Gossip, admission and subscription probe rounds
//! - `Broker`: coordinator task plus worker pool
//! - `Peer`: the facade callers drive

pub mod admission;
pub mod broker;
pub mod context;
pub mod gossip;
pub mod logging;
pub mod peer;
pub mod probe;
pub mod promise;
pub mod router;
pub mod sender;

pub use admission::*;
pub use broker::*;
pub use context::*;
pub use gossip::*;
pub use logging::*;
pub use peer::*;
pub use probe::*;
pub use promise::*;
pub use router::*;
pub use sender::*;
