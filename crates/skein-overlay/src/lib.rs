//! Skein Overlay - The topology model of a peer
//!
//! Everything a peer knows about the overlay lives here, independent of
//! sockets and timers:
//! - Neighbor set and host cache with their invariants
//! - Topology change notifications
//! - Flood target selection (blind or filter assisted)
//! - Subscriptions, subscribers and relay redirects
//! - The timeline storage collaborator
//!
//! # Invariants
//!
//! - `|neighbors| <= max_neighbors`
//! - A peer never neighbors itself nor caches itself
//! - `degree == |neighbors|` after every mutation
//! - Neighbors are added to the host cache when admitted

pub mod flood;
pub mod observer;
pub mod state;
pub mod store;
pub mod subscription;

pub use flood::*;
pub use observer::*;
pub use state::*;
pub use store::*;
pub use subscription::*;
