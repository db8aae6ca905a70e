//! Host identity records and neighbors
//!
//! A `Host` is identified by its request endpoint (address + port).
//! Everything else it carries (capacity, degree, limits) is metadata that
//! travels with gossip and may be stale on the receiving side.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

use crate::TimelineFilter;

/// Network endpoint of a peer socket
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Endpoint(pub SocketAddr);

impl Endpoint {
    #[inline]
    pub fn new(address: IpAddr, port: u16) -> Self {
        Endpoint(SocketAddr::new(address, port))
    }

    #[inline]
    pub fn address(&self) -> IpAddr {
        self.0.ip()
    }

    #[inline]
    pub fn port(&self) -> u16 {
        self.0.port()
    }

    #[inline]
    pub fn socket_addr(&self) -> SocketAddr {
        self.0
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Endpoint(addr)
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Endpoint({})", self.0)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity record of a peer
#[derive(Clone, Serialize, Deserialize)]
pub struct Host {
    /// Owner of the peer (one timeline per username)
    pub username: String,
    /// Request endpoint, the identity of the host
    endpoint: Endpoint,
    /// Port of the content feed socket (same address as the endpoint)
    pub feed_port: u16,
    /// Self-declared message handling budget
    pub capacity: u32,
    /// Current neighbor count
    pub degree: u32,
    /// Neighbor cap the host enforces
    pub max_neighbors: u32,
    /// Concurrent subscribers/redirects served per username
    pub max_subscribers: u32,
}

impl Host {
    pub fn new(username: impl Into<String>, endpoint: Endpoint, capacity: u32) -> Self {
        Self {
            username: username.into(),
            endpoint,
            feed_port: 0,
            capacity,
            degree: 0,
            max_neighbors: 0,
            max_subscribers: 0,
        }
    }

    pub fn with_feed_port(mut self, feed_port: u16) -> Self {
        self.feed_port = feed_port;
        self
    }

    pub fn with_limits(mut self, max_neighbors: u32, max_subscribers: u32) -> Self {
        self.max_neighbors = max_neighbors;
        self.max_subscribers = max_subscribers;
        self
    }

    pub fn with_degree(mut self, degree: u32) -> Self {
        self.degree = degree;
        self
    }

    #[inline]
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    #[inline]
    pub fn address(&self) -> IpAddr {
        self.endpoint.address()
    }

    #[inline]
    pub fn port(&self) -> u16 {
        self.endpoint.port()
    }

    /// Rebind the request port (after binding port 0)
    pub fn set_port(&mut self, port: u16) {
        self.endpoint = Endpoint::new(self.endpoint.address(), port);
    }

    /// Endpoint content feeds are published from
    #[inline]
    pub fn feed_endpoint(&self) -> Endpoint {
        Endpoint::new(self.endpoint.address(), self.feed_port)
    }

    /// Ordering key used to rank hosts: degree first, capacity breaks ties
    #[inline]
    pub fn rank(&self) -> (u32, u32) {
        (self.degree, self.capacity)
    }
}

impl PartialEq for Host {
    fn eq(&self, other: &Self) -> bool {
        self.endpoint == other.endpoint
    }
}

impl Eq for Host {}

impl Hash for Host {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.endpoint.hash(state);
    }
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("username", &self.username)
            .field("endpoint", &self.endpoint)
            .field("capacity", &self.capacity)
            .field("degree", &self.degree)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{} cap={} deg={}",
            self.username, self.endpoint, self.capacity, self.degree
        )
    }
}

/// A host admitted into the neighbor set, plus the filter summarising
/// which timelines it can reach
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Neighbor {
    pub host: Host,
    pub timelines: TimelineFilter,
}

impl Neighbor {
    pub fn new(host: Host) -> Self {
        Self {
            host,
            timelines: TimelineFilter::default(),
        }
    }

    pub fn with_filter(host: Host, timelines: TimelineFilter) -> Self {
        Self { host, timelines }
    }

    #[inline]
    pub fn endpoint(&self) -> Endpoint {
        self.host.endpoint()
    }

    /// Might this neighbor reach `username`'s timeline?
    ///
    /// False positives are possible, false negatives are not.
    #[inline]
    pub fn has_timeline(&self, username: &str) -> bool {
        self.timelines.might_contain(username)
    }
}

impl PartialEq for Neighbor {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host
    }
}

impl Eq for Neighbor {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn endpoint(port: u16) -> Endpoint {
        Endpoint::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    #[test]
    fn test_host_identity_is_endpoint() {
        let a = Host::new("alice", endpoint(9000), 10);
        let b = Host::new("renamed", endpoint(9000), 99).with_degree(4);
        let c = Host::new("alice", endpoint(9001), 10);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_set_port_keeps_address() {
        let mut host = Host::new("alice", endpoint(0), 10).with_feed_port(7000);
        host.set_port(9100);

        assert_eq!(host.port(), 9100);
        assert_eq!(host.address(), IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(host.feed_endpoint(), endpoint(7000));
    }

    #[test]
    fn test_rank_orders_by_degree_then_capacity() {
        let low = Host::new("a", endpoint(1), 50).with_degree(1);
        let high = Host::new("b", endpoint(2), 10).with_degree(2);
        let tie = Host::new("c", endpoint(3), 60).with_degree(1);

        assert!(high.rank() > low.rank());
        assert!(tie.rank() > low.rank());
    }

    #[test]
    fn test_neighbor_filter_lookup() {
        let mut filter = TimelineFilter::default();
        filter.insert("bob");
        let neighbor = Neighbor::with_filter(Host::new("alice", endpoint(1), 1), filter);

        assert!(neighbor.has_timeline("bob"));
    }
}
