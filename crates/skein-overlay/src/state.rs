//! PeerState - What one peer knows about the overlay
//!
//! Owns the neighbor set, the host cache, the aggregate timeline filter
//! and the subscription table. Operations never fail: invalid input
//! (adding self, removing a stranger, overfilling) is a no-op reported
//! through the return value.

use std::collections::HashMap;
use std::sync::Arc;

use skein_core::{Endpoint, Host, Neighbor, OverlayConfig, TimelineFilter};

use crate::{SubscriptionTable, TopologyObserver};

/// Topology model of a single peer
pub struct PeerState {
    /// Our own host record; degree tracks the neighbor set
    me: Host,

    neighbors: HashMap<Endpoint, Neighbor>,

    /// Known hosts, neighbors included, never ourselves
    host_cache: HashMap<Endpoint, Host>,

    /// Timelines reachable through us (local store + confirmed neighbors)
    timelines: TimelineFilter,

    super_peer_min_degree: u32,

    subscriptions: SubscriptionTable,

    observer: Option<Arc<dyn TopologyObserver>>,
}

impl PeerState {
    pub fn new(me: Host, config: &OverlayConfig) -> Self {
        let me = me
            .with_limits(config.max_neighbors, config.max_subscribers)
            .with_degree(0);

        Self {
            me,
            neighbors: HashMap::new(),
            host_cache: HashMap::new(),
            timelines: TimelineFilter::new(config.filter_bits, config.filter_hashes),
            super_peer_min_degree: config.super_peer_min_degree,
            subscriptions: SubscriptionTable::new(config.max_subscribers),
            observer: None,
        }
    }

    /// Our own host record
    pub fn me(&self) -> &Host {
        &self.me
    }

    pub fn username(&self) -> &str {
        &self.me.username
    }

    /// Rebind the request port
    pub fn set_port(&mut self, port: u16) {
        self.me.set_port(port);
    }

    pub fn set_feed_port(&mut self, port: u16) {
        self.me.feed_port = port;
    }

    /// Install the observer and announce ourselves to it
    pub fn set_observer(&mut self, observer: Arc<dyn TopologyObserver>) {
        observer.on_node_added(&self.me.username, self.me.capacity);
        self.observer = Some(observer);
    }

    // ===================================================================
    // Neighbors
    // ===================================================================

    pub fn neighbors(&self) -> Vec<Neighbor> {
        self.neighbors.values().cloned().collect()
    }

    pub fn neighbor(&self, endpoint: Endpoint) -> Option<&Neighbor> {
        self.neighbors.get(&endpoint)
    }

    pub fn neighbor_count(&self) -> usize {
        self.neighbors.len()
    }

    pub fn has_neighbor(&self, endpoint: Endpoint) -> bool {
        self.neighbors.contains_key(&endpoint)
    }

    pub fn is_full(&self) -> bool {
        self.neighbors.len() >= self.me.max_neighbors as usize
    }

    /// Degree at or above the super-peer threshold
    pub fn is_super_peer(&self) -> bool {
        self.me.degree >= self.super_peer_min_degree
    }

    /// Add a neighbor. Refused for ourselves, for existing neighbors and
    /// when the set is full.
    pub fn add_neighbor(&mut self, neighbor: Neighbor) -> bool {
        let endpoint = neighbor.endpoint();
        if endpoint == self.me.endpoint() || self.has_neighbor(endpoint) || self.is_full() {
            return false;
        }

        self.host_cache.insert(endpoint, neighbor.host.clone());
        let username = neighbor.host.username.clone();
        self.neighbors.insert(endpoint, neighbor);
        self.refresh_degree();

        tracing::info!(peer = %self.me.username, neighbor = %username, "neighbor added");
        if let Some(observer) = &self.observer {
            observer.on_edge_added(&self.me.username, &username);
        }
        true
    }

    /// Remove a neighbor; the host cache is left alone
    pub fn remove_neighbor(&mut self, endpoint: Endpoint) -> Option<Neighbor> {
        let removed = self.neighbors.remove(&endpoint)?;
        self.refresh_degree();

        tracing::info!(peer = %self.me.username, neighbor = %removed.host.username, "neighbor removed");
        if let Some(observer) = &self.observer {
            observer.on_edge_removed(&self.me.username, &removed.host.username);
        }
        Some(removed)
    }

    /// Swap `old` for `new`. Nothing changes when `new` is ourselves or
    /// already a neighbor.
    pub fn replace_neighbor(&mut self, old: Endpoint, new: Neighbor) -> bool {
        let endpoint = new.endpoint();
        if endpoint == self.me.endpoint() || self.has_neighbor(endpoint) {
            return false;
        }
        self.remove_neighbor(old);
        self.add_neighbor(new)
    }

    /// Refresh metadata of an existing neighbor (same identity)
    pub fn update_neighbor(&mut self, neighbor: Neighbor) -> bool {
        let endpoint = neighbor.endpoint();
        match self.neighbors.get_mut(&endpoint) {
            Some(existing) => {
                self.host_cache.insert(endpoint, neighbor.host.clone());
                *existing = neighbor;
                true
            }
            None => false,
        }
    }

    /// Lowest ranked neighbor whose capacity does not exceed `capacity`
    pub fn worst_neighbor_at_or_below(&self, capacity: u32) -> Option<Neighbor> {
        self.neighbors
            .values()
            .filter(|n| n.host.capacity <= capacity)
            .min_by_key(|n| n.host.rank())
            .cloned()
    }

    /// Highest ranked neighbor
    pub fn best_neighbor(&self) -> Option<Neighbor> {
        self.neighbors
            .values()
            .max_by_key(|n| n.host.rank())
            .cloned()
    }

    /// Neighbors whose filter might contain `username`
    pub fn neighbors_with_timeline(&self, username: &str) -> Vec<Neighbor> {
        self.neighbors
            .values()
            .filter(|n| n.has_timeline(username))
            .cloned()
            .collect()
    }

    fn refresh_degree(&mut self) {
        self.me.degree = self.neighbors.len() as u32;
    }

    // ===================================================================
    // Host cache
    // ===================================================================

    pub fn host_cache(&self) -> Vec<Host> {
        self.host_cache.values().cloned().collect()
    }

    pub fn knows_host(&self, endpoint: Endpoint) -> bool {
        self.host_cache.contains_key(&endpoint)
    }

    /// Insert or refresh a host. Returns true when the host was unknown.
    pub fn add_host(&mut self, host: Host) -> bool {
        if host.endpoint() == self.me.endpoint() {
            return false;
        }
        self.host_cache.insert(host.endpoint(), host).is_none()
    }

    /// Merge a gossiped cache, skipping ourselves
    pub fn update_host_cache(&mut self, hosts: impl IntoIterator<Item = Host>) {
        for host in hosts {
            self.add_host(host);
        }
    }

    pub fn remove_host(&mut self, endpoint: Endpoint) -> Option<Host> {
        self.host_cache.remove(&endpoint)
    }

    /// Highest ranked cached host that is not a neighbor
    pub fn best_host_not_neighbor(&self) -> Option<Host> {
        self.host_cache
            .values()
            .filter(|h| !self.neighbors.contains_key(&h.endpoint()))
            .max_by_key(|h| h.rank())
            .cloned()
    }

    // ===================================================================
    // Timeline filter
    // ===================================================================

    pub fn timeline_filter(&self) -> &TimelineFilter {
        &self.timelines
    }

    /// Restart the aggregate from the timelines held locally
    pub fn reset_timeline_filter<'a>(&mut self, usernames: impl IntoIterator<Item = &'a str>) {
        self.timelines.clear();
        for username in usernames {
            self.timelines.insert(username);
        }
    }

    /// Fold a neighbor's advertised filter into the aggregate
    pub fn merge_timeline_filter(&mut self, filter: &TimelineFilter) -> bool {
        self.timelines.merge(filter)
    }

    /// Our host record together with the aggregate filter, as advertised
    /// in gossip replies
    pub fn advertisement(&self) -> Neighbor {
        Neighbor::with_filter(self.me.clone(), self.timelines.clone())
    }

    // ===================================================================
    // Subscriptions
    // ===================================================================

    pub fn subscriptions(&self) -> &SubscriptionTable {
        &self.subscriptions
    }

    pub fn subscriptions_mut(&mut self) -> &mut SubscriptionTable {
        &mut self.subscriptions
    }

    // ===================================================================
    // Satisfaction
    // ===================================================================

    /// How well the neighbor set serves us, in `[0, 1)` or exactly 1.0
    /// when the set is full. Zero below `min_neighbors`.
    pub fn satisfaction(&self, min_neighbors: u32) -> f64 {
        let count = self.neighbors.len();
        if count < min_neighbors as usize || count == 0 {
            return 0.0;
        }
        if self.is_full() {
            return 1.0;
        }
        if self.me.capacity == 0 {
            return 0.0;
        }

        let total: u64 = self
            .neighbors
            .values()
            .map(|n| (n.host.capacity / count as u32) as u64)
            .sum();
        (total as f64 / self.me.capacity as f64) % 1.0
    }
}

impl std::fmt::Debug for PeerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerState")
            .field("me", &self.me)
            .field("neighbors", &self.neighbors.len())
            .field("host_cache", &self.host_cache.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EventLog, TopologyEvent};
    use proptest::prelude::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn endpoint(port: u16) -> Endpoint {
        Endpoint::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    fn host(name: &str, port: u16, capacity: u32) -> Host {
        Host::new(name, endpoint(port), capacity)
    }

    fn state(max_neighbors: u32) -> PeerState {
        let config = OverlayConfig {
            max_neighbors,
            ..OverlayConfig::default()
        };
        PeerState::new(host("me", 9000, 10), &config)
    }

    #[test]
    fn test_add_neighbor_updates_degree_and_cache() {
        let mut s = state(3);
        assert!(s.add_neighbor(Neighbor::new(host("a", 9001, 5))));

        assert_eq!(s.me().degree, 1);
        assert!(s.knows_host(endpoint(9001)));
        assert!(!s.add_neighbor(Neighbor::new(host("a", 9001, 5))));
        assert_eq!(s.me().degree, 1);
    }

    #[test]
    fn test_never_neighbors_itself() {
        let mut s = state(3);
        assert!(!s.add_neighbor(Neighbor::new(host("me", 9000, 10))));
        assert!(!s.add_host(host("me", 9000, 10)));
        assert_eq!(s.neighbor_count(), 0);
        assert!(s.host_cache().is_empty());
    }

    #[test]
    fn test_neighbor_cap() {
        let mut s = state(2);
        assert!(s.add_neighbor(Neighbor::new(host("a", 9001, 5))));
        assert!(s.add_neighbor(Neighbor::new(host("b", 9002, 5))));
        assert!(!s.add_neighbor(Neighbor::new(host("c", 9003, 5))));
        assert!(s.is_full());
    }

    #[test]
    fn test_remove_keeps_host_cache() {
        let mut s = state(3);
        s.add_neighbor(Neighbor::new(host("a", 9001, 5)));

        assert!(s.remove_neighbor(endpoint(9001)).is_some());
        assert!(s.remove_neighbor(endpoint(9001)).is_none());
        assert_eq!(s.me().degree, 0);
        assert!(s.knows_host(endpoint(9001)));
    }

    #[test]
    fn test_replace_neighbor() {
        let mut s = state(1);
        s.add_neighbor(Neighbor::new(host("a", 9001, 5)));

        assert!(s.replace_neighbor(endpoint(9001), Neighbor::new(host("b", 9002, 8))));
        assert!(!s.has_neighbor(endpoint(9001)));
        assert!(s.has_neighbor(endpoint(9002)));
        assert_eq!(s.me().degree, 1);
    }

    #[test]
    fn test_worst_neighbor_at_or_below() {
        let mut s = state(4);
        s.add_neighbor(Neighbor::new(host("a", 9001, 5).with_degree(3)));
        s.add_neighbor(Neighbor::new(host("b", 9002, 7).with_degree(1)));
        s.add_neighbor(Neighbor::new(host("c", 9003, 20).with_degree(0)));

        let worst = s.worst_neighbor_at_or_below(7).unwrap();
        assert_eq!(worst.host.username, "b");
        assert!(s.worst_neighbor_at_or_below(4).is_none());
        assert_eq!(s.best_neighbor().unwrap().host.username, "a");
    }

    #[test]
    fn test_best_host_not_neighbor() {
        let mut s = state(4);
        s.add_neighbor(Neighbor::new(host("a", 9001, 50).with_degree(5)));
        s.add_host(host("b", 9002, 5).with_degree(2));
        s.add_host(host("c", 9003, 30).with_degree(2));

        assert_eq!(s.best_host_not_neighbor().unwrap().username, "c");
    }

    #[test]
    fn test_update_neighbor_refreshes_metadata() {
        let mut s = state(2);
        s.add_neighbor(Neighbor::new(host("a", 9001, 5)));

        let mut filter = TimelineFilter::default();
        filter.insert("zoe");
        assert!(s.update_neighbor(Neighbor::with_filter(host("a", 9001, 5).with_degree(4), filter)));

        assert_eq!(s.neighbors_with_timeline("zoe").len(), 1);
        assert_eq!(s.neighbor(endpoint(9001)).unwrap().host.degree, 4);
        assert!(!s.update_neighbor(Neighbor::new(host("x", 9009, 1))));
    }

    #[test]
    fn test_timeline_filter_reset_and_merge() {
        let mut s = state(2);
        s.reset_timeline_filter(["me"]);

        let mut other = TimelineFilter::default();
        other.insert("bob");
        assert!(s.merge_timeline_filter(&other));

        assert!(s.timeline_filter().might_contain("me"));
        assert!(s.timeline_filter().might_contain("bob"));

        s.reset_timeline_filter(std::iter::empty());
        assert!(s.timeline_filter().is_empty());
    }

    #[test]
    fn test_super_peer_threshold() {
        let config = OverlayConfig {
            super_peer_min_degree: 2,
            ..OverlayConfig::default()
        };
        let mut s = PeerState::new(host("me", 9000, 10), &config);
        s.add_neighbor(Neighbor::new(host("a", 9001, 5)));
        assert!(!s.is_super_peer());
        s.add_neighbor(Neighbor::new(host("b", 9002, 5)));
        assert!(s.is_super_peer());
    }

    #[test]
    fn test_satisfaction() {
        let mut s = state(3);
        assert_eq!(s.satisfaction(1), 0.0);

        // (floor(4/2) + floor(2/2)) / 10
        s.add_neighbor(Neighbor::new(host("a", 9001, 4)));
        s.add_neighbor(Neighbor::new(host("b", 9002, 2)));
        assert!((s.satisfaction(1) - 0.3).abs() < 1e-9);
        assert_eq!(s.satisfaction(3), 0.0);

        s.add_neighbor(Neighbor::new(host("c", 9003, 1)));
        assert_eq!(s.satisfaction(1), 1.0);
    }

    #[test]
    fn test_observer_events() {
        let mut s = state(2);
        let log = Arc::new(EventLog::new());
        s.set_observer(log.clone());

        s.add_neighbor(Neighbor::new(host("a", 9001, 5)));
        s.remove_neighbor(endpoint(9001));

        assert_eq!(
            log.events(),
            vec![
                TopologyEvent::NodeAdded { id: "me".into(), capacity: 10 },
                TopologyEvent::EdgeAdded { a: "me".into(), b: "a".into() },
                TopologyEvent::EdgeRemoved { a: "me".into(), b: "a".into() },
            ]
        );
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(u16, u32),
        Remove(u16),
        Replace(u16, u16, u32),
        Cache(u16, u32),
    }

    fn op() -> impl Strategy<Value = Op> {
        // Port 9000 is ourselves
        let port = 9000u16..9012;
        prop_oneof![
            (port.clone(), 1u32..50).prop_map(|(p, c)| Op::Add(p, c)),
            port.clone().prop_map(Op::Remove),
            (port.clone(), port.clone(), 1u32..50).prop_map(|(a, b, c)| Op::Replace(a, b, c)),
            (port, 1u32..50).prop_map(|(p, c)| Op::Cache(p, c)),
        ]
    }

    proptest! {
        #[test]
        fn prop_topology_invariants_hold(max in 1u32..6, ops in proptest::collection::vec(op(), 0..64)) {
            let mut s = state(max);
            for op in ops {
                match op {
                    Op::Add(p, c) => { s.add_neighbor(Neighbor::new(host("n", p, c))); }
                    Op::Remove(p) => { s.remove_neighbor(endpoint(p)); }
                    Op::Replace(old, new, c) => { s.replace_neighbor(endpoint(old), Neighbor::new(host("n", new, c))); }
                    Op::Cache(p, c) => { s.add_host(host("n", p, c)); }
                }

                prop_assert!(s.neighbor_count() <= max as usize);
                prop_assert_eq!(s.me().degree as usize, s.neighbor_count());
                prop_assert!(!s.has_neighbor(endpoint(9000)));
                prop_assert!(!s.knows_host(endpoint(9000)));
            }
        }
    }
}
