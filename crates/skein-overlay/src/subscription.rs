//! Subscriptions and relay redirects
//!
//! Upstream side: the timelines this peer pulls, each bound to the relay
//! that accepted the subscription. Downstream side: per username, the feed
//! endpoints this peer publishes to. For its own username those are
//! subscribers; for any other username they are redirects, fed from the
//! upstream subscription.

use std::collections::HashMap;

use skein_core::{Endpoint, Post};

/// Where a subscription's posts come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Upstream {
    /// Request endpoint answering subscription health probes
    pub relay: Endpoint,
    /// Feed endpoint posts are sent from
    pub feed: Endpoint,
}

/// Subscription state of one peer
#[derive(Debug, Clone)]
pub struct SubscriptionTable {
    /// Cap on downstream endpoints per username
    max_per_user: u32,
    upstream: HashMap<String, Upstream>,
    downstream: HashMap<String, Vec<Endpoint>>,
    /// Posts received on subscriptions and not yet taken
    received: HashMap<String, Vec<Post>>,
}

impl SubscriptionTable {
    pub fn new(max_per_user: u32) -> Self {
        Self {
            max_per_user,
            upstream: HashMap::new(),
            downstream: HashMap::new(),
            received: HashMap::new(),
        }
    }

    // Upstream

    pub fn subscribe(&mut self, username: impl Into<String>, upstream: Upstream) {
        self.upstream.insert(username.into(), upstream);
    }

    /// Drop the subscription. Redirects registered for `username` stay in
    /// place and are not notified; no further posts reach them from here.
    pub fn unsubscribe(&mut self, username: &str) -> Option<Upstream> {
        self.upstream.remove(username)
    }

    pub fn is_subscribed(&self, username: &str) -> bool {
        self.upstream.contains_key(username)
    }

    pub fn upstream(&self, username: &str) -> Option<Upstream> {
        self.upstream.get(username).copied()
    }

    /// Active subscriptions
    pub fn subscriptions(&self) -> Vec<(String, Upstream)> {
        self.upstream
            .iter()
            .map(|(u, up)| (u.clone(), *up))
            .collect()
    }

    /// Should a feed frame for `username` arriving from `from` be taken?
    pub fn accepts_feed(&self, username: &str, from: Endpoint) -> bool {
        self.upstream
            .get(username)
            .map(|up| up.feed == from)
            .unwrap_or(false)
    }

    // Downstream

    /// Room for another subscriber or redirect on `username`?
    pub fn can_serve(&self, username: &str) -> bool {
        self.downstream_count(username) < self.max_per_user as usize
    }

    /// Register a downstream feed endpoint. Already registered endpoints
    /// are accepted again without taking a second slot.
    pub fn add_downstream(&mut self, username: &str, endpoint: Endpoint) -> bool {
        let targets = self.downstream.entry(username.to_string()).or_default();
        if targets.contains(&endpoint) {
            return true;
        }
        if targets.len() >= self.max_per_user as usize {
            return false;
        }
        targets.push(endpoint);
        true
    }

    pub fn remove_downstream(&mut self, username: &str, endpoint: Endpoint) -> bool {
        let Some(targets) = self.downstream.get_mut(username) else {
            return false;
        };
        let before = targets.len();
        targets.retain(|e| *e != endpoint);
        let removed = targets.len() != before;
        if targets.is_empty() {
            self.downstream.remove(username);
        }
        removed
    }

    /// Feed endpoints posts of `username` are published to
    pub fn downstream(&self, username: &str) -> Vec<Endpoint> {
        self.downstream.get(username).cloned().unwrap_or_default()
    }

    pub fn downstream_count(&self, username: &str) -> usize {
        self.downstream.get(username).map(Vec::len).unwrap_or(0)
    }

    // Received posts

    pub fn record(&mut self, username: &str, post: Post) {
        self.received.entry(username.to_string()).or_default().push(post);
    }

    /// Drain the posts received so far, per username
    pub fn take_received(&mut self) -> HashMap<String, Vec<Post>> {
        std::mem::take(&mut self.received)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn endpoint(port: u16) -> Endpoint {
        Endpoint::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    fn upstream(port: u16) -> Upstream {
        Upstream {
            relay: endpoint(port),
            feed: endpoint(port + 1),
        }
    }

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let mut table = SubscriptionTable::new(3);
        table.subscribe("bob", upstream(9000));

        assert!(table.is_subscribed("bob"));
        assert_eq!(table.upstream("bob"), Some(upstream(9000)));
        assert_eq!(table.unsubscribe("bob"), Some(upstream(9000)));
        assert!(!table.is_subscribed("bob"));
    }

    #[test]
    fn test_feed_only_from_upstream() {
        let mut table = SubscriptionTable::new(3);
        table.subscribe("bob", upstream(9000));

        assert!(table.accepts_feed("bob", endpoint(9001)));
        assert!(!table.accepts_feed("bob", endpoint(9000)));
        assert!(!table.accepts_feed("carol", endpoint(9001)));
    }

    #[test]
    fn test_downstream_cap() {
        let mut table = SubscriptionTable::new(2);
        assert!(table.add_downstream("bob", endpoint(1)));
        assert!(table.add_downstream("bob", endpoint(2)));
        assert!(!table.can_serve("bob"));
        assert!(!table.add_downstream("bob", endpoint(3)));

        // Re-registering does not take a slot
        assert!(table.add_downstream("bob", endpoint(1)));
        assert_eq!(table.downstream_count("bob"), 2);
        assert!(table.can_serve("carol"));
    }

    #[test]
    fn test_unsubscribe_keeps_redirects() {
        let mut table = SubscriptionTable::new(3);
        table.subscribe("bob", upstream(9000));
        table.add_downstream("bob", endpoint(7000));

        table.unsubscribe("bob");
        assert_eq!(table.downstream("bob"), vec![endpoint(7000)]);
    }

    #[test]
    fn test_remove_downstream() {
        let mut table = SubscriptionTable::new(3);
        table.add_downstream("bob", endpoint(1));

        assert!(table.remove_downstream("bob", endpoint(1)));
        assert!(!table.remove_downstream("bob", endpoint(1)));
        assert_eq!(table.downstream_count("bob"), 0);
    }

    #[test]
    fn test_take_received_drains() {
        let mut table = SubscriptionTable::new(3);
        table.record("bob", Post::new(1, "bob", "hello"));
        table.record("bob", Post::new(2, "bob", "again"));

        let taken = table.take_received();
        assert_eq!(taken["bob"].len(), 2);
        assert!(table.take_received().is_empty());
    }
}
