//! Flood routing
//!
//! Which neighbors a lookup is forwarded to. Plain peers flood blindly;
//! super-peers narrow timeline lookups (QUERY, SUB) to neighbors whose
//! filter might hold the wanted username. Term searches cannot be matched
//! against a username filter and are always flooded blindly.

use rand::seq::SliceRandom;

use skein_core::Neighbor;
use skein_wire::{Lookup, MessageKind};

use crate::PeerState;

/// How a peer picks forwarding candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routing {
    /// Any neighbor not on the path
    Blind,
    /// Only neighbors whose filter might hold the target timeline
    Filtered,
}

impl Routing {
    pub fn for_lookup(kind: MessageKind, super_peer: bool) -> Self {
        match kind {
            MessageKind::Query | MessageKind::Sub if super_peer => Routing::Filtered,
            _ => Routing::Blind,
        }
    }
}

/// Forwarding candidates for a `kind` lookup, in random order
///
/// Neighbors already on the path are excluded. The caller forwards to
/// candidates in order until `max_fanout` deliveries succeed.
pub fn flood_candidates(state: &PeerState, kind: MessageKind, lookup: &Lookup) -> Vec<Neighbor> {
    let pool = match Routing::for_lookup(kind, state.is_super_peer()) {
        Routing::Blind => state.neighbors(),
        Routing::Filtered => state.neighbors_with_timeline(&lookup.target),
    };
    let mut candidates: Vec<Neighbor> = pool
        .into_iter()
        .filter(|n| !lookup.is_in_path(n.endpoint()))
        .collect();

    candidates.shuffle(&mut rand::thread_rng());
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use skein_core::{Endpoint, Host, OverlayConfig, TimelineFilter};
    use std::net::{IpAddr, Ipv4Addr};

    fn host(name: &str, port: u16) -> Host {
        Host::new(name, Endpoint::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port), 10)
    }

    fn neighbor_holding(name: &str, port: u16, timelines: &[&str]) -> Neighbor {
        let mut filter = TimelineFilter::default();
        for t in timelines {
            filter.insert(t);
        }
        Neighbor::with_filter(host(name, port), filter)
    }

    fn state_with(super_peer_min_degree: u32, neighbors: Vec<Neighbor>) -> PeerState {
        let config = OverlayConfig {
            super_peer_min_degree,
            ..OverlayConfig::default()
        };
        let mut state = PeerState::new(host("me", 8999), &config);
        for n in neighbors {
            state.add_neighbor(n);
        }
        state
    }

    fn names(candidates: &[Neighbor]) -> Vec<&str> {
        let mut names: Vec<&str> = candidates.iter().map(|n| n.host.username.as_str()).collect();
        names.sort();
        names
    }

    #[test]
    fn test_routing_choice() {
        assert_eq!(Routing::for_lookup(MessageKind::Query, false), Routing::Blind);
        assert_eq!(Routing::for_lookup(MessageKind::Query, true), Routing::Filtered);
        assert_eq!(Routing::for_lookup(MessageKind::Sub, true), Routing::Filtered);
        assert_eq!(Routing::for_lookup(MessageKind::Search, true), Routing::Blind);
    }

    #[test]
    fn test_path_members_excluded() {
        let origin = host("origin", 9000);
        let state = state_with(
            u32::MAX,
            vec![
                neighbor_holding("origin", 9000, &[]),
                neighbor_holding("a", 9001, &[]),
                neighbor_holding("b", 9002, &[]),
            ],
        );
        let lookup = Lookup::new("zoe", origin).via(host("a", 9001).endpoint());

        let candidates = flood_candidates(&state, MessageKind::Query, &lookup);
        assert_eq!(names(&candidates), ["b"]);
    }

    #[test]
    fn test_super_peer_filters_timeline_lookups() {
        let state = state_with(
            1,
            vec![
                neighbor_holding("a", 9001, &["zoe"]),
                neighbor_holding("b", 9002, &["yann"]),
            ],
        );
        assert!(state.is_super_peer());
        let lookup = Lookup::new("zoe", host("origin", 9000));

        assert_eq!(names(&flood_candidates(&state, MessageKind::Query, &lookup)), ["a"]);
        assert_eq!(names(&flood_candidates(&state, MessageKind::Sub, &lookup)), ["a"]);
        assert_eq!(
            names(&flood_candidates(&state, MessageKind::Search, &lookup)),
            ["a", "b"]
        );
    }

    #[test]
    fn test_plain_peer_floods_blindly() {
        let state = state_with(
            u32::MAX,
            vec![
                neighbor_holding("a", 9001, &["zoe"]),
                neighbor_holding("b", 9002, &["yann"]),
            ],
        );
        let lookup = Lookup::new("zoe", host("origin", 9000));
        assert_eq!(names(&flood_candidates(&state, MessageKind::Query, &lookup)), ["a", "b"]);
    }
}
