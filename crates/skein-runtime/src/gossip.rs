//! Neighbor gossip round
//!
//! Probes every neighbor with a PING. Silent neighbors are evicted from
//! both the neighbor set and the host cache; neighbors that no longer
//! count us as theirs are dropped from the neighbor set only; confirmed
//! neighbors refresh their metadata and contribute their cache and
//! timeline filter.

use std::sync::Arc;

use tokio::task::JoinSet;

use skein_core::{Endpoint, Neighbor};
use skein_wire::{Frame, Message, Ping, Pong};

use crate::PeerContext;

/// Outcome of one gossip round
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GossipReport {
    /// Answered and still count us as a neighbor
    pub confirmed: Vec<Endpoint>,
    /// Answered but no longer count us as a neighbor
    pub dropped: Vec<Endpoint>,
    /// Did not answer within the retry budget
    pub evicted: Vec<Endpoint>,
}

impl GossipReport {
    pub fn probed(&self) -> usize {
        self.confirmed.len() + self.dropped.len() + self.evicted.len()
    }
}

/// Run one gossip round. Probes are issued concurrently; each neighbor's
/// probe-then-await stays sequential.
pub async fn gossip_round(ctx: &Arc<PeerContext>) -> GossipReport {
    let usernames = ctx.store.usernames();
    let (me, neighbors) = {
        let mut state = ctx.state.write();
        state.reset_timeline_filter(usernames.iter().map(String::as_str));
        (state.me().clone(), state.neighbors())
    };

    let mut probes = JoinSet::new();
    for neighbor in neighbors {
        let ctx = Arc::clone(ctx);
        let sender = me.clone();
        probes.spawn(async move {
            let frame = Frame::new(Message::Ping(Ping { sender }));
            let reply = ctx.sender.request(frame, neighbor.endpoint()).await;
            (neighbor, reply)
        });
    }

    let mut report = GossipReport::default();
    while let Some(joined) = probes.join_next().await {
        let Ok((neighbor, reply)) = joined else {
            continue;
        };
        let endpoint = neighbor.endpoint();

        match reply {
            Some(Message::Pong(pong)) if pong.is_neighbor => {
                confirm(ctx, &neighbor, pong);
                report.confirmed.push(endpoint);
            }
            Some(Message::Pong(_)) => {
                ctx.state.write().remove_neighbor(endpoint);
                report.dropped.push(endpoint);
            }
            Some(other) => {
                tracing::warn!(%endpoint, kind = %other.kind(), "unexpected reply to ping");
            }
            None => {
                let mut state = ctx.state.write();
                state.remove_neighbor(endpoint);
                state.remove_host(endpoint);
                report.evicted.push(endpoint);
            }
        }
    }

    if !report.dropped.is_empty() || !report.evicted.is_empty() {
        tracing::info!(
            confirmed = report.confirmed.len(),
            dropped = report.dropped.len(),
            evicted = report.evicted.len(),
            "gossip round"
        );
    }
    report
}

fn confirm(ctx: &PeerContext, neighbor: &Neighbor, pong: Pong) {
    let mut state = ctx.state.write();
    state.update_host_cache(pong.host_cache);

    // Identity stays ours; metadata and filter come from the responder
    let mut host = pong.responder.host;
    if host.endpoint() != neighbor.endpoint() {
        host = neighbor.host.clone();
    }
    let refreshed = Neighbor::with_filter(host, pong.responder.timelines);
    state.merge_timeline_filter(&refreshed.timelines);
    state.update_neighbor(refreshed);
}
