//! Neighbor admission round
//!
//! Picks the best cached host that is not yet a neighbor and asks it to
//! become one. Local state changes only after the candidate explicitly
//! accepts; timeouts and rejections leave the neighbor set untouched.

use skein_core::{Endpoint, Host, Neighbor};
use skein_wire::{AdmitRequest, Frame, Message};

use crate::PeerContext;

/// Outcome of one admission round
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionOutcome {
    /// Every cached host is already a neighbor
    NoCandidate,
    /// Full, and no neighbor ranks low enough to make room
    NoRoom { candidate: Endpoint },
    /// Candidate did not answer
    NoResponse { candidate: Endpoint },
    Rejected { candidate: Endpoint },
    Admitted {
        candidate: Endpoint,
        replaced: Option<Endpoint>,
    },
}

pub async fn admission_round(ctx: &PeerContext) -> AdmissionOutcome {
    let (me, candidate, victim) = {
        let state = ctx.state.read();
        let Some(candidate) = state.best_host_not_neighbor() else {
            return AdmissionOutcome::NoCandidate;
        };
        let victim = if state.is_full() {
            match state.worst_neighbor_at_or_below(candidate.capacity) {
                Some(victim) => Some(victim.endpoint()),
                None => {
                    return AdmissionOutcome::NoRoom {
                        candidate: candidate.endpoint(),
                    }
                }
            }
        } else {
            None
        };
        (state.me().clone(), candidate, victim)
    };

    let endpoint = candidate.endpoint();
    let frame = Frame::new(Message::AdmitRequest(AdmitRequest { sender: me }));
    match ctx.sender.request(frame, endpoint).await {
        Some(Message::AdmitResponse(response)) if response.accepted => {
            commit(ctx, candidate, victim);
            AdmissionOutcome::Admitted {
                candidate: endpoint,
                replaced: victim,
            }
        }
        Some(Message::AdmitResponse(_)) => {
            tracing::debug!(candidate = %endpoint, "admission rejected");
            AdmissionOutcome::Rejected { candidate: endpoint }
        }
        Some(other) => {
            tracing::warn!(candidate = %endpoint, kind = %other.kind(), "unexpected admission reply");
            AdmissionOutcome::NoResponse { candidate: endpoint }
        }
        None => AdmissionOutcome::NoResponse { candidate: endpoint },
    }
}

fn commit(ctx: &PeerContext, candidate: Host, victim: Option<Endpoint>) {
    let mut state = ctx.state.write();
    let endpoint = candidate.endpoint();
    let committed = match victim {
        Some(victim) if state.has_neighbor(victim) => {
            state.replace_neighbor(victim, Neighbor::new(candidate))
        }
        _ => state.add_neighbor(Neighbor::new(candidate)),
    };
    if !committed {
        // Our set changed while the request was in flight; gossip will
        // reconcile the asymmetric link
        tracing::debug!(candidate = %endpoint, "accepted admission could not be committed");
    }
}
