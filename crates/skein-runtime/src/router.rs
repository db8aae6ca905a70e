//! Router - protocol handling of inbound messages
//!
//! One exhaustive match over the message union. Requests are answered
//! through the sender, responses complete promises, lookups are satisfied
//! locally or flooded on.

use std::sync::Arc;

use skein_core::{Endpoint, Host, MessageId, Neighbor};
use skein_crypto::{verify_post_with, verify_timeline_with};
use skein_overlay::PeerState;
use skein_wire::{
    AdmitRequest, AdmitResponse, Feed, Frame, Lookup, Message, Ping, Pong, QueryHit, SearchHit,
    SubHit, SubPing,
};

use crate::{Completion, PeerContext};

/// Admission policy, applied identically by requester and receiver:
/// take a free slot, else replace the lowest ranked neighbor whose
/// capacity does not exceed the candidate's, else refuse.
pub fn admit(state: &mut PeerState, candidate: Host) -> bool {
    let endpoint = candidate.endpoint();
    if state.has_neighbor(endpoint) {
        return true;
    }
    if !state.is_full() {
        return state.add_neighbor(Neighbor::new(candidate));
    }
    match state.worst_neighbor_at_or_below(candidate.capacity) {
        Some(victim) => state.replace_neighbor(victim.endpoint(), Neighbor::new(candidate)),
        None => false,
    }
}

/// Inbound protocol logic of a peer
pub struct Router {
    ctx: Arc<PeerContext>,
}

impl Router {
    pub fn new(ctx: Arc<PeerContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Arc<PeerContext> {
        &self.ctx
    }

    /// Handle a frame received on the request socket
    pub async fn handle(&self, frame: Frame) {
        let id = frame.id;
        match frame.message {
            Message::Ping(ping) => self.on_ping(id, ping).await,
            Message::AdmitRequest(request) => self.on_admit_request(id, request).await,
            Message::Query(ref lookup) => self.on_query(&frame, lookup).await,
            Message::Search(ref lookup) => self.on_search(&frame, lookup).await,
            Message::Sub(ref lookup) => self.on_sub(&frame, lookup).await,
            Message::SubPing(ping) => self.on_sub_ping(id, ping).await,

            Message::AdmitResponse(response) => {
                self.ctx
                    .state
                    .write()
                    .update_host_cache(response.host_cache.iter().cloned());
                self.resolve(id, Message::AdmitResponse(response));
            }
            Message::QueryHit(mut hit) => {
                if hit.timeline.has_signature() {
                    verify_timeline_with(self.ctx.auth.as_ref(), &mut hit.timeline);
                } else {
                    hit.timeline.verified = false;
                }
                self.resolve(id, Message::QueryHit(hit));
            }
            Message::SearchHit(mut hit) => {
                for post in &mut hit.posts {
                    if post.has_signature() {
                        verify_post_with(self.ctx.auth.as_ref(), post);
                    } else {
                        post.verified = false;
                    }
                }
                self.resolve(id, Message::SearchHit(hit));
            }
            message @ (Message::Pong(_) | Message::SubHit(_) | Message::SubPong) => {
                self.resolve(id, message);
            }

            Message::Feed(_) | Message::Ack => {
                tracing::debug!(%id, kind = %frame.kind(), "ignored on request socket");
            }
        }
    }

    fn resolve(&self, id: MessageId, response: Message) {
        let kind = response.kind();
        match self.ctx.sender.promises().complete(id, response) {
            Completion::Resolved => tracing::trace!(%id, %kind, "promise resolved"),
            Completion::Late => tracing::trace!(%id, %kind, "late response kept"),
            Completion::Unknown => tracing::debug!(%id, %kind, "response for unknown request dropped"),
        }
    }

    async fn on_ping(&self, id: MessageId, ping: Ping) {
        let pong = {
            let mut state = self.ctx.state.write();
            state.add_host(ping.sender.clone());
            Pong {
                responder: state.advertisement(),
                host_cache: state.host_cache(),
                is_neighbor: state.has_neighbor(ping.sender.endpoint()),
            }
        };
        let _ = self
            .ctx
            .sender
            .send(&Frame::reply(id, Message::Pong(pong)), ping.sender.endpoint())
            .await;
    }

    async fn on_admit_request(&self, id: MessageId, request: AdmitRequest) {
        let response = {
            let mut state = self.ctx.state.write();
            let accepted = admit(&mut state, request.sender.clone());
            AdmitResponse {
                accepted,
                host_cache: state.host_cache(),
            }
        };
        tracing::debug!(
            candidate = %request.sender,
            accepted = response.accepted,
            "admission request"
        );
        let _ = self
            .ctx
            .sender
            .send(
                &Frame::reply(id, Message::AdmitResponse(response)),
                request.sender.endpoint(),
            )
            .await;
    }

    /// Loop guard shared by every lookup kind
    fn already_visited(&self, lookup: &Lookup) -> bool {
        let me = self.ctx.state.read().me().endpoint();
        lookup.is_in_path(me)
    }

    /// Forward a lookup one hop further, if its ttl allows
    async fn propagate(&self, frame: &Frame) {
        let me = self.ctx.state.read().me().endpoint();
        match frame.propagated(me) {
            Some(next) => {
                self.ctx.flood(&next).await;
            }
            None => tracing::debug!(id = %frame.id, kind = %frame.kind(), "ttl exhausted"),
        }
    }

    async fn on_query(&self, frame: &Frame, lookup: &Lookup) {
        if self.already_visited(lookup) {
            return;
        }

        if let Some(mut timeline) = self.ctx.store.get_timeline(&lookup.target) {
            self.ctx.sign_timeline(&mut timeline);
            let hit = Frame::reply(frame.id, Message::QueryHit(QueryHit { timeline }));
            let _ = self
                .ctx
                .sender
                .send(&hit, lookup.original_sender.endpoint())
                .await;
            return;
        }

        self.propagate(frame).await;
    }

    async fn on_search(&self, frame: &Frame, lookup: &Lookup) {
        if self.already_visited(lookup) {
            return;
        }

        let mut posts = self.ctx.store.search_posts(&lookup.target);
        if !posts.is_empty() {
            for post in &mut posts {
                self.ctx.sign_post(post);
            }
            let hit = Frame::reply(frame.id, Message::SearchHit(SearchHit { posts }));
            let _ = self
                .ctx
                .sender
                .send(&hit, lookup.original_sender.endpoint())
                .await;
            return;
        }

        self.propagate(frame).await;
    }

    async fn on_sub(&self, frame: &Frame, lookup: &Lookup) {
        if self.already_visited(lookup) {
            return;
        }

        let username = lookup.target.as_str();
        let requester = lookup.original_sender.feed_endpoint();

        // Owner serves subscribers, an existing subscriber serves redirects
        let hit = {
            let mut state = self.ctx.state.write();
            let me = state.me().clone();
            let serves = me.username == username || state.subscriptions().is_subscribed(username);
            if serves && state.subscriptions_mut().add_downstream(username, requester) {
                Some(SubHit {
                    relay: me.endpoint(),
                    feed: me.feed_endpoint(),
                })
            } else {
                None
            }
        };

        let Some(hit) = hit else {
            self.propagate(frame).await;
            return;
        };

        tracing::info!(%username, downstream = %requester, "subscription accepted");
        let reply = Frame::reply(frame.id, Message::SubHit(hit));
        if self
            .ctx
            .sender
            .send(&reply, lookup.original_sender.endpoint())
            .await
            .is_err()
        {
            self.ctx
                .state
                .write()
                .subscriptions_mut()
                .remove_downstream(username, requester);
        }
    }

    async fn on_sub_ping(&self, id: MessageId, ping: SubPing) {
        let _ = self
            .ctx
            .sender
            .send(&Frame::reply(id, Message::SubPong), ping.sender)
            .await;
    }

    /// Handle a post received on the feed socket: record it and relay it
    /// to the redirects registered for its username.
    pub async fn handle_feed(&self, mut feed: Feed, from: Endpoint) -> bool {
        let targets = {
            let state = self.ctx.state.read();
            if !state.subscriptions().accepts_feed(&feed.username, from) {
                tracing::debug!(username = %feed.username, %from, "feed not from upstream");
                return false;
            }
            state.subscriptions().downstream(&feed.username)
        };

        if feed.post.has_signature() {
            verify_post_with(self.ctx.auth.as_ref(), &mut feed.post);
        } else {
            feed.post.verified = false;
        }

        self.ctx
            .state
            .write()
            .subscriptions_mut()
            .record(&feed.username, feed.post.clone());

        self.ctx.publish(&feed.username, &feed.post, &targets).await;
        tracing::debug!(username = %feed.username, relayed = targets.len(), "feed received");
        true
    }
}
