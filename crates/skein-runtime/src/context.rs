//! Shared peer context
//!
//! Everything the router, the protocol rounds and the facade work against.
//! Held behind an `Arc`; nothing in it points back at the broker or the
//! facade.

use std::sync::Arc;

use parking_lot::RwLock;

use skein_core::{Endpoint, Host, OverlayConfig, Post, Timeline};
use skein_crypto::{sign_post, sign_timeline, Authenticator, KeyPair};
use skein_overlay::{flood_candidates, PeerState, TimelineStore};
use skein_transport::UdpTransport;
use skein_wire::{Feed, Frame, Message};

use crate::MessageSender;

pub struct PeerContext {
    pub config: OverlayConfig,
    pub state: Arc<RwLock<PeerState>>,
    pub store: Arc<dyn TimelineStore>,
    pub auth: Arc<dyn Authenticator>,
    pub sender: MessageSender,
    /// Feed socket, shared with the broker's receive side
    pub feed: Arc<UdpTransport>,
    keys: RwLock<Option<KeyPair>>,
}

impl PeerContext {
    pub fn new(
        config: OverlayConfig,
        state: PeerState,
        store: Arc<dyn TimelineStore>,
        auth: Arc<dyn Authenticator>,
        sender: MessageSender,
        feed: Arc<UdpTransport>,
    ) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(state)),
            store,
            auth,
            sender,
            feed,
            keys: RwLock::new(None),
        }
    }

    /// Snapshot of our host record
    pub fn me(&self) -> Host {
        self.state.read().me().clone()
    }

    pub fn username(&self) -> String {
        self.state.read().username().to_string()
    }

    // Keys

    pub fn set_keys(&self, keys: Option<KeyPair>) {
        *self.keys.write() = keys;
    }

    pub fn is_logged_in(&self) -> bool {
        self.keys.read().is_some()
    }

    /// Sign our own timeline when logged in. Cached timelines of other
    /// users keep whatever signature their owner gave them.
    pub fn sign_timeline(&self, timeline: &mut Timeline) {
        if timeline.username != self.username() {
            return;
        }
        if let Some(keys) = self.keys.read().as_ref() {
            sign_timeline(timeline, keys);
        }
    }

    pub fn sign_post(&self, post: &mut Post) {
        if post.author != self.username() {
            return;
        }
        if let Some(keys) = self.keys.read().as_ref() {
            sign_post(post, keys);
        }
    }

    /// Forward a lookup frame to up to `max_fanout` neighbors not on its
    /// path. Candidates are tried in random order until enough deliveries
    /// succeed. Returns the number of successful deliveries.
    pub async fn flood(&self, frame: &Frame) -> usize {
        let Some(lookup) = frame.message.lookup() else {
            return 0;
        };

        let candidates = flood_candidates(&self.state.read(), frame.kind(), lookup);

        let mut delivered = 0;
        for neighbor in candidates {
            if delivered >= self.config.max_fanout {
                break;
            }
            if self.sender.send(frame, neighbor.endpoint()).await.is_ok() {
                delivered += 1;
            }
        }

        tracing::debug!(
            kind = %frame.kind(),
            id = %frame.id,
            ttl = frame.ttl,
            delivered,
            "flooded"
        );
        delivered
    }

    /// Send a post to feed endpoints. Feed frames are not acknowledged.
    pub async fn publish(&self, username: &str, post: &Post, targets: &[Endpoint]) {
        if targets.is_empty() {
            return;
        }
        let frame = Frame::new(Message::Feed(Feed {
            username: username.to_string(),
            post: post.clone(),
        }));
        for target in targets {
            if let Err(e) = self.feed.send_to(&frame, target.socket_addr()).await {
                tracing::warn!(%target, "feed publish failed: {}", e);
            }
        }
    }
}
