//! Message sender
//!
//! Two layers of confirmation: every send waits for the transport
//! acknowledgement (retried up to the configured budget), and requests
//! additionally wait for the correlated protocol response through the
//! promise table.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use skein_core::{Endpoint, OverlayConfig, SkeinError, SkeinResult};
use skein_transport::{deliver, DeliveryPolicy};
use skein_wire::{Frame, Message, MessageKind};

use crate::PromiseTable;

/// Test and diagnostics switches of the sender
#[derive(Debug, Clone, Default)]
pub struct SenderHooks {
    /// Kinds whose sends are not logged
    pub quiet: HashSet<MessageKind>,
    /// Kinds never transmitted; reported as failed deliveries
    pub dropped: HashSet<MessageKind>,
    /// Pause after every transmission
    pub delay: Option<Duration>,
}

impl SenderHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quiet(mut self, kind: MessageKind) -> Self {
        self.quiet.insert(kind);
        self
    }

    pub fn drop_kind(mut self, kind: MessageKind) -> Self {
        self.dropped.insert(kind);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Outbound side of a peer
pub struct MessageSender {
    policy: DeliveryPolicy,
    receive_timeout: Duration,
    hooks: SenderHooks,
    promises: Arc<PromiseTable>,
}

impl MessageSender {
    pub fn new(config: &OverlayConfig, hooks: SenderHooks, promises: Arc<PromiseTable>) -> Self {
        Self {
            policy: DeliveryPolicy::new(config.ack_timeout, config.max_retries),
            receive_timeout: config.receive_timeout,
            hooks,
            promises,
        }
    }

    pub fn promises(&self) -> &PromiseTable {
        &self.promises
    }

    pub fn receive_timeout(&self) -> Duration {
        self.receive_timeout
    }

    /// Deliver `frame` to `dest`, waiting for the acknowledgement
    pub async fn send(&self, frame: &Frame, dest: Endpoint) -> SkeinResult<()> {
        let kind = frame.kind();
        if self.hooks.dropped.contains(&kind) {
            tracing::debug!(%dest, %kind, "dropped by sender hooks");
            return Err(SkeinError::DeliveryFailed(dest));
        }

        let result = deliver(frame, dest, self.policy).await;
        if let Some(delay) = self.hooks.delay {
            tokio::time::sleep(delay).await;
        }

        match &result {
            Ok(attempts) if !self.hooks.quiet.contains(&kind) => {
                tracing::debug!(%dest, %kind, id = %frame.id, attempts, "sent");
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(%dest, %kind, id = %frame.id, "send failed: {}", e),
        }
        result.map(|_| ())
    }

    /// Send a request and wait for its response within the receive
    /// timeout. `None` when delivery fails or nothing answers in time.
    pub async fn request(&self, frame: Frame, dest: Endpoint) -> Option<Message> {
        let promise = self.promises.register(frame.id);
        if self.send(&frame, dest).await.is_err() {
            self.promises.forget(frame.id);
            return None;
        }
        self.promises.wait(promise, self.receive_timeout).await
    }
}
