//! Promise table - correlation of requests with their responses
//!
//! A slot is registered under the request's id before the request leaves.
//! Whichever worker receives the response completes the slot; the issuing
//! task waits on its `Promise` with a timeout. Responses for unknown ids
//! are dropped, responses arriving after the first are kept as late hits
//! until the slot is forgotten.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;

use skein_core::MessageId;
use skein_wire::Message;

struct Slot {
    tx: Option<oneshot::Sender<Message>>,
    late: Vec<Message>,
}

/// Handle of a registered request
#[derive(Debug)]
pub struct Promise {
    id: MessageId,
    rx: oneshot::Receiver<Message>,
}

impl Promise {
    pub fn id(&self) -> MessageId {
        self.id
    }
}

/// What `complete` did with a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// First response, handed to the waiter
    Resolved,
    /// Slot already resolved; kept as a late hit
    Late,
    /// No such slot (timed out, forgotten or never issued)
    Unknown,
}

/// Pending requests keyed by message id
#[derive(Default)]
pub struct PromiseTable {
    slots: Mutex<HashMap<MessageId, Slot>>,
}

impl PromiseTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a slot for `id`. Registering an id twice replaces the
    /// earlier slot.
    pub fn register(&self, id: MessageId) -> Promise {
        let (tx, rx) = oneshot::channel();
        self.slots.lock().insert(
            id,
            Slot {
                tx: Some(tx),
                late: Vec::new(),
            },
        );
        Promise { id, rx }
    }

    pub fn complete(&self, id: MessageId, response: Message) -> Completion {
        let mut slots = self.slots.lock();
        let Some(slot) = slots.get_mut(&id) else {
            return Completion::Unknown;
        };

        match slot.tx.take() {
            Some(tx) => match tx.send(response) {
                Ok(()) => Completion::Resolved,
                // Waiter gave up but has not forgotten the slot yet
                Err(response) => {
                    slot.late.push(response);
                    Completion::Late
                }
            },
            None => {
                slot.late.push(response);
                Completion::Late
            }
        }
    }

    /// Wait for the first response, up to `timeout`. The slot is released
    /// either way; `None` means no response.
    pub async fn wait(&self, promise: Promise, timeout: Duration) -> Option<Message> {
        let id = promise.id;
        let result = tokio::time::timeout(timeout, promise.rx).await;
        self.forget(id);
        match result {
            Ok(Ok(response)) => Some(response),
            _ => None,
        }
    }

    /// Collect every response arriving within `timeout` (fan-in)
    pub async fn collect(&self, promise: Promise, timeout: Duration) -> Vec<Message> {
        let id = promise.id;
        let deadline = Instant::now() + timeout;

        let mut responses = Vec::new();
        if let Ok(Ok(first)) = tokio::time::timeout_at(deadline, promise.rx).await {
            responses.push(first);
            tokio::time::sleep_until(deadline).await;
        }
        responses.extend(self.forget(id));
        responses
    }

    /// Release the slot, returning late hits it accumulated
    pub fn forget(&self, id: MessageId) -> Vec<Message> {
        self.slots
            .lock()
            .remove(&id)
            .map(|slot| slot.late)
            .unwrap_or_default()
    }

    /// Number of registered slots
    pub fn pending(&self) -> usize {
        self.slots.lock().len()
    }
}
