//! Broker - coordinator task plus worker pool
//!
//! The coordinator owns both sockets. Request-socket frames are
//! acknowledged to their source and handed to the workers; feed-socket
//! frames are handled inline, in arrival order. Workers share one queue
//! and run the router.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use skein_core::{Endpoint, SkeinResult};
use skein_transport::UdpTransport;
use skein_wire::{Frame, Message};

use crate::Router;

/// Frames queued per worker before the coordinator starts waiting
const QUEUE_DEPTH_PER_WORKER: usize = 64;

/// Handle to a running broker
pub struct Broker {
    token: CancellationToken,
    coordinator: JoinHandle<()>,
}

impl Broker {
    /// Start the coordinator and `workers` worker tasks. The broker stops
    /// when `token` is cancelled or `shutdown` is called.
    pub fn spawn(
        router: Arc<Router>,
        requests: Arc<UdpTransport>,
        feed: Arc<UdpTransport>,
        workers: usize,
        poll_timeout: Duration,
        token: CancellationToken,
    ) -> Self {
        let workers = workers.max(1);
        let (work_tx, work_rx) = mpsc::channel(workers * QUEUE_DEPTH_PER_WORKER);
        let work_rx = Arc::new(Mutex::new(work_rx));

        let pool: Vec<JoinHandle<()>> = (0..workers)
            .map(|n| tokio::spawn(worker(n, Arc::clone(&router), Arc::clone(&work_rx))))
            .collect();

        let coordinator = tokio::spawn(coordinate(
            router,
            requests,
            feed,
            work_tx,
            pool,
            poll_timeout,
            token.clone(),
        ));

        Broker { token, coordinator }
    }

    pub fn is_running(&self) -> bool {
        !self.coordinator.is_finished()
    }

    /// Stop the coordinator and wait until every worker has drained
    pub async fn shutdown(self) -> SkeinResult<()> {
        self.token.cancel();
        if let Err(e) = self.coordinator.await {
            tracing::warn!("broker coordinator ended abnormally: {}", e);
        }
        Ok(())
    }
}

async fn coordinate(
    router: Arc<Router>,
    requests: Arc<UdpTransport>,
    feed: Arc<UdpTransport>,
    work_tx: mpsc::Sender<Frame>,
    pool: Vec<JoinHandle<()>>,
    poll_timeout: Duration,
    token: CancellationToken,
) {
    tracing::debug!(
        requests = %requests.local_addr(),
        feed = %feed.local_addr(),
        workers = pool.len(),
        "broker started"
    );

    loop {
        tokio::select! {
            _ = token.cancelled() => break,

            received = requests.recv_from() => {
                let (frame, from) = match received {
                    Ok(received) => received,
                    Err(e) => {
                        tracing::warn!("dropping request datagram: {}", e);
                        continue;
                    }
                };
                if matches!(frame.message, Message::Ack) {
                    continue;
                }
                if let Err(e) = requests.send_ack(frame.id, from).await {
                    tracing::warn!(%from, id = %frame.id, "ack failed: {}", e);
                }
                match work_tx.send_timeout(frame, poll_timeout).await {
                    Ok(()) => {}
                    Err(SendTimeoutError::Timeout(frame)) => {
                        tracing::warn!(id = %frame.id, kind = %frame.kind(), "workers saturated, frame dropped");
                    }
                    Err(SendTimeoutError::Closed(_)) => break,
                }
            }

            received = feed.recv_from() => {
                match received {
                    Ok((Frame { message: Message::Feed(item), .. }, from)) => {
                        router.handle_feed(item, Endpoint::from(from)).await;
                    }
                    Ok((frame, from)) => {
                        tracing::debug!(%from, kind = %frame.kind(), "non-feed frame on feed socket");
                    }
                    Err(e) => tracing::warn!("dropping feed datagram: {}", e),
                }
            }
        }
    }

    drop(work_tx);
    for handle in pool {
        let _ = handle.await;
    }
    tracing::debug!("broker stopped");
}

async fn worker(n: usize, router: Arc<Router>, queue: Arc<Mutex<mpsc::Receiver<Frame>>>) {
    loop {
        let next = queue.lock().await.recv().await;
        let Some(frame) = next else {
            break;
        };
        tracing::trace!(worker = n, id = %frame.id, kind = %frame.kind(), "dispatch");
        router.handle(frame).await;
    }
}
