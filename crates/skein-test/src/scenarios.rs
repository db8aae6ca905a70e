//! End-to-end scenarios
//!
//! Every scenario runs real peers over localhost UDP. Protocol rounds are
//! driven by hand unless a scenario is about the timers themselves.

use std::time::Duration;

use skein_core::{OverlayConfig, Post};
use skein_runtime::{AdmissionOutcome, Peer};

use crate::{fast_config, wait_until, TestNet};

/// Collect the subscription posts `peer` receives for `username`, then
/// keep listening for `settle` to catch duplicates
pub async fn drain_posts(peer: &Peer, username: &str, settle: Duration) -> Vec<Post> {
    let mut posts = Vec::new();
    wait_until(Duration::from_secs(2), || {
        posts.extend(peer.take_subscription_posts().remove(username).unwrap_or_default());
        !posts.is_empty()
    })
    .await;
    tokio::time::sleep(settle).await;
    posts.extend(peer.take_subscription_posts().remove(username).unwrap_or_default());
    posts
}
