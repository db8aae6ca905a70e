//! Subscription health probe
//!
//! Each active subscription's relay is sent a SUB_PING. A relay that does
//! not answer loses the subscription; subscribing again is up to the
//! caller.

use std::sync::Arc;

use tokio::task::JoinSet;

use skein_wire::{Frame, Message, SubPing};

use crate::PeerContext;

/// Probe every upstream relay; returns the usernames whose subscription
/// was abandoned.
pub async fn probe_subscriptions(ctx: &Arc<PeerContext>) -> Vec<String> {
    let (me, subscriptions) = {
        let state = ctx.state.read();
        (state.me().endpoint(), state.subscriptions().subscriptions())
    };

    let mut probes = JoinSet::new();
    for (username, upstream) in subscriptions {
        let ctx = Arc::clone(ctx);
        probes.spawn(async move {
            let frame = Frame::new(Message::SubPing(SubPing { sender: me }));
            let reply = ctx.sender.request(frame, upstream.relay).await;
            (username, upstream, reply)
        });
    }

    let mut abandoned = Vec::new();
    while let Some(joined) = probes.join_next().await {
        let Ok((username, upstream, reply)) = joined else {
            continue;
        };
        if matches!(reply, Some(Message::SubPong)) {
            continue;
        }

        let mut state = ctx.state.write();
        // Only drop the subscription that was probed, not a newer one
        if state.subscriptions().upstream(&username) == Some(upstream) {
            state.subscriptions_mut().unsubscribe(&username);
            tracing::info!(%username, relay = %upstream.relay, "relay silent, subscription abandoned");
            abandoned.push(username);
        }
    }
    abandoned
}
