//! Peer - the facade callers drive
//!
//! A `Peer` owns the broker and the maintenance timers and exposes the
//! user-level operations: timeline lookups, search, subscriptions, posts
//! and authentication.

use std::collections::HashMap;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use skein_core::{
    Endpoint, Host, Neighbor, OverlayConfig, Post, SkeinError, SkeinResult, Timeline,
};
use skein_crypto::{Authenticator, LocalAuthority};
use skein_overlay::{MemoryStore, PeerState, TimelineStore, TopologyObserver, Upstream};
use skein_transport::UdpTransport;
use skein_wire::{Frame, Lookup, Message};

use crate::{
    admission_round, gossip_round, probe_subscriptions, AdmissionOutcome, Broker, GossipReport,
    MessageSender, PeerContext, PromiseTable, Router, SenderHooks,
};

/// Builder for a [`Peer`]
pub struct PeerBuilder {
    username: String,
    capacity: u32,
    address: IpAddr,
    port: u16,
    feed_port: u16,
    config: OverlayConfig,
    store: Option<Arc<dyn TimelineStore>>,
    auth: Option<Arc<dyn Authenticator>>,
    hooks: SenderHooks,
}

impl PeerBuilder {
    pub fn new(username: impl Into<String>, capacity: u32) -> Self {
        Self {
            username: username.into(),
            capacity,
            address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            feed_port: 0,
            config: OverlayConfig::default(),
            store: None,
            auth: None,
            hooks: SenderHooks::default(),
        }
    }

    /// Address to bind and advertise
    pub fn address(mut self, address: IpAddr) -> Self {
        self.address = address;
        self
    }

    /// Request socket port; 0 picks an ephemeral port
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn feed_port(mut self, port: u16) -> Self {
        self.feed_port = port;
        self
    }

    pub fn config(mut self, config: OverlayConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(mut self, store: Arc<dyn TimelineStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn authenticator(mut self, auth: Arc<dyn Authenticator>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn hooks(mut self, hooks: SenderHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Bind both sockets and start the broker
    pub async fn bind(self) -> SkeinResult<Peer> {
        self.config.validate()?;

        let requests = Arc::new(UdpTransport::bind(SocketAddr::new(self.address, self.port)).await?);
        let feed = Arc::new(UdpTransport::bind(SocketAddr::new(self.address, self.feed_port)).await?);

        let me = Host::new(
            self.username.as_str(),
            Endpoint::new(self.address, requests.local_addr().port()),
            self.capacity,
        )
        .with_feed_port(feed.local_addr().port());

        let store: Arc<dyn TimelineStore> = match self.store {
            Some(store) => store,
            None => Arc::new(MemoryStore::for_owner(&self.username)),
        };
        if !store.has_timeline(&self.username) {
            store.put_timeline(Timeline::new(self.username.as_str()));
        }
        let auth: Arc<dyn Authenticator> = match self.auth {
            Some(auth) => auth,
            None => Arc::new(LocalAuthority::new()),
        };

        let sender = MessageSender::new(&self.config, self.hooks, Arc::new(PromiseTable::new()));
        let ctx = Arc::new(PeerContext::new(
            self.config.clone(),
            PeerState::new(me.clone(), &self.config),
            store,
            auth,
            sender,
            Arc::clone(&feed),
        ));

        let token = CancellationToken::new();
        let router = Arc::new(Router::new(Arc::clone(&ctx)));
        let broker = Broker::spawn(
            router,
            requests,
            feed,
            self.config.workers,
            self.config.poll_timeout,
            token.child_token(),
        );

        tracing::info!(
            username = %me.username,
            endpoint = %me.endpoint(),
            feed = %me.feed_endpoint(),
            capacity = me.capacity,
            "peer bound"
        );

        Ok(Peer {
            ctx,
            broker,
            token,
            maintenance: Vec::new(),
        })
    }
}

/// A running overlay participant
pub struct Peer {
    ctx: Arc<PeerContext>,
    broker: Broker,
    token: CancellationToken,
    maintenance: Vec<JoinHandle<()>>,
}

impl Peer {
    pub fn builder(username: impl Into<String>, capacity: u32) -> PeerBuilder {
        PeerBuilder::new(username, capacity)
    }

    pub fn context(&self) -> &Arc<PeerContext> {
        &self.ctx
    }

    // ===================================================================
    // Lifecycle
    // ===================================================================

    /// Start the gossip, admission and subscription probe timers. Each
    /// runs immediately and then with a fixed delay between rounds.
    pub fn start_maintenance(&mut self) {
        if !self.maintenance.is_empty() {
            return;
        }
        let config = &self.ctx.config;
        let timers = [
            self.spawn_timer("gossip", config.ping_interval, |ctx| async move {
                gossip_round(&ctx).await;
            }),
            self.spawn_timer("admission", config.admission_interval, |ctx| async move {
                admission_round(&ctx).await;
            }),
            self.spawn_timer(
                "subscription-probe",
                config.subscription_probe_interval,
                |ctx| async move {
                    probe_subscriptions(&ctx).await;
                },
            ),
        ];
        self.maintenance.extend(timers);
    }

    fn spawn_timer<F, Fut>(&self, name: &'static str, interval: Duration, round: F) -> JoinHandle<()>
    where
        F: Fn(Arc<PeerContext>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let ctx = Arc::clone(&self.ctx);
        let token = self.token.clone();
        let span = tracing::info_span!("peer", username = %ctx.username(), timer = name);

        tokio::spawn(
            async move {
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = round(Arc::clone(&ctx)) => {}
                    }
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = tokio::time::sleep(interval) => {}
                    }
                }
                tracing::debug!("timer stopped");
            }
            .instrument(span),
        )
    }

    /// Cancel the timers, stop the broker and join its workers. Pending
    /// requests are abandoned.
    pub async fn shutdown(self) -> SkeinResult<()> {
        self.token.cancel();
        for handle in self.maintenance {
            let _ = handle.await;
        }
        self.broker.shutdown().await?;
        tracing::info!(username = %self.ctx.username(), "peer stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.broker.is_running()
    }

    // ===================================================================
    // Topology
    // ===================================================================

    /// Add a known host as a neighbor without a handshake
    pub fn join(&self, host: Host) -> bool {
        self.ctx.state.write().add_neighbor(Neighbor::new(host))
    }

    /// Make a host known to the cache only; admission may pick it later
    pub fn introduce(&self, host: Host) -> bool {
        self.ctx.state.write().add_host(host)
    }

    pub async fn gossip_round(&self) -> GossipReport {
        gossip_round(&self.ctx).await
    }

    pub async fn admission_round(&self) -> AdmissionOutcome {
        admission_round(&self.ctx).await
    }

    /// Probe upstream relays; returns abandoned subscriptions
    pub async fn probe_subscriptions(&self) -> Vec<String> {
        probe_subscriptions(&self.ctx).await
    }

    // ===================================================================
    // Lookups
    // ===================================================================

    /// Find `username`'s timeline. Our own is served locally; a found
    /// remote timeline is cached in the store.
    pub async fn request_timeline(&self, username: &str) -> Option<Timeline> {
        if username == self.ctx.username() {
            return self.ctx.store.get_timeline(username);
        }

        let frame = self.lookup_frame(username, Message::Query)?;
        match self.flood_and_wait(frame).await {
            Some(Message::QueryHit(hit)) => {
                self.ctx.store.put_timeline(hit.timeline.clone());
                Some(hit.timeline)
            }
            _ => None,
        }
    }

    /// Posts matching `term` from every peer that answers before the
    /// receive timeout
    pub async fn search(&self, term: &str) -> Vec<Post> {
        let Some(frame) = self.lookup_frame(term, Message::Search) else {
            return Vec::new();
        };

        let promises = self.ctx.sender.promises();
        let promise = promises.register(frame.id);
        if self.ctx.flood(&frame).await == 0 {
            promises.forget(frame.id);
            return Vec::new();
        }

        promises
            .collect(promise, self.ctx.sender.receive_timeout())
            .await
            .into_iter()
            .filter_map(|response| match response {
                Message::SearchHit(hit) => Some(hit.posts),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Build a flooded lookup; `None` without neighbors, so no network
    /// call is attempted
    fn lookup_frame(&self, target: &str, kind: fn(Lookup) -> Message) -> Option<Frame> {
        let state = self.ctx.state.read();
        if state.neighbor_count() == 0 {
            return None;
        }
        let lookup = Lookup::new(target, state.me().clone());
        Some(Frame::new(kind(lookup)).with_ttl(self.ctx.config.flood_ttl))
    }

    async fn flood_and_wait(&self, frame: Frame) -> Option<Message> {
        let promises = self.ctx.sender.promises();
        let promise = promises.register(frame.id);
        if self.ctx.flood(&frame).await == 0 {
            promises.forget(frame.id);
            return None;
        }
        promises.wait(promise, self.ctx.sender.receive_timeout()).await
    }

    // ===================================================================
    // Subscriptions
    // ===================================================================

    /// Subscribe to `username` through the first peer that answers, the
    /// owner or an existing subscriber acting as relay
    pub async fn subscribe(&self, username: &str) -> bool {
        if username == self.ctx.username() {
            return false;
        }
        if self.is_subscribed(username) {
            return true;
        }

        let Some(frame) = self.lookup_frame(username, Message::Sub) else {
            return false;
        };
        match self.flood_and_wait(frame).await {
            Some(Message::SubHit(hit)) => {
                self.ctx.state.write().subscriptions_mut().subscribe(
                    username,
                    Upstream {
                        relay: hit.relay,
                        feed: hit.feed,
                    },
                );
                tracing::info!(%username, relay = %hit.relay, "subscribed");
                true
            }
            _ => {
                tracing::info!(%username, "subscription not found");
                false
            }
        }
    }

    /// Drop the upstream subscription. Peers we relay `username` to stay
    /// registered.
    pub fn unsubscribe(&self, username: &str) -> bool {
        self.ctx
            .state
            .write()
            .subscriptions_mut()
            .unsubscribe(username)
            .is_some()
    }

    pub fn is_subscribed(&self, username: &str) -> bool {
        self.ctx.state.read().subscriptions().is_subscribed(username)
    }

    /// Drain the posts received through subscriptions
    pub fn take_subscription_posts(&self) -> HashMap<String, Vec<Post>> {
        self.ctx.state.write().subscriptions_mut().take_received()
    }

    // ===================================================================
    // Own timeline
    // ===================================================================

    pub fn timeline(&self) -> Option<Timeline> {
        self.ctx.store.get_timeline(&self.ctx.username())
    }

    /// Append a post to our timeline and publish it to our subscribers
    pub async fn add_post(&self, content: &str) -> Post {
        let username = self.ctx.username();
        let mut added = None;
        self.ctx
            .store
            .update_timeline(&username, &mut |timeline| added = Some(timeline.add_post(content)));
        let mut post = added.unwrap_or_else(|| Post::new(0, username.as_str(), content));

        self.ctx.sign_post(&mut post);
        let targets = self.ctx.state.read().subscriptions().downstream(&username);
        self.ctx.publish(&username, &post, &targets).await;
        post
    }

    pub fn update_post(&self, id: u64, content: &str) -> bool {
        let mut updated = false;
        self.ctx.store.update_timeline(&self.ctx.username(), &mut |timeline| {
            updated = timeline.update_post(id, content)
        });
        updated
    }

    pub fn delete_post(&self, id: u64) -> bool {
        let mut deleted = false;
        self.ctx.store.update_timeline(&self.ctx.username(), &mut |timeline| {
            deleted = timeline.delete_post(id)
        });
        deleted
    }

    // ===================================================================
    // Authentication
    // ===================================================================

    /// Register our username; an existing account falls back to login
    pub fn register(&self, password: &str) -> SkeinResult<()> {
        match self.ctx.auth.register(&self.ctx.username(), password) {
            Ok(keys) => {
                self.ctx.set_keys(Some(keys));
                Ok(())
            }
            Err(_) => self.login(password),
        }
    }

    pub fn login(&self, password: &str) -> SkeinResult<()> {
        let username = self.ctx.username();
        match self.ctx.auth.login(&username, password) {
            Ok(keys) => {
                self.ctx.set_keys(Some(keys));
                tracing::info!(%username, "logged in");
                Ok(())
            }
            Err(e) => {
                self.logout();
                Err(e)
            }
        }
    }

    pub fn logout(&self) {
        self.ctx.set_keys(None);
    }

    pub fn is_logged_in(&self) -> bool {
        self.ctx.is_logged_in()
    }

    /// Fails with `NotAuthenticated` unless logged in
    pub fn require_login(&self) -> SkeinResult<()> {
        if self.is_logged_in() {
            Ok(())
        } else {
            Err(SkeinError::NotAuthenticated)
        }
    }

    // ===================================================================
    // Accessors
    // ===================================================================

    pub fn host(&self) -> Host {
        self.ctx.me()
    }

    pub fn username(&self) -> String {
        self.ctx.username()
    }

    pub fn endpoint(&self) -> Endpoint {
        self.ctx.me().endpoint()
    }

    pub fn neighbors(&self) -> Vec<Neighbor> {
        self.ctx.state.read().neighbors()
    }

    pub fn has_neighbor(&self, endpoint: Endpoint) -> bool {
        self.ctx.state.read().has_neighbor(endpoint)
    }

    pub fn host_cache(&self) -> Vec<Host> {
        self.ctx.state.read().host_cache()
    }

    pub fn is_super_peer(&self) -> bool {
        self.ctx.state.read().is_super_peer()
    }

    pub fn satisfaction(&self) -> f64 {
        self.ctx
            .state
            .read()
            .satisfaction(self.ctx.config.min_neighbors)
    }

    /// Install a topology observer; it is told about this node at once
    pub fn set_observer(&self, observer: Arc<dyn TopologyObserver>) {
        self.ctx.state.write().set_observer(observer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skein_overlay::{EventLog, TopologyEvent};

    fn fast_config() -> OverlayConfig {
        OverlayConfig {
            ack_timeout: Duration::from_millis(50),
            receive_timeout: Duration::from_millis(300),
            max_retries: 2,
            ..OverlayConfig::default()
        }
    }

    async fn peer(username: &str, capacity: u32) -> Peer {
        Peer::builder(username, capacity)
            .config(fast_config())
            .bind()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_bind_writes_ports_back() {
        let p = peer("alice", 10).await;
        let host = p.host();
        assert_ne!(host.port(), 0);
        assert_ne!(host.feed_port, 0);
        assert_eq!(host.username, "alice");
        assert!(p.timeline().is_some());
        p.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let config = OverlayConfig {
            workers: 0,
            ..OverlayConfig::default()
        };
        let result = Peer::builder("alice", 10).config(config).bind().await;
        assert!(matches!(result, Err(SkeinError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_lookups_without_neighbors_return_immediately() {
        let p = peer("alice", 10).await;
        let started = tokio::time::Instant::now();

        assert!(p.request_timeline("bob").await.is_none());
        assert!(p.search("hello").await.is_empty());
        assert!(!p.subscribe("bob").await);
        assert!(started.elapsed() < Duration::from_millis(50));
        assert_eq!(p.context().sender.promises().pending(), 0);

        p.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_own_timeline_is_local() {
        let p = peer("alice", 10).await;
        p.add_post("first").await;

        let timeline = p.request_timeline("alice").await.unwrap();
        assert_eq!(timeline.len(), 1);
        assert!(!p.subscribe("alice").await);
        p.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_post_editing() {
        let p = peer("alice", 10).await;
        let post = p.add_post("draft").await;

        assert!(p.update_post(post.id, "final"));
        assert_eq!(p.timeline().unwrap().post(post.id).unwrap().content, "final");
        assert!(p.delete_post(post.id));
        assert!(!p.delete_post(post.id));
        p.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_register_login_and_signing() {
        let p = peer("alice", 10).await;
        assert!(p.require_login().is_err());

        let unsigned = p.add_post("before").await;
        assert!(!unsigned.has_signature());

        p.register("secret").unwrap();
        assert!(p.is_logged_in());
        let signed = p.add_post("after").await;
        assert!(signed.has_signature());

        p.logout();
        assert!(!p.is_logged_in());
        assert!(p.login("wrong").is_err());
        // Registering again falls back to login
        p.register("secret").unwrap();
        assert!(p.is_logged_in());
        p.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_join_and_observer() {
        let a = peer("alice", 10).await;
        let b = peer("bob", 20).await;
        let log = Arc::new(EventLog::new());
        a.set_observer(log.clone());

        assert!(a.join(b.host()));
        assert!(!a.join(b.host()));
        assert!(!a.join(a.host()));
        assert!(a.has_neighbor(b.endpoint()));
        assert_eq!(a.satisfaction(), 0.0);

        let events = log.events();
        assert!(matches!(&events[0], TopologyEvent::NodeAdded { id, capacity: 10 } if id == "alice"));
        assert!(events
            .iter()
            .any(|e| matches!(e, TopologyEvent::EdgeAdded { .. })));

        a.shutdown().await.unwrap();
        b.shutdown().await.unwrap();
    }
}
