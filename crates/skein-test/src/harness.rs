//! Localhost test network

use std::sync::Arc;
use std::time::Duration;

use skein_core::{OverlayConfig, SkeinResult};
use skein_crypto::LocalAuthority;
use skein_runtime::{init_logging, LoggingConfig, Peer};

/// Timeouts short enough for tests, long enough for a loaded CI box
pub fn fast_config() -> OverlayConfig {
    OverlayConfig {
        ping_interval: Duration::from_millis(100),
        admission_interval: Duration::from_millis(100),
        subscription_probe_interval: Duration::from_millis(100),
        ack_timeout: Duration::from_millis(60),
        max_retries: 2,
        receive_timeout: Duration::from_millis(400),
        poll_timeout: Duration::from_millis(20),
        ..OverlayConfig::default()
    }
}

/// A set of running peers sharing one authority
pub struct TestNet {
    peers: Vec<Peer>,
    auth: Arc<LocalAuthority>,
}

impl TestNet {
    /// Bind one peer per `(username, capacity)` with [`fast_config`]
    pub async fn spawn(specs: &[(&str, u32)]) -> SkeinResult<Self> {
        Self::spawn_with(specs, fast_config()).await
    }

    pub async fn spawn_with(specs: &[(&str, u32)], config: OverlayConfig) -> SkeinResult<Self> {
        init_logging(&LoggingConfig {
            level: "warn".to_string(),
            json: false,
        });

        let auth = Arc::new(LocalAuthority::new());
        let mut peers = Vec::with_capacity(specs.len());
        for (username, capacity) in specs {
            let peer = Peer::builder(*username, *capacity)
                .config(config.clone())
                .authenticator(auth.clone())
                .bind()
                .await?;
            peers.push(peer);
        }
        Ok(Self { peers, auth })
    }

    /// Panics when no peer has that username
    pub fn peer(&self, username: &str) -> &Peer {
        let index = self.index_of(username);
        &self.peers[index]
    }

    pub fn peer_mut(&mut self, username: &str) -> &mut Peer {
        let index = self.index_of(username);
        &mut self.peers[index]
    }

    fn index_of(&self, username: &str) -> usize {
        self.peers
            .iter()
            .position(|p| p.username() == username)
            .unwrap_or_else(|| panic!("no peer named {username}"))
    }

    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    pub fn authority(&self) -> &Arc<LocalAuthority> {
        &self.auth
    }

    /// Make `a` and `b` neighbors of each other without a handshake
    pub fn connect(&self, a: &str, b: &str) {
        let (pa, pb) = (self.peer(a), self.peer(b));
        pa.join(pb.host());
        pb.join(pa.host());
    }

    /// One gossip round on every peer, in order
    pub async fn gossip_all(&self) {
        for peer in &self.peers {
            peer.gossip_round().await;
        }
    }

    pub fn start_maintenance(&mut self) {
        for peer in &mut self.peers {
            peer.start_maintenance();
        }
    }

    /// Shut one peer down and remove it from the net
    pub async fn stop(&mut self, username: &str) -> SkeinResult<()> {
        let index = self.index_of(username);
        self.peers.remove(index).shutdown().await
    }

    pub async fn shutdown(self) -> SkeinResult<()> {
        for peer in self.peers {
            peer.shutdown().await?;
        }
        Ok(())
    }
}

/// Poll `condition` until it holds or `timeout` elapses
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_binds_distinct_endpoints() {
        let net = TestNet::spawn(&[("a", 10), ("b", 20)]).await.unwrap();
        assert_ne!(net.peer("a").endpoint(), net.peer("b").endpoint());
        assert_eq!(net.peer("b").host().capacity, 20);
        net.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_is_symmetric() {
        let net = TestNet::spawn(&[("a", 10), ("b", 20)]).await.unwrap();
        net.connect("a", "b");
        assert!(net.peer("a").has_neighbor(net.peer("b").endpoint()));
        assert!(net.peer("b").has_neighbor(net.peer("a").endpoint()));
        net.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_until_times_out() {
        let started = tokio::time::Instant::now();
        assert!(!wait_until(Duration::from_millis(60), || false).await);
        assert!(started.elapsed() >= Duration::from_millis(60));
        assert!(wait_until(Duration::from_millis(60), || true).await);
    }
}
