//! Overlay configuration
//!
//! Every tunable of the overlay lives here. Durations are (de)serialized
//! as human readable strings such as `"1s"` or `"250ms"`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{SkeinError, SkeinResult, DEFAULT_FILTER_BITS, DEFAULT_FILTER_HASHES};

/// Gossip timer fixed delay
pub const PING_INTERVAL: Duration = Duration::from_millis(1000);
/// Admission timer fixed delay
pub const ADMISSION_INTERVAL: Duration = Duration::from_millis(1000);
pub const MIN_NEIGHBORS: u32 = 1;
pub const MAX_NEIGHBORS: u32 = 8;
/// Degree at which a peer routes with timeline filters
pub const SUPER_PEER_MIN_DEGREE: u32 = 5;
/// Neighbors a flood is forwarded to per hop
pub const MAX_FANOUT: usize = 2;
pub const MAX_RETRIES: u32 = 3;
/// Protocol level response timeout
pub const RECEIVE_TIMEOUT: Duration = Duration::from_millis(1000);
/// Transport level acknowledgement timeout
pub const ACK_TIMEOUT: Duration = Duration::from_millis(250);
pub const MAX_SUBSCRIBERS: u32 = 3;
pub const FLOOD_TTL: u8 = 5;
pub const WORKERS: usize = 3;

/// Overlay configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    #[serde(with = "duration_str")]
    pub ping_interval: Duration,
    #[serde(with = "duration_str")]
    pub admission_interval: Duration,
    #[serde(with = "duration_str")]
    pub subscription_probe_interval: Duration,
    pub min_neighbors: u32,
    pub max_neighbors: u32,
    pub super_peer_min_degree: u32,
    pub max_fanout: usize,
    pub max_retries: u32,
    #[serde(with = "duration_str")]
    pub receive_timeout: Duration,
    #[serde(with = "duration_str")]
    pub ack_timeout: Duration,
    pub max_subscribers: u32,
    pub flood_ttl: u8,
    pub workers: usize,
    /// Longest the coordinator waits for a free worker slot before
    /// dropping an inbound frame
    #[serde(with = "duration_str")]
    pub poll_timeout: Duration,
    pub filter_bits: usize,
    pub filter_hashes: u32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        OverlayConfig {
            ping_interval: PING_INTERVAL,
            admission_interval: ADMISSION_INTERVAL,
            subscription_probe_interval: PING_INTERVAL,
            min_neighbors: MIN_NEIGHBORS,
            max_neighbors: MAX_NEIGHBORS,
            super_peer_min_degree: SUPER_PEER_MIN_DEGREE,
            max_fanout: MAX_FANOUT,
            max_retries: MAX_RETRIES,
            receive_timeout: RECEIVE_TIMEOUT,
            ack_timeout: ACK_TIMEOUT,
            max_subscribers: MAX_SUBSCRIBERS,
            flood_ttl: FLOOD_TTL,
            workers: WORKERS,
            poll_timeout: Duration::from_millis(100),
            filter_bits: DEFAULT_FILTER_BITS,
            filter_hashes: DEFAULT_FILTER_HASHES,
        }
    }
}

impl OverlayConfig {
    /// Parse a JSON document; absent fields take their defaults
    pub fn from_json(json: &str) -> SkeinResult<Self> {
        let config: OverlayConfig = serde_json::from_str(json)
            .map_err(|e| SkeinError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the overlay cannot run with
    pub fn validate(&self) -> SkeinResult<()> {
        let invalid = |msg: &str| Err(SkeinError::InvalidConfig(msg.to_string()));

        if self.workers == 0 {
            return invalid("workers must be at least 1");
        }
        if self.max_fanout == 0 {
            return invalid("max_fanout must be at least 1");
        }
        if self.max_neighbors == 0 {
            return invalid("max_neighbors must be at least 1");
        }
        if self.min_neighbors > self.max_neighbors {
            return invalid("min_neighbors exceeds max_neighbors");
        }
        if self.max_retries == 0 {
            return invalid("max_retries must be at least 1");
        }
        if self.receive_timeout.is_zero() || self.ack_timeout.is_zero() {
            return invalid("timeouts must be non-zero");
        }
        if self.poll_timeout.is_zero() {
            return invalid("poll_timeout must be non-zero");
        }
        if self.filter_bits == 0 || self.filter_hashes == 0 {
            return invalid("filter geometry must be non-zero");
        }
        Ok(())
    }
}

mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(OverlayConfig::default().validate().is_ok());
    }

    #[test]
    fn test_from_json_partial() {
        let config = OverlayConfig::from_json(
            r#"{ "ping_interval": "250ms", "max_neighbors": 4, "receive_timeout": "2s" }"#,
        )
        .unwrap();

        assert_eq!(config.ping_interval, Duration::from_millis(250));
        assert_eq!(config.receive_timeout, Duration::from_secs(2));
        assert_eq!(config.max_neighbors, 4);
        assert_eq!(config.max_fanout, MAX_FANOUT);
    }

    #[test]
    fn test_from_json_rejects_bad_duration() {
        let result = OverlayConfig::from_json(r#"{ "ack_timeout": "soon" }"#);
        assert!(matches!(result, Err(SkeinError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_inverted_bounds() {
        let config = OverlayConfig {
            min_neighbors: 5,
            max_neighbors: 2,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let config = OverlayConfig {
            workers: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_roundtrip_keeps_durations() {
        let config = OverlayConfig {
            ack_timeout: Duration::from_millis(40),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back = OverlayConfig::from_json(&json).unwrap();
        assert_eq!(back, config);
    }
}
