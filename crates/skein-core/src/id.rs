//! Identity types for Skein messages
//!
//! Correlation ids are 64-bit for wire efficiency. They are drawn at
//! random, which is sufficient to keep concurrently open requests apart.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Message identity - pairs a request with its responses
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub u64);

impl MessageId {
    pub const ZERO: MessageId = MessageId(0);

    #[inline]
    pub fn new(id: u64) -> Self {
        MessageId(id)
    }

    /// Draw a fresh random id
    pub fn random() -> Self {
        MessageId(rand::random())
    }

    #[inline]
    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    #[inline]
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        MessageId(u64::from_le_bytes(bytes))
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Msg({:016x})", self.0)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_roundtrip() {
        let id = MessageId::new(0xDEADBEEF_CAFEBABE);
        let recovered = MessageId::from_bytes(id.to_bytes());
        assert_eq!(id, recovered);
    }

    #[test]
    fn test_random_ids_differ() {
        let a = MessageId::random();
        let b = MessageId::random();
        assert_ne!(a, b);
    }

    #[test]
    fn test_display_is_hex() {
        assert_eq!(MessageId::new(0xAB).to_string(), "00000000000000ab");
    }
}
