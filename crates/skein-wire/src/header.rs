//! Fixed header for the Skein wire protocol
//!
//! Fixed header is 16 bytes:
//! - Byte 0: Version
//! - Byte 1: Message kind
//! - Byte 2: TTL (remaining hops)
//! - Byte 3: Reserved (zero)
//! - Bytes 4-11: Message id (LE)
//! - Bytes 12-15: Body length (LE)

use skein_core::{MessageId, SkeinError, SkeinResult};

use crate::MessageKind;

/// Fixed header size in bytes
pub const FIXED_HEADER_SIZE: usize = 16;

/// Current wire protocol version
pub const WIRE_VERSION: u8 = 1;

/// Fixed header structure
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FixedHeader {
    /// Wire protocol version
    pub version: u8,
    /// Payload type tag
    pub kind: MessageKind,
    /// Remaining hops for flooded messages
    pub ttl: u8,
    /// Correlation id
    pub id: MessageId,
    /// Length of the body following the header
    pub body_len: u32,
}

impl FixedHeader {
    /// Create a new header with default values
    pub fn new(kind: MessageKind, id: MessageId) -> Self {
        FixedHeader {
            version: WIRE_VERSION,
            kind,
            ttl: 0,
            id,
            body_len: 0,
        }
    }

    /// Parse header from bytes
    pub fn parse(buf: &[u8]) -> SkeinResult<Self> {
        if buf.len() < FIXED_HEADER_SIZE {
            return Err(SkeinError::BufferTooShort {
                expected: FIXED_HEADER_SIZE,
                actual: buf.len(),
            });
        }

        // Byte 0: Version
        let version = buf[0];
        if version != WIRE_VERSION {
            return Err(SkeinError::UnsupportedVersion(version));
        }

        // Byte 1: Kind
        let kind =
            MessageKind::from_byte(buf[1]).ok_or(SkeinError::UnknownMessageKind(buf[1]))?;

        // Byte 2: TTL
        let ttl = buf[2];

        // Bytes 4-11: Message id
        let mut id = [0u8; 8];
        id.copy_from_slice(&buf[4..12]);
        let id = MessageId::from_bytes(id);

        // Bytes 12-15: Body length
        let mut body_len = [0u8; 4];
        body_len.copy_from_slice(&buf[12..16]);
        let body_len = u32::from_le_bytes(body_len);

        Ok(FixedHeader {
            version,
            kind,
            ttl,
            id,
            body_len,
        })
    }

    /// Serialize header to bytes
    pub fn serialize(&self, buf: &mut [u8]) -> SkeinResult<()> {
        if buf.len() < FIXED_HEADER_SIZE {
            return Err(SkeinError::BufferTooShort {
                expected: FIXED_HEADER_SIZE,
                actual: buf.len(),
            });
        }

        buf[0] = self.version;
        buf[1] = self.kind.to_byte();
        buf[2] = self.ttl;
        buf[3] = 0;
        buf[4..12].copy_from_slice(&self.id.to_bytes());
        buf[12..16].copy_from_slice(&self.body_len.to_le_bytes());

        Ok(())
    }

    /// Serialize header to a new array
    pub fn to_bytes(&self) -> [u8; FIXED_HEADER_SIZE] {
        let mut buf = [0u8; FIXED_HEADER_SIZE];
        // Infallible: the buffer is exactly FIXED_HEADER_SIZE long
        let _ = self.serialize(&mut buf);
        buf
    }
}
