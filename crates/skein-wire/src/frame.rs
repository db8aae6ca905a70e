//! Complete frame structure for the Skein wire protocol
//!
//! Frame = Fixed Header + JSON body

use bytes::{BufMut, BytesMut};

use skein_core::{Endpoint, MessageId, SkeinError, SkeinResult};

use crate::{FixedHeader, Message, MessageKind, FIXED_HEADER_SIZE};

/// Maximum frame size (fits one UDP datagram)
pub const MAX_FRAME_SIZE: usize = 60 * 1024;

/// Complete Skein frame
#[derive(Clone, Debug)]
pub struct Frame {
    /// Correlation id
    pub id: MessageId,
    /// Remaining hops (flooded kinds only)
    pub ttl: u8,
    pub message: Message,
}

impl Frame {
    /// Create a frame with a fresh id
    pub fn new(message: Message) -> Self {
        Frame {
            id: MessageId::random(),
            ttl: 0,
            message,
        }
    }

    /// Create a reply correlated with `id`
    pub fn reply(id: MessageId, message: Message) -> Self {
        Frame { id, ttl: 0, message }
    }

    /// Transport acknowledgement for `id`
    pub fn ack(id: MessageId) -> Self {
        Frame::reply(id, Message::Ack)
    }

    pub fn with_ttl(mut self, ttl: u8) -> Self {
        self.ttl = ttl;
        self
    }

    #[inline]
    pub fn kind(&self) -> MessageKind {
        self.message.kind()
    }

    /// Copy for re-propagation: ttl decremented and `via` appended to the
    /// path. `None` once the ttl is exhausted or for non-flooded kinds.
    pub fn propagated(&self, via: Endpoint) -> Option<Frame> {
        if self.ttl == 0 {
            return None;
        }
        let message = match &self.message {
            Message::Query(l) => Message::Query(l.via(via)),
            Message::Search(l) => Message::Search(l.via(via)),
            Message::Sub(l) => Message::Sub(l.via(via)),
            _ => return None,
        };
        Some(Frame {
            id: self.id,
            ttl: self.ttl - 1,
            message,
        })
    }

    /// Parse frame from bytes
    pub fn parse(buf: &[u8]) -> SkeinResult<Self> {
        let header = FixedHeader::parse(buf)?;

        let body_end = FIXED_HEADER_SIZE + header.body_len as usize;
        if buf.len() < body_end {
            return Err(SkeinError::BufferTooShort {
                expected: body_end,
                actual: buf.len(),
            });
        }
        if buf.len() > body_end {
            return Err(SkeinError::InvalidWireFormat(
                "Trailing bytes after body".into(),
            ));
        }

        let message = Message::decode_body(header.kind, &buf[FIXED_HEADER_SIZE..body_end])?;

        Ok(Frame {
            id: header.id,
            ttl: header.ttl,
            message,
        })
    }

    /// Serialize frame to bytes
    pub fn serialize(&self) -> SkeinResult<Vec<u8>> {
        let body = self.message.encode_body()?;
        let total_size = FIXED_HEADER_SIZE + body.len();

        if total_size > MAX_FRAME_SIZE {
            return Err(SkeinError::InvalidWireFormat(format!(
                "Frame too large: {} > {}",
                total_size, MAX_FRAME_SIZE
            )));
        }

        let mut header = FixedHeader::new(self.kind(), self.id);
        header.ttl = self.ttl;
        header.body_len = body.len() as u32;

        let mut buf = BytesMut::with_capacity(total_size);
        buf.put_slice(&header.to_bytes());
        buf.put_slice(&body);

        Ok(buf.to_vec())
    }
}
