//! Message kinds and typed payloads
//!
//! Every datagram carries exactly one `Message`. The kind tag travels in
//! the fixed header and selects the payload type on decode, so inbound
//! traffic is routed by one exhaustive match instead of runtime casts.

use serde::{Deserialize, Serialize};

use skein_core::{Endpoint, Host, Neighbor, Post, SkeinResult, Timeline};

/// Message kind tag
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    Ping = 1,
    Pong = 2,
    AdmitRequest = 3,
    AdmitResponse = 4,
    Query = 5,
    QueryHit = 6,
    Search = 7,
    SearchHit = 8,
    Sub = 9,
    SubHit = 10,
    SubPing = 11,
    SubPong = 12,
    /// Published post on a content feed
    Feed = 13,
    /// Transport level delivery acknowledgement
    Ack = 0xFF,
}

impl MessageKind {
    /// Parse from wire byte
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(MessageKind::Ping),
            2 => Some(MessageKind::Pong),
            3 => Some(MessageKind::AdmitRequest),
            4 => Some(MessageKind::AdmitResponse),
            5 => Some(MessageKind::Query),
            6 => Some(MessageKind::QueryHit),
            7 => Some(MessageKind::Search),
            8 => Some(MessageKind::SearchHit),
            9 => Some(MessageKind::Sub),
            10 => Some(MessageKind::SubHit),
            11 => Some(MessageKind::SubPing),
            12 => Some(MessageKind::SubPong),
            13 => Some(MessageKind::Feed),
            0xFF => Some(MessageKind::Ack),
            _ => None,
        }
    }

    /// Convert to wire byte
    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            MessageKind::Ping => "PING",
            MessageKind::Pong => "PONG",
            MessageKind::AdmitRequest => "ADMIT_REQUEST",
            MessageKind::AdmitResponse => "ADMIT_RESPONSE",
            MessageKind::Query => "QUERY",
            MessageKind::QueryHit => "QUERY_HIT",
            MessageKind::Search => "SEARCH",
            MessageKind::SearchHit => "SEARCH_HIT",
            MessageKind::Sub => "SUB",
            MessageKind::SubHit => "SUB_HIT",
            MessageKind::SubPing => "SUB_PING",
            MessageKind::SubPong => "SUB_PONG",
            MessageKind::Feed => "FEED",
            MessageKind::Ack => "OK",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Liveness probe
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Ping {
    pub sender: Host,
}

/// Liveness reply with the responder's metadata and host cache
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Pong {
    /// Responder host snapshot plus its aggregate timeline filter
    pub responder: Neighbor,
    pub host_cache: Vec<Host>,
    /// Does the responder count the prober as a neighbor?
    pub is_neighbor: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdmitRequest {
    pub sender: Host,
}

/// Admission decision; the host cache is returned even on rejection
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdmitResponse {
    pub accepted: bool,
    pub host_cache: Vec<Host>,
}

/// Flooded lookup shared by QUERY, SEARCH and SUB
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Lookup {
    /// Username (QUERY, SUB) or search term (SEARCH)
    pub target: String,
    /// Endpoints that already handled this message, originator first
    pub path: Vec<Endpoint>,
    /// Peer hits are sent back to
    pub original_sender: Host,
}

impl Lookup {
    pub fn new(target: impl Into<String>, original_sender: Host) -> Self {
        Self {
            target: target.into(),
            path: vec![original_sender.endpoint()],
            original_sender,
        }
    }

    pub fn is_in_path(&self, endpoint: Endpoint) -> bool {
        self.path.contains(&endpoint)
    }

    /// Copy of this lookup with `via` appended to the path
    pub fn via(&self, via: Endpoint) -> Self {
        let mut next = self.clone();
        next.path.push(via);
        next
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueryHit {
    pub timeline: Timeline,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchHit {
    pub posts: Vec<Post>,
}

/// Subscription accepted by an owner or a relay
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubHit {
    /// Request endpoint answering SUB_PING health probes
    pub relay: Endpoint,
    /// Feed endpoint posts will be sent from
    pub feed: Endpoint,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubPing {
    pub sender: Endpoint,
}

/// Post delivered on a content feed
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Feed {
    pub username: String,
    pub post: Post,
}

/// Typed overlay message
#[derive(Clone, Debug)]
pub enum Message {
    Ping(Ping),
    Pong(Pong),
    AdmitRequest(AdmitRequest),
    AdmitResponse(AdmitResponse),
    Query(Lookup),
    QueryHit(QueryHit),
    Search(Lookup),
    SearchHit(SearchHit),
    Sub(Lookup),
    SubHit(SubHit),
    SubPing(SubPing),
    SubPong,
    Feed(Feed),
    Ack,
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Ping(_) => MessageKind::Ping,
            Message::Pong(_) => MessageKind::Pong,
            Message::AdmitRequest(_) => MessageKind::AdmitRequest,
            Message::AdmitResponse(_) => MessageKind::AdmitResponse,
            Message::Query(_) => MessageKind::Query,
            Message::QueryHit(_) => MessageKind::QueryHit,
            Message::Search(_) => MessageKind::Search,
            Message::SearchHit(_) => MessageKind::SearchHit,
            Message::Sub(_) => MessageKind::Sub,
            Message::SubHit(_) => MessageKind::SubHit,
            Message::SubPing(_) => MessageKind::SubPing,
            Message::SubPong => MessageKind::SubPong,
            Message::Feed(_) => MessageKind::Feed,
            Message::Ack => MessageKind::Ack,
        }
    }

    /// Flood payload, if this message is flooded
    pub fn lookup(&self) -> Option<&Lookup> {
        match self {
            Message::Query(l) | Message::Search(l) | Message::Sub(l) => Some(l),
            _ => None,
        }
    }

    /// Encode the payload body
    pub fn encode_body(&self) -> SkeinResult<Vec<u8>> {
        let body = match self {
            Message::Ping(p) => serde_json::to_vec(p)?,
            Message::Pong(p) => serde_json::to_vec(p)?,
            Message::AdmitRequest(p) => serde_json::to_vec(p)?,
            Message::AdmitResponse(p) => serde_json::to_vec(p)?,
            Message::Query(p) | Message::Search(p) | Message::Sub(p) => serde_json::to_vec(p)?,
            Message::QueryHit(p) => serde_json::to_vec(p)?,
            Message::SearchHit(p) => serde_json::to_vec(p)?,
            Message::SubHit(p) => serde_json::to_vec(p)?,
            Message::SubPing(p) => serde_json::to_vec(p)?,
            Message::Feed(p) => serde_json::to_vec(p)?,
            Message::SubPong | Message::Ack => Vec::new(),
        };
        Ok(body)
    }

    /// Decode a payload body for the given kind
    pub fn decode_body(kind: MessageKind, body: &[u8]) -> SkeinResult<Self> {
        let message = match kind {
            MessageKind::Ping => Message::Ping(serde_json::from_slice(body)?),
            MessageKind::Pong => Message::Pong(serde_json::from_slice(body)?),
            MessageKind::AdmitRequest => Message::AdmitRequest(serde_json::from_slice(body)?),
            MessageKind::AdmitResponse => Message::AdmitResponse(serde_json::from_slice(body)?),
            MessageKind::Query => Message::Query(serde_json::from_slice(body)?),
            MessageKind::QueryHit => Message::QueryHit(serde_json::from_slice(body)?),
            MessageKind::Search => Message::Search(serde_json::from_slice(body)?),
            MessageKind::SearchHit => Message::SearchHit(serde_json::from_slice(body)?),
            MessageKind::Sub => Message::Sub(serde_json::from_slice(body)?),
            MessageKind::SubHit => Message::SubHit(serde_json::from_slice(body)?),
            MessageKind::SubPing => Message::SubPing(serde_json::from_slice(body)?),
            MessageKind::SubPong => Message::SubPong,
            MessageKind::Feed => Message::Feed(serde_json::from_slice(body)?),
            MessageKind::Ack => Message::Ack,
        };
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn host(port: u16) -> Host {
        Host::new("alice", Endpoint::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port), 10)
    }

    #[test]
    fn test_kind_byte_roundtrip() {
        for b in 0..=u8::MAX {
            if let Some(kind) = MessageKind::from_byte(b) {
                assert_eq!(kind.to_byte(), b);
            }
        }
        assert_eq!(MessageKind::from_byte(0), None);
    }

    #[test]
    fn test_lookup_starts_with_originator() {
        let origin = host(9000);
        let lookup = Lookup::new("bob", origin.clone());
        assert_eq!(lookup.path, vec![origin.endpoint()]);

        let relay = host(9001).endpoint();
        let next = lookup.via(relay);
        assert!(next.is_in_path(relay));
        assert!(!lookup.is_in_path(relay));
    }

    #[test]
    fn test_body_kind_mismatch_is_error() {
        let body = Message::Ping(Ping { sender: host(1) }).encode_body().unwrap();
        assert!(Message::decode_body(MessageKind::SubHit, &body).is_err());
    }

    #[test]
    fn test_empty_bodies() {
        assert!(Message::Ack.encode_body().unwrap().is_empty());
        assert!(matches!(
            Message::decode_body(MessageKind::SubPong, &[]).unwrap(),
            Message::SubPong
        ));
    }
}
