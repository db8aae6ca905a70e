//! Acknowledged delivery
//!
//! Every request-socket datagram is confirmed with an `Ack` frame carrying
//! the same id. The sender binds an ephemeral socket per delivery, so the
//! acknowledgement cannot be confused with protocol traffic arriving on the
//! peer's own request socket.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};

use skein_core::{Endpoint, SkeinError, SkeinResult};
use skein_wire::{Frame, MessageKind, MAX_FRAME_SIZE};

use crate::udp::send_frame;

/// Retry policy for acknowledged delivery
#[derive(Clone, Copy, Debug)]
pub struct DeliveryPolicy {
    /// Time to wait for the acknowledgement of one attempt
    pub ack_timeout: Duration,
    /// Number of attempts before giving up
    pub max_retries: u32,
}

impl DeliveryPolicy {
    pub fn new(ack_timeout: Duration, max_retries: u32) -> Self {
        Self {
            ack_timeout,
            max_retries,
        }
    }
}

fn unspecified_for(dest: SocketAddr) -> SocketAddr {
    match dest {
        SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
    }
}

/// Send `frame` to `dest` and wait for its acknowledgement, retrying up
/// to `policy.max_retries` times.
///
/// Returns the number of attempts used. Transport errors on an attempt
/// count as a failed attempt.
pub async fn deliver(frame: &Frame, dest: Endpoint, policy: DeliveryPolicy) -> SkeinResult<u32> {
    let socket = UdpSocket::bind(unspecified_for(dest.socket_addr())).await?;
    let mut buf = vec![0u8; MAX_FRAME_SIZE];

    for attempt in 1..=policy.max_retries {
        if let Err(e) = send_frame(&socket, frame, dest.socket_addr()).await {
            if matches!(e, SkeinError::Payload(_) | SkeinError::InvalidWireFormat(_)) {
                return Err(e);
            }
            tracing::warn!(%dest, attempt, "send failed: {}", e);
            continue;
        }

        if wait_for_ack(&socket, &mut buf, frame, dest, policy.ack_timeout).await {
            return Ok(attempt);
        }
        tracing::debug!(%dest, attempt, kind = %frame.kind(), "no acknowledgement");
    }

    Err(SkeinError::DeliveryFailed(dest))
}

async fn wait_for_ack(
    socket: &UdpSocket,
    buf: &mut [u8],
    frame: &Frame,
    dest: Endpoint,
    ack_timeout: Duration,
) -> bool {
    // The reply source may differ from `dest` on multi-homed hosts; the
    // random id alone identifies the acknowledgement.
    let deadline = Instant::now() + ack_timeout;
    loop {
        let (len, _) = match timeout_at(deadline, socket.recv_from(buf)).await {
            Ok(Ok(received)) => received,
            Ok(Err(e)) => {
                tracing::warn!(%dest, "acknowledgement receive error: {}", e);
                return false;
            }
            Err(_) => return false,
        };

        // Stale acks from an earlier attempt carry the same id and count
        match Frame::parse(&buf[..len]) {
            Ok(ack) if ack.kind() == MessageKind::Ack && ack.id == frame.id => return true,
            Ok(_) => continue,
            Err(e) => tracing::debug!(%dest, "malformed acknowledgement: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::UdpTransport;
    use skein_core::MessageId;
    use skein_wire::Message;

    fn policy() -> DeliveryPolicy {
        DeliveryPolicy::new(Duration::from_millis(100), 3)
    }

    #[tokio::test]
    async fn test_deliver_with_ack() {
        let receiver = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let dest = Endpoint::from(receiver.local_addr());

        let frame = Frame::new(Message::SubPong);
        let sent = frame.clone();
        let task = tokio::spawn(async move { deliver(&sent, dest, policy()).await });

        let (received, from) = receiver.recv_from().await.unwrap();
        assert_eq!(received.id, frame.id);
        receiver.send_ack(received.id, from).await.unwrap();

        assert_eq!(task.await.unwrap().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_deliver_retries_until_acked() {
        let receiver = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let dest = Endpoint::from(receiver.local_addr());

        let frame = Frame::new(Message::SubPong);
        let sent = frame.clone();
        let task = tokio::spawn(async move { deliver(&sent, dest, policy()).await });

        // Ignore the first attempt
        let _ = receiver.recv_from().await.unwrap();
        let (_, from) = receiver.recv_from().await.unwrap();
        receiver.send_ack(frame.id, from).await.unwrap();

        assert_eq!(task.await.unwrap().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_deliver_fails_without_ack() {
        let silent = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let dest = Endpoint::from(silent.local_addr());

        let frame = Frame::new(Message::SubPong);
        let result = deliver(&frame, dest, policy()).await;
        assert!(matches!(result, Err(SkeinError::DeliveryFailed(ep)) if ep == dest));
    }

    #[tokio::test]
    async fn test_ack_for_other_id_is_ignored() {
        let receiver = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let dest = Endpoint::from(receiver.local_addr());

        let frame = Frame::new(Message::SubPong);
        let sent = frame.clone();
        let task = tokio::spawn(async move {
            deliver(&sent, dest, DeliveryPolicy::new(Duration::from_millis(100), 1)).await
        });

        let (_, from) = receiver.recv_from().await.unwrap();
        receiver
            .send_ack(MessageId::new(frame.id.0 ^ 1), from)
            .await
            .unwrap();

        assert!(task.await.unwrap().is_err());
    }
}
