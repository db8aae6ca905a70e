//! UDP transport implementation

use std::net::SocketAddr;

use tokio::net::UdpSocket;

use skein_core::{MessageId, SkeinError, SkeinResult};
use skein_wire::{Frame, MAX_FRAME_SIZE};

/// UDP transport for one peer socket
pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
}

impl UdpTransport {
    /// Bind to a local address
    pub async fn bind(addr: SocketAddr) -> SkeinResult<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| SkeinError::TransportError(e.to_string()))?;

        let local_addr = socket
            .local_addr()
            .map_err(|e| SkeinError::TransportError(e.to_string()))?;

        Ok(UdpTransport {
            socket,
            local_addr,
        })
    }

    /// Get local address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Send a frame to a destination without waiting for confirmation
    pub async fn send_to(&self, frame: &Frame, dest: SocketAddr) -> SkeinResult<()> {
        send_frame(&self.socket, frame, dest).await
    }

    /// Confirm delivery of `id` to the socket it came from
    pub async fn send_ack(&self, id: MessageId, dest: SocketAddr) -> SkeinResult<()> {
        send_frame(&self.socket, &Frame::ack(id), dest).await
    }

    /// Receive a frame (blocking)
    pub async fn recv_from(&self) -> SkeinResult<(Frame, SocketAddr)> {
        let mut buf = vec![0u8; MAX_FRAME_SIZE];
        let (len, addr) = self
            .socket
            .recv_from(&mut buf)
            .await
            .map_err(|e| SkeinError::TransportError(e.to_string()))?;

        let frame = Frame::parse(&buf[..len])?;
        Ok((frame, addr))
    }
}

pub(crate) async fn send_frame(socket: &UdpSocket, frame: &Frame, dest: SocketAddr) -> SkeinResult<()> {
    let bytes = frame.serialize()?;
    socket
        .send_to(&bytes, dest)
        .await
        .map_err(|e| SkeinError::TransportError(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use skein_wire::{Message, MessageKind};

    #[tokio::test]
    async fn test_udp_transport_bind() {
        let transport = UdpTransport::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();

        assert_ne!(transport.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn test_send_and_receive_frame() {
        let a = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let b = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();

        let frame = Frame::new(Message::SubPong);
        a.send_to(&frame, b.local_addr()).await.unwrap();

        let (received, from) = b.recv_from().await.unwrap();
        assert_eq!(received.id, frame.id);
        assert_eq!(received.kind(), MessageKind::SubPong);
        assert_eq!(from, a.local_addr());
    }
}
