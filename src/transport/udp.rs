//! UDP broadcast transport with explicit client registration.
//!
//! Any inbound datagram registers its sender; the literal payloads
//! `subscribe` and `unsubscribe` toggle membership explicitly.
//! Broadcasts are fire-and-forget datagrams to every registered peer.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::Broadcaster;
use crate::encoding::Encoder;
use crate::error::MockError;
use crate::event::Event;

/// Read deadline of the registration loop; keeps cancellation prompt.
const READ_DEADLINE: Duration = Duration::from_millis(100);

struct UdpShared {
    socket: RwLock<Option<Arc<UdpSocket>>>,
    clients: RwLock<HashSet<SocketAddr>>,
    host: String,
    port: u16,
}

impl UdpShared {
    fn handle_datagram(&self, payload: &[u8], addr: SocketAddr) {
        let message = String::from_utf8_lossy(payload);
        let mut clients = self.clients.write().unwrap();
        match message.trim() {
            "unsubscribe" => {
                if clients.remove(&addr) {
                    info!(client = %addr, total = clients.len(), "udp client unsubscribed");
                }
            }
            // "subscribe" and anything else both register.
            _ => {
                if clients.insert(addr) {
                    info!(client = %addr, total = clients.len(), "udp client registered");
                }
            }
        }
    }
}

/// Broadcasts envelopes as datagrams to registered peers
pub struct UdpServer {
    encoder: Arc<dyn Encoder>,
    shared: Arc<UdpShared>,
}

impl UdpServer {
    pub fn new(host: &str, port: u16, encoder: Arc<dyn Encoder>) -> Self {
        UdpServer {
            encoder,
            shared: Arc::new(UdpShared {
                socket: RwLock::new(None),
                clients: RwLock::new(HashSet::new()),
                host: host.to_string(),
                port,
            }),
        }
    }
}

#[async_trait]
impl Broadcaster for UdpServer {
    async fn start(&self, cancel: CancellationToken) -> Result<(), MockError> {
        let addr = format!("{}:{}", self.shared.host, self.shared.port);
        let socket = UdpSocket::bind(&addr)
            .await
            .map_err(|source| MockError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let socket = Arc::new(socket);
        *self.shared.socket.write().unwrap() = Some(socket.clone());

        info!(endpoint = %self.address(), "udp server listening");

        let shared = self.shared.clone();
        tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            loop {
                if cancel.is_cancelled() {
                    break;
                }
                match tokio::time::timeout(READ_DEADLINE, socket.recv_from(&mut buf)).await {
                    Ok(Ok((len, peer))) => shared.handle_datagram(&buf[..len], peer),
                    Ok(Err(error)) => {
                        if cancel.is_cancelled() {
                            break;
                        }
                        debug!(%error, "udp read error");
                    }
                    // Deadline expired; loop to observe cancellation.
                    Err(_) => {}
                }
            }
            debug!("udp read loop stopped");
        });

        Ok(())
    }

    async fn broadcast(&self, event: &Event) -> Result<(), MockError> {
        if self.client_count() == 0 {
            return Ok(());
        }
        let payload = self.encoder.encode(event)?;
        self.broadcast_bytes(&payload).await
    }

    async fn broadcast_bytes(&self, payload: &[u8]) -> Result<(), MockError> {
        let socket = match self.shared.socket.read().unwrap().clone() {
            Some(socket) => socket,
            None => return Ok(()),
        };

        let peers: Vec<SocketAddr> = {
            let clients = self.shared.clients.read().unwrap();
            if clients.is_empty() {
                return Ok(());
            }
            clients.iter().copied().collect()
        };

        for peer in peers {
            if let Err(error) = socket.send_to(payload, peer).await {
                debug!(client = %peer, %error, "udp send failed");
            }
        }

        Ok(())
    }

    fn client_count(&self) -> usize {
        self.shared.clients.read().unwrap().len()
    }

    async fn shutdown(&self) {
        self.shared.clients.write().unwrap().clear();
        *self.shared.socket.write().unwrap() = None;
    }

    fn address(&self) -> String {
        format!("udp://{}:{}", self.shared.host, self.shared.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::JsonEncoder;

    fn test_addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    fn server() -> UdpServer {
        UdpServer::new("127.0.0.1", 0, Arc::new(JsonEncoder))
    }

    #[test]
    fn test_any_datagram_registers_idempotently() {
        let udp = server();
        let peer = test_addr(40001);

        udp.shared.handle_datagram(b"hello", peer);
        udp.shared.handle_datagram(b"subscribe", peer);
        assert_eq!(udp.client_count(), 1);
    }

    #[test]
    fn test_unsubscribe_removes_peer() {
        let udp = server();
        let peer = test_addr(40002);

        udp.shared.handle_datagram(b"subscribe", peer);
        assert_eq!(udp.client_count(), 1);
        udp.shared.handle_datagram(b"unsubscribe", peer);
        assert_eq!(udp.client_count(), 0);
        // Unsubscribing an unknown peer is harmless.
        udp.shared.handle_datagram(b"unsubscribe", peer);
        assert_eq!(udp.client_count(), 0);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_only_registered_peers() {
        let udp = server();
        let cancel = CancellationToken::new();
        udp.start(cancel.clone()).await.unwrap();

        let subscriber = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let bystander = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let server_addr = {
            let guard = udp.shared.socket.read().unwrap();
            guard.as_ref().unwrap().local_addr().unwrap()
        };
        subscriber.send_to(b"subscribe", server_addr).await.unwrap();

        // Wait for registration to land.
        for _ in 0..50 {
            if udp.client_count() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(udp.client_count(), 1);

        udp.broadcast_bytes(b"payload").await.unwrap();

        let mut buf = [0u8; 64];
        let (len, _) = tokio::time::timeout(
            Duration::from_secs(1),
            subscriber.recv_from(&mut buf),
        )
        .await
        .expect("registered peer received nothing")
        .unwrap();
        assert_eq!(&buf[..len], b"payload");

        // The unregistered socket sees nothing.
        let silent = tokio::time::timeout(
            Duration::from_millis(200),
            bystander.recv_from(&mut buf),
        )
        .await;
        assert!(silent.is_err());

        cancel.cancel();
        udp.shutdown().await;
        assert_eq!(udp.client_count(), 0);
    }

    #[tokio::test]
    async fn test_broadcast_with_no_peers_is_noop() {
        let udp = server();
        udp.broadcast_bytes(b"payload").await.unwrap();
    }
}
