//! Broadcast transports.
//!
//! Three heterogeneous servers share one contract: bind on `start`
//! (bind failures surface immediately), fan out envelopes to connected
//! clients, and release everything on shutdown. The generator side of
//! the pipeline only ever sees the [`Broadcaster`] trait.

pub mod sse;
pub mod udp;
pub mod ws;

pub use sse::SseServer;
pub use udp::UdpServer;
pub use ws::WebSocketServer;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::MockError;
use crate::event::Event;

/// Grace period for HTTP listeners after cancellation
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Common surface of all broadcast transports
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Bind the listener and serve in the background until the token
    /// is cancelled. A failed bind is returned, not deferred.
    async fn start(&self, cancel: CancellationToken) -> Result<(), MockError>;

    /// Send one envelope to every connected client. A no-op when no
    /// client is connected, so idle transports cost no serialization.
    async fn broadcast(&self, event: &Event) -> Result<(), MockError>;

    /// Send an already-encoded payload to every connected client.
    async fn broadcast_bytes(&self, payload: &[u8]) -> Result<(), MockError>;

    /// Number of currently connected clients.
    fn client_count(&self) -> usize;

    /// Release client registrations and close the listener.
    async fn shutdown(&self);

    /// Human-readable endpoint address for banners and status pages.
    fn address(&self) -> String;
}

/// Drain a dispatcher subscription into a transport until the channel
/// closes or the token fires.
pub async fn broadcast_from_channel(
    server: Arc<dyn Broadcaster>,
    cancel: CancellationToken,
    mut events: mpsc::Receiver<Event>,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            event = events.recv() => {
                let Some(event) = event else { return };
                if let Err(error) = server.broadcast(&event).await {
                    warn!(%error, address = %server.address(), "broadcast failed");
                }
            }
        }
    }
}
