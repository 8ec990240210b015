//! WebSocket broadcast transport.
//!
//! Serves `/hsi` as a permissive upgrade endpoint and `/` as a
//! plaintext status page. Every connected client owns a bounded send
//! queue and a dedicated writer task with a per-message write
//! deadline; a full queue or a failed write drops that client without
//! touching the others.

use std::collections::HashMap;
use std::future::IntoFuture;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{Broadcaster, SHUTDOWN_GRACE};
use crate::encoding::Encoder;
use crate::error::MockError;
use crate::event::Event;

/// Per-client send queue capacity
const CLIENT_QUEUE_CAPACITY: usize = 256;
/// Deadline for writing one frame to a client
const WRITE_DEADLINE: Duration = Duration::from_secs(5);

struct WsShared {
    clients: RwLock<HashMap<u64, mpsc::Sender<Message>>>,
    next_id: AtomicU64,
    host: String,
    port: u16,
}

/// Broadcasts envelopes to WebSocket clients
pub struct WebSocketServer {
    encoder: Arc<dyn Encoder>,
    shared: Arc<WsShared>,
}

impl WebSocketServer {
    pub fn new(host: &str, port: u16, encoder: Arc<dyn Encoder>) -> Self {
        WebSocketServer {
            encoder,
            shared: Arc::new(WsShared {
                clients: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                host: host.to_string(),
                port,
            }),
        }
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/hsi", get(upgrade_handler))
            .route("/", get(status_page))
            .with_state(self.shared.clone())
    }
}

#[async_trait]
impl Broadcaster for WebSocketServer {
    async fn start(&self, cancel: CancellationToken) -> Result<(), MockError> {
        let addr = format!("{}:{}", self.shared.host, self.shared.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|source| MockError::Bind {
                addr: addr.clone(),
                source,
            })?;

        let app = self.router();

        info!(endpoint = %self.address(), "websocket server listening");

        let shared = self.shared.clone();
        tokio::spawn(async move {
            let serve = axum::serve(listener, app)
                .with_graceful_shutdown(cancel.clone().cancelled_owned())
                .into_future();
            tokio::select! {
                result = serve => {
                    if let Err(error) = result {
                        warn!(%error, "websocket server terminated");
                    }
                }
                _ = async {
                    cancel.cancelled().await;
                    // Closing the queues lets writer tasks close their
                    // sockets so the graceful shutdown can finish.
                    shared.clients.write().unwrap().clear();
                    tokio::time::sleep(SHUTDOWN_GRACE).await;
                } => {
                    debug!("websocket shutdown grace expired");
                }
            }
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
        let message = if self.encoder.is_binary() {
            Message::Binary(payload.to_vec())
        } else {
            Message::Text(String::from_utf8_lossy(payload).into_owned())
        };

        let clients: Vec<(u64, mpsc::Sender<Message>)> = {
            let guard = self.shared.clients.read().unwrap();
            if guard.is_empty() {
                return Ok(());
            }
            guard.iter().map(|(id, tx)| (*id, tx.clone())).collect()
        };

        let mut stale = Vec::new();
        for (id, tx) in clients {
            if tx.try_send(message.clone()).is_err() {
                stale.push(id);
            }
        }

        if !stale.is_empty() {
            let mut guard = self.shared.clients.write().unwrap();
            for id in stale {
                guard.remove(&id);
                warn!(client = id, "dropping websocket client, queue full or closed");
            }
        }

        Ok(())
    }

    fn client_count(&self) -> usize {
        self.shared.clients.read().unwrap().len()
    }

    async fn shutdown(&self) {
        self.shared.clients.write().unwrap().clear();
    }

    fn address(&self) -> String {
        format!("ws://{}:{}/hsi", self.shared.host, self.shared.port)
    }
}

async fn upgrade_handler(
    State(shared): State<Arc<WsShared>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_client(socket, shared))
}

async fn status_page(State(shared): State<Arc<WsShared>>) -> impl IntoResponse {
    let body = format!(
        "Synheart Mock Data Server\n\nWebSocket endpoint: ws://{}:{}/hsi\nConnected clients: {}\n",
        shared.host,
        shared.port,
        shared.clients.read().unwrap().len()
    );
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body)
}

async fn handle_client(socket: WebSocket, shared: Arc<WsShared>) {
    let id = shared.next_id.fetch_add(1, Ordering::Relaxed);
    let (tx, mut rx) = mpsc::channel::<Message>(CLIENT_QUEUE_CAPACITY);
    let total = {
        let mut guard = shared.clients.write().unwrap();
        guard.insert(id, tx);
        guard.len()
    };
    info!(client = id, total, "websocket client connected");

    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            match tokio::time::timeout(WRITE_DEADLINE, sink.send(message)).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) | Err(_) => break,
            }
        }
        let _ = sink.close().await;
    });

    // Inbound frames are only read to notice disconnects.
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    let total = {
        let mut guard = shared.clients.write().unwrap();
        guard.remove(&id);
        guard.len()
    };
    writer.abort();
    info!(client = id, total, "websocket client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::JsonEncoder;

    fn server(port: u16) -> WebSocketServer {
        WebSocketServer::new("127.0.0.1", port, Arc::new(JsonEncoder))
    }

    #[tokio::test]
    async fn test_bind_conflict_fails_fast() {
        let holder = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = holder.local_addr().unwrap().port();

        let ws = server(port);
        let started = tokio::time::timeout(
            Duration::from_millis(500),
            ws.start(CancellationToken::new()),
        )
        .await
        .expect("bind did not resolve promptly");
        assert!(matches!(started, Err(MockError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_status_page_reports_endpoint_and_clients() {
        use axum::body::Body;
        use axum::http::Request;
        use http_body_util::BodyExt;
        use tower::ServiceExt;

        let ws = WebSocketServer::new("127.0.0.1", 8787, Arc::new(JsonEncoder));
        let response = ws
            .router()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), axum::http::StatusCode::OK);
        assert!(response
            .headers()
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/plain"));

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("ws://127.0.0.1:8787/hsi"));
        assert!(text.contains("Connected clients: 0"));
    }

    #[tokio::test]
    async fn test_broadcast_with_no_clients_is_noop() {
        let ws = server(0);
        assert_eq!(ws.client_count(), 0);
        ws.broadcast_bytes(b"{}").await.unwrap();
    }

    #[tokio::test]
    async fn test_stale_client_is_removed_on_broadcast() {
        let ws = server(0);

        // Register a client whose receiver is already gone.
        let (tx, rx) = mpsc::channel::<Message>(1);
        drop(rx);
        ws.shared.clients.write().unwrap().insert(9, tx);
        assert_eq!(ws.client_count(), 1);

        ws.broadcast_bytes(b"{}").await.unwrap();
        assert_eq!(ws.client_count(), 0);
    }

    #[tokio::test]
    async fn test_queue_full_drops_client() {
        let ws = server(0);

        let (tx, _rx) = mpsc::channel::<Message>(1);
        ws.shared.clients.write().unwrap().insert(4, tx);

        // First send fills the one-slot queue, second overflows it.
        ws.broadcast_bytes(b"{}").await.unwrap();
        assert_eq!(ws.client_count(), 1);
        ws.broadcast_bytes(b"{}").await.unwrap();
        assert_eq!(ws.client_count(), 0);
    }
}
