//! Server-Sent Events broadcast transport.
//!
//! `GET /hsi/sse` opens a stream of `data: <payload>\n\n` frames.
//! Each client gets a bounded buffer; a full buffer drops the frame
//! for that client silently.

use std::collections::HashMap;
use std::convert::Infallible;
use std::future::IntoFuture;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use axum::extract::State;
use axum::http::header;
use axum::response::sse::{Event as SseFrame, Sse};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{Broadcaster, SHUTDOWN_GRACE};
use crate::encoding::Encoder;
use crate::error::MockError;
use crate::event::Event;

/// Per-client frame buffer capacity
const CLIENT_BUFFER_CAPACITY: usize = 100;

struct SseShared {
    clients: RwLock<HashMap<u64, mpsc::Sender<String>>>,
    next_id: AtomicU64,
    host: String,
    port: u16,
}

/// Broadcasts envelopes over Server-Sent Events
pub struct SseServer {
    encoder: Arc<dyn Encoder>,
    shared: Arc<SseShared>,
}

impl SseServer {
    pub fn new(host: &str, port: u16, encoder: Arc<dyn Encoder>) -> Self {
        SseServer {
            encoder,
            shared: Arc::new(SseShared {
                clients: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                host: host.to_string(),
                port,
            }),
        }
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/hsi/sse", get(stream_handler))
            .route("/", get(status_page))
            .with_state(self.shared.clone())
    }
}

#[async_trait]
impl Broadcaster for SseServer {
    async fn start(&self, cancel: CancellationToken) -> Result<(), MockError> {
        let addr = format!("{}:{}", self.shared.host, self.shared.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|source| MockError::Bind {
                addr: addr.clone(),
                source,
            })?;

        let app = self.router();

        info!(endpoint = %self.address(), "sse server listening");

        let shared = self.shared.clone();
        tokio::spawn(async move {
            let serve = axum::serve(listener, app)
                .with_graceful_shutdown(cancel.clone().cancelled_owned())
                .into_future();
            tokio::select! {
                result = serve => {
                    if let Err(error) = result {
                        warn!(%error, "sse server terminated");
                    }
                }
                _ = async {
                    cancel.cancelled().await;
                    shared.clients.write().unwrap().clear();
                    tokio::time::sleep(SHUTDOWN_GRACE).await;
                } => {
                    debug!("sse shutdown grace expired");
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
        let text = String::from_utf8_lossy(payload).into_owned();

        let clients: Vec<(u64, mpsc::Sender<String>)> = {
            let guard = self.shared.clients.read().unwrap();
            if guard.is_empty() {
                return Ok(());
            }
            guard.iter().map(|(id, tx)| (*id, tx.clone())).collect()
        };

        let mut closed = Vec::new();
        for (id, tx) in clients {
            match tx.try_send(text.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    // Slow reader: silently drop this frame for them.
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(id),
            }
        }

        if !closed.is_empty() {
            let mut guard = self.shared.clients.write().unwrap();
            for id in closed {
                guard.remove(&id);
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
        format!("http://{}:{}/hsi/sse", self.shared.host, self.shared.port)
    }
}

struct ClientGuard {
    id: u64,
    shared: Arc<SseShared>,
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        let mut guard = self.shared.clients.write().unwrap();
        if guard.remove(&self.id).is_some() {
            info!(client = self.id, total = guard.len(), "sse client disconnected");
        }
    }
}

async fn stream_handler(State(shared): State<Arc<SseShared>>) -> impl IntoResponse {
    let id = shared.next_id.fetch_add(1, Ordering::Relaxed);
    let (tx, rx) = mpsc::channel::<String>(CLIENT_BUFFER_CAPACITY);
    let total = {
        let mut guard = shared.clients.write().unwrap();
        guard.insert(id, tx);
        guard.len()
    };
    info!(client = id, total, "sse client connected");

    // The guard lives inside the stream closure; dropping the stream
    // on disconnect removes the client from the registry.
    let guard = ClientGuard {
        id,
        shared: shared.clone(),
    };
    let stream = ReceiverStream::new(rx).map(move |payload| {
        let _keep = &guard;
        Ok::<SseFrame, Infallible>(SseFrame::default().data(payload))
    });

    (
        [
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        ],
        Sse::new(stream),
    )
}

async fn status_page(State(shared): State<Arc<SseShared>>) -> impl IntoResponse {
    let body = format!(
        "Synheart SSE Server\n\nEndpoint: http://{}:{}/hsi/sse\n",
        shared.host, shared.port
    );
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body)
}
