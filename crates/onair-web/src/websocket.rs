//! WebSocket endpoint for consumers.
//!
//! Each upgraded socket is registered with its role, then a receive loop
//! runs purely to notice when the peer goes away. Anything the peer sends
//! is ignored.

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{
            close_code, rejection::WebSocketUpgradeRejection, CloseFrame, Message,
            WebSocketUpgrade,
        },
        Query, State,
    },
    response::{IntoResponse, Response},
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use onair_core::{
    ClientRole, Connection, ConnectionId, ConnectionMetadata, RelayError, RelayResult, Registry,
    Transport,
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::state::AppState;

/// Query parameter that selects the consumer role.
pub const ROLE_PARAM: &str = "client";

/// Upper bound on flushing a close frame to a stuck peer.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// GET /direct-speech - WebSocket upgrade handler.
pub async fn ws_handler(
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<AppState>,
) -> Response {
    let ws = match upgrade {
        Ok(ws) => ws,
        Err(rejection) => {
            warn!(error = %rejection, "WebSocket upgrade failed");
            return rejection.into_response();
        }
    };

    let role = ClientRole::from_query(params.get(ROLE_PARAM).map(String::as_str));
    let registry = state.registry.clone();
    ws.on_failed_upgrade(|e| warn!(error = %e, "WebSocket upgrade failed"))
        .on_upgrade(move |socket| {
            let (sender, receiver) = socket.split();
            handle_connection(sender, receiver, role, registry)
        })
}

/// Run one consumer connection until it ends.
///
/// The loop stops on a read error, a close frame, end of stream, or when
/// the transport is closed from the registry side (eviction).
async fn handle_connection<Si, St>(
    sender: Si,
    mut receiver: St,
    role: ClientRole,
    registry: Arc<Registry>,
) where
    Si: Sink<Message> + Unpin + Send + 'static,
    Si::Error: Display + Send,
    St: Stream<Item = Result<Message, axum::Error>> + Unpin + Send,
{
    let closed = CancellationToken::new();
    let transport = WsTransport::new(sender, closed.clone());
    let connection = Arc::new(Connection::new(role, transport));
    let registration = Registration::register(registry, connection);
    let conn_id = registration.id();
    info!(%conn_id, %role, "client connected");

    loop {
        let frame = tokio::select! {
            _ = closed.cancelled() => {
                debug!(%conn_id, "transport closed by relay");
                break;
            }
            frame = receiver.next() => frame,
        };
        match frame {
            Some(Ok(Message::Close(frame))) => {
                log_close(conn_id, frame.as_ref());
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!(%conn_id, error = %e, "socket error");
                break;
            }
            None => {
                debug!(%conn_id, "stream ended");
                break;
            }
        }
    }

    let uptime = registration.meta().age();
    registration.release().await;
    info!(%conn_id, %role, ?uptime, "client disconnected");
}

fn log_close(conn_id: ConnectionId, frame: Option<&CloseFrame>) {
    match frame {
        None => debug!(%conn_id, "client closed without status"),
        Some(f) if f.code == close_code::NORMAL || f.code == close_code::AWAY => {
            debug!(%conn_id, code = f.code, "client closed")
        }
        Some(f) => warn!(
            %conn_id,
            code = f.code,
            reason = f.reason.as_str(),
            "client closed abnormally"
        ),
    }
}

/// Keeps a connection registered for as long as it is alive.
///
/// `release` deregisters and closes the transport. If the owning task is
/// cancelled or panics first, `Drop` still deregisters and schedules the
/// close.
struct Registration {
    registry: Arc<Registry>,
    connection: Arc<Connection>,
    released: bool,
}

impl Registration {
    fn register(registry: Arc<Registry>, connection: Arc<Connection>) -> Self {
        registry.add(connection.clone());
        Self {
            registry,
            connection,
            released: false,
        }
    }

    fn id(&self) -> ConnectionId {
        self.connection.id()
    }

    fn meta(&self) -> &ConnectionMetadata {
        self.connection.meta()
    }

    async fn release(mut self) {
        self.released = true;
        self.registry.evict(&self.connection).await;
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.registry.remove(self.connection.id());
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let connection = self.connection.clone();
            handle.spawn(async move { connection.close().await });
        }
    }
}

/// Write half of a WebSocket.
///
/// The mutex keeps concurrent broadcasts from interleaving frames on the
/// same socket. Closing cancels `closed`, which ends the receive loop so
/// both halves of the socket get dropped even if the close frame cannot
/// be flushed.
pub struct WsTransport<Si> {
    sender: Mutex<Si>,
    closed: CancellationToken,
}

impl<Si> WsTransport<Si> {
    pub fn new(sender: Si, closed: CancellationToken) -> Self {
        Self {
            sender: Mutex::new(sender),
            closed,
        }
    }
}

#[async_trait]
impl<Si> Transport for WsTransport<Si>
where
    Si: Sink<Message> + Unpin + Send + 'static,
    Si::Error: Display + Send,
{
    async fn send_text(&self, text: &str) -> RelayResult<()> {
        self.sender
            .lock()
            .await
            .send(Message::Text(text.to_owned().into()))
            .await
            .map_err(RelayError::transport)
    }

    async fn close(&self) {
        self.closed.cancel();
        let mut sender = self.sender.lock().await;
        match tokio::time::timeout(CLOSE_TIMEOUT, sender.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "close on finished socket"),
            Err(_) => debug!("timed out closing socket"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc;
    use onair_core::{BroadcastMessage, RegistryConfig};

    fn silent_peer() -> futures::stream::Pending<Result<Message, axum::Error>> {
        futures::stream::pending()
    }

    async fn wait_for_total(registry: &Registry, total: usize) {
        for _ in 0..100 {
            if registry.stats().total == total {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("registry never reached {total} connections");
    }

    #[tokio::test]
    async fn test_stalled_consumer_eviction_ends_lifecycle() {
        let registry = Arc::new(Registry::with_config(RegistryConfig {
            send_timeout: Some(Duration::from_millis(50)),
        }));
        // The peer never reads, so sends stall once the buffer is full.
        let (tx, _rx) = mpsc::channel::<Message>(1);
        let task = tokio::spawn(handle_connection(
            tx,
            silent_peer(),
            ClientRole::External,
            registry.clone(),
        ));
        wait_for_total(&registry, 1).await;

        let mut evicted = 0;
        for i in 0..5 {
            let report = registry.broadcast(&BroadcastMessage::chat(format!("m{i}"))).await;
            evicted += report.evicted;
            if report.attempted == 0 {
                break;
            }
        }
        assert_eq!(evicted, 1);

        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("lifecycle task should end after eviction")
            .unwrap();
        assert_eq!(registry.stats().total, 0);
    }

    #[tokio::test]
    async fn test_failed_send_eviction_ends_lifecycle() {
        let registry = Arc::new(Registry::new());
        let (tx, rx) = mpsc::channel::<Message>(8);
        let task = tokio::spawn(handle_connection(
            tx,
            silent_peer(),
            ClientRole::Ui,
            registry.clone(),
        ));
        wait_for_total(&registry, 1).await;

        drop(rx);
        let report = registry.broadcast(&BroadcastMessage::chat("gone")).await;
        assert_eq!(report.evicted, 1);

        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("lifecycle task should end after eviction")
            .unwrap();
        assert_eq!(registry.stats().total, 0);
    }

    #[tokio::test]
    async fn test_stream_end_deregisters() {
        let registry = Arc::new(Registry::new());
        let (tx, _rx) = mpsc::channel::<Message>(8);
        let frames = futures::stream::iter(vec![Ok(Message::Text("hi".to_string().into()))]);
        handle_connection(tx, frames, ClientRole::Ui, registry.clone()).await;
        assert_eq!(registry.stats().total, 0);
    }
}
