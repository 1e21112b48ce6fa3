//! Registry of live connections and best-effort fan-out.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::connection::{ClientRole, Connection, ConnectionId};
use crate::message::BroadcastMessage;

/// Default bound on a single send to one consumer.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Tunables for the registry.
#[derive(Clone, Debug)]
pub struct RegistryConfig {
    /// Per-connection send deadline. `None` waits indefinitely.
    pub send_timeout: Option<Duration>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            send_timeout: Some(DEFAULT_SEND_TIMEOUT),
        }
    }
}

/// Point-in-time connection counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub total: usize,
    pub ui: usize,
}

impl RegistryStats {
    pub fn external(&self) -> usize {
        self.total - self.ui
    }
}

/// Outcome of one broadcast.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub attempted: usize,
    pub delivered: usize,
    pub evicted: usize,
}

/// Concurrent set of live connections.
///
/// The map lock is only ever held for in-memory work. Network I/O happens
/// on a snapshot taken under the read lock and released before sending.
pub struct Registry {
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
    config: RegistryConfig,
}

impl Registry {
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Register a connection. Re-adding the same id overwrites it.
    pub fn add(&self, connection: Arc<Connection>) {
        let id = connection.id();
        let role = connection.role();
        let mut conns = self.connections.write();
        if conns.insert(id, connection).is_some() {
            warn!(conn_id = %id, "connection registered twice");
        }
        debug!(conn_id = %id, %role, total = conns.len(), "connection registered");
    }

    /// Deregister a connection. Removing an unknown id is a no-op.
    pub fn remove(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        let removed = self.connections.write().remove(&id);
        if removed.is_some() {
            debug!(conn_id = %id, "connection removed");
        }
        removed
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.read().contains_key(&id)
    }

    /// Count connections by role in a single scan.
    pub fn stats(&self) -> RegistryStats {
        let conns = self.connections.read();
        let ui = conns
            .values()
            .filter(|c| c.role() == ClientRole::Ui)
            .count();
        RegistryStats {
            total: conns.len(),
            ui,
        }
    }

    /// Copy out the current set of handles.
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections.read().values().cloned().collect()
    }

    /// Remove a connection and close its transport.
    pub async fn evict(&self, connection: &Connection) {
        self.remove(connection.id());
        connection.close().await;
    }

    /// Deliver a message to every connection registered right now.
    ///
    /// Each snapshotted connection gets exactly one attempt. Connections
    /// whose send fails are evicted; the rest still receive the message.
    pub async fn broadcast(&self, message: &BroadcastMessage) -> BroadcastReport {
        let wire = match message.to_wire() {
            Ok(wire) => wire,
            Err(e) => {
                error!(kind = message.kind(), error = %e, "dropping broadcast");
                return BroadcastReport::default();
            }
        };
        self.broadcast_text(&wire).await
    }

    async fn broadcast_text(&self, wire: &str) -> BroadcastReport {
        let recipients = self.snapshot();
        let deadline = self.config.send_timeout;

        let outcomes = join_all(recipients.iter().map(|conn| async move {
            match conn.send(wire, deadline).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(
                        conn_id = %conn.id(),
                        role = %conn.role(),
                        error = %e,
                        "send failed, evicting"
                    );
                    self.evict(conn).await;
                    false
                }
            }
        }))
        .await;

        let delivered = outcomes.iter().filter(|ok| **ok).count();
        let report = BroadcastReport {
            attempted: outcomes.len(),
            delivered,
            evicted: outcomes.len() - delivered,
        };
        info!(
            recipients = report.attempted,
            delivered = report.delivered,
            evicted = report.evicted,
            "broadcast complete"
        );
        report
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Transport;
    use crate::error::{RelayError, RelayResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    struct FakeTransport {
        tx: mpsc::UnboundedSender<String>,
        fail: bool,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn send_text(&self, text: &str) -> RelayResult<()> {
            if self.fail {
                return Err(RelayError::transport("broken pipe"));
            }
            self.tx
                .send(text.to_string())
                .map_err(RelayError::transport)
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    struct Peer {
        conn: Arc<Connection>,
        rx: mpsc::UnboundedReceiver<String>,
        closed: Arc<AtomicBool>,
    }

    fn peer(role: ClientRole, fail: bool) -> Peer {
        let (tx, rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let transport = FakeTransport {
            tx,
            fail,
            closed: closed.clone(),
        };
        Peer {
            conn: Arc::new(Connection::new(role, transport)),
            rx,
            closed,
        }
    }

    #[test]
    fn test_stats_track_add_and_remove() {
        let registry = Registry::new();
        let a = peer(ClientRole::Ui, false);
        let b = peer(ClientRole::External, false);
        let c = peer(ClientRole::Ui, false);
        registry.add(a.conn.clone());
        registry.add(b.conn.clone());
        registry.add(c.conn.clone());

        let stats = registry.stats();
        assert_eq!(stats, RegistryStats { total: 3, ui: 2 });
        assert_eq!(stats.external(), 1);

        registry.remove(a.conn.id());
        let stats = registry.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.ui + stats.external(), stats.total);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let registry = Registry::new();
        let a = peer(ClientRole::External, false);
        registry.add(a.conn.clone());

        assert!(registry.remove(ConnectionId::new()).is_none());
        assert_eq!(registry.stats().total, 1);

        assert!(registry.remove(a.conn.id()).is_some());
        assert!(registry.remove(a.conn.id()).is_none());
        assert_eq!(registry.stats(), RegistryStats::default());
    }

    #[test]
    fn test_readd_same_connection_overwrites() {
        let registry = Registry::new();
        let a = peer(ClientRole::Ui, false);
        registry.add(a.conn.clone());
        registry.add(a.conn.clone());
        assert_eq!(registry.stats().total, 1);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_everyone() {
        let registry = Registry::new();
        let mut peers: Vec<Peer> = [
            ClientRole::Ui,
            ClientRole::External,
            ClientRole::Ui,
            ClientRole::External,
        ]
        .into_iter()
        .map(|role| peer(role, false))
        .collect();
        for p in &peers {
            registry.add(p.conn.clone());
        }

        let report = registry.broadcast(&BroadcastMessage::chat("hello")).await;
        assert_eq!(report, BroadcastReport { attempted: 4, delivered: 4, evicted: 0 });

        for p in &mut peers {
            assert_eq!(p.rx.try_recv().unwrap(), r#"{"type":"chat","text":"hello"}"#);
            assert!(p.rx.try_recv().is_err());
        }
    }

    #[tokio::test]
    async fn test_broadcast_evicts_only_failing_connections() {
        let registry = Registry::new();
        let mut good: Vec<Peer> = (0..3).map(|_| peer(ClientRole::Ui, false)).collect();
        let bad: Vec<Peer> = (0..2).map(|_| peer(ClientRole::External, true)).collect();
        for p in good.iter().chain(bad.iter()) {
            registry.add(p.conn.clone());
        }

        let report = registry.broadcast(&BroadcastMessage::chat("hi")).await;
        assert_eq!(report.attempted, 5);
        assert_eq!(report.evicted, 2);
        assert_eq!(report.delivered, 3);

        assert_eq!(registry.stats(), RegistryStats { total: 3, ui: 3 });
        for p in &bad {
            assert!(!registry.contains(p.conn.id()));
            assert!(p.closed.load(Ordering::SeqCst));
        }
        for p in &mut good {
            assert!(registry.contains(p.conn.id()));
            assert!(!p.closed.load(Ordering::SeqCst));
            assert!(p.rx.try_recv().is_ok());
        }
    }

    #[tokio::test]
    async fn test_broadcast_with_no_connections() {
        let registry = Registry::new();
        let report = registry.broadcast(&BroadcastMessage::chat("anyone?")).await;
        assert_eq!(report, BroadcastReport::default());
    }

    /// Registers a late joiner the first time it is written to, i.e. after
    /// the broadcast snapshot has been taken.
    struct JoinOnSend {
        registry: Arc<Registry>,
        late: parking_lot::Mutex<Option<Arc<Connection>>>,
        sends: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Transport for JoinOnSend {
        async fn send_text(&self, _text: &str) -> RelayResult<()> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            if let Some(late) = self.late.lock().take() {
                self.registry.add(late);
            }
            Ok(())
        }

        async fn close(&self) {}
    }

    #[tokio::test]
    async fn test_late_joiner_misses_in_flight_broadcast() {
        let registry = Arc::new(Registry::new());
        let mut late = peer(ClientRole::Ui, false);
        let sends = Arc::new(AtomicUsize::new(0));
        let trigger = Arc::new(Connection::new(
            ClientRole::External,
            JoinOnSend {
                registry: registry.clone(),
                late: parking_lot::Mutex::new(Some(late.conn.clone())),
                sends: sends.clone(),
            },
        ));
        registry.add(trigger);

        let report = registry.broadcast(&BroadcastMessage::chat("first")).await;
        assert_eq!(report.attempted, 1);
        assert_eq!(sends.load(Ordering::SeqCst), 1);
        assert!(registry.contains(late.conn.id()));
        assert!(late.rx.try_recv().is_err());

        let report = registry.broadcast(&BroadcastMessage::chat("second")).await;
        assert_eq!(report.attempted, 2);
        assert_eq!(late.rx.try_recv().unwrap(), r#"{"type":"chat","text":"second"}"#);
    }

    struct StalledTransport;

    #[async_trait]
    impl Transport for StalledTransport {
        async fn send_text(&self, _text: &str) -> RelayResult<()> {
            std::future::pending::<()>().await;
            Ok(())
        }

        async fn close(&self) {}
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_send_is_evicted_after_deadline() {
        let registry = Registry::with_config(RegistryConfig {
            send_timeout: Some(Duration::from_millis(50)),
        });
        let stalled = Arc::new(Connection::new(ClientRole::External, StalledTransport));
        let mut healthy = peer(ClientRole::Ui, false);
        registry.add(stalled.clone());
        registry.add(healthy.conn.clone());

        let report = registry.broadcast(&BroadcastMessage::chat("tick")).await;
        assert_eq!(report.evicted, 1);
        assert!(!registry.contains(stalled.id()));
        assert!(healthy.rx.try_recv().is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_register_remove_and_broadcast() {
        let registry = Arc::new(Registry::new());
        let mut tasks = Vec::new();

        for i in 0..32 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let role = if i % 3 == 0 {
                    ClientRole::Ui
                } else {
                    ClientRole::External
                };
                let p = peer(role, i % 5 == 0);
                registry.add(p.conn.clone());
                registry.broadcast(&BroadcastMessage::chat(format!("m{i}"))).await;
                if i % 2 == 0 {
                    registry.remove(p.conn.id());
                }
                // Receivers must outlive the broadcasts for healthy peers.
                tokio::task::yield_now().await;
                p
            }));
        }

        let mut peers = Vec::new();
        for task in tasks {
            peers.push(task.await.unwrap());
        }

        let expected = peers
            .iter()
            .filter(|p| registry.contains(p.conn.id()))
            .count();
        let stats = registry.stats();
        assert_eq!(stats.total, expected);
        assert_eq!(stats.ui + stats.external(), stats.total);
        for p in peers.iter().filter(|p| registry.contains(p.conn.id())) {
            assert!(!p.closed.load(Ordering::SeqCst));
        }
    }
}
