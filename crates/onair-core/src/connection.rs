//! Connection handles and their role metadata.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{RelayError, RelayResult};

/// Query value that marks a consumer as a UI display.
pub const UI_MARKER: &str = "ui";

/// Kind of consumer on the other end of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientRole {
    Ui,
    External,
}

impl ClientRole {
    /// Classify from the `client` query parameter. Anything but the UI
    /// marker, including absence, is an external integration.
    pub fn from_query(value: Option<&str>) -> Self {
        match value {
            Some(UI_MARKER) => Self::Ui,
            _ => Self::External,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ui => "ui",
            Self::External => "external",
        }
    }
}

impl fmt::Display for ClientRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unique identity of a registered connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Metadata attached at registration time. Never mutated afterwards.
#[derive(Clone, Debug, Serialize)]
pub struct ConnectionMetadata {
    pub role: ClientRole,
    pub connected_at: DateTime<Utc>,
}

impl ConnectionMetadata {
    pub fn new(role: ClientRole) -> Self {
        Self {
            role,
            connected_at: Utc::now(),
        }
    }

    /// Time since registration.
    pub fn age(&self) -> Duration {
        (Utc::now() - self.connected_at).to_std().unwrap_or_default()
    }
}

/// Write side of a duplex channel to one consumer.
///
/// Implementations must serialize their own writes: two callers awaiting
/// `send_text` on the same transport must never interleave frames.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver one text frame.
    async fn send_text(&self, text: &str) -> RelayResult<()>;

    /// Close the channel. Closing twice is harmless.
    async fn close(&self);
}

/// A live consumer: identity, role and transport.
pub struct Connection {
    id: ConnectionId,
    meta: ConnectionMetadata,
    transport: Box<dyn Transport>,
}

impl Connection {
    pub fn new(role: ClientRole, transport: impl Transport + 'static) -> Self {
        Self {
            id: ConnectionId::new(),
            meta: ConnectionMetadata::new(role),
            transport: Box::new(transport),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn meta(&self) -> &ConnectionMetadata {
        &self.meta
    }

    pub fn role(&self) -> ClientRole {
        self.meta.role
    }

    /// Send a text frame, optionally bounded by a deadline.
    pub async fn send(&self, text: &str, deadline: Option<Duration>) -> RelayResult<()> {
        match deadline {
            Some(limit) => tokio::time::timeout(limit, self.transport.send_text(text))
                .await
                .map_err(|_| RelayError::SendTimeout)?,
            None => self.transport.send_text(text).await,
        }
    }

    pub async fn close(&self) {
        self.transport.close().await;
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}
