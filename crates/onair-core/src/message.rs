//! Wire messages and trigger validation.

use serde::{Deserialize, Serialize};

use crate::error::{RelayError, RelayResult};
use crate::registry::RegistryStats;

/// Error text returned when a trigger carries no usable text.
pub const EMPTY_TEXT_MESSAGE: &str = "`text` field must be a non-empty string";

/// Messages pushed to every connected consumer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BroadcastMessage {
    /// A line of speech for the avatar to display or read out.
    Chat { text: String },
}

impl BroadcastMessage {
    pub fn chat(text: impl Into<String>) -> Self {
        Self::Chat { text: text.into() }
    }

    /// Short label used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Chat { .. } => "chat",
        }
    }

    /// Encode to the text frame sent over the wire.
    pub fn to_wire(&self) -> RelayResult<String> {
        serde_json::to_string(self).map_err(RelayError::Serialization)
    }
}

/// Body accepted by the trigger endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct TriggerRequest {
    #[serde(default)]
    pub text: Option<String>,
}

impl TriggerRequest {
    /// Parse a raw request body. Content type is not consulted.
    pub fn from_slice(body: &[u8]) -> RelayResult<Self> {
        serde_json::from_slice(body).map_err(RelayError::InvalidJson)
    }

    /// Normalize into the message that gets broadcast.
    pub fn into_message(self) -> RelayResult<BroadcastMessage> {
        let text = self.text.as_deref().map(str::trim).unwrap_or_default();
        if text.is_empty() {
            return Err(RelayError::validation(EMPTY_TEXT_MESSAGE));
        }
        Ok(BroadcastMessage::chat(text))
    }
}

/// Parse and validate a trigger body in one step.
pub fn parse_trigger(body: &[u8]) -> RelayResult<BroadcastMessage> {
    TriggerRequest::from_slice(body)?.into_message()
}

/// Acknowledgment returned by the trigger endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerAck {
    pub ok: bool,
}

/// Connection counts reported by the status endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub total_connections: usize,
    pub ui_connections: usize,
    pub external_connections: usize,
}

impl From<RegistryStats> for StatusReport {
    fn from(stats: RegistryStats) -> Self {
        Self {
            total_connections: stats.total,
            ui_connections: stats.ui,
            external_connections: stats.external(),
        }
    }
}
