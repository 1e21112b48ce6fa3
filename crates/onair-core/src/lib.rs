//! OnAir Core Library
//!
//! Connection registry, broadcast fan-out and wire messages for the
//! on-air trigger relay.

pub mod connection;
pub mod error;
pub mod message;
pub mod notifier;
pub mod registry;

pub use connection::{ClientRole, Connection, ConnectionId, ConnectionMetadata, Transport};
pub use error::{RelayError, RelayResult};
pub use message::{BroadcastMessage, StatusReport, TriggerAck};
pub use notifier::TriggerClient;
pub use registry::{BroadcastReport, Registry, RegistryConfig, RegistryStats};
