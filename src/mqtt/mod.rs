//! # MQTT Session Module
//!
//! Keeps exactly one MQTT broker session alive on behalf of the rest of the
//! application and shields callers from transport errors. Callers connect,
//! subscribe and publish through [`ConnectionManager`]; inbound messages reach
//! them through registered [`MessageListener`]s.
//!
//! ## Module Architecture
//!
//! ```text
//! mqtt/
//! ├── config.rs              - Session tuning (keep-alive, QoS, timeouts)
//! ├── connection_manager.rs  - Session state machine and listener fan-out
//! ├── error.rs               - Transport and manager error types
//! ├── listener.rs            - Listener trait and registry
//! ├── message.rs             - Timestamped message records
//! ├── params.rs              - Connection parameters
//! ├── rumqtt.rs              - Transport over rumqttc
//! ├── status.rs              - Connection state and counters
//! └── transport.rs           - Connector / Session / EventSink seam
//! ```
//!
//! ## Behavior Summary
//!
//! - Connecting twice with identical parameters is a no-op success
//! - Connecting with new parameters closes the old session first
//! - Publish and subscribe silently do nothing while disconnected
//! - A failed publish closes the session; the caller reconnects when it wants
//! - A failing listener never keeps the others from seeing a message

pub mod config;
pub mod connection_manager;
pub mod error;
pub mod listener;
pub mod message;
pub mod params;
pub mod rumqtt;
pub mod status;
pub mod transport;

pub use config::MqttConfig;
pub use connection_manager::ConnectionManager;
pub use error::{ManagerError, TransportError};
pub use listener::{ListenerRegistry, MessageListener};
pub use message::MqttMessage;
pub use params::ConnectionParameters;
pub use rumqtt::{RumqttConnector, RumqttSession};
pub use status::{ConnectionState, MqttStatus};
pub use transport::{Connector, EventSink, QoS, Session, SessionOptions};
