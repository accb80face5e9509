//! Seam between the connection manager and the MQTT client library
//!
//! The manager never speaks the protocol itself. It asks a [`Connector`] for a
//! connected [`Session`] and drives that session; inbound traffic comes back
//! through an [`EventSink`] handed over at connect time.
//!
//! ```text
//! ConnectionManager ──open──► Connector ──► Session (subscribe/publish/...)
//!        ▲                                     │
//!        └────────── EventSink ◄── I/O thread ─┘
//! ```

use std::sync::Arc;
use std::time::Duration;

pub use rumqttc::QoS;

use super::error::TransportError;

/// Options for opening one session, derived from parameters plus config
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionOptions {
    pub host: String,
    pub port: String,
    pub client_id: String,
    pub username: String,
    pub password: String,
    pub clean_session: bool,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
    /// Capacity of the request queue between caller and protocol loop
    pub request_capacity: usize,
}

/// Receiver for notifications raised on the transport's I/O thread
pub trait EventSink: Send + Sync {
    fn on_message(&self, topic: &str, payload: &[u8]);

    fn on_connection_lost(&self, cause: &TransportError);
}

/// Factory for broker sessions
pub trait Connector: Send + Sync {
    type Session: Session;

    /// Opens a session and blocks until the broker acknowledged it, the
    /// attempt failed, or `options.connect_timeout` elapsed.
    fn open(
        &self,
        options: &SessionOptions,
        events: Arc<dyn EventSink>,
    ) -> Result<Self::Session, TransportError>;
}

/// One live broker session
pub trait Session: Send {
    fn is_connected(&self) -> bool;

    fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), TransportError>;

    /// Batch subscribe; each topic carries its own QoS.
    fn subscribe_many(&mut self, filters: &[(String, QoS)]) -> Result<(), TransportError>;

    fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError>;

    fn unsubscribe_many(&mut self, topics: &[String]) -> Result<(), TransportError>;

    fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS) -> Result<(), TransportError>;

    /// Stops inbound delivery to the sink. Must be called before `disconnect`.
    fn detach(&mut self);

    fn disconnect(&mut self) -> Result<(), TransportError>;

    /// Releases every resource the session holds.
    fn release(self) -> Result<(), TransportError>;
}
