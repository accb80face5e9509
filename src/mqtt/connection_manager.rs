//! Single-session MQTT connection manager
//!
//! Owns at most one broker session, replaces it when the caller asks for a
//! different broker or identity, and fans inbound messages out to listeners.
//!
//! # State Machine
//!
//! ```text
//! Disconnected ──► Connecting ──► Connected ──► Disconnected   (close, publish error)
//!                      │              │
//!                      ▼              ▼
//!                    Failed         Failed                     (transport loss, subscribe error)
//! ```
//!
//! There is no reconnect loop. Recovery is always the caller calling
//! [`ConnectionManager::connect`] again.
//!
//! # Locking
//!
//! Every operation that inspects or changes the session holds one manager-wide
//! mutex for its whole check-and-act sequence. Inbound dispatch runs on the
//! transport's I/O thread and never takes that mutex, so listeners may call
//! back into the manager.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

use super::config::MqttConfig;
use super::error::{ManagerError, TransportError};
use super::listener::{ListenerRegistry, MessageListener};
use super::params::ConnectionParameters;
use super::status::{ConnectionState, MqttStatus, StatusTracker};
use super::transport::{Connector, EventSink, QoS, Session};

struct ActiveSession<S> {
    params: ConnectionParameters,
    session: S,
}

/// State reachable from the transport's I/O thread
struct Shared {
    listeners: ListenerRegistry,
    status: Mutex<StatusTracker>,
}

impl Shared {
    fn status(&self) -> MutexGuard<'_, StatusTracker> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_error(&self, error: &ManagerError) {
        self.status().status_mut().record_error(error.to_string());
    }
}

impl EventSink for Shared {
    fn on_message(&self, topic: &str, payload: &[u8]) {
        self.status().status_mut().record_received();
        let delivered = self.listeners.dispatch(topic, payload);
        trace!(
            "Dispatched {} bytes on {} to {} listeners",
            payload.len(),
            topic,
            delivered
        );
    }

    fn on_connection_lost(&self, cause: &TransportError) {
        warn!("Connection lost: {}", cause);
        let mut status = self.status();
        status
            .status_mut()
            .record_error(format!("connection lost: {}", cause));
        status.set_state(ConnectionState::Failed);
    }
}

pub struct ConnectionManager<C: Connector> {
    connector: C,
    config: MqttConfig,
    active: Mutex<Option<ActiveSession<C::Session>>>,
    shared: Arc<Shared>,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C, config: MqttConfig) -> Self {
        Self {
            connector,
            config,
            active: Mutex::new(None),
            shared: Arc::new(Shared {
                listeners: ListenerRegistry::new(),
                status: Mutex::new(StatusTracker::new()),
            }),
        }
    }

    pub fn config(&self) -> &MqttConfig {
        &self.config
    }

    /// Connects to `tcp://<host>:<port>`; see [`ConnectionManager::try_connect`].
    pub fn connect(
        &self,
        host: &str,
        port: &str,
        client_id: &str,
        username: &str,
        password: &str,
    ) -> bool {
        let params = ConnectionParameters::new(host, port, client_id, username, password);
        self.try_connect(params).is_ok()
    }

    /// Establishes a session for `params`, blocking until the broker answers.
    ///
    /// Returns immediately when already connected with identical parameters.
    /// Any other existing session is closed first. On failure no session is
    /// left behind.
    pub fn try_connect(&self, params: ConnectionParameters) -> Result<(), ManagerError> {
        let mut active = self.lock_active();

        if let Some(current) = active.as_ref() {
            if current.params == params && current.session.is_connected() {
                debug!("Already connected to {}", params.server_uri());
                return Ok(());
            }
        }

        if let Some(stale) = active.take() {
            info!(
                "Closing session to {} before connecting to {}",
                stale.params.server_uri(),
                params.server_uri()
            );
            self.teardown(stale);
        }

        if let Err(e) = params.validate() {
            warn!("Rejecting connect: {}", e);
            self.shared.record_error(&e);
            return Err(e);
        }

        self.shared.status().set_state(ConnectionState::Connecting);
        let options = self.config.session_options(&params);
        let sink: Arc<dyn EventSink> = self.shared.clone();

        match self.connector.open(&options, sink) {
            Ok(session) => {
                info!("Session established with {}", params.server_uri());
                *active = Some(ActiveSession { params, session });
                self.shared.status().set_state(ConnectionState::Connected);
                Ok(())
            }
            Err(source) => {
                let e = ManagerError::Connect(source);
                error!("Connecting to {} failed: {}", params.server_uri(), e);
                let mut status = self.shared.status();
                status.status_mut().record_error(e.to_string());
                status.set_state(ConnectionState::Failed);
                Err(e)
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.lock_active()
            .as_ref()
            .is_some_and(|current| current.session.is_connected())
    }

    /// Parameters of the current session, if one exists
    pub fn parameters(&self) -> Option<ConnectionParameters> {
        self.lock_active()
            .as_ref()
            .map(|current| current.params.clone())
    }

    pub fn subscribe(&self, topic: &str) {
        self.subscribe_with_qos(topic, self.config.qos);
    }

    pub fn subscribe_with_qos(&self, topic: &str, qos: QoS) {
        let mut active = self.lock_active();
        let Some(current) = connected(&mut *active) else {
            debug!("Not connected, skipping subscribe to {}", topic);
            return;
        };

        match current.session.subscribe(topic, qos) {
            Ok(()) => debug!("Subscribed to {} with {:?}", topic, qos),
            Err(source) => self.mark_lost(ManagerError::Operation {
                operation: "subscribe",
                source,
            }),
        }
    }

    pub fn subscribe_many<S: AsRef<str>>(&self, topics: &[S]) {
        self.subscribe_many_with_qos(topics, self.config.qos);
    }

    /// Subscribes every topic in one request, all with `qos`.
    pub fn subscribe_many_with_qos<S: AsRef<str>>(&self, topics: &[S], qos: QoS) {
        if topics.is_empty() {
            return;
        }
        let mut active = self.lock_active();
        let Some(current) = connected(&mut *active) else {
            debug!("Not connected, skipping subscribe to {} topics", topics.len());
            return;
        };

        let filters: Vec<(String, QoS)> = topics
            .iter()
            .map(|topic| (topic.as_ref().to_string(), qos))
            .collect();
        match current.session.subscribe_many(&filters) {
            Ok(()) => debug!("Subscribed to {} topics with {:?}", filters.len(), qos),
            Err(source) => self.mark_lost(ManagerError::Operation {
                operation: "subscribe",
                source,
            }),
        }
    }

    pub fn unsubscribe(&self, topic: &str) {
        let mut active = self.lock_active();
        let Some(current) = active.as_mut() else {
            debug!("No session, skipping unsubscribe from {}", topic);
            return;
        };

        if let Err(source) = current.session.unsubscribe(topic) {
            self.log_failure(ManagerError::Operation {
                operation: "unsubscribe",
                source,
            });
        }
    }

    pub fn unsubscribe_many<S: AsRef<str>>(&self, topics: &[S]) {
        if topics.is_empty() {
            return;
        }
        let mut active = self.lock_active();
        let Some(current) = active.as_mut() else {
            debug!("No session, skipping unsubscribe from {} topics", topics.len());
            return;
        };

        let topics: Vec<String> = topics.iter().map(|t| t.as_ref().to_string()).collect();
        if let Err(source) = current.session.unsubscribe_many(&topics) {
            self.log_failure(ManagerError::Operation {
                operation: "unsubscribe",
                source,
            });
        }
    }

    /// Publishes raw bytes with the configured QoS.
    ///
    /// Does nothing while disconnected. A transport error closes the session.
    pub fn publish(&self, topic: &str, payload: &[u8]) {
        let mut active = self.lock_active();
        let Some(current) = connected(&mut *active) else {
            debug!("Not connected, dropping publish to {}", topic);
            return;
        };

        match current.session.publish(topic, payload, self.config.qos) {
            Ok(()) => {
                trace!("Published {} bytes to {}", payload.len(), topic);
                self.shared.status().status_mut().record_sent();
            }
            Err(source) => {
                let e = ManagerError::Operation {
                    operation: "publish",
                    source,
                };
                error!("Publish to {} failed, closing session: {}", topic, e);
                self.shared.record_error(&e);
                if let Some(broken) = active.take() {
                    self.teardown(broken);
                }
            }
        }
    }

    pub fn publish_str(&self, topic: &str, payload: &str) {
        self.publish(topic, payload.as_bytes());
    }

    /// Publishes a hex encoded payload such as `"0a1B"`.
    ///
    /// Strings that do not decode are dropped.
    pub fn publish_hex(&self, topic: &str, payload: &str) {
        match hex::decode(payload.trim()) {
            Ok(bytes) => self.publish(topic, &bytes),
            Err(e) => warn!("Dropping publish to {}: invalid hex payload: {}", topic, e),
        }
    }

    /// Delivers an inbound message to the listeners, returning how many accepted it.
    pub fn dispatch_incoming(&self, topic: &str, payload: &[u8]) -> usize {
        self.shared.status().status_mut().record_received();
        self.shared.listeners.dispatch(topic, payload)
    }

    /// Closes the current session. Calling it without a session is a no-op.
    pub fn close(&self) {
        let mut active = self.lock_active();
        match active.take() {
            Some(current) => self.teardown(current),
            None => debug!("No session to close"),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn MessageListener>) {
        self.shared.listeners.add(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn MessageListener>) -> bool {
        self.shared.listeners.remove(listener)
    }

    pub fn status(&self) -> MqttStatus {
        self.shared.status().snapshot()
    }

    /// Watch channel that sees every connection state change
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.status().subscribe()
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveSession<C::Session>>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Detach first so no message is delivered mid-teardown; each later step
    // runs even if the previous one failed.
    fn teardown(&self, current: ActiveSession<C::Session>) {
        let ActiveSession {
            params,
            mut session,
        } = current;

        session.detach();

        if let Err(source) = session.disconnect() {
            self.log_failure(ManagerError::Teardown {
                step: "disconnect",
                source,
            });
        }

        if let Err(source) = session.release() {
            self.log_failure(ManagerError::Teardown {
                step: "release",
                source,
            });
        }

        self.shared.status().set_state(ConnectionState::Disconnected);
        info!("Session to {} closed", params.server_uri());
    }

    fn log_failure(&self, error: ManagerError) {
        warn!("{}", error);
        self.shared.record_error(&error);
    }

    fn mark_lost(&self, error: ManagerError) {
        warn!("Treating failure as connection loss: {}", error);
        let mut status = self.shared.status();
        status.status_mut().record_error(error.to_string());
        status.set_state(ConnectionState::Failed);
    }
}

impl<C: Connector> Drop for ConnectionManager<C> {
    fn drop(&mut self) {
        self.close();
    }
}

fn connected<S: Session>(
    active: &mut Option<ActiveSession<S>>,
) -> Option<&mut ActiveSession<S>> {
    active
        .as_mut()
        .filter(|current| current.session.is_connected())
}
