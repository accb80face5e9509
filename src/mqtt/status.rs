use chrono::{DateTime, Local};
use tokio::sync::watch;
use tracing::debug;

/// Number of error messages kept in [`MqttStatus::error_messages`]
pub const ERROR_HISTORY: usize = 32;

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Last connect failed or the transport reported the link lost
    Failed,
}

#[derive(Clone, Debug, Default)]
pub struct MqttStatus {
    pub connection_state: ConnectionState,
    pub error_messages: Vec<String>,
    pub messages_received: usize,
    pub messages_sent: usize,
    pub last_activity: Option<DateTime<Local>>,
}

impl MqttStatus {
    pub fn last_error(&self) -> Option<&str> {
        self.error_messages.last().map(String::as_str)
    }

    pub(crate) fn record_error(&mut self, message: String) {
        if self.error_messages.len() == ERROR_HISTORY {
            self.error_messages.remove(0);
        }
        self.error_messages.push(message);
    }

    pub(crate) fn record_received(&mut self) {
        self.messages_received += 1;
        self.last_activity = Some(Local::now());
    }

    pub(crate) fn record_sent(&mut self) {
        self.messages_sent += 1;
        self.last_activity = Some(Local::now());
    }
}

/// Status plus a watch channel broadcasting every state change
pub(crate) struct StatusTracker {
    status: MqttStatus,
    state_tx: watch::Sender<ConnectionState>,
}

impl StatusTracker {
    pub(crate) fn new() -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            status: MqttStatus::default(),
            state_tx,
        }
    }

    pub(crate) fn snapshot(&self) -> MqttStatus {
        self.status.clone()
    }

    pub(crate) fn status_mut(&mut self) -> &mut MqttStatus {
        &mut self.status
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub(crate) fn set_state(&mut self, state: ConnectionState) {
        if self.status.connection_state != state {
            debug!(
                "Connection state {:?} -> {:?}",
                self.status.connection_state, state
            );
        }
        self.status.connection_state = state;
        self.state_tx.send_replace(state);
    }
}
