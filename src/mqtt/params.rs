use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::ManagerError;

/// Everything needed to identify one broker session
///
/// Two parameter sets are considered the same session when every field
/// matches; the manager relies on this to skip reconnecting.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParameters {
    pub host: String,
    pub port: String,
    pub client_id: String,
    pub username: String,
    pub password: String,
}

impl ConnectionParameters {
    pub fn new(
        host: impl Into<String>,
        port: impl Into<String>,
        client_id: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: port.into(),
            client_id: client_id.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    /// Connection string in the `tcp://<host>:<port>` form
    pub fn server_uri(&self) -> String {
        format!("tcp://{}:{}", self.host, self.port)
    }

    /// Rejects the set if any required field is empty
    pub fn validate(&self) -> Result<(), ManagerError> {
        let fields = [
            ("host", &self.host),
            ("port", &self.port),
            ("client_id", &self.client_id),
            ("username", &self.username),
            ("password", &self.password),
        ];
        match fields.iter().find(|(_, value)| value.is_empty()) {
            Some((name, _)) => Err(ManagerError::Parameter(*name)),
            None => Ok(()),
        }
    }
}

// Keeps the password out of logs.
impl fmt::Debug for ConnectionParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParameters")
            .field("server_uri", &self.server_uri())
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}
