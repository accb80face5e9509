use std::time::Duration;

use rumqttc::QoS;
use serde::{Deserialize, Serialize};

use super::params::ConnectionParameters;
use super::transport::SessionOptions;

pub const DEFAULT_KEEP_ALIVE_SECS: u64 = 60;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_REQUEST_CAPACITY: usize = 100;

/// Session tuning shared by every connection the manager opens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub keep_alive_secs: u64,
    /// QoS used for subscribe and publish unless a call names its own
    #[serde(with = "qos_level")]
    pub qos: QoS,
    pub connect_timeout_ms: u64,
    pub clean_session: bool,
    pub request_capacity: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            keep_alive_secs: DEFAULT_KEEP_ALIVE_SECS,
            qos: QoS::AtLeastOnce,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            clean_session: true,
            request_capacity: DEFAULT_REQUEST_CAPACITY,
        }
    }
}

impl MqttConfig {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn session_options(&self, params: &ConnectionParameters) -> SessionOptions {
        SessionOptions {
            host: params.host.clone(),
            port: params.port.clone(),
            client_id: params.client_id.clone(),
            username: params.username.clone(),
            password: params.password.clone(),
            clean_session: self.clean_session,
            keep_alive: self.keep_alive(),
            connect_timeout: self.connect_timeout(),
            request_capacity: self.request_capacity.max(1),
        }
    }
}

/// QoS stored as its numeric level (0, 1 or 2)
pub mod qos_level {
    use rumqttc::QoS;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn to_level(qos: QoS) -> u8 {
        match qos {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => 1,
            QoS::ExactlyOnce => 2,
        }
    }

    pub fn from_level(level: u8) -> Option<QoS> {
        match level {
            0 => Some(QoS::AtMostOnce),
            1 => Some(QoS::AtLeastOnce),
            2 => Some(QoS::ExactlyOnce),
            _ => None,
        }
    }

    pub fn serialize<S: Serializer>(qos: &QoS, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(to_level(*qos))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<QoS, D::Error> {
        let level = u8::deserialize(deserializer)?;
        from_level(level).ok_or_else(|| {
            de::Error::custom(format!("invalid QoS level {level}, must be 0, 1 or 2"))
        })
    }
}
