use chrono::{Local, NaiveDateTime};
use std::fmt;

const PREVIEW_CHARS: usize = 32;

/// Timestamped copy of one inbound message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MqttMessage {
    topic: String,
    payload: Vec<u8>,
    timestamp: NaiveDateTime,
}

impl fmt::Display for MqttMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let content = self.content();
        let preview: String = content.chars().take(PREVIEW_CHARS).collect();
        let ellipsis = if content.chars().count() > PREVIEW_CHARS {
            "..."
        } else {
            ""
        };
        write!(f, "{} - {}{}", self.timestamp, preview, ellipsis)
    }
}

impl MqttMessage {
    pub fn from_topic(topic: impl Into<String>, payload: &[u8]) -> Self {
        MqttMessage {
            topic: topic.into(),
            payload: payload.to_vec(),
            timestamp: Local::now().naive_local(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    /// Payload as UTF-8 text, or lowercase hex when it is not valid UTF-8
    pub fn content(&self) -> String {
        match std::str::from_utf8(&self.payload) {
            Ok(text) => text.to_owned(),
            Err(_) => hex::encode(&self.payload),
        }
    }

    pub fn render(&self) -> String {
        format!("{}: {}\n{}", self.timestamp, self.topic, self.content())
    }
}
