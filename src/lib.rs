pub mod config;
pub mod mqtt;

pub use mqtt::{ConnectionManager, ConnectionParameters, MessageListener, RumqttConnector};
