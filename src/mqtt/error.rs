//! Error definitions for the MQTT session layer

use std::time::Duration;

use thiserror::Error;

/// Failures reported by the underlying MQTT transport
///
/// Every error the client library can raise is translated into one of these
/// variants at the transport boundary, so the manager only ever branches on
/// typed results.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Host or port could not be turned into a broker address
    #[error("invalid broker address: {0}")]
    InvalidAddress(String),

    /// Client id the client library would refuse
    #[error("invalid client id: {0:?}")]
    InvalidClientId(String),

    /// Broker answered the CONNECT with a non-success return code
    #[error("connection refused by broker: {0}")]
    Refused(String),

    /// No CONNACK arrived before the connect deadline
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    /// Network level failure (unreachable host, reset, closed socket)
    #[error("network error: {0}")]
    Network(String),

    /// The request queue to the protocol event loop is gone
    #[error("client request channel closed: {0}")]
    ClientClosed(String),

    /// The event loop did not take the request, its queue is full or gone
    #[error("request not accepted by event loop: {0}")]
    RequestRejected(String),

    /// The I/O worker could not be started or joined
    #[error("I/O worker error: {0}")]
    Worker(String),
}

/// Errors surfaced by the connection manager
#[derive(Debug, Error)]
pub enum ManagerError {
    /// A required connection field was empty, rejected before any I/O
    #[error("missing connection parameter: {0}")]
    Parameter(&'static str),

    /// The transport failed while establishing the session
    #[error("connect failed: {0}")]
    Connect(#[source] TransportError),

    /// Subscribe, unsubscribe or publish failed on an established session
    #[error("{operation} failed: {source}")]
    Operation {
        operation: &'static str,
        #[source]
        source: TransportError,
    },

    /// Disconnect or release failed while tearing a session down
    #[error("teardown step '{step}' failed: {source}")]
    Teardown {
        step: &'static str,
        #[source]
        source: TransportError,
    },
}
