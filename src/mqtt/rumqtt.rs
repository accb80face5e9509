//! [`Connector`] implementation over rumqttc's blocking client
//!
//! `rumqttc::Client` hands out a request handle plus a `Connection` that has
//! to be pumped for anything to happen. Connecting pumps it on the caller's
//! thread until CONNACK; afterwards a dedicated I/O thread keeps pumping and
//! forwards inbound publishes to the attached [`EventSink`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rumqttc::{
    Client, ClientError, ConnectionError, Event, MqttOptions, Outgoing, Packet, QoS,
    RecvTimeoutError, SubscribeFilter,
};
use tracing::{debug, error, info, warn};

use super::error::TransportError;
use super::transport::{Connector, EventSink, Session, SessionOptions};

/// How long the I/O thread waits for an event before re-checking shutdown
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound on waiting for the I/O thread during release
const RELEASE_GRACE: Duration = Duration::from_millis(500);

/// rumqttc rejects keep-alive intervals below one second
const MIN_KEEP_ALIVE: Duration = Duration::from_secs(1);

type SinkSlot = Arc<Mutex<Option<Arc<dyn EventSink>>>>;

#[derive(Clone, Debug, Default)]
pub struct RumqttConnector;

impl RumqttConnector {
    pub fn new() -> Self {
        Self
    }

    fn mqtt_options(options: &SessionOptions) -> Result<MqttOptions, TransportError> {
        let port: u16 = options.port.trim().parse().map_err(|_| {
            TransportError::InvalidAddress(format!("{}:{}", options.host, options.port))
        })?;
        // MqttOptions::new panics on these.
        if options.client_id.is_empty() || options.client_id.starts_with(' ') {
            return Err(TransportError::InvalidClientId(options.client_id.clone()));
        }

        let mut mqtt_options =
            MqttOptions::new(options.client_id.clone(), options.host.clone(), port);
        mqtt_options
            .set_credentials(options.username.clone(), options.password.clone())
            .set_clean_session(options.clean_session)
            .set_keep_alive(options.keep_alive.max(MIN_KEEP_ALIVE));
        Ok(mqtt_options)
    }
}

impl Connector for RumqttConnector {
    type Session = RumqttSession;

    fn open(
        &self,
        options: &SessionOptions,
        events: Arc<dyn EventSink>,
    ) -> Result<RumqttSession, TransportError> {
        let mqtt_options = Self::mqtt_options(options)?;
        let (client, mut connection) = Client::new(mqtt_options, options.request_capacity);

        info!(
            "Connecting to tcp://{}:{} as {}",
            options.host, options.port, options.client_id
        );

        let deadline = Instant::now() + options.connect_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(TransportError::Timeout(options.connect_timeout));
            }
            match connection.recv_timeout(remaining) {
                Ok(Ok(Event::Incoming(Packet::ConnAck(ack)))) => {
                    debug!("CONNACK received: {:?}", ack.code);
                    break;
                }
                Ok(Ok(event)) => debug!("Event before CONNACK: {:?}", event),
                Ok(Err(e)) => return Err(map_connection_error(e)),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(TransportError::Timeout(options.connect_timeout))
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(TransportError::Network(
                        "event loop closed before CONNACK".to_string(),
                    ))
                }
            }
        }

        let connected = Arc::new(AtomicBool::new(true));
        let shutdown = Arc::new(AtomicBool::new(false));
        let sink: SinkSlot = Arc::new(Mutex::new(Some(events)));

        let io_thread = {
            let connected = connected.clone();
            let shutdown = shutdown.clone();
            let sink = sink.clone();
            thread::Builder::new()
                .name(format!("mqtt-io-{}", options.client_id))
                .spawn(move || {
                    while !shutdown.load(Ordering::Acquire) {
                        match connection.recv_timeout(POLL_INTERVAL) {
                            Ok(Ok(Event::Incoming(Packet::Publish(publish)))) => {
                                let current = sink
                                    .lock()
                                    .unwrap_or_else(PoisonError::into_inner)
                                    .clone();
                                if let Some(sink) = current {
                                    sink.on_message(&publish.topic, &publish.payload);
                                }
                            }
                            Ok(Ok(Event::Outgoing(Outgoing::Disconnect))) => {
                                debug!("DISCONNECT sent, stopping I/O thread");
                                break;
                            }
                            Ok(Ok(_)) => {}
                            Ok(Err(e)) => {
                                connected.store(false, Ordering::Release);
                                if !shutdown.load(Ordering::Acquire) {
                                    let cause = map_connection_error(e);
                                    let current = sink
                                        .lock()
                                        .unwrap_or_else(PoisonError::into_inner)
                                        .clone();
                                    if let Some(sink) = current {
                                        sink.on_connection_lost(&cause);
                                    }
                                }
                                break;
                            }
                            Err(RecvTimeoutError::Timeout) => {}
                            Err(RecvTimeoutError::Disconnected) => break,
                        }
                    }
                    connected.store(false, Ordering::Release);
                })
                .map_err(|e| TransportError::Worker(e.to_string()))?
        };

        info!("Connected to tcp://{}:{}", options.host, options.port);
        Ok(RumqttSession {
            client,
            connected,
            shutdown,
            sink,
            io_thread: Some(io_thread),
        })
    }
}

pub struct RumqttSession {
    client: Client,
    connected: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    sink: SinkSlot,
    io_thread: Option<JoinHandle<()>>,
}

// Callers hold the manager lock, so requests never wait on a full queue.
// A broker that stops acking surfaces as RequestRejected instead.
impl Session for RumqttSession {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), TransportError> {
        self.client
            .try_subscribe(topic, qos)
            .map_err(map_client_error)
    }

    fn subscribe_many(&mut self, filters: &[(String, QoS)]) -> Result<(), TransportError> {
        let filters = filters
            .iter()
            .map(|(topic, qos)| SubscribeFilter::new(topic.clone(), *qos));
        self.client
            .try_subscribe_many(filters)
            .map_err(map_client_error)
    }

    fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.client
            .try_unsubscribe(topic)
            .map_err(map_client_error)
    }

    fn unsubscribe_many(&mut self, topics: &[String]) -> Result<(), TransportError> {
        for topic in topics {
            self.unsubscribe(topic)?;
        }
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS) -> Result<(), TransportError> {
        self.client
            .try_publish(topic, qos, false, payload.to_vec())
            .map_err(map_client_error)
    }

    fn detach(&mut self) {
        self.sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        self.client.try_disconnect().map_err(map_client_error)
    }

    fn release(mut self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::Release);

        let Some(handle) = self.io_thread.take() else {
            return Ok(());
        };
        // A listener closing the session runs on the I/O thread itself.
        if handle.thread().id() == thread::current().id() {
            debug!("Release called from the I/O thread, not joining");
            self.shutdown.store(true, Ordering::Release);
            return Ok(());
        }

        // Give a queued DISCONNECT the chance to go out before forcing the
        // loop down. The thread may also be inside a listener waiting on the
        // manager lock our caller holds, so never join an unfinished thread.
        wait_for_exit(&handle, RELEASE_GRACE);
        self.shutdown.store(true, Ordering::Release);
        wait_for_exit(&handle, 2 * POLL_INTERVAL);

        if !handle.is_finished() {
            warn!("I/O thread still busy, leaving it to exit on its own");
            return Ok(());
        }
        handle.join().map_err(|_| {
            error!("MQTT I/O thread panicked");
            TransportError::Worker("I/O thread panicked".to_string())
        })
    }
}

fn wait_for_exit(handle: &JoinHandle<()>, limit: Duration) {
    let deadline = Instant::now() + limit;
    while !handle.is_finished() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
}

impl Drop for RumqttSession {
    fn drop(&mut self) {
        if self.io_thread.is_some() {
            warn!("Session dropped without release, stopping I/O thread");
            self.shutdown.store(true, Ordering::Release);
        }
    }
}

fn map_client_error(error: ClientError) -> TransportError {
    match error {
        ClientError::TryRequest(_) => TransportError::RequestRejected(error.to_string()),
        ClientError::Request(_) => TransportError::ClientClosed(error.to_string()),
    }
}

fn map_connection_error(error: ConnectionError) -> TransportError {
    match error {
        ConnectionError::ConnectionRefused(code) => TransportError::Refused(format!("{:?}", code)),
        ConnectionError::Io(e) => TransportError::Network(e.to_string()),
        other => TransportError::Network(other.to_string()),
    }
}
