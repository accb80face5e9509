//! Recording in-memory transport for driving the connection manager.
//!
//! Every call the manager makes is appended to a shared log so tests can
//! assert on exact call order. Failures are injected through [`Faults`].

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use mqtt_session::mqtt::{
    Connector, EventSink, QoS, Session, SessionOptions, TransportError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Open { client_id: String, host: String },
    Subscribe { topic: String, qos: QoS },
    SubscribeMany { filters: Vec<(String, QoS)> },
    Unsubscribe { topic: String },
    UnsubscribeMany { topics: Vec<String> },
    Publish { topic: String, payload: Vec<u8>, qos: QoS },
    Detach,
    Disconnect,
    Release,
}

#[derive(Default)]
pub struct Faults {
    pub open: Mutex<Option<TransportError>>,
    pub subscribe: Mutex<Option<TransportError>>,
    pub unsubscribe: Mutex<Option<TransportError>>,
    pub publish: Mutex<Option<TransportError>>,
    pub disconnect: Mutex<Option<TransportError>>,
}

#[derive(Clone, Default)]
pub struct FakeConnector {
    pub calls: Arc<Mutex<Vec<Call>>>,
    pub faults: Arc<Faults>,
    pub sink: Arc<Mutex<Option<Arc<dyn EventSink>>>>,
    pub last_options: Arc<Mutex<Option<SessionOptions>>>,
    /// Connection flag of the most recently opened session
    pub link: Arc<Mutex<Option<Arc<AtomicBool>>>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn open_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::Open { .. }))
            .count()
    }

    pub fn fail_next_open(&self, error: TransportError) {
        *self.faults.open.lock().unwrap() = Some(error);
    }

    pub fn fail_next_publish(&self, error: TransportError) {
        *self.faults.publish.lock().unwrap() = Some(error);
    }

    pub fn fail_next_subscribe(&self, error: TransportError) {
        *self.faults.subscribe.lock().unwrap() = Some(error);
    }

    pub fn fail_next_unsubscribe(&self, error: TransportError) {
        *self.faults.unsubscribe.lock().unwrap() = Some(error);
    }

    pub fn fail_next_disconnect(&self, error: TransportError) {
        *self.faults.disconnect.lock().unwrap() = Some(error);
    }

    /// Simulates the broker dropping the link without telling the sink.
    pub fn drop_link(&self) {
        if let Some(link) = self.link.lock().unwrap().as_ref() {
            link.store(false, Ordering::SeqCst);
        }
    }

    /// Delivers an inbound message the way the I/O thread would.
    pub fn deliver(&self, topic: &str, payload: &[u8]) {
        let sink = self.sink.lock().unwrap().clone();
        if let Some(sink) = sink {
            sink.on_message(topic, payload);
        }
    }

    /// Reports connection loss the way the I/O thread would.
    pub fn lose_connection(&self, cause: TransportError) {
        self.drop_link();
        let sink = self.sink.lock().unwrap().clone();
        if let Some(sink) = sink {
            sink.on_connection_lost(&cause);
        }
    }
}

impl Connector for FakeConnector {
    type Session = FakeSession;

    fn open(
        &self,
        options: &SessionOptions,
        events: Arc<dyn EventSink>,
    ) -> Result<FakeSession, TransportError> {
        self.calls.lock().unwrap().push(Call::Open {
            client_id: options.client_id.clone(),
            host: options.host.clone(),
        });
        *self.last_options.lock().unwrap() = Some(options.clone());

        if let Some(error) = self.faults.open.lock().unwrap().take() {
            return Err(error);
        }

        let connected = Arc::new(AtomicBool::new(true));
        *self.link.lock().unwrap() = Some(connected.clone());
        *self.sink.lock().unwrap() = Some(events);

        Ok(FakeSession {
            calls: self.calls.clone(),
            faults: self.faults.clone(),
            sink: self.sink.clone(),
            connected,
        })
    }
}

pub struct FakeSession {
    calls: Arc<Mutex<Vec<Call>>>,
    faults: Arc<Faults>,
    sink: Arc<Mutex<Option<Arc<dyn EventSink>>>>,
    connected: Arc<AtomicBool>,
}

impl FakeSession {
    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

fn take(fault: &Mutex<Option<TransportError>>) -> Result<(), TransportError> {
    match fault.lock().unwrap().take() {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

impl Session for FakeSession {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), TransportError> {
        self.record(Call::Subscribe {
            topic: topic.to_string(),
            qos,
        });
        take(&self.faults.subscribe)
    }

    fn subscribe_many(&mut self, filters: &[(String, QoS)]) -> Result<(), TransportError> {
        self.record(Call::SubscribeMany {
            filters: filters.to_vec(),
        });
        take(&self.faults.subscribe)
    }

    fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.record(Call::Unsubscribe {
            topic: topic.to_string(),
        });
        take(&self.faults.unsubscribe)
    }

    fn unsubscribe_many(&mut self, topics: &[String]) -> Result<(), TransportError> {
        self.record(Call::UnsubscribeMany {
            topics: topics.to_vec(),
        });
        take(&self.faults.unsubscribe)
    }

    fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS) -> Result<(), TransportError> {
        self.record(Call::Publish {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            qos,
        });
        take(&self.faults.publish)
    }

    fn detach(&mut self) {
        self.record(Call::Detach);
        self.sink.lock().unwrap().take();
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        self.record(Call::Disconnect);
        self.connected.store(false, Ordering::SeqCst);
        take(&self.faults.disconnect)
    }

    fn release(self) -> Result<(), TransportError> {
        self.record(Call::Release);
        Ok(())
    }
}
