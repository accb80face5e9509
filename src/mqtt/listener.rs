//! Listener registry and inbound message fan-out

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

use color_eyre::Result;
use tracing::{debug, warn};

/// Receives every inbound message of the session it is registered with
///
/// Any `Fn(&str, &[u8]) -> Result<()>` closure is a listener.
pub trait MessageListener: Send + Sync {
    fn on_message(&self, topic: &str, payload: &[u8]) -> Result<()>;
}

impl<F> MessageListener for F
where
    F: Fn(&str, &[u8]) -> Result<()> + Send + Sync,
{
    fn on_message(&self, topic: &str, payload: &[u8]) -> Result<()> {
        self(topic, payload)
    }
}

/// Ordered listener collection
///
/// Dispatch works on a snapshot, so listeners may add or remove entries
/// (including themselves) from inside their callback.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Mutex<Vec<Arc<dyn MessageListener>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a listener. Registering the same listener twice delivers twice.
    pub fn add(&self, listener: Arc<dyn MessageListener>) {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        listeners.push(listener);
        debug!("Listener added, {} registered", listeners.len());
    }

    /// Removes the first entry that is the same allocation as `listener`.
    pub fn remove(&self, listener: &Arc<dyn MessageListener>) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let position = listeners
            .iter()
            .position(|registered| same_listener(registered, listener));
        match position {
            Some(index) => {
                listeners.remove(index);
                debug!("Listener removed, {} registered", listeners.len());
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivers one message to every listener in registration order.
    ///
    /// Returns how many listeners accepted it. Errors and panics are logged
    /// and do not stop delivery to the remaining listeners.
    pub fn dispatch(&self, topic: &str, payload: &[u8]) -> usize {
        let snapshot: Vec<Arc<dyn MessageListener>> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut delivered = 0;
        for (index, listener) in snapshot.iter().enumerate() {
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| listener.on_message(topic, payload)));
            match outcome {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => warn!("Listener {} failed on topic {}: {}", index, topic, e),
                Err(_) => warn!("Listener {} panicked on topic {}", index, topic),
            }
        }
        delivered
    }
}

// Compares data pointers only; vtable pointers of the same type may differ
// between codegen units.
fn same_listener(a: &Arc<dyn MessageListener>, b: &Arc<dyn MessageListener>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
