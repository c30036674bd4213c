use parking_lot::Mutex;
use pidash_core::{Transport, TransportError};

/// Recording transport for deterministic tests without a broker.
///
/// Publishes are captured in order; an injected error makes the next
/// `try_publish` fail once.
#[derive(Default)]
pub struct MockTransport {
    published: Mutex<Vec<(String, Vec<u8>)>>,
    fail_next: Mutex<Option<TransportError>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next publish with the given error.
    pub fn fail_next(&self, error: TransportError) {
        *self.fail_next.lock() = Some(error);
    }

    /// Everything published so far, in order.
    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published.lock().clone()
    }

    /// Published payloads for one topic, decoded as UTF-8.
    pub fn payloads_for(&self, wire_topic: &str) -> Vec<String> {
        self.published
            .lock()
            .iter()
            .filter(|(topic, _)| topic == wire_topic)
            .map(|(_, payload)| String::from_utf8_lossy(payload).into_owned())
            .collect()
    }
}

impl Transport for MockTransport {
    fn try_publish(&self, wire_topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        if let Some(error) = self.fail_next.lock().take() {
            return Err(error);
        }
        self.published
            .lock()
            .push((wire_topic.to_owned(), payload));
        Ok(())
    }
}
