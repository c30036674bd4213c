use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use dashmap::DashMap;
use pidash_core::{ConnectionState, NormalizedMessage, TopicId, Transport};
use serde_json::Value;
use tracing::{debug, warn};

/// A registered message consumer. Implementations must tolerate being
/// called from the ingest task; handlers that can fail should log and
/// return rather than panic, but a panicking handler is contained and
/// never takes the dispatch pass down with it.
pub trait Widget: Send + Sync {
    fn on_message(&self, topic: &TopicId, message: &NormalizedMessage);
}

/// An internal-id subscription pattern: exact, or prefix when the pattern
/// ends in `*` (`system.*` matches `system.uptime` and `system.cpu.core1`).
#[derive(Clone, Debug, PartialEq, Eq)]
enum Pattern {
    Exact(String),
    Prefix(String),
}

impl Pattern {
    fn compile(pattern: &str) -> Self {
        match pattern.strip_suffix('*') {
            Some(prefix) => Self::Prefix(prefix.to_owned()),
            None => Self::Exact(pattern.to_owned()),
        }
    }

    fn matches(&self, topic: &TopicId) -> bool {
        match self {
            Self::Exact(p) => topic.as_str() == p,
            Self::Prefix(p) => topic.as_str().starts_with(p.as_str()),
        }
    }
}

struct Registration {
    widget: Arc<dyn Widget>,
    patterns: Vec<Pattern>,
}

impl Registration {
    fn interested_in(&self, topic: &TopicId) -> bool {
        self.patterns.iter().any(|p| p.matches(topic))
    }
}

/// Distribution router: fans normalized updates out to registered widgets
/// and forwards widget-originated publishes to the broker transport.
///
/// Explicitly constructed and shared by `Arc`; there is no global
/// instance.
pub struct Router {
    widgets: DashMap<String, Registration>,
    transport: Arc<dyn Transport>,
    connection: Arc<ConnectionState>,
}

impl Router {
    pub fn new(transport: Arc<dyn Transport>, connection: Arc<ConnectionState>) -> Self {
        Self {
            widgets: DashMap::new(),
            transport,
            connection,
        }
    }

    /// Register a widget under an id. Re-registering the same id replaces
    /// the previous handler and subscriptions.
    pub fn register(
        &self,
        widget_id: impl Into<String>,
        widget: Arc<dyn Widget>,
        subscriptions: &[&str],
    ) {
        let patterns = subscriptions.iter().map(|p| Pattern::compile(p)).collect();
        self.widgets
            .insert(widget_id.into(), Registration { widget, patterns });
    }

    /// Remove a widget. Returns false when the id was never registered.
    pub fn unregister(&self, widget_id: &str) -> bool {
        self.widgets.remove(widget_id).is_some()
    }

    pub fn widget_count(&self) -> usize {
        self.widgets.len()
    }

    /// Deliver one update to every widget with a matching subscription,
    /// at most once per widget regardless of how many of its patterns
    /// match. Returns the number of deliveries. A panicking handler is
    /// caught and logged; the pass continues with the remaining widgets.
    pub fn dispatch(&self, topic: &TopicId, message: &NormalizedMessage) -> usize {
        // Snapshot matching handlers first so handlers can re-enter the
        // registry (register/unregister) without deadlocking a shard.
        let matched: Vec<(String, Arc<dyn Widget>)> = self
            .widgets
            .iter()
            .filter(|entry| entry.value().interested_in(topic))
            .map(|entry| (entry.key().clone(), Arc::clone(&entry.value().widget)))
            .collect();

        let mut delivered = 0;
        for (widget_id, widget) in matched {
            let outcome = catch_unwind(AssertUnwindSafe(|| widget.on_message(topic, message)));
            match outcome {
                Ok(()) => delivered += 1,
                Err(_) => {
                    warn!(widget_id = %widget_id, topic = %topic, "widget handler panicked");
                }
            }
        }
        debug!(topic = %topic, delivered, "dispatched update");
        delivered
    }

    /// Forward a widget-originated message to the broker. String payloads
    /// go out verbatim; everything else is JSON-encoded. Returns false
    /// when the message was dropped (disconnected or transport refusal).
    pub fn publish(&self, wire_topic: &str, payload: &Value) -> bool {
        if !self.connection.is_connected() {
            warn!(topic = %wire_topic, "dropping publish while disconnected");
            return false;
        }
        let bytes = match payload {
            Value::String(s) => s.clone().into_bytes(),
            other => match serde_json::to_vec(other) {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(topic = %wire_topic, error = %err, "unencodable publish payload");
                    return false;
                }
            },
        };
        match self.transport.try_publish(wire_topic, bytes) {
            Ok(()) => true,
            Err(err) => {
                warn!(topic = %wire_topic, kind = err.error_kind(), "publish failed: {err}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use pidash_core::TransportError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingWidget {
        calls: AtomicUsize,
    }

    impl CountingWidget {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Widget for CountingWidget {
        fn on_message(&self, _topic: &TopicId, _message: &NormalizedMessage) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct PanickingWidget;

    impl Widget for PanickingWidget {
        fn on_message(&self, _topic: &TopicId, _message: &NormalizedMessage) {
            panic!("widget bug");
        }
    }

    #[derive(Default)]
    struct RecordingTransport {
        published: Mutex<Vec<(String, Vec<u8>)>>,
    }

    impl Transport for RecordingTransport {
        fn try_publish(&self, wire_topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
            self.published
                .lock()
                .push((wire_topic.to_owned(), payload));
            Ok(())
        }
    }

    fn router() -> (Router, Arc<RecordingTransport>, Arc<ConnectionState>) {
        let transport = Arc::new(RecordingTransport::default());
        let connection = Arc::new(ConnectionState::new());
        let router = Router::new(transport.clone(), connection.clone());
        (router, transport, connection)
    }

    fn msg() -> NormalizedMessage {
        NormalizedMessage::new(1i64, "1")
    }

    #[test]
    fn exact_and_prefix_subscriptions() {
        let (router, _, _) = router();
        let exact = CountingWidget::new();
        let prefix = CountingWidget::new();
        router.register("exact", exact.clone(), &["system.uptime"]);
        router.register("prefix", prefix.clone(), &["system.*"]);

        router.dispatch(&TopicId::new("system.uptime"), &msg());
        assert_eq!(exact.calls(), 1);
        assert_eq!(prefix.calls(), 1);

        router.dispatch(&TopicId::new("system.cpu.core1"), &msg());
        assert_eq!(exact.calls(), 1);
        assert_eq!(prefix.calls(), 2);

        assert_eq!(router.dispatch(&TopicId::new("network.wifi.status"), &msg()), 0);
    }

    #[test]
    fn overlapping_patterns_deliver_at_most_once() {
        let (router, _, _) = router();
        let widget = CountingWidget::new();
        router.register(
            "greedy",
            widget.clone(),
            &["system.*", "system.uptime", "*"],
        );
        let delivered = router.dispatch(&TopicId::new("system.uptime"), &msg());
        assert_eq!(delivered, 1);
        assert_eq!(widget.calls(), 1);
    }

    #[test]
    fn reregistration_replaces_subscriptions() {
        let (router, _, _) = router();
        let widget = CountingWidget::new();
        router.register("w", widget.clone(), &["system.uptime"]);
        router.register("w", widget.clone(), &["network.*"]);
        assert_eq!(router.widget_count(), 1);

        router.dispatch(&TopicId::new("system.uptime"), &msg());
        assert_eq!(widget.calls(), 0);
        router.dispatch(&TopicId::new("network.wifi.status"), &msg());
        assert_eq!(widget.calls(), 1);
    }

    #[test]
    fn delivery_set_does_not_depend_on_registration_order() {
        let subscriptions: [(&str, &[&str]); 3] = [
            ("uptime", &["system.uptime"]),
            ("system", &["system.*"]),
            ("firehose", &["*"]),
        ];

        let run = |order: &[usize]| -> Vec<usize> {
            let (router, _, _) = router();
            let widgets: Vec<Arc<CountingWidget>> =
                subscriptions.iter().map(|_| CountingWidget::new()).collect();
            for &i in order {
                let (id, patterns) = subscriptions[i];
                router.register(id, widgets[i].clone(), patterns);
            }
            router.dispatch(&TopicId::new("system.uptime"), &msg());
            router.dispatch(&TopicId::new("network.wifi.status"), &msg());
            widgets.iter().map(|w| w.calls()).collect()
        };

        let forward = run(&[0, 1, 2]);
        let backward = run(&[2, 1, 0]);
        assert_eq!(forward, vec![1, 1, 2]);
        assert_eq!(forward, backward);
    }

    #[test]
    fn unregister_is_a_noop_when_absent() {
        let (router, _, _) = router();
        assert!(!router.unregister("ghost"));
        let widget = CountingWidget::new();
        router.register("w", widget, &["*"]);
        assert!(router.unregister("w"));
        assert!(!router.unregister("w"));
    }

    #[test]
    fn panicking_handler_does_not_stop_the_pass() {
        let (router, _, _) = router();
        let healthy = CountingWidget::new();
        router.register("bad", Arc::new(PanickingWidget), &["*"]);
        router.register("good", healthy.clone(), &["*"]);

        let delivered = router.dispatch(&TopicId::new("system.uptime"), &msg());
        assert_eq!(delivered, 1);
        assert_eq!(healthy.calls(), 1);

        // The panicking widget stays registered and keeps getting isolated.
        router.dispatch(&TopicId::new("system.uptime"), &msg());
        assert_eq!(healthy.calls(), 2);
    }

    #[test]
    fn publish_gated_on_connection() {
        let (router, transport, connection) = router();
        assert!(!router.publish("weri/system/reboot", &json!("reboot")));
        assert!(transport.published.lock().is_empty());

        connection.set_connected();
        assert!(router.publish("weri/system/reboot", &json!("reboot")));
        let published = transport.published.lock();
        assert_eq!(published.len(), 1);
        // Strings go out verbatim, without JSON quoting.
        assert_eq!(published[0].0, "weri/system/reboot");
        assert_eq!(published[0].1, b"reboot");
    }

    #[test]
    fn object_payloads_are_json_encoded() {
        let (router, transport, connection) = router();
        connection.set_connected();
        assert!(router.publish(
            "system/time/sync/command",
            &json!({"action": "sync", "source": "ntp"})
        ));
        let published = transport.published.lock();
        let body: serde_json::Value = serde_json::from_slice(&published[0].1).unwrap();
        assert_eq!(body["action"], "sync");
    }
}
