use std::sync::Arc;

use pidash_core::InboundMessage;
use pidash_router::{normalize, Router, TopicMap};
use pidash_telemetry::MetricsRecorder;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Ingest pipeline: wire message → topic map → normalizer → router.
///
/// Unknown wire topics are counted and dropped, never an error; a widget
/// backlog or panic downstream cannot push failure back into this loop.
pub fn spawn_ingest(
    map: Arc<TopicMap>,
    router: Arc<Router>,
    metrics: Option<Arc<MetricsRecorder>>,
    mut inbound: mpsc::Receiver<InboundMessage>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                _ = shutdown.cancelled() => break,
                msg = inbound.recv() => match msg {
                    Some(msg) => msg,
                    None => break,
                },
            };
            handle_message(&map, &router, metrics.as_deref(), &message);
        }
        debug!("ingest pipeline stopped");
    })
}

fn handle_message(
    map: &TopicMap,
    router: &Router,
    metrics: Option<&MetricsRecorder>,
    message: &InboundMessage,
) {
    if let Some(m) = metrics {
        m.counter_inc("ingest.messages", &[], 1);
    }

    let Some(topic) = map.resolve(&message.wire_topic) else {
        debug!(wire_topic = %message.wire_topic, "unmapped wire topic, dropping");
        if let Some(m) = metrics {
            m.counter_inc("ingest.unknown_topic", &[], 1);
        }
        return;
    };

    let normalized = normalize(topic, &message.payload);
    let delivered = router.dispatch(topic, &normalized);
    if let Some(m) = metrics {
        m.counter_inc("dispatch.deliveries", &[], delivered as u64);
    }
}
