use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use pidash_core::{NormalizedMessage, TopicId};
use pidash_router::{Router, Widget};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::protocol::ServerFrame;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(90);

/// Unique WebSocket client identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClientId(pub String);

impl Default for ClientId {
    fn default() -> Self {
        Self(format!("client_{}", Uuid::now_v7()))
    }
}

impl ClientId {
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A connected dashboard page. Tracks which widget ids it registered so
/// they can be pulled from the router when the socket drops.
pub struct Client {
    pub id: ClientId,
    tx: mpsc::Sender<String>,
    connected: AtomicBool,
    last_pong: AtomicU64,
    widgets: Mutex<HashSet<String>>,
}

impl Client {
    fn new(id: ClientId, tx: mpsc::Sender<String>) -> Self {
        Self {
            id,
            tx,
            connected: AtomicBool::new(true),
            last_pong: AtomicU64::new(now_secs()),
            widgets: Mutex::new(HashSet::new()),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn record_pong(&self) {
        self.last_pong.store(now_secs(), Ordering::Relaxed);
    }

    pub fn is_alive(&self) -> bool {
        let last = self.last_pong.load(Ordering::Relaxed);
        now_secs().saturating_sub(last) < CLIENT_TIMEOUT.as_secs()
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// A widget registration that forwards routed updates to one WebSocket
/// client. `on_message` runs on the ingest task, so the send is a
/// non-blocking `try_send`; a slow page loses updates, never stalls
/// the pipeline.
pub struct WsWidget {
    widget_id: String,
    tx: mpsc::Sender<String>,
}

impl WsWidget {
    pub fn new(widget_id: impl Into<String>, tx: mpsc::Sender<String>) -> Self {
        Self {
            widget_id: widget_id.into(),
            tx,
        }
    }
}

impl Widget for WsWidget {
    fn on_message(&self, topic: &TopicId, message: &NormalizedMessage) {
        let frame = ServerFrame::Update {
            topic: topic.clone(),
            data: message.clone(),
        };
        if self.tx.try_send(frame.to_json()).is_err() {
            tracing::warn!(
                widget_id = %self.widget_id,
                topic = %topic,
                "client queue full or closed, dropping update"
            );
        }
    }
}

/// Registry of all connected WebSocket clients.
pub struct ClientRegistry {
    clients: DashMap<ClientId, Arc<Client>>,
    max_send_queue: usize,
}

impl ClientRegistry {
    pub fn new(max_send_queue: usize) -> Self {
        Self {
            clients: DashMap::new(),
            max_send_queue,
        }
    }

    /// Register a new client and return its ID + outbound receiver.
    pub fn register(&self) -> (ClientId, mpsc::Receiver<String>) {
        let id = ClientId::new();
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        self.clients
            .insert(id.clone(), Arc::new(Client::new(id.clone(), tx)));
        (id, rx)
    }

    /// Remove a client, returning the widget ids it still had registered.
    pub fn unregister(&self, id: &ClientId) -> Vec<String> {
        match self.clients.remove(id) {
            Some((_, client)) => {
                client.connected.store(false, Ordering::Relaxed);
                client.widgets.lock().drain().collect()
            }
            None => Vec::new(),
        }
    }

    /// Outbound sender for one client, for wiring up `WsWidget`s.
    pub fn sender_for(&self, id: &ClientId) -> Option<mpsc::Sender<String>> {
        self.clients.get(id).map(|c| c.tx.clone())
    }

    /// Send one frame to one client. Returns false when dropped.
    pub fn send_to(&self, id: &ClientId, message: String) -> bool {
        let Some(client) = self.clients.get(id) else {
            return false;
        };
        match client.tx.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(msg)) => {
                tracing::warn!(
                    client_id = %id,
                    msg_len = msg.len(),
                    "send queue full, dropping frame"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Send one frame to every connected client.
    pub fn broadcast(&self, message: &str) {
        for entry in self.clients.iter() {
            if entry.value().is_connected() {
                let _ = entry.value().tx.try_send(message.to_owned());
            }
        }
    }

    pub fn track_widget(&self, id: &ClientId, widget_id: &str) {
        if let Some(client) = self.clients.get(id) {
            client.widgets.lock().insert(widget_id.to_owned());
        }
    }

    pub fn untrack_widget(&self, id: &ClientId, widget_id: &str) {
        if let Some(client) = self.clients.get(id) {
            client.widgets.lock().remove(widget_id);
        }
    }

    pub fn record_pong(&self, id: &ClientId) {
        if let Some(client) = self.clients.get(id) {
            client.record_pong();
        }
    }

    /// Number of connected clients.
    pub fn count(&self) -> usize {
        self.clients.len()
    }

    /// True when any remaining client tracks `widget_id`.
    fn widget_tracked(&self, widget_id: &str) -> bool {
        self.clients
            .iter()
            .any(|entry| entry.value().widgets.lock().contains(widget_id))
    }

    /// Remove a client and pull its widgets from the router. A widget id
    /// another client has since claimed stays registered: a page reload
    /// re-registers its widgets before the stale socket finishes closing,
    /// and tearing those down would strip the live page.
    pub fn release_client(&self, id: &ClientId, router: &Router) {
        for widget_id in self.unregister(id) {
            if self.widget_tracked(&widget_id) {
                tracing::debug!(
                    client_id = %id,
                    widget_id = %widget_id,
                    "widget claimed by another client, keeping registration"
                );
                continue;
            }
            router.unregister(&widget_id);
            tracing::debug!(client_id = %id, widget_id = %widget_id, "widget removed on disconnect");
        }
    }

    /// Drop clients that missed the pong deadline, unhooking their
    /// widgets from the router. Returns how many clients were removed.
    pub fn cleanup_dead_clients(&self, router: &Router) -> usize {
        let dead: Vec<ClientId> = self
            .clients
            .iter()
            .filter(|entry| !entry.value().is_alive())
            .map(|entry| entry.key().clone())
            .collect();

        let removed = dead.len();
        for id in dead {
            self.release_client(&id, router);
            tracing::info!(client_id = %id, "cleaned up dead client");
        }
        removed
    }
}

/// Handle one WebSocket connection: split into reader/writer, heartbeat
/// with pings, and on exit remove the client plus all its widgets.
pub async fn handle_ws_connection(
    socket: WebSocket,
    client_id: ClientId,
    mut rx: mpsc::Receiver<String>,
    registry: Arc<ClientRegistry>,
    router: Arc<Router>,
    on_frame: mpsc::Sender<(ClientId, String)>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer_cid = client_id.clone();
    let writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        ping_interval.tick().await; // consume first immediate tick

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(WsMessage::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                    tracing::trace!(client_id = %writer_cid, "sent ping");
                }
            }
        }
    });

    let reader_cid = client_id.clone();
    let reader_registry = Arc::clone(&registry);
    let reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                WsMessage::Text(text) => {
                    let _ = on_frame.send((reader_cid.clone(), text.to_string())).await;
                }
                WsMessage::Pong(_) => reader_registry.record_pong(&reader_cid),
                WsMessage::Close(_) => break,
                WsMessage::Ping(_) => {} // axum answers pongs itself
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = writer => {},
        _ = reader => {},
    }

    registry.release_client(&client_id, &router);
}

/// Periodic dead-client sweep.
pub fn start_cleanup_task(
    registry: Arc<ClientRegistry>,
    router: Arc<Router>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let removed = registry.cleanup_dead_clients(&router);
            if removed > 0 {
                tracing::info!(removed, "dead client cleanup");
            }
        }
    })
}
