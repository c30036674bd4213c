use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use pidash_core::{ConnectionState, HttpConfig};
use pidash_router::Router;
use pidash_telemetry::MetricsRecorder;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use crate::archive;
use crate::client::{self, ClientId, ClientRegistry, WsWidget};
use crate::protocol::{ClientFrame, ServerFrame};

const CONNECTION_POLL_INTERVAL: Duration = Duration::from_secs(1);
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ClientRegistry>,
    pub router: Arc<Router>,
    pub connection: Arc<ConnectionState>,
    pub metrics: Option<Arc<MetricsRecorder>>,
    pub frame_tx: mpsc::Sender<(ClientId, String)>,
    pub archive_dir: PathBuf,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> axum::Router {
    axum::Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/api/archives", get(archive_list_handler))
        .route("/api/archives/{name}", get(archive_download_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Create and start the server. Returns a handle with the bound port.
pub async fn start(
    config: HttpConfig,
    router: Arc<Router>,
    connection: Arc<ConnectionState>,
    metrics: Option<Arc<MetricsRecorder>>,
    shutdown: CancellationToken,
) -> Result<ServerHandle, std::io::Error> {
    let registry = Arc::new(ClientRegistry::new(config.max_send_queue));

    let _cleanup = client::start_cleanup_task(
        Arc::clone(&registry),
        Arc::clone(&router),
        CLEANUP_INTERVAL,
    );

    let (frame_tx, frame_rx) = mpsc::channel::<(ClientId, String)>(1024);

    let frames = tokio::spawn(process_client_frames(
        frame_rx,
        Arc::clone(&router),
        Arc::clone(&registry),
        Arc::clone(&connection),
        metrics.clone(),
    ));

    let _watcher = spawn_connection_watcher(
        Arc::clone(&registry),
        Arc::clone(&connection),
        shutdown.clone(),
    );

    let app_state = AppState {
        registry: Arc::clone(&registry),
        router,
        connection,
        metrics,
        frame_tx,
        archive_dir: config.archive_dir.clone(),
    };

    let app = build_router(app_state);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(port = local_addr.port(), "dashboard server started");

    let serve_shutdown = shutdown.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(serve_shutdown.cancelled_owned())
            .await
            .ok();
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        registry,
        _server: server,
        _frames: frames,
        _watcher,
        _cleanup,
    })
}

/// Handle returned by `start()` — keeps background tasks alive.
pub struct ServerHandle {
    pub port: u16,
    pub registry: Arc<ClientRegistry>,
    _server: tokio::task::JoinHandle<()>,
    _frames: tokio::task::JoinHandle<()>,
    _watcher: tokio::task::JoinHandle<()>,
    _cleanup: tokio::task::JoinHandle<()>,
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (client_id, rx) = state.registry.register();
    tracing::info!(client_id = %client_id, "websocket client connected");
    if let Some(m) = &state.metrics {
        m.gauge_set("ws.clients", &[], state.registry.count() as f64);
    }

    client::handle_ws_connection(
        socket,
        client_id,
        rx,
        Arc::clone(&state.registry),
        Arc::clone(&state.router),
        state.frame_tx.clone(),
    )
    .await;

    if let Some(m) = &state.metrics {
        m.gauge_set("ws.clients", &[], state.registry.count() as f64);
    }
}

/// Health check HTTP endpoint.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "broker_connected": state.connection.is_connected(),
        "clients": state.registry.count(),
        "widgets": state.router.widget_count(),
    }))
}

/// List the weekly CSV archives grouped by production week.
async fn archive_list_handler(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(archive::list_archives(&state.archive_dir))
}

/// Download one archive file.
async fn archive_download_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    let Some(path) = archive::resolve_archive(&state.archive_dir, &name) else {
        return (StatusCode::NOT_FOUND, "archive not found").into_response();
    };
    match tokio::fs::read(&path).await {
        Ok(bytes) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/csv".to_owned()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{name}\""),
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(err) => {
            tracing::warn!(name = %name, error = %err, "archive read failed");
            (StatusCode::NOT_FOUND, "archive not found").into_response()
        }
    }
}

/// Process frames arriving from WebSocket clients.
async fn process_client_frames(
    mut rx: mpsc::Receiver<(ClientId, String)>,
    router: Arc<Router>,
    registry: Arc<ClientRegistry>,
    connection: Arc<ConnectionState>,
    metrics: Option<Arc<MetricsRecorder>>,
) {
    while let Some((client_id, raw)) = rx.recv().await {
        handle_client_frame(
            &router,
            &registry,
            &connection,
            metrics.as_deref(),
            &client_id,
            &raw,
        );
    }
}

fn handle_client_frame(
    router: &Arc<Router>,
    registry: &ClientRegistry,
    connection: &ConnectionState,
    metrics: Option<&MetricsRecorder>,
    client_id: &ClientId,
    raw: &str,
) {
    let frame: ClientFrame = match serde_json::from_str(raw) {
        Ok(frame) => frame,
        Err(err) => {
            registry.send_to(
                client_id,
                ServerFrame::Error {
                    message: format!("bad frame: {err}"),
                }
                .to_json(),
            );
            return;
        }
    };

    match frame {
        ClientFrame::Register {
            widget_id,
            subscriptions,
        } => {
            let Some(tx) = registry.sender_for(client_id) else {
                return;
            };
            let patterns: Vec<&str> = subscriptions.iter().map(String::as_str).collect();
            router.register(
                widget_id.clone(),
                Arc::new(WsWidget::new(widget_id.clone(), tx)),
                &patterns,
            );
            registry.track_widget(client_id, &widget_id);
            tracing::debug!(client_id = %client_id, widget_id = %widget_id, "widget registered");

            // Tell the new widget the broker state right away.
            registry.send_to(
                client_id,
                ServerFrame::Connection {
                    connected: connection.is_connected(),
                }
                .to_json(),
            );
            if let Some(m) = metrics {
                m.gauge_set("router.widgets", &[], router.widget_count() as f64);
            }
        }
        ClientFrame::Unregister { widget_id } => {
            router.unregister(&widget_id);
            registry.untrack_widget(client_id, &widget_id);
            if let Some(m) = metrics {
                m.gauge_set("router.widgets", &[], router.widget_count() as f64);
            }
        }
        ClientFrame::Publish { topic, payload } => {
            if !router.publish(&topic, &payload) {
                if let Some(m) = metrics {
                    m.counter_inc("publish.dropped", &[], 1);
                }
            }
        }
    }
}

/// Broadcast broker connectivity edges to every client. The transport
/// only flips an atomic, so the watcher samples it and reports changes.
fn spawn_connection_watcher(
    registry: Arc<ClientRegistry>,
    connection: Arc<ConnectionState>,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut last = connection.is_connected();
        let mut ticker = tokio::time::interval(CONNECTION_POLL_INTERVAL);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let now = connection.is_connected();
            if now != last {
                last = now;
                registry.broadcast(&ServerFrame::Connection { connected: now }.to_json());
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pidash_transport::MockTransport;
    use serde_json::json;

    fn frame_env() -> (
        Arc<Router>,
        Arc<ClientRegistry>,
        Arc<ConnectionState>,
        Arc<MockTransport>,
    ) {
        let transport = Arc::new(MockTransport::new());
        let connection = Arc::new(ConnectionState::new());
        let router = Arc::new(Router::new(transport.clone(), connection.clone()));
        let registry = Arc::new(ClientRegistry::new(32));
        (router, registry, connection, transport)
    }

    #[tokio::test]
    async fn register_frame_wires_widget_into_router() {
        let (router, registry, connection, _) = frame_env();
        let (client_id, mut rx) = registry.register();

        handle_client_frame(
            &router,
            &registry,
            &connection,
            None,
            &client_id,
            r#"{"type":"register","widget_id":"uptime","subscriptions":["system.uptime"]}"#,
        );
        assert_eq!(router.widget_count(), 1);

        // The register reply reports broker state.
        let reply: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(reply["type"], "connection");
        assert_eq!(reply["connected"], false);

        // A dispatched update reaches the client as an update frame.
        router.dispatch(
            &pidash_core::TopicId::new("system.uptime"),
            &pidash_core::NormalizedMessage::new(90061i64, "1j 01h 01m 01s"),
        );
        let update: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(update["type"], "update");
        assert_eq!(update["data"]["formatted"], "1j 01h 01m 01s");
    }

    #[tokio::test]
    async fn unregister_frame_removes_widget() {
        let (router, registry, connection, _) = frame_env();
        let (client_id, _rx) = registry.register();

        handle_client_frame(
            &router,
            &registry,
            &connection,
            None,
            &client_id,
            r#"{"type":"register","widget_id":"clock","subscriptions":["system.time"]}"#,
        );
        handle_client_frame(
            &router,
            &registry,
            &connection,
            None,
            &client_id,
            r#"{"type":"unregister","widget_id":"clock"}"#,
        );
        assert_eq!(router.widget_count(), 0);
    }

    #[tokio::test]
    async fn publish_frame_forwards_when_connected() {
        let (router, registry, connection, transport) = frame_env();
        let (client_id, _rx) = registry.register();

        connection.set_connected();
        handle_client_frame(
            &router,
            &registry,
            &connection,
            None,
            &client_id,
            &json!({"type":"publish","topic":"weri/system/reboot","payload":"reboot"}).to_string(),
        );
        assert_eq!(transport.payloads_for("weri/system/reboot"), vec!["reboot"]);
    }

    #[tokio::test]
    async fn malformed_frame_yields_error_reply() {
        let (router, registry, connection, _) = frame_env();
        let (client_id, mut rx) = registry.register();

        handle_client_frame(&router, &registry, &connection, None, &client_id, "not json");
        let reply: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(reply["type"], "error");
    }

    #[tokio::test]
    async fn health_and_archive_endpoints() {
        let archive_dir =
            std::env::temp_dir().join(format!("pidash-test-server-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&archive_dir).unwrap();
        std::fs::write(
            archive_dir.join("ergebnisse_2026_KW35.csv"),
            "machine;result\npress03;PASS\n",
        )
        .unwrap();

        let (router, _registry, connection, _) = frame_env();
        let config = HttpConfig {
            port: 0,
            max_send_queue: 32,
            archive_dir: archive_dir.clone(),
        };
        let shutdown = CancellationToken::new();
        let handle = start(config, router, connection, None, shutdown.clone())
            .await
            .unwrap();

        let base = format!("http://127.0.0.1:{}", handle.port);

        let health: serde_json::Value = reqwest::get(format!("{base}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "ok");
        assert_eq!(health["broker_connected"], false);

        let listing: serde_json::Value = reqwest::get(format!("{base}/api/archives"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(listing["archives"][0]["year"], 2026);
        assert_eq!(listing["archives"][0]["week"], 35);
        assert_eq!(
            listing["archives"][0]["files"][0]["name"],
            "ergebnisse_2026_KW35.csv"
        );

        let csv = reqwest::get(format!("{base}/api/archives/ergebnisse_2026_KW35.csv"))
            .await
            .unwrap();
        assert_eq!(csv.status(), reqwest::StatusCode::OK);
        assert!(csv.text().await.unwrap().contains("press03"));

        let missing = reqwest::get(format!("{base}/api/archives/nope_2026_KW1.csv"))
            .await
            .unwrap();
        assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

        shutdown.cancel();
    }
}
