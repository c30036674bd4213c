use std::sync::Arc;
use std::time::Duration;

use pidash_core::{BrokerConfig, ConnectionState, InboundMessage, Transport, TransportError};
use rumqttc::{AsyncClient, ConnectReturnCode, Event, MqttOptions, Packet, QoS};
use secrecy::ExposeSecret;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::reconnect::ReconnectPolicy;

// rumqttc rejects keep-alives under 5 s.
const MIN_KEEP_ALIVE_SECS: u64 = 5;

/// Broker-backed transport. Cheap to clone through the inner client; the
/// event loop runs in a separate task owned by [`MqttRuntime`].
pub struct MqttTransport {
    client: AsyncClient,
}

impl Transport for MqttTransport {
    fn try_publish(&self, wire_topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        self.client
            .try_publish(wire_topic, QoS::AtMostOnce, false, payload)
            .map_err(|_| TransportError::QueueFull)
    }
}

/// A running MQTT connection: the publish handle plus the event-loop task.
pub struct MqttRuntime {
    pub transport: Arc<MqttTransport>,
    pub task: JoinHandle<()>,
}

fn generate_client_id(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::now_v7().simple())
}

fn build_options(config: &BrokerConfig) -> Result<MqttOptions, TransportError> {
    if config.host.trim().is_empty() {
        return Err(TransportError::InvalidConfig("empty broker host".into()));
    }
    if config.client_id_prefix.trim().is_empty() {
        return Err(TransportError::InvalidConfig(
            "empty client id prefix".into(),
        ));
    }
    let mut options = MqttOptions::new(
        generate_client_id(&config.client_id_prefix),
        config.host.clone(),
        config.port,
    );
    options.set_keep_alive(Duration::from_secs(
        config.keep_alive_secs.max(MIN_KEEP_ALIVE_SECS),
    ));
    if let Some(username) = &config.username {
        let password = config
            .password
            .as_ref()
            .map(|p| p.expose_secret().to_owned())
            .unwrap_or_default();
        options.set_credentials(username.clone(), password);
    }
    Ok(options)
}

/// Connect to the broker and run the event loop until shutdown.
///
/// Incoming publishes are forwarded as [`InboundMessage`]s on `inbound`.
/// Every successful connect (initial or re-) flips `connection` and
/// re-issues all subscriptions, so a broker restart restores the full
/// topic set without outside help. Connection errors are retried on the
/// injected policy's schedule; credential refusals end the task.
pub fn start(
    config: &BrokerConfig,
    subscriptions: Vec<String>,
    connection: Arc<ConnectionState>,
    inbound: mpsc::Sender<InboundMessage>,
    policy: ReconnectPolicy,
    shutdown: CancellationToken,
) -> Result<MqttRuntime, TransportError> {
    let options = build_options(config)?;
    let (client, mut eventloop) = AsyncClient::new(options, 64);
    let transport = Arc::new(MqttTransport {
        client: client.clone(),
    });

    let task = tokio::spawn(async move {
        let mut attempt: u32 = 0;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    connection.set_disconnected();
                    debug!("mqtt event loop shutting down");
                    break;
                }
                event = eventloop.poll() => match event {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        if ack.code == ConnectReturnCode::Success {
                            attempt = 0;
                            connection.set_connected();
                            info!(
                                connects = connection.connect_count(),
                                "connected to broker"
                            );
                            for pattern in &subscriptions {
                                if let Err(err) =
                                    client.try_subscribe(pattern, QoS::AtMostOnce)
                                {
                                    warn!(pattern = %pattern, error = %err, "subscribe failed");
                                }
                            }
                        } else {
                            connection.set_disconnected();
                            error!(code = ?ack.code, "broker refused connection");
                            if matches!(
                                ack.code,
                                ConnectReturnCode::BadUserNamePassword
                                    | ConnectReturnCode::NotAuthorized
                            ) {
                                break;
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let message = InboundMessage {
                            wire_topic: publish.topic.clone(),
                            payload: String::from_utf8_lossy(&publish.payload).into_owned(),
                        };
                        if inbound.send(message).await.is_err() {
                            warn!("ingest channel closed, stopping event loop");
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(err) => {
                        connection.set_disconnected();
                        match policy.delay(attempt) {
                            Some(delay) => {
                                warn!(
                                    attempt,
                                    delay_ms = delay.as_millis() as u64,
                                    error = %err,
                                    "broker connection error, retrying"
                                );
                                attempt += 1;
                                tokio::select! {
                                    _ = shutdown.cancelled() => break,
                                    _ = tokio::time::sleep(delay) => {}
                                }
                            }
                            None => {
                                error!(error = %err, "reconnect attempts exhausted");
                                break;
                            }
                        }
                    }
                }
            }
        }
    });

    Ok(MqttRuntime { transport, task })
}
