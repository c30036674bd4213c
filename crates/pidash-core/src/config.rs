use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::Deserialize;

use crate::topic::TopicRule;

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Broker connection settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    /// Prefix for the generated client id; a unique suffix is appended.
    pub client_id_prefix: String,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub keep_alive_secs: u64,
    pub reconnect: ReconnectConfig,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 1883,
            client_id_prefix: "pidash".into(),
            username: None,
            password: None,
            keep_alive_secs: 60,
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Reconnect schedule. The defaults reproduce a fixed 5 s retry; a
/// multiplier above 1.0 turns it into capped exponential backoff.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 5_000,
            max_delay_ms: 5_000,
            multiplier: 1.0,
            max_attempts: None,
        }
    }
}

/// HTTP/WebSocket server settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub port: u16,
    /// Bounded per-client send queue; messages are dropped with a warning
    /// when a slow client falls behind.
    pub max_send_queue: usize,
    /// Directory holding the weekly production-line CSV archives.
    pub archive_dir: PathBuf,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 8088,
            max_send_queue: 256,
            archive_dir: PathBuf::from("/var/lib/pidash/archives"),
        }
    }
}

/// Telemetry sinks and retention.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Default log level name ("trace".."error"); RUST_LOG overrides.
    pub log_level: String,
    pub log_to_sqlite: bool,
    pub log_db_path: PathBuf,
    pub metrics_enabled: bool,
    pub metrics_db_path: PathBuf,
    pub metrics_snapshot_interval_secs: u64,
    pub metrics_retention_days: u32,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            log_to_sqlite: true,
            log_db_path: PathBuf::from("/var/lib/pidash/logs.db"),
            metrics_enabled: true,
            metrics_db_path: PathBuf::from("/var/lib/pidash/metrics.db"),
            metrics_snapshot_interval_secs: 60,
            metrics_retention_days: 7,
        }
    }
}

/// Top-level dashboard configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub broker: BrokerConfig,
    pub http: HttpConfig,
    pub telemetry: TelemetrySettings,
    /// Ordered wire-topic → internal-id table. First match wins.
    pub rules: Vec<TopicRule>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            http: HttpConfig::default(),
            telemetry: TelemetrySettings::default(),
            rules: default_topic_rules(),
        }
    }
}

impl DashboardConfig {
    /// Load from a TOML file; missing sections fall back to defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// The device's standard topic table: Pi system metrics, network state,
/// broker statistics and the wildcard production-test topics.
pub fn default_topic_rules() -> Vec<TopicRule> {
    vec![
        // System
        TopicRule::new("rpi/system/uptime", "system.uptime"),
        TopicRule::new("rpi/system/cpu/core1", "system.cpu.core1"),
        TopicRule::new("rpi/system/cpu/core2", "system.cpu.core2"),
        TopicRule::new("rpi/system/cpu/core3", "system.cpu.core3"),
        TopicRule::new("rpi/system/cpu/core4", "system.cpu.core4"),
        TopicRule::new("rpi/system/frequency/cpu", "system.cpu.frequency"),
        TopicRule::new("rpi/system/frequency/gpu", "system.gpu.frequency"),
        TopicRule::new("rpi/system/temperature/cpu", "system.temp.cpu"),
        TopicRule::new("rpi/system/temperature/gpu", "system.temp.gpu"),
        TopicRule::new("rpi/system/memory/ram", "system.memory.ram"),
        TopicRule::new("rpi/system/memory/swap", "system.memory.swap"),
        TopicRule::new("rpi/system/memory/disk", "system.memory.disk"),
        // Time synchronisation
        TopicRule::new("rpi/system/time", "system.time"),
        TopicRule::new("system/time/sync/result", "system.time.sync.result"),
        TopicRule::new("system/time/request", "system.time.request"),
        // Network
        TopicRule::new("rpi/network/wifi/clients", "network.wifi.clients"),
        TopicRule::new("rpi/network/wifi/status", "network.wifi.status"),
        TopicRule::new("rpi/network/mqtt/stats", "network.mqtt.stats"),
        TopicRule::new("rpi/network/mqtt/topics", "network.mqtt.topics"),
        // Broker internals (reserved namespace)
        TopicRule::new("$SYS/broker/uptime", "mqtt.broker.uptime"),
        TopicRule::new("$SYS/broker/messages/received", "mqtt.broker.messages.received"),
        TopicRule::new("$SYS/broker/messages/sent", "mqtt.broker.messages.sent"),
        // Production-line test results: the bench publishes on the bare
        // topic, the machines on a per-device one.
        TopicRule::new("test/result", "test.result"),
        TopicRule::new("weri/device/+/result", "test.result"),
        TopicRule::new("weri/device/+/confirmed", "test.confirmed"),
    ]
}
