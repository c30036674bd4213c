pub mod config;
pub mod connection;
pub mod errors;
pub mod family;
pub mod message;
pub mod topic;
pub mod transport;

pub use config::{
    BrokerConfig, ConfigError, DashboardConfig, HttpConfig, ReconnectConfig, TelemetrySettings,
};
pub use connection::ConnectionState;
pub use errors::TransportError;
pub use family::MetricFamily;
pub use message::{InboundMessage, NormalizedMessage, RawValue, Update};
pub use topic::{TopicId, TopicRule};
pub use transport::Transport;
