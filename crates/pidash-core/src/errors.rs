/// Typed error hierarchy for broker transport operations.
/// Classifies errors as fatal (reconfigure and restart) or retryable.
#[derive(Clone, Debug, thiserror::Error)]
pub enum TransportError {
    // Fatal — a retry with the same configuration cannot succeed
    #[error("invalid broker configuration: {0}")]
    InvalidConfig(String),
    #[error("broker refused credentials")]
    AuthRefused,

    // Retryable
    #[error("not connected to broker")]
    NotConnected,
    #[error("outbound request queue full")]
    QueueFull,
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    // Operational
    #[error("transport shut down")]
    Shutdown,
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NotConnected | Self::QueueFull | Self::ConnectionLost(_)
        )
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvalidConfig(_) | Self::AuthRefused)
    }

    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "invalid_config",
            Self::AuthRefused => "auth_refused",
            Self::NotConnected => "not_connected",
            Self::QueueFull => "queue_full",
            Self::ConnectionLost(_) => "connection_lost",
            Self::Shutdown => "shutdown",
        }
    }
}
