use crate::errors::TransportError;

/// Outbound seam to the broker client.
///
/// The router publishes through this trait so the distribution layer never
/// depends on a concrete MQTT implementation; tests substitute a recording
/// mock.
pub trait Transport: Send + Sync {
    /// Queue a message for publication without blocking the caller.
    fn try_publish(&self, wire_topic: &str, payload: Vec<u8>) -> Result<(), TransportError>;
}
