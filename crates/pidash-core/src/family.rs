use crate::topic::TopicId;

/// Formatting family of an internal identifier.
///
/// Resolved from the identifier by an ordered predicate list. The order is
/// load-bearing: identifiers can satisfy several predicates (e.g.
/// `mqtt.broker.uptime` contains both `uptime` and `mqtt`) and the first
/// match decides the format. Changing the order silently changes output
/// for those identifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MetricFamily {
    /// Seconds since boot, rendered as `{d}j {hh}h {mm}m {ss}s`.
    Uptime,
    /// Per-core CPU load, one-decimal percent.
    CpuCore,
    /// Memory/swap/disk usage, one-decimal percent; `-1` means unavailable.
    Percent,
    /// One-decimal Celsius.
    Temperature,
    /// Collector reports GHz already; two decimals.
    CpuFrequency,
    /// Collector reports MHz; no decimals.
    GpuFrequency,
    /// Time-sync payloads: epoch-seconds passthrough plus display string.
    Time,
    /// Wi-Fi client/status structures, passed through.
    Wifi,
    /// Broker statistics, passed through.
    Broker,
    /// Anything else: raw passthrough with string coercion.
    Other,
}

impl MetricFamily {
    /// Classify an internal identifier. First matching predicate wins.
    ///
    /// Temperature identifiers spell the segment `temp` (`system.temp.cpu`),
    /// so the predicate matches that substring rather than `temperature`.
    pub fn classify(id: &TopicId) -> Self {
        let id = id.as_str();
        if id.contains("uptime") {
            Self::Uptime
        } else if id.contains("cpu") && id.contains("core") {
            Self::CpuCore
        } else if id.contains("memory") || id.contains("swap") || id.contains("disk") {
            Self::Percent
        } else if id.contains("temp") {
            Self::Temperature
        } else if id.contains("frequency") {
            if id.contains("cpu") {
                Self::CpuFrequency
            } else {
                Self::GpuFrequency
            }
        } else if id == "system.time" || id.contains("time") {
            Self::Time
        } else if id == "network.wifi.clients" || id == "network.wifi.status" {
            Self::Wifi
        } else if id.contains("mqtt") {
            Self::Broker
        } else {
            Self::Other
        }
    }
}
