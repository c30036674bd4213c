use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::topic::TopicId;

/// Best-effort typed raw value carried by a normalized message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Integer(i64),
    Number(f64),
    Text(String),
    Json(Value),
}

impl RawValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(n) => Some(*n as f64),
            Self::Number(n) => Some(*n),
            Self::Text(_) | Self::Json(_) => None,
        }
    }

    /// String coercion for display fallback. Whole floats render without
    /// a trailing `.0` so `42.0` coerces to `"42"`.
    pub fn coerce_string(&self) -> String {
        match self {
            Self::Integer(n) => n.to_string(),
            Self::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            Self::Text(s) => s.clone(),
            Self::Json(v) => serde_json::to_string(v).unwrap_or_default(),
        }
    }
}

impl From<f64> for RawValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for RawValue {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<Value> for RawValue {
    fn from(v: Value) -> Self {
        Self::Json(v)
    }
}

/// The record handed to widgets: always a raw value and a display-ready
/// string, plus family-specific extra fields flattened into the wire
/// object (`timestamp`, `uptime_formatted`, Wi-Fi passthrough fields, ...).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizedMessage {
    pub raw: RawValue,
    pub formatted: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NormalizedMessage {
    pub fn new(raw: impl Into<RawValue>, formatted: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            formatted: formatted.into(),
            extra: Map::new(),
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub fn extra_field(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}

/// A wire message delivered by the transport, before mapping.
#[derive(Clone, Debug)]
pub struct InboundMessage {
    pub wire_topic: String,
    pub payload: String,
}

/// A routed message: internal id plus the normalized record.
#[derive(Clone, Debug, Serialize)]
pub struct Update {
    pub topic: TopicId,
    pub data: NormalizedMessage,
}
