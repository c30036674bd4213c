use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Internal dotted identifier for a metric stream (e.g. `system.cpu.core1`).
///
/// Decoupled from the wire topic spelling: widgets subscribe to these,
/// never to raw broker topics.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicId(String);

impl TopicId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TopicId {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_owned()))
    }
}

impl AsRef<str> for TopicId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TopicId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// One entry of the wire-topic → internal-id table.
///
/// `wire_pattern` may contain single-level `+` wildcard segments. Patterns
/// are unique across the table; when two overlap anyway, the first rule in
/// table order wins.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicRule {
    pub wire_pattern: String,
    pub internal_id: TopicId,
}

impl TopicRule {
    pub fn new(wire_pattern: impl Into<String>, internal_id: impl Into<String>) -> Self {
        Self {
            wire_pattern: wire_pattern.into(),
            internal_id: TopicId::new(internal_id),
        }
    }
}
