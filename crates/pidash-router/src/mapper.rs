use pidash_core::{TopicId, TopicRule};

/// One pattern segment: a literal or a single-level `+` wildcard.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Any,
}

#[derive(Debug)]
struct CompiledRule {
    segments: Vec<Segment>,
    internal_id: TopicId,
}

impl CompiledRule {
    fn compile(rule: &TopicRule) -> Self {
        let segments = rule
            .wire_pattern
            .split('/')
            .map(|s| {
                if s == "+" {
                    Segment::Any
                } else {
                    Segment::Literal(s.to_owned())
                }
            })
            .collect();
        Self {
            segments,
            internal_id: rule.internal_id.clone(),
        }
    }

    /// A topic matches when it has the same number of segments and every
    /// literal segment is equal. `+` never spans a `/`.
    fn matches(&self, wire_topic: &str) -> bool {
        let mut segments = self.segments.iter();
        for part in wire_topic.split('/') {
            match segments.next() {
                Some(Segment::Any) => {}
                Some(Segment::Literal(lit)) if lit == part => {}
                _ => return false,
            }
        }
        segments.next().is_none()
    }
}

/// Compiled wire-topic → internal-id table.
///
/// Rules are checked in table order and the first match wins, so overlap
/// between an exact rule and a wildcard rule resolves deterministically.
/// Unknown topics resolve to `None`; the caller decides whether to count
/// and drop them.
#[derive(Debug)]
pub struct TopicMap {
    rules: Vec<CompiledRule>,
}

impl TopicMap {
    pub fn new(rules: &[TopicRule]) -> Self {
        Self {
            rules: rules.iter().map(CompiledRule::compile).collect(),
        }
    }

    pub fn resolve(&self, wire_topic: &str) -> Option<&TopicId> {
        self.rules
            .iter()
            .find(|r| r.matches(wire_topic))
            .map(|r| &r.internal_id)
    }

    /// Wire patterns to subscribe to on the broker, in table order.
    pub fn wire_patterns(&self) -> Vec<String> {
        self.rules
            .iter()
            .map(|r| {
                r.segments
                    .iter()
                    .map(|s| match s {
                        Segment::Literal(lit) => lit.as_str(),
                        Segment::Any => "+",
                    })
                    .collect::<Vec<_>>()
                    .join("/")
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
