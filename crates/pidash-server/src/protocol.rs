use pidash_core::{NormalizedMessage, TopicId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Frames sent by a dashboard page over the WebSocket.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Register a widget with its internal-id subscriptions
    /// (`system.*`, `network.wifi.clients`, ...).
    Register {
        widget_id: String,
        subscriptions: Vec<String>,
    },
    /// Remove a widget; its subscriptions stop matching immediately.
    Unregister { widget_id: String },
    /// Publish a command to the broker on a wire topic
    /// (`weri/system/reboot`, `system/time/sync/command`).
    Publish { topic: String, payload: Value },
}

/// Frames sent to a dashboard page.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// A routed metric update for one internal topic.
    Update {
        topic: TopicId,
        data: NormalizedMessage,
    },
    /// Broker connectivity changed (also sent once on register).
    Connection { connected: bool },
    /// A request could not be honored.
    Error { message: String },
}

impl ServerFrame {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"type":"error","message":"frame serialization failed"}"#.to_owned()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn register_frame_parses() {
        let frame: ClientFrame = serde_json::from_str(
            r#"{"type":"register","widget_id":"servermonitoring","subscriptions":["system.*"]}"#,
        )
        .unwrap();
        match frame {
            ClientFrame::Register {
                widget_id,
                subscriptions,
            } => {
                assert_eq!(widget_id, "servermonitoring");
                assert_eq!(subscriptions, vec!["system.*"]);
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn publish_frame_accepts_string_and_object_payloads() {
        let s: ClientFrame = serde_json::from_str(
            r#"{"type":"publish","topic":"weri/system/reboot","payload":"reboot"}"#,
        )
        .unwrap();
        assert!(matches!(s, ClientFrame::Publish { .. }));

        let o: ClientFrame = serde_json::from_value(json!({
            "type": "publish",
            "topic": "system/time/sync/command",
            "payload": {"action": "sync"}
        }))
        .unwrap();
        assert!(matches!(o, ClientFrame::Publish { .. }));
    }

    #[test]
    fn update_frame_shape() {
        let frame = ServerFrame::Update {
            topic: TopicId::new("system.temp.cpu"),
            data: NormalizedMessage::new(42.7, "42.7°C"),
        };
        let json: Value = serde_json::from_str(&frame.to_json()).unwrap();
        assert_eq!(json["type"], "update");
        assert_eq!(json["topic"], "system.temp.cpu");
        assert_eq!(json["data"]["formatted"], "42.7°C");
    }

    #[test]
    fn unknown_frame_type_is_an_error() {
        let result = serde_json::from_str::<ClientFrame>(r#"{"type":"subscribe"}"#);
        assert!(result.is_err());
    }
}
