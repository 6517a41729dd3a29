//! Wire types for communication with the browser-automation sidecar.

use serde::{Deserialize, Serialize};

use crate::config::LaunchOptions;

/// Commands sent from the gateway to the sidecar.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    Launch {
        #[serde(rename = "clientId")]
        client_id: String,
        #[serde(rename = "profileDir")]
        profile_dir: String,
        options: LaunchOptions,
        args: Vec<String>,
    },
    Status,
    Qr,
    Screenshot,
    SendText {
        to: String,
        text: String,
    },
    SendMedia {
        to: String,
        path: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
    GetUnread,
    MarkSeen {
        #[serde(rename = "chatId")]
        chat_id: String,
    },
    Quit,
}

impl Command {
    /// Short name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Launch { .. } => "launch",
            Self::Status => "status",
            Self::Qr => "qr",
            Self::Screenshot => "screenshot",
            Self::SendText { .. } => "send_text",
            Self::SendMedia { .. } => "send_media",
            Self::GetUnread => "get_unread",
            Self::MarkSeen { .. } => "mark_seen",
            Self::Quit => "quit",
        }
    }
}

/// A command tagged with the id its reply will carry.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    #[serde(rename = "requestId")]
    pub request_id: String,
    #[serde(flatten)]
    pub command: Command,
}

/// Messages received from the sidecar.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SidecarMessage {
    #[serde(rename = "result")]
    Reply(Reply),
    Event {
        event: String,
        #[serde(default)]
        detail: Option<String>,
    },
}

/// Answer to a single [`Envelope`].
#[derive(Debug, Clone, Deserialize)]
pub struct Reply {
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub ok: bool,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Payload of `qr` and `screenshot` replies.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageData {
    /// Base64-encoded PNG, optionally as a `data:` URL.
    pub png: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn envelope_flattens_command() {
        let env = Envelope {
            request_id: "r1".into(),
            command: Command::SendText {
                to: "5511999999999@c.us".into(),
                text: "hi".into(),
            },
        };
        let v = serde_json::to_value(&env).unwrap();
        assert_eq!(v["type"], "send_text");
        assert_eq!(v["requestId"], "r1");
        assert_eq!(v["to"], "5511999999999@c.us");
        assert_eq!(v["text"], "hi");
    }

    #[test]
    fn unit_command_serializes_tag_only() {
        let env = Envelope {
            request_id: "r2".into(),
            command: Command::GetUnread,
        };
        let v = serde_json::to_value(&env).unwrap();
        assert_eq!(v, serde_json::json!({"requestId": "r2", "type": "get_unread"}));
    }

    #[test]
    fn parse_reply_and_event() {
        let msg: SidecarMessage = serde_json::from_str(
            r#"{"type": "result", "requestId": "r1", "ok": false, "error": "no chat"}"#,
        )
        .unwrap();
        match msg {
            SidecarMessage::Reply(reply) => {
                assert!(!reply.ok);
                assert_eq!(reply.error.as_deref(), Some("no chat"));
                assert!(reply.data.is_none());
            },
            SidecarMessage::Event { .. } => panic!("expected reply"),
        }

        let msg: SidecarMessage =
            serde_json::from_str(r#"{"type": "event", "event": "logged_out"}"#).unwrap();
        assert!(matches!(msg, SidecarMessage::Event { ref event, .. } if event == "logged_out"));
    }
}
