//! Inbound messages fetched from a driver.

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

/// Message type of a plain text chat message.
pub const CHAT_KIND: &str = "chat";

/// Suffix WhatsApp uses for individual user ids.
pub const USER_SUFFIX: &str = "@c.us";

/// Unread messages of a single chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageGroup {
    pub chat_id: String,
    #[serde(default)]
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub id: String,
    /// WhatsApp message type (`chat`, `image`, `ptt`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    pub sender: String,
    #[serde(default)]
    pub content: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn is_chat(&self) -> bool {
        self.kind == CHAT_KIND
    }
}

/// Append the user suffix to a bare phone number.
pub fn normalize_recipient(recipient: &str) -> String {
    if recipient.contains(USER_SUFFIX) {
        recipient.to_string()
    } else {
        format!("{recipient}{USER_SUFFIX}")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn normalize_bare_number() {
        assert_eq!(normalize_recipient("5511999999999"), "5511999999999@c.us");
    }

    #[test]
    fn normalize_keeps_suffix() {
        assert_eq!(
            normalize_recipient("5511999999999@c.us"),
            "5511999999999@c.us"
        );
    }

    #[test]
    fn deserialize_group() {
        let json = r#"{
            "chatId": "5511999999999@c.us",
            "messages": [
                {"id": "m1", "type": "chat", "sender": "5511999999999@c.us",
                 "content": "hello", "timestamp": 1700000000},
                {"id": "m2", "type": "image", "sender": "5511999999999@c.us",
                 "timestamp": 1700000005}
            ]
        }"#;
        let group: MessageGroup = serde_json::from_str(json).unwrap();
        assert_eq!(group.messages.len(), 2);
        assert!(group.messages[0].is_chat());
        assert!(!group.messages[1].is_chat());
        assert_eq!(group.messages[1].content, "");
        assert_eq!(group.messages[0].timestamp.timestamp(), 1_700_000_000);
    }
}
