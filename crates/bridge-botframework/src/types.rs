//! Bot Framework activity types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Activity type names
pub mod activity_types {
    pub const MESSAGE: &str = "message";
    pub const TRACE: &str = "trace";
    pub const CONVERSATION_UPDATE: &str = "conversationUpdate";
}

/// A user or bot on a channel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelAccount {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Conversation reference
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationAccount {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_group: Option<bool>,
}

/// Bot Framework activity
///
/// 未使用のフィールドは保持しない。受信・送信とも必要最小限のみ扱う。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(rename = "type")]
    pub activity_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<ConversationAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

impl Activity {
    pub fn is_message(&self) -> bool {
        self.activity_type == activity_types::MESSAGE
    }

    /// Sender id and text of a user message
    ///
    /// Returns `None` for other activity types and for messages without text
    /// or without a sender id.
    pub fn user_message(&self) -> Option<(&str, &str)> {
        if !self.is_message() {
            return None;
        }
        let user_id = self
            .from
            .as_ref()
            .map(|from| from.id.as_str())
            .filter(|id| !id.is_empty())?;
        let text = self.text.as_deref().filter(|text| !text.is_empty())?;
        Some((user_id, text))
    }

    /// Message activity answering this one
    pub fn reply(&self, text: impl Into<String>) -> Activity {
        Activity {
            text: Some(text.into()),
            ..self.outgoing(activity_types::MESSAGE)
        }
    }

    /// Trace activity attached to this conversation
    pub fn trace(
        &self,
        name: &str,
        value: serde_json::Value,
        value_type: &str,
        label: &str,
    ) -> Activity {
        Activity {
            name: Some(name.to_string()),
            label: Some(label.to_string()),
            value_type: Some(value_type.to_string()),
            value: Some(value),
            ..self.outgoing(activity_types::TRACE)
        }
    }

    /// Addressing for an activity sent back into this conversation
    fn outgoing(&self, activity_type: &str) -> Activity {
        Activity {
            activity_type: activity_type.to_string(),
            timestamp: Some(Utc::now()),
            service_url: self.service_url.clone(),
            channel_id: self.channel_id.clone(),
            from: self.recipient.clone(),
            recipient: self.from.clone(),
            conversation: self.conversation.clone(),
            reply_to_id: self.id.clone(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMULATOR_MESSAGE: &str = r#"{
        "type": "message",
        "id": "act-1",
        "timestamp": "2024-05-01T10:00:00.000Z",
        "serviceUrl": "http://localhost:52000",
        "channelId": "emulator",
        "from": { "id": "user-1", "name": "User", "role": "user" },
        "conversation": { "id": "conv-1" },
        "recipient": { "id": "bot-1", "name": "Bot", "role": "bot" },
        "text": "hello",
        "locale": "en-US",
        "entities": []
    }"#;

    #[test]
    fn test_deserialize_message() {
        let activity: Activity = serde_json::from_str(EMULATOR_MESSAGE).unwrap();

        assert!(activity.is_message());
        assert_eq!(activity.service_url.as_deref(), Some("http://localhost:52000"));
        assert_eq!(activity.conversation.as_ref().unwrap().id, "conv-1");
        assert_eq!(activity.user_message(), Some(("user-1", "hello")));
    }

    #[test]
    fn test_user_message_filters() {
        let update: Activity = serde_json::from_str(
            r#"{"type":"conversationUpdate","from":{"id":"user-1"},"membersAdded":[]}"#,
        )
        .unwrap();
        assert!(update.user_message().is_none());

        let no_text: Activity =
            serde_json::from_str(r#"{"type":"message","from":{"id":"user-1"}}"#).unwrap();
        assert!(no_text.user_message().is_none());

        let empty_text: Activity =
            serde_json::from_str(r#"{"type":"message","from":{"id":"user-1"},"text":""}"#)
                .unwrap();
        assert!(empty_text.user_message().is_none());

        let no_sender: Activity = serde_json::from_str(r#"{"type":"message","text":"hi"}"#).unwrap();
        assert!(no_sender.user_message().is_none());
    }

    #[test]
    fn test_reply_addressing() {
        let activity: Activity = serde_json::from_str(EMULATOR_MESSAGE).unwrap();
        let reply = activity.reply("hi there");

        assert_eq!(reply.activity_type, activity_types::MESSAGE);
        assert_eq!(reply.text.as_deref(), Some("hi there"));
        assert_eq!(reply.from.as_ref().unwrap().id, "bot-1");
        assert_eq!(reply.recipient.as_ref().unwrap().id, "user-1");
        assert_eq!(reply.reply_to_id.as_deref(), Some("act-1"));
        assert_eq!(reply.conversation, activity.conversation);
        assert!(reply.id.is_none());
    }

    #[test]
    fn test_trace_serialization() {
        let activity: Activity = serde_json::from_str(EMULATOR_MESSAGE).unwrap();
        let trace = activity.trace(
            "OnTurnError Trace",
            serde_json::json!("boom"),
            "https://www.botframework.com/schemas/error",
            "TurnError",
        );

        let json = serde_json::to_value(&trace).unwrap();
        assert_eq!(json["type"], "trace");
        assert_eq!(json["valueType"], "https://www.botframework.com/schemas/error");
        assert_eq!(json["label"], "TurnError");
        assert_eq!(json["value"], "boom");
        assert_eq!(json["replyToId"], "act-1");
        assert!(json.get("text").is_none());
    }
}
