use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TextContent {
    pub text: String,
    #[serde(default)]
    pub mentions: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImageContent {
    pub file_key: String,
    #[serde(default)]
    pub width: i32,
    #[serde(default)]
    pub height: i32,
    #[serde(default)]
    pub size: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VideoContent {
    pub file_key: String,
    pub cover_file_key: Option<String>,
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub width: i32,
    #[serde(default)]
    pub height: i32,
    #[serde(default)]
    pub size: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileContent {
    pub file_key: String,
    pub name: String,
    #[serde(default)]
    pub size: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VoiceContent {
    pub file_key: String,
    #[serde(default)]
    pub duration: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EmojiContent {
    pub emoji_id: String,
    pub file_key: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationContent {
    pub text: String,
    #[serde(default)]
    pub extra: Value,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AudioFileContent {
    pub file_key: String,
    pub name: String,
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub size: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReplyContent {
    pub reply_message_id: String,
    #[serde(default)]
    pub reply_summary: String,
    pub content: Box<MessagePayload>,
}

/// Body of a chat message, tagged by its `msgType`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type", content = "body", rename_all = "camelCase")]
pub enum MessagePayload {
    Text(TextContent),
    Image(ImageContent),
    Video(VideoContent),
    File(FileContent),
    Voice(VoiceContent),
    Emoji(EmojiContent),
    Notification(NotificationContent),
    AudioFile(AudioFileContent),
    Reply(ReplyContent),
}

impl MessagePayload {
    pub fn text(text: impl Into<String>) -> Self {
        MessagePayload::Text(TextContent {
            text: text.into(),
            mentions: vec![],
        })
    }

    pub fn msg_type(&self) -> &'static str {
        match self {
            MessagePayload::Text(_) => "text",
            MessagePayload::Image(_) => "image",
            MessagePayload::Video(_) => "video",
            MessagePayload::File(_) => "file",
            MessagePayload::Voice(_) => "voice",
            MessagePayload::Emoji(_) => "emoji",
            MessagePayload::Notification(_) => "notification",
            MessagePayload::AudioFile(_) => "audioFile",
            MessagePayload::Reply(_) => "reply",
        }
    }

    /// Rebuilds a payload from the `(msgType, payload)` column pair.
    pub fn from_parts(msg_type: &str, body: Value) -> serde_json::Result<Self> {
        serde_json::from_value(json!({ "type": msg_type, "body": body }))
    }

    /// The untagged body, as stored next to `msg_type`.
    pub fn body(&self) -> serde_json::Result<Value> {
        let mut tagged = serde_json::to_value(self)?;
        Ok(tagged
            .get_mut("body")
            .map(std::mem::take)
            .unwrap_or(Value::Null))
    }

    /// Content-addressed attachment carried by this message, if any.
    pub fn file_key(&self) -> Option<&str> {
        match self {
            MessagePayload::Image(c) => Some(&c.file_key),
            MessagePayload::Video(c) => Some(&c.file_key),
            MessagePayload::File(c) => Some(&c.file_key),
            MessagePayload::Voice(c) => Some(&c.file_key),
            MessagePayload::Emoji(c) => Some(&c.file_key),
            MessagePayload::AudioFile(c) => Some(&c.file_key),
            MessagePayload::Reply(c) => c.content.file_key(),
            MessagePayload::Text(_) | MessagePayload::Notification(_) => None,
        }
    }

    /// Short preview used for a conversation's last message.
    pub fn summary(&self) -> String {
        match self {
            MessagePayload::Text(c) => c.text.clone(),
            MessagePayload::Image(_) => "[Image]".to_string(),
            MessagePayload::Video(_) => "[Video]".to_string(),
            MessagePayload::File(c) => format!("[File] {}", c.name),
            MessagePayload::Voice(_) => "[Voice]".to_string(),
            MessagePayload::Emoji(_) => "[Emoji]".to_string(),
            MessagePayload::Notification(c) => c.text.clone(),
            MessagePayload::AudioFile(c) => format!("[Audio] {}", c.name),
            MessagePayload::Reply(c) => c.content.summary(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
struct RawChatMessage {
    message_id: String,
    conversation_id: String,
    seq: i64,
    send_user_id: String,
    msg_type: String,
    #[serde(default)]
    payload: Value,
    created_at: i64,
}

/// A chat message as delivered by `chat/sync` and by push. The payload is
/// decoded once, here.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(try_from = "RawChatMessage", into = "RawChatMessage")]
pub struct ChatMessage {
    pub message_id: String,
    pub conversation_id: String,
    pub seq: i64,
    pub send_user_id: String,
    pub payload: MessagePayload,
    pub created_at: i64,
}

impl TryFrom<RawChatMessage> for ChatMessage {
    type Error = serde_json::Error;

    fn try_from(raw: RawChatMessage) -> Result<Self, Self::Error> {
        Ok(ChatMessage {
            payload: MessagePayload::from_parts(&raw.msg_type, raw.payload)?,
            message_id: raw.message_id,
            conversation_id: raw.conversation_id,
            seq: raw.seq,
            send_user_id: raw.send_user_id,
            created_at: raw.created_at,
        })
    }
}

impl From<ChatMessage> for RawChatMessage {
    fn from(message: ChatMessage) -> Self {
        RawChatMessage {
            msg_type: message.payload.msg_type().to_string(),
            payload: message.payload.body().unwrap_or(Value::Null),
            message_id: message.message_id,
            conversation_id: message.conversation_id,
            seq: message.seq,
            send_user_id: message.send_user_id,
            created_at: message.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_parts() {
        let payload = MessagePayload::from_parts(
            "image",
            json!({"fileKey": "0cc175b9c0f1b6a831c399e269772661.png", "width": 3}),
        )
        .unwrap();
        assert_eq!(payload.msg_type(), "image");
        assert_eq!(
            payload.file_key(),
            Some("0cc175b9c0f1b6a831c399e269772661.png")
        );
        assert_eq!(payload.body().unwrap()["width"], json!(3));
        assert_eq!(payload.summary(), "[Image]");
    }

    #[test]
    fn unknown_msg_type_is_rejected() {
        assert!(MessagePayload::from_parts("hologram", json!({})).is_err());
        let raw = json!({
            "messageId": "m", "conversationId": "c", "seq": 1, "sendUserId": "u",
            "msgType": "hologram", "payload": {}, "createdAt": 0
        });
        assert!(serde_json::from_value::<ChatMessage>(raw).is_err());
    }

    #[test]
    fn reply_nests_a_payload() {
        let message: ChatMessage = serde_json::from_value(json!({
            "messageId": "m2", "conversationId": "c", "seq": 9, "sendUserId": "u",
            "msgType": "reply",
            "payload": {
                "replyMessageId": "m1",
                "content": {"type": "voice", "body": {"fileKey": "k.amr", "duration": 3}}
            },
            "createdAt": 5
        }))
        .unwrap();
        assert_eq!(message.payload.file_key(), Some("k.amr"));
        assert_eq!(message.payload.summary(), "[Voice]");

        let raw = serde_json::to_value(&message).unwrap();
        assert_eq!(raw["msgType"], json!("reply"));
        assert_eq!(raw["payload"]["replyMessageId"], json!("m1"));
    }
}
