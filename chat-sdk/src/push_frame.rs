use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{AsRefStr, Display, EnumString};

use crate::api::deserialize_id;
use crate::{ChatMessage, NotificationEvent, NotificationInboxItem};

/// Top level switch of an inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    ChatMessage,
    FriendOperation,
    GroupOperation,
    ConversationOperation,
    EmojiOperation,
    Notification,
    UserProfile,
    Heartbeat,
}

/// Values of `content.data.type`, per command.
pub mod data_type {
    pub const MESSAGE: &str = "message";
    pub const RECALL: &str = "recall";
    pub const READ: &str = "read";

    pub const VERIFY: &str = "verify";
    pub const FRIEND_ADD: &str = "add";
    pub const FRIEND_UPDATE: &str = "update";
    pub const FRIEND_DELETE: &str = "delete";

    pub const GROUP_INFO: &str = "info";
    pub const GROUP_MEMBER: &str = "member";
    pub const GROUP_JOIN_REQUEST: &str = "join_request";

    pub const CONVERSATION_META: &str = "meta";
    pub const CONVERSATION_SETTING: &str = "setting";

    pub const EMOJI: &str = "emoji";
    pub const EMOJI_PACKAGE: &str = "package";
    pub const EMOJI_RELATION: &str = "relation";
    pub const EMOJI_COLLECT: &str = "collect";

    pub const NOTIFICATION_EVENT: &str = "event";
    pub const PROFILE: &str = "profile";
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PushFrame {
    pub command: String,
    pub content: PushContent,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PushContent {
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub data: PushData,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PushData {
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default)]
    pub body: Value,
}

impl PushFrame {
    pub fn new(command: Command, data_type: &str, body: Value) -> Self {
        PushFrame {
            command: command.to_string(),
            content: PushContent {
                timestamp: chrono::Utc::now().timestamp_millis(),
                message_id: Some(uuid::Uuid::new_v4().to_string()),
                data: PushData {
                    data_type: data_type.to_string(),
                    body,
                },
            },
        }
    }

    pub fn heartbeat() -> Self {
        PushFrame {
            command: Command::Heartbeat.to_string(),
            content: PushContent {
                timestamp: chrono::Utc::now().timestamp_millis(),
                message_id: None,
                data: PushData {
                    data_type: "ping".to_string(),
                    body: Value::Null,
                },
            },
        }
    }

    /// `None` for commands this client does not know.
    pub fn command(&self) -> Option<Command> {
        Command::from_str(&self.command).ok()
    }

    pub fn data_type(&self) -> &str {
        &self.content.data.data_type
    }

    pub fn body(&self) -> &Value {
        &self.content.data.body
    }
}

/// "Something about row `id` changed, at `version` if known."
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResyncHint {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default)]
    pub version: Option<i64>,
}

impl ResyncHint {
    pub fn new(id: impl Into<String>, version: Option<i64>) -> Self {
        ResyncHint {
            id: id.into(),
            version,
        }
    }
}

/// `CHAT_MESSAGE/read` and `CHAT_MESSAGE/recall` bodies.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationHint {
    pub conversation_id: String,
    #[serde(default)]
    pub seq: Option<i64>,
    #[serde(default)]
    pub version: Option<i64>,
}

/// `NOTIFICATION/event` body, carrying full data.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NotificationPush {
    pub event: NotificationEvent,
    #[serde(default)]
    pub inbox: Option<NotificationInboxItem>,
}

/// Typed view of a frame, decoded once at the router boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    Heartbeat,
    ChatMessages(Vec<ChatMessage>),
    ConversationChanged(ConversationHint),
    UserConversationChanged(ConversationHint),
    FriendChanged(Vec<ResyncHint>),
    FriendVerifyChanged(Vec<ResyncHint>),
    GroupChanged(Vec<ResyncHint>),
    GroupMemberChanged(Vec<ResyncHint>),
    GroupJoinRequestChanged(Vec<ResyncHint>),
    EmojiChanged(Vec<ResyncHint>),
    EmojiPackageChanged(Vec<ResyncHint>),
    EmojiRelationChanged(Vec<ResyncHint>),
    EmojiCollectChanged(Vec<ResyncHint>),
    Notification(Box<NotificationPush>),
    UserProfile(Value),
}

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("unknown type {data_type} for command {command}")]
    UnknownType { command: Command, data_type: String },
    #[error("malformed body of {command}/{data_type}: {source}")]
    Body {
        command: Command,
        data_type: String,
        source: serde_json::Error,
    },
}

/// Bodies may carry one item or a list of them.
fn one_or_many<T: serde::de::DeserializeOwned>(body: &Value) -> serde_json::Result<Vec<T>> {
    match body {
        Value::Array(_) => serde_json::from_value(body.clone()),
        _ => Ok(vec![serde_json::from_value(body.clone())?]),
    }
}

impl PushEvent {
    pub fn decode(frame: &PushFrame) -> Result<Self, DecodeError> {
        let command = frame
            .command()
            .ok_or_else(|| DecodeError::UnknownCommand(frame.command.clone()))?;
        let data_type = frame.data_type();
        let body = frame.body();
        let wrap = |source| DecodeError::Body {
            command,
            data_type: data_type.to_string(),
            source,
        };
        let unknown = || DecodeError::UnknownType {
            command,
            data_type: data_type.to_string(),
        };

        let event = match command {
            Command::Heartbeat => PushEvent::Heartbeat,
            Command::UserProfile => PushEvent::UserProfile(body.clone()),
            Command::ChatMessage => match data_type {
                data_type::MESSAGE => PushEvent::ChatMessages(one_or_many(body).map_err(wrap)?),
                data_type::RECALL => PushEvent::ConversationChanged(
                    serde_json::from_value(body.clone()).map_err(wrap)?,
                ),
                data_type::READ => PushEvent::UserConversationChanged(
                    serde_json::from_value(body.clone()).map_err(wrap)?,
                ),
                _ => return Err(unknown()),
            },
            Command::ConversationOperation => {
                let hint: ConversationHint = serde_json::from_value(body.clone()).map_err(wrap)?;
                match data_type {
                    data_type::CONVERSATION_META => PushEvent::ConversationChanged(hint),
                    data_type::CONVERSATION_SETTING => PushEvent::UserConversationChanged(hint),
                    _ => return Err(unknown()),
                }
            }
            Command::FriendOperation => {
                let hints = one_or_many(body).map_err(wrap)?;
                match data_type {
                    data_type::VERIFY => PushEvent::FriendVerifyChanged(hints),
                    data_type::FRIEND_ADD | data_type::FRIEND_UPDATE | data_type::FRIEND_DELETE => {
                        PushEvent::FriendChanged(hints)
                    }
                    _ => return Err(unknown()),
                }
            }
            Command::GroupOperation => {
                let hints = one_or_many(body).map_err(wrap)?;
                match data_type {
                    data_type::GROUP_INFO => PushEvent::GroupChanged(hints),
                    data_type::GROUP_MEMBER => PushEvent::GroupMemberChanged(hints),
                    data_type::GROUP_JOIN_REQUEST => PushEvent::GroupJoinRequestChanged(hints),
                    _ => return Err(unknown()),
                }
            }
            Command::EmojiOperation => {
                let hints = one_or_many(body).map_err(wrap)?;
                match data_type {
                    data_type::EMOJI => PushEvent::EmojiChanged(hints),
                    data_type::EMOJI_PACKAGE => PushEvent::EmojiPackageChanged(hints),
                    data_type::EMOJI_RELATION => PushEvent::EmojiRelationChanged(hints),
                    data_type::EMOJI_COLLECT => PushEvent::EmojiCollectChanged(hints),
                    _ => return Err(unknown()),
                }
            }
            Command::Notification => match data_type {
                data_type::NOTIFICATION_EVENT => PushEvent::Notification(Box::new(
                    serde_json::from_value(body.clone()).map_err(wrap)?,
                )),
                _ => return Err(unknown()),
            },
        };
        Ok(event)
    }
}
