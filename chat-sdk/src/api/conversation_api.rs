use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::api::VersionDiff;
use crate::client::ClientRef;
use crate::ApiError;

pub struct ConversationApi {
    client: Arc<ClientRef>,
}

impl ConversationApi {
    pub(crate) fn new(client: Arc<ClientRef>) -> Self {
        ConversationApi { client }
    }
}

int_enum! {
    #[derive(Default)]
    pub enum ConversationType {
        #[default]
        Single = 1,
        Group = 2,
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    pub message_id: String,
    pub seq: i64,
    pub send_user_id: String,
    pub msg_type: String,
    #[serde(default)]
    pub summary: String,
    pub created_at: i64,
}

/// Conversation metadata, shared by every user of the device.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMeta {
    pub conversation_id: String,
    #[serde(rename = "type", default)]
    pub conversation_type: ConversationType,
    #[serde(default)]
    pub max_seq: i64,
    pub last_message: Option<LastMessage>,
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Per-user settings of one conversation.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserConversation {
    pub user_id: String,
    pub conversation_id: String,
    #[serde(default)]
    pub is_hidden: bool,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub is_muted: bool,
    #[serde(default)]
    pub user_read_seq: i64,
    pub version: i64,
    pub updated_at: i64,
}

impl ConversationApi {
    pub async fn conversation_versions(&self, since: i64) -> Result<VersionDiff, ApiError> {
        self.client
            .versions("sync/conversations", "conversationVersions", since)
            .await
    }

    pub async fn conversations_by_ids(
        &self,
        ids: &[String],
    ) -> Result<Vec<ConversationMeta>, ApiError> {
        self.client
            .by_ids("conversations/byIds", "conversations", ids)
            .await
    }

    pub async fn user_conversation_versions(&self, since: i64) -> Result<VersionDiff, ApiError> {
        self.client
            .versions("sync/userConversations", "userConversationVersions", since)
            .await
    }

    /// Ids are conversation ids; the server scopes them to the session user.
    pub async fn user_conversations_by_ids(
        &self,
        ids: &[String],
    ) -> Result<Vec<UserConversation>, ApiError> {
        self.client
            .by_ids("userConversations/byIds", "userConversations", ids)
            .await
    }

    pub async fn mark_read(&self, conversation_id: &str, read_seq: i64) -> Result<(), ApiError> {
        let _: serde_json::Value = self
            .client
            .post(
                "conversation/read",
                &json!({ "conversationId": conversation_id, "readSeq": read_seq }),
            )
            .await?;
        Ok(())
    }
}
