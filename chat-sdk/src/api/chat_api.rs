use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::VersionDiff;
use crate::client::ClientRef;
use crate::{ApiError, ChatMessage};

/// Upper bound of one `chat/sync` range request.
pub const MAX_SYNC_LIMIT: i64 = 100;

pub struct ChatApi {
    client: Arc<ClientRef>,
}

impl ChatApi {
    pub(crate) fn new(client: Arc<ClientRef>) -> Self {
        ChatApi { client }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub message_id: String,
    pub conversation_id: String,
    pub msg_type: String,
    pub payload: Value,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageResponse {
    pub message_id: String,
    pub seq: i64,
    pub created_at: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyncRangeRequest<'a> {
    conversation_id: &'a str,
    from_seq: i64,
    to_seq: i64,
    limit: i64,
}

#[derive(Debug, Deserialize)]
struct SyncRangeResponse {
    #[serde(default)]
    messages: Vec<ChatMessage>,
}

impl ChatApi {
    /// Changed conversations since `since`, each as `{id: conversationId,
    /// version: serverMaxSeq}`.
    pub async fn message_versions(&self, since: i64) -> Result<VersionDiff, ApiError> {
        self.client
            .versions("sync/messages", "messageVersions", since)
            .await
    }

    /// Messages with `from_seq <= seq <= to_seq`, ascending, at most `limit`.
    pub async fn sync_range(
        &self,
        conversation_id: &str,
        from_seq: i64,
        to_seq: i64,
        limit: i64,
    ) -> Result<Vec<ChatMessage>, ApiError> {
        let request = SyncRangeRequest {
            conversation_id,
            from_seq,
            to_seq,
            limit: limit.clamp(1, MAX_SYNC_LIMIT),
        };
        let response: SyncRangeResponse = self.client.post("chat/sync", &request).await?;
        Ok(response.messages)
    }

    pub async fn send(&self, request: &SendMessageRequest) -> Result<SendMessageResponse, ApiError> {
        self.client.post("chat/send", request).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::client::tests::new_test_client;
    use crate::MessagePayload;

    #[tokio::test]
    async fn sync_range_caps_limit() {
        let (client, transport) = new_test_client(vec![(
            "chat/sync",
            json!({"messages": [{
                "messageId": "m1", "conversationId": "c1", "seq": 41,
                "sendUserId": "u2", "msgType": "text",
                "payload": {"text": "hi"}, "createdAt": 1
            }]}),
        )]);
        let messages = client.chat_api.sync_range("c1", 41, 300, 500).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(
            messages[0].payload,
            MessagePayload::Text(crate::TextContent {
                text: "hi".to_string(),
                mentions: vec![]
            })
        );
        let requests = transport.requests.lock().unwrap();
        assert_eq!(
            requests[0].1,
            json!({"conversationId": "c1", "fromSeq": 41, "toSeq": 300, "limit": 100})
        );
    }
}
