use log::{debug, info, warn};
use sdk::{ChatMessage, MessagePayload, SendMessageRequest};
use serde_json::json;

use crate::core::notify::{COMMAND_NEW, COMMAND_UPDATED};
use crate::core::sync::SyncContext;
use crate::core::SyncError;
use crate::db::chat::message::{Message, SendStatus};
use crate::db::chat::user_conversation::UnreadCount;

#[derive(Clone)]
pub struct MessageService {
    ctx: SyncContext,
}

impl MessageService {
    pub fn new(ctx: SyncContext) -> Self {
        MessageService { ctx }
    }

    /// Stores the message as `sending`, then hands it to the server. The
    /// same row ends up `sent` with its seq, or `failed`.
    pub async fn send(
        &self,
        conversation_id: &str,
        payload: MessagePayload,
    ) -> Result<Message, SyncError> {
        let user_id = self.ctx.session.user_id()?;
        let message = Message::new_local(conversation_id, &user_id, &payload)?;
        self.ctx.db.message_dao.insert_local(&message).await?;
        self.ctx.events.emit(
            "message",
            COMMAND_NEW,
            json!({ "ids": [&message.message_id] }),
        );
        self.deliver(message).await
    }

    async fn deliver(&self, message: Message) -> Result<Message, SyncError> {
        let dao = &self.ctx.db.message_dao;
        let request = SendMessageRequest {
            message_id: message.message_id.clone(),
            conversation_id: message.conversation_id.clone(),
            msg_type: message.msg_type.clone(),
            payload: serde_json::from_str(&message.payload).map_err(crate::db::Error::from)?,
        };
        let response = match self.ctx.client.chat_api.send(&request).await {
            Ok(response) => response,
            Err(err) => {
                warn!("send {} failed: {}", message.message_id, err);
                dao.update_send_status(&message.message_id, SendStatus::Failed)
                    .await?;
                self.emit_updated(&message.message_id);
                return Err(err.into());
            }
        };

        let sent = ChatMessage {
            message_id: message.message_id.clone(),
            conversation_id: message.conversation_id.clone(),
            seq: response.seq,
            send_user_id: message.send_user_id.clone(),
            payload: message.payload()?,
            created_at: response.created_at,
        };
        dao.mark_sent(&sent).await?;
        debug!("{} sent as seq {}", sent.message_id, sent.seq);
        self.emit_updated(&message.message_id);
        self.ctx
            .events
            .emit_updated("conversation", &[message.conversation_id.clone()]);
        Ok(dao
            .find_message_by_id(&message.message_id)
            .await?
            .unwrap_or(message))
    }

    /// Retries every failed message of the current user. Returns how many
    /// went through.
    pub async fn resend_failed(&self) -> Result<usize, SyncError> {
        let user_id = self.ctx.session.user_id()?;
        let dao = &self.ctx.db.message_dao;
        let failed = dao.messages_by_status(SendStatus::Failed).await?;
        let mut sent = 0;
        for message in failed.into_iter().filter(|m| m.send_user_id == user_id) {
            dao.update_send_status(&message.message_id, SendStatus::Sending)
                .await?;
            if self.deliver(message).await.is_ok() {
                sent += 1;
            }
        }
        if sent > 0 {
            info!("resent {} messages", sent);
        }
        Ok(sent)
    }

    /// Reads the conversation up to its current `max_seq`. The local
    /// watermark moves first; a failed report is healed by the next sync.
    pub async fn mark_read(&self, conversation_id: &str) -> Result<i64, SyncError> {
        let user_id = self.ctx.session.user_id()?;
        let db = &self.ctx.db;
        let max_seq = db.conversation_dao.max_seq(conversation_id).await?;
        let read_seq = db
            .user_conversation_dao
            .advance_read_seq(&user_id, conversation_id, max_seq)
            .await?;
        if let Err(err) = self
            .ctx
            .client
            .conversation_api
            .mark_read(conversation_id, read_seq)
            .await
        {
            warn!("report read of {} failed: {}", conversation_id, err);
        }
        self.ctx
            .events
            .emit_updated("user_conversation", &[conversation_id.to_string()]);
        Ok(read_seq)
    }

    pub async fn unread_counts(&self) -> Result<Vec<UnreadCount>, SyncError> {
        let user_id = self.ctx.session.user_id()?;
        Ok(self.ctx.db.user_conversation_dao.unread_counts(&user_id).await?)
    }

    fn emit_updated(&self, message_id: &str) {
        self.ctx
            .events
            .emit("message", COMMAND_UPDATED, json!({ "ids": [message_id] }));
    }
}
