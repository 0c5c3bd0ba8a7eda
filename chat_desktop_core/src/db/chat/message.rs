use std::collections::HashMap;

use chrono::Utc;
use sdk::{ChatMessage, LastMessage, MessagePayload};
use sqlx::{Sqlite, SqliteConnection};
use strum_macros::Display;

use crate::db::chat::conversation::raise_max_seq;
use crate::db::chat::util::{expand_var, local_versions, BindList, VersionColumns};
use crate::db::Error;

#[derive(Clone)]
pub struct MessageDao(pub(crate) sqlx::Pool<Sqlite>);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, sqlx::Type)]
#[repr(i32)]
pub enum SendStatus {
    Sending = 0,
    Sent = 1,
    Failed = 2,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Message {
    pub message_id: String,
    pub conversation_id: String,
    pub seq: i64,
    pub send_user_id: String,
    pub msg_type: String,
    pub payload: String,
    pub send_status: SendStatus,
    pub created_at: i64,
}

impl Message {
    /// A message created on this device, before the server assigned a seq.
    pub fn new_local(
        conversation_id: &str,
        send_user_id: &str,
        payload: &MessagePayload,
    ) -> Result<Self, Error> {
        Ok(Message {
            message_id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            seq: 0,
            send_user_id: send_user_id.to_string(),
            msg_type: payload.msg_type().to_string(),
            payload: serde_json::to_string(&payload.body()?)?,
            send_status: SendStatus::Sending,
            created_at: Utc::now().timestamp_millis(),
        })
    }

    pub fn payload(&self) -> Result<MessagePayload, Error> {
        let body = serde_json::from_str(&self.payload)?;
        Ok(MessagePayload::from_parts(&self.msg_type, body)?)
    }
}

pub fn last_message_of(message: &ChatMessage) -> LastMessage {
    LastMessage {
        message_id: message.message_id.clone(),
        seq: message.seq,
        send_user_id: message.send_user_id.clone(),
        msg_type: message.payload.msg_type().to_string(),
        summary: message.payload.summary(),
        created_at: message.created_at,
    }
}

const SYNC_STATE_COLUMNS: VersionColumns = VersionColumns {
    table: "message_sync_states",
    id_expr: "conversation_id",
    version_expr: "synced_seq",
};

/// A server copy always lands as `sent`. A local `sending` row with the same
/// `message_id` is reconciled in place; key, author and creation time stay.
async fn upsert_remote_message(
    conn: &mut SqliteConnection,
    message: &ChatMessage,
) -> Result<(), Error> {
    let payload = serde_json::to_string(&message.payload.body()?)?;
    sqlx::query(
        "INSERT INTO messages \
         (message_id, conversation_id, seq, send_user_id, msg_type, payload, send_status, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(message_id) DO UPDATE SET \
         seq = excluded.seq, \
         msg_type = excluded.msg_type, \
         payload = excluded.payload, \
         send_status = excluded.send_status",
    )
    .bind(&message.message_id)
    .bind(&message.conversation_id)
    .bind(message.seq)
    .bind(&message.send_user_id)
    .bind(message.payload.msg_type())
    .bind(payload)
    .bind(SendStatus::Sent)
    .bind(message.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn advance_synced_seq(
    conn: &mut SqliteConnection,
    conversation_id: &str,
    seq: i64,
) -> Result<(), Error> {
    sqlx::query(
        "INSERT INTO message_sync_states (conversation_id, synced_seq, updated_at) VALUES (?, ?, ?) \
         ON CONFLICT(conversation_id) DO UPDATE SET \
         synced_seq = MAX(synced_seq, excluded.synced_seq), updated_at = excluded.updated_at",
    )
    .bind(conversation_id)
    .bind(seq)
    .bind(Utc::now().timestamp_millis())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Upserts `messages` and raises each touched conversation's watermark.
async fn apply_messages(conn: &mut SqliteConnection, messages: &[ChatMessage]) -> Result<(), Error> {
    let mut newest: HashMap<&str, &ChatMessage> = HashMap::new();
    for message in messages {
        upsert_remote_message(conn, message).await?;
        let entry = newest.entry(message.conversation_id.as_str()).or_insert(message);
        if message.seq > entry.seq {
            *entry = message;
        }
    }
    for (conversation_id, message) in newest {
        raise_max_seq(conn, conversation_id, message.seq, Some(&last_message_of(message))).await?;
    }
    Ok(())
}

impl MessageDao {
    pub async fn insert_local(&self, message: &Message) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO messages \
             (message_id, conversation_id, seq, send_user_id, msg_type, payload, send_status, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&message.message_id)
        .bind(&message.conversation_id)
        .bind(message.seq)
        .bind(&message.send_user_id)
        .bind(&message.msg_type)
        .bind(&message.payload)
        .bind(message.send_status)
        .bind(message.created_at)
        .execute(&self.0)
        .await?;
        Ok(())
    }

    /// Server acknowledged a locally sent message. Same watermark rules as
    /// a pushed message.
    pub async fn mark_sent(&self, message: &ChatMessage) -> Result<(), Error> {
        self.apply_pushed(std::slice::from_ref(message)).await?;
        Ok(())
    }

    pub async fn update_send_status(
        &self,
        message_id: &str,
        status: SendStatus,
    ) -> Result<u64, Error> {
        let result = sqlx::query("UPDATE messages SET send_status = ? WHERE message_id = ? AND seq = 0")
            .bind(status)
            .bind(message_id)
            .execute(&self.0)
            .await?;
        Ok(result.rows_affected())
    }

    /// One batch of server messages, in one transaction.
    pub async fn apply_remote(&self, messages: &[ChatMessage]) -> Result<(), Error> {
        if messages.is_empty() {
            return Ok(());
        }
        let mut tx = self.0.begin().await?;
        apply_messages(&mut tx, messages).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Pushed messages: persisted, and the per-conversation sync watermark
    /// follows when they continue it without a gap. Returns, per
    /// conversation, the highest seq that could not be covered.
    pub async fn apply_pushed(&self, messages: &[ChatMessage]) -> Result<HashMap<String, i64>, Error> {
        let mut gaps = HashMap::new();
        if messages.is_empty() {
            return Ok(gaps);
        }
        let mut by_conversation: HashMap<&str, Vec<i64>> = HashMap::new();
        for message in messages {
            by_conversation
                .entry(message.conversation_id.as_str())
                .or_default()
                .push(message.seq);
        }

        let mut tx = self.0.begin().await?;
        apply_messages(&mut tx, messages).await?;
        let ids = by_conversation.keys().map(|id| id.to_string()).collect::<Vec<_>>();
        let synced = local_versions(&mut tx, &SYNC_STATE_COLUMNS, None, &ids).await?;
        for (conversation_id, mut seqs) in by_conversation {
            seqs.sort_unstable();
            seqs.dedup();
            let mut watermark = synced.get(conversation_id).copied().unwrap_or_default();
            let start = watermark;
            for seq in &seqs {
                if *seq == watermark + 1 {
                    watermark = *seq;
                } else if *seq > watermark {
                    break;
                }
            }
            if watermark > start {
                advance_synced_seq(&mut tx, conversation_id, watermark).await?;
            }
            if let Some(max) = seqs.last() {
                if *max > watermark {
                    gaps.insert(conversation_id.to_string(), *max);
                }
            }
        }
        tx.commit().await?;
        Ok(gaps)
    }

    /// One catch-up chunk: its messages and the watermark commit together.
    pub async fn apply_chunk(
        &self,
        conversation_id: &str,
        messages: &[ChatMessage],
        synced_seq: i64,
    ) -> Result<(), Error> {
        let mut tx = self.0.begin().await?;
        apply_messages(&mut tx, messages).await?;
        advance_synced_seq(&mut tx, conversation_id, synced_seq).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn synced_seq(&self, conversation_id: &str) -> Result<i64, Error> {
        let result = sqlx::query_scalar::<_, i64>(
            "SELECT synced_seq FROM message_sync_states WHERE conversation_id = ?",
        )
        .bind(conversation_id)
        .fetch_optional(&self.0)
        .await?;
        Ok(result.unwrap_or_default())
    }

    /// Conversations whose sync watermark is behind their `max_seq`.
    pub async fn lagging_conversations(&self) -> Result<Vec<(String, i64)>, Error> {
        let result = sqlx::query_as::<_, (String, i64)>(
            "SELECT c.conversation_id, c.max_seq FROM conversations c \
             LEFT JOIN message_sync_states s ON s.conversation_id = c.conversation_id \
             WHERE c.max_seq > COALESCE(s.synced_seq, 0) \
             ORDER BY c.updated_at DESC",
        )
        .fetch_all(&self.0)
        .await?;
        Ok(result)
    }

    pub async fn find_message_by_id(&self, message_id: &str) -> Result<Option<Message>, Error> {
        let result = sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE message_id = ?")
            .bind(message_id)
            .fetch_optional(&self.0)
            .await?;
        Ok(result)
    }

    pub async fn find_messages_by_ids(&self, ids: &[String]) -> Result<Vec<Message>, Error> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let sql = format!(
            "SELECT * FROM messages WHERE message_id IN ({})",
            expand_var(ids.len())
        );
        let result = sqlx::query_as::<_, Message>(&sql)
            .bind_list(ids)
            .fetch_all(&self.0)
            .await?;
        Ok(result)
    }

    /// Messages with `from_seq <= seq <= to_seq`, ascending.
    pub async fn messages_in_range(
        &self,
        conversation_id: &str,
        from_seq: i64,
        to_seq: i64,
    ) -> Result<Vec<Message>, Error> {
        let result = sqlx::query_as::<_, Message>(
            "SELECT * FROM messages WHERE conversation_id = ? AND seq >= ? AND seq <= ? ORDER BY seq ASC",
        )
        .bind(conversation_id)
        .bind(from_seq)
        .bind(to_seq)
        .fetch_all(&self.0)
        .await?;
        Ok(result)
    }

    pub async fn messages_by_status(&self, status: SendStatus) -> Result<Vec<Message>, Error> {
        let result = sqlx::query_as::<_, Message>(
            "SELECT * FROM messages WHERE send_status = ? ORDER BY created_at ASC",
        )
        .bind(status)
        .fetch_all(&self.0)
        .await?;
        Ok(result)
    }

    pub async fn count_in_conversation(&self, conversation_id: &str) -> Result<i64, Error> {
        let result = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM messages WHERE conversation_id = ?",
        )
        .bind(conversation_id)
        .fetch_one(&self.0)
        .await?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{chat_message, new_test_db};

    #[tokio::test]
    async fn local_message_reconciles_by_message_id() {
        let db = new_test_db().await;
        let dao = &db.message_dao;
        let local = Message::new_local("c1", "me", &MessagePayload::text("hi")).unwrap();
        dao.insert_local(&local).await.unwrap();

        let mut echo = chat_message("c1", 7);
        echo.message_id = local.message_id.clone();
        echo.send_user_id = "me".to_string();
        echo.payload = MessagePayload::text("hi");
        echo.created_at = local.created_at + 500;
        dao.apply_remote(&[echo]).await.unwrap();

        let stored = dao.find_message_by_id(&local.message_id).await.unwrap().unwrap();
        assert_eq!(stored.seq, 7);
        assert_eq!(stored.send_status, SendStatus::Sent);
        assert_eq!(stored.created_at, local.created_at);
        assert_eq!(stored.payload().unwrap(), MessagePayload::text("hi"));
        assert_eq!(dao.count_in_conversation("c1").await.unwrap(), 1);
        assert_eq!(db.conversation_dao.max_seq("c1").await.unwrap(), 7);
    }

    #[tokio::test]
    async fn applying_twice_is_idempotent() {
        let db = new_test_db().await;
        let batch = vec![chat_message("c1", 1), chat_message("c1", 2)];
        db.message_dao.apply_remote(&batch).await.unwrap();
        let first = db.message_dao.messages_in_range("c1", 1, 2).await.unwrap();
        db.message_dao.apply_remote(&batch).await.unwrap();
        let second = db.message_dao.messages_in_range("c1", 1, 2).await.unwrap();
        assert_eq!(first, second);

        let ids = batch.iter().map(|m| m.message_id.clone()).collect::<Vec<_>>();
        assert_eq!(db.message_dao.find_messages_by_ids(&ids).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn pushed_messages_advance_watermark_only_when_contiguous() {
        let db = new_test_db().await;
        let dao = &db.message_dao;
        dao.apply_chunk("c1", &[chat_message("c1", 1)], 1).await.unwrap();

        let gaps = dao
            .apply_pushed(&[chat_message("c1", 3), chat_message("c1", 2)])
            .await
            .unwrap();
        assert!(gaps.is_empty());
        assert_eq!(dao.synced_seq("c1").await.unwrap(), 3);

        let gaps = dao
            .apply_pushed(&[chat_message("c1", 6), chat_message("c2", 4)])
            .await
            .unwrap();
        assert_eq!(gaps.get("c1"), Some(&6));
        assert_eq!(gaps.get("c2"), Some(&4));
        assert_eq!(dao.synced_seq("c1").await.unwrap(), 3);
        assert_eq!(db.conversation_dao.max_seq("c1").await.unwrap(), 6);
    }

    #[tokio::test]
    async fn failed_status_only_touches_unsent_rows() {
        let db = new_test_db().await;
        let dao = &db.message_dao;
        let local = Message::new_local("c1", "me", &MessagePayload::text("x")).unwrap();
        dao.insert_local(&local).await.unwrap();
        assert_eq!(
            dao.update_send_status(&local.message_id, SendStatus::Failed)
                .await
                .unwrap(),
            1
        );
        assert_eq!(dao.messages_by_status(SendStatus::Failed).await.unwrap().len(), 1);

        let remote = chat_message("c1", 1);
        dao.apply_remote(std::slice::from_ref(&remote)).await.unwrap();
        assert_eq!(
            dao.update_send_status(&remote.message_id, SendStatus::Failed)
                .await
                .unwrap(),
            0
        );
    }
}
