use std::collections::HashMap;

use chrono::Utc;
use sdk::{ConversationMeta, ConversationType, LastMessage};
use sqlx::types::Json;
use sqlx::{Sqlite, SqliteConnection};

use crate::db::chat::util::{local_versions, VersionColumns};
use crate::db::Error;

#[derive(Clone)]
pub struct ConversationDao(pub(crate) sqlx::Pool<Sqlite>);

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Conversation {
    pub conversation_id: String,
    #[sqlx(rename = "type")]
    pub conversation_type: ConversationType,
    pub max_seq: i64,
    pub last_message: Option<Json<LastMessage>>,
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

const VERSION_COLUMNS: VersionColumns = VersionColumns::new("conversations", "conversation_id");

/// `max_seq` is a watermark and only ever grows; the last message snapshot
/// follows whichever side has the higher watermark.
const UPSERT_CONVERSATION: &str = "INSERT INTO conversations \
    (conversation_id, type, max_seq, last_message, version, created_at, updated_at) \
    VALUES (?, ?, ?, ?, ?, ?, ?) \
    ON CONFLICT(conversation_id) DO UPDATE SET \
    type = excluded.type, \
    last_message = CASE WHEN excluded.max_seq >= conversations.max_seq \
        THEN excluded.last_message ELSE conversations.last_message END, \
    max_seq = MAX(conversations.max_seq, excluded.max_seq), \
    version = excluded.version, \
    updated_at = excluded.updated_at";

pub(crate) async fn upsert_conversation(
    conn: &mut SqliteConnection,
    conversation: &ConversationMeta,
) -> Result<(), Error> {
    sqlx::query(UPSERT_CONVERSATION)
        .bind(&conversation.conversation_id)
        .bind(conversation.conversation_type)
        .bind(conversation.max_seq)
        .bind(conversation.last_message.as_ref().map(Json))
        .bind(conversation.version)
        .bind(conversation.created_at)
        .bind(conversation.updated_at)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Raises the watermark of a conversation, creating a version 0 placeholder
/// when the conversation itself has not been synced yet.
pub(crate) async fn raise_max_seq(
    conn: &mut SqliteConnection,
    conversation_id: &str,
    max_seq: i64,
    last_message: Option<&LastMessage>,
) -> Result<(), Error> {
    let now = Utc::now().timestamp_millis();
    sqlx::query(
        "INSERT INTO conversations \
         (conversation_id, type, max_seq, last_message, version, created_at, updated_at) \
         VALUES (?, ?, ?, ?, 0, ?, ?) \
         ON CONFLICT(conversation_id) DO UPDATE SET \
         last_message = CASE WHEN excluded.max_seq >= conversations.max_seq \
             THEN COALESCE(excluded.last_message, conversations.last_message) \
             ELSE conversations.last_message END, \
         max_seq = MAX(conversations.max_seq, excluded.max_seq)",
    )
    .bind(conversation_id)
    .bind(ConversationType::Single)
    .bind(max_seq)
    .bind(last_message.map(Json))
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

impl ConversationDao {
    pub async fn upsert_list(&self, conversations: &[ConversationMeta]) -> Result<(), Error> {
        let mut tx = self.0.begin().await?;
        for conversation in conversations {
            upsert_conversation(&mut tx, conversation).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn raise_max_seq(&self, conversation_id: &str, max_seq: i64) -> Result<(), Error> {
        let mut conn = self.0.acquire().await?;
        raise_max_seq(&mut conn, conversation_id, max_seq, None).await
    }

    pub async fn local_versions(&self, ids: &[String]) -> Result<HashMap<String, i64>, Error> {
        let mut conn = self.0.acquire().await?;
        local_versions(&mut conn, &VERSION_COLUMNS, None, ids).await
    }

    pub async fn find_conversation_by_id(
        &self,
        conversation_id: &str,
    ) -> Result<Option<Conversation>, Error> {
        let result = sqlx::query_as::<_, Conversation>(
            "SELECT * FROM conversations WHERE conversation_id = ?",
        )
        .bind(conversation_id)
        .fetch_optional(&self.0)
        .await?;
        Ok(result)
    }

    pub async fn max_seq(&self, conversation_id: &str) -> Result<i64, Error> {
        let result = sqlx::query_scalar::<_, i64>(
            "SELECT max_seq FROM conversations WHERE conversation_id = ?",
        )
        .bind(conversation_id)
        .fetch_optional(&self.0)
        .await?;
        Ok(result.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{conversation_meta, new_test_db};

    #[tokio::test]
    async fn upsert_never_lowers_max_seq() {
        let db = new_test_db().await;
        let dao = &db.conversation_dao;
        let mut meta = conversation_meta("c1", 250, 3);
        dao.upsert_list(&[meta.clone()]).await.unwrap();

        meta.max_seq = 200;
        meta.version = 4;
        meta.created_at = 999;
        dao.upsert_list(&[meta]).await.unwrap();

        let stored = dao.find_conversation_by_id("c1").await.unwrap().unwrap();
        assert_eq!(stored.max_seq, 250);
        assert_eq!(stored.version, 4);
        assert_eq!(stored.created_at, 1);
    }

    #[tokio::test]
    async fn placeholder_is_filled_by_sync() {
        let db = new_test_db().await;
        let dao = &db.conversation_dao;
        dao.raise_max_seq("c9", 12).await.unwrap();
        assert_eq!(
            dao.local_versions(&["c9".to_string()]).await.unwrap()["c9"],
            0
        );

        dao.upsert_list(&[conversation_meta("c9", 10, 2)]).await.unwrap();
        let stored = dao.find_conversation_by_id("c9").await.unwrap().unwrap();
        assert_eq!(stored.max_seq, 12);
        assert_eq!(stored.version, 2);
        assert_eq!(dao.max_seq("missing").await.unwrap(), 0);
    }
}
