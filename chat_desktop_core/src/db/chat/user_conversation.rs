use std::collections::HashMap;

use chrono::Utc;
use sqlx::Sqlite;

use crate::db::chat::util::{local_versions, VersionColumns};
use crate::db::Error;

#[derive(Clone)]
pub struct UserConversationDao(pub(crate) sqlx::Pool<Sqlite>);

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct UserConversation {
    pub user_id: String,
    pub conversation_id: String,
    pub is_hidden: bool,
    pub is_pinned: bool,
    pub is_muted: bool,
    pub user_read_seq: i64,
    pub version: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct UnreadCount {
    pub conversation_id: String,
    pub unread: i64,
}

const VERSION_COLUMNS: VersionColumns =
    VersionColumns::new("user_conversations", "conversation_id");

impl UserConversationDao {
    /// The read watermark never moves backwards, whoever writes it.
    pub async fn upsert_list(&self, rows: &[sdk::UserConversation]) -> Result<(), Error> {
        let mut tx = self.0.begin().await?;
        for row in rows {
            sqlx::query(
                "INSERT INTO user_conversations \
                 (user_id, conversation_id, is_hidden, is_pinned, is_muted, user_read_seq, version, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT(user_id, conversation_id) DO UPDATE SET \
                 is_hidden = excluded.is_hidden, \
                 is_pinned = excluded.is_pinned, \
                 is_muted = excluded.is_muted, \
                 user_read_seq = MAX(user_read_seq, excluded.user_read_seq), \
                 version = excluded.version, \
                 updated_at = excluded.updated_at",
            )
            .bind(&row.user_id)
            .bind(&row.conversation_id)
            .bind(row.is_hidden)
            .bind(row.is_pinned)
            .bind(row.is_muted)
            .bind(row.user_read_seq)
            .bind(row.version)
            .bind(row.updated_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn local_versions(
        &self,
        user_id: &str,
        ids: &[String],
    ) -> Result<HashMap<String, i64>, Error> {
        let mut conn = self.0.acquire().await?;
        local_versions(&mut conn, &VERSION_COLUMNS, Some(("user_id", user_id)), ids).await
    }

    pub async fn find(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<Option<UserConversation>, Error> {
        let result = sqlx::query_as::<_, UserConversation>(
            "SELECT * FROM user_conversations WHERE user_id = ? AND conversation_id = ?",
        )
        .bind(user_id)
        .bind(conversation_id)
        .fetch_optional(&self.0)
        .await?;
        Ok(result)
    }

    /// Local read progress. Creates a version 0 row if the settings have not
    /// been synced yet so the next sync still fetches them.
    pub async fn advance_read_seq(
        &self,
        user_id: &str,
        conversation_id: &str,
        read_seq: i64,
    ) -> Result<i64, Error> {
        let now = Utc::now().timestamp_millis();
        sqlx::query(
            "INSERT INTO user_conversations (user_id, conversation_id, user_read_seq, version, updated_at) \
             VALUES (?, ?, ?, 0, ?) \
             ON CONFLICT(user_id, conversation_id) DO UPDATE SET \
             user_read_seq = MAX(user_read_seq, excluded.user_read_seq)",
        )
        .bind(user_id)
        .bind(conversation_id)
        .bind(read_seq)
        .bind(now)
        .execute(&self.0)
        .await?;
        let stored = sqlx::query_scalar::<_, i64>(
            "SELECT user_read_seq FROM user_conversations WHERE user_id = ? AND conversation_id = ?",
        )
        .bind(user_id)
        .bind(conversation_id)
        .fetch_one(&self.0)
        .await?;
        Ok(stored)
    }

    /// Visible conversations of `user_id`, pinned first.
    pub async fn visible_conversations(&self, user_id: &str) -> Result<Vec<UserConversation>, Error> {
        let result = sqlx::query_as::<_, UserConversation>(
            "SELECT uc.* FROM user_conversations uc \
             LEFT JOIN conversations c ON c.conversation_id = uc.conversation_id \
             WHERE uc.user_id = ? AND uc.is_hidden = 0 \
             ORDER BY uc.is_pinned DESC, COALESCE(c.updated_at, uc.updated_at) DESC",
        )
        .bind(user_id)
        .fetch_all(&self.0)
        .await?;
        Ok(result)
    }

    pub async fn unread_counts(&self, user_id: &str) -> Result<Vec<UnreadCount>, Error> {
        let result = sqlx::query_as::<_, UnreadCount>(
            "SELECT uc.conversation_id AS conversation_id, \
             MAX(0, c.max_seq - uc.user_read_seq) AS unread \
             FROM user_conversations uc \
             JOIN conversations c ON c.conversation_id = uc.conversation_id \
             WHERE uc.user_id = ? AND uc.is_hidden = 0",
        )
        .bind(user_id)
        .fetch_all(&self.0)
        .await?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use crate::tests::{conversation_meta, new_test_db, user_conversation};

    #[tokio::test]
    async fn read_seq_is_monotonic_and_unread_follows_max_seq() {
        let db = new_test_db().await;
        db.conversation_dao
            .upsert_list(&[conversation_meta("c1", 30, 1)])
            .await
            .unwrap();
        let mut row = user_conversation("u1", "c1", 1);
        row.user_read_seq = 10;
        db.user_conversation_dao.upsert_list(&[row.clone()]).await.unwrap();

        assert_eq!(
            db.user_conversation_dao
                .advance_read_seq("u1", "c1", 25)
                .await
                .unwrap(),
            25
        );
        row.user_read_seq = 5;
        row.version = 2;
        db.user_conversation_dao.upsert_list(&[row]).await.unwrap();
        let stored = db.user_conversation_dao.find("u1", "c1").await.unwrap().unwrap();
        assert_eq!(stored.user_read_seq, 25);
        assert_eq!(stored.version, 2);

        let unread = db.user_conversation_dao.unread_counts("u1").await.unwrap();
        assert_eq!(unread[0].unread, 5);
    }

    #[tokio::test]
    async fn versions_are_scoped_to_the_user() {
        let db = new_test_db().await;
        db.user_conversation_dao
            .upsert_list(&[user_conversation("u1", "c1", 3), user_conversation("u2", "c1", 7)])
            .await
            .unwrap();
        let versions = db
            .user_conversation_dao
            .local_versions("u2", &["c1".to_string()])
            .await
            .unwrap();
        assert_eq!(versions["c1"], 7);
    }
}
