use std::collections::HashMap;

use sdk::VerifyStatus;
use sqlx::Sqlite;

use crate::db::chat::util::{local_versions, VersionColumns};
use crate::db::Error;

#[derive(Clone)]
pub struct FriendVerifyDao(pub(crate) sqlx::Pool<Sqlite>);

/// A friend request. Each side of the request keeps its own status.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct FriendVerify {
    pub verify_id: String,
    pub send_user_id: String,
    pub rev_user_id: String,
    pub message: String,
    pub source: String,
    pub send_status: VerifyStatus,
    pub rev_status: VerifyStatus,
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

const VERSION_COLUMNS: VersionColumns = VersionColumns::new("friend_verifies", "verify_id");

impl FriendVerifyDao {
    /// `message` and `source` are fixed when the request is created.
    pub async fn upsert_list(&self, verifies: &[sdk::FriendVerify]) -> Result<(), Error> {
        let mut tx = self.0.begin().await?;
        for verify in verifies {
            sqlx::query(
                "INSERT INTO friend_verifies \
                 (verify_id, send_user_id, rev_user_id, message, source, send_status, rev_status, version, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT(verify_id) DO UPDATE SET \
                 send_status = excluded.send_status, \
                 rev_status = excluded.rev_status, \
                 version = excluded.version, \
                 updated_at = excluded.updated_at",
            )
            .bind(&verify.verify_id)
            .bind(&verify.send_user_id)
            .bind(&verify.rev_user_id)
            .bind(&verify.message)
            .bind(&verify.source)
            .bind(verify.send_status)
            .bind(verify.rev_status)
            .bind(verify.version)
            .bind(verify.created_at)
            .bind(verify.updated_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn local_versions(&self, ids: &[String]) -> Result<HashMap<String, i64>, Error> {
        let mut conn = self.0.acquire().await?;
        local_versions(&mut conn, &VERSION_COLUMNS, None, ids).await
    }

    pub async fn find_verify_by_id(&self, verify_id: &str) -> Result<Option<FriendVerify>, Error> {
        let result =
            sqlx::query_as::<_, FriendVerify>("SELECT * FROM friend_verifies WHERE verify_id = ?")
                .bind(verify_id)
                .fetch_optional(&self.0)
                .await?;
        Ok(result)
    }

    /// Requests addressed to `user_id` that are still waiting on them.
    pub async fn pending_for(&self, user_id: &str) -> Result<Vec<FriendVerify>, Error> {
        let result = sqlx::query_as::<_, FriendVerify>(
            "SELECT * FROM friend_verifies WHERE rev_user_id = ? AND rev_status = ? ORDER BY created_at DESC",
        )
        .bind(user_id)
        .bind(VerifyStatus::Unhandled)
        .fetch_all(&self.0)
        .await?;
        Ok(result)
    }
}
