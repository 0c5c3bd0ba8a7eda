use std::collections::HashMap;

use sqlx::Sqlite;

use crate::db::chat::util::{local_versions, VersionColumns};
use crate::db::Error;

#[derive(Clone)]
pub struct FriendDao(pub(crate) sqlx::Pool<Sqlite>);

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Friend {
    pub friend_id: String,
    pub user_id: String,
    pub friend_user_id: String,
    pub remark: String,
    pub is_deleted: bool,
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

const VERSION_COLUMNS: VersionColumns = VersionColumns::new("friends", "friend_id");

impl FriendDao {
    pub async fn upsert_list(&self, friends: &[sdk::Friend]) -> Result<(), Error> {
        let mut tx = self.0.begin().await?;
        for friend in friends {
            sqlx::query(
                "INSERT INTO friends \
                 (friend_id, user_id, friend_user_id, remark, is_deleted, version, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT(friend_id) DO UPDATE SET \
                 remark = excluded.remark, \
                 is_deleted = excluded.is_deleted, \
                 version = excluded.version, \
                 updated_at = excluded.updated_at",
            )
            .bind(&friend.friend_id)
            .bind(&friend.user_id)
            .bind(&friend.friend_user_id)
            .bind(&friend.remark)
            .bind(friend.is_deleted)
            .bind(friend.version)
            .bind(friend.created_at)
            .bind(friend.updated_at)
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

    pub async fn find_friend_by_id(&self, friend_id: &str) -> Result<Option<Friend>, Error> {
        let result = sqlx::query_as::<_, Friend>("SELECT * FROM friends WHERE friend_id = ?")
            .bind(friend_id)
            .fetch_optional(&self.0)
            .await?;
        Ok(result)
    }

    pub async fn friends_of(&self, user_id: &str) -> Result<Vec<Friend>, Error> {
        let result = sqlx::query_as::<_, Friend>(
            "SELECT * FROM friends WHERE user_id = ? AND is_deleted = 0 ORDER BY created_at ASC",
        )
        .bind(user_id)
        .fetch_all(&self.0)
        .await?;
        Ok(result)
    }
}
