use std::collections::HashMap;

use sdk::JoinRequestStatus;
use sqlx::Sqlite;

use crate::db::chat::util::{local_versions, VersionColumns};
use crate::db::Error;

#[derive(Clone)]
pub struct GroupJoinRequestDao(pub(crate) sqlx::Pool<Sqlite>);

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct GroupJoinRequest {
    pub id: i64,
    pub group_id: String,
    pub user_id: String,
    pub message: String,
    pub status: JoinRequestStatus,
    pub handled_by: Option<String>,
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

const VERSION_COLUMNS: VersionColumns =
    VersionColumns::new("group_join_requests", "CAST(id AS TEXT)");

impl GroupJoinRequestDao {
    /// The server id is the conflict target; the request text never changes.
    pub async fn upsert_list(&self, requests: &[sdk::GroupJoinRequest]) -> Result<(), Error> {
        let mut tx = self.0.begin().await?;
        for request in requests {
            sqlx::query(
                "INSERT INTO group_join_requests \
                 (id, group_id, user_id, message, status, handled_by, version, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT(id) DO UPDATE SET \
                 status = excluded.status, \
                 handled_by = excluded.handled_by, \
                 version = excluded.version, \
                 updated_at = excluded.updated_at",
            )
            .bind(request.id)
            .bind(&request.group_id)
            .bind(&request.user_id)
            .bind(&request.message)
            .bind(request.status)
            .bind(&request.handled_by)
            .bind(request.version)
            .bind(request.created_at)
            .bind(request.updated_at)
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

    pub async fn pending_requests(&self, group_id: &str) -> Result<Vec<GroupJoinRequest>, Error> {
        let result = sqlx::query_as::<_, GroupJoinRequest>(
            "SELECT * FROM group_join_requests WHERE group_id = ? AND status = ? ORDER BY created_at ASC",
        )
        .bind(group_id)
        .bind(JoinRequestStatus::Pending)
        .fetch_all(&self.0)
        .await?;
        Ok(result)
    }

    pub async fn find_request_by_id(&self, id: i64) -> Result<Option<GroupJoinRequest>, Error> {
        let result =
            sqlx::query_as::<_, GroupJoinRequest>("SELECT * FROM group_join_requests WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.0)
                .await?;
        Ok(result)
    }
}
