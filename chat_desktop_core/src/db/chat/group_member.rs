use std::collections::HashMap;

use sdk::{MemberRole, MemberStatus};
use sqlx::Sqlite;

use crate::db::chat::util::{local_versions, VersionColumns};
use crate::db::Error;

#[derive(Clone)]
pub struct GroupMemberDao(pub(crate) sqlx::Pool<Sqlite>);

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct GroupMember {
    pub group_id: String,
    pub user_id: String,
    pub role: MemberRole,
    pub status: MemberStatus,
    pub nickname: Option<String>,
    pub version: i64,
    pub joined_at: i64,
    pub updated_at: i64,
}

/// Rows are addressed as `groupId:userId` on the wire.
const VERSION_COLUMNS: VersionColumns =
    VersionColumns::new("group_members", "group_id || ':' || user_id");

impl GroupMemberDao {
    pub async fn upsert_list(&self, members: &[sdk::GroupMember]) -> Result<(), Error> {
        let mut tx = self.0.begin().await?;
        for member in members {
            sqlx::query(
                "INSERT INTO group_members \
                 (group_id, user_id, role, status, nickname, version, joined_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT(group_id, user_id) DO UPDATE SET \
                 role = excluded.role, \
                 status = excluded.status, \
                 nickname = excluded.nickname, \
                 version = excluded.version, \
                 updated_at = excluded.updated_at",
            )
            .bind(&member.group_id)
            .bind(&member.user_id)
            .bind(member.role)
            .bind(member.status)
            .bind(&member.nickname)
            .bind(member.version)
            .bind(member.joined_at)
            .bind(member.updated_at)
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

    pub async fn find_member(
        &self,
        group_id: &str,
        user_id: &str,
    ) -> Result<Option<GroupMember>, Error> {
        let result = sqlx::query_as::<_, GroupMember>(
            "SELECT * FROM group_members WHERE group_id = ? AND user_id = ?",
        )
        .bind(group_id)
        .bind(user_id)
        .fetch_optional(&self.0)
        .await?;
        Ok(result)
    }

    /// Members still in the group, owner first.
    pub async fn active_members(&self, group_id: &str) -> Result<Vec<GroupMember>, Error> {
        let result = sqlx::query_as::<_, GroupMember>(
            "SELECT * FROM group_members WHERE group_id = ? AND status = ? ORDER BY role ASC, joined_at ASC",
        )
        .bind(group_id)
        .bind(MemberStatus::Active)
        .fetch_all(&self.0)
        .await?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{group_member, new_test_db};

    #[tokio::test]
    async fn composite_ids_resolve_local_versions() {
        let db = new_test_db().await;
        let dao = &db.group_member_dao;
        let mut owner = group_member("g1", "u1", 1);
        owner.role = MemberRole::Owner;
        let mut left = group_member("g1", "u3", 4);
        left.status = MemberStatus::Left;
        dao.upsert_list(&[group_member("g1", "u2", 3), owner, left])
            .await
            .unwrap();

        let versions = dao
            .local_versions(&["g1:u2".to_string(), "g1:u3".to_string(), "g2:u2".to_string()])
            .await
            .unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions["g1:u3"], 4);

        let active = dao.active_members("g1").await.unwrap();
        assert_eq!(
            active.iter().map(|m| m.user_id.as_str()).collect::<Vec<_>>(),
            vec!["u1", "u2"]
        );
    }
}
