use std::collections::HashMap;

use sqlx::Sqlite;

use crate::db::chat::util::{local_versions, VersionColumns};
use crate::db::Error;

#[derive(Clone)]
pub struct GroupDao(pub(crate) sqlx::Pool<Sqlite>);

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Group {
    pub group_id: String,
    pub name: String,
    pub avatar: String,
    pub owner_id: String,
    pub announcement: String,
    pub member_count: i64,
    pub is_dismissed: bool,
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

const VERSION_COLUMNS: VersionColumns = VersionColumns::new("chat_groups", "group_id");

impl GroupDao {
    pub async fn upsert_list(&self, groups: &[sdk::Group]) -> Result<(), Error> {
        let mut tx = self.0.begin().await?;
        for group in groups {
            sqlx::query(
                "INSERT INTO chat_groups \
                 (group_id, name, avatar, owner_id, announcement, member_count, is_dismissed, version, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT(group_id) DO UPDATE SET \
                 name = excluded.name, \
                 avatar = excluded.avatar, \
                 owner_id = excluded.owner_id, \
                 announcement = excluded.announcement, \
                 member_count = excluded.member_count, \
                 is_dismissed = excluded.is_dismissed, \
                 version = excluded.version, \
                 updated_at = excluded.updated_at",
            )
            .bind(&group.group_id)
            .bind(&group.name)
            .bind(&group.avatar)
            .bind(&group.owner_id)
            .bind(&group.announcement)
            .bind(group.member_count)
            .bind(group.is_dismissed)
            .bind(group.version)
            .bind(group.created_at)
            .bind(group.updated_at)
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

    pub async fn find_group_by_id(&self, group_id: &str) -> Result<Option<Group>, Error> {
        let result = sqlx::query_as::<_, Group>("SELECT * FROM chat_groups WHERE group_id = ?")
            .bind(group_id)
            .fetch_optional(&self.0)
            .await?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{group, new_test_db};

    #[tokio::test]
    async fn upsert_keeps_creation_time() {
        let db = new_test_db().await;
        let dao = &db.group_dao;
        dao.upsert_list(&[group("g1", 1)]).await.unwrap();

        let mut renamed = group("g1", 2);
        renamed.name = "renamed".to_string();
        renamed.created_at = 12345;
        dao.upsert_list(&[renamed]).await.unwrap();

        let stored = dao.find_group_by_id("g1").await.unwrap().unwrap();
        assert_eq!(stored.name, "renamed");
        assert_eq!(stored.version, 2);
        assert_eq!(stored.created_at, group("g1", 1).created_at);
    }
}
