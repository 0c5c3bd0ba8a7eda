use std::collections::HashMap;

use sqlx::Sqlite;

use crate::db::chat::util::{local_versions, VersionColumns};
use crate::db::Error;

#[derive(Clone)]
pub struct EmojiDao(pub(crate) sqlx::Pool<Sqlite>);

#[derive(Clone)]
pub struct EmojiPackageDao(pub(crate) sqlx::Pool<Sqlite>);

#[derive(Clone)]
pub struct PackageEmojiRelationDao(pub(crate) sqlx::Pool<Sqlite>);

#[derive(Clone)]
pub struct EmojiCollectDao(pub(crate) sqlx::Pool<Sqlite>);

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Emoji {
    pub emoji_id: String,
    pub name: String,
    pub file_key: String,
    pub width: i32,
    pub height: i32,
    pub is_deleted: bool,
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct EmojiPackage {
    pub package_id: String,
    pub name: String,
    pub cover_file_key: String,
    pub description: String,
    pub is_deleted: bool,
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct EmojiCollect {
    pub collect_id: String,
    pub user_id: String,
    pub emoji_id: String,
    pub sort_order: i64,
    pub is_deleted: bool,
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

const EMOJI_COLUMNS: VersionColumns = VersionColumns::new("emojis", "emoji_id");
const PACKAGE_COLUMNS: VersionColumns = VersionColumns::new("emoji_packages", "package_id");
const RELATION_COLUMNS: VersionColumns =
    VersionColumns::new("package_emoji_relations", "package_id || ':' || emoji_id");
const COLLECT_COLUMNS: VersionColumns = VersionColumns::new("emoji_collects", "collect_id");

impl EmojiDao {
    pub async fn upsert_list(&self, emojis: &[sdk::Emoji]) -> Result<(), Error> {
        let mut tx = self.0.begin().await?;
        for emoji in emojis {
            sqlx::query(
                "INSERT INTO emojis \
                 (emoji_id, name, file_key, width, height, is_deleted, version, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT(emoji_id) DO UPDATE SET \
                 name = excluded.name, \
                 file_key = excluded.file_key, \
                 width = excluded.width, \
                 height = excluded.height, \
                 is_deleted = excluded.is_deleted, \
                 version = excluded.version, \
                 updated_at = excluded.updated_at",
            )
            .bind(&emoji.emoji_id)
            .bind(&emoji.name)
            .bind(&emoji.file_key)
            .bind(emoji.width)
            .bind(emoji.height)
            .bind(emoji.is_deleted)
            .bind(emoji.version)
            .bind(emoji.created_at)
            .bind(emoji.updated_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn local_versions(&self, ids: &[String]) -> Result<HashMap<String, i64>, Error> {
        let mut conn = self.0.acquire().await?;
        local_versions(&mut conn, &EMOJI_COLUMNS, None, ids).await
    }

    pub async fn find_emoji_by_id(&self, emoji_id: &str) -> Result<Option<Emoji>, Error> {
        let result = sqlx::query_as::<_, Emoji>("SELECT * FROM emojis WHERE emoji_id = ?")
            .bind(emoji_id)
            .fetch_optional(&self.0)
            .await?;
        Ok(result)
    }

    /// Live emojis of a package in their display order.
    pub async fn emojis_in_package(&self, package_id: &str) -> Result<Vec<Emoji>, Error> {
        let result = sqlx::query_as::<_, Emoji>(
            "SELECT e.* FROM emojis e \
             INNER JOIN package_emoji_relations r ON r.emoji_id = e.emoji_id \
             WHERE r.package_id = ? AND r.is_deleted = 0 AND e.is_deleted = 0 \
             ORDER BY r.sort_order ASC",
        )
        .bind(package_id)
        .fetch_all(&self.0)
        .await?;
        Ok(result)
    }
}

impl EmojiPackageDao {
    pub async fn upsert_list(&self, packages: &[sdk::EmojiPackage]) -> Result<(), Error> {
        let mut tx = self.0.begin().await?;
        for package in packages {
            sqlx::query(
                "INSERT INTO emoji_packages \
                 (package_id, name, cover_file_key, description, is_deleted, version, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT(package_id) DO UPDATE SET \
                 name = excluded.name, \
                 cover_file_key = excluded.cover_file_key, \
                 description = excluded.description, \
                 is_deleted = excluded.is_deleted, \
                 version = excluded.version, \
                 updated_at = excluded.updated_at",
            )
            .bind(&package.package_id)
            .bind(&package.name)
            .bind(&package.cover_file_key)
            .bind(&package.description)
            .bind(package.is_deleted)
            .bind(package.version)
            .bind(package.created_at)
            .bind(package.updated_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn local_versions(&self, ids: &[String]) -> Result<HashMap<String, i64>, Error> {
        let mut conn = self.0.acquire().await?;
        local_versions(&mut conn, &PACKAGE_COLUMNS, None, ids).await
    }

    pub async fn packages(&self) -> Result<Vec<EmojiPackage>, Error> {
        let result = sqlx::query_as::<_, EmojiPackage>(
            "SELECT * FROM emoji_packages WHERE is_deleted = 0 ORDER BY created_at ASC",
        )
        .fetch_all(&self.0)
        .await?;
        Ok(result)
    }
}

impl PackageEmojiRelationDao {
    pub async fn upsert_list(&self, relations: &[sdk::PackageEmojiRelation]) -> Result<(), Error> {
        let mut tx = self.0.begin().await?;
        for relation in relations {
            sqlx::query(
                "INSERT INTO package_emoji_relations \
                 (package_id, emoji_id, sort_order, is_deleted, version, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?) \
                 ON CONFLICT(package_id, emoji_id) DO UPDATE SET \
                 sort_order = excluded.sort_order, \
                 is_deleted = excluded.is_deleted, \
                 version = excluded.version, \
                 updated_at = excluded.updated_at",
            )
            .bind(&relation.package_id)
            .bind(&relation.emoji_id)
            .bind(relation.sort_order)
            .bind(relation.is_deleted)
            .bind(relation.version)
            .bind(relation.updated_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn local_versions(&self, ids: &[String]) -> Result<HashMap<String, i64>, Error> {
        let mut conn = self.0.acquire().await?;
        local_versions(&mut conn, &RELATION_COLUMNS, None, ids).await
    }
}

impl EmojiCollectDao {
    pub async fn upsert_list(&self, collects: &[sdk::EmojiCollect]) -> Result<(), Error> {
        let mut tx = self.0.begin().await?;
        for collect in collects {
            sqlx::query(
                "INSERT INTO emoji_collects \
                 (collect_id, user_id, emoji_id, sort_order, is_deleted, version, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT(collect_id) DO UPDATE SET \
                 sort_order = excluded.sort_order, \
                 is_deleted = excluded.is_deleted, \
                 version = excluded.version, \
                 updated_at = excluded.updated_at",
            )
            .bind(&collect.collect_id)
            .bind(&collect.user_id)
            .bind(&collect.emoji_id)
            .bind(collect.sort_order)
            .bind(collect.is_deleted)
            .bind(collect.version)
            .bind(collect.created_at)
            .bind(collect.updated_at)
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
        local_versions(&mut conn, &COLLECT_COLUMNS, Some(("user_id", user_id)), ids).await
    }

    pub async fn collects_of(&self, user_id: &str) -> Result<Vec<EmojiCollect>, Error> {
        let result = sqlx::query_as::<_, EmojiCollect>(
            "SELECT * FROM emoji_collects WHERE user_id = ? AND is_deleted = 0 ORDER BY sort_order ASC",
        )
        .bind(user_id)
        .fetch_all(&self.0)
        .await?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{emoji, emoji_collect, new_test_db, package_emoji_relation};

    #[tokio::test]
    async fn package_emojis_follow_sort_order() {
        let db = new_test_db().await;
        db.emoji_dao
            .upsert_list(&[emoji("e1", 1), emoji("e2", 1), emoji("e3", 1)])
            .await
            .unwrap();
        let mut removed = package_emoji_relation("p1", "e3", 0, 2);
        removed.is_deleted = true;
        db.package_emoji_relation_dao
            .upsert_list(&[
                package_emoji_relation("p1", "e1", 2, 1),
                package_emoji_relation("p1", "e2", 1, 1),
                removed,
            ])
            .await
            .unwrap();

        let emojis = db.emoji_dao.emojis_in_package("p1").await.unwrap();
        assert_eq!(
            emojis.iter().map(|e| e.emoji_id.as_str()).collect::<Vec<_>>(),
            vec!["e2", "e1"]
        );
        let versions = db
            .package_emoji_relation_dao
            .local_versions(&["p1:e3".to_string()])
            .await
            .unwrap();
        assert_eq!(versions["p1:e3"], 2);
    }

    #[tokio::test]
    async fn collects_are_scoped_by_user() {
        let db = new_test_db().await;
        let dao = &db.emoji_collect_dao;
        dao.upsert_list(&[emoji_collect("c1", "me", "e1", 1), emoji_collect("c2", "other", "e1", 1)])
            .await
            .unwrap();

        let ids = vec!["c1".to_string(), "c2".to_string()];
        let mine = dao.local_versions("me", &ids).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert!(mine.contains_key("c1"));
        assert_eq!(dao.collects_of("other").await.unwrap().len(), 1);
    }
}
