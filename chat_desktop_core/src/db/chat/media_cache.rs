use chrono::Utc;
use sqlx::Sqlite;

use crate::db::Error;

#[derive(Clone)]
pub struct MediaCacheDao(pub(crate) sqlx::Pool<Sqlite>);

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct MediaCacheEntry {
    pub file_key: String,
    pub path: String,
    #[sqlx(rename = "type")]
    pub media_type: String,
    pub size: i64,
    pub is_deleted: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl MediaCacheDao {
    /// Records a verified file; revives a soft-deleted entry.
    pub async fn upsert(
        &self,
        file_key: &str,
        path: &str,
        media_type: &str,
        size: i64,
    ) -> Result<(), Error> {
        let now = Utc::now().timestamp_millis();
        sqlx::query(
            "INSERT INTO media_cache (file_key, path, type, size, is_deleted, created_at, updated_at) \
             VALUES (?, ?, ?, ?, 0, ?, ?) \
             ON CONFLICT(file_key) DO UPDATE SET \
             path = excluded.path, \
             type = excluded.type, \
             size = excluded.size, \
             is_deleted = 0, \
             updated_at = excluded.updated_at",
        )
        .bind(file_key)
        .bind(path)
        .bind(media_type)
        .bind(size)
        .bind(now)
        .bind(now)
        .execute(&self.0)
        .await?;
        Ok(())
    }

    /// Live entry for `file_key`; soft-deleted rows count as absent.
    pub async fn find(&self, file_key: &str) -> Result<Option<MediaCacheEntry>, Error> {
        let result = sqlx::query_as::<_, MediaCacheEntry>(
            "SELECT * FROM media_cache WHERE file_key = ? AND is_deleted = 0",
        )
        .bind(file_key)
        .fetch_optional(&self.0)
        .await?;
        Ok(result)
    }

    pub async fn mark_deleted(&self, file_key: &str) -> Result<u64, Error> {
        let result = sqlx::query(
            "UPDATE media_cache SET is_deleted = 1, updated_at = ? WHERE file_key = ?",
        )
        .bind(Utc::now().timestamp_millis())
        .bind(file_key)
        .execute(&self.0)
        .await?;
        Ok(result.rows_affected())
    }
}
