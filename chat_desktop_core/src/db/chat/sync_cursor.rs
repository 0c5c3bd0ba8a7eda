use sqlx::Sqlite;

use crate::db::Error;

#[derive(Clone)]
pub struct SyncCursorDao(pub(crate) sqlx::Pool<Sqlite>);

/// Last synchronized marker of one module. `version` holds either a server
/// timestamp or a row version depending on the module.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct SyncCursor {
    pub module: String,
    pub version: i64,
    pub updated_at: i64,
}

impl SyncCursorDao {
    pub async fn get(&self, module: &str) -> Result<Option<SyncCursor>, Error> {
        let result = sqlx::query_as::<_, SyncCursor>(
            "SELECT module, version, updated_at FROM sync_cursors WHERE module = ?",
        )
        .bind(module)
        .fetch_optional(&self.0)
        .await?;
        Ok(result)
    }

    /// Last writer wins.
    pub async fn upsert(&self, module: &str, version: i64, updated_at: i64) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO sync_cursors (module, version, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT(module) DO UPDATE SET version = excluded.version, updated_at = excluded.updated_at",
        )
        .bind(module)
        .bind(version)
        .bind(updated_at)
        .execute(&self.0)
        .await?;
        Ok(())
    }

    /// Moves the cursor forward only; returns the stored value.
    pub async fn advance(&self, module: &str, version: i64, updated_at: i64) -> Result<i64, Error> {
        sqlx::query(
            "INSERT INTO sync_cursors (module, version, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT(module) DO UPDATE SET version = MAX(version, excluded.version), updated_at = excluded.updated_at",
        )
        .bind(module)
        .bind(version)
        .bind(updated_at)
        .execute(&self.0)
        .await?;
        let stored = sqlx::query_scalar::<_, i64>("SELECT version FROM sync_cursors WHERE module = ?")
            .bind(module)
            .fetch_one(&self.0)
            .await?;
        Ok(stored)
    }

    pub async fn all(&self) -> Result<Vec<SyncCursor>, Error> {
        let result = sqlx::query_as::<_, SyncCursor>(
            "SELECT module, version, updated_at FROM sync_cursors ORDER BY module",
        )
        .fetch_all(&self.0)
        .await?;
        Ok(result)
    }

    pub async fn clear(&self) -> Result<(), Error> {
        sqlx::query("DELETE FROM sync_cursors").execute(&self.0).await?;
        Ok(())
    }
}
