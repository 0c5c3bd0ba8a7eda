use std::collections::HashMap;

use serde_json::Value;
use sqlx::types::Json;
use sqlx::Sqlite;

use crate::db::chat::util::{local_versions, VersionColumns};
use crate::db::Error;

#[derive(Clone)]
pub struct NotificationDao(pub(crate) sqlx::Pool<Sqlite>);

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct NotificationEvent {
    pub event_id: String,
    pub category: String,
    pub event_type: String,
    pub payload: Json<Value>,
    pub version: i64,
    pub created_at: i64,
}

/// One inbox row joined with its event. The event may still be in flight
/// when the inbox row lands first.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct InboxEntry {
    pub event_id: String,
    pub category: String,
    pub event_type: Option<String>,
    pub payload: Option<Json<Value>>,
    pub created_at: i64,
}

const EVENT_COLUMNS: VersionColumns = VersionColumns::new("notification_events", "event_id");
const INBOX_COLUMNS: VersionColumns = VersionColumns::new("notification_inbox", "event_id");

impl NotificationDao {
    pub async fn upsert_events(&self, events: &[sdk::NotificationEvent]) -> Result<(), Error> {
        let mut tx = self.0.begin().await?;
        for event in events {
            sqlx::query(
                "INSERT INTO notification_events \
                 (event_id, category, event_type, payload, version, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?) \
                 ON CONFLICT(event_id) DO UPDATE SET \
                 category = excluded.category, \
                 event_type = excluded.event_type, \
                 payload = excluded.payload, \
                 version = excluded.version",
            )
            .bind(&event.event_id)
            .bind(&event.category)
            .bind(&event.event_type)
            .bind(Json(&event.payload))
            .bind(event.version)
            .bind(event.created_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Conflicts resolve on `(user_id, event_id)`, never on the row id.
    pub async fn upsert_inbox(&self, items: &[sdk::NotificationInboxItem]) -> Result<(), Error> {
        let mut tx = self.0.begin().await?;
        for item in items {
            sqlx::query(
                "INSERT INTO notification_inbox (user_id, event_id, category, version, created_at) \
                 VALUES (?, ?, ?, ?, ?) \
                 ON CONFLICT(user_id, event_id) DO UPDATE SET \
                 category = excluded.category, \
                 version = excluded.version",
            )
            .bind(&item.user_id)
            .bind(&item.event_id)
            .bind(&item.category)
            .bind(item.version)
            .bind(item.created_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn event_versions(&self, ids: &[String]) -> Result<HashMap<String, i64>, Error> {
        let mut conn = self.0.acquire().await?;
        local_versions(&mut conn, &EVENT_COLUMNS, None, ids).await
    }

    pub async fn inbox_versions(
        &self,
        user_id: &str,
        ids: &[String],
    ) -> Result<HashMap<String, i64>, Error> {
        let mut conn = self.0.acquire().await?;
        local_versions(&mut conn, &INBOX_COLUMNS, Some(("user_id", user_id)), ids).await
    }

    pub async fn find_event_by_id(&self, event_id: &str) -> Result<Option<NotificationEvent>, Error> {
        let result = sqlx::query_as::<_, NotificationEvent>(
            "SELECT * FROM notification_events WHERE event_id = ?",
        )
        .bind(event_id)
        .fetch_optional(&self.0)
        .await?;
        Ok(result)
    }

    /// Newest first.
    pub async fn inbox(
        &self,
        user_id: &str,
        category: &str,
        limit: i64,
    ) -> Result<Vec<InboxEntry>, Error> {
        let result = sqlx::query_as::<_, InboxEntry>(
            "SELECT i.event_id, i.category, e.event_type, e.payload, i.created_at \
             FROM notification_inbox i \
             LEFT JOIN notification_events e ON e.event_id = i.event_id \
             WHERE i.user_id = ? AND i.category = ? \
             ORDER BY i.created_at DESC, i.id DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(category)
        .bind(limit)
        .fetch_all(&self.0)
        .await?;
        Ok(result)
    }

    pub async fn last_read_at(&self, user_id: &str, category: &str) -> Result<i64, Error> {
        let result = sqlx::query_scalar::<_, i64>(
            "SELECT last_read_at FROM notification_read_cursors WHERE user_id = ? AND category = ?",
        )
        .bind(user_id)
        .bind(category)
        .fetch_optional(&self.0)
        .await?;
        Ok(result.unwrap_or_default())
    }

    /// Never moves the read cursor backwards; returns the stored value.
    pub async fn advance_read_cursor(
        &self,
        user_id: &str,
        category: &str,
        last_read_at: i64,
    ) -> Result<i64, Error> {
        sqlx::query(
            "INSERT INTO notification_read_cursors (user_id, category, last_read_at) VALUES (?, ?, ?) \
             ON CONFLICT(user_id, category) DO UPDATE SET \
             last_read_at = MAX(last_read_at, excluded.last_read_at)",
        )
        .bind(user_id)
        .bind(category)
        .bind(last_read_at)
        .execute(&self.0)
        .await?;
        self.last_read_at(user_id, category).await
    }

    pub async fn unread_count(&self, user_id: &str, category: &str) -> Result<i64, Error> {
        let result = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM notification_inbox i \
             WHERE i.user_id = ? AND i.category = ? AND i.created_at > COALESCE( \
               (SELECT last_read_at FROM notification_read_cursors c \
                WHERE c.user_id = i.user_id AND c.category = i.category), 0)",
        )
        .bind(user_id)
        .bind(category)
        .fetch_one(&self.0)
        .await?;
        Ok(result)
    }

    /// Newest inbox timestamp of a category, used when marking it read.
    pub async fn latest_inbox_at(&self, user_id: &str, category: &str) -> Result<i64, Error> {
        let result = sqlx::query_scalar::<_, Option<i64>>(
            "SELECT MAX(created_at) FROM notification_inbox WHERE user_id = ? AND category = ?",
        )
        .bind(user_id)
        .bind(category)
        .fetch_one(&self.0)
        .await?;
        Ok(result.unwrap_or_default())
    }
}
