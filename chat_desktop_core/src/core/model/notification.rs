use log::{debug, warn};
use sdk::NotificationPush;
use serde_json::json;

use crate::core::sync::SyncContext;
use crate::core::SyncError;
use crate::db::chat::notification::InboxEntry;

pub struct NotificationService {
    ctx: SyncContext,
}

impl NotificationService {
    pub fn new(ctx: SyncContext) -> Self {
        NotificationService { ctx }
    }

    pub async fn inbox(&self, category: &str, limit: i64) -> Result<Vec<InboxEntry>, SyncError> {
        let user_id = self.ctx.session.user_id()?;
        Ok(self
            .ctx
            .db
            .notification_dao
            .inbox(&user_id, category, limit)
            .await?)
    }

    pub async fn unread_count(&self, category: &str) -> Result<i64, SyncError> {
        let user_id = self.ctx.session.user_id()?;
        Ok(self
            .ctx
            .db
            .notification_dao
            .unread_count(&user_id, category)
            .await?)
    }

    /// Moves the category's read cursor to its newest inbox entry and reports
    /// it. Returns the stored cursor.
    pub async fn mark_category_read(&self, category: &str) -> Result<i64, SyncError> {
        let user_id = self.ctx.session.user_id()?;
        let dao = &self.ctx.db.notification_dao;
        let latest = dao.latest_inbox_at(&user_id, category).await?;
        let last_read_at = dao.advance_read_cursor(&user_id, category, latest).await?;
        if let Err(err) = self
            .ctx
            .client
            .notification_api
            .mark_read(category, last_read_at)
            .await
        {
            warn!("report {} read failed: {}", category, err);
        }
        self.ctx.events.emit(
            "notification",
            "read",
            json!({ "category": category, "lastReadAt": last_read_at }),
        );
        Ok(last_read_at)
    }

    /// A pushed event carries its full data and is stored as is. An inbox
    /// entry addressed to someone else is ignored.
    pub async fn apply_push(&self, push: NotificationPush) -> Result<(), SyncError> {
        let dao = &self.ctx.db.notification_dao;
        let event_id = push.event.event_id.clone();
        dao.upsert_events(std::slice::from_ref(&push.event)).await?;
        self.ctx
            .events
            .emit_updated("notification_event", &[event_id.clone()]);

        let Some(item) = push.inbox else {
            return Ok(());
        };
        let user_id = self.ctx.session.user_id()?;
        if item.user_id != user_id {
            debug!("inbox entry of {} is not for {}", event_id, user_id);
            return Ok(());
        }
        dao.upsert_inbox(std::slice::from_ref(&item)).await?;
        self.ctx
            .events
            .emit_updated("notification_inbox", &[event_id]);
        Ok(())
    }
}
