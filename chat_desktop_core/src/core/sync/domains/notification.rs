use std::collections::HashMap;

use async_trait::async_trait;
use sdk::{NotificationEvent, NotificationInboxItem, VersionDiff};

use crate::core::sync::{CursorKind, SyncContext, SyncDomain};
use crate::core::SyncError;

pub struct NotificationEventDomain;

#[async_trait]
impl SyncDomain for NotificationEventDomain {
    type Record = NotificationEvent;

    const MODULE: &'static str = "notification_event";
    const CURSOR_KIND: CursorKind = CursorKind::Version;

    async fn versions(&self, ctx: &SyncContext, since: i64) -> Result<VersionDiff, SyncError> {
        Ok(ctx.client.notification_api.event_versions(since).await?)
    }

    async fn local_versions(
        &self,
        ctx: &SyncContext,
        ids: &[String],
    ) -> Result<HashMap<String, i64>, SyncError> {
        Ok(ctx.db.notification_dao.event_versions(ids).await?)
    }

    async fn fetch(
        &self,
        ctx: &SyncContext,
        ids: &[String],
    ) -> Result<Vec<NotificationEvent>, SyncError> {
        Ok(ctx.client.notification_api.events_by_ids(ids).await?)
    }

    async fn apply(&self, ctx: &SyncContext, records: &[NotificationEvent]) -> Result<(), SyncError> {
        Ok(ctx.db.notification_dao.upsert_events(records).await?)
    }

    fn record_id(record: &NotificationEvent) -> String {
        record.event_id.clone()
    }
}

/// The session user's inbox. Ids are event ids.
pub struct NotificationInboxDomain;

#[async_trait]
impl SyncDomain for NotificationInboxDomain {
    type Record = NotificationInboxItem;

    const MODULE: &'static str = "notification_inbox";
    const CURSOR_KIND: CursorKind = CursorKind::Version;

    async fn versions(&self, ctx: &SyncContext, since: i64) -> Result<VersionDiff, SyncError> {
        ctx.session.user_id()?;
        Ok(ctx.client.notification_api.inbox_versions(since).await?)
    }

    async fn local_versions(
        &self,
        ctx: &SyncContext,
        ids: &[String],
    ) -> Result<HashMap<String, i64>, SyncError> {
        let user_id = ctx.session.user_id()?;
        Ok(ctx.db.notification_dao.inbox_versions(&user_id, ids).await?)
    }

    async fn fetch(
        &self,
        ctx: &SyncContext,
        ids: &[String],
    ) -> Result<Vec<NotificationInboxItem>, SyncError> {
        Ok(ctx.client.notification_api.inbox_by_ids(ids).await?)
    }

    async fn apply(
        &self,
        ctx: &SyncContext,
        records: &[NotificationInboxItem],
    ) -> Result<(), SyncError> {
        Ok(ctx.db.notification_dao.upsert_inbox(records).await?)
    }

    fn record_id(record: &NotificationInboxItem) -> String {
        record.event_id.clone()
    }
}

#[cfg(test)]
mod tests {
    use crate::core::sync::{CheckAndSync, IncrementalSync};
    use crate::tests::{inbox_item, new_test_context, notification_event};

    use super::*;

    #[tokio::test]
    async fn inbox_and_events_join_after_sync() {
        let (ctx, server) = new_test_context().await;
        server.put("notificationEvents", "n1", &notification_event("n1", "system", 0));
        server.put("notificationInbox", "n1", &inbox_item("me", "n1", "system", 0, 100));

        IncrementalSync::new(NotificationEventDomain, ctx.clone())
            .check_and_sync()
            .await
            .unwrap();
        IncrementalSync::new(NotificationInboxDomain, ctx.clone())
            .check_and_sync()
            .await
            .unwrap();

        let inbox = ctx.db.notification_dao.inbox("me", "system", 10).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].event_type.as_deref(), Some("notice"));
        assert_eq!(ctx.db.notification_dao.unread_count("me", "system").await.unwrap(), 1);
    }
}
