use std::collections::HashMap;

use async_trait::async_trait;
use sdk::{ConversationMeta, UserConversation, VersionDiff};

use crate::core::sync::{CursorKind, SyncContext, SyncDomain};
use crate::core::SyncError;

pub struct ConversationDomain;

#[async_trait]
impl SyncDomain for ConversationDomain {
    type Record = ConversationMeta;

    const MODULE: &'static str = "conversation";
    const CURSOR_KIND: CursorKind = CursorKind::Timestamp;

    async fn versions(&self, ctx: &SyncContext, since: i64) -> Result<VersionDiff, SyncError> {
        Ok(ctx.client.conversation_api.conversation_versions(since).await?)
    }

    async fn local_versions(
        &self,
        ctx: &SyncContext,
        ids: &[String],
    ) -> Result<HashMap<String, i64>, SyncError> {
        Ok(ctx.db.conversation_dao.local_versions(ids).await?)
    }

    async fn fetch(
        &self,
        ctx: &SyncContext,
        ids: &[String],
    ) -> Result<Vec<ConversationMeta>, SyncError> {
        Ok(ctx.client.conversation_api.conversations_by_ids(ids).await?)
    }

    async fn apply(&self, ctx: &SyncContext, records: &[ConversationMeta]) -> Result<(), SyncError> {
        Ok(ctx.db.conversation_dao.upsert_list(records).await?)
    }

    fn record_id(record: &ConversationMeta) -> String {
        record.conversation_id.clone()
    }
}

/// Per-user settings. Row ids are conversation ids within the session user.
pub struct UserConversationDomain;

#[async_trait]
impl SyncDomain for UserConversationDomain {
    type Record = UserConversation;

    const MODULE: &'static str = "user_conversation";
    const CURSOR_KIND: CursorKind = CursorKind::Timestamp;

    async fn versions(&self, ctx: &SyncContext, since: i64) -> Result<VersionDiff, SyncError> {
        ctx.session.user_id()?;
        Ok(ctx
            .client
            .conversation_api
            .user_conversation_versions(since)
            .await?)
    }

    async fn local_versions(
        &self,
        ctx: &SyncContext,
        ids: &[String],
    ) -> Result<HashMap<String, i64>, SyncError> {
        let user_id = ctx.session.user_id()?;
        Ok(ctx
            .db
            .user_conversation_dao
            .local_versions(&user_id, ids)
            .await?)
    }

    async fn fetch(
        &self,
        ctx: &SyncContext,
        ids: &[String],
    ) -> Result<Vec<UserConversation>, SyncError> {
        Ok(ctx
            .client
            .conversation_api
            .user_conversations_by_ids(ids)
            .await?)
    }

    async fn apply(&self, ctx: &SyncContext, records: &[UserConversation]) -> Result<(), SyncError> {
        Ok(ctx.db.user_conversation_dao.upsert_list(records).await?)
    }

    fn record_id(record: &UserConversation) -> String {
        record.conversation_id.clone()
    }
}

#[cfg(test)]
mod tests {
    use crate::core::sync::{CheckAndSync, IncrementalSync};
    use crate::core::SyncError;
    use crate::tests::{conversation_meta, new_test_context, user_conversation};

    use super::*;

    #[tokio::test]
    async fn user_settings_need_a_session() {
        let (ctx, server) = new_test_context().await;
        ctx.session.set(None);
        let module = IncrementalSync::new(UserConversationDomain, ctx.clone());
        assert!(matches!(
            module.check_and_sync().await,
            Err(SyncError::NotLoggedIn)
        ));
        assert!(server.requests_to("sync/userConversations").is_empty());
    }

    #[tokio::test]
    async fn conversation_then_settings() {
        let (ctx, server) = new_test_context().await;
        server.put("conversations", "c1", &conversation_meta("c1", 12, 0));
        server.put("userConversations", "c1", &user_conversation("me", "c1", 0));

        IncrementalSync::new(ConversationDomain, ctx.clone())
            .check_and_sync()
            .await
            .unwrap();
        IncrementalSync::new(UserConversationDomain, ctx.clone())
            .check_and_sync()
            .await
            .unwrap();

        assert_eq!(ctx.db.conversation_dao.max_seq("c1").await.unwrap(), 12);
        let visible = ctx
            .db
            .user_conversation_dao
            .visible_conversations("me")
            .await
            .unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].version, server.version_of("userConversations", "c1"));
    }
}
