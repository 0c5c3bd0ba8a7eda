use std::collections::HashMap;

use async_trait::async_trait;
use sdk::{Friend, FriendVerify, VersionDiff};

use crate::core::sync::{CursorKind, SyncContext, SyncDomain};
use crate::core::SyncError;

pub struct FriendDomain;

#[async_trait]
impl SyncDomain for FriendDomain {
    type Record = Friend;

    const MODULE: &'static str = "friend";
    const CURSOR_KIND: CursorKind = CursorKind::Timestamp;

    async fn versions(&self, ctx: &SyncContext, since: i64) -> Result<VersionDiff, SyncError> {
        Ok(ctx.client.friend_api.friend_versions(since).await?)
    }

    async fn local_versions(
        &self,
        ctx: &SyncContext,
        ids: &[String],
    ) -> Result<HashMap<String, i64>, SyncError> {
        Ok(ctx.db.friend_dao.local_versions(ids).await?)
    }

    async fn fetch(&self, ctx: &SyncContext, ids: &[String]) -> Result<Vec<Friend>, SyncError> {
        Ok(ctx.client.friend_api.friends_by_ids(ids).await?)
    }

    async fn apply(&self, ctx: &SyncContext, records: &[Friend]) -> Result<(), SyncError> {
        Ok(ctx.db.friend_dao.upsert_list(records).await?)
    }

    fn record_id(record: &Friend) -> String {
        record.friend_id.clone()
    }
}

pub struct FriendVerifyDomain;

#[async_trait]
impl SyncDomain for FriendVerifyDomain {
    type Record = FriendVerify;

    const MODULE: &'static str = "friend_verify";
    const CURSOR_KIND: CursorKind = CursorKind::Timestamp;

    async fn versions(&self, ctx: &SyncContext, since: i64) -> Result<VersionDiff, SyncError> {
        Ok(ctx.client.friend_api.verify_versions(since).await?)
    }

    async fn local_versions(
        &self,
        ctx: &SyncContext,
        ids: &[String],
    ) -> Result<HashMap<String, i64>, SyncError> {
        Ok(ctx.db.friend_verify_dao.local_versions(ids).await?)
    }

    async fn fetch(&self, ctx: &SyncContext, ids: &[String]) -> Result<Vec<FriendVerify>, SyncError> {
        Ok(ctx.client.friend_api.verifies_by_ids(ids).await?)
    }

    async fn apply(&self, ctx: &SyncContext, records: &[FriendVerify]) -> Result<(), SyncError> {
        Ok(ctx.db.friend_verify_dao.upsert_list(records).await?)
    }

    fn record_id(record: &FriendVerify) -> String {
        record.verify_id.clone()
    }
}
