use std::collections::HashMap;

use async_trait::async_trait;
use sdk::{Emoji, EmojiCollect, EmojiPackage, PackageEmojiRelation, VersionDiff};

use crate::core::sync::{CursorKind, SyncContext, SyncDomain};
use crate::core::SyncError;

pub struct EmojiDomain;

#[async_trait]
impl SyncDomain for EmojiDomain {
    type Record = Emoji;

    const MODULE: &'static str = "emoji";
    const CURSOR_KIND: CursorKind = CursorKind::Version;

    async fn versions(&self, ctx: &SyncContext, since: i64) -> Result<VersionDiff, SyncError> {
        Ok(ctx.client.emoji_api.emoji_versions(since).await?)
    }

    async fn local_versions(
        &self,
        ctx: &SyncContext,
        ids: &[String],
    ) -> Result<HashMap<String, i64>, SyncError> {
        Ok(ctx.db.emoji_dao.local_versions(ids).await?)
    }

    async fn fetch(&self, ctx: &SyncContext, ids: &[String]) -> Result<Vec<Emoji>, SyncError> {
        Ok(ctx.client.emoji_api.emojis_by_ids(ids).await?)
    }

    async fn apply(&self, ctx: &SyncContext, records: &[Emoji]) -> Result<(), SyncError> {
        Ok(ctx.db.emoji_dao.upsert_list(records).await?)
    }

    fn record_id(record: &Emoji) -> String {
        record.emoji_id.clone()
    }
}

pub struct EmojiPackageDomain;

#[async_trait]
impl SyncDomain for EmojiPackageDomain {
    type Record = EmojiPackage;

    const MODULE: &'static str = "emoji_package";
    const CURSOR_KIND: CursorKind = CursorKind::Version;

    async fn versions(&self, ctx: &SyncContext, since: i64) -> Result<VersionDiff, SyncError> {
        Ok(ctx.client.emoji_api.package_versions(since).await?)
    }

    async fn local_versions(
        &self,
        ctx: &SyncContext,
        ids: &[String],
    ) -> Result<HashMap<String, i64>, SyncError> {
        Ok(ctx.db.emoji_package_dao.local_versions(ids).await?)
    }

    async fn fetch(&self, ctx: &SyncContext, ids: &[String]) -> Result<Vec<EmojiPackage>, SyncError> {
        Ok(ctx.client.emoji_api.packages_by_ids(ids).await?)
    }

    async fn apply(&self, ctx: &SyncContext, records: &[EmojiPackage]) -> Result<(), SyncError> {
        Ok(ctx.db.emoji_package_dao.upsert_list(records).await?)
    }

    fn record_id(record: &EmojiPackage) -> String {
        record.package_id.clone()
    }
}

/// Ids are `packageId:emojiId`.
pub struct PackageEmojiRelationDomain;

#[async_trait]
impl SyncDomain for PackageEmojiRelationDomain {
    type Record = PackageEmojiRelation;

    const MODULE: &'static str = "package_emoji_relation";
    const CURSOR_KIND: CursorKind = CursorKind::Version;

    async fn versions(&self, ctx: &SyncContext, since: i64) -> Result<VersionDiff, SyncError> {
        Ok(ctx.client.emoji_api.relation_versions(since).await?)
    }

    async fn local_versions(
        &self,
        ctx: &SyncContext,
        ids: &[String],
    ) -> Result<HashMap<String, i64>, SyncError> {
        Ok(ctx.db.package_emoji_relation_dao.local_versions(ids).await?)
    }

    async fn fetch(
        &self,
        ctx: &SyncContext,
        ids: &[String],
    ) -> Result<Vec<PackageEmojiRelation>, SyncError> {
        Ok(ctx.client.emoji_api.relations_by_ids(ids).await?)
    }

    async fn apply(
        &self,
        ctx: &SyncContext,
        records: &[PackageEmojiRelation],
    ) -> Result<(), SyncError> {
        Ok(ctx.db.package_emoji_relation_dao.upsert_list(records).await?)
    }

    fn record_id(record: &PackageEmojiRelation) -> String {
        record.row_id()
    }
}

pub struct EmojiCollectDomain;

#[async_trait]
impl SyncDomain for EmojiCollectDomain {
    type Record = EmojiCollect;

    const MODULE: &'static str = "emoji_collect";
    const CURSOR_KIND: CursorKind = CursorKind::Version;

    async fn versions(&self, ctx: &SyncContext, since: i64) -> Result<VersionDiff, SyncError> {
        ctx.session.user_id()?;
        Ok(ctx.client.emoji_api.collect_versions(since).await?)
    }

    async fn local_versions(
        &self,
        ctx: &SyncContext,
        ids: &[String],
    ) -> Result<HashMap<String, i64>, SyncError> {
        let user_id = ctx.session.user_id()?;
        Ok(ctx.db.emoji_collect_dao.local_versions(&user_id, ids).await?)
    }

    async fn fetch(&self, ctx: &SyncContext, ids: &[String]) -> Result<Vec<EmojiCollect>, SyncError> {
        Ok(ctx.client.emoji_api.collects_by_ids(ids).await?)
    }

    async fn apply(&self, ctx: &SyncContext, records: &[EmojiCollect]) -> Result<(), SyncError> {
        Ok(ctx.db.emoji_collect_dao.upsert_list(records).await?)
    }

    fn record_id(record: &EmojiCollect) -> String {
        record.collect_id.clone()
    }
}
