use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::api::{composite_id, VersionDiff};
use crate::client::ClientRef;
use crate::ApiError;

pub struct EmojiApi {
    client: Arc<ClientRef>,
}

impl EmojiApi {
    pub(crate) fn new(client: Arc<ClientRef>) -> Self {
        EmojiApi { client }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Emoji {
    pub emoji_id: String,
    #[serde(default)]
    pub name: String,
    pub file_key: String,
    #[serde(default)]
    pub width: i32,
    #[serde(default)]
    pub height: i32,
    #[serde(default)]
    pub is_deleted: bool,
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EmojiPackage {
    pub package_id: String,
    pub name: String,
    #[serde(default)]
    pub cover_file_key: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_deleted: bool,
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PackageEmojiRelation {
    pub package_id: String,
    pub emoji_id: String,
    #[serde(default)]
    pub sort_order: i64,
    #[serde(default)]
    pub is_deleted: bool,
    pub version: i64,
    pub updated_at: i64,
}

impl PackageEmojiRelation {
    pub fn row_id(&self) -> String {
        composite_id(&self.package_id, &self.emoji_id)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EmojiCollect {
    pub collect_id: String,
    pub user_id: String,
    pub emoji_id: String,
    #[serde(default)]
    pub sort_order: i64,
    #[serde(default)]
    pub is_deleted: bool,
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl EmojiApi {
    pub async fn emoji_versions(&self, since: i64) -> Result<VersionDiff, ApiError> {
        self.client
            .versions("sync/emojis", "emojiVersions", since)
            .await
    }

    pub async fn emojis_by_ids(&self, ids: &[String]) -> Result<Vec<Emoji>, ApiError> {
        self.client.by_ids("emojis/byIds", "emojis", ids).await
    }

    pub async fn package_versions(&self, since: i64) -> Result<VersionDiff, ApiError> {
        self.client
            .versions("sync/emojiPackages", "emojiPackageVersions", since)
            .await
    }

    pub async fn packages_by_ids(&self, ids: &[String]) -> Result<Vec<EmojiPackage>, ApiError> {
        self.client
            .by_ids("emojiPackages/byIds", "emojiPackages", ids)
            .await
    }

    /// Relation ids are `packageId:emojiId`.
    pub async fn relation_versions(&self, since: i64) -> Result<VersionDiff, ApiError> {
        self.client
            .versions(
                "sync/packageEmojiRelations",
                "packageEmojiRelationVersions",
                since,
            )
            .await
    }

    pub async fn relations_by_ids(
        &self,
        ids: &[String],
    ) -> Result<Vec<PackageEmojiRelation>, ApiError> {
        self.client
            .by_ids("packageEmojiRelations/byIds", "packageEmojiRelations", ids)
            .await
    }

    pub async fn collect_versions(&self, since: i64) -> Result<VersionDiff, ApiError> {
        self.client
            .versions("sync/emojiCollects", "emojiCollectVersions", since)
            .await
    }

    pub async fn collects_by_ids(&self, ids: &[String]) -> Result<Vec<EmojiCollect>, ApiError> {
        self.client
            .by_ids("emojiCollects/byIds", "emojiCollects", ids)
            .await
    }
}
