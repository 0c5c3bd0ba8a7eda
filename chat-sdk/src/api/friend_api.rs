use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::api::VersionDiff;
use crate::client::ClientRef;
use crate::ApiError;

pub struct FriendApi {
    client: Arc<ClientRef>,
}

impl FriendApi {
    pub(crate) fn new(client: Arc<ClientRef>) -> Self {
        FriendApi { client }
    }
}

int_enum! {
    /// Each side of a friend request keeps its own status.
    #[derive(Default)]
    pub enum VerifyStatus {
        #[default]
        Unhandled = 0,
        Accepted = 1,
        Rejected = 2,
        Ignored = 3,
        Deleted = 4,
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Friend {
    pub friend_id: String,
    pub user_id: String,
    pub friend_user_id: String,
    #[serde(default)]
    pub remark: String,
    #[serde(default)]
    pub is_deleted: bool,
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FriendVerify {
    pub verify_id: String,
    pub send_user_id: String,
    pub rev_user_id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub send_status: VerifyStatus,
    #[serde(default)]
    pub rev_status: VerifyStatus,
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl FriendApi {
    pub async fn friend_versions(&self, since: i64) -> Result<VersionDiff, ApiError> {
        self.client
            .versions("sync/friends", "friendVersions", since)
            .await
    }

    pub async fn friends_by_ids(&self, ids: &[String]) -> Result<Vec<Friend>, ApiError> {
        self.client.by_ids("friends/byIds", "friends", ids).await
    }

    pub async fn verify_versions(&self, since: i64) -> Result<VersionDiff, ApiError> {
        self.client
            .versions("sync/friendVerifies", "friendVerifyVersions", since)
            .await
    }

    pub async fn verifies_by_ids(&self, ids: &[String]) -> Result<Vec<FriendVerify>, ApiError> {
        self.client
            .by_ids("friendVerifies/byIds", "friendVerifies", ids)
            .await
    }
}
