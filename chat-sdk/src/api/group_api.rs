use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::api::{composite_id, VersionDiff};
use crate::client::ClientRef;
use crate::ApiError;

pub struct GroupApi {
    client: Arc<ClientRef>,
}

impl GroupApi {
    pub(crate) fn new(client: Arc<ClientRef>) -> Self {
        GroupApi { client }
    }
}

int_enum! {
    #[derive(Default)]
    pub enum MemberRole {
        Owner = 1,
        Admin = 2,
        #[default]
        Member = 3,
    }
}

int_enum! {
    #[derive(Default)]
    pub enum MemberStatus {
        #[default]
        Active = 1,
        Left = 2,
        Kicked = 3,
    }
}

int_enum! {
    #[derive(Default)]
    pub enum JoinRequestStatus {
        #[default]
        Pending = 0,
        Approved = 1,
        Rejected = 2,
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub group_id: String,
    pub name: String,
    #[serde(default)]
    pub avatar: String,
    pub owner_id: String,
    #[serde(default)]
    pub announcement: String,
    #[serde(default)]
    pub member_count: i64,
    #[serde(default)]
    pub is_dismissed: bool,
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GroupMember {
    pub group_id: String,
    pub user_id: String,
    #[serde(default)]
    pub role: MemberRole,
    #[serde(default)]
    pub status: MemberStatus,
    pub nickname: Option<String>,
    pub version: i64,
    pub joined_at: i64,
    pub updated_at: i64,
}

impl GroupMember {
    pub fn row_id(&self) -> String {
        composite_id(&self.group_id, &self.user_id)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GroupJoinRequest {
    pub id: i64,
    pub group_id: String,
    pub user_id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: JoinRequestStatus,
    pub handled_by: Option<String>,
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl GroupApi {
    pub async fn group_versions(&self, since: i64) -> Result<VersionDiff, ApiError> {
        self.client
            .versions("sync/groups", "groupVersions", since)
            .await
    }

    pub async fn groups_by_ids(&self, ids: &[String]) -> Result<Vec<Group>, ApiError> {
        self.client.by_ids("groups/byIds", "groups", ids).await
    }

    /// Member ids are `groupId:userId`.
    pub async fn member_versions(&self, since: i64) -> Result<VersionDiff, ApiError> {
        self.client
            .versions("sync/groupMembers", "groupMemberVersions", since)
            .await
    }

    pub async fn members_by_ids(&self, ids: &[String]) -> Result<Vec<GroupMember>, ApiError> {
        self.client
            .by_ids("groupMembers/byIds", "groupMembers", ids)
            .await
    }

    pub async fn join_request_versions(&self, since: i64) -> Result<VersionDiff, ApiError> {
        self.client
            .versions("sync/groupJoinRequests", "groupJoinRequestVersions", since)
            .await
    }

    pub async fn join_requests_by_ids(
        &self,
        ids: &[String],
    ) -> Result<Vec<GroupJoinRequest>, ApiError> {
        self.client
            .by_ids("groupJoinRequests/byIds", "groupJoinRequests", ids)
            .await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn member_defaults_and_row_id() {
        let member: GroupMember = serde_json::from_value(json!({
            "groupId": "g1", "userId": "u1", "nickname": null,
            "version": 1, "joinedAt": 1, "updatedAt": 1
        }))
        .unwrap();
        assert_eq!(member.role, MemberRole::Member);
        assert_eq!(member.status, MemberStatus::Active);
        assert_eq!(member.row_id(), "g1:u1");
    }
}
