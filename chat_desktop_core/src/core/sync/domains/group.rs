use std::collections::HashMap;

use async_trait::async_trait;
use sdk::{Group, GroupJoinRequest, GroupMember, VersionDiff};

use crate::core::sync::{CursorKind, SyncContext, SyncDomain};
use crate::core::SyncError;

pub struct GroupDomain;

#[async_trait]
impl SyncDomain for GroupDomain {
    type Record = Group;

    const MODULE: &'static str = "group";
    const CURSOR_KIND: CursorKind = CursorKind::Timestamp;

    async fn versions(&self, ctx: &SyncContext, since: i64) -> Result<VersionDiff, SyncError> {
        Ok(ctx.client.group_api.group_versions(since).await?)
    }

    async fn local_versions(
        &self,
        ctx: &SyncContext,
        ids: &[String],
    ) -> Result<HashMap<String, i64>, SyncError> {
        Ok(ctx.db.group_dao.local_versions(ids).await?)
    }

    async fn fetch(&self, ctx: &SyncContext, ids: &[String]) -> Result<Vec<Group>, SyncError> {
        Ok(ctx.client.group_api.groups_by_ids(ids).await?)
    }

    async fn apply(&self, ctx: &SyncContext, records: &[Group]) -> Result<(), SyncError> {
        Ok(ctx.db.group_dao.upsert_list(records).await?)
    }

    fn record_id(record: &Group) -> String {
        record.group_id.clone()
    }
}

/// Ids are `groupId:userId`.
pub struct GroupMemberDomain;

#[async_trait]
impl SyncDomain for GroupMemberDomain {
    type Record = GroupMember;

    const MODULE: &'static str = "group_member";
    const CURSOR_KIND: CursorKind = CursorKind::Timestamp;

    async fn versions(&self, ctx: &SyncContext, since: i64) -> Result<VersionDiff, SyncError> {
        Ok(ctx.client.group_api.member_versions(since).await?)
    }

    async fn local_versions(
        &self,
        ctx: &SyncContext,
        ids: &[String],
    ) -> Result<HashMap<String, i64>, SyncError> {
        Ok(ctx.db.group_member_dao.local_versions(ids).await?)
    }

    async fn fetch(&self, ctx: &SyncContext, ids: &[String]) -> Result<Vec<GroupMember>, SyncError> {
        Ok(ctx.client.group_api.members_by_ids(ids).await?)
    }

    async fn apply(&self, ctx: &SyncContext, records: &[GroupMember]) -> Result<(), SyncError> {
        Ok(ctx.db.group_member_dao.upsert_list(records).await?)
    }

    fn record_id(record: &GroupMember) -> String {
        record.row_id()
    }
}

/// Ids are the server's numeric request ids, carried as strings.
pub struct GroupJoinRequestDomain;

#[async_trait]
impl SyncDomain for GroupJoinRequestDomain {
    type Record = GroupJoinRequest;

    const MODULE: &'static str = "group_join_request";
    const CURSOR_KIND: CursorKind = CursorKind::Timestamp;

    async fn versions(&self, ctx: &SyncContext, since: i64) -> Result<VersionDiff, SyncError> {
        Ok(ctx.client.group_api.join_request_versions(since).await?)
    }

    async fn local_versions(
        &self,
        ctx: &SyncContext,
        ids: &[String],
    ) -> Result<HashMap<String, i64>, SyncError> {
        Ok(ctx.db.group_join_request_dao.local_versions(ids).await?)
    }

    async fn fetch(
        &self,
        ctx: &SyncContext,
        ids: &[String],
    ) -> Result<Vec<GroupJoinRequest>, SyncError> {
        Ok(ctx.client.group_api.join_requests_by_ids(ids).await?)
    }

    async fn apply(&self, ctx: &SyncContext, records: &[GroupJoinRequest]) -> Result<(), SyncError> {
        Ok(ctx.db.group_join_request_dao.upsert_list(records).await?)
    }

    fn record_id(record: &GroupJoinRequest) -> String {
        record.id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use sdk::JoinRequestStatus;

    use crate::core::sync::{CheckAndSync, HintSync, IncrementalSync};
    use crate::tests::{group_join_request, group_member, new_test_context};

    use super::*;

    #[tokio::test]
    async fn members_sync_by_composite_id() {
        let (ctx, server) = new_test_context().await;
        server.put("groupMembers", "g1:u1", &group_member("g1", "u1", 0));
        server.put("groupMembers", "g1:u2", &group_member("g1", "u2", 0));
        let module = IncrementalSync::new(GroupMemberDomain, ctx.clone());
        let report = module.check_and_sync().await.unwrap();
        assert_eq!(report.applied.len(), 2);

        let again = module.sync_hints(vec![sdk::ResyncHint::new(
            "g1:u1",
            Some(server.version_of("groupMembers", "g1:u1")),
        )]);
        assert!(again.await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn join_request_hint_with_numeric_id() {
        let (ctx, server) = new_test_context().await;
        let mut request = group_join_request(17, "g1", "u9", 0);
        server.put("groupJoinRequests", "17", &request);
        let module = IncrementalSync::new(GroupJoinRequestDomain, ctx.clone());
        module.check_and_sync().await.unwrap();

        request.status = JoinRequestStatus::Rejected;
        let version = server.put("groupJoinRequests", "17", &request);
        let applied = module
            .sync_hints(vec![sdk::ResyncHint::new("17", Some(version))])
            .await
            .unwrap();
        assert_eq!(applied, vec!["17".to_string()]);
        let stored = ctx
            .db
            .group_join_request_dao
            .find_request_by_id(17)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, JoinRequestStatus::Rejected);
    }
}
