use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use sdk::{Client, ResyncHint, VersionDiff};
use strum_macros::Display;
use tokio::sync::Mutex;

use crate::core::{EventBus, SyncError};
use crate::db::ChatDatabase;

pub use business::{Businesses, HintBusiness};
pub use domains::*;
pub use message::MessageSync;

pub mod business;
pub mod domains;
pub mod message;

/// What a module's cursor holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum CursorKind {
    /// The `serverTimestamp` of the last diff.
    Timestamp,
    /// The highest row version seen so far.
    Version,
}

/// The user the engine syncs for.
#[derive(Default)]
pub struct Session {
    user_id: RwLock<Option<String>>,
}

impl Session {
    pub fn user_id(&self) -> Result<String, SyncError> {
        self.user_id
            .read()
            .unwrap()
            .clone()
            .ok_or(SyncError::NotLoggedIn)
    }

    pub fn is_logged_in(&self) -> bool {
        self.user_id.read().unwrap().is_some()
    }

    pub(crate) fn set(&self, user_id: Option<String>) {
        *self.user_id.write().unwrap() = user_id;
    }
}

/// Everything a sync module reads from or writes to.
#[derive(Clone)]
pub struct SyncContext {
    pub db: Arc<ChatDatabase>,
    pub client: Arc<Client>,
    pub events: Arc<EventBus>,
    pub session: Arc<Session>,
    pub page_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub module: &'static str,
    pub cursor_before: i64,
    pub cursor_after: i64,
    /// Rows fetched and applied by this pass.
    pub applied: Vec<String>,
}

/// One data family: where its diff comes from, how local versions are read
/// and how full records are fetched and stored.
#[async_trait]
pub trait SyncDomain: Send + Sync + 'static {
    type Record: Send + Sync + 'static;

    const MODULE: &'static str;
    const CURSOR_KIND: CursorKind;

    async fn versions(&self, ctx: &SyncContext, since: i64) -> Result<VersionDiff, SyncError>;

    async fn local_versions(
        &self,
        ctx: &SyncContext,
        ids: &[String],
    ) -> Result<HashMap<String, i64>, SyncError>;

    async fn fetch(&self, ctx: &SyncContext, ids: &[String])
        -> Result<Vec<Self::Record>, SyncError>;

    async fn apply(&self, ctx: &SyncContext, records: &[Self::Record]) -> Result<(), SyncError>;

    fn record_id(record: &Self::Record) -> String;
}

/// A module of the full resync.
#[async_trait]
pub trait CheckAndSync: Send + Sync {
    fn module(&self) -> &'static str;

    async fn check_and_sync(&self) -> Result<SyncReport, SyncError>;
}

/// Target of push resync hints.
#[async_trait]
pub trait HintSync: Send + Sync {
    fn module(&self) -> &'static str;

    /// Fetches the hinted rows that are missing or older locally. Returns
    /// the ids that were applied.
    async fn sync_hints(&self, hints: Vec<ResyncHint>) -> Result<Vec<String>, SyncError>;
}

/// The shared diff / filter / page / apply / advance algorithm, bound to one
/// domain. Passes of the same module never overlap.
pub struct IncrementalSync<D: SyncDomain> {
    domain: D,
    ctx: SyncContext,
    running: Mutex<()>,
}

impl<D: SyncDomain> IncrementalSync<D> {
    pub fn new(domain: D, ctx: SyncContext) -> Self {
        IncrementalSync {
            domain,
            ctx,
            running: Mutex::new(()),
        }
    }

    async fn cursor(&self) -> Result<i64, SyncError> {
        let cursor = self.ctx.db.sync_cursor_dao.get(D::MODULE).await?;
        Ok(cursor.map(|c| c.version).unwrap_or_default())
    }

    /// Dedupes `candidates` (highest version wins, unknown version beats
    /// everything), drops those the store already has at an equal or newer
    /// version and fetches the rest page by page.
    async fn fetch_stale(
        &self,
        candidates: impl IntoIterator<Item = (String, Option<i64>)>,
    ) -> Result<Vec<String>, SyncError> {
        let mut order = vec![];
        let mut wanted: HashMap<String, Option<i64>> = HashMap::new();
        for (id, version) in candidates {
            match wanted.get_mut(&id) {
                Some(existing) => {
                    *existing = match (*existing, version) {
                        (Some(a), Some(b)) => Some(a.max(b)),
                        _ => None,
                    }
                }
                None => {
                    order.push(id.clone());
                    wanted.insert(id, version);
                }
            }
        }
        if order.is_empty() {
            return Ok(vec![]);
        }

        let local = self.domain.local_versions(&self.ctx, &order).await?;
        let stale = order
            .into_iter()
            .filter(|id| match (wanted.get(id).copied().flatten(), local.get(id)) {
                (_, None) => true,
                (None, Some(_)) => true,
                (Some(server), Some(local)) => *local < server,
            })
            .collect::<Vec<_>>();
        debug!(
            "{}: {} of {} rows are stale",
            D::MODULE,
            stale.len(),
            wanted.len()
        );

        let mut applied = vec![];
        for page in stale.chunks(self.ctx.page_size.max(1)) {
            let records = self.domain.fetch(&self.ctx, page).await?;
            self.domain.apply(&self.ctx, &records).await?;
            applied.extend(records.iter().map(D::record_id));
        }
        self.ctx.events.emit_updated(D::MODULE, &applied);
        Ok(applied)
    }
}

#[async_trait]
impl<D: SyncDomain> CheckAndSync for IncrementalSync<D> {
    fn module(&self) -> &'static str {
        D::MODULE
    }

    async fn check_and_sync(&self) -> Result<SyncReport, SyncError> {
        let _running = self.running.lock().await;
        let before = self.cursor().await?;
        let diff = self.domain.versions(&self.ctx, before).await?;
        let target = match D::CURSOR_KIND {
            CursorKind::Timestamp => diff.server_timestamp,
            CursorKind::Version => diff.max_version().unwrap_or(before),
        };
        let applied = self
            .fetch_stale(diff.versions.into_iter().map(|v| (v.id, Some(v.version))))
            .await?;
        let after = self
            .ctx
            .db
            .sync_cursor_dao
            .advance(D::MODULE, target, Utc::now().timestamp_millis())
            .await?;
        info!(
            "{}: synced {} rows, cursor {} -> {}",
            D::MODULE,
            applied.len(),
            before,
            after
        );
        Ok(SyncReport {
            module: D::MODULE,
            cursor_before: before,
            cursor_after: after,
            applied,
        })
    }
}

#[async_trait]
impl<D: SyncDomain> HintSync for IncrementalSync<D> {
    fn module(&self) -> &'static str {
        D::MODULE
    }

    async fn sync_hints(&self, hints: Vec<ResyncHint>) -> Result<Vec<String>, SyncError> {
        let _running = self.running.lock().await;
        self.fetch_stale(hints.into_iter().map(|h| (h.id, h.version)))
            .await
    }
}

/// Every module of the engine, built once.
pub struct SyncModules {
    pub message: Arc<MessageSync>,
    pub conversation: Arc<IncrementalSync<ConversationDomain>>,
    pub user_conversation: Arc<IncrementalSync<UserConversationDomain>>,
    pub friend: Arc<IncrementalSync<FriendDomain>>,
    pub friend_verify: Arc<IncrementalSync<FriendVerifyDomain>>,
    pub group: Arc<IncrementalSync<GroupDomain>>,
    pub group_member: Arc<IncrementalSync<GroupMemberDomain>>,
    pub group_join_request: Arc<IncrementalSync<GroupJoinRequestDomain>>,
    pub emoji: Arc<IncrementalSync<EmojiDomain>>,
    pub emoji_package: Arc<IncrementalSync<EmojiPackageDomain>>,
    pub package_emoji_relation: Arc<IncrementalSync<PackageEmojiRelationDomain>>,
    pub emoji_collect: Arc<IncrementalSync<EmojiCollectDomain>>,
    pub notification_event: Arc<IncrementalSync<NotificationEventDomain>>,
    pub notification_inbox: Arc<IncrementalSync<NotificationInboxDomain>>,
}

impl SyncModules {
    pub fn new(ctx: SyncContext, chunk_size: i64) -> Self {
        SyncModules {
            message: Arc::new(MessageSync::new(ctx.clone(), chunk_size)),
            conversation: Arc::new(IncrementalSync::new(ConversationDomain, ctx.clone())),
            user_conversation: Arc::new(IncrementalSync::new(UserConversationDomain, ctx.clone())),
            friend: Arc::new(IncrementalSync::new(FriendDomain, ctx.clone())),
            friend_verify: Arc::new(IncrementalSync::new(FriendVerifyDomain, ctx.clone())),
            group: Arc::new(IncrementalSync::new(GroupDomain, ctx.clone())),
            group_member: Arc::new(IncrementalSync::new(GroupMemberDomain, ctx.clone())),
            group_join_request: Arc::new(IncrementalSync::new(GroupJoinRequestDomain, ctx.clone())),
            emoji: Arc::new(IncrementalSync::new(EmojiDomain, ctx.clone())),
            emoji_package: Arc::new(IncrementalSync::new(EmojiPackageDomain, ctx.clone())),
            package_emoji_relation: Arc::new(IncrementalSync::new(
                PackageEmojiRelationDomain,
                ctx.clone(),
            )),
            emoji_collect: Arc::new(IncrementalSync::new(EmojiCollectDomain, ctx.clone())),
            notification_event: Arc::new(IncrementalSync::new(NotificationEventDomain, ctx.clone())),
            notification_inbox: Arc::new(IncrementalSync::new(NotificationInboxDomain, ctx)),
        }
    }

    /// Full resync order.
    pub fn ordered(&self) -> Vec<Arc<dyn CheckAndSync>> {
        vec![
            self.conversation.clone(),
            self.user_conversation.clone(),
            self.message.clone(),
            self.friend.clone(),
            self.friend_verify.clone(),
            self.group.clone(),
            self.group_member.clone(),
            self.group_join_request.clone(),
            self.emoji.clone(),
            self.emoji_package.clone(),
            self.package_emoji_relation.clone(),
            self.emoji_collect.clone(),
            self.notification_event.clone(),
            self.notification_inbox.clone(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::tests::{friend, friend_verify, new_test_context, FakeServer};

    #[tokio::test]
    async fn diff_filter_skips_rows_already_current() {
        let (ctx, server) = new_test_context().await;
        let module = IncrementalSync::new(FriendDomain, ctx.clone());
        let f1 = server.put("friends", "f1", &friend("f1", "me", "u1", 0));
        server.put("friends", "f2", &friend("f2", "me", "u2", 0));
        ctx.db
            .friend_dao
            .upsert_list(&[friend("f1", "me", "u1", f1)])
            .await
            .unwrap();

        let report = module.check_and_sync().await.unwrap();
        assert_eq!(report.applied, vec!["f2".to_string()]);
        assert_eq!(server.requests_to("friends/byIds"), vec![json!({"ids": ["f2"]})]);
        assert_eq!(report.cursor_after, server.clock());
    }

    #[tokio::test]
    async fn cursor_advances_even_without_changes() {
        let (ctx, server) = new_test_context().await;
        let module = IncrementalSync::new(FriendDomain, ctx.clone());
        server.tick(5);
        let report = module.check_and_sync().await.unwrap();
        assert!(report.applied.is_empty());
        assert_eq!(report.cursor_after, 5);
        assert!(server.requests_to("friends/byIds").is_empty());
    }

    #[tokio::test]
    async fn failure_leaves_cursor_and_retry_heals() {
        let (ctx, server) = new_test_context().await;
        let module = IncrementalSync::new(FriendDomain, ctx.clone());
        server.put("friends", "f1", &friend("f1", "me", "u1", 0));
        server.fail("friends/byIds");

        assert!(module.check_and_sync().await.is_err());
        assert!(ctx.db.sync_cursor_dao.get("friend").await.unwrap().is_none());

        server.recover("friends/byIds");
        let report = module.check_and_sync().await.unwrap();
        assert_eq!(report.cursor_before, 0);
        assert_eq!(report.applied, vec!["f1".to_string()]);
    }

    #[tokio::test]
    async fn cursor_is_monotonic_for_version_domains() {
        let (ctx, server) = new_test_context().await;
        let module = IncrementalSync::new(EmojiDomain, ctx.clone());
        server.put("emojis", "e1", &crate::tests::emoji("e1", 0));
        let first = module.check_and_sync().await.unwrap();
        assert_eq!(first.cursor_after, 1);

        // nothing new: max version of an empty diff keeps the cursor
        server.tick(10);
        let second = module.check_and_sync().await.unwrap();
        assert_eq!(second.cursor_after, 1);
        assert!(second.cursor_after >= second.cursor_before);
    }

    #[tokio::test]
    async fn fetches_are_paged() {
        let (mut ctx, server) = new_test_context().await;
        ctx.page_size = 2;
        let module = IncrementalSync::new(FriendDomain, ctx.clone());
        for i in 0..5 {
            let id = format!("f{}", i);
            server.put("friends", &id, &friend(&id, "me", "u", 0));
        }
        let report = module.check_and_sync().await.unwrap();
        assert_eq!(report.applied.len(), 5);
        assert_eq!(server.requests_to("friends/byIds").len(), 3);
    }

    #[tokio::test]
    async fn stale_hints_are_dropped() {
        let (ctx, server) = new_test_context().await;
        let module = IncrementalSync::new(FriendVerifyDomain, ctx.clone());
        let v = server.put("friendVerifies", "v1", &friend_verify("v1", "me", "peer", 0));
        ctx.db
            .friend_verify_dao
            .upsert_list(&[friend_verify("v1", "me", "peer", v)])
            .await
            .unwrap();

        let applied = module
            .sync_hints(vec![ResyncHint::new("v1", Some(v)), ResyncHint::new("v1", Some(v - 1))])
            .await
            .unwrap();
        assert!(applied.is_empty());
        let applied = module
            .sync_hints(vec![ResyncHint::new("v1", None)])
            .await
            .unwrap();
        assert_eq!(applied, vec!["v1".to_string()]);
        assert_eq!(server.requests_to("friendVerifies/byIds").len(), 1);
    }

    #[tokio::test]
    async fn repeated_sync_converges_after_lost_pushes() {
        let (ctx, server) = new_test_context().await;
        let modules = SyncModules::new(ctx.clone(), 100);
        for round in 0..3 {
            let id = format!("f{}", round);
            server.put("friends", &id, &friend(&id, "me", "u", 0));
            let mut updated = friend("f0", "me", "u", 0);
            updated.remark = format!("round {}", round);
            server.put("friends", "f0", &updated);
            modules.friend.check_and_sync().await.unwrap();
        }
        let stored = ctx.db.friend_dao.find_friend_by_id("f0").await.unwrap().unwrap();
        assert_eq!(stored.remark, "round 2");
        assert_eq!(stored.version, server.version_of("friends", "f0"));
        assert_eq!(ctx.db.friend_dao.friends_of("me").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn passes_of_one_module_do_not_overlap() {
        struct Slow(Arc<AtomicUsize>, Arc<AtomicUsize>);

        #[async_trait]
        impl SyncDomain for Slow {
            type Record = String;
            const MODULE: &'static str = "slow";
            const CURSOR_KIND: CursorKind = CursorKind::Timestamp;

            async fn versions(&self, _: &SyncContext, _: i64) -> Result<VersionDiff, SyncError> {
                let now = self.0.fetch_add(1, Ordering::SeqCst) + 1;
                self.1.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                self.0.fetch_sub(1, Ordering::SeqCst);
                Ok(VersionDiff {
                    versions: vec![],
                    server_timestamp: 1,
                })
            }

            async fn local_versions(
                &self,
                _: &SyncContext,
                _: &[String],
            ) -> Result<HashMap<String, i64>, SyncError> {
                Ok(HashMap::new())
            }

            async fn fetch(&self, _: &SyncContext, _: &[String]) -> Result<Vec<String>, SyncError> {
                Ok(vec![])
            }

            async fn apply(&self, _: &SyncContext, _: &[String]) -> Result<(), SyncError> {
                Ok(())
            }

            fn record_id(record: &String) -> String {
                record.clone()
            }
        }

        let (ctx, _server) = new_test_context().await;
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let module = IncrementalSync::new(Slow(active, peak.clone()), ctx);
        let (a, b) = tokio::join!(module.check_and_sync(), module.check_and_sync());
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }
}
