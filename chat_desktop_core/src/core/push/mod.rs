use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use log::{debug, error, warn};
use sdk::{PushEvent, PushFrame};

use crate::config::Config;
use crate::core::model::notification::NotificationService;
use crate::core::sync::{Businesses, HintBusiness, SyncContext};

pub use connection::{FrameSink, PushConnection};
pub use receiver::ChatReceiver;

pub mod connection;
pub mod receiver;

/// Recently seen frame ids, oldest evicted first.
struct SeenIds {
    capacity: usize,
    order: VecDeque<String>,
    ids: HashSet<String>,
}

impl SeenIds {
    fn new(capacity: usize) -> Self {
        SeenIds {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            ids: HashSet::new(),
        }
    }

    /// False when `id` was already seen.
    fn insert(&mut self, id: &str) -> bool {
        if self.ids.contains(id) {
            return false;
        }
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        self.order.push_back(id.to_string());
        self.ids.insert(id.to_string());
        true
    }
}

struct RouterState {
    seen: SeenIds,
    paused: bool,
    buffered: VecDeque<PushFrame>,
}

/// Entry point of every inbound push frame.
pub struct PushRouter {
    ctx: SyncContext,
    state: Mutex<RouterState>,
    businesses: Arc<Businesses>,
    receiver: ChatReceiver,
    notification: Arc<NotificationService>,
}

impl PushRouter {
    pub fn new(
        ctx: SyncContext,
        businesses: Arc<Businesses>,
        notification: Arc<NotificationService>,
        config: &Config,
    ) -> Self {
        let receiver = ChatReceiver::new(ctx.clone(), businesses.clone(), config.receiver_queue);
        PushRouter {
            ctx,
            state: Mutex::new(RouterState {
                seen: SeenIds::new(config.dedup_capacity),
                paused: false,
                buffered: VecDeque::new(),
            }),
            businesses,
            receiver,
            notification,
        }
    }

    /// Frames arriving from now on are held until `resume`.
    pub fn pause(&self) {
        self.state.lock().unwrap().paused = true;
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().unwrap().paused
    }

    /// Replays held frames in arrival order. Frames arriving during the
    /// replay queue up behind it.
    pub async fn resume(&self) {
        loop {
            let frame = {
                let mut state = self.state.lock().unwrap();
                match state.buffered.pop_front() {
                    Some(frame) => frame,
                    None => {
                        state.paused = false;
                        return;
                    }
                }
            };
            self.dispatch(&frame).await;
        }
    }

    pub async fn on_frame(&self, frame: PushFrame) {
        {
            let mut state = self.state.lock().unwrap();
            if let Some(id) = &frame.content.message_id {
                if !state.seen.insert(id) {
                    debug!("drop retransmitted frame {}", id);
                    return;
                }
            }
            if state.paused {
                state.buffered.push_back(frame);
                return;
            }
        }
        self.dispatch(&frame).await;
    }

    async fn dispatch(&self, frame: &PushFrame) {
        let event = match PushEvent::decode(frame) {
            Ok(event) => event,
            Err(err) => {
                warn!("ignore push frame: {}", err);
                return;
            }
        };
        let businesses = &self.businesses;
        match event {
            PushEvent::Heartbeat => {}
            PushEvent::ChatMessages(messages) => self.receiver.add(messages),
            PushEvent::ConversationChanged(hint) => {
                if let Some(seq) = hint.seq {
                    businesses.catch_up.add((hint.conversation_id.clone(), seq));
                }
                businesses
                    .conversation
                    .add(vec![sdk::ResyncHint::new(hint.conversation_id, hint.version)]);
            }
            PushEvent::UserConversationChanged(hint) => businesses
                .user_conversation
                .add(vec![sdk::ResyncHint::new(hint.conversation_id, hint.version)]),
            PushEvent::FriendChanged(hints) => businesses.friend.add(hints),
            PushEvent::FriendVerifyChanged(hints) => businesses.friend_verify.add(hints),
            PushEvent::GroupChanged(hints) => businesses.group.add(hints),
            PushEvent::GroupMemberChanged(hints) => businesses.group_member.add(hints),
            PushEvent::GroupJoinRequestChanged(hints) => businesses.group_join_request.add(hints),
            PushEvent::EmojiChanged(hints) => businesses.emoji.add(hints),
            PushEvent::EmojiPackageChanged(hints) => businesses.emoji_package.add(hints),
            PushEvent::EmojiRelationChanged(hints) => businesses.package_emoji_relation.add(hints),
            PushEvent::EmojiCollectChanged(hints) => businesses.emoji_collect.add(hints),
            PushEvent::Notification(push) => {
                if let Err(err) = self.notification.apply_push(*push).await {
                    error!("failed to apply notification push: {:?}", err);
                }
            }
            PushEvent::UserProfile(profile) => {
                self.ctx.events.emit("user_profile", "updated", profile);
            }
        }
    }

    /// Waits until everything handed to the receiver and the hint queues so
    /// far has been processed.
    pub async fn flush(&self) {
        self.receiver.flush().await;
        self.businesses.flush_all().await;
    }

    pub fn destroy(&self) {
        self.receiver.destroy();
        self.businesses.destroy_all();
        let mut state = self.state.lock().unwrap();
        state.buffered.clear();
    }

    pub fn hint_business(&self, module: &str) -> Option<&HintBusiness> {
        self.businesses
            .hint_queues()
            .into_iter()
            .find(|business| business.module() == module)
    }
}

#[cfg(test)]
mod tests {
    use sdk::push_frame::Command;
    use serde_json::{json, Value};

    use super::*;
    use crate::core::sync::SyncModules;
    use crate::tests::{chat_message, friend, new_test_context, notification_event};

    fn router(ctx: &SyncContext, config: &Config) -> PushRouter {
        let modules = SyncModules::new(ctx.clone(), 100);
        let businesses = Arc::new(Businesses::new(&modules, config));
        let notification = Arc::new(NotificationService::new(ctx.clone()));
        PushRouter::new(ctx.clone(), businesses, notification, config)
    }

    fn frame(id: &str, command: Command, data_type: &str, body: Value) -> PushFrame {
        let mut frame = PushFrame::new(command, data_type, body);
        frame.content.message_id = Some(id.to_string());
        frame
    }

    #[test]
    fn seen_ids_evict_oldest() {
        let mut seen = SeenIds::new(2);
        assert!(seen.insert("a"));
        assert!(seen.insert("b"));
        assert!(!seen.insert("a"));
        assert!(seen.insert("c"));
        assert!(seen.insert("a"));
        assert!(!seen.insert("c"));
    }

    #[tokio::test]
    async fn retransmitted_frames_are_dropped() {
        let (ctx, _server) = new_test_context().await;
        let router = router(&ctx, &Config::default());
        let message = serde_json::to_value(chat_message("c1", 1)).unwrap();

        router.on_frame(frame("p1", Command::ChatMessage, "message", message.clone())).await;
        router.on_frame(frame("p1", Command::ChatMessage, "message", message)).await;
        router.flush().await;
        assert_eq!(ctx.db.message_dao.count_in_conversation("c1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unknown_and_malformed_frames_are_ignored() {
        let (ctx, _server) = new_test_context().await;
        let router = router(&ctx, &Config::default());
        let mut unknown = PushFrame::heartbeat();
        unknown.command = "TELEPORT".to_string();
        router.on_frame(unknown).await;
        router
            .on_frame(frame("p2", Command::GroupOperation, "info", json!({"nope": 1})))
            .await;
        router.on_frame(PushFrame::heartbeat()).await;
        router.flush().await;
    }

    #[tokio::test]
    async fn hints_reach_their_business() {
        let (ctx, server) = new_test_context().await;
        let router = router(&ctx, &Config::default());
        let v = server.put("friends", "f1", &friend("f1", "me", "u1", 0));

        router
            .on_frame(frame(
                "p1",
                Command::FriendOperation,
                "add",
                json!({"id": "f1", "version": v}),
            ))
            .await;
        assert_eq!(router.hint_business("friend").unwrap().pending(), 1);
        router.flush().await;
        assert!(ctx.db.friend_dao.find_friend_by_id("f1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn paused_frames_replay_in_arrival_order() {
        let (ctx, _server) = new_test_context().await;
        let router = router(&ctx, &Config::default());
        router.pause();
        for seq in 1..=3 {
            let body = serde_json::to_value(chat_message("c1", seq)).unwrap();
            router
                .on_frame(frame(&format!("p{}", seq), Command::ChatMessage, "message", body))
                .await;
        }
        router.flush().await;
        assert_eq!(ctx.db.message_dao.count_in_conversation("c1").await.unwrap(), 0);

        router.resume().await;
        assert!(!router.is_paused());
        router.flush().await;
        assert_eq!(ctx.db.message_dao.synced_seq("c1").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn notification_push_is_applied_directly() {
        let (ctx, _server) = new_test_context().await;
        let router = router(&ctx, &Config::default());
        let body = json!({ "event": notification_event("n1", "system", 7) });
        router
            .on_frame(frame("p1", Command::Notification, "event", body))
            .await;
        let event = ctx.db.notification_dao.find_event_by_id("n1").await.unwrap();
        assert_eq!(event.unwrap().version, 7);
    }
}
