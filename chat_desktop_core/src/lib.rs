pub mod config;
pub mod core;
pub mod db;

#[cfg(test)]
pub mod tests {
    use std::collections::{BTreeMap, HashMap};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use log::LevelFilter;
    use serde::Serialize;
    use serde_json::{json, Value};
    use simplelog::{Config, TestLogger};

    use sdk::{
        ApiError, ChatMessage, Client, ConversationMeta, ConversationType, Emoji, EmojiCollect,
        Friend, FriendVerify, Group, GroupJoinRequest, GroupMember, JoinRequestStatus,
        MemberRole, MemberStatus, MessagePayload, NotificationEvent, NotificationInboxItem,
        PackageEmojiRelation, Transport, UserConversation, VerifyStatus,
    };

    use crate::core::sync::{Session, SyncContext};
    use crate::core::EventBus;
    use crate::db::ChatDatabase;

    pub fn init_logger() {
        let _ = TestLogger::init(LevelFilter::Trace, Config::default());
    }

    pub async fn new_test_db() -> Arc<ChatDatabase> {
        init_logger();
        Arc::new(
            ChatDatabase::in_memory()
                .await
                .expect("failed to create db"),
        )
    }

    /// A context logged in as `me`, talking to a fresh [`FakeServer`].
    pub async fn new_test_context() -> (SyncContext, Arc<FakeServer>) {
        let db = new_test_db().await;
        let server = Arc::new(FakeServer::default());
        let session = Arc::new(Session::default());
        session.set(Some("me".to_string()));
        let ctx = SyncContext {
            db,
            client: Arc::new(Client::with_transport(server.clone())),
            events: Arc::new(EventBus::default()),
            session,
            page_size: sdk::api::BY_IDS_PAGE_SIZE,
        };
        (ctx, server)
    }

    #[derive(Default)]
    struct ServerState {
        clock: i64,
        /// collection -> id -> row, `version` already stamped.
        rows: HashMap<String, BTreeMap<String, (i64, Value)>>,
        /// conversation -> seq -> message.
        messages: HashMap<String, BTreeMap<i64, ChatMessage>>,
        /// conversation -> clock of its last new message.
        message_changed_at: HashMap<String, i64>,
        requests: Vec<(String, Value)>,
        /// endpoint -> successful answers left before it starts failing.
        failing: HashMap<String, usize>,
        /// endpoint -> most rows one answer returns, whatever the limit.
        row_caps: HashMap<String, usize>,
    }

    /// In-memory server. Every change ticks one global clock; a row's
    /// version is the clock value of its last change, so timestamp and
    /// version cursors read the same numbers.
    #[derive(Default)]
    pub struct FakeServer {
        state: Mutex<ServerState>,
    }

    fn versions_field(collection: &str) -> String {
        let singular = match collection {
            "emojis" => "emoji",
            "friendVerifies" => "friendVerify",
            "notificationInbox" => "notificationInbox",
            other => other.strip_suffix('s').unwrap_or(other),
        };
        format!("{}Versions", singular)
    }

    fn ids_of(params: &Value) -> Vec<String> {
        params["ids"]
            .as_array()
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| id.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    impl FakeServer {
        /// Stores `record` under `collection/id` at the next clock value and
        /// returns that version.
        pub fn put(&self, collection: &str, id: &str, record: &impl Serialize) -> i64 {
            let mut state = self.state.lock().unwrap();
            state.clock += 1;
            let version = state.clock;
            let mut value = serde_json::to_value(record).unwrap();
            value["version"] = json!(version);
            state
                .rows
                .entry(collection.to_string())
                .or_default()
                .insert(id.to_string(), (version, value));
            version
        }

        pub fn version_of(&self, collection: &str, id: &str) -> i64 {
            let state = self.state.lock().unwrap();
            state.rows[collection][id].0
        }

        pub fn add_message(&self, message: ChatMessage) {
            let mut state = self.state.lock().unwrap();
            state.clock += 1;
            let clock = state.clock;
            state
                .message_changed_at
                .insert(message.conversation_id.clone(), clock);
            state
                .messages
                .entry(message.conversation_id.clone())
                .or_default()
                .insert(message.seq, message);
        }

        pub fn clock(&self) -> i64 {
            self.state.lock().unwrap().clock
        }

        pub fn tick(&self, n: i64) {
            self.state.lock().unwrap().clock += n;
        }

        pub fn fail(&self, endpoint: &str) {
            self.fail_after(endpoint, 0);
        }

        /// Answers `endpoint` `successes` more times, then fails it.
        pub fn fail_after(&self, endpoint: &str, successes: usize) {
            let mut state = self.state.lock().unwrap();
            state.failing.insert(endpoint.to_string(), successes);
        }

        /// Truncates every `endpoint` answer to `rows` rows.
        pub fn cap_rows(&self, endpoint: &str, rows: usize) {
            let mut state = self.state.lock().unwrap();
            state.row_caps.insert(endpoint.to_string(), rows);
        }

        pub fn recover(&self, endpoint: &str) {
            self.state.lock().unwrap().failing.remove(endpoint);
        }

        pub fn requests_to(&self, endpoint: &str) -> Vec<Value> {
            let state = self.state.lock().unwrap();
            state
                .requests
                .iter()
                .filter(|(e, _)| e == endpoint)
                .map(|(_, params)| params.clone())
                .collect()
        }

        fn answer(state: &mut ServerState, endpoint: &str, params: &Value) -> Option<Value> {
            let since = params["since"].as_i64().unwrap_or_default();
            match endpoint {
                "sync/messages" => {
                    let mut changed = state
                        .message_changed_at
                        .iter()
                        .filter(|(_, at)| **at > since)
                        .map(|(id, at)| (*at, id.clone()))
                        .collect::<Vec<_>>();
                    changed.sort();
                    let versions = changed
                        .into_iter()
                        .map(|(_, id)| {
                            let max_seq = state.messages[&id].keys().last().copied().unwrap_or(0);
                            json!({ "id": id, "version": max_seq })
                        })
                        .collect::<Vec<_>>();
                    Some(json!({ "messageVersions": versions, "serverTimestamp": state.clock }))
                }
                "chat/sync" => {
                    let conversation_id = params["conversationId"].as_str()?;
                    let from = params["fromSeq"].as_i64()?;
                    let to = params["toSeq"].as_i64()?;
                    let mut limit = params["limit"].as_i64()? as usize;
                    if let Some(cap) = state.row_caps.get(endpoint) {
                        limit = limit.min(*cap);
                    }
                    let messages: Vec<ChatMessage> = match state.messages.get(conversation_id) {
                        Some(m) if from <= to => {
                            m.range(from..=to).take(limit).map(|(_, m)| m.clone()).collect()
                        }
                        _ => vec![],
                    };
                    Some(json!({ "messages": messages }))
                }
                "chat/send" => {
                    let conversation_id = params["conversationId"].as_str()?.to_string();
                    let seq = state
                        .messages
                        .get(&conversation_id)
                        .and_then(|m| m.keys().last().copied())
                        .unwrap_or(0)
                        + 1;
                    state.clock += 1;
                    let created_at = state.clock;
                    let message: ChatMessage = serde_json::from_value(json!({
                        "messageId": params["messageId"],
                        "conversationId": conversation_id,
                        "seq": seq,
                        "sendUserId": "me",
                        "msgType": params["msgType"],
                        "payload": params["payload"],
                        "createdAt": created_at,
                    }))
                    .ok()?;
                    let response = json!({
                        "messageId": message.message_id,
                        "seq": seq,
                        "createdAt": created_at,
                    });
                    state.message_changed_at.insert(conversation_id.clone(), created_at);
                    state
                        .messages
                        .entry(conversation_id)
                        .or_default()
                        .insert(seq, message);
                    Some(response)
                }
                "conversation/read" | "notification/read" => Some(json!({})),
                _ => {
                    if let Some(collection) = endpoint.strip_prefix("sync/") {
                        let mut versions = state
                            .rows
                            .get(collection)
                            .map(|rows| {
                                rows.iter()
                                    .filter(|(_, (version, _))| *version > since)
                                    .map(|(id, (version, _))| (*version, id.clone()))
                                    .collect::<Vec<_>>()
                            })
                            .unwrap_or_default();
                        versions.sort();
                        let versions = versions
                            .into_iter()
                            .map(|(version, id)| json!({ "id": id, "version": version }))
                            .collect::<Vec<_>>();
                        let mut data = json!({ "serverTimestamp": state.clock });
                        data[versions_field(collection)] = json!(versions);
                        return Some(data);
                    }
                    let collection = endpoint.strip_suffix("/byIds")?;
                    let rows = state.rows.get(collection);
                    let records = ids_of(params)
                        .iter()
                        .filter_map(|id| rows.and_then(|r| r.get(id)).map(|(_, v)| v.clone()))
                        .collect::<Vec<_>>();
                    let mut data = json!({});
                    data[collection] = json!(records);
                    Some(data)
                }
            }
        }
    }

    #[async_trait]
    impl Transport for FakeServer {
        async fn request(&self, endpoint: &str, params: Value) -> Result<Value, ApiError> {
            let mut state = self.state.lock().unwrap();
            state.requests.push((endpoint.to_string(), params.clone()));
            if let Some(left) = state.failing.get_mut(endpoint) {
                if *left == 0 {
                    return Err(ApiError::Server(sdk::Error::new(503, 503, endpoint)));
                }
                *left -= 1;
            }
            Self::answer(&mut state, endpoint, &params)
                .ok_or_else(|| ApiError::Server(sdk::Error::new(404, 404, endpoint)))
        }
    }

    pub fn conversation_meta(id: &str, max_seq: i64, version: i64) -> ConversationMeta {
        ConversationMeta {
            conversation_id: id.to_string(),
            conversation_type: ConversationType::Single,
            max_seq,
            last_message: None,
            version,
            created_at: 1,
            updated_at: 1 + version,
        }
    }

    pub fn user_conversation(user_id: &str, conversation_id: &str, version: i64) -> UserConversation {
        UserConversation {
            user_id: user_id.to_string(),
            conversation_id: conversation_id.to_string(),
            is_hidden: false,
            is_pinned: false,
            is_muted: false,
            user_read_seq: 0,
            version,
            updated_at: version,
        }
    }

    pub fn chat_message(conversation_id: &str, seq: i64) -> ChatMessage {
        ChatMessage {
            message_id: format!("{}-{}", conversation_id, seq),
            conversation_id: conversation_id.to_string(),
            seq,
            send_user_id: "peer".to_string(),
            payload: MessagePayload::text(format!("message {}", seq)),
            created_at: seq * 1000,
        }
    }

    pub fn friend(id: &str, user_id: &str, friend_user_id: &str, version: i64) -> Friend {
        Friend {
            friend_id: id.to_string(),
            user_id: user_id.to_string(),
            friend_user_id: friend_user_id.to_string(),
            remark: String::new(),
            is_deleted: false,
            version,
            created_at: 1,
            updated_at: version,
        }
    }

    pub fn friend_verify(id: &str, send_user_id: &str, rev_user_id: &str, version: i64) -> FriendVerify {
        FriendVerify {
            verify_id: id.to_string(),
            send_user_id: send_user_id.to_string(),
            rev_user_id: rev_user_id.to_string(),
            message: format!("hi, {} here", send_user_id),
            source: "search".to_string(),
            send_status: VerifyStatus::Unhandled,
            rev_status: VerifyStatus::Unhandled,
            version,
            created_at: 1,
            updated_at: version,
        }
    }

    pub fn group(id: &str, version: i64) -> Group {
        Group {
            group_id: id.to_string(),
            name: format!("group {}", id),
            avatar: String::new(),
            owner_id: "owner".to_string(),
            announcement: String::new(),
            member_count: 1,
            is_dismissed: false,
            version,
            created_at: 1,
            updated_at: version,
        }
    }

    pub fn group_member(group_id: &str, user_id: &str, version: i64) -> GroupMember {
        GroupMember {
            group_id: group_id.to_string(),
            user_id: user_id.to_string(),
            role: MemberRole::Member,
            status: MemberStatus::Active,
            nickname: None,
            version,
            joined_at: 1,
            updated_at: version,
        }
    }

    pub fn group_join_request(id: i64, group_id: &str, user_id: &str, version: i64) -> GroupJoinRequest {
        GroupJoinRequest {
            id,
            group_id: group_id.to_string(),
            user_id: user_id.to_string(),
            message: format!("{} wants to join", user_id),
            status: JoinRequestStatus::Pending,
            handled_by: None,
            version,
            created_at: 1,
            updated_at: version,
        }
    }

    pub fn emoji(id: &str, version: i64) -> Emoji {
        Emoji {
            emoji_id: id.to_string(),
            name: id.to_string(),
            file_key: "0cc175b9c0f1b6a831c399e269772661.png".to_string(),
            width: 64,
            height: 64,
            is_deleted: false,
            version,
            created_at: 1,
            updated_at: version,
        }
    }

    pub fn package_emoji_relation(
        package_id: &str,
        emoji_id: &str,
        sort_order: i64,
        version: i64,
    ) -> PackageEmojiRelation {
        PackageEmojiRelation {
            package_id: package_id.to_string(),
            emoji_id: emoji_id.to_string(),
            sort_order,
            is_deleted: false,
            version,
            updated_at: version,
        }
    }

    pub fn emoji_collect(id: &str, user_id: &str, emoji_id: &str, version: i64) -> EmojiCollect {
        EmojiCollect {
            collect_id: id.to_string(),
            user_id: user_id.to_string(),
            emoji_id: emoji_id.to_string(),
            sort_order: 0,
            is_deleted: false,
            version,
            created_at: 1,
            updated_at: version,
        }
    }

    pub fn notification_event(id: &str, category: &str, version: i64) -> NotificationEvent {
        NotificationEvent {
            event_id: id.to_string(),
            category: category.to_string(),
            event_type: "notice".to_string(),
            payload: json!({ "text": format!("event {}", id) }),
            version,
            created_at: 1,
        }
    }

    pub fn inbox_item(
        user_id: &str,
        event_id: &str,
        category: &str,
        version: i64,
        created_at: i64,
    ) -> NotificationInboxItem {
        NotificationInboxItem {
            user_id: user_id.to_string(),
            event_id: event_id.to_string(),
            category: category.to_string(),
            version,
            created_at,
        }
    }
}
