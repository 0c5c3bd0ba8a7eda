use std::sync::Arc;

use log::info;
use sdk::ChatMessage;
use serde_json::json;

use crate::config::QueueConfig;
use crate::core::notify::COMMAND_NEW;
use crate::core::queue::BatchQueue;
use crate::core::sync::{Businesses, SyncContext};

/// Coalesces pushed chat messages into one store write per burst.
pub struct ChatReceiver {
    queue: BatchQueue<ChatMessage>,
}

impl ChatReceiver {
    pub fn new(ctx: SyncContext, businesses: Arc<Businesses>, config: QueueConfig) -> Self {
        let queue = BatchQueue::new("chat-receiver", config, move |messages: Vec<ChatMessage>| {
            let ctx = ctx.clone();
            let businesses = businesses.clone();
            async move {
                let gaps = ctx.db.message_dao.apply_pushed(&messages).await?;
                for (conversation_id, seq) in gaps {
                    info!("{}: gap below pushed seq {}", conversation_id, seq);
                    businesses.catch_up.add((conversation_id, seq));
                }
                let ids = messages
                    .iter()
                    .map(|m| m.message_id.clone())
                    .collect::<Vec<_>>();
                let mut conversations = messages
                    .iter()
                    .map(|m| m.conversation_id.clone())
                    .collect::<Vec<_>>();
                conversations.sort();
                conversations.dedup();
                ctx.events.emit("message", COMMAND_NEW, json!({ "ids": ids }));
                ctx.events.emit_updated("conversation", &conversations);
                Ok::<_, anyhow::Error>(())
            }
        });
        ChatReceiver { queue }
    }

    pub fn add(&self, messages: Vec<ChatMessage>) {
        self.queue.add_all(messages);
    }

    pub async fn flush(&self) {
        self.queue.flush().await;
    }

    pub fn destroy(&self) {
        self.queue.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sync::SyncModules;
    use crate::tests::{chat_message, new_test_context};

    #[tokio::test]
    async fn contiguous_push_advances_watermark() {
        let (ctx, _server) = new_test_context().await;
        let modules = SyncModules::new(ctx.clone(), 100);
        let businesses = Arc::new(Businesses::new(&modules, &Default::default()));
        let receiver = ChatReceiver::new(ctx.clone(), businesses.clone(), QueueConfig::new(10, 100));
        let mut events = ctx.events.subscribe("message", COMMAND_NEW);

        receiver.add(vec![chat_message("c1", 1), chat_message("c1", 2)]);
        receiver.flush().await;

        assert_eq!(ctx.db.message_dao.synced_seq("c1").await.unwrap(), 2);
        assert!(businesses.catch_up.is_empty());
        let event = events.recv().await.unwrap();
        assert_eq!(event.data["ids"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn gap_queues_catch_up() {
        let (ctx, server) = new_test_context().await;
        for seq in 1..=3 {
            server.add_message(chat_message("c1", seq));
        }
        let modules = SyncModules::new(ctx.clone(), 100);
        let businesses = Arc::new(Businesses::new(&modules, &Default::default()));
        let receiver = ChatReceiver::new(ctx.clone(), businesses.clone(), QueueConfig::new(10, 100));

        receiver.add(vec![chat_message("c1", 3)]);
        receiver.flush().await;
        assert_eq!(ctx.db.message_dao.synced_seq("c1").await.unwrap(), 0);
        assert_eq!(businesses.catch_up.len(), 1);

        businesses.catch_up.flush().await;
        assert_eq!(ctx.db.message_dao.synced_seq("c1").await.unwrap(), 3);
        assert_eq!(ctx.db.message_dao.count_in_conversation("c1").await.unwrap(), 3);
    }
}
