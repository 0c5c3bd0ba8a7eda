use std::sync::Arc;

use log::debug;
use sdk::ResyncHint;

use crate::config::{Config, QueueConfig};
use crate::core::queue::BatchQueue;
use crate::core::sync::{HintSync, MessageSync, SyncModules};

/// Push hints of one module, batched in front of its resync.
pub struct HintBusiness {
    module: &'static str,
    queue: BatchQueue<ResyncHint>,
}

impl HintBusiness {
    pub fn new(target: Arc<dyn HintSync>, config: QueueConfig) -> Self {
        let module = target.module();
        let queue = BatchQueue::new(format!("{}-hints", module), config, move |hints: Vec<ResyncHint>| {
            let target = target.clone();
            async move {
                let applied = target.sync_hints(hints).await?;
                debug!("{}: hints applied {} rows", target.module(), applied.len());
                Ok::<_, anyhow::Error>(())
            }
        });
        HintBusiness { module, queue }
    }

    pub fn module(&self) -> &'static str {
        self.module
    }

    pub fn add(&self, hints: Vec<ResyncHint>) {
        self.queue.add_all(hints);
    }

    pub async fn flush(&self) {
        self.queue.flush().await;
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn destroy(&self) {
        self.queue.destroy();
    }
}

fn catch_up_queue(message: Arc<MessageSync>, config: QueueConfig) -> BatchQueue<(String, i64)> {
    BatchQueue::new("message-catch-up", config, move |hints: Vec<(String, i64)>| {
        let message = message.clone();
        async move {
            message.catch_up_hints(hints).await?;
            Ok::<_, anyhow::Error>(())
        }
    })
}

/// The hint queues of every hinted module plus the message catch-up queue.
pub struct Businesses {
    pub conversation: HintBusiness,
    pub user_conversation: HintBusiness,
    pub friend: HintBusiness,
    pub friend_verify: HintBusiness,
    pub group: HintBusiness,
    pub group_member: HintBusiness,
    pub group_join_request: HintBusiness,
    pub emoji: HintBusiness,
    pub emoji_package: HintBusiness,
    pub package_emoji_relation: HintBusiness,
    pub emoji_collect: HintBusiness,
    pub catch_up: BatchQueue<(String, i64)>,
}

impl Businesses {
    pub fn new(modules: &SyncModules, config: &Config) -> Self {
        let queue = config.hint_queue;
        Businesses {
            conversation: HintBusiness::new(modules.conversation.clone(), queue),
            user_conversation: HintBusiness::new(modules.user_conversation.clone(), queue),
            friend: HintBusiness::new(modules.friend.clone(), queue),
            friend_verify: HintBusiness::new(modules.friend_verify.clone(), queue),
            group: HintBusiness::new(modules.group.clone(), queue),
            group_member: HintBusiness::new(modules.group_member.clone(), queue),
            group_join_request: HintBusiness::new(modules.group_join_request.clone(), queue),
            emoji: HintBusiness::new(modules.emoji.clone(), queue),
            emoji_package: HintBusiness::new(modules.emoji_package.clone(), queue),
            package_emoji_relation: HintBusiness::new(modules.package_emoji_relation.clone(), queue),
            emoji_collect: HintBusiness::new(modules.emoji_collect.clone(), queue),
            catch_up: catch_up_queue(modules.message.clone(), config.catch_up_queue),
        }
    }

    pub fn hint_queues(&self) -> [&HintBusiness; 11] {
        [
            &self.conversation,
            &self.user_conversation,
            &self.friend,
            &self.friend_verify,
            &self.group,
            &self.group_member,
            &self.group_join_request,
            &self.emoji,
            &self.emoji_package,
            &self.package_emoji_relation,
            &self.emoji_collect,
        ]
    }

    pub async fn flush_all(&self) {
        for business in self.hint_queues() {
            business.flush().await;
        }
        self.catch_up.flush().await;
    }

    pub fn destroy_all(&self) {
        for business in self.hint_queues() {
            business.destroy();
        }
        self.catch_up.destroy();
    }
}
