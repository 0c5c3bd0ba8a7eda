use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, error, warn};
use serde_json::json;
use tokio::sync::Mutex;

use crate::core::notify::COMMAND_NEW;
use crate::core::sync::{CheckAndSync, SyncContext, SyncReport};
use crate::core::SyncError;

pub const MODULE: &str = "message";

/// Outcome of one conversation's catch-up pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatchUp {
    pub chunks: usize,
    pub synced_seq: i64,
}

/// Message module. The diff lists conversations whose server `max_seq`
/// moved; each is then caught up by seq range, one chunk at a time.
pub struct MessageSync {
    ctx: SyncContext,
    chunk_size: i64,
    running: Mutex<()>,
}

impl MessageSync {
    pub fn new(ctx: SyncContext, chunk_size: i64) -> Self {
        MessageSync {
            ctx,
            chunk_size: chunk_size.clamp(1, sdk::api::chat_api::MAX_SYNC_LIMIT),
            running: Mutex::new(()),
        }
    }

    /// Fetches `synced_seq + 1 ..= server_max_seq` in chunks. Each chunk and
    /// its watermark commit together before the next chunk is requested.
    /// The watermark only moves past seqs the server answered for: a short
    /// chunk commits its highest returned seq and the next chunk starts
    /// right after it. An empty chunk commits `to`, skipping seqs the
    /// server no longer has.
    async fn catch_up_locked(
        &self,
        conversation_id: &str,
        server_max_seq: i64,
    ) -> Result<CatchUp, SyncError> {
        let db = &self.ctx.db;
        let mut synced_seq = db.message_dao.synced_seq(conversation_id).await?;
        let mut chunks = 0;
        while synced_seq < server_max_seq {
            let from = synced_seq + 1;
            let to = (from + self.chunk_size - 1).min(server_max_seq);
            let messages = self
                .ctx
                .client
                .chat_api
                .sync_range(conversation_id, from, to, self.chunk_size)
                .await?;
            let messages = messages
                .into_iter()
                .filter(|m| m.conversation_id == conversation_id && m.seq >= from && m.seq <= to)
                .collect::<Vec<_>>();
            let watermark = if (messages.len() as i64) < to - from + 1 {
                match messages.iter().map(|m| m.seq).max() {
                    Some(highest) => {
                        debug!(
                            "{}: short chunk {}..={} ({} rows), continuing after {}",
                            conversation_id,
                            from,
                            to,
                            messages.len(),
                            highest
                        );
                        highest
                    }
                    None => to,
                }
            } else {
                to
            };
            db.message_dao
                .apply_chunk(conversation_id, &messages, watermark)
                .await?;
            chunks += 1;
            synced_seq = watermark;
            if !messages.is_empty() {
                let ids = messages.iter().map(|m| m.message_id.clone()).collect::<Vec<_>>();
                self.ctx.events.emit(
                    MODULE,
                    COMMAND_NEW,
                    json!({ "conversationId": conversation_id, "ids": ids }),
                );
            }
        }
        Ok(CatchUp { chunks, synced_seq })
    }

    pub async fn catch_up(
        &self,
        conversation_id: &str,
        server_max_seq: i64,
    ) -> Result<CatchUp, SyncError> {
        let _running = self.running.lock().await;
        self.ctx
            .db
            .conversation_dao
            .raise_max_seq(conversation_id, server_max_seq)
            .await?;
        self.catch_up_locked(conversation_id, server_max_seq).await
    }

    /// Gap hints from pushed messages, `(conversation_id, seq)`.
    pub async fn catch_up_hints(&self, hints: Vec<(String, i64)>) -> Result<(), SyncError> {
        let mut targets: HashMap<String, i64> = HashMap::new();
        for (conversation_id, seq) in hints {
            let entry = targets.entry(conversation_id).or_insert(seq);
            *entry = (*entry).max(seq);
        }
        let mut first_error = None;
        for (conversation_id, seq) in targets {
            if let Err(err) = self.catch_up(&conversation_id, seq).await {
                error!("catch up {} to {} failed: {:?}", conversation_id, seq, err);
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CheckAndSync for MessageSync {
    fn module(&self) -> &'static str {
        MODULE
    }

    /// Conversations from the diff plus any still lagging locally. A failed
    /// conversation keeps the cursor in place.
    async fn check_and_sync(&self) -> Result<SyncReport, SyncError> {
        let _running = self.running.lock().await;
        let db = &self.ctx.db;
        let before = db
            .sync_cursor_dao
            .get(MODULE)
            .await?
            .map(|c| c.version)
            .unwrap_or_default();
        let diff = self.ctx.client.chat_api.message_versions(before).await?;

        let mut targets: Vec<(String, i64)> = vec![];
        for row in &diff.versions {
            db.conversation_dao.raise_max_seq(&row.id, row.version).await?;
            targets.push((row.id.clone(), row.version));
        }
        for (conversation_id, max_seq) in db.message_dao.lagging_conversations().await? {
            if !targets.iter().any(|(id, _)| *id == conversation_id) {
                targets.push((conversation_id, max_seq));
            }
        }

        let mut applied = vec![];
        let mut first_error = None;
        for (conversation_id, max_seq) in targets {
            match self.catch_up_locked(&conversation_id, max_seq).await {
                Ok(result) if result.chunks > 0 => applied.push(conversation_id),
                Ok(_) => {}
                Err(err) => {
                    warn!("{}: catch up failed: {:?}", conversation_id, err);
                    first_error.get_or_insert(err);
                }
            }
        }
        if let Some(err) = first_error {
            return Err(err);
        }

        let after = db
            .sync_cursor_dao
            .advance(MODULE, diff.server_timestamp, Utc::now().timestamp_millis())
            .await?;
        self.ctx.events.emit_updated("conversation", &applied);
        Ok(SyncReport {
            module: MODULE,
            cursor_before: before,
            cursor_after: after,
            applied,
        })
    }
}
