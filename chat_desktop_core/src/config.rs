use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Size/time thresholds of one batch queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueConfig {
    pub queue_size_limit: usize,
    pub delay_ms: u64,
}

impl QueueConfig {
    pub const fn new(queue_size_limit: usize, delay_ms: u64) -> Self {
        QueueConfig {
            queue_size_limit,
            delay_ms,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig::new(50, 1000)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub api_base_url: String,
    pub push_url: String,
    pub media_base_url: String,
    pub data_dir: PathBuf,
    pub auth_token: Option<String>,
    pub user_id: Option<String>,
    pub auto_sync_interval_secs: u64,
    /// Raw chat messages from push, before they are persisted.
    pub receiver_queue: QueueConfig,
    /// Resync hints per domain.
    pub hint_queue: QueueConfig,
    /// Conversations whose pushed messages left a gap.
    pub catch_up_queue: QueueConfig,
    pub dedup_capacity: usize,
    pub page_size: usize,
    pub message_chunk_size: i64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_base_url: "http://127.0.0.1:8080/api".to_string(),
            push_url: "ws://127.0.0.1:8080/push".to_string(),
            media_base_url: "http://127.0.0.1:8080/media".to_string(),
            data_dir: PathBuf::from("data"),
            auth_token: None,
            user_id: None,
            auto_sync_interval_secs: 300,
            receiver_queue: QueueConfig::new(50, 100),
            hint_queue: QueueConfig::new(10, 1000),
            catch_up_queue: QueueConfig::new(10, 500),
            dedup_capacity: 1000,
            page_size: sdk::api::BY_IDS_PAGE_SIZE,
            message_chunk_size: sdk::api::chat_api::MAX_SYNC_LIMIT,
        }
    }
}

impl Config {
    /// Reads a JSON config; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config = serde_json::from_str(&json)
            .with_context(|| format!("malformed config {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn media_dir(&self) -> PathBuf {
        self.data_dir.join("media")
    }
}
