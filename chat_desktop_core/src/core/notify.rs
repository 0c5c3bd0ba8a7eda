use std::collections::HashMap;
use std::sync::Mutex;

use log::trace;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

pub const COMMAND_UPDATED: &str = "updated";
pub const COMMAND_NEW: &str = "new";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeEvent {
    pub module: String,
    pub command: String,
    pub data: Value,
}

/// Publish/subscribe surface towards the presentation layer, keyed by
/// `(module, command)`. Emitting with no subscriber is not an error.
pub struct EventBus {
    all: broadcast::Sender<ChangeEvent>,
    topics: Mutex<HashMap<(String, String), broadcast::Sender<ChangeEvent>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        let (all, _) = broadcast::channel(CHANNEL_CAPACITY);
        EventBus {
            all,
            topics: Mutex::new(HashMap::new()),
        }
    }
}

impl EventBus {
    pub fn subscribe(&self, module: &str, command: &str) -> broadcast::Receiver<ChangeEvent> {
        let mut topics = self.topics.lock().unwrap();
        topics
            .entry((module.to_string(), command.to_string()))
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    pub fn subscribe_all(&self) -> broadcast::Receiver<ChangeEvent> {
        self.all.subscribe()
    }

    pub fn emit(&self, module: &str, command: &str, data: Value) {
        let event = ChangeEvent {
            module: module.to_string(),
            command: command.to_string(),
            data,
        };
        trace!("emit {}/{}", module, command);
        {
            let topics = self.topics.lock().unwrap();
            if let Some(sender) = topics.get(&(event.module.clone(), event.command.clone())) {
                let _ = sender.send(event.clone());
            }
        }
        let _ = self.all.send(event);
    }

    /// `(module, "updated", {ids})` after a successful apply.
    pub fn emit_updated(&self, module: &str, ids: &[String]) {
        if ids.is_empty() {
            return;
        }
        self.emit(module, COMMAND_UPDATED, json!({ "ids": ids }));
    }
}
