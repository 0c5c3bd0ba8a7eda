use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::api::VersionDiff;
use crate::client::ClientRef;
use crate::ApiError;

pub struct NotificationApi {
    client: Arc<ClientRef>,
}

impl NotificationApi {
    pub(crate) fn new(client: Arc<ClientRef>) -> Self {
        NotificationApi { client }
    }
}

/// One entry of the global, event-sourced notification log.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    pub event_id: String,
    pub category: String,
    pub event_type: String,
    #[serde(default)]
    pub payload: Value,
    pub version: i64,
    pub created_at: i64,
}

/// Fan-out of an event into one user's inbox.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationInboxItem {
    pub user_id: String,
    pub event_id: String,
    pub category: String,
    pub version: i64,
    pub created_at: i64,
}

impl NotificationApi {
    pub async fn event_versions(&self, since: i64) -> Result<VersionDiff, ApiError> {
        self.client
            .versions("sync/notificationEvents", "notificationEventVersions", since)
            .await
    }

    pub async fn events_by_ids(&self, ids: &[String]) -> Result<Vec<NotificationEvent>, ApiError> {
        self.client
            .by_ids("notificationEvents/byIds", "notificationEvents", ids)
            .await
    }

    /// Ids are event ids; the server scopes them to the session user.
    pub async fn inbox_versions(&self, since: i64) -> Result<VersionDiff, ApiError> {
        self.client
            .versions("sync/notificationInbox", "notificationInboxVersions", since)
            .await
    }

    pub async fn inbox_by_ids(&self, ids: &[String]) -> Result<Vec<NotificationInboxItem>, ApiError> {
        self.client
            .by_ids("notificationInbox/byIds", "notificationInbox", ids)
            .await
    }

    pub async fn mark_read(&self, category: &str, last_read_at: i64) -> Result<(), ApiError> {
        let _: Value = self
            .client
            .post(
                "notification/read",
                &json!({ "category": category, "lastReadAt": last_read_at }),
            )
            .await?;
        Ok(())
    }
}
