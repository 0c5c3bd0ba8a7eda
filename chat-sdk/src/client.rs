use std::sync::Arc;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use log::debug;
use reqwest::header::HeaderValue;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::api::VersionDiff;
use crate::{ApiError, ChatApi, ConversationApi, EmojiApi, FriendApi, GroupApi, NotificationApi};

/// Request/response seam between the sync core and the network.
///
/// `endpoint` is a path relative to the api root (`sync/friends`,
/// `chat/sync`, ...). `params` is the JSON body. The returned value is the
/// unwrapped `data` member of the response envelope.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, endpoint: &str, params: Value) -> Result<Value, ApiError>;
}

pub struct Client {
    inner: Arc<ClientRef>,
    pub chat_api: ChatApi,
    pub conversation_api: ConversationApi,
    pub friend_api: FriendApi,
    pub group_api: GroupApi,
    pub emoji_api: EmojiApi,
    pub notification_api: NotificationApi,
}

impl Client {
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self::with_transport(Arc::new(HttpTransport::new(base_url, token)))
    }

    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        let inner = Arc::new(ClientRef { transport });
        Client {
            inner: inner.clone(),
            chat_api: ChatApi::new(inner.clone()),
            conversation_api: ConversationApi::new(inner.clone()),
            friend_api: FriendApi::new(inner.clone()),
            group_api: GroupApi::new(inner.clone()),
            emoji_api: EmojiApi::new(inner.clone()),
            notification_api: NotificationApi::new(inner.clone()),
        }
    }

    pub async fn request<T>(&self, endpoint: &str, params: Value) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        self.inner.post(endpoint, &params).await
    }
}

pub(crate) struct ClientRef {
    transport: Arc<dyn Transport>,
}

impl ClientRef {
    pub(crate) async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: ?Sized + Serialize,
    {
        let params = serde_json::to_value(body)?;
        let data = self.transport.request(path, params).await?;
        Ok(serde_json::from_value(data)
            .with_context(|| format!("failed to parse response of {}", path))?)
    }

    /// `POST <path> {since}` answering `{<field>: [{id, version}], serverTimestamp}`.
    pub(crate) async fn versions(
        &self,
        path: &str,
        field: &str,
        since: i64,
    ) -> Result<VersionDiff, ApiError> {
        let mut data: Value = self.post(path, &json!({ "since": since })).await?;
        let versions = match data.get_mut(field).map(std::mem::take) {
            Some(Value::Null) | None => vec![],
            Some(list) => serde_json::from_value(list)
                .with_context(|| format!("malformed {} in {}", field, path))?,
        };
        let server_timestamp = data
            .get("serverTimestamp")
            .and_then(Value::as_i64)
            .ok_or_else(|| anyhow!("{} response has no serverTimestamp", path))?;
        Ok(VersionDiff {
            versions,
            server_timestamp,
        })
    }

    /// `POST <path> {ids}` answering `{<field>: [record]}`.
    pub(crate) async fn by_ids<T>(
        &self,
        path: &str,
        field: &str,
        ids: &[String],
    ) -> Result<Vec<T>, ApiError>
    where
        T: DeserializeOwned,
    {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let mut data: Value = self.post(path, &json!({ "ids": ids })).await?;
        match data.get_mut(field).map(std::mem::take) {
            Some(Value::Null) | None => Ok(vec![]),
            Some(list) => Ok(serde_json::from_value(list)
                .with_context(|| format!("malformed {} in {}", field, path))?),
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ChatResponse {
    Data(Value),
    Error(crate::Error),
}

pub struct HttpTransport {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        HttpTransport {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, endpoint: &str, params: Value) -> Result<Value, ApiError> {
        let mut request = self
            .client
            .request(Method::POST, format!("{}/{}", self.base_url, endpoint))
            .body(serde_json::to_string(&params)?)
            .build()?;

        let header = request.headers_mut();
        header.append("Content-Type", HeaderValue::from_static("application/json"));
        if let Some(token) = &self.token {
            let auth = HeaderValue::from_bytes(format!("Bearer {}", token).as_bytes());
            match auth {
                Ok(h) => header.append("Authorization", h),
                Err(err) => return Err(anyhow!("can not set auth header: {}", err).into()),
            };
        }

        debug!("request {}", endpoint);
        let resp = self.client.execute(request).await?;
        let status = resp.status();
        let text = resp.bytes().await?;

        match serde_json::from_slice::<ChatResponse>(&text) {
            Ok(ChatResponse::Data(data)) => Ok(data),
            Ok(ChatResponse::Error(err)) => Err(ApiError::Server(err)),
            Err(_) if !status.is_success() => Err(ApiError::Server(crate::Error::new(
                status.as_u16() as i64,
                status.as_u16() as i64,
                String::from_utf8_lossy(&text),
            ))),
            Err(err) => Err(anyhow::Error::from(err)
                .context(format!(
                    "unexpected response: {}",
                    String::from_utf8_lossy(&text)
                ))
                .into()),
        }
    }
}

#[cfg(test)]
pub mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use log::LevelFilter;
    use simplelog::{Config, TestLogger};

    use super::*;

    /// Answers each endpoint with a canned `data` value.
    #[derive(Default)]
    pub struct CannedTransport {
        pub responses: Mutex<HashMap<String, Value>>,
        pub requests: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl Transport for CannedTransport {
        async fn request(&self, endpoint: &str, params: Value) -> Result<Value, ApiError> {
            self.requests
                .lock()
                .unwrap()
                .push((endpoint.to_string(), params));
            self.responses
                .lock()
                .unwrap()
                .get(endpoint)
                .cloned()
                .ok_or_else(|| ApiError::Server(crate::Error::new(404, 404, endpoint)))
        }
    }

    pub fn new_test_client(responses: Vec<(&str, Value)>) -> (Client, Arc<CannedTransport>) {
        let _ = TestLogger::init(LevelFilter::Trace, Config::default());
        let transport = Arc::new(CannedTransport::default());
        {
            let mut map = transport.responses.lock().unwrap();
            for (endpoint, value) in responses {
                map.insert(endpoint.to_string(), value);
            }
        }
        (Client::with_transport(transport.clone()), transport)
    }

    #[tokio::test]
    async fn versions_response_is_unwrapped() {
        let (client, transport) = new_test_client(vec![(
            "sync/friends",
            json!({
                "friendVersions": [{"id": "a", "version": 3}, {"id": 7, "version": 1}],
                "serverTimestamp": 1700
            }),
        )]);
        let diff = client.friend_api.friend_versions(12).await.unwrap();
        assert_eq!(diff.server_timestamp, 1700);
        assert_eq!(diff.versions.len(), 2);
        assert_eq!(diff.versions[1].id, "7");

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests[0].1, json!({"since": 12}));
    }

    #[tokio::test]
    async fn versions_without_timestamp_is_rejected() {
        let (client, _) = new_test_client(vec![("sync/friends", json!({"friendVersions": []}))]);
        assert!(client.friend_api.friend_versions(0).await.is_err());
    }

    #[tokio::test]
    async fn empty_ids_skip_the_network() {
        let (client, transport) = new_test_client(vec![]);
        let friends = client.friend_api.friends_by_ids(&[]).await.unwrap();
        assert!(friends.is_empty());
        assert!(transport.requests.lock().unwrap().is_empty());
    }
}
