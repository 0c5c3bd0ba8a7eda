use std::fmt::{Debug, Display, Formatter};

use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("server error: {0}")]
    Server(Error),
    #[error(transparent)]
    Request(#[from] reqwest::Error),
    #[error("failed to serialize json: {0:?}")]
    JsonSerializeError(#[from] serde_json::Error),
    #[error(transparent)]
    Unknown(#[from] anyhow::Error),
}

impl ApiError {
    pub fn code(&self) -> Option<i64> {
        match self {
            ApiError::Server(err) => Some(err.code),
            _ => None,
        }
    }

    /// Timeouts, connection failures and 5xx answers. Everything in this
    /// core treats these the same way: log, keep the cursor, retry later.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Server(err) => err.status >= 500 || err.code == error_code::TOO_MANY_REQUEST,
            ApiError::Request(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            _ => false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Error {
    pub status: i64,
    pub code: i64,
    pub description: String,
}

impl Error {
    pub fn new(status: i64, code: i64, description: impl Into<String>) -> Self {
        Error {
            status,
            code,
            description: description.into(),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Error: status: {}, code: {}, description: {}",
            self.status, self.code, self.description
        )
    }
}

impl std::error::Error for Error {}

pub mod error_code {
    pub const BAD_REQUEST: i64 = 400;
    pub const AUTHENTICATION: i64 = 401;
    pub const FORBIDDEN: i64 = 403;
    pub const NOT_FOUND: i64 = 404;
    pub const TOO_MANY_REQUEST: i64 = 429;
    pub const SERVER: i64 = 500;
    pub const TIME_INACCURATE: i64 = 911;

    pub const BAD_DATA: i64 = 10002;
    pub const OLD_VERSION: i64 = 10006;
    pub const NOT_FRIEND: i64 = 20201;
    pub const BLOCKED: i64 = 20202;
    pub const GROUP_DISMISSED: i64 = 20301;
    pub const NOT_GROUP_MEMBER: i64 = 20302;
    pub const MESSAGE_TOO_LARGE: i64 = 20401;
}
