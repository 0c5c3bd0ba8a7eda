use sdk::ApiError;

pub use media::MediaCache;
pub use notify::{ChangeEvent, EventBus};
pub use queue::BatchQueue;

pub mod media;
pub mod model;
pub mod notify;
pub mod push;
pub mod queue;
pub mod sync;

#[derive(thiserror::Error, Debug)]
pub enum SyncError {
    #[error("user not logged in")]
    NotLoggedIn,
    #[error("engine destroyed")]
    Destroyed,
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Db(#[from] crate::db::Error),
    #[error("content hash mismatch, expected {expected}, actual {actual}")]
    Integrity { expected: String, actual: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SyncError {
    /// Failures a later pass may heal by itself.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Api(err) => err.is_transient(),
            SyncError::Io(_) => true,
            _ => false,
        }
    }
}
