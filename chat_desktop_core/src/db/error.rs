#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("db error: {0}")]
    DbError(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("json column error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown error: {0:?}")]
    Other(#[from] anyhow::Error),
}
