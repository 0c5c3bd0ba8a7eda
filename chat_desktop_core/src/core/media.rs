use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use log::{error, info, warn};
use strum_macros::{AsRefStr, Display, EnumString};
use tokio::fs;
use tokio::io::AsyncReadExt;

use crate::core::SyncError;
use crate::db::ChatDatabase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum MediaType {
    Image,
    Video,
    File,
    Voice,
    Emoji,
    Avatar,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    Local(PathBuf),
    Remote(String),
}

/// Fetches `url` into `dest`, returning the number of bytes written.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, SyncError>;
}

#[derive(Default)]
pub struct HttpDownloader {
    client: reqwest::Client,
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, SyncError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(sdk::ApiError::from)?;
        let bytes = response.bytes().await.map_err(sdk::ApiError::from)?;
        fs::write(dest, &bytes).await?;
        Ok(bytes.len() as u64)
    }
}

/// The md5 hex prefix of a `<md5>.<ext>` file key.
pub fn expected_hash(file_key: &str) -> Option<String> {
    let stem = file_key.split('.').next()?;
    if stem.len() == 32 && stem.bytes().all(|b| b.is_ascii_hexdigit()) {
        Some(stem.to_ascii_lowercase())
    } else {
        None
    }
}

const HASH_BUFFER: usize = 64 * 1024;

async fn hash_file(path: &Path) -> Result<String, SyncError> {
    let mut file = fs::File::open(path).await?;
    let mut ctx = md5::Context::new();
    let mut buf = vec![0u8; HASH_BUFFER];
    loop {
        let read = file.read(&mut buf).await?;
        if read == 0 {
            break;
        }
        ctx.consume(&buf[..read]);
    }
    Ok(hex::encode(ctx.compute().0))
}

/// Removes a file, treating "already gone" as success.
async fn remove_file(path: &Path) -> Result<(), SyncError> {
    match fs::remove_file(path).await {
        Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(err.into()),
        _ => Ok(()),
    }
}

/// Content addressed cache of downloaded attachments.
///
/// A file only ever becomes visible through [`MediaCache::get`] after its md5
/// matched the hash its key names. Concurrent requests for one key share a
/// single download.
pub struct MediaCache {
    db: Arc<ChatDatabase>,
    downloader: Arc<dyn Downloader>,
    root: PathBuf,
    base_url: String,
    cached: Mutex<HashMap<String, PathBuf>>,
    in_flight: Mutex<HashSet<String>>,
}

struct InFlight<'a> {
    set: &'a Mutex<HashSet<String>>,
    key: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.lock().unwrap().remove(&self.key);
    }
}

impl MediaCache {
    pub fn new(
        db: Arc<ChatDatabase>,
        downloader: Arc<dyn Downloader>,
        root: PathBuf,
        base_url: impl Into<String>,
    ) -> Self {
        MediaCache {
            db,
            downloader,
            root,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cached: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn remote_url(&self, media_type: MediaType, file_key: &str) -> String {
        format!("{}/{}/{}", self.base_url, media_type, file_key)
    }

    pub fn cache_path(&self, media_type: MediaType, file_key: &str) -> PathBuf {
        self.root.join(media_type.to_string()).join(file_key)
    }

    /// The local file when cached and still on disk, otherwise the remote
    /// url while a background download fills the cache.
    pub async fn get(
        self: &Arc<Self>,
        media_type: MediaType,
        file_key: &str,
    ) -> Result<MediaSource, SyncError> {
        let remembered = self.cached.lock().unwrap().get(file_key).cloned();
        if let Some(path) = remembered {
            if fs::try_exists(&path).await? {
                return Ok(MediaSource::Local(path));
            }
            warn!("{}: cached file vanished from {}", file_key, path.display());
            self.cached.lock().unwrap().remove(file_key);
        }
        if let Some(entry) = self.db.media_cache_dao.find(file_key).await? {
            let path = PathBuf::from(entry.path);
            if fs::try_exists(&path).await? {
                self.cached
                    .lock()
                    .unwrap()
                    .insert(file_key.to_string(), path.clone());
                return Ok(MediaSource::Local(path));
            }
        }
        let cache = self.clone();
        let key = file_key.to_string();
        tokio::spawn(async move {
            if let Err(err) = cache.add(media_type, &key).await {
                error!("failed to cache {}: {:?}", key, err);
            }
        });
        Ok(MediaSource::Remote(self.remote_url(media_type, file_key)))
    }

    /// Downloads and verifies `file_key`. Returns the remote url when another
    /// task is already on it or when the content cannot be verified.
    pub async fn add(&self, media_type: MediaType, file_key: &str) -> Result<MediaSource, SyncError> {
        let remote = MediaSource::Remote(self.remote_url(media_type, file_key));
        let Some(expected) = expected_hash(file_key) else {
            warn!("{} is not content addressed, not caching", file_key);
            return Ok(remote);
        };
        if !self.in_flight.lock().unwrap().insert(file_key.to_string()) {
            return Ok(remote);
        }
        let _in_flight = InFlight {
            set: &self.in_flight,
            key: file_key.to_string(),
        };

        let path = self.cache_path(media_type, file_key);
        if fs::try_exists(&path).await? {
            let actual = hash_file(&path).await?;
            if actual == expected {
                return self.record(media_type, file_key, path).await;
            }
            warn!(
                "{}: cached file hash {} does not match, downloading again",
                file_key, actual
            );
            remove_file(&path).await?;
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let url = self.remote_url(media_type, file_key);
        self.downloader.download(&url, &path).await?;
        let actual = hash_file(&path).await?;
        if actual != expected {
            let err = SyncError::Integrity { expected, actual };
            error!("{}: discard download: {}", file_key, err);
            remove_file(&path).await?;
            return Ok(remote);
        }
        info!("cached {}", file_key);
        self.record(media_type, file_key, path).await
    }

    async fn record(
        &self,
        media_type: MediaType,
        file_key: &str,
        path: PathBuf,
    ) -> Result<MediaSource, SyncError> {
        let size = fs::metadata(&path).await?.len() as i64;
        self.db
            .media_cache_dao
            .upsert(file_key, &path.to_string_lossy(), media_type.as_ref(), size)
            .await?;
        self.cached
            .lock()
            .unwrap()
            .insert(file_key.to_string(), path.clone());
        Ok(MediaSource::Local(path))
    }

    /// Deletes the file and marks its entry deleted.
    pub async fn remove(&self, file_key: &str) -> Result<(), SyncError> {
        let cached = self.cached.lock().unwrap().remove(file_key);
        let path = match cached {
            Some(path) => Some(path),
            None => self
                .db
                .media_cache_dao
                .find(file_key)
                .await?
                .map(|e| PathBuf::from(e.path)),
        };
        if let Some(path) = path {
            remove_file(&path).await?;
        }
        self.db.media_cache_dao.mark_deleted(file_key).await?;
        Ok(())
    }
}
