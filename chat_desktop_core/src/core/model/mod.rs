use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use log::{error, info, warn};
use sdk::{Client, PushFrame};
use serde_json::json;

use crate::config::Config;
use crate::core::media::{HttpDownloader, MediaCache};
use crate::core::push::{FrameSink, PushRouter};
use crate::core::sync::{Businesses, Session, SyncContext, SyncModules, SyncReport};
use crate::core::{EventBus, SyncError};
use crate::db::ChatDatabase;

pub use job::{JobCategory, JobService};
pub use message::MessageService;
pub use notification::NotificationService;

pub mod job;
pub mod message;
pub mod notification;

/// Wires the store, the remote api and every module together. One engine
/// per process; user scoped state lives between `login` and `logout`.
pub struct SyncEngine {
    ctx: SyncContext,
    config: Config,
    modules: SyncModules,
    router: Mutex<Option<Arc<PushRouter>>>,
    syncing: tokio::sync::Mutex<()>,
    pub message: MessageService,
    pub notification: Arc<NotificationService>,
    pub media: Arc<MediaCache>,
}

impl SyncEngine {
    pub fn new(db: Arc<ChatDatabase>, client: Arc<Client>, config: Config) -> Self {
        let media = Arc::new(MediaCache::new(
            db.clone(),
            Arc::new(HttpDownloader::default()),
            config.media_dir(),
            config.media_base_url.clone(),
        ));
        let ctx = SyncContext {
            db,
            client,
            events: Arc::new(EventBus::default()),
            session: Arc::new(Session::default()),
            page_size: config.page_size,
        };
        SyncEngine {
            modules: SyncModules::new(ctx.clone(), config.message_chunk_size),
            message: MessageService::new(ctx.clone()),
            notification: Arc::new(NotificationService::new(ctx.clone())),
            media,
            router: Mutex::new(None),
            syncing: tokio::sync::Mutex::new(()),
            config,
            ctx,
        }
    }

    pub fn events(&self) -> Arc<EventBus> {
        self.ctx.events.clone()
    }

    pub fn modules(&self) -> &SyncModules {
        &self.modules
    }

    pub fn is_logged_in(&self) -> bool {
        self.ctx.session.is_logged_in()
    }

    pub fn user_id(&self) -> Result<String, SyncError> {
        self.ctx.session.user_id()
    }

    /// Starts the user scoped queues. Logging in again replaces them.
    pub fn login(&self, user_id: &str) {
        self.ctx.session.set(Some(user_id.to_string()));
        let businesses = Arc::new(Businesses::new(&self.modules, &self.config));
        let router = Arc::new(PushRouter::new(
            self.ctx.clone(),
            businesses,
            self.notification.clone(),
            &self.config,
        ));
        if let Some(old) = self.router.lock().unwrap().replace(router) {
            old.destroy();
        }
        info!("logged in as {}", user_id);
    }

    /// Cancels every queue timer and drops whatever was still queued.
    pub fn logout(&self) {
        if let Some(router) = self.router.lock().unwrap().take() {
            router.destroy();
        }
        self.ctx.session.set(None);
        info!("logged out");
    }

    fn router(&self) -> Option<Arc<PushRouter>> {
        self.router.lock().unwrap().clone()
    }

    /// Full resync of every module in order. Push frames arriving meanwhile
    /// are held and replayed afterwards. A failing module is logged and the
    /// others still run.
    pub async fn auto_sync(&self) -> Result<Vec<SyncReport>, SyncError> {
        self.ctx.session.user_id()?;
        let _syncing = self.syncing.lock().await;
        let router = self.router().ok_or(SyncError::Destroyed)?;
        router.pause();

        let mut reports = vec![];
        let mut failed = vec![];
        let mut retrying = vec![];
        for module in self.modules.ordered() {
            match module.check_and_sync().await {
                Ok(report) => reports.push(report),
                Err(err) if err.is_transient() => {
                    warn!("{} sync interrupted, next pass retries: {:?}", module.module(), err);
                    failed.push(module.module());
                    retrying.push(module.module());
                }
                Err(err) => {
                    error!("{} sync failed: {:?}", module.module(), err);
                    failed.push(module.module());
                }
            }
        }

        router.resume().await;
        info!(
            "auto sync done, {} modules synced, {} failed",
            reports.len(),
            failed.len()
        );
        self.ctx
            .events
            .emit(
                "sync",
                "auto_sync_done",
                json!({ "failed": failed, "retrying": retrying }),
            );
        Ok(reports)
    }

    pub async fn on_frame(&self, frame: PushFrame) {
        match self.router() {
            Some(router) => router.on_frame(frame).await,
            None => warn!("no user, drop push frame {}", frame.command),
        }
    }

    /// Waits for every queued push to be processed.
    pub async fn flush(&self) {
        if let Some(router) = self.router() {
            router.flush().await;
        }
    }
}

#[async_trait]
impl FrameSink for SyncEngine {
    async fn on_connected(&self) {
        if !self.is_logged_in() {
            return;
        }
        if let Err(err) = self.auto_sync().await {
            error!("auto sync after connect failed: {:?}", err);
        }
    }

    async fn on_frame(&self, frame: PushFrame) {
        SyncEngine::on_frame(self, frame).await
    }
}
