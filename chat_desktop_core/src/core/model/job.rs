use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use log::{debug, error, info};
use strum_macros::Display;
use tokio::sync::mpsc::{channel, Receiver, Sender};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_stream::wrappers::ReceiverStream;

use crate::core::model::SyncEngine;

const RESEND_INTERVAL: Duration = Duration::from_secs(42);

/// Periodic background work of a logged in engine. Each job also runs when
/// triggered.
pub struct JobService {
    signals: HashMap<JobCategory, Sender<()>>,
    handle: JoinHandle<()>,
}

impl Drop for JobService {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl JobService {
    pub fn new(engine: Arc<SyncEngine>, auto_sync_interval: Duration) -> Self {
        let (auto_sync_sender, auto_sync_receiver) = channel(1);
        let (resend_sender, resend_receiver) = channel(1);

        let handle = tokio::spawn(async move {
            tokio::join!(
                run_job(
                    auto_sync_receiver,
                    auto_sync_interval,
                    AutoSyncJob {
                        engine: engine.clone(),
                    },
                ),
                run_job(
                    resend_receiver,
                    RESEND_INTERVAL,
                    ResendFailedJob { engine },
                )
            );
        });

        JobService {
            signals: HashMap::from([
                (JobCategory::AutoSync, auto_sync_sender),
                (JobCategory::ResendFailed, resend_sender),
            ]),
            handle,
        }
    }

    /// Runs the job soon. A trigger while one is already pending is merged.
    pub fn trigger(&self, category: JobCategory) {
        if let Some(signal) = self.signals.get(&category) {
            let _ = signal.try_send(());
        }
    }
}

#[derive(Debug, Display, Clone, Copy, Eq, PartialEq, Hash)]
pub enum JobCategory {
    AutoSync,
    ResendFailed,
}

async fn run_job(receiver: Receiver<()>, period: Duration, trigger: impl JobTrigger) {
    let mut stream = ReceiverStream::new(receiver);
    let mut interval = interval(period);
    interval.tick().await;
    loop {
        tokio::select! {
           msg = stream.next() => {
                if msg.is_none() {
                    error!("{} job receiver closed", trigger.category());
                    break;
                }
            }
            _ = interval.tick() => {
                debug!("{} job interval", trigger.category());
            }
        }
        if let Err(err) = trigger.trigger().await {
            error!("failed to trigger job {}: {:?}", trigger.category(), err);
        }
    }
}

#[async_trait]
trait JobTrigger: Send + Sync {
    async fn trigger(&self) -> Result<()>;
    fn category(&self) -> JobCategory;
}

struct AutoSyncJob {
    engine: Arc<SyncEngine>,
}

struct ResendFailedJob {
    engine: Arc<SyncEngine>,
}

#[async_trait]
impl JobTrigger for AutoSyncJob {
    async fn trigger(&self) -> Result<()> {
        if !self.engine.is_logged_in() {
            return Ok(());
        }
        let reports = self.engine.auto_sync().await?;
        let applied: usize = reports.iter().map(|r| r.applied.len()).sum();
        info!("auto sync job applied {} rows", applied);
        Ok(())
    }

    fn category(&self) -> JobCategory {
        JobCategory::AutoSync
    }
}

#[async_trait]
impl JobTrigger for ResendFailedJob {
    async fn trigger(&self) -> Result<()> {
        if !self.engine.is_logged_in() {
            return Ok(());
        }
        self.engine.message.resend_failed().await?;
        Ok(())
    }

    fn category(&self) -> JobCategory {
        JobCategory::ResendFailed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::tests::new_test_context;

    #[tokio::test]
    async fn trigger_runs_auto_sync() {
        let (ctx, server) = new_test_context().await;
        let config = Config {
            data_dir: std::env::temp_dir().join("chat-job-test"),
            ..Config::default()
        };
        let engine = Arc::new(SyncEngine::new(ctx.db.clone(), ctx.client.clone(), config));
        engine.login("me");
        let mut done = engine.events().subscribe("sync", "auto_sync_done");

        let jobs = JobService::new(engine.clone(), Duration::from_secs(3600));
        jobs.trigger(JobCategory::AutoSync);
        done.recv().await.unwrap();
        assert_eq!(server.requests_to("sync/friends").len(), 1);
    }
}
