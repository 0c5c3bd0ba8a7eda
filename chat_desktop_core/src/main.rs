use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, LevelFilter};
use simplelog::{ColorChoice, CombinedLogger, Config as LogConfig, TermLogger, TerminalMode};

use chat_desktop_core::config::Config;
use chat_desktop_core::core::model::{JobCategory, JobService, SyncEngine};
use chat_desktop_core::core::push::{FrameSink, PushConnection};
use chat_desktop_core::db::ChatDatabase;
use sdk::Client;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    CombinedLogger::init(vec![TermLogger::new(
        LevelFilter::Info,
        LogConfig::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )])?;

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.json"));
    let config = Config::load(&config_path)?;
    info!("config loaded from {}", config_path.display());

    let db = Arc::new(ChatDatabase::connect(&config.data_dir).await?);
    let client = Arc::new(Client::new(&config.api_base_url, config.auth_token.clone()));
    let engine = Arc::new(SyncEngine::new(db.clone(), client, config.clone()));

    let Some(user_id) = config.user_id.clone() else {
        error!("no user configured, set userId in {}", config_path.display());
        return Ok(());
    };
    engine.login(&user_id);

    let jobs = JobService::new(
        engine.clone(),
        Duration::from_secs(config.auto_sync_interval_secs),
    );
    jobs.trigger(JobCategory::ResendFailed);

    let connection = PushConnection::new(config.push_url.clone(), config.auth_token.clone());
    let sink: Arc<dyn FrameSink> = engine.clone();
    loop {
        tokio::select! {
            result = connection.connect(sink.clone()) => {
                if let Err(err) = result {
                    error!("push connection failed: {:?}", err);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }

    engine.flush().await;
    engine.logout();
    drop(jobs);
    db.close().await;
    Ok(())
}
