use anyhow::Context;
use clap::Parser;
use log::info;
use std::sync::Arc;

use quickassist_client::client::cli_client;
use quickassist_client::client::config::ClientConfig;
use quickassist_client::client::models::app_state::App;
use quickassist_client::client::runtime::{RealtimeHub, Runtime};
use quickassist_client::client::services::api_client::{RestGateway, TokenCache};
use quickassist_client::client::services::auth_service::AuthSession;
use quickassist_client::client::services::realtime_client::{ApiAuthorizer, RealtimeConfig};
use quickassist_client::client::services::service_api::QuickAssistApi;
use quickassist_client::client::utils::session_store::{KeyringStore, MemoryStore, TokenPersistence};
use quickassist_client::utils::logger::ClientLogger;

#[derive(Parser, Debug)]
#[command(name = "quickassist", about = "QuickAssist marketplace client")]
struct Args {
    /// Backend base url, overrides QUICKASSIST_API_URL
    #[arg(long)]
    api_url: Option<String>,

    /// Overrides LOG_LEVEL
    #[arg(long)]
    log_level: Option<String>,

    /// Keep the session in memory only
    #[arg(long)]
    no_persist: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    // the logger has to be up before the config logs what it loaded
    let _ = dotenvy::dotenv();
    let level = args
        .log_level
        .clone()
        .or_else(|| std::env::var("LOG_LEVEL").ok())
        .unwrap_or_else(|| "info".to_string());
    ClientLogger::init(&level).context("Failed to initialize logging")?;

    let mut config = ClientConfig::from_env();
    config.log_level = level;
    if let Some(url) = args.api_url {
        config.api_url = url;
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;
    runtime.block_on(run(config, args.no_persist))
}

async fn run(config: ClientConfig, no_persist: bool) -> anyhow::Result<()> {
    let tokens = TokenCache::default();
    let gateway = RestGateway::new(&config.api_url, config.request_timeout, tokens.clone())
        .with_context(|| format!("Cannot use API url '{}'", config.api_url))?;
    let api: Arc<dyn QuickAssistApi> = Arc::new(gateway);

    let store: Arc<dyn TokenPersistence> = if no_persist {
        info!("Session persistence disabled");
        Arc::new(MemoryStore::default())
    } else {
        Arc::new(KeyringStore::new(config.fallback_file()))
    };
    let session = AuthSession::new(api.clone(), tokens, store);

    let realtime_config = config.pusher_key.clone().map(|app_key| RealtimeConfig {
        app_key,
        cluster: config.pusher_cluster.clone(),
        host: config.pusher_host.clone(),
    });
    let hub = RealtimeHub::new(realtime_config, Arc::new(ApiAuthorizer(api.clone())));

    let app = App::new(Runtime::new(api, session, hub), config.poll_interval);
    cli_client::run(app).await
}
