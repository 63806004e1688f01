//! Tipscout HTTP service entry point.

use anyhow::Context as _;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "tipscout")]
#[command(about = "Collects and classifies betting tips from Telegram channels")]
struct Cli {
    /// Address to listen on (overrides TIPSCOUT_BIND)
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.debug {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = tipscout::config::Config::load()
        .with_context(|| "failed to load configuration from environment")?;
    if let Some(bind) = cli.bind {
        config.bind = bind;
    }

    tracing::info!(
        bind = %config.bind,
        model = %config.llm.model,
        batch_size = config.collector.batch_size,
        max_messages = config.collector.max_messages,
        "configuration loaded"
    );

    let connector = tipscout::messaging::TelegramGateway::new(config.telegram.clone())
        .with_context(|| "failed to initialize messaging gateway client")?;
    let llm_manager = Arc::new(
        tipscout::llm::LlmManager::new(config.llm.clone())
            .with_context(|| "failed to initialize LLM manager")?,
    );
    let classifier = tipscout::llm::LlmClassifier::new(llm_manager);
    let media_store = tipscout::storage::MediaUploader::new(config.storage.clone())
        .with_context(|| "failed to initialize media uploader")?;

    let state = Arc::new(tipscout::api::ApiState::new(
        config.service_api_key.clone(),
        Arc::new(connector),
        Arc::new(classifier),
        Arc::new(media_store),
        config.collector,
    ));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let server = tipscout::api::start_http_server(config.bind, state, shutdown_rx).await?;

    tokio::signal::ctrl_c()
        .await
        .with_context(|| "failed to listen for shutdown signal")?;
    tracing::info!("shutting down");
    shutdown_tx.send(true).ok();
    server.await.ok();

    Ok(())
}
