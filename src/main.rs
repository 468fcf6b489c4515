use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use regibot::channels::{Channel, CliChannel, TelegramChannel};
use regibot::config::{BotConfig, ChannelKind};
use regibot::registration::{Dispatcher, SessionTable};
use regibot::store::{LibSqlBackend, RegistrationStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    // A missing .env file is fine; real environment variables still apply.
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = BotConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export BOT_TOKEN=123456:ABC-...");
        std::process::exit(1);
    });

    eprintln!("📋 Regibot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Channel: {}", config.channel);
    eprintln!("   Database: {}", config.db_path.display());

    // ── Database ─────────────────────────────────────────────────────────
    let store: Arc<dyn RegistrationStore> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?,
    );
    let registered = store.count_users().await.unwrap_or_default();
    eprintln!("   Registered participants: {registered}\n");

    // ── Channel ──────────────────────────────────────────────────────────
    let channel: Arc<dyn Channel> = match config.channel {
        ChannelKind::Telegram => {
            let token = config
                .bot_token
                .clone()
                .context("BOT_TOKEN is required for the telegram channel")?;
            let telegram = TelegramChannel::new(token, config.poll_timeout, config.send_timeout);
            let username = telegram.get_me().await?;
            tracing::info!("Bot @{username} is started");
            Arc::new(telegram)
        }
        ChannelKind::Cli => Arc::new(CliChannel::new()),
    };

    if let Err(e) = channel.health_check().await {
        tracing::warn!(channel = channel.name(), "Health check failed: {e}");
    }
    let stream = channel.start().await?;

    // ── Shutdown signal ──────────────────────────────────────────────────
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Received Ctrl+C");
                    shutdown.cancel();
                }
                Err(e) => tracing::warn!("Cannot listen for Ctrl+C: {e}"),
            }
        });
    }

    // ── Dispatcher ───────────────────────────────────────────────────────
    let dispatcher = Dispatcher::new(
        Arc::clone(&channel),
        store,
        Arc::new(SessionTable::new()),
        config.store_timeout,
    );
    dispatcher.run(stream, shutdown).await;

    dispatcher.drain(config.shutdown_grace).await;
    if let Err(e) = channel.shutdown().await {
        tracing::warn!(channel = channel.name(), "Channel shutdown failed: {e}");
    }
    tracing::info!("Bot stopped");

    Ok(())
}
