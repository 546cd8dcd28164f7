//! Main Entrypoint for the Telegram relay
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Wiring the session store, agent client, Telegram client and scheduler.
//! 3. Starting the polling loop and the health endpoint.
//! 4. Shutting down gracefully, letting in-flight exchanges finish.

use anyhow::Context;
use convai_realtime::WsConnector;
use relay_bridge::{
    agent::{AgentClient, SessionSettings},
    config::Config,
    dispatch::{ChatScheduler, UpdateDispatcher},
    poll::PollLoop,
    router::create_router,
    telegram::TelegramClient,
};
use relay_core::{ChatPlatform, MemorySessionStore, SessionStore};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

/// Listens for `Ctrl+C` or `SIGTERM` to gracefully shut down the server.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C. Shutting down gracefully..."),
        _ = terminate => info!("Received SIGTERM. Shutting down gracefully..."),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context(
        "Failed to load configuration. Copy .env.example to .env and fill required values",
    )?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing relay...");

    // --- 3. Initialize Shared Services ---
    let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
    let connector = WsConnector::new(
        &config.agent_endpoint,
        &config.agent_id,
        config.agent_api_key,
    )
    .context("Failed to configure agent connection")?;
    let settings = SessionSettings::new(config.request_timeout, config.agent_originator.clone());
    let agent = AgentClient::new(Arc::new(connector), store, settings);

    let platform: Arc<dyn ChatPlatform> = Arc::new(TelegramClient::new(
        config.telegram_api_base.clone(),
        config.telegram_bot_token,
        config.request_timeout,
    ));
    let dispatcher = Arc::new(UpdateDispatcher::new(agent, platform.clone()));
    let scheduler = ChatScheduler::new(dispatcher, config.max_concurrent_sessions);

    // --- 4. Start Polling ---
    let poller = tokio::spawn(PollLoop::new(platform, scheduler.clone()).run());

    // --- 5. Start Server ---
    info!(
        agent_id = %config.agent_id,
        originator = %config.agent_originator,
        timeout_ms = config.request_timeout.as_millis() as u64,
        max_concurrent_sessions = config.max_concurrent_sessions.get(),
        bind_address = %config.bind_address,
        "Relay configured. Starting health endpoint..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;
    axum::serve(listener, create_router())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // --- 6. Drain ---
    poller.abort();
    if tokio::time::timeout(config.request_timeout, scheduler.wait_idle())
        .await
        .is_err()
    {
        warn!(
            busy_chats = scheduler.busy_chats(),
            "Shutting down with agent exchanges still in flight."
        );
    }

    info!("Relay has shut down.");
    Ok(())
}
