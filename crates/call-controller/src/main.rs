//! Call Controller stream monitor
//!
//! Operator tool that watches peers over the Redis pub/sub transport.
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize Prometheus metrics recorder
//! 3. Validate the ICE provider settings
//! 4. Connect to Redis
//! 5. For every number in `CALL_WATCH`: report presence and subscribe to its
//!    stream channel
//! 6. Log stream messages and presence until SIGINT/SIGTERM
//!
//! The monitor never dials, so it needs no call transport.

#![warn(clippy::pedantic)]

use call_controller::config::Config;
use call_controller::ice::provider_from_config;
use call_controller::observability::init_metrics_recorder;
use call_controller::presence;
use call_controller::protocol::stream_channel;
use call_controller::redis::RedisPubSub;
use call_controller::transport::{ChannelEvent, PubSub};
use common::secret::{redact_url, ExposeSecret};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Buffer for events from watched channels.
const WATCH_EVENT_BUFFER: usize = 256;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "call_controller=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Call Controller stream monitor");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        local_number = %config.local_number,
        mode = %config.mode,
        watch = ?config.watch,
        ice_service = config.ice_provider.is_some(),
        static_ice_servers = config.static_ice_servers.len(),
        "Configuration loaded successfully"
    );

    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;

    provider_from_config(&config).map_err(|e| {
        error!(error = %e, "Invalid ICE provider configuration");
        e
    })?;

    info!(
        redis_url = %redact_url(config.redis_url.expose_secret()),
        "Connecting to Redis..."
    );
    let pubsub = RedisPubSub::connect(
        config.redis_url.expose_secret(),
        config.local_number.clone(),
    )
    .await
    .map_err(|e| {
        error!(error = %e, "Failed to connect to Redis");
        e
    })?;
    info!("Redis connection established");

    if config.watch.is_empty() {
        warn!("CALL_WATCH is empty, nothing to monitor");
    }

    let (events_tx, mut events_rx) = mpsc::channel(WATCH_EVENT_BUFFER);
    let mut watched = Vec::with_capacity(config.watch.len());

    for number in &config.watch {
        let online = presence::is_online(&pubsub, number).await;
        let streaming = presence::is_streaming(&pubsub, number).await;
        info!(number = %number, online, streaming, "Peer presence");

        let channel = stream_channel(number);
        match pubsub.subscribe(&channel, events_tx.clone()).await {
            Ok(()) => watched.push(channel),
            Err(e) => warn!(channel = %channel, error = %e, "Failed to watch stream channel"),
        }
    }

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
            Some(event) = events_rx.recv() => log_event(&event),
        }
    }

    for channel in &watched {
        if let Err(e) = pubsub.unsubscribe(channel).await {
            warn!(channel = %channel, error = %e, "Failed to leave stream channel");
        }
    }

    debug!(metrics = %prometheus_handle.render(), "Final metrics");
    info!("Call Controller stream monitor stopped");
    Ok(())
}

fn log_event(event: &ChannelEvent) {
    match event {
        ChannelEvent::Connected { channel } => {
            info!(channel = %channel, "Watching stream channel");
        }
        ChannelEvent::Message { channel, payload } => {
            info!(channel = %channel, payload = %payload, "Stream message");
        }
        ChannelEvent::Presence { channel, event } => {
            info!(
                channel = %channel,
                action = ?event.action,
                uuid = %event.uuid,
                occupancy = event.occupancy,
                "Stream presence"
            );
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
