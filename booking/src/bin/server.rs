//! Booking Relay Server
//!
//! HTTP front end for the booking coordinator.
//!
//! This binary:
//! - Connects to the Redis pub/sub bus (fatal on failure)
//! - Serves `POST /publishBooking`, `GET /health` and `GET /ready`
//! - Shuts down gracefully on Ctrl+C / SIGTERM, then closes the bus
//!
//! # Usage
//!
//! ```bash
//! # Start Redis
//! docker run -d -p 6379:6379 redis:7
//!
//! # Run server
//! cargo run --bin server
//! ```

use booking_relay::metrics::register_booking_metrics;
use booking_relay::server::{AppState, build_router};
use booking_relay::{BookingCoordinator, Config};
use booking_relay_core::EventBus;
use booking_relay_redis::RedisEventBus;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,booking_relay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Booking Relay Server...");

    // Load configuration
    let config = Config::from_env();
    info!(
        redis = %config.redis.url,
        started_topic = %config.booking.started_topic,
        completed_topic = %config.booking.completed_topic,
        timeout_secs = config.booking.timeout_secs,
        "Configuration loaded"
    );

    register_booking_metrics();

    // Connect event bus
    info!("Connecting to Redis...");
    let event_bus = Arc::new(
        RedisEventBus::builder()
            .url(&config.redis.url)
            .connect_timeout(Duration::from_secs(config.redis.connect_timeout))
            .buffer_size(config.redis.subscription_buffer_size)
            .health_check_interval(Duration::from_secs(config.redis.health_check_interval))
            .connect()
            .await
            .inspect_err(|e| error!(error = %e, "Redis connection failed"))?,
    );
    info!("✓ Redis connected");

    let shared_bus: Arc<dyn EventBus> = event_bus.clone();
    let coordinator = Arc::new(BookingCoordinator::new(
        shared_bus.clone(),
        config.coordinator(),
    ));
    let app = build_router(AppState::new(coordinator, shared_bus));

    // Create TCP listener
    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "Server listening");

    // Run server with graceful shutdown
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
    });

    tokio::select! {
        result = &mut server => {
            event_bus.close();
            return match result {
                Ok(served) => served.map_err(Into::into),
                Err(join_error) => Err(join_error.into()),
            };
        }
        () = shutdown_signal() => {}
    }

    let _ = shutdown_tx.send(());
    let drain = Duration::from_secs(config.server.shutdown_timeout);
    match tokio::time::timeout(drain, &mut server).await {
        Ok(Ok(Ok(()))) => info!("Server stopped"),
        Ok(Ok(Err(e))) => error!(error = %e, "Server error during shutdown"),
        Ok(Err(e)) => error!(error = %e, "Server task failed"),
        Err(_) => {
            warn!(timeout = ?drain, "In-flight requests did not finish in time, aborting");
            server.abort();
        }
    }

    event_bus.close();
    info!(state = %event_bus.state(), "Event bus closed");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
