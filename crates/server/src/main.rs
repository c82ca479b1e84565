//! Pollroom server entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::http::HeaderValue;
use pollroom_api::{AppState, StreamingHub, app};
use pollroom_common::{Config, config::ServerConfig};
use pollroom_core::{
    ChatService, EventPublisherService, PollScheduler, PollService, RoomService,
    SchedulerSettings, TokenService, UserService,
};
use pollroom_db::repositories::{
    MessageRepository, PollRepository, RoomRepository, UserRepository,
};
use tokio::signal;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
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
            Ok(mut sig) => {
                sig.recv().await;
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
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

/// CORS policy from config. No configured origins means any origin.
fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = server
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(origins))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pollroom=debug,tower_http=debug".into()),
        )
        .init();

    info!("Starting pollroom server...");

    // Load configuration
    let config = Config::load().context("loading configuration")?;

    // Connect to database
    let db = pollroom_db::init(&config)
        .await
        .context("connecting to database")?;
    info!("Connected to database");

    // Run migrations
    info!("Running database migrations...");
    pollroom_db::migrate(&db).await.context("running migrations")?;
    info!("Migrations completed");

    let db = Arc::new(db);

    // Initialize repositories
    let user_repo = UserRepository::new(Arc::clone(&db));
    let room_repo = RoomRepository::new(Arc::clone(&db));
    let message_repo = MessageRepository::new(Arc::clone(&db));
    let poll_repo = PollRepository::new(Arc::clone(&db));

    // The hub is the one publisher every service pushes events through
    let hub = StreamingHub::new();
    let publisher: EventPublisherService = Arc::new(hub.clone());

    // Initialize services
    let tokens = TokenService::from_config(&config.auth);
    let user_service = UserService::new(user_repo.clone(), tokens.clone());
    let room_service = RoomService::new(
        room_repo.clone(),
        user_repo.clone(),
        poll_repo.clone(),
        publisher.clone(),
    );
    let chat_service = ChatService::new(
        message_repo,
        user_repo,
        room_repo.clone(),
        publisher.clone(),
    );
    let poll_service = PollService::new(poll_repo, room_repo, publisher);

    // Start the poll expiration scheduler
    let scheduler = PollScheduler::new(
        poll_service.clone(),
        SchedulerSettings::from(&config.scheduler),
    );
    tokio::spawn(scheduler.run());

    let state = AppState {
        tokens,
        user_service,
        room_service,
        chat_service,
        poll_service,
        hub,
    };

    let app = app(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.server));

    // Start server with graceful shutdown
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("invalid listen address {}", config.server.host))?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}
