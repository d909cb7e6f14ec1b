//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{BlobStore, DbAdapter, LogMailer, SmtpMailer},
    config::{Config, ConfigError},
    error::ApiError,
    maintenance::{spawn_otp_sweeper, OTP_SWEEP_INTERVAL},
    web::{self, rest::ApiDoc, state::AppState},
};
use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use axum::Router;
use chat_core::ports::OtpMailer;
use chat_core::MessageCipher;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!(?config, "Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    // An empty ENCRYPTION_KEY is a startup error.
    let cipher = MessageCipher::new(&config.encryption_key)?;

    let mailer: Arc<dyn OtpMailer> = match &config.smtp {
        Some(smtp) => {
            let mailer = SmtpMailer::new(smtp)
                .map_err(|e| ApiError::Internal(format!("SMTP setup failed: {}", e)))?;
            Arc::new(mailer)
        }
        None => {
            warn!("SMTP_HOST not set; one-time passcodes will only be logged");
            Arc::new(LogMailer)
        }
    };

    let blobs = BlobStore::new(config.uploads_dir.clone()).await?;

    let cors_origin = config.cors_origin.parse::<HeaderValue>().map_err(|_| {
        ConfigError::InvalidValue(
            "CORS_ORIGIN".to_string(),
            format!("'{}' is not a valid origin", config.cors_origin),
        )
    })?;
    let bind_address = config.bind_address;

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState::new(config, db_adapter, mailer, cipher, blobs));

    // --- 5. Start Background Maintenance ---
    let shutdown = CancellationToken::new();
    let sweeper = spawn_otp_sweeper(
        app_state.accounts.clone(),
        OTP_SWEEP_INTERVAL,
        shutdown.clone(),
    );

    // --- 6. Create the Web Router ---
    let cors = CorsLayer::new()
        .allow_origin(cors_origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(web::router(app_state).layer(cors))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 7. Start the Server ---
    info!("Starting server on {}", bind_address);
    info!("Swagger UI available at http://{}/swagger-ui", bind_address);
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        error!("OTP sweeper ended abnormally: {}", e);
    }
    info!("Server stopped.");
    Ok(())
}

/// Resolves on Ctrl+C and cancels background tasks.
async fn shutdown_signal(token: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
    token.cancel();
}
