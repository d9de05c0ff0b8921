//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, FlutterwaveAdapter},
    config::Config,
    error::ApiError,
    jobs::{spawn_expiry_sweeper, spawn_session_purge},
    web::{build_router, rest::ApiDoc, state::AppState},
};
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize the Payment Provider ---
    if config.payment_secret_key.is_none() {
        warn!("FLUTTERWAVE_SECRET_KEY is not set; payment calls will fail");
    }
    let payments = Arc::new(FlutterwaveAdapter::new(
        &config.payment_api_base,
        config.payment_secret_key.clone(),
        config.payment_timeout,
    )?);

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState::new(
        db_adapter.clone(),
        payments,
        config.clone(),
    ));

    // --- 5. Start Background Jobs ---
    let shutdown = CancellationToken::new();
    let sweeper = spawn_expiry_sweeper(
        db_adapter.clone(),
        config.expiry_sweep_interval,
        shutdown.clone(),
    );
    let purger = spawn_session_purge(
        db_adapter.clone(),
        config.session_purge_interval,
        shutdown.clone(),
    );

    // --- 6. Create the Web Router ---
    let app = Router::new()
        .merge(build_router(app_state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 7. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    let signal = shutdown.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
        }
        info!("Shutdown signal received");
        signal.cancel();
    })
    .await?;

    // --- 8. Wait for Background Jobs ---
    shutdown.cancel();
    let _ = tokio::join!(sweeper, purger);
    info!("Server stopped");

    Ok(())
}
