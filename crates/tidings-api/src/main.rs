//! Tidings API server entry point.

use sqlx::postgres::PgPoolOptions;
use tidings_api::config::AppConfig;
use tidings_api::error::AppError;
use tidings_api::state::AppState;
use tidings_api::{app, telemetry};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = AppConfig::from_env()?;
    let telemetry = telemetry::init(config.otlp_endpoint.as_deref())?;

    tracing::info!(
        exporting_spans = telemetry.exporting(),
        official_account_configured = config.feed.official_account_id.is_some(),
        "Starting Tidings API server"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;
    if config.run_migrations {
        tidings_store::run_migrations(&pool).await?;
        tracing::info!("Migrations applied");
    }

    let app = app(AppState::from_pool(pool, config.feed.clone()));

    let addr = config.bind_addr()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;
    telemetry.shutdown();
    served?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("Shutting down");
}
