/// Orders Backend Application
///
/// This is the main entry point for the orders service.
/// The application exposes the `/v1/orders` REST API for creating orders with
/// server-allocated order IDs, listing them with filters, and listing the
/// countries available as filter options.
///
/// # Architecture
///
/// The application follows a modular architecture with:
/// - Repository layer for data access
/// - Service layer for business logic and ID allocation
/// - API layer for HTTP endpoints
/// - Metrics for monitoring
///
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use app_config::AppConfig;
use idgen::{AllocationPolicy, SecureIdGenerator};
use repository::PgOrdersRepository;
use server::Server;
use service::OrderServiceImpl;

/// Initialize the tracing subscriber for logging
fn init_logger() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("{e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(err) = init_logger() {
        eprintln!("Failed to initialize logger: {}", err);
        return Err(anyhow::anyhow!("Failed to initialize logger"));
    }

    info!("Orders backend starting...");

    let config = AppConfig::load().context("Failed to load configuration")?;

    let db_pool = match db::init_db_pool(&config).await {
        Ok(pool) => {
            info!("Database initialized successfully");
            pool
        }
        Err(e) => {
            error!("Failed to initialize database: {:#}", e);
            return Err(e.context("Failed to initialize database"));
        }
    };

    let policy = AllocationPolicy::new(config.order_id_length, config.order_id_max_attempts);
    info!(
        base_length = policy.base_length,
        max_attempts = policy.max_attempts,
        "Order ID allocation configured"
    );

    let order_service = Arc::new(OrderServiceImpl::new(
        PgOrdersRepository::new(db_pool),
        SecureIdGenerator::default(),
        policy,
    ));

    let http_server = Server::new(
        config.http_port,
        order_service,
        &config.cors_allow_origin,
        config.shutdown_timeout,
    )?;

    if let Err(err) = http_server.start().await {
        error!("HTTP server error: {:#}", err);
        return Err(err);
    }

    info!("Application stopped");
    Ok(())
}
