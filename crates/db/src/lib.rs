//! Database initialization and migration logic for the orders backend.
//!
//! Provides `init_db_pool` for creating a connection pool and
//! auto-applying SQL migrations from the migrations directory.

use std::path::PathBuf;

use anyhow::{Context, Result};
use app_config::AppConfig;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use tokio::fs;
use tokio_postgres::{Client, Config as PgConfig, NoTls};
use tracing::info;

/// Initializes the database connection pool and runs migrations.
///
/// # Arguments
/// * `cfg` - The loaded application configuration.
///
/// # Returns
/// * `Pool` - A pool of PostgreSQL connections, ready for async use.
///
/// # Errors
/// Returns an error if the pool cannot be created or migrations fail.
pub async fn init_db_pool(cfg: &AppConfig) -> Result<Pool> {
    let pg_config: PgConfig = cfg.pg_dsn().parse().context("Failed to parse Postgres DSN")?;

    let mgr = Manager::from_config(
        pg_config,
        NoTls,
        ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        },
    );
    let pool = Pool::builder(mgr)
        .max_size(cfg.db_pool_size)
        .runtime(Runtime::Tokio1)
        .build()
        .context("Failed to create database pool")?;

    let client = pool
        .get()
        .await
        .context("Failed to get DB connection for migrations")?;
    run_migrations(&client, &cfg.migrations_dir).await?;

    Ok(pool)
}

/// Applies all SQL migrations from the given directory, in file-name order.
///
/// # Arguments
/// * `client` - An active Postgres client.
/// * `migrations_dir` - Path to the folder containing .sql migration files.
///
/// # Errors
/// Returns an error if migration files cannot be read or applied.
pub async fn run_migrations(client: &Client, migrations_dir: &str) -> Result<()> {
    for path in migration_files(migrations_dir).await? {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!("Applying migration: {}", file_name);

        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read migration file {}", file_name))?;
        client
            .batch_execute(&content)
            .await
            .with_context(|| format!("Failed to execute migration {}", file_name))?;
    }
    Ok(())
}

/// Lists `.sql` files in `migrations_dir`, sorted by name.
pub async fn migration_files(migrations_dir: &str) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(migrations_dir)
        .await
        .context("Failed to read migrations directory")?;

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "sql") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migration_files_sorted_and_filtered() {
        let dir = std::env::temp_dir().join(format!("orders-migrations-{}", std::process::id()));
        fs::create_dir_all(&dir).await.unwrap();
        for name in ["002_b.sql", "001_a.sql", "README.md"] {
            fs::write(dir.join(name), "").await.unwrap();
        }

        let files = migration_files(dir.to_str().unwrap()).await.unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["001_a.sql", "002_b.sql"]);

        fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_bundled_migration_declares_unique_constraints() {
        let dir = concat!(env!("CARGO_MANIFEST_DIR"), "/../../migrations");
        let files = migration_files(dir).await.unwrap();
        assert!(!files.is_empty());

        let sql = fs::read_to_string(&files[0]).await.unwrap();
        assert!(sql.contains("uq_orders_order_id"));
        assert!(sql.contains("uq_orders_order_number"));
    }
}
