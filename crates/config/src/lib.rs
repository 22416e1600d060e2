use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use std::time::Duration;

/// `AppConfig` holds all configuration parameters required by the application.
///
/// The configuration is loaded from environment variables (optionally via a `.env` file)
/// or uses default values if the variable is not set. Fields include database,
/// HTTP server and order ID allocation settings. This struct is deserializable via Serde.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AppConfig {
    // --- Database settings ---
    /// Database hostname or service name (e.g. "postgres" in Docker Compose, "localhost" for local runs).
    pub db_host: String,
    /// Database port (default: 5432).
    pub db_port: u16,
    /// Database user.
    pub db_user: String,
    /// Database password.
    pub db_password: String,
    /// Database name.
    pub db_name: String,
    /// Maximum number of pooled connections.
    pub db_pool_size: usize,
    /// Directory with `.sql` migrations applied at startup.
    pub migrations_dir: String,

    // --- HTTP server ---
    /// The port on which the HTTP server will listen.
    pub http_port: u16,
    /// Value for `Access-Control-Allow-Origin`; `*` allows any origin.
    pub cors_allow_origin: String,

    // --- Shutdown timeout ---
    /// Graceful shutdown timeout (human-friendly format, e.g. "5s", "1m").
    #[serde(deserialize_with = "deserialize_duration_secs")]
    pub shutdown_timeout: Duration,

    // --- Order ID allocation ---
    /// Length of the first generated order ID candidates.
    pub order_id_length: usize,
    /// Candidates tried before order creation gives up.
    pub order_id_max_attempts: u32,
}

/// Custom deserializer for graceful shutdown timeout.
/// Accepts human-readable formats like "5s", "1m", etc.
fn deserialize_duration_secs<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    let val = String::deserialize(deserializer)?;
    humantime::parse_duration(&val)
        .map_err(|e| D::Error::custom(format!("Invalid duration '{val}': {e}")))
}

impl AppConfig {
    /// Loads configuration from environment variables (and optionally from `.env` file).
    ///
    /// Fields not set via env will be filled with default values.
    ///
    /// # Errors
    /// Returns an error if environment variables are invalid or out of range.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_env(Self::environment())
    }

    /// Unprefixed environment source: `DB_HOST` sets `db_host`.
    pub fn environment() -> config::Environment {
        config::Environment::default().try_parsing(true)
    }

    /// Builds the configuration from defaults overlaid with `env`.
    pub fn from_env(env: config::Environment) -> Result<Self> {
        let settings = config::Config::builder()
            // Database
            .set_default("db_host", "localhost")?
            .set_default("db_port", 5432)?
            .set_default("db_user", "postgres")?
            .set_default("db_password", "postgres")?
            .set_default("db_name", "orders")?
            .set_default("db_pool_size", 16)?
            .set_default("migrations_dir", "migrations")?
            // HTTP
            .set_default("http_port", 3000)?
            .set_default("cors_allow_origin", "*")?
            // Shutdown
            .set_default("shutdown_timeout", "5s")?
            // Order IDs
            .set_default("order_id_length", 8)?
            .set_default("order_id_max_attempts", 10)?
            .add_source(env)
            .build()?;

        let cfg: AppConfig = settings
            .try_deserialize()
            .context("Failed to load configuration")?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        ensure!(self.order_id_length >= 1, "order_id_length must be at least 1");
        ensure!(
            self.order_id_max_attempts >= 1,
            "order_id_max_attempts must be at least 1"
        );
        ensure!(self.db_pool_size >= 1, "db_pool_size must be at least 1");
        Ok(())
    }

    /// libpq-style connection string for the configured database.
    pub fn pg_dsn(&self) -> String {
        format!(
            "host={} port={} user={} password={} dbname={} sslmode=disable",
            self.db_host, self.db_port, self.db_user, self.db_password, self.db_name
        )
    }
}
