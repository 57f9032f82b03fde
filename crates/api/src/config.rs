//! Application configuration loaded from environment variables.

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default `"0.0.0.0"`)
/// - `PORT`: listen port (default `3000`)
/// - `PAYMENT_PROVIDER`: default gateway provider name (default `"stripe"`)
/// - `DATABASE_URL`: Postgres connection string; the in-memory backend
///   is used when absent
/// - `RUST_LOG`: tracing filter directive (default `"info"`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub provider: String,
    pub database_url: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            provider: std::env::var("PAYMENT_PROVIDER").unwrap_or_else(|_| "stripe".to_string()),
            database_url: std::env::var("DATABASE_URL").ok(),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            provider: "stripe".to_string(),
            database_url: None,
            log_level: "info".to_string(),
        }
    }
}
