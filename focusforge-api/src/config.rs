/// Configuration management for the API server
///
/// Configuration is read from environment variables (a `.env` file is
/// loaded first when present).
///
/// # Environment Variables
///
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: 10)
/// - `RUN_MIGRATIONS`: apply pending migrations at startup (default: true)
/// - `API_HOST`: Host to bind to (default: 0.0.0.0)
/// - `API_PORT`: Port to bind to (default: 5000)
/// - `CORS_ORIGINS`: comma-separated origins, `*` for permissive (default: `*`)
/// - `PRODUCTION`: enables HSTS (default: false)
/// - `FRONTEND_URL`: base of invitation links (default: http://localhost:8081)
/// - `JWT_SECRET`: Secret key for JWT signing (required, at least 32 characters)
/// - `INVITATION_TTL_DAYS`: invitation lifetime, 1 to 365 (default: 7)
/// - `RUST_LOG`, `LOG_FORMAT`: read by the tracing setup in `main`
///
/// # Example
///
/// ```no_run
/// use focusforge_api::config::Config;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}:{}", config.api.host, config.api.port);
/// # Ok(())
/// # }
/// ```

use focusforge_shared::invitations::{DEFAULT_TTL_DAYS, MAX_TTL_DAYS};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub invitations: InvitationConfig,
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,

    /// Allowed CORS origins; `*` means permissive
    pub cors_origins: Vec<String>,

    /// Production mode turns on HSTS
    pub production: bool,

    /// Public URL of the web client, used to build invitation links
    pub frontend_url: String,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in pool
    pub max_connections: u32,

    /// Apply pending migrations before serving
    pub run_migrations: bool,
}

/// JWT configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// Secret key for JWT signing
    ///
    /// Generate with: `openssl rand -hex 32`
    pub secret: String,
}

/// Invitation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvitationConfig {
    pub ttl_days: i64,
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value does
    /// not parse.
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key/value source
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let jwt_secret = lookup("JWT_SECRET")
            .ok_or_else(|| anyhow::anyhow!("JWT_SECRET environment variable is required"))?;

        if jwt_secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 characters long");
        }

        let ttl_days: i64 = parse_or(&lookup, "INVITATION_TTL_DAYS", DEFAULT_TTL_DAYS)?;
        if !(1..=MAX_TTL_DAYS).contains(&ttl_days) {
            anyhow::bail!("INVITATION_TTL_DAYS must be between 1 and {MAX_TTL_DAYS}");
        }

        let cors_origins = lookup("CORS_ORIGINS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        Ok(Self {
            api: ApiConfig {
                host: lookup("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_or(&lookup, "API_PORT", 5000)?,
                cors_origins,
                production: parse_bool(&lookup, "PRODUCTION", false),
                frontend_url: lookup("FRONTEND_URL")
                    .unwrap_or_else(|| "http://localhost:8081".to_string())
                    .trim_end_matches('/')
                    .to_string(),
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
                run_migrations: parse_bool(&lookup, "RUN_MIGRATIONS", true),
            },
            jwt: JwtConfig { secret: jwt_secret },
            invitations: InvitationConfig { ttl_days },
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    /// Link the invitee opens in the web client, e.g.
    /// `http://localhost:8081/accept-invitation/<token>`
    pub fn invitation_link(&self, page: &str, token: &str) -> String {
        format!("{}/{}/{}", self.api.frontend_url, page, token)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: {}", key, e)),
        None => Ok(default),
    }
}

fn parse_bool<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
        None => default,
    }
}
