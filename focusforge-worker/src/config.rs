/// Worker configuration from environment variables
///
/// - `DATABASE_URL` (required)
/// - `DATABASE_MAX_CONNECTIONS` (default 2)
/// - `SWEEP_INTERVAL_SECS` (default 300, at least 1)

use anyhow::{anyhow, Context};
use std::time::Duration;

pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub sweep_interval: Duration,
}

impl WorkerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| anyhow!("DATABASE_URL must be set"))?;

        let max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("invalid DATABASE_MAX_CONNECTIONS: {raw}"))?,
            None => 2,
        };

        let interval_secs: u64 = match lookup("SWEEP_INTERVAL_SECS") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("invalid SWEEP_INTERVAL_SECS: {raw}"))?,
            None => DEFAULT_SWEEP_INTERVAL_SECS,
        };
        if interval_secs == 0 {
            return Err(anyhow!("SWEEP_INTERVAL_SECS must be at least 1"));
        }

        Ok(Self {
            database_url,
            max_connections,
            sweep_interval: Duration::from_secs(interval_secs),
        })
    }
}
