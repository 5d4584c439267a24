use std::{env, net::SocketAddr, path::PathBuf, str::FromStr};

use anyhow::{Context, Result};

use crate::service::InsightSettings;

/// Runtime settings read from the environment (and `.env`, when present).
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Without a database everything is kept in memory.
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub bind_addr: SocketAddr,
    /// Without a directory trained models live in memory only.
    pub model_dir: Option<PathBuf>,
    pub insights: InsightSettings,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = InsightSettings::default();
        Ok(Self {
            database_url: optional("DATABASE_URL"),
            max_connections: parsed("DATABASE_MAX_CONNECTIONS", 5)?,
            bind_addr: parsed("BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 3050)))?,
            model_dir: optional("MODEL_DIR").map(PathBuf::from),
            insights: InsightSettings {
                window_months: parsed("STATS_WINDOW_MONTHS", defaults.window_months)?,
                forecast_cycles: parsed("FORECAST_CYCLES", defaults.forecast_cycles)?,
            },
        })
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid {key}: {raw:?}")),
        None => Ok(default),
    }
}
