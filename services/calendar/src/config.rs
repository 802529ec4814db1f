use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;

// Calendar service configuration sourced from environment variables.
#[derive(Debug, Clone)]
pub struct CalendarConfig {
    pub bind_addr: SocketAddr,
    pub metrics_bind: SocketAddr,
    pub storage: StorageBackend,
    pub postgres: Option<PostgresConfig>,
    pub finalization: FinalizationConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_ms: u64,
    pub acquire_timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalizationConfig {
    pub enabled: bool,
    /// Minute of every hour at which the job fires.
    pub minute: u32,
}

impl Default for FinalizationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            minute: 1,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CalendarConfigOverride {
    bind_addr: Option<String>,
    metrics_bind: Option<String>,
    storage: Option<StorageBackend>,
    postgres: Option<PostgresOverride>,
    finalize_enabled: Option<bool>,
    finalize_minute: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct PostgresOverride {
    url: Option<String>,
    max_connections: Option<u32>,
    connect_timeout_ms: Option<u64>,
    acquire_timeout_ms: Option<u64>,
}

impl PostgresConfig {
    fn with_url(url: String) -> Self {
        Self {
            url,
            max_connections: 10,
            connect_timeout_ms: 5_000,
            acquire_timeout_ms: 5_000,
        }
    }
}

fn parse_storage(value: &str) -> Result<StorageBackend> {
    match value.to_ascii_lowercase().as_str() {
        "memory" => Ok(StorageBackend::Memory),
        "postgres" => Ok(StorageBackend::Postgres),
        other => bail!("unknown storage backend: {other}"),
    }
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(value) => value
            .parse()
            .map(Some)
            .with_context(|| format!("parse {key}")),
        Err(_) => Ok(None),
    }
}

fn check_minute(minute: u32) -> Result<u32> {
    if minute > 59 {
        bail!("finalize minute must be within 0..=59, got {minute}");
    }
    Ok(minute)
}

impl CalendarConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr = std::env::var("CALENDAR_BIND")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()
            .with_context(|| "parse CALENDAR_BIND")?;
        let metrics_bind = std::env::var("CALENDAR_METRICS_BIND")
            .unwrap_or_else(|_| "0.0.0.0:9090".to_string())
            .parse()
            .with_context(|| "parse CALENDAR_METRICS_BIND")?;
        let storage = match std::env::var("CALENDAR_STORAGE") {
            Ok(value) => parse_storage(&value)?,
            Err(_) => StorageBackend::Memory,
        };
        let postgres = match std::env::var("CALENDAR_PG_URL") {
            Ok(url) => {
                let mut pg = PostgresConfig::with_url(url);
                if let Some(value) = env_parse("CALENDAR_PG_MAX_CONNECTIONS")? {
                    pg.max_connections = value;
                }
                if let Some(value) = env_parse("CALENDAR_PG_CONNECT_TIMEOUT_MS")? {
                    pg.connect_timeout_ms = value;
                }
                if let Some(value) = env_parse("CALENDAR_PG_ACQUIRE_TIMEOUT_MS")? {
                    pg.acquire_timeout_ms = value;
                }
                Some(pg)
            }
            Err(_) => None,
        };
        let mut finalization = FinalizationConfig::default();
        if let Some(value) = env_parse("CALENDAR_FINALIZE_ENABLED")? {
            finalization.enabled = value;
        }
        if let Some(value) = env_parse("CALENDAR_FINALIZE_MINUTE")? {
            finalization.minute = check_minute(value)?;
        }
        Ok(Self {
            bind_addr,
            metrics_bind,
            storage,
            postgres,
            finalization,
        })
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::from_env()?;
        if let Ok(path) = std::env::var("CALENDAR_CONFIG") {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("read CALENDAR_CONFIG: {path}"))?;
            let override_cfg: CalendarConfigOverride = serde_yaml::from_str(&contents)
                .with_context(|| "parse calendar config yaml")?;
            config.apply(override_cfg)?;
        }
        Ok(config)
    }

    fn apply(&mut self, override_cfg: CalendarConfigOverride) -> Result<()> {
        if let Some(value) = override_cfg.bind_addr {
            self.bind_addr = value.parse().with_context(|| "parse bind_addr")?;
        }
        if let Some(value) = override_cfg.metrics_bind {
            self.metrics_bind = value.parse().with_context(|| "parse metrics_bind")?;
        }
        if let Some(value) = override_cfg.storage {
            self.storage = value;
        }
        if let Some(pg) = override_cfg.postgres {
            let mut merged = match (self.postgres.take(), pg.url) {
                (Some(mut existing), Some(url)) => {
                    existing.url = url;
                    existing
                }
                (Some(existing), None) => existing,
                (None, Some(url)) => PostgresConfig::with_url(url),
                (None, None) => bail!("postgres override requires url"),
            };
            if let Some(value) = pg.max_connections {
                merged.max_connections = value;
            }
            if let Some(value) = pg.connect_timeout_ms {
                merged.connect_timeout_ms = value;
            }
            if let Some(value) = pg.acquire_timeout_ms {
                merged.acquire_timeout_ms = value;
            }
            self.postgres = Some(merged);
        }
        if let Some(value) = override_cfg.finalize_enabled {
            self.finalization.enabled = value;
        }
        if let Some(value) = override_cfg.finalize_minute {
            self.finalization.minute = check_minute(value)?;
        }
        Ok(())
    }
}
