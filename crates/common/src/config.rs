use std::str::FromStr;

use serde::Deserialize;

/// How a claimed batch is drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessorMode {
    Sequential,
    Parallel,
}

impl FromStr for ProcessorMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(ProcessorMode::Sequential),
            "parallel" => Ok(ProcessorMode::Parallel),
            other => Err(anyhow::anyhow!("unknown processor mode '{other}'")),
        }
    }
}

/// How detected updates reach downstream consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Synchronous call to the bot; failures are logged and dropped.
    Direct,
    /// Transactional outbox row, published to the broker later.
    Outbox,
}

impl FromStr for DispatchMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(DispatchMode::Direct),
            "outbox" => Ok(DispatchMode::Outbox),
            other => Err(anyhow::anyhow!("unknown dispatch mode '{other}'")),
        }
    }
}

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string (message broker)
    pub redis_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// Delay between scheduler batches in milliseconds (default: 10000)
    pub scheduler_interval_ms: u64,

    /// Minimum seconds since the last check before a link is re-checked (default: 60)
    pub staleness_seconds: u64,

    /// Maximum number of links claimed per batch (default: 100)
    pub batch_limit: i64,

    /// Sequential or parallel batch processing (default: sequential)
    pub processor_mode: ProcessorMode,

    /// Worker count for parallel processing (default: 4)
    pub processor_pool_size: usize,

    /// Upper bound for checking and dispatching a single link (default: 30)
    pub resource_timeout_secs: u64,

    /// Direct or outbox delivery (default: outbox)
    pub dispatch_mode: DispatchMode,

    /// Broker topic for link updates (default: link-updates)
    pub outbox_topic: String,

    /// Delay between outbox publisher cycles in milliseconds (default: 1000)
    pub publisher_poll_interval_ms: u64,

    /// Rows fetched per publisher cycle (default: 50)
    pub publisher_batch_size: i64,

    /// Approximate stream length cap passed to XADD MAXLEN (default: unbounded)
    pub broker_stream_maxlen: Option<usize>,

    /// Age after which processed outbox rows may be purged (default: 168)
    pub outbox_retention_hours: u64,

    /// GitHub REST API base URL
    pub github_api_url: String,

    /// GitHub token sent as a bearer credential
    pub github_token: Option<String>,

    /// Stack Exchange API base URL
    pub stackoverflow_api_url: String,

    /// Stack Exchange application key
    pub stackoverflow_key: Option<String>,

    /// Connect timeout for source requests in milliseconds (default: 5000)
    pub source_connect_timeout_ms: u64,

    /// Total timeout for source requests in milliseconds (default: 10000)
    pub source_read_timeout_ms: u64,

    /// Bot endpoint receiving updates in direct mode
    pub bot_updates_url: Option<String>,

    /// Bind address for the operational API (default: 0.0.0.0:3000)
    pub api_bind_addr: String,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            database_url: lookup("DATABASE_URL")
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            redis_url: lookup("REDIS_URL").unwrap_or_else(|| "redis://localhost:6379".to_string()),
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 20)?,
            scheduler_interval_ms: parse_or(&lookup, "SCHEDULER_INTERVAL_MS", 10_000)?,
            staleness_seconds: parse_or(&lookup, "STALENESS_SECONDS", 60)?,
            batch_limit: parse_or(&lookup, "BATCH_LIMIT", 100)?,
            processor_mode: parse_or(&lookup, "PROCESSOR_MODE", ProcessorMode::Sequential)?,
            processor_pool_size: parse_or(&lookup, "PROCESSOR_POOL_SIZE", 4)?,
            resource_timeout_secs: parse_or(&lookup, "RESOURCE_TIMEOUT_SECS", 30)?,
            dispatch_mode: parse_or(&lookup, "DISPATCH_MODE", DispatchMode::Outbox)?,
            outbox_topic: lookup("OUTBOX_TOPIC").unwrap_or_else(|| "link-updates".to_string()),
            publisher_poll_interval_ms: parse_or(&lookup, "PUBLISHER_POLL_INTERVAL_MS", 1000)?,
            publisher_batch_size: parse_or(&lookup, "PUBLISHER_BATCH_SIZE", 50)?,
            broker_stream_maxlen: lookup("BROKER_STREAM_MAXLEN")
                .map(|v| {
                    v.parse()
                        .map_err(|_| anyhow::anyhow!("BROKER_STREAM_MAXLEN must be a valid usize"))
                })
                .transpose()?,
            outbox_retention_hours: parse_or(&lookup, "OUTBOX_RETENTION_HOURS", 168)?,
            github_api_url: lookup("GITHUB_API_URL")
                .unwrap_or_else(|| "https://api.github.com/".to_string()),
            github_token: lookup("GITHUB_TOKEN").filter(|t| !t.trim().is_empty()),
            stackoverflow_api_url: lookup("STACKOVERFLOW_API_URL")
                .unwrap_or_else(|| "https://api.stackexchange.com/2.3/".to_string()),
            stackoverflow_key: lookup("STACKOVERFLOW_KEY").filter(|k| !k.trim().is_empty()),
            source_connect_timeout_ms: parse_or(&lookup, "SOURCE_CONNECT_TIMEOUT_MS", 5000)?,
            source_read_timeout_ms: parse_or(&lookup, "SOURCE_READ_TIMEOUT_MS", 10_000)?,
            bot_updates_url: lookup("BOT_UPDATES_URL"),
            api_bind_addr: lookup("API_BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.batch_limit <= 0 {
            anyhow::bail!("BATCH_LIMIT must be > 0");
        }
        if self.processor_pool_size == 0 {
            anyhow::bail!("PROCESSOR_POOL_SIZE must be > 0");
        }
        if self.publisher_batch_size <= 0 {
            anyhow::bail!("PUBLISHER_BATCH_SIZE must be > 0");
        }
        if self.scheduler_interval_ms == 0 || self.publisher_poll_interval_ms == 0 {
            anyhow::bail!("SCHEDULER_INTERVAL_MS and PUBLISHER_POLL_INTERVAL_MS must be > 0");
        }
        if self.resource_timeout_secs == 0 {
            anyhow::bail!("RESOURCE_TIMEOUT_SECS must be > 0");
        }
        if self.dispatch_mode == DispatchMode::Direct && self.bot_updates_url.is_none() {
            anyhow::bail!("BOT_UPDATES_URL is required when DISPATCH_MODE=direct");
        }
        Ok(())
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{key} has an invalid value '{raw}'")),
        None => Ok(default),
    }
}
