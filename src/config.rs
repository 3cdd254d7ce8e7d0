use std::{env, fs, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;

/// Firehose rejects responses above 6 MiB; keep headroom for envelope overhead.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 6_000_000;
/// PutRecords / PutRecordBatch accept at most 500 entries per call.
pub const DEFAULT_REINGEST_BATCH_SIZE: usize = 500;
pub const DEFAULT_MAX_PUT_ATTEMPTS: u32 = 20;
pub const DEFAULT_SOURCETYPE: &str = "aws:cloudwatch";

#[derive(Debug, Clone)]
pub struct Config {
    pub env: String,
    pub max_output_bytes: usize,
    pub reingest_batch_size: usize,
    pub max_put_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub http_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub sourcetype: String,
    pub event_delimiter: String,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    env: String,
    #[serde(default = "default_max_output_bytes")]
    max_output_bytes: usize,
    #[serde(default = "default_reingest_batch_size")]
    reingest_batch_size: usize,
    #[serde(default = "default_max_put_attempts")]
    max_put_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    backoff_max_ms: u64,
    #[serde(default = "default_http_timeout_secs")]
    http_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    connect_timeout_secs: u64,
    #[serde(default = "default_sourcetype")]
    sourcetype: String,
    #[serde(default)]
    event_delimiter: String,
}

impl From<RawConfig> for Config {
    fn from(raw: RawConfig) -> Self {
        Self {
            env: raw.env,
            max_output_bytes: raw.max_output_bytes,
            reingest_batch_size: raw.reingest_batch_size,
            max_put_attempts: raw.max_put_attempts,
            backoff_base_ms: raw.backoff_base_ms,
            backoff_max_ms: raw.backoff_max_ms,
            http_timeout_secs: raw.http_timeout_secs,
            connect_timeout_secs: raw.connect_timeout_secs,
            sourcetype: raw.sourcetype,
            event_delimiter: raw.event_delimiter,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            env: String::new(),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            reingest_batch_size: DEFAULT_REINGEST_BATCH_SIZE,
            max_put_attempts: DEFAULT_MAX_PUT_ATTEMPTS,
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            http_timeout_secs: default_http_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            sourcetype: DEFAULT_SOURCETYPE.to_string(),
            event_delimiter: String::new(),
        }
    }
}

impl Config {
    /// Load from an explicit TOML file, the per-user default file, or
    /// defaults, then apply environment overrides.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let mut cfg = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = default_config_path();
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };

        if let Ok(v) = env::var("ENV") {
            cfg.env = v;
        }
        if let Ok(v) = env::var("SPLUNK_SOURCETYPE") {
            if !v.trim().is_empty() {
                cfg.sourcetype = v;
            }
        }
        if let Ok(v) = env::var("EVENT_DELIMITER") {
            cfg.event_delimiter = unescape_delimiter(&v);
        }
        maybe_env_usize(&mut cfg.max_output_bytes, "MAX_OUTPUT_BYTES");
        maybe_env_usize(&mut cfg.reingest_batch_size, "REINGEST_BATCH_SIZE");
        maybe_env_u32(&mut cfg.max_put_attempts, "MAX_PUT_ATTEMPTS");
        maybe_env_u64(&mut cfg.backoff_base_ms, "BACKOFF_BASE_MS");
        maybe_env_u64(&mut cfg.backoff_max_ms, "BACKOFF_MAX_MS");
        maybe_env_u64(&mut cfg.http_timeout_secs, "HTTP_TIMEOUT_SECS");
        maybe_env_u64(&mut cfg.connect_timeout_secs, "CONNECT_TIMEOUT_SECS");
        validate(&cfg)?;
        Ok(cfg)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let cfg = Config::from(toml::from_str::<RawConfig>(raw).context("parsing config toml")?);
        validate(&cfg)?;
        Ok(cfg)
    }

    fn from_file(path: PathBuf) -> Result<Self> {
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_toml_str(&raw)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }
}

fn default_config_path() -> PathBuf {
    ProjectDirs::from("com", "logprocessor", "logprocessor")
        .map(|p| p.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from(".logprocessor/config.toml"))
}

fn validate(cfg: &Config) -> Result<()> {
    if cfg.max_output_bytes == 0 {
        anyhow::bail!("max_output_bytes must be > 0");
    }
    if cfg.reingest_batch_size == 0 {
        anyhow::bail!("reingest_batch_size must be > 0");
    }
    if cfg.max_put_attempts == 0 {
        anyhow::bail!("max_put_attempts must be > 0");
    }
    if cfg.connect_timeout_secs == 0 {
        anyhow::bail!("connect_timeout_secs must be > 0");
    }
    if cfg.sourcetype.trim().is_empty() {
        anyhow::bail!("sourcetype must not be empty");
    }
    Ok(())
}

// Env vars can't easily carry a raw newline.
fn unescape_delimiter(raw: &str) -> String {
    raw.replace("\\n", "\n").replace("\\t", "\t")
}

fn maybe_env_usize(val: &mut usize, key: &str) {
    if let Ok(v) = env::var(key) {
        if let Ok(n) = v.parse::<usize>() {
            *val = n;
        }
    }
}

fn maybe_env_u32(val: &mut u32, key: &str) {
    if let Ok(v) = env::var(key) {
        if let Ok(n) = v.parse::<u32>() {
            *val = n;
        }
    }
}

fn maybe_env_u64(val: &mut u64, key: &str) {
    if let Ok(v) = env::var(key) {
        if let Ok(n) = v.parse::<u64>() {
            *val = n;
        }
    }
}

fn default_max_output_bytes() -> usize {
    DEFAULT_MAX_OUTPUT_BYTES
}

fn default_reingest_batch_size() -> usize {
    DEFAULT_REINGEST_BATCH_SIZE
}

fn default_max_put_attempts() -> u32 {
    DEFAULT_MAX_PUT_ATTEMPTS
}

fn default_backoff_base_ms() -> u64 {
    100
}

fn default_backoff_max_ms() -> u64 {
    5_000
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_sourcetype() -> String {
    DEFAULT_SOURCETYPE.to_string()
}
