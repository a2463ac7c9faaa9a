use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, str::FromStr};

use crate::services::checksum_relay::DEFAULT_BUFFER_SIZE;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    /// Public prefix for media URLs.
    pub cdn_base_url: String,
    pub relay_buffer_bytes: usize,
    pub max_upload_bytes: usize,
    pub default_page_size: u64,
    pub max_page_size: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            storage_dir: "./data/media".into(),
            database_url: "sqlite://./data/meta/feed.db".into(),
            cdn_base_url: "/media/".into(),
            relay_buffer_bytes: DEFAULT_BUFFER_SIZE,
            max_upload_bytes: 500 * 1024 * 1024,
            default_page_size: 2,
            max_page_size: 100,
        }
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Social feed backend")]
pub struct Args {
    /// Host to bind to (overrides FEED_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides FEED_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where uploaded media is stored (overrides FEED_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides FEED_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Public media URL prefix (overrides FEED_CDN_BASE_URL)
    #[arg(long)]
    pub cdn_base_url: Option<String>,

    /// Upload relay chunk size in bytes (overrides FEED_RELAY_BUFFER_BYTES)
    #[arg(long)]
    pub relay_buffer_bytes: Option<usize>,

    /// Largest accepted upload body (overrides FEED_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        let cfg = Self::from_env()?.merge(args)?;
        Ok((cfg, migrate))
    }

    /// Defaults overridden by `FEED_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            host: env_or("FEED_HOST", defaults.host)?,
            port: env_or("FEED_PORT", defaults.port)?,
            storage_dir: env_or("FEED_STORAGE_DIR", defaults.storage_dir)?,
            database_url: env_or("FEED_DATABASE_URL", defaults.database_url)?,
            cdn_base_url: env_or("FEED_CDN_BASE_URL", defaults.cdn_base_url)?,
            relay_buffer_bytes: env_or("FEED_RELAY_BUFFER_BYTES", defaults.relay_buffer_bytes)?,
            max_upload_bytes: env_or("FEED_MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
            default_page_size: env_or("FEED_DEFAULT_PAGE_SIZE", defaults.default_page_size)?,
            max_page_size: env_or("FEED_MAX_PAGE_SIZE", defaults.max_page_size)?,
        })
    }

    fn merge(self, args: Args) -> Result<Self> {
        let cfg = Self {
            host: args.host.unwrap_or(self.host),
            port: args.port.unwrap_or(self.port),
            storage_dir: args.storage_dir.unwrap_or(self.storage_dir),
            database_url: args.database_url.unwrap_or(self.database_url),
            cdn_base_url: args.cdn_base_url.unwrap_or(self.cdn_base_url),
            relay_buffer_bytes: args.relay_buffer_bytes.unwrap_or(self.relay_buffer_bytes),
            max_upload_bytes: args.max_upload_bytes.unwrap_or(self.max_upload_bytes),
            ..self
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.relay_buffer_bytes == 0 {
            bail!("relay_buffer_bytes must be greater than zero");
        }
        if self.default_page_size == 0 || self.max_page_size == 0 {
            bail!("page sizes must be greater than zero");
        }
        Ok(())
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Read and parse `key`, falling back to `default` when it is unset.
fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {key} value `{value}`")),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {key}")),
    }
}
