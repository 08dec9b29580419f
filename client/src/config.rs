//! Configuration: a TOML file overlaid with CLI flags and two environment
//! overrides (`CHATFS_TOKEN`, `CHATFS_GUILD`).

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Deserialize;

use crate::block_cache::CacheBackend;
use crate::db::DbBackend;

#[derive(Parser, Debug)]
#[command(name = "chatfs", about = "Mounts a filesystem backed by a chat-service guild")]
pub struct Cli {
    /// Path to the TOML config file.
    #[arg(long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Directory to mount the filesystem at.
    pub mountpoint: PathBuf,

    /// Chat API token. Overrides config file and `CHATFS_TOKEN`.
    #[arg(long)]
    pub token: Option<String>,

    /// Guild (workspace) id to mount. Overrides config file and `CHATFS_GUILD`.
    #[arg(long)]
    pub guild: Option<String>,

    /// Treat `token` as a user token rather than a bot token.
    #[arg(long)]
    pub user_token: bool,

    /// This account's own id, used to filter out self-authored messages in
    /// the live applier. Defaults to a value the chat service never hands
    /// out to a real account, which simply disables that filter.
    #[arg(long)]
    pub self_id: Option<String>,

    /// Rewrite and re-pin the tx log on startup.
    #[arg(long)]
    pub compact: bool,

    #[arg(long, value_enum)]
    pub cache_backend: Option<CacheBackendArg>,

    #[arg(long, value_enum)]
    pub database_backend: Option<DatabaseBackendArg>,

    /// Extra FUSE mount options, repeatable (e.g. `-o allow_other`).
    #[arg(short = 'o', long = "option")]
    pub options: Vec<String>,

    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum CacheBackendArg {
    Memory,
    Disk,
}

impl From<CacheBackendArg> for CacheBackend {
    fn from(arg: CacheBackendArg) -> Self {
        match arg {
            CacheBackendArg::Memory => CacheBackend::Memory,
            CacheBackendArg::Disk => CacheBackend::Disk,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum DatabaseBackendArg {
    Radix,
    Map,
}

impl From<DatabaseBackendArg> for DbBackend {
    fn from(arg: DatabaseBackendArg) -> Self {
        match arg {
            DatabaseBackendArg::Radix => DbBackend::Radix,
            DatabaseBackendArg::Map => DbBackend::Map,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct FileConfig {
    pub token: Option<String>,
    pub guild: Option<String>,
    pub api_base_url: String,
    pub ws_url: String,
    pub cache_backend: CacheBackend,
    pub database_backend: DbBackend,
    pub kernel_attr_timeout_seconds: u64,
    pub kernel_entry_timeout_seconds: u64,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            token: None,
            guild: None,
            api_base_url: "https://chat.example.invalid/api".to_string(),
            ws_url: "wss://chat.example.invalid/gateway".to_string(),
            cache_backend: CacheBackend::Memory,
            database_backend: DbBackend::Radix,
            kernel_attr_timeout_seconds: 1,
            kernel_entry_timeout_seconds: 1,
        }
    }
}

/// The fully resolved configuration: file, then CLI flags, then the two
/// named environment overrides, highest priority last.
#[derive(Debug, Clone)]
pub struct Config {
    pub token: String,
    pub guild: String,
    pub user_token: bool,
    pub self_id: String,
    pub api_base_url: String,
    pub ws_url: String,
    pub cache_backend: CacheBackend,
    pub database_backend: DbBackend,
    pub compact: bool,
    pub mountpoint: PathBuf,
    pub mount_options: Vec<String>,
    pub kernel_attr_timeout_seconds: u64,
    pub kernel_entry_timeout_seconds: u64,
    pub verbose: bool,
}

fn load_file_config(path: &Path) -> FileConfig {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "config file not found, using defaults");
        return FileConfig::default();
    }
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(err) => {
            tracing::warn!(path = %path.display(), %err, "failed to read config file, using defaults");
            return FileConfig::default();
        }
    };
    match toml::from_str(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(path = %path.display(), %err, "failed to parse config file, using defaults");
            FileConfig::default()
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no chat token configured (set `token` in the config file, pass --token, or set CHATFS_TOKEN)")]
    MissingToken,
    #[error("no guild configured (set `guild` in the config file, pass --guild, or set CHATFS_GUILD)")]
    MissingGuild,
}

/// Resolves CLI + file + env into one `Config`. Exits nonzero (via the
/// returned `Err`) when the token or guild can't be resolved from any
/// source.
pub fn resolve(cli: Cli) -> Result<Config, ConfigError> {
    let file = load_file_config(&cli.config);

    let token = cli.token.or_else(|| std::env::var("CHATFS_TOKEN").ok()).or(file.token).ok_or(ConfigError::MissingToken)?;
    let guild = cli.guild.or_else(|| std::env::var("CHATFS_GUILD").ok()).or(file.guild).ok_or(ConfigError::MissingGuild)?;

    let self_id = cli.self_id.unwrap_or_else(|| {
        tracing::warn!("no --self-id given; live-applied messages from this account won't be filtered out");
        "unknown-self".to_string()
    });

    Ok(Config {
        token,
        guild,
        user_token: cli.user_token,
        self_id,
        api_base_url: file.api_base_url,
        ws_url: file.ws_url,
        cache_backend: cli.cache_backend.map(Into::into).unwrap_or(file.cache_backend),
        database_backend: cli.database_backend.map(Into::into).unwrap_or(file.database_backend),
        compact: cli.compact,
        mountpoint: cli.mountpoint,
        mount_options: cli.options,
        kernel_attr_timeout_seconds: file.kernel_attr_timeout_seconds,
        kernel_entry_timeout_seconds: file.kernel_entry_timeout_seconds,
        verbose: cli.verbose,
    })
}
