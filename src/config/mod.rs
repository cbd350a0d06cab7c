//! Startup configuration from command-line flags and environment variables.
//!
//! Every setting can come from a flag or its environment variable; the API key
//! is normally only given through `YOUTUBE_API_KEY`. Parsing is done by clap,
//! and [`Config::from_cli`] then validates the values that clap cannot.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use thiserror::Error;

use crate::cache::CachePolicy;
use crate::youtube::DEFAULT_BASE_URL;

/// Channel whose statistics and videos the site shows.
pub const DEFAULT_CHANNEL_ID: &str = "UCt2aQJmbRJ03JT_fDN7bSZQ";

/// Largest `maxResults` the Data API accepts.
const API_MAX_RESULTS: u32 = 50;

/// Errors in the startup configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid bind address '{addr}': {source}")]
    InvalidBindAddr {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("channel id must not be empty")]
    EmptyChannelId,

    #[error("{field} must be between 1 and {API_MAX_RESULTS}, got {value}")]
    OutOfRange { field: &'static str, value: u32 },
}

/// How the process was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LaunchMode {
    /// Started by a supervisor in production; caches are warmed at startup.
    Managed,
    /// Run by hand for local testing; no warm-up.
    Direct,
}

/// Serve a static site plus cached YouTube channel data
#[derive(Parser, Debug, Clone)]
#[command(name = "channelsite")]
#[command(version, about)]
pub struct Cli {
    /// Address to listen on
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:8000")]
    pub bind: String,

    /// Directory the website is served from
    #[arg(long, env = "SITE_ROOT", default_value = ".")]
    pub site_root: PathBuf,

    /// YouTube Data API key; without it the API endpoints answer 500
    #[arg(long, env = "YOUTUBE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Channel to report on
    #[arg(long, env = "YOUTUBE_CHANNEL_ID", default_value = DEFAULT_CHANNEL_ID)]
    pub channel_id: String,

    /// Root of the YouTube Data API
    #[arg(long, env = "YOUTUBE_API_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub api_base_url: String,

    /// Seconds a successful API response is served from memory (0 disables caching)
    #[arg(long, env = "CACHE_TTL_SECS", default_value_t = 18_000)]
    pub cache_ttl_secs: u64,

    /// Seconds to wait for the YouTube API before falling back to cached data
    #[arg(long, env = "FETCH_TIMEOUT_SECS", default_value_t = 10)]
    pub fetch_timeout_secs: u64,

    /// Number of recent uploads returned by /api/youtube_content
    #[arg(long, default_value_t = 4)]
    pub latest_videos: u32,

    /// Maximum number of playlists returned by /api/youtube_content
    #[arg(long, default_value_t = 25)]
    pub max_playlists: u32,

    /// Slideshow image directory, relative to the site root
    #[arg(long, default_value = "images/slideshow")]
    pub image_dir: String,

    /// Slideshow video directory, relative to the site root
    #[arg(long, default_value = "videos/slideshow")]
    pub video_dir: String,

    /// `managed` warms the caches at startup, `direct` does not
    #[arg(long, env = "LAUNCH_MODE", value_enum, default_value_t = LaunchMode::Managed)]
    pub launch_mode: LaunchMode,
}

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: SocketAddr,
    pub site_root: PathBuf,
    pub api_key: Option<String>,
    pub channel_id: String,
    pub api_base_url: String,
    pub cache: CachePolicy,
    pub latest_videos: u32,
    pub max_playlists: u32,
    pub image_dir: String,
    pub video_dir: String,
    pub launch_mode: LaunchMode,
}

impl Config {
    /// Validates parsed CLI arguments.
    ///
    /// An absent or blank API key is not an error here; it is normalised to
    /// `None` and reported when a fetch is attempted.
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let bind = cli
            .bind
            .parse()
            .map_err(|source| ConfigError::InvalidBindAddr {
                addr: cli.bind.clone(),
                source,
            })?;

        let channel_id = cli.channel_id.trim().to_string();
        if channel_id.is_empty() {
            return Err(ConfigError::EmptyChannelId);
        }

        check_max_results("latest_videos", cli.latest_videos)?;
        check_max_results("max_playlists", cli.max_playlists)?;

        Ok(Self {
            bind,
            site_root: cli.site_root,
            api_key: cli
                .api_key
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty()),
            channel_id,
            api_base_url: cli.api_base_url,
            cache: CachePolicy {
                ttl: Duration::from_secs(cli.cache_ttl_secs),
                fetch_timeout: Duration::from_secs(cli.fetch_timeout_secs),
            },
            latest_videos: cli.latest_videos,
            max_playlists: cli.max_playlists,
            image_dir: cli.image_dir,
            video_dir: cli.video_dir,
            launch_mode: cli.launch_mode,
        })
    }

    /// Whether the startup warm-up should run.
    pub fn warm_up(&self) -> bool {
        self.launch_mode == LaunchMode::Managed
    }
}

fn check_max_results(field: &'static str, value: u32) -> Result<(), ConfigError> {
    if (1..=API_MAX_RESULTS).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { field, value })
    }
}
