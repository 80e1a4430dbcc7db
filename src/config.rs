use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::app::controller::FeedSettings;
use crate::download::manager::WarmupSettings;

pub const CONFIG_ENV: &str = "SWIPEFEED_CONFIG";
pub const ADDR_ENV: &str = "SWIPEFEED_ADDR";
pub const MEDIA_ROOT_ENV: &str = "SWIPEFEED_MEDIA_ROOT";
pub const STORE_ENV: &str = "SWIPEFEED_STORE";
pub const SERVER_URL_ENV: &str = "SWIPEFEED_SERVER";

const STORE_FILE: &str = "swipefeed-store.json";

/// Settings of the catalogue server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Directory holding one sub-directory per category
    pub media_root: PathBuf,
    pub categories: Vec<String>,
    /// JSON file with ids, titles, likes, comments and captions. Defaults to a file in `media_root`.
    pub store_path: Option<PathBuf>,
    pub list_cache_ttl_secs: u64,
    /// Upper bound for the body of an open-ended range request
    pub max_chunk_bytes: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: String::from("0.0.0.0:3001"),
            media_root: PathBuf::from("."),
            categories: vec![
                String::from("videos"),
                String::from("videos1"),
                String::from("videos2"),
            ],
            store_path: None,
            list_cache_ttl_secs: 300,
            max_chunk_bytes: 1_000_000,
        }
    }
}

impl ServerConfig {
    /// Reads the file named by `SWIPEFEED_CONFIG` (if any) and applies environment overrides.
    pub fn from_env() -> Result<Self> {
        let mut config = match env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        read_json_file(path)
    }

    pub fn apply_env(&mut self) {
        if let Ok(addr) = env::var(ADDR_ENV) {
            self.bind_addr = addr;
        }
        if let Ok(root) = env::var(MEDIA_ROOT_ENV) {
            self.media_root = PathBuf::from(root);
        }
        if let Ok(store) = env::var(STORE_ENV) {
            self.store_path = Some(PathBuf::from(store));
        }
    }

    pub fn store_file(&self) -> PathBuf {
        self.store_path
            .clone()
            .unwrap_or_else(|| self.media_root.join(STORE_FILE))
    }

    pub fn is_category(&self, name: &str) -> bool {
        self.categories.iter().any(|category| category == name)
    }
}

/// Settings of the feed client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    pub queue_size: usize,
    pub history_capacity: usize,
    pub preload_window: usize,
    pub warm_parallel: usize,
    pub warm_bytes: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let feed = FeedSettings::default();
        let warm = WarmupSettings::default();
        Self {
            base_url: String::from("http://127.0.0.1:3001/"),
            queue_size: feed.queue_size,
            history_capacity: feed.history_capacity,
            preload_window: feed.preload_window,
            warm_parallel: warm.max_parallel,
            warm_bytes: warm.warm_bytes,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = match env::var(CONFIG_ENV) {
            Ok(path) => read_json_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        if let Ok(url) = env::var(SERVER_URL_ENV) {
            config.base_url = url;
        }
        Ok(config)
    }

    pub fn feed_settings(&self) -> FeedSettings {
        FeedSettings {
            queue_size: self.queue_size.max(1),
            history_capacity: self.history_capacity.max(1),
            preload_window: self.preload_window,
        }
    }

    pub fn warmup_settings(&self) -> WarmupSettings {
        WarmupSettings {
            max_parallel: self.warm_parallel.max(1),
            warm_bytes: self.warm_bytes,
        }
    }
}

fn read_json_file<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}
