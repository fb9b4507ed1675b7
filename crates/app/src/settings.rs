//! Layered configuration: `config/tally.toml`, then environment variables
//! such as `TALLY_CLIENT__USERNAME`, then command line overrides.

use std::path::PathBuf;

use engine::{DEFAULT_NAMESPACE, SyncOptions};
use serde::Deserialize;

use crate::{cli::Overrides, error::Result};

const DEFAULT_CONFIG_PATH: &str = "config/tally.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub app: App,
    pub server: Server,
    pub client: Client,
    pub sync: SyncOptions,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct App {
    pub level: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Server {
    pub bind: String,
    pub port: u16,
    /// A sea-orm connection string, or `memory`.
    pub database: String,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 3000,
            database: "sqlite:./tally.db?mode=rwc".to_string(),
        }
    }
}

impl Server {
    pub fn database_url(&self) -> String {
        match self.database.as_str() {
            "memory" => "sqlite::memory:".to_string(),
            url => url.to_string(),
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Client {
    pub base_url: String,
    /// Also the owner id of every row.
    pub username: String,
    pub password: String,
    pub cache_dir: PathBuf,
    pub namespace: String,
}

impl Default for Client {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
            username: String::new(),
            password: String::new(),
            cache_dir: PathBuf::from(".tally"),
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

fn builder(config_path: &str) -> config::ConfigBuilder<config::builder::DefaultState> {
    config::Config::builder()
        .add_source(config::File::with_name(config_path).required(false))
        .add_source(
            config::Environment::with_prefix("TALLY")
                .prefix_separator("_")
                .separator("__"),
        )
}

pub fn load(overrides: &Overrides) -> Result<Settings> {
    let config_path = overrides.config.as_deref().unwrap_or(DEFAULT_CONFIG_PATH);
    let mut settings: Settings = builder(config_path).build()?.try_deserialize()?;

    if let Some(level) = &overrides.level {
        settings.app.level = level.clone();
    }
    if let Some(base_url) = &overrides.base_url {
        settings.client.base_url = base_url.clone();
    }
    if let Some(username) = &overrides.username {
        settings.client.username = username.clone();
    }
    if let Some(cache_dir) = &overrides.cache_dir {
        settings.client.cache_dir = cache_dir.clone();
    }

    Ok(settings)
}
