//! Layered configuration: compiled defaults, then `config.toml` in the
//! data directory, then `TIDE_`-prefixed environment variables with `__`
//! separating nesting (`TIDE_BACKEND__URL` sets `backend.url`).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

fn default_connect_timeout() -> u64 {
    10
}

fn default_system_prompt() -> String {
    "You are a helpful, friendly AI assistant. Provide clear, concise, and engaging responses."
        .to_string()
}

/// Everything the config file can set, grouped by section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub server: ServerFileConfig,
    pub backend: BackendFileConfig,
    pub relay: RelayFileConfig,
}

/// `[server]` section. Unset values fall back to CLI flags, then to
/// 127.0.0.1:8787.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerFileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Directory served at `/` in place of the compiled-in chat page.
    pub static_dir: Option<PathBuf>,
}

/// `[backend]` section. `url` is the streaming generation endpoint and is
/// the one setting with no default; Cloudflare-style endpoints encode the
/// model in the URL, OpenAI-style endpoints take it from `model` instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendFileConfig {
    pub url: String,
    /// Model identifier sent in the request body when set.
    pub model: Option<String>,
    /// Bearer token attached to backend requests when set.
    pub api_token: Option<String>,
    /// TCP connect timeout in seconds. 0 disables it.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for BackendFileConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            model: None,
            api_token: None,
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

/// `[relay]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayFileConfig {
    /// Injected as the leading system turn on the first message of a
    /// session. Never persisted.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for RelayFileConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
        }
    }
}

/// Runtime view of the `[backend]` section, validated at startup so a
/// missing endpoint fails the boot instead of the first chat request.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub url: String,
    pub model: Option<String>,
    pub api_token: Option<String>,
    pub connect_timeout: Option<Duration>,
}

impl BackendConfig {
    pub fn from_file(file: &BackendFileConfig) -> Result<Self> {
        if file.url.is_empty() {
            anyhow::bail!(
                "backend.url is not configured; set it in config.toml or via TIDE_BACKEND__URL"
            );
        }
        Ok(Self {
            url: file.url.clone(),
            model: file.model.clone().filter(|m| !m.is_empty()),
            api_token: file.api_token.clone().filter(|t| !t.is_empty()),
            connect_timeout: match file.connect_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        })
    }
}

/// Filesystem layout for one tidepool instance.
#[derive(Debug, Clone)]
pub struct TidepoolConfig {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
}

impl TidepoolConfig {
    pub fn new(custom_data_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = match custom_data_dir {
            Some(dir) => dir,
            None => dirs::home_dir()
                .context("Could not find home directory")?
                .join(".tidepool"),
        };

        std::fs::create_dir_all(&data_dir).with_context(|| {
            format!("Failed to create data directory: {}", data_dir.display())
        })?;

        let db_path = data_dir.join("tidepool.db");
        Ok(Self { data_dir, db_path })
    }

    /// Connection URL for the conversation database, creating the file on
    /// first open.
    pub fn db_url(&self) -> String {
        format!("sqlite://{}?mode=rwc", self.db_path.display())
    }

    pub fn config_toml_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }

    /// Delete the database for a clean start. The WAL and SHM sidecars go
    /// with the main file.
    pub fn reset_database(&self) -> Result<()> {
        for path in [
            self.db_path.clone(),
            self.db_path.with_extension("db-wal"),
            self.db_path.with_extension("db-shm"),
        ] {
            if path.exists() {
                std::fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
            }
        }
        Ok(())
    }
}

/// Load the layered file config for one tidepool instance.
pub fn load_config(config: &TidepoolConfig) -> Result<FileConfig> {
    let file_config = Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(config.config_toml_path()))
        .merge(Env::prefixed("TIDE_").split("__"))
        .extract()
        .context("Failed to load configuration")?;
    Ok(file_config)
}
