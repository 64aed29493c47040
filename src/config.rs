// src/config.rs
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{name} must be a valid {expected}, got '{value}'")]
    InvalidValue {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Runtime configuration, loaded once at start-up and shared through `AppState`.
///
/// | Env Var            | Default                                      |
/// |--------------------|----------------------------------------------|
/// | `HOST`             | `0.0.0.0`                                    |
/// | `PORT`             | `5500`                                       |
/// | `DATA_DIR`         | `data`                                       |
/// | `STATIC_DIR`       | `.`                                          |
/// | `LLM_API_URL`      | `http://localhost:1234/v1/chat/completions`  |
/// | `LLM_MODEL`        | `local-model`                                |
/// | `LLM_TIMEOUT_SECS` | `300`                                        |
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub static_dir: PathBuf,
    pub llm_api_url: String,
    pub llm_model: String,
    pub llm_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port = parse_env("PORT", "u16", 5500u16)?;
        let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "data".into());
        let static_dir = std::env::var("STATIC_DIR").unwrap_or_else(|_| ".".into());
        let llm_api_url = std::env::var("LLM_API_URL")
            .unwrap_or_else(|_| "http://localhost:1234/v1/chat/completions".into());
        let llm_model = std::env::var("LLM_MODEL").unwrap_or_else(|_| "local-model".into());
        let llm_timeout_secs = parse_env("LLM_TIMEOUT_SECS", "u64", 300u64)?;

        Ok(Self {
            host,
            port,
            data_dir: PathBuf::from(data_dir),
            static_dir: PathBuf::from(static_dir),
            llm_api_url,
            llm_model,
            llm_timeout: Duration::from_secs(llm_timeout_secs),
        })
    }

    /// Configuration rooted at `data_dir` with every other value at its default.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 5500,
            data_dir: data_dir.into(),
            static_dir: PathBuf::from("."),
            llm_api_url: "http://localhost:1234/v1/chat/completions".into(),
            llm_model: "local-model".into(),
            llm_timeout: Duration::from_secs(300),
        }
    }

    pub fn characters_dir(&self) -> PathBuf {
        self.data_dir.join("characters")
    }

    pub fn chats_dir(&self) -> PathBuf {
        self.data_dir.join("chats")
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Creates the data directory tree if it is missing.
    pub async fn ensure_data_dirs(&self) -> std::io::Result<()> {
        for dir in [self.characters_dir(), self.chats_dir(), self.uploads_dir()] {
            create_dir(&dir).await?;
        }
        Ok(())
    }
}

async fn create_dir(dir: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    tracing::debug!(dir = %dir.display(), "data directory ready");
    Ok(())
}

fn parse_env<T: std::str::FromStr>(
    name: &'static str,
    expected: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError::InvalidValue {
            name,
            expected,
            value,
        }),
        Err(_) => Ok(default),
    }
}
