//! Chat settings: defaults, environment overrides and JSON persistence.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::ClientError;
use crate::http::DEFAULT_BASE_URL;
use crate::options::{HttpTransport, ModelOptions, OllamaModel, TransportOptions};
use crate::providers::ollama::DEFAULT_MODEL;

/// Settings for a chat front-end.
///
/// Files may hold any subset of the fields; missing ones keep their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub ollama_url: String,
    pub model: String,
    pub temperature: f32,
    pub system_prompt_path: PathBuf,
    /// Conversations older than this are purged
    pub retention_hours: u32,
    /// Request timeout; `None` waits as long as generation takes
    pub timeout_secs: Option<u64>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            ollama_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            system_prompt_path: PathBuf::from("config/system-prompt.txt"),
            retention_hours: 24,
            timeout_secs: None,
        }
    }
}

impl ChatConfig {
    /// Read settings from a JSON file, merged over the defaults.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let raw = tokio::fs::read_to_string(path.as_ref()).await?;
        let config: ChatConfig = serde_json::from_str(&raw)?;
        tracing::debug!(path = %path.as_ref().display(), "settings loaded");
        Ok(config)
    }

    /// Write settings to a JSON file.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), ClientError> {
        let raw = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path.as_ref(), raw).await?;
        tracing::info!(path = %path.as_ref().display(), "settings saved");
        Ok(())
    }

    /// Apply `OLLAMA_HOST`, `OLLAMA_MODEL`, `OLLACHAT_TEMPERATURE` and
    /// `OLLACHAT_PROMPT_FILE` from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.overlay(|key| std::env::var(key).ok())
    }

    fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(host) = lookup("OLLAMA_HOST") {
            // Ollama itself accepts a bare host:port here
            self.ollama_url = if host.contains("://") {
                host
            } else {
                format!("http://{host}")
            };
        }
        if let Some(model) = lookup("OLLAMA_MODEL") {
            self.model = model;
        }
        if let Some(raw) = lookup("OLLACHAT_TEMPERATURE") {
            match raw.parse() {
                Ok(temperature) => self.temperature = temperature,
                Err(_) => tracing::warn!(value = %raw, "ignoring invalid OLLACHAT_TEMPERATURE"),
            }
        }
        if let Some(path) = lookup("OLLACHAT_PROMPT_FILE") {
            self.system_prompt_path = PathBuf::from(path);
        }
        self
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.retention_hours))
    }

    /// Check the settings and turn them into client options.
    pub fn to_options(
        &self,
    ) -> Result<(ModelOptions<OllamaModel>, TransportOptions<HttpTransport>), ClientError> {
        reqwest::Url::parse(&self.ollama_url)
            .map_err(|e| ClientError::Config(format!("invalid Ollama URL {}: {e}", self.ollama_url)))?;

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ClientError::Config(format!(
                "temperature must be between 0 and 2, got {}",
                self.temperature
            )));
        }

        if self.model.trim().is_empty() {
            return Err(ClientError::Config("model name is empty".to_string()));
        }

        let model_options = ModelOptions::new(OllamaModel::default())
            .with_model(self.model.clone())
            .with_temperature(self.temperature);

        let mut transport_options = TransportOptions::new(HttpTransport::new(self.ollama_url.clone()));
        if let Some(secs) = self.timeout_secs {
            transport_options = transport_options.with_timeout(Duration::from_secs(secs));
        }

        Ok((model_options, transport_options))
    }
}
