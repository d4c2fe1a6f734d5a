//! Carelabel configuration. Fixed prompt-pipeline constants live here next to
//! the runtime `Settings`, which are layered from defaults, an optional TOML
//! file and the environment.

use config::builder::DefaultState;
use config::{ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::env;
use thiserror::Error;

/// Model used for both inference steps unless overridden
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default base URL of the chat completion API
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Output token budget of the relevance check. Only a one word answer is
/// expected
pub const VALIDATION_MAX_TOKENS: u32 = 50;

/// Output token budget of the advisory, enough for five short bullets
pub const ADVISORY_MAX_TOKENS: u32 = 200;

/// Returned when the relevance check does not answer "valid"
pub const INVALID_IMAGE_MESSAGE: &str = "Sorry, no valid laundry care symbols are identified.";

/// Name of the multipart field carrying the upload
pub const UPLOAD_FIELD: &str = "file";

/// Default largest accepted upload (20 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Config file looked up in the working directory
pub const CONFIG_FILE: &str = "carelabel.toml";

const ENV_PREFIX: &str = "CARELABEL";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("OPENAI_API_KEY not found in environment variables")]
    MissingApiKey,

    #[error(transparent)]
    Source(#[from] config::ConfigError),
}

/// Runtime settings of the service
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub inference: InferenceSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
}

#[derive(Clone, Deserialize)]
pub struct InferenceSettings {
    #[serde(default)]
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: Option<u64>,
}

impl std::fmt::Debug for InferenceSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "InferenceSettings {{ api_key: <redacted>, base_url: {:?}, model: {:?}, timeout_secs: {:?} }}",
            self.base_url, self.model, self.timeout_secs
        )
    }
}

impl ServerSettings {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Settings {
    /// Load settings from `carelabel.toml` (or `$CARELABEL_CONFIG`), the
    /// `CARELABEL__*` variables, `PORT` and `OPENAI_API_KEY`
    pub fn load() -> Result<Self, SettingsError> {
        let file = env::var("CARELABEL_CONFIG").unwrap_or_else(|_| CONFIG_FILE.to_string());

        let builder = Self::defaults()?
            .add_source(File::with_name(&file).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            );

        Self::from_builder(builder, |key| env::var(key).ok())
    }

    /// The built-in defaults, before any file or environment source
    pub fn defaults() -> Result<ConfigBuilder<DefaultState>, SettingsError> {
        Ok(config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8000_i64)?
            .set_default("server.max_upload_bytes", DEFAULT_MAX_UPLOAD_BYTES as i64)?
            .set_default("inference.base_url", DEFAULT_BASE_URL)?
            .set_default("inference.model", DEFAULT_MODEL)?)
    }

    /// Apply the conventional `PORT` and `OPENAI_API_KEY` variables on top of
    /// `builder` and validate the result
    pub fn from_builder<F>(
        mut builder: ConfigBuilder<DefaultState>,
        lookup: F,
    ) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            builder = builder.set_override("server.port", port)?;
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            builder = builder.set_override("inference.api_key", key)?;
        }

        let settings: Settings = builder.build()?.try_deserialize()?;
        if settings.inference.api_key.trim().is_empty() {
            return Err(SettingsError::MissingApiKey);
        }

        Ok(settings)
    }
}
