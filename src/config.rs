//! Configuration loading and validation.

use crate::error::{ConfigError, Result};
use std::net::SocketAddr;

/// tipscout configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Shared secret callers present as `Authorization: Bearer <secret>`.
    pub service_api_key: String,

    /// Address the HTTP server binds to.
    pub bind: SocketAddr,

    /// Messaging network session settings.
    pub telegram: TelegramConfig,

    /// Object store settings for uploaded media.
    pub storage: StorageConfig,

    /// Language-model provider settings.
    pub llm: LlmConfig,

    /// History collection tuning.
    pub collector: CollectorConfig,
}

/// Pre-authorized messaging session.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub api_id: i64,
    pub api_hash: String,
    pub session_string: String,

    /// Base URL of the MTProto gateway that hosts the session.
    pub gateway_url: String,
}

/// Object store configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Storage endpoint, e.g. `https://<project>.supabase.co`.
    pub endpoint: String,

    /// Service key used for uploads.
    pub key: String,

    pub bucket: String,

    /// Logical folder inside the bucket that uploads land in.
    pub folder: String,
}

/// LLM provider configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,

    /// OpenAI-compatible base URL (without the `/v1` suffix).
    pub base_url: String,

    /// Model used for classification.
    pub model: String,
}

/// Collector limits.
#[derive(Debug, Clone, Copy)]
pub struct CollectorConfig {
    /// Messages requested per history fetch.
    pub batch_size: usize,

    /// Upper bound on messages inspected per channel in one request.
    pub max_messages: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_messages: 500,
        }
    }
}

const DEFAULT_BIND: &str = "0.0.0.0:8000";
const DEFAULT_GATEWAY_URL: &str = "http://127.0.0.1:8081";
const DEFAULT_STORAGE_FOLDER: &str = "tips";
const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_MODEL: &str = "gpt-4o";

impl Config {
    /// Load configuration from the process environment.
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let present = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let required = |key: &str| -> std::result::Result<String, ConfigError> {
            present(key).ok_or_else(|| ConfigError::MissingKey(key.into()))
        };
        let optional =
            |key: &str, default: &str| -> String { present(key).unwrap_or_else(|| default.into()) };

        let api_id_raw = required("TELEGRAM_API_ID")?;
        let api_id = parse_value::<i64>("TELEGRAM_API_ID", &api_id_raw)?;

        let telegram = TelegramConfig {
            api_id,
            api_hash: required("TELEGRAM_API_HASH")?,
            session_string: required("TELEGRAM_SESSION_STRING")?,
            gateway_url: optional("TELEGRAM_GATEWAY_URL", DEFAULT_GATEWAY_URL),
        };

        let storage = StorageConfig {
            endpoint: required("STORAGE_ENDPOINT")?,
            key: required("STORAGE_KEY")?,
            bucket: required("STORAGE_BUCKET")?,
            folder: optional("STORAGE_FOLDER", DEFAULT_STORAGE_FOLDER),
        };

        let llm = LlmConfig {
            api_key: required("OPENAI_API_KEY")?,
            base_url: optional("OPENAI_BASE_URL", DEFAULT_LLM_BASE_URL),
            model: optional("TIPSCOUT_MODEL", DEFAULT_MODEL),
        };

        let defaults = CollectorConfig::default();
        let collector = CollectorConfig {
            batch_size: match present("TIPSCOUT_BATCH_SIZE") {
                Some(raw) => parse_positive("TIPSCOUT_BATCH_SIZE", &raw)?,
                None => defaults.batch_size,
            },
            max_messages: match present("TIPSCOUT_MAX_MESSAGES") {
                Some(raw) => parse_positive("TIPSCOUT_MAX_MESSAGES", &raw)?,
                None => defaults.max_messages,
            },
        };

        let bind_raw = optional("TIPSCOUT_BIND", DEFAULT_BIND);
        let bind = parse_value::<SocketAddr>("TIPSCOUT_BIND", &bind_raw)?;

        Ok(Self {
            service_api_key: required("TELEGRAM_SERVICE_API_KEY")?,
            bind,
            telegram,
            storage,
            llm,
            collector,
        })
    }
}

fn parse_value<T>(key: &str, raw: &str) -> std::result::Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|error| ConfigError::InvalidValue {
            key: key.into(),
            reason: error.to_string(),
        })
}

fn parse_positive(key: &str, raw: &str) -> std::result::Result<usize, ConfigError> {
    let value = parse_value::<usize>(key, raw)?;
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            key: key.into(),
            reason: "must be greater than zero".into(),
        });
    }
    Ok(value)
}
