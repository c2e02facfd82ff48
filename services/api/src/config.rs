use mot_core::{Provider, StagePolicy};
use secrecy::SecretString;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub provider: Provider,
    /// Credential for `provider`; `None` only for the scripted backend.
    pub api_key: Option<SecretString>,
    pub chat_model: String,
    pub api_base: String,
    pub log_level: Level,
    /// Directory of prompt overrides; built-in prompts are used when unset.
    pub prompts_path: Option<PathBuf>,
    /// `None` when `CALL_TIMEOUT_SECS=0`.
    pub call_timeout: Option<Duration>,
    pub stage_policy: StagePolicy,
    /// Idle time after which a session is evicted; `None` when
    /// `SESSION_IDLE_SECS=0`.
    pub session_idle_limit: Option<Duration>,
}

fn invalid(var: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue(var.to_string(), reason.into())
}

/// Reads a duration in whole seconds, where `0` means "no limit".
fn optional_secs(var: &str, default_secs: u64) -> Result<Option<Duration>, ConfigError> {
    let secs = match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))?,
        Err(_) => default_secs,
    };
    Ok((secs > 0).then(|| Duration::from_secs(secs)))
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| invalid("BIND_ADDRESS", e.to_string()))?;

        let provider = std::env::var("TRAINER_PROVIDER")
            .unwrap_or_else(|_| "openai".to_string())
            .parse::<Provider>()
            .map_err(|e| invalid("TRAINER_PROVIDER", e))?;

        let key_var = match provider {
            Provider::OpenAI => Some("OPENAI_API_KEY"),
            Provider::Gemini => Some("GEMINI_API_KEY"),
            Provider::DeepSeek => Some("DEEPSEEK_API_KEY"),
            Provider::Scripted => None,
        };
        let api_key = match key_var {
            Some(var) => {
                let key = std::env::var(var)
                    .ok()
                    .filter(|k| !k.trim().is_empty())
                    .ok_or_else(|| {
                        ConfigError::MissingVar(format!(
                            "{} must be set for '{}' provider",
                            var, provider
                        ))
                    })?;
                Some(SecretString::from(key))
            }
            None => None,
        };

        let chat_model = std::env::var("CHAT_MODEL")
            .unwrap_or_else(|_| provider.default_model().to_string());
        let api_base = std::env::var("API_BASE")
            .unwrap_or_else(|_| provider.default_api_base().to_string());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            invalid(
                "RUST_LOG",
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let prompts_path = std::env::var("PROMPTS_PATH").ok().map(PathBuf::from);

        let call_timeout = optional_secs("CALL_TIMEOUT_SECS", 60)?;
        let session_idle_limit = optional_secs("SESSION_IDLE_SECS", 3600)?;

        let stage_policy = match std::env::var("STAGE_THRESHOLDS") {
            Ok(raw) => raw
                .parse::<StagePolicy>()
                .map_err(|e| invalid("STAGE_THRESHOLDS", e))?,
            Err(_) => StagePolicy::default(),
        };

        Ok(Self {
            bind_address,
            provider,
            api_key,
            chat_model,
            api_base,
            log_level,
            prompts_path,
            call_timeout,
            stage_policy,
            session_idle_limit,
        })
    }
}
