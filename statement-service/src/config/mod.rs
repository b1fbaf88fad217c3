use serde::Deserialize;
use service_core::config::{self as core_config, get_env, get_env_parsed};
use service_core::error::AppError;
use std::env;

/// Gemini REST endpoint used when `GEMINI_API_BASE` is not set.
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default request body cap for uploads (20 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct StatementConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: String,
    pub database: DatabaseConfig,
    pub gemini: GeminiConfig,
    pub rate_limit_per_minute: u32,
    pub max_upload_bytes: usize,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Clone, Deserialize)]
pub struct GeminiConfig {
    pub api_keys: Vec<String>,
    pub model: String,
    pub api_base: String,
    pub timeout_secs: u64,
    pub selection: CredentialSelection,
}

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_keys", &format_args!("[{} redacted]", self.api_keys.len()))
            .field("model", &self.model)
            .field("api_base", &self.api_base)
            .field("timeout_secs", &self.timeout_secs)
            .field("selection", &self.selection)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSelection {
    Random,
    RoundRobin,
}

impl std::str::FromStr for CredentialSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "random" => Ok(CredentialSelection::Random),
            "round_robin" | "round-robin" => Ok(CredentialSelection::RoundRobin),
            _ => Err(format!("Invalid credential selection: {}", s)),
        }
    }
}

impl StatementConfig {
    pub fn load() -> Result<Self, AppError> {
        // Load common config (handles .env and APP__ prefix)
        let common_config = core_config::Config::load()?;

        let environment = core_config::environment();
        let is_prod = environment == "prod";

        Ok(StatementConfig {
            common: common_config,
            environment,
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: get_env_parsed("DATABASE_MAX_CONNECTIONS", 5, is_prod)?,
                min_connections: get_env_parsed("DATABASE_MIN_CONNECTIONS", 1, is_prod)?,
            },
            gemini: GeminiConfig {
                api_keys: api_keys_from_env(),
                model: get_env("GEMINI_MODEL", Some("gemini-2.5-flash-lite"), is_prod)?,
                api_base: get_env("GEMINI_API_BASE", Some(DEFAULT_GEMINI_API_BASE), is_prod)?,
                timeout_secs: get_env_parsed("GEMINI_TIMEOUT_SECS", 300, is_prod)?,
                selection: get_env("CREDENTIAL_SELECTION", Some("random"), is_prod)?
                    .parse()
                    .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
            },
            rate_limit_per_minute: get_env_parsed("RATE_LIMIT_PER_MINUTE", 10, is_prod)?,
            max_upload_bytes: get_env_parsed(
                "MAX_UPLOAD_BYTES",
                DEFAULT_MAX_UPLOAD_BYTES,
                is_prod,
            )?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
        })
    }
}

/// Collect the Gemini credential pool: numbered keys first, then the plain key.
/// Blank and repeated values are ignored.
fn api_keys_from_env() -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    let candidates = (1..=3)
        .map(|i| format!("GOOGLE_API_KEY_{}", i))
        .chain(std::iter::once("GOOGLE_API_KEY".to_string()));

    for name in candidates {
        if let Ok(value) = env::var(&name) {
            let value = value.trim().to_string();
            if !value.is_empty() && !keys.contains(&value) {
                keys.push(value);
            }
        }
    }
    keys
}
