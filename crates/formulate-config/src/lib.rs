use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config failed: {0}")]
    Read(String),
    #[error("parse config failed: {0}")]
    Parse(String),
    #[error("schema load failed: {0}")]
    SchemaLoad(String),
    #[error("schema validation failed: {0}")]
    SchemaValidation(String),
    #[error("unsupported config: {0}")]
    UnsupportedConfig(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: Server,
    pub completion: Completion,
    #[serde(default)]
    pub requests: Requests,
    #[serde(default)]
    pub logs: Logs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub listen_addr: String,
    #[serde(default = "default_public_dir")]
    pub public_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    pub model: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Upper bound on a single completion call. Absent means wait forever.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Requests {
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    #[serde(default = "default_building_data")]
    pub building_data: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logs {
    #[serde(default = "default_training_data_path")]
    pub training_data_path: String,
    #[serde(default = "default_error_log_path")]
    pub error_log_path: String,
}

impl Default for Requests {
    fn default() -> Self {
        Self {
            max_length: default_max_length(),
            building_data: default_building_data(),
        }
    }
}

impl Default for Logs {
    fn default() -> Self {
        Self {
            training_data_path: default_training_data_path(),
            error_log_path: default_error_log_path(),
        }
    }
}

fn default_public_dir() -> String {
    "./public".to_string()
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_max_length() -> usize {
    250
}

fn default_building_data() -> bool {
    true
}

fn default_training_data_path() -> String {
    "./data.jsonl".to_string()
}

fn default_error_log_path() -> String {
    "./log.txt".to_string()
}

pub fn load_and_validate(path: &str) -> Result<Config, ConfigError> {
    let config_text =
        std::fs::read_to_string(path).map_err(|e| ConfigError::Read(e.to_string()))?;
    let value: serde_yaml::Value =
        serde_yaml::from_str(&config_text).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let instance = serde_json::to_value(value).map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate_against_schema(&instance)?;

    let cfg: Config =
        serde_json::from_value(instance).map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate_runtime_support(&cfg)?;
    Ok(cfg)
}

pub fn resolve_api_key(completion: &Completion) -> Result<String, ConfigError> {
    let _ = dotenvy::dotenv();
    match std::env::var(&completion.api_key_env) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::UnsupportedConfig(format!(
            "completion credential missing: set {}",
            completion.api_key_env
        ))),
    }
}

fn validate_against_schema(instance: &serde_json::Value) -> Result<(), ConfigError> {
    let schema_path = [
        std::path::PathBuf::from("config/config.schema.json"),
        std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../..")
            .join("config/config.schema.json"),
    ]
    .into_iter()
    .find(|p| p.exists())
    .ok_or_else(|| {
        ConfigError::SchemaLoad(
            "config schema not found at config/config.schema.json or workspace config path"
                .to_string(),
        )
    })?;

    let schema_text =
        std::fs::read_to_string(schema_path).map_err(|e| ConfigError::SchemaLoad(e.to_string()))?;
    let schema: serde_json::Value =
        serde_json::from_str(&schema_text).map_err(|e| ConfigError::SchemaLoad(e.to_string()))?;

    let validator =
        jsonschema::validator_for(&schema).map_err(|e| ConfigError::SchemaLoad(e.to_string()))?;
    if let Err(first) = validator.validate(instance) {
        return Err(ConfigError::SchemaValidation(first.to_string()));
    }
    Ok(())
}

fn validate_runtime_support(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.requests.max_length == 0 {
        return Err(ConfigError::UnsupportedConfig(
            "requests.max_length must be >= 1".to_string(),
        ));
    }
    if cfg.completion.model.trim().is_empty() {
        return Err(ConfigError::UnsupportedConfig(
            "completion.model is required".to_string(),
        ));
    }
    if cfg.completion.timeout_ms == Some(0) {
        return Err(ConfigError::UnsupportedConfig(
            "completion.timeout_ms must be >= 1 when set".to_string(),
        ));
    }
    if cfg.logs.error_log_path.trim().is_empty() {
        return Err(ConfigError::UnsupportedConfig(
            "logs.error_log_path is required".to_string(),
        ));
    }
    if cfg.requests.building_data && cfg.logs.training_data_path.trim().is_empty() {
        return Err(ConfigError::UnsupportedConfig(
            "logs.training_data_path is required when requests.building_data=true".to_string(),
        ));
    }
    Ok(())
}
