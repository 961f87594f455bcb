use serde::{Deserialize, Deserializer};
use std::fs;
use std::path::Path;

use crate::db::services::parse_truthy;
use crate::notifications::render::ContentFormat;

#[derive(Deserialize, Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,

    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default)]
    pub debug_force_notify_on_empty: bool,

    #[serde(default)]
    pub webhook_content_format: ContentFormat,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct PartialServerConfig {
    database_url: Option<String>,
    listen_addr: Option<String>,
    log_dir: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    debug_force_notify_on_empty: Option<bool>,
    webhook_content_format: Option<ContentFormat>,
}

// TOML carries real booleans, the environment only strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Text(String),
}

fn deserialize_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Some(match Flag::deserialize(deserializer)? {
        Flag::Bool(value) => value,
        Flag::Text(text) => parse_truthy(&text),
    }))
}

fn default_listen_addr() -> String {
    "0.0.0.0:8001".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl ServerConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self, String> {
        dotenv::dotenv().ok();

        let file_config = match config_path {
            Some(path) => Self::read_file(Path::new(path))?,
            None => PartialServerConfig::default(),
        };

        let env_config: PartialServerConfig = envy::from_env::<PartialServerConfig>()
            .map_err(|e| format!("Failed to load config from environment: {e}"))?;

        Self::merge(env_config, file_config)
    }

    fn read_file(path: &Path) -> Result<PartialServerConfig, String> {
        if !path.exists() {
            return Ok(PartialServerConfig::default());
        }
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file at {path:?}: {e}"))?;
        toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse TOML from config file at {path:?}: {e}"))
    }

    // Environment overrides file.
    fn merge(env: PartialServerConfig, file: PartialServerConfig) -> Result<Self, String> {
        Ok(ServerConfig {
            database_url: env
                .database_url
                .or(file.database_url)
                .ok_or("DATABASE_URL is required")?,
            listen_addr: env
                .listen_addr
                .or(file.listen_addr)
                .unwrap_or_else(default_listen_addr),
            log_dir: env.log_dir.or(file.log_dir).unwrap_or_else(default_log_dir),
            debug_force_notify_on_empty: env
                .debug_force_notify_on_empty
                .or(file.debug_force_notify_on_empty)
                .unwrap_or(false),
            webhook_content_format: env
                .webhook_content_format
                .or(file.webhook_content_format)
                .unwrap_or_default(),
        })
    }
}
