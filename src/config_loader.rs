// Configuration loader for Whisper Gateway
//
// This module handles loading configuration from the TOML configuration file
// and environment variables with appropriate precedence.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

use log::{debug, info, warn};
use thiserror::Error;
use toml::Value;

/// Default location of the configuration file
pub const CONFIG_FILE_PATH: &str = "whisper_gateway.conf";

/// Environment variable overriding [`CONFIG_FILE_PATH`]
pub const CONFIG_FILE_ENV: &str = "WHISPER_GATEWAY_CONFIG";

#[derive(Error, Debug)]
pub enum ConfigFileError {
    #[error("Failed to read configuration file: {0}")]
    Read(#[from] std::io::Error),
    #[error("Failed to parse configuration file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from TOML file and environment variables
///
/// Configuration precedence (highest to lowest):
/// 1. Environment variables
/// 2. Configuration file values
/// 3. Default values (not handled here - application defaults)
///
/// # Returns
///
/// Returns true if the config file was successfully loaded, false otherwise
pub fn load_config() -> bool {
    let path = env::var(CONFIG_FILE_ENV).unwrap_or_else(|_| CONFIG_FILE_PATH.to_string());
    let config_path = Path::new(&path);

    if !config_path.exists() {
        debug!("Configuration file not found at: {}", path);
        return false;
    }

    match read_config_file(config_path) {
        Ok(values) => {
            let applied = apply_to_env(values);
            info!(
                "Configuration loaded from {} ({} value(s) applied)",
                path, applied
            );
            true
        }
        Err(e) => {
            warn!("{}", e);
            false
        }
    }
}

/// Reads a flat TOML file into key/value strings
pub fn read_config_file(path: &Path) -> Result<HashMap<String, String>, ConfigFileError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses flat TOML into key/value strings.
///
/// Arrays and tables are skipped with a warning.
pub fn parse_config(content: &str) -> Result<HashMap<String, String>, ConfigFileError> {
    let table: toml::Table = toml::from_str(content)?;
    let mut config_map = HashMap::new();

    for (key, value) in table {
        let value = match value {
            Value::String(s) => s,
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Boolean(b) => b.to_string(),
            _ => {
                warn!("Skipping unsupported TOML value type for key: {}", key);
                continue;
            }
        };
        config_map.insert(key, value);
    }

    Ok(config_map)
}

/// Exports values as environment variables unless already set.
///
/// Returns how many were applied.
pub fn apply_to_env(values: HashMap<String, String>) -> usize {
    let mut applied = 0;
    for (key, value) in values {
        if env::var_os(&key).is_none() {
            debug!("Setting env var from config file: {} = {}", key, value);
            env::set_var(key, value);
            applied += 1;
        } else {
            debug!("Env var already exists, skipping: {}", key);
        }
    }
    applied
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattens_scalar_values() {
        let values = parse_config(
            r#"
WHISPER_MODEL = "small"
MAX_CONCURRENT_JOBS = 4
CACHE_ENABLED = false
RATIO = 0.5
IGNORED = [1, 2]
"#,
        )
        .unwrap();

        assert_eq!(values["WHISPER_MODEL"], "small");
        assert_eq!(values["MAX_CONCURRENT_JOBS"], "4");
        assert_eq!(values["CACHE_ENABLED"], "false");
        assert_eq!(values["RATIO"], "0.5");
        assert!(!values.contains_key("IGNORED"));
    }

    #[test]
    fn rejects_invalid_toml() {
        assert!(matches!(
            parse_config("THIS IS = = NOT TOML"),
            Err(ConfigFileError::Parse(_))
        ));
    }

    #[test]
    fn environment_wins_over_file() {
        env::set_var("WHISPER_GATEWAY_LOADER_SET", "from-env");
        env::remove_var("WHISPER_GATEWAY_LOADER_UNSET");

        let values = HashMap::from([
            ("WHISPER_GATEWAY_LOADER_SET".to_string(), "from-file".to_string()),
            ("WHISPER_GATEWAY_LOADER_UNSET".to_string(), "from-file".to_string()),
        ]);
        assert_eq!(apply_to_env(values), 1);

        assert_eq!(env::var("WHISPER_GATEWAY_LOADER_SET").unwrap(), "from-env");
        assert_eq!(env::var("WHISPER_GATEWAY_LOADER_UNSET").unwrap(), "from-file");

        env::remove_var("WHISPER_GATEWAY_LOADER_SET");
        env::remove_var("WHISPER_GATEWAY_LOADER_UNSET");
    }

    #[test]
    fn reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.conf");
        fs::write(&path, "WHISPER_LANGUAGE = \"fr\"\n").unwrap();

        let values = read_config_file(&path).unwrap();
        assert_eq!(values["WHISPER_LANGUAGE"], "fr");
        assert!(matches!(
            read_config_file(&dir.path().join("missing.conf")),
            Err(ConfigFileError::Read(_))
        ));
    }
}
