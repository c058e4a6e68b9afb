//! Environment-driven configuration
//!
//! Everything is optional; unset or unparsable values fall back to defaults
//! with a warning.

use std::path::PathBuf;

use super::constants::{
    DEFAULT_BLOB_DIR, DEFAULT_DB_PATH, DEFAULT_PORT, DEFAULT_RETENTION_DAYS, ENV_BLOB_DIR,
    ENV_DB_PATH, ENV_PORT, ENV_RETENTION_DAYS, ENV_VERBOSE,
};

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub db_path: PathBuf,
    pub blob_dir: PathBuf,
    pub retention_days: u32,
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            blob_dir: PathBuf::from(DEFAULT_BLOB_DIR),
            retention_days: DEFAULT_RETENTION_DAYS,
            verbose: false,
        }
    }
}

impl Config {
    /// Load configuration from the environment
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(port) = std::env::var(ENV_PORT) {
            match port.parse() {
                Ok(port) => config.port = port,
                Err(_) => tracing::warn!(value = %port, "ignoring unparsable {}", ENV_PORT),
            }
        }
        if let Ok(path) = std::env::var(ENV_DB_PATH) {
            config.db_path = PathBuf::from(path);
        }
        if let Ok(dir) = std::env::var(ENV_BLOB_DIR) {
            config.blob_dir = PathBuf::from(dir);
        }
        if let Ok(days) = std::env::var(ENV_RETENTION_DAYS) {
            match days.parse() {
                Ok(days) => config.retention_days = days,
                Err(_) => {
                    tracing::warn!(value = %days, "ignoring unparsable {}", ENV_RETENTION_DAYS)
                }
            }
        }
        if let Ok(flag) = std::env::var(ENV_VERBOSE) {
            config.verbose = parse_flag(&flag);
        }

        config
    }
}

fn parse_flag(s: &str) -> bool {
    matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.port, 4242);
        assert_eq!(config.db_path, PathBuf::from("workshop.db"));
        assert_eq!(config.blob_dir, PathBuf::from("blobs"));
        assert_eq!(config.retention_days, 30);
        assert!(!config.verbose);
    }

    #[test]
    fn test_parse_flag() {
        for on in ["1", "true", "TRUE", "yes", "on"] {
            assert!(parse_flag(on), "{}", on);
        }
        for off in ["0", "false", "no", "off", "", "whatever"] {
            assert!(!parse_flag(off), "{}", off);
        }
    }
}
