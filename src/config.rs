use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::defs::{Number, DEFAULT_MAX_BALLS};
use crate::error::BingoResult;
use crate::logging::{log_info, log_warning};

pub const SERVER_CONFIG_PATH: &str = "conf/server.conf";
pub const OPERATOR_CONFIG_PATH: &str = "conf/operator.conf";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Session records are kept under `<data_dir>/sessions`
    pub data_dir: PathBuf,
    /// Ball count for sessions created without one
    pub max_balls: Number,
    pub open_play: bool,
}

#[derive(Debug, Clone)]
pub struct OperatorConfig {
    pub host: String,
    pub port: u16,
    pub timeout: u64,
    pub session: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            data_dir: PathBuf::from("data"),
            max_balls: DEFAULT_MAX_BALLS,
            open_play: false,
        }
    }
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            timeout: 30,
            session: "default".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> BingoResult<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self::from_map(&parse_config(&content)))
    }

    fn from_map(config_map: &HashMap<String, String>) -> Self {
        let defaults = Self::default();

        let host = config_map.get("host").cloned().unwrap_or(defaults.host);

        let port = config_map.get("port")
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(defaults.port);

        let data_dir = config_map.get("data_dir")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let max_balls = config_map.get("max_balls")
            .and_then(|m| m.parse::<Number>().ok())
            .filter(|&m| m > 0)
            .unwrap_or(defaults.max_balls);

        let open_play = config_map.get("open_play")
            .and_then(|o| parse_bool(o))
            .unwrap_or(defaults.open_play);

        ServerConfig { host, port, data_dir, max_balls, open_play }
    }

    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::from_file(path) {
            Ok(config) => {
                log_info(&format!("Loaded configuration from {}", path.display()));
                config
            }
            Err(e) => {
                log_warning(&format!("Could not load config from {}: {e}. Using defaults.", path.display()));
                Self::default()
            }
        }
    }
}

impl OperatorConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> BingoResult<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self::from_map(&parse_config(&content)))
    }

    fn from_map(config_map: &HashMap<String, String>) -> Self {
        let defaults = Self::default();

        let host = config_map.get("host").cloned().unwrap_or(defaults.host);

        let port = config_map.get("port")
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(defaults.port);

        let timeout = config_map.get("timeout")
            .and_then(|t| t.parse::<u64>().ok())
            .unwrap_or(defaults.timeout);

        let session = config_map.get("session").cloned().unwrap_or(defaults.session);

        OperatorConfig { host, port, timeout, session }
    }

    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::from_file(path) {
            Ok(config) => {
                log_info(&format!("Loaded operator configuration from {}", path.display()));
                config
            }
            Err(e) => {
                log_warning(&format!("Could not load operator config from {}: {e}. Using defaults.", path.display()));
                Self::default()
            }
        }
    }

    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn parse_config(content: &str) -> HashMap<String, String> {
    let mut config = HashMap::new();

    for line in content.lines() {
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some((key, value)) = line.split_once('=') {
            config.insert(key.trim().to_string(), value.trim().to_string());
        }
    }

    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let content = r#"
            # Draw server
            host = 192.168.1.100
            port = 8080
            # Another comment
            data_dir = /var/lib/bingo
        "#;

        let config = parse_config(content);
        assert_eq!(config.get("host"), Some(&"192.168.1.100".to_string()));
        assert_eq!(config.get("port"), Some(&"8080".to_string()));
        assert_eq!(config.get("data_dir"), Some(&"/var/lib/bingo".to_string()));
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 3000);
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.max_balls, 75);
        assert!(!config.open_play);
    }

    #[test]
    fn test_server_config_from_map() {
        let config = ServerConfig::from_map(&parse_config("port = 9000\nmax_balls = 90\nopen_play = yes\nmax_balls_typo = 3"));
        assert_eq!(config.port, 9000);
        assert_eq!(config.max_balls, 90);
        assert!(config.open_play);
        assert_eq!(config.host, "127.0.0.1");
    }

    #[test]
    fn test_server_config_ignores_bad_values() {
        let config = ServerConfig::from_map(&parse_config("port = lots\nmax_balls = 0\nopen_play = maybe"));
        assert_eq!(config.port, 3000);
        assert_eq!(config.max_balls, 75);
        assert!(!config.open_play);
    }

    #[test]
    fn test_operator_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("operator.conf");
        fs::write(&path, "host = 10.0.0.5\nsession = sunday\ntimeout = 5\n").unwrap();
        let config = OperatorConfig::from_file(&path).unwrap();
        assert_eq!(config.session, "sunday");
        assert_eq!(config.timeout, 5);
        assert_eq!(config.server_url(), "http://10.0.0.5:3000");
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = OperatorConfig::load_or_default("/nonexistent/operator.conf");
        assert_eq!(config.session, "default");
        assert_eq!(config.port, 3000);
    }
}
