use std::path::PathBuf;
use std::time::Duration;

use helphub_proto::constants::{
    DEFAULT_ADMIN_PORT, DEFAULT_CONNECTION_TIMEOUT_MS, DEFAULT_FRAMED_PORT, DEFAULT_HTTP_PORT,
};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub framed_port: u16,
    pub http_port: u16,
    pub admin_port: u16,
    /// Idle cutoff for framed sessions; also the sweep period.
    pub connection_timeout: Duration,
    pub data_dir: PathBuf,
    pub keystore_path: PathBuf,
    pub webapp_dir: PathBuf,
    pub message_log_path: PathBuf,
    /// Control-plane shared secret. `None` or empty rejects every request.
    pub admin_password: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            framed_port: DEFAULT_FRAMED_PORT,
            http_port: DEFAULT_HTTP_PORT,
            admin_port: DEFAULT_ADMIN_PORT,
            connection_timeout: Duration::from_millis(DEFAULT_CONNECTION_TIMEOUT_MS),
            data_dir: PathBuf::from("data"),
            keystore_path: PathBuf::from("helphub.keystore"),
            webapp_dir: PathBuf::from("webapp"),
            message_log_path: PathBuf::from("logs/messages.log"),
            admin_password: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("FRAMED_PORT") {
            match val.parse::<u16>() {
                Ok(port) => config.framed_port = port,
                Err(_) => tracing::warn!(value = %val, "Invalid FRAMED_PORT, using default"),
            }
        }

        if let Ok(val) = std::env::var("HTTP_PORT") {
            match val.parse::<u16>() {
                Ok(port) => config.http_port = port,
                Err(_) => tracing::warn!(value = %val, "Invalid HTTP_PORT, using default"),
            }
        }

        if let Ok(val) = std::env::var("ADMIN_PORT") {
            match val.parse::<u16>() {
                Ok(port) => config.admin_port = port,
                Err(_) => tracing::warn!(value = %val, "Invalid ADMIN_PORT, using default"),
            }
        }

        if let Ok(val) = std::env::var("CONNECTION_TIMEOUT_MS") {
            match val.parse::<u64>() {
                Ok(ms) if ms > 0 => config.connection_timeout = Duration::from_millis(ms),
                _ => {
                    tracing::warn!(value = %val, "Invalid CONNECTION_TIMEOUT_MS, using default")
                }
            }
        }

        if let Ok(path) = std::env::var("DATA_DIR") {
            config.data_dir = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("KEYSTORE_PATH") {
            config.keystore_path = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("WEBAPP_DIR") {
            config.webapp_dir = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("MESSAGE_LOG_PATH") {
            config.message_log_path = PathBuf::from(path);
        }

        if let Ok(password) = std::env::var("ADMIN_PASSWORD") {
            if !password.is_empty() {
                config.admin_password = Some(password);
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ports_match_protocol_constants() {
        let config = ServerConfig::default();
        assert_eq!(config.framed_port, 5000);
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.admin_port, 5001);
        assert_eq!(config.connection_timeout, Duration::from_millis(45_000));
    }

    #[test]
    fn default_paths() {
        let config = ServerConfig::default();
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.keystore_path, PathBuf::from("helphub.keystore"));
        assert!(config.admin_password.is_none());
    }
}
