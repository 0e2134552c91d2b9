use thiserror::Error;

use helphub_store::StoreError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Keystore error: {0}")]
    Keystore(String),

    #[error("TLS configuration error: {0}")]
    Tls(String),

    #[error("Failed to bind {listener} listener on port {port}: {source}")]
    Bind {
        listener: &'static str,
        port: u16,
        source: std::io::Error,
    },

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
