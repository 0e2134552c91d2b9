//! Keystore loading for the framed listener.
//!
//! The keystore is a PEM bundle holding the server certificate chain and a
//! PKCS#8 private key. The key is normally encrypted (PBES2); it is
//! unlocked with the `KEYSTORE_PASSWORD` passphrase at startup. The file is
//! never written by the server.

use std::path::Path;

use pkcs8::EncryptedPrivateKeyInfo;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tracing::debug;

use crate::error::ServerError;

/// Load `keystore_path` and build the rustls server configuration.
pub fn load_server_config(
    keystore_path: &Path,
    passphrase: &str,
) -> Result<rustls::ServerConfig, ServerError> {
    let bytes = std::fs::read(keystore_path).map_err(|e| {
        ServerError::Keystore(format!(
            "cannot read keystore '{}': {e}",
            keystore_path.display()
        ))
    })?;

    let blocks = pem::parse_many(&bytes)
        .map_err(|e| ServerError::Keystore(format!("keystore is not valid PEM: {e}")))?;

    let mut certs: Vec<CertificateDer<'static>> = Vec::new();
    let mut key: Option<PrivateKeyDer<'static>> = None;

    for block in blocks {
        match block.tag() {
            "CERTIFICATE" => {
                certs.push(CertificateDer::from(block.into_contents()));
            }
            "ENCRYPTED PRIVATE KEY" => {
                let info = EncryptedPrivateKeyInfo::try_from(block.contents()).map_err(|e| {
                    ServerError::Keystore(format!("malformed encrypted private key: {e}"))
                })?;
                let document = info.decrypt(passphrase).map_err(|_| {
                    ServerError::Keystore(
                        "failed to unlock private key; check KEYSTORE_PASSWORD".to_string(),
                    )
                })?;
                key = Some(PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
                    document.as_bytes().to_vec(),
                )));
            }
            "PRIVATE KEY" => {
                // Unencrypted keystores are accepted for lab setups.
                key = Some(PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
                    block.into_contents(),
                )));
            }
            other => {
                debug!(tag = other, "ignoring unrecognized PEM block in keystore");
            }
        }
    }

    if certs.is_empty() {
        return Err(ServerError::Keystore(
            "keystore contains no certificate".to_string(),
        ));
    }
    let key = key.ok_or_else(|| {
        ServerError::Keystore("keystore contains no private key".to_string())
    })?;

    rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ServerError::Tls(format!("invalid certificate/key pair: {e}")))
}
