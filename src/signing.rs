//! # Signing Oracle
//!
//! Request signing for providers that authenticate with a signed custom
//! header set. The oracle is an opaque seam: the gateway only depends on the
//! [`Signer`] trait, and the default implementation is an HMAC-SHA256 MAC
//! over the request's nonce, timestamp, device id and content.
//!
//! Signers must be safe to invoke concurrently from many pipelines; the
//! trait requires `Send + Sync` and implementations hold no mutable state.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Signing oracle failures. Fatal for the request being signed, never for
/// the process.
#[derive(Debug, Error)]
pub enum SigningError {
    #[error("signing key is empty or invalid")]
    InvalidKey,
    #[error("signing failed: {0}")]
    Failed(String),
}

/// Opaque signature producer: `(nonce, timestamp, device_id, content) -> signature`.
pub trait Signer: Send + Sync {
    fn sign(
        &self,
        nonce: &str,
        timestamp: u64,
        device_id: &str,
        content: &str,
    ) -> Result<String, SigningError>;
}

/// Default oracle: HMAC-SHA256 keyed by a shared secret, hex-encoded output.
/// The MAC input concatenates the four fields in a fixed order so the
/// backend can recompute it.
pub struct HmacSigner {
    key: Vec<u8>,
}

impl HmacSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, SigningError> {
        let key = secret.as_ref().to_vec();
        if key.is_empty() {
            return Err(SigningError::InvalidKey);
        }
        Ok(Self { key })
    }
}

impl Signer for HmacSigner {
    fn sign(
        &self,
        nonce: &str,
        timestamp: u64,
        device_id: &str,
        content: &str,
    ) -> Result<String, SigningError> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| SigningError::Failed(e.to_string()))?;
        mac.update(nonce.as_bytes());
        mac.update(timestamp.to_string().as_bytes());
        mac.update(device_id.as_bytes());
        mac.update(content.as_bytes());

        let digest = mac.finalize().into_bytes();
        Ok(to_hex(&digest))
    }
}

/// Placeholder signer for deployments whose providers never sign. Invoking
/// it is a configuration bug and fails accordingly.
pub struct UnconfiguredSigner;

impl Signer for UnconfiguredSigner {
    fn sign(
        &self,
        _nonce: &str,
        _timestamp: u64,
        _device_id: &str,
        _content: &str,
    ) -> Result<String, SigningError> {
        Err(SigningError::Failed(
            "no signing secret configured".to_string(),
        ))
    }
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(out, "{:02x}", b);
    }
    out
}
