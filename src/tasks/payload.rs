//! Binary Payloads
//!
//! File content attached to a task. In memory the bytes are shared (`Arc<[u8]>`)
//! so a wildcard task fanned out to many inboxes never copies the file. On the
//! wire the payload travels as base64 together with its length and SHA-256
//! digest, and decoding refuses any payload whose bytes do not match.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WirePayload", into = "WirePayload")]
pub struct BinaryPayload {
    bytes: Arc<[u8]>,
    digest: [u8; 32],
}

impl BinaryPayload {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes: Vec<u8> = bytes.into();
        let digest = sha256(&bytes);
        Self {
            bytes: Arc::from(bytes),
            digest,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest)
    }
}

impl fmt::Debug for BinaryPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinaryPayload")
            .field("len", &self.bytes.len())
            .field("sha256", &self.digest_hex())
            .finish()
    }
}

impl From<Vec<u8>> for BinaryPayload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl From<&[u8]> for BinaryPayload {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes.to_vec())
    }
}

/// Serialized form of a `BinaryPayload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WirePayload {
    pub len: usize,
    pub sha256: String,
    pub data: String,
}

impl From<BinaryPayload> for WirePayload {
    fn from(payload: BinaryPayload) -> Self {
        Self {
            len: payload.len(),
            sha256: payload.digest_hex(),
            data: STANDARD.encode(payload.as_bytes()),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("payload is not valid base64: {0}")]
    Encoding(String),
    #[error("payload length mismatch: declared {declared}, decoded {actual}")]
    Length { declared: usize, actual: usize },
    #[error("payload digest mismatch: declared {declared}, computed {actual}")]
    Digest { declared: String, actual: String },
}

impl TryFrom<WirePayload> for BinaryPayload {
    type Error = PayloadError;

    fn try_from(wire: WirePayload) -> Result<Self, Self::Error> {
        let bytes = STANDARD
            .decode(wire.data.as_bytes())
            .map_err(|e| PayloadError::Encoding(e.to_string()))?;

        if bytes.len() != wire.len {
            return Err(PayloadError::Length {
                declared: wire.len,
                actual: bytes.len(),
            });
        }

        let payload = BinaryPayload::new(bytes);
        let actual = payload.digest_hex();
        if !actual.eq_ignore_ascii_case(&wire.sha256) {
            return Err(PayloadError::Digest {
                declared: wire.sha256,
                actual,
            });
        }

        Ok(payload)
    }
}

fn sha256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}
