//! Text envelopes used by Cardano key and transaction files.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HydraError, Result};

/// CBOR header of a 32-byte bytestring.
const CBOR_BYTES32_PREFIX: &str = "5820";

/// JSON envelope written by the ledger CLI for keys and transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEnvelope {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub description: String,

    #[serde(rename = "cborHex")]
    pub cbor_hex: String,
}

impl TextEnvelope {
    /// Read and parse an envelope from disk.
    pub async fn read(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        Self::parse(&raw)
    }

    /// Parse an envelope, rejecting anything without a `cborHex` field.
    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| {
            HydraError::MalformedCliOutput(format!("expected a text envelope with cborHex: {}", e))
        })
    }

    /// Raw key hex with the CBOR header removed.
    pub fn key_hex(&self) -> &str {
        extract_key_hex(&self.cbor_hex)
    }

    /// Decode the CBOR payload into bytes.
    pub fn cbor_bytes(&self) -> Result<Vec<u8>> {
        hex::decode(&self.cbor_hex)
            .map_err(|e| HydraError::MalformedCliOutput(format!("cborHex is not valid hex: {}", e)))
    }
}

/// Strip the 2-byte CBOR length prefix from a key's `cborHex`.
///
/// Input without the prefix is returned unchanged.
pub fn extract_key_hex(cbor_hex: &str) -> &str {
    cbor_hex.strip_prefix(CBOR_BYTES32_PREFIX).unwrap_or(cbor_hex)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "d1f0a0b5c2e3f4a5b6c7d8e9f0a1b2c3d4e5f6a7b8c9d0e1f2a3b4c5d6e7f8a9";

    #[test]
    fn test_extract_strips_prefix() {
        let cbor = format!("5820{}", KEY);
        let key = extract_key_hex(&cbor);
        assert_eq!(key.len(), 64);
        assert_eq!(key, &cbor[4..]);
    }

    #[test]
    fn test_extract_passes_through_unprefixed() {
        assert_eq!(extract_key_hex(KEY), KEY);
        assert_eq!(extract_key_hex("abcd"), "abcd");
    }

    #[test]
    fn test_envelope_parse() {
        let raw = format!(
            r#"{{"type":"HydraVerificationKey_ed25519","description":"","cborHex":"5820{}"}}"#,
            KEY
        );
        let envelope = TextEnvelope::parse(&raw).unwrap();
        assert_eq!(envelope.key_hex(), KEY);
        assert_eq!(envelope.cbor_bytes().unwrap().len(), 34);

        let err = TextEnvelope::parse(r#"{"type":"Tx"}"#).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::MalformedCliOutput);
    }

    #[tokio::test]
    async fn test_read_missing_file_is_io_error() {
        let err = TextEnvelope::read(Path::new("/definitely/not/here.vkey"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Io);
    }
}
