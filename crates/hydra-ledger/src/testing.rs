//! Test doubles for code that drives the ledger: a fake CLI and a key store.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use hydra_core::{HydraError, Result};
use tempfile::TempDir;

use crate::cli::{LedgerCli, RawTransaction};

pub const SIGNED_CBOR: &str = "84a300d9010281825820";

#[derive(Debug, Clone)]
pub enum CliCall {
    BuildAddress(PathBuf),
    BuildRaw(RawTransaction),
    Sign { signing_key: PathBuf },
}

/// In-process ledger CLI. Addresses are `addr_test1<party>`, where the party is the
/// name of the directory holding the key.
#[derive(Default)]
pub struct FakeCli {
    pub calls: Mutex<Vec<CliCall>>,
    pub fail_sign: bool,
    pub garbage_signed_output: bool,
}

impl FakeCli {
    pub fn address_builds(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, CliCall::BuildAddress(_)))
            .count()
    }

    pub fn built(&self) -> Vec<RawTransaction> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                CliCall::BuildRaw(tx) => Some(tx.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn signing_keys(&self) -> Vec<PathBuf> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                CliCall::Sign { signing_key } => Some(signing_key.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl LedgerCli for FakeCli {
    async fn build_address(&self, payment_vkey: &Path) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push(CliCall::BuildAddress(payment_vkey.to_path_buf()));
        let party = payment_vkey
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        Ok(format!("addr_test1{}", party))
    }

    async fn build_raw(&self, tx: &RawTransaction, out_file: &Path) -> Result<()> {
        self.calls.lock().unwrap().push(CliCall::BuildRaw(tx.clone()));
        tokio::fs::write(out_file, serde_json::to_vec(tx)?).await?;
        Ok(())
    }

    async fn sign(&self, tx_body: &Path, signing_key: &Path, out_file: &Path) -> Result<()> {
        self.calls.lock().unwrap().push(CliCall::Sign {
            signing_key: signing_key.to_path_buf(),
        });
        assert!(tx_body.exists(), "sign called without a body file");

        if self.fail_sign {
            return Err(HydraError::CliFailure {
                command: "cardano-cli transaction sign".to_string(),
                exit_code: Some(1),
                stdout: String::new(),
                stderr: "Command failed: transaction sign".to_string(),
            });
        }

        let body = if self.garbage_signed_output {
            "not json".to_string()
        } else {
            serde_json::json!({
                "type": "Witnessed Tx ConwayEra",
                "description": "Ledger Cddl Format",
                "cborHex": SIGNED_CBOR,
            })
            .to_string()
        };
        tokio::fs::write(out_file, body).await?;
        Ok(())
    }
}

/// Key hex written for `seed`: the seed bytes in hex, zero-padded to 32 bytes.
pub fn key_hex(seed: &str) -> String {
    let mut key: String = seed.bytes().map(|b| format!("{:02x}", b)).collect();
    key.truncate(64);
    format!("{:0<64}", key)
}

/// Head verification key hex of a party created by [`key_store`].
pub fn head_key_hex(party: &str) -> String {
    key_hex(&format!("hydra-{}", party))
}

fn envelope(kind: &str, seed: &str) -> String {
    serde_json::json!({
        "type": kind,
        "description": "",
        "cborHex": format!("5820{}", key_hex(seed)),
    })
    .to_string()
}

/// Key store with full key material for each party.
pub fn key_store(parties: &[&str]) -> TempDir {
    let root = tempfile::tempdir().unwrap();
    for party in parties {
        let dir = root.path().join(party);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("payment.vkey"),
            envelope("PaymentVerificationKeyShelley_ed25519", party),
        )
        .unwrap();
        std::fs::write(
            dir.join("payment.skey"),
            envelope("PaymentSigningKeyShelley_ed25519", party),
        )
        .unwrap();
        std::fs::write(
            dir.join("hydra.vkey"),
            envelope("HydraVerificationKey_ed25519", &format!("hydra-{}", party)),
        )
        .unwrap();
    }
    root
}
