//! Transaction build requests and their signed results.

use serde::{Deserialize, Serialize};

use crate::error::{HydraError, Result};
use crate::types::PartyId;
use crate::utxo::Utxo;

/// Request to move (all or half of) one UTXO to another party.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxBuildRequest {
    /// Party the caller believes owns the UTXO.
    pub from_party: PartyId,

    /// Recipient party.
    pub to_party: PartyId,

    /// `txHash#index` of the UTXO to spend.
    pub utxo_ref: String,

    /// The UTXO as seen in the caller's snapshot.
    pub utxo: Utxo,

    /// Recipient address used only when `to_party` has no resolvable address.
    #[serde(default)]
    pub target_address: Option<String>,

    /// Send half and return the rest to the owner.
    #[serde(default)]
    pub send_half: bool,
}

/// Signed transaction plus bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedTransaction {
    /// Canonical CBOR of the signed transaction, hex encoded.
    pub cbor_hex: String,

    /// Envelope type reported by the CLI.
    pub tx_type: String,

    /// Party whose key signed.
    pub actual_owner: PartyId,

    /// False when the owner was assumed rather than matched by address.
    pub owner_verified: bool,

    /// Address the payment output goes to.
    pub target_address: String,

    pub send_lovelace: u64,
    pub change_lovelace: u64,
    pub send_ada: String,
    pub change_ada: Option<String>,
}

impl SignedTransaction {
    /// Raw transaction bytes.
    pub fn bytes(&self) -> Result<Vec<u8>> {
        hex::decode(&self.cbor_hex).map_err(|e| {
            HydraError::MalformedCliOutput(format!("signed cborHex is not valid hex: {}", e))
        })
    }
}

/// Split a UTXO's value into (payment, change).
///
/// Half sends round down; the remainder goes to change.
pub fn split_amount(total: u64, send_half: bool) -> (u64, u64) {
    if send_half {
        let send = total / 2;
        (send, total - send)
    } else {
        (total, 0)
    }
}
