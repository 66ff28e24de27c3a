//! # Hydra Core
//!
//! Core types shared by every crate of the Hydra head coordinator.
//!
//! This crate provides the fundamental building blocks:
//! - [`HeadStatus`] / [`HeadAction`] - Head lifecycle as observed and driven by a party
//! - [`Utxo`] / [`UtxoRef`] - Head ledger entries and their references
//! - [`TextEnvelope`] - The on-disk key and transaction envelope
//! - [`TxBuildRequest`] / [`SignedTransaction`] - Transaction pipeline input and output
//! - [`HydraError`] - Error taxonomy

pub mod error;
pub mod keys;
pub mod tx;
pub mod types;
pub mod utxo;

// Re-exports for convenience
pub use error::{ErrorKind, HydraError, Result};
pub use keys::{extract_key_hex, TextEnvelope};
pub use tx::{split_amount, SignedTransaction, TxBuildRequest};
pub use types::*;
pub use utxo::{balances_by_address, Utxo, UtxoRef, UtxoSet, Value};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::error::{ErrorKind, HydraError, Result};
    pub use crate::types::{format_ada, HeadAction, HeadStatus, PartyId, LOVELACE_PER_ADA};
    pub use crate::keys::TextEnvelope;
    pub use crate::tx::{SignedTransaction, TxBuildRequest};
    pub use crate::utxo::{Utxo, UtxoRef, UtxoSet, Value};
}
