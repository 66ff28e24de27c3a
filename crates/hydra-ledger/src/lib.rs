//! # Hydra Ledger
//!
//! Everything that touches key material and the ledger CLI:
//! - [`LedgerCli`] - External ledger CLI interface, with a subprocess implementation
//! - [`PartyDirectory`] - Party key store, address cache and ownership resolution
//! - [`TxPipeline`] - Raw transaction build, sign and extraction

pub mod cli;
pub mod directory;
pub mod pipeline;

pub use cli::{CardanoCli, LedgerCli, RawTransaction, TxOutput};
pub use directory::{check_party_id, OwnerResolution, PartyDirectory, PartyKeys};
pub use pipeline::TxPipeline;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
