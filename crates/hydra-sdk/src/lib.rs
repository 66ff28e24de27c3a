//! # Hydra SDK
//!
//! Client for the coordinator API, plus a tracker that watches balances until a
//! submitted transfer shows up in the head.

pub mod client;
pub mod tracker;

pub use client::{CoordinatorClient, HeadActionResult, PartyInfo};
pub use tracker::{
    BalanceSource, ConfirmationTracker, PendingTransaction, TrackOutcome, TrackingHandle,
};

/// Prelude module for common imports.
pub mod prelude {
    pub use crate::client::CoordinatorClient;
    pub use crate::tracker::{BalanceSource, ConfirmationTracker, TrackOutcome};
    pub use hydra_core::prelude::*;
}
