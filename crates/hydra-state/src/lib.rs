//! # Hydra State
//!
//! Explicitly owned stores shared by concurrent requests: the party address cache,
//! the head-status cache and the snapshot history.

pub mod history;
pub mod store;

pub use history::{SnapshotHistory, SnapshotRecord};
pub use store::{AddressStore, InMemoryRepository, Repository, StatusStore};
