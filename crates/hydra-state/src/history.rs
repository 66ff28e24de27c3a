//! Snapshot history.
//!
//! Each successful snapshot query is recorded per party, newest last, so callers can
//! look at how a party's view of the head ledger evolved.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use hydra_core::{balances_by_address, PartyId, UtxoSet};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Default number of snapshots retained per party.
pub const DEFAULT_HISTORY_DEPTH: usize = 50;

/// A recorded snapshot of one party's view of the head.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// Unique ID for this record.
    pub id: Uuid,

    /// Party whose node produced the snapshot.
    pub party: PartyId,

    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,

    /// The UTXO set.
    pub utxos: UtxoSet,
}

impl SnapshotRecord {
    /// Total lovelace held by an address in this snapshot.
    pub fn balance_of(&self, address: &str) -> u64 {
        balances_by_address(&self.utxos)
            .get(address)
            .copied()
            .unwrap_or(0)
    }

    /// Number of outputs.
    pub fn len(&self) -> usize {
        self.utxos.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.utxos.is_empty()
    }
}

/// Bounded, per-party snapshot history.
#[derive(Clone)]
pub struct SnapshotHistory {
    records: Arc<RwLock<HashMap<PartyId, VecDeque<SnapshotRecord>>>>,
    depth: usize,
}

impl SnapshotHistory {
    /// Create a history retaining at most `depth` snapshots per party.
    pub fn new(depth: usize) -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            depth: depth.max(1),
        }
    }

    /// Record a snapshot, evicting the oldest one past the depth limit.
    pub async fn record(&self, party: &str, utxos: UtxoSet) -> SnapshotRecord {
        let record = SnapshotRecord {
            id: Uuid::new_v4(),
            party: party.to_string(),
            timestamp: Utc::now(),
            utxos,
        };

        let mut records = self.records.write().await;
        let entries = records.entry(party.to_string()).or_default();
        entries.push_back(record.clone());
        while entries.len() > self.depth {
            entries.pop_front();
        }

        tracing::debug!(party = %party, outputs = record.len(), "recorded snapshot");

        record
    }

    /// Most recent snapshot for a party.
    pub async fn latest(&self, party: &str) -> Option<SnapshotRecord> {
        let records = self.records.read().await;
        records.get(party)?.back().cloned()
    }

    /// All retained snapshots for a party, oldest first.
    pub async fn list(&self, party: &str) -> Vec<SnapshotRecord> {
        let records = self.records.read().await;
        records
            .get(party)
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Latest snapshot taken at or before `timestamp`.
    pub async fn at(&self, party: &str, timestamp: DateTime<Utc>) -> Option<SnapshotRecord> {
        let records = self.records.read().await;
        records
            .get(party)?
            .iter()
            .rev()
            .find(|r| r.timestamp <= timestamp)
            .cloned()
    }
}

impl Default for SnapshotHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_DEPTH)
    }
}
