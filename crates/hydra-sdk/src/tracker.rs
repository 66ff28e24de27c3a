//! Confirmation tracking.
//!
//! A transfer is considered confirmed once the sender's balance has dropped by at
//! least 90% of the expected amount, or any recipient's balance has risen by at
//! least 10% of it. Fees and rounding make exact matching unreliable. The tracker
//! gives up after a fixed number of polls.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hydra_core::{HydraError, Result};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default delay between two balance reads.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default number of balance reads before giving up.
pub const DEFAULT_MAX_POLLS: u32 = 15;

/// Something that can report lovelace per address.
#[async_trait]
pub trait BalanceSource: Send + Sync {
    async fn balances(&self) -> Result<HashMap<String, u64>>;
}

/// A transfer being watched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingTransaction {
    pub id: Uuid,
    pub from_address: String,
    pub recipients: Vec<String>,
    /// Balances of the sender and recipients when tracking began.
    pub initial_balances: HashMap<String, u64>,
    pub expected_total: u64,
    pub created_at: DateTime<Utc>,
}

impl PendingTransaction {
    fn initial(&self, address: &str) -> u64 {
        self.initial_balances.get(address).copied().unwrap_or(0)
    }

    /// Whether `balances` show the transfer as applied.
    pub fn is_confirmed(&self, balances: &HashMap<String, u64>) -> bool {
        let expected = self.expected_total as u128;
        let current = |address: &str| balances.get(address).copied().unwrap_or(0);

        let sender_drop = self
            .initial(&self.from_address)
            .saturating_sub(current(&self.from_address)) as u128;
        if sender_drop * 10 >= expected * 9 {
            return true;
        }

        self.recipients.iter().any(|recipient| {
            let rise = current(recipient).saturating_sub(self.initial(recipient)) as u128;
            rise * 10 >= expected
        })
    }
}

/// How tracking ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TrackOutcome {
    Confirmed { polls: u32 },
    GaveUp { polls: u32 },
}

/// Polls a [`BalanceSource`] until transfers confirm.
#[derive(Clone)]
pub struct ConfirmationTracker {
    source: Arc<dyn BalanceSource>,
    interval: Duration,
    max_polls: u32,
}

impl ConfirmationTracker {
    pub fn new(source: Arc<dyn BalanceSource>) -> Self {
        Self {
            source,
            interval: DEFAULT_POLL_INTERVAL,
            max_polls: DEFAULT_MAX_POLLS,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_max_polls(mut self, max_polls: u32) -> Self {
        self.max_polls = max_polls;
        self
    }

    /// Record current balances and start polling in the background.
    pub async fn begin_tracking(
        &self,
        from_address: impl Into<String>,
        recipients: Vec<String>,
        expected_total: u64,
    ) -> Result<TrackingHandle> {
        if expected_total == 0 {
            return Err(HydraError::InvalidInput(
                "expected total must be positive".to_string(),
            ));
        }

        let from_address = from_address.into();
        let balances = self.source.balances().await?;
        let initial_balances = std::iter::once(&from_address)
            .chain(recipients.iter())
            .map(|a| (a.clone(), balances.get(a).copied().unwrap_or(0)))
            .collect();

        let pending = PendingTransaction {
            id: Uuid::new_v4(),
            from_address,
            recipients,
            initial_balances,
            expected_total,
            created_at: Utc::now(),
        };
        info!(id = %pending.id, from = %pending.from_address, expected = expected_total, "tracking transfer");

        let task = tokio::spawn(poll(
            self.source.clone(),
            pending.clone(),
            self.interval,
            self.max_polls,
        ));

        Ok(TrackingHandle {
            pending,
            task: Some(task),
        })
    }
}

async fn poll(
    source: Arc<dyn BalanceSource>,
    pending: PendingTransaction,
    interval: Duration,
    max_polls: u32,
) -> TrackOutcome {
    for polls in 1..=max_polls {
        tokio::time::sleep(interval).await;
        match source.balances().await {
            Ok(balances) if pending.is_confirmed(&balances) => {
                info!(id = %pending.id, polls, "transfer confirmed");
                return TrackOutcome::Confirmed { polls };
            }
            Ok(_) => debug!(id = %pending.id, polls, "transfer not yet visible"),
            Err(e) => warn!(id = %pending.id, polls, "balance read failed: {}", e),
        }
    }

    info!(id = %pending.id, polls = max_polls, "giving up on transfer");
    TrackOutcome::GaveUp { polls: max_polls }
}

/// Handle to a running tracker. Dropping it stops polling.
pub struct TrackingHandle {
    pending: PendingTransaction,
    task: Option<JoinHandle<TrackOutcome>>,
}

impl TrackingHandle {
    pub fn id(&self) -> Uuid {
        self.pending.id
    }

    pub fn pending(&self) -> &PendingTransaction {
        &self.pending
    }

    /// Wait until the transfer confirms or the tracker gives up.
    pub async fn wait(mut self) -> Result<TrackOutcome> {
        let task = self
            .task
            .take()
            .ok_or_else(|| HydraError::Internal("tracker already finished".to_string()))?;
        task.await
            .map_err(|e| HydraError::Internal(format!("tracker task failed: {}", e)))
    }

    /// Stop polling.
    pub fn cancel(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for TrackingHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
