//! Common types used across the coordinator.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::HydraError;

/// Identifier of a party, unique per running node (e.g. "alice").
pub type PartyId = String;

/// Number of lovelace in one ADA.
pub const LOVELACE_PER_ADA: u64 = 1_000_000;

/// Lifecycle state of a Hydra head as reported by a party's node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeadStatus {
    /// No head, or the previous head has been finalized and forgotten.
    Idle,
    /// Init posted, waiting for every party to commit.
    Initializing,
    /// Head is open and accepts transactions.
    Open,
    /// Head is open and a snapshot was just confirmed.
    SnapshotConfirmed,
    /// Head was closed, contestation period running.
    Closed,
    /// Contestation is over, fanout can be posted.
    FanoutPossible,
    /// Fanout done.
    Final,
    /// A tag this coordinator does not know.
    Unknown(String),
}

impl HeadStatus {
    /// Map a node-reported tag onto a status.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "Idle" => HeadStatus::Idle,
            "Initializing" | "Initial" | "HeadIsInitializing" => HeadStatus::Initializing,
            "Open" | "HeadIsOpen" => HeadStatus::Open,
            "SnapshotConfirmed" => HeadStatus::SnapshotConfirmed,
            "Closed" | "HeadIsClosed" => HeadStatus::Closed,
            "FanoutPossible" | "ReadyToFanout" => HeadStatus::FanoutPossible,
            "Final" | "HeadIsFinalized" => HeadStatus::Final,
            other => HeadStatus::Unknown(other.to_string()),
        }
    }

    /// Returns true if the head accepts new transactions in this state.
    pub fn accepts_transactions(&self) -> bool {
        matches!(self, HeadStatus::Open | HeadStatus::SnapshotConfirmed)
    }
}

impl fmt::Display for HeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeadStatus::Unknown(tag) => write!(f, "Unknown({})", tag),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Lifecycle command that can be sent to a party's head node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HeadAction {
    Init,
    Close,
    Fanout,
}

impl HeadAction {
    /// Protocol tag of the command.
    pub fn tag(&self) -> &'static str {
        match self {
            HeadAction::Init => "Init",
            HeadAction::Close => "Close",
            HeadAction::Fanout => "Fanout",
        }
    }

    /// Path segment of the HTTP fallback endpoint.
    pub fn path(&self) -> &'static str {
        match self {
            HeadAction::Init => "init",
            HeadAction::Close => "close",
            HeadAction::Fanout => "fanout",
        }
    }
}

impl FromStr for HeadAction {
    type Err = HydraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "init" => Ok(HeadAction::Init),
            "close" => Ok(HeadAction::Close),
            "fanout" => Ok(HeadAction::Fanout),
            other => Err(HydraError::InvalidInput(format!(
                "unsupported head action '{}', expected init, close or fanout",
                other
            ))),
        }
    }
}

impl fmt::Display for HeadAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Render lovelace as a human-readable ADA amount with six decimals.
pub fn format_ada(lovelace: u64) -> String {
    format!(
        "{}.{:06}",
        lovelace / LOVELACE_PER_ADA,
        lovelace % LOVELACE_PER_ADA
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_accepts_transactions() {
        assert!(HeadStatus::Open.accepts_transactions());
        assert!(HeadStatus::SnapshotConfirmed.accepts_transactions());
        assert!(!HeadStatus::Initializing.accepts_transactions());
        assert!(!HeadStatus::Closed.accepts_transactions());
        assert!(!HeadStatus::Unknown("Weird".into()).accepts_transactions());
    }

    #[test]
    fn test_status_from_node_tags() {
        assert_eq!(HeadStatus::from_tag("Initial"), HeadStatus::Initializing);
        assert_eq!(HeadStatus::from_tag("Open"), HeadStatus::Open);
        assert_eq!(
            HeadStatus::from_tag("Nope"),
            HeadStatus::Unknown("Nope".to_string())
        );
    }

    #[test]
    fn test_action_parsing() {
        assert_eq!("init".parse::<HeadAction>().unwrap(), HeadAction::Init);
        assert_eq!("Fanout".parse::<HeadAction>().unwrap(), HeadAction::Fanout);
        let err = "abort".parse::<HeadAction>().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidInput);
        assert_eq!(HeadAction::Close.path(), "close");
    }

    #[test]
    fn test_format_ada() {
        assert_eq!(format_ada(2_500_000), "2.500000");
        assert_eq!(format_ada(5_000_001), "5.000001");
        assert_eq!(format_ada(0), "0.000000");
    }
}
