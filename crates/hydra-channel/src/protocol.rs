//! Head node control-channel messages.

use hydra_core::{HeadAction, HydraError, Result, TextEnvelope};
use serde::{Deserialize, Serialize};

/// Tag of the unsolicited handshake a node sends when a connection opens.
pub const GREETINGS_TAG: &str = "Greetings";

/// Head verification key of another party, as carried by `Init`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyVkey {
    pub vkey: String,
}

/// Command sent by the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tag")]
pub enum ClientCommand {
    /// Initialize a head, optionally naming the other parties.
    Init {
        #[serde(
            rename = "otherParties",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        other_parties: Option<Vec<PartyVkey>>,
    },

    /// Close the open head.
    Close,

    /// Distribute the closed head's UTXO back to the main chain.
    Fanout,

    /// Submit a signed transaction to the open head.
    NewTx { transaction: TextEnvelope },
}

impl ClientCommand {
    /// Build the command for a lifecycle action.
    ///
    /// `other_keys` is only used by `Init`, and only when non-empty.
    pub fn for_action(action: HeadAction, other_keys: Vec<String>) -> Self {
        match action {
            HeadAction::Init => ClientCommand::Init {
                other_parties: (!other_keys.is_empty())
                    .then(|| other_keys.into_iter().map(|vkey| PartyVkey { vkey }).collect()),
            },
            HeadAction::Close => ClientCommand::Close,
            HeadAction::Fanout => ClientCommand::Fanout,
        }
    }

    /// Wrap signed transaction CBOR into a `NewTx`.
    pub fn new_tx(cbor_hex: impl Into<String>, tx_type: impl Into<String>) -> Self {
        ClientCommand::NewTx {
            transaction: TextEnvelope {
                kind: tx_type.into(),
                description: String::new(),
                cbor_hex: cbor_hex.into(),
            },
        }
    }

    /// Protocol tag of the command.
    pub fn tag(&self) -> &'static str {
        match self {
            ClientCommand::Init { .. } => "Init",
            ClientCommand::Close => "Close",
            ClientCommand::Fanout => "Fanout",
            ClientCommand::NewTx { .. } => "NewTx",
        }
    }

    /// Lifecycle action, if this is one. Only lifecycle commands have an HTTP fallback.
    pub fn action(&self) -> Option<HeadAction> {
        match self {
            ClientCommand::Init { .. } => Some(HeadAction::Init),
            ClientCommand::Close => Some(HeadAction::Close),
            ClientCommand::Fanout => Some(HeadAction::Fanout),
            ClientCommand::NewTx { .. } => None,
        }
    }

    /// JSON body for the HTTP fallback, if the command carries any payload.
    pub fn fallback_body(&self) -> Option<serde_json::Value> {
        match self {
            ClientCommand::Init {
                other_parties: Some(parties),
            } => Some(serde_json::json!({ "otherParties": parties })),
            _ => None,
        }
    }
}

/// Message received from a node.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// The handshake.
    Greetings(serde_json::Value),

    /// Anything else carrying a tag.
    Tagged {
        tag: String,
        payload: serde_json::Value,
    },
}

impl ServerMessage {
    /// Parse a text frame. Frames that are not JSON objects with a string `tag` are
    /// protocol errors.
    pub fn parse(text: &str) -> Result<Self> {
        let payload: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| HydraError::Protocol(format!("frame is not JSON: {}", e)))?;

        let tag = payload
            .get("tag")
            .and_then(|t| t.as_str())
            .ok_or_else(|| HydraError::Protocol("frame has no tag".to_string()))?
            .to_string();

        if tag == GREETINGS_TAG {
            Ok(ServerMessage::Greetings(payload))
        } else {
            Ok(ServerMessage::Tagged { tag, payload })
        }
    }
}
