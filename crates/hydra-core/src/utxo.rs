//! UTXO types as exposed by a head node's snapshot.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{HydraError, Result};

/// Reference to a transaction output: `txHash#outputIndex`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UtxoRef {
    pub tx_hash: String,
    pub index: u32,
}

impl UtxoRef {
    /// Parse a `txHash#index` reference.
    pub fn parse(input: &str) -> Result<Self> {
        let parts: Vec<&str> = input.split('#').collect();
        let (tx_hash, index) = match parts.as_slice() {
            [hash, index] if !hash.is_empty() && !index.is_empty() => (*hash, *index),
            _ => {
                return Err(HydraError::InvalidInput(format!(
                    "malformed UTXO reference '{}', expected txHash#index",
                    input
                )))
            }
        };

        let index = index.parse::<u32>().map_err(|_| {
            HydraError::InvalidInput(format!(
                "malformed UTXO reference '{}', output index is not a number",
                input
            ))
        })?;

        Ok(Self {
            tx_hash: tx_hash.to_string(),
            index,
        })
    }
}

impl FromStr for UtxoRef {
    type Err = HydraError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for UtxoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.tx_hash, self.index)
    }
}

impl Serialize for UtxoRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for UtxoRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        UtxoRef::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Value held by an output: lovelace plus native asset bundles (policy -> asset -> quantity).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Value {
    pub lovelace: u64,

    #[serde(flatten)]
    pub assets: BTreeMap<String, BTreeMap<String, u64>>,
}

impl Value {
    pub fn lovelace(amount: u64) -> Self {
        Self {
            lovelace: amount,
            assets: BTreeMap::new(),
        }
    }
}

/// A single unspent output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    /// Bech32 address owning the output.
    pub address: String,

    /// Value carried by the output.
    pub value: Value,
}

impl Utxo {
    pub fn new(address: impl Into<String>, lovelace: u64) -> Self {
        Self {
            address: address.into(),
            value: Value::lovelace(lovelace),
        }
    }
}

/// A snapshot of the head ledger keyed by `txHash#index`.
pub type UtxoSet = BTreeMap<String, Utxo>;

/// Sum lovelace per owning address.
pub fn balances_by_address(utxos: &UtxoSet) -> HashMap<String, u64> {
    let mut balances = HashMap::new();
    for utxo in utxos.values() {
        *balances.entry(utxo.address.clone()).or_insert(0) += utxo.value.lovelace;
    }
    balances
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reference() {
        let r = UtxoRef::parse("abc123#1").unwrap();
        assert_eq!(r.tx_hash, "abc123");
        assert_eq!(r.index, 1);
        assert_eq!(r.to_string(), "abc123#1");
    }

    #[test]
    fn test_malformed_references() {
        for bad in ["abc123", "#0", "abc#", "a#b#c", "", "abc#x"] {
            let err = UtxoRef::parse(bad).unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::InvalidInput, "input {:?}", bad);
        }
    }

    #[test]
    fn test_snapshot_parsing_and_balances() {
        let json = serde_json::json!({
            "aa#0": {
                "address": "addr_test1alice",
                "value": { "lovelace": 3_000_000 },
                "datum": null
            },
            "bb#1": {
                "address": "addr_test1alice",
                "value": { "lovelace": 2_000_000, "policy": { "token": 5 } }
            },
            "cc#0": {
                "address": "addr_test1bob",
                "value": { "lovelace": 7_000_000 }
            }
        });

        let set: UtxoSet = serde_json::from_value(json).unwrap();
        assert_eq!(set["bb#1"].value.assets["policy"]["token"], 5);

        let balances = balances_by_address(&set);
        assert_eq!(balances["addr_test1alice"], 5_000_000);
        assert_eq!(balances["addr_test1bob"], 7_000_000);
    }
}
