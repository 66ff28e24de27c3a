//! Balance endpoint.

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    Json,
};
use hydra_core::{balances_by_address, format_ada, HydraError, PartyId};
use serde::{Deserialize, Serialize};

use super::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    /// Party whose snapshot is read. Defaults to the first configured party.
    pub party: Option<PartyId>,
}

#[derive(Debug, Serialize)]
pub struct BalanceEntry {
    pub lovelace: u64,
    pub ada: String,
}

#[derive(Debug, Serialize)]
pub struct BalancesResponse {
    pub party: PartyId,
    pub balances: HashMap<String, BalanceEntry>,
}

/// Lovelace held per address in a party's current snapshot.
pub async fn get_balances(
    State(state): State<AppState>,
    Query(query): Query<BalanceQuery>,
) -> ApiResult<BalancesResponse> {
    let party = match query.party {
        Some(party) => party,
        None => state
            .config
            .parties
            .first()
            .map(|p| p.id.clone())
            .ok_or_else(|| ApiError(HydraError::InvalidInput("no parties configured".to_string())))?,
    };

    let (utxos, _) = state.query_snapshot(&party).await?;
    let balances = balances_by_address(&utxos)
        .into_iter()
        .map(|(address, lovelace)| {
            (
                address,
                BalanceEntry {
                    lovelace,
                    ada: format_ada(lovelace),
                },
            )
        })
        .collect();

    Ok(Json(BalancesResponse { party, balances }))
}

#[cfg(test)]
mod tests {
    use crate::api::testing::{harness, spawn_node, NodeScript};

    #[tokio::test]
    async fn test_balances_default_to_first_party() {
        let port = spawn_node(NodeScript::new("Open")).await;
        let h = harness(&["alice", "bob"], &[("alice", port), ("bob", 1)]);

        let body: serde_json::Value = h.server.get("/api/v1/balances").await.json();
        assert_eq!(body["party"], "alice");
        assert_eq!(body["balances"]["addr_test1bob"]["lovelace"], 5_000_000);
        assert_eq!(body["balances"]["addr_test1bob"]["ada"], "5.000000");
        assert_eq!(body["balances"]["addr_test1alice"]["ada"], "7.000000");
    }

    #[tokio::test]
    async fn test_balances_for_named_party() {
        let port = spawn_node(NodeScript::new("Open")).await;
        let h = harness(&["alice", "bob"], &[("alice", 1), ("bob", port)]);

        let body: serde_json::Value = h.server.get("/api/v1/balances?party=bob").await.json();
        assert_eq!(body["party"], "bob");
        assert_eq!(h.state.history.list("bob").await.len(), 1);
    }
}
