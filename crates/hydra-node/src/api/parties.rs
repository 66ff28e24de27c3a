//! Party endpoints.

use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use hydra_core::{balances_by_address, HeadStatus, PartyId, UtxoSet};
use hydra_state::SnapshotRecord;
use serde::Serialize;
use uuid::Uuid;

use super::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct PartyResponse {
    pub id: PartyId,
    pub api_port: u16,
    /// Whether the key store holds a payment verification key for the party.
    pub has_keys: bool,
}

#[derive(Debug, Serialize)]
pub struct AddressResponse {
    pub party: PartyId,
    pub address: String,
}

#[derive(Debug, Serialize)]
pub struct HeadResponse {
    pub party: PartyId,
    pub status: String,
    pub accepts_transactions: bool,
}

#[derive(Debug, Serialize)]
pub struct UtxoResponse {
    pub party: PartyId,
    pub snapshot_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub utxos: UtxoSet,
    pub balances: HashMap<String, u64>,
}

/// List configured parties.
pub async fn list_parties(State(state): State<AppState>) -> ApiResult<Vec<PartyResponse>> {
    let with_keys = state.directory.parties().await?;
    let parties = state
        .config
        .parties
        .iter()
        .map(|p| PartyResponse {
            id: p.id.clone(),
            api_port: p.api_port,
            has_keys: with_keys.contains(&p.id),
        })
        .collect();
    Ok(Json(parties))
}

/// Payment address of a party.
pub async fn get_address(
    State(state): State<AppState>,
    Path(id): Path<PartyId>,
) -> ApiResult<AddressResponse> {
    let address = state.directory.address_of(&id).await?;
    Ok(Json(AddressResponse { party: id, address }))
}

/// Current head status of a party's node.
pub async fn get_head(
    State(state): State<AppState>,
    Path(id): Path<PartyId>,
) -> ApiResult<HeadResponse> {
    let status: HeadStatus = state.refresh_status(&id).await?;
    Ok(Json(HeadResponse {
        party: id,
        accepts_transactions: status.accepts_transactions(),
        status: status.to_string(),
    }))
}

/// Snapshot UTXO set of a party's node.
pub async fn get_utxo(
    State(state): State<AppState>,
    Path(id): Path<PartyId>,
) -> ApiResult<UtxoResponse> {
    let (utxos, record) = state.query_snapshot(&id).await?;
    Ok(Json(UtxoResponse {
        party: id,
        snapshot_id: record.id,
        timestamp: record.timestamp,
        balances: balances_by_address(&utxos),
        utxos,
    }))
}

/// Recorded snapshots of a party, oldest first.
pub async fn list_snapshots(
    State(state): State<AppState>,
    Path(id): Path<PartyId>,
) -> ApiResult<Vec<SnapshotRecord>> {
    state.port_of(&id)?;
    Ok(Json(state.history.list(&id).await))
}
