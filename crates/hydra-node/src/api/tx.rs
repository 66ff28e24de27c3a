//! Transaction endpoints.

use axum::{extract::State, Json};
use hydra_channel::CommandReport;
use hydra_core::{HydraError, PartyId, SignedTransaction, TxBuildRequest};
use serde::{Deserialize, Serialize};

use super::{ApiError, ApiResult};
use crate::state::AppState;

/// Envelope type used when the caller does not name one.
pub const DEFAULT_TX_TYPE: &str = "Witnessed Tx ConwayEra";

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    /// Party whose head receives the transaction.
    pub party: PartyId,
    pub cbor_hex: String,
    #[serde(default)]
    pub tx_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub party: PartyId,
    pub report: CommandReport,
}

/// Build and sign a transaction spending one UTXO.
pub async fn build_transaction(
    State(state): State<AppState>,
    Json(req): Json<TxBuildRequest>,
) -> ApiResult<SignedTransaction> {
    let signed = state.pipeline.build_and_sign(&req).await?;
    Ok(Json(signed))
}

/// Submit signed bytes to a party's open head.
pub async fn submit_transaction(
    State(state): State<AppState>,
    Json(req): Json<SubmitRequest>,
) -> ApiResult<SubmitResponse> {
    let bytes = hex::decode(&req.cbor_hex)
        .map_err(|e| ApiError(HydraError::InvalidInput(format!("cbor_hex is not hex: {}", e))))?;
    if bytes.is_empty() {
        return Err(ApiError(HydraError::InvalidInput(
            "cbor_hex is empty".to_string(),
        )));
    }

    let tx_type = req.tx_type.as_deref().unwrap_or(DEFAULT_TX_TYPE);
    let report = state
        .submit_transaction(&req.party, &req.cbor_hex, tx_type)
        .await?;

    Ok(Json(SubmitResponse {
        party: req.party,
        report,
    }))
}
