//! Head lifecycle endpoint.

use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};
use futures::future::join_all;
use hydra_channel::CommandReport;
use hydra_core::{HeadAction, HydraError, PartyId};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ApiError, ApiResult, ErrorBody};
use crate::state::AppState;

/// Request body of a head action.
#[derive(Debug, Default, Deserialize)]
pub struct HeadActionRequest {
    /// Parties to command. Empty means every configured party.
    #[serde(default)]
    pub parties: Vec<PartyId>,
}

/// Outcome for one party.
#[derive(Debug, Serialize)]
pub struct PartyResult {
    pub party: PartyId,
    pub port: Option<u16>,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<CommandReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Serialize)]
pub struct HeadActionResponse {
    pub action: HeadAction,
    pub results: Vec<PartyResult>,
}

/// Send Init, Close or Fanout to the selected parties concurrently.
///
/// One party failing does not affect the others. A body that is present but not a
/// valid request fails the whole call before any node is contacted.
pub async fn head_action(
    State(state): State<AppState>,
    Path(action): Path<String>,
    body: Bytes,
) -> ApiResult<HeadActionResponse> {
    let action: HeadAction = action.parse().map_err(ApiError)?;
    let mut parties = parse_request(&body).map_err(ApiError)?.parties;
    if parties.is_empty() {
        parties = state.config.parties.iter().map(|p| p.id.clone()).collect();
    }

    info!(action = %action, parties = ?parties, "dispatching head action");

    let results = join_all(parties.iter().map(|party| {
        let state = state.clone();
        let selected = parties.clone();
        async move {
            let port = state.config.port_of(party);
            match state.run_head_command(party, action, &selected).await {
                Ok(report) => PartyResult {
                    party: party.clone(),
                    port,
                    ok: true,
                    report: Some(report),
                    error: None,
                },
                Err(e) => PartyResult {
                    party: party.clone(),
                    port,
                    ok: false,
                    report: None,
                    error: Some(ErrorBody {
                        kind: e.kind(),
                        message: e.to_string(),
                    }),
                },
            }
        }
    }))
    .await;

    Ok(Json(HeadActionResponse { action, results }))
}

/// An empty body is the default request.
fn parse_request(body: &[u8]) -> Result<HeadActionRequest, HydraError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(HeadActionRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| HydraError::InvalidInput(format!("invalid head action request: {}", e)))
}
