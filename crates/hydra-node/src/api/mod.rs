//! HTTP API of the coordinator.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use hydra_core::{ErrorKind, HydraError};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::state::AppState;

pub mod balances;
pub mod head;
pub mod health;
pub mod parties;
pub mod tx;

/// Error body returned by every endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

/// Coordinator error rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub HydraError);

impl From<HydraError> for ApiError {
    fn from(err: HydraError) -> Self {
        ApiError(err)
    }
}

/// HTTP status for an error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::HeadNotOpen => StatusCode::CONFLICT,
        ErrorKind::TransactionRejected => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::ChannelTimeout | ErrorKind::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::UpstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::ChannelTransport
        | ErrorKind::UpstreamRejected
        | ErrorKind::MalformedCliOutput
        | ErrorKind::Protocol => StatusCode::BAD_GATEWAY,
        ErrorKind::KeyNotFound
        | ErrorKind::SigningKeyNotFound
        | ErrorKind::CliFailure
        | ErrorKind::Io
        | ErrorKind::Serialization
        | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = status_for(kind);
        if status.is_server_error() {
            warn!(kind = ?kind, "request failed: {}", self.0);
        }
        (
            status,
            Json(ErrorBody {
                kind,
                message: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;

/// Create the API router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health_check))
        // Parties
        .route("/api/v1/parties", get(parties::list_parties))
        .route("/api/v1/parties/:id/address", get(parties::get_address))
        .route("/api/v1/parties/:id/head", get(parties::get_head))
        .route("/api/v1/parties/:id/utxo", get(parties::get_utxo))
        .route("/api/v1/parties/:id/snapshots", get(parties::list_snapshots))
        // Head lifecycle
        .route("/api/v1/head/:action", post(head::head_action))
        // Transactions
        .route("/api/v1/tx/build", post(tx::build_transaction))
        .route("/api/v1/tx/submit", post(tx::submit_transaction))
        .route("/api/v1/balances", get(balances::get_balances))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod testing;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(ErrorKind::InvalidInput), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::HeadNotOpen), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorKind::ChannelTimeout), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            status_for(ErrorKind::UpstreamUnavailable),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(ErrorKind::SigningKeyNotFound),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
