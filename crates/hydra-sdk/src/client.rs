//! Coordinator client implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use hydra_core::{
    HeadAction, HeadStatus, HydraError, PartyId, Result, SignedTransaction, TxBuildRequest,
    UtxoSet,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::tracker::{BalanceSource, ConfirmationTracker, TrackingHandle};

/// Client for interacting with a coordinator.
#[derive(Clone)]
pub struct CoordinatorClient {
    /// Base URL of the coordinator.
    base_url: String,

    /// Port of the coordinator, reported in errors.
    port: u16,

    /// HTTP client.
    http_client: reqwest::Client,

    /// Party whose snapshot backs [`BalanceSource`]. `None` lets the coordinator pick.
    balance_party: Option<PartyId>,
}

/// A configured party.
#[derive(Debug, Clone, Deserialize)]
pub struct PartyInfo {
    pub id: PartyId,
    pub api_port: u16,
    pub has_keys: bool,
}

/// Error body returned by the coordinator.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorInfo {
    pub kind: String,
    pub message: String,
}

/// Outcome of a head action for one party.
#[derive(Debug, Clone, Deserialize)]
pub struct HeadActionResult {
    pub party: PartyId,
    pub port: Option<u16>,
    pub ok: bool,
    #[serde(default)]
    pub report: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Deserialize)]
struct HeadActionResponse {
    results: Vec<HeadActionResult>,
}

#[derive(Debug, Deserialize)]
struct AddressResponse {
    address: String,
}

#[derive(Debug, Deserialize)]
struct HeadResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
struct UtxoResponse {
    utxos: UtxoSet,
}

#[derive(Debug, Deserialize)]
struct BalanceEntry {
    lovelace: u64,
}

#[derive(Debug, Deserialize)]
struct BalancesResponse {
    balances: HashMap<String, BalanceEntry>,
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    party: &'a str,
    cbor_hex: &'a str,
    tx_type: &'a str,
}

impl CoordinatorClient {
    /// Connect to a coordinator.
    pub async fn connect(url: &str) -> Result<Self> {
        let base_url = url.trim_end_matches('/').to_string();
        let port = reqwest::Url::parse(&base_url)
            .map_err(|e| HydraError::InvalidInput(format!("invalid coordinator URL: {}", e)))?
            .port_or_known_default()
            .unwrap_or(80);

        let client = Self {
            base_url,
            port,
            http_client: reqwest::Client::new(),
            balance_party: None,
        };

        // Verify connection with health check
        let _: serde_json::Value = client.get("/health").await?;
        Ok(client)
    }

    /// Read balances from `party`'s snapshot.
    pub fn with_balance_party(mut self, party: impl Into<PartyId>) -> Self {
        self.balance_party = Some(party.into());
        self
    }

    pub async fn parties(&self) -> Result<Vec<PartyInfo>> {
        self.get("/api/v1/parties").await
    }

    /// Payment address of a party.
    pub async fn address_of(&self, party: &str) -> Result<String> {
        let response: AddressResponse = self
            .get(&format!("/api/v1/parties/{}/address", party))
            .await?;
        Ok(response.address)
    }

    /// Current head status of a party's node.
    pub async fn head_status(&self, party: &str) -> Result<HeadStatus> {
        let response: HeadResponse = self.get(&format!("/api/v1/parties/{}/head", party)).await?;
        Ok(HeadStatus::from_tag(&response.status))
    }

    /// Snapshot UTXO set of a party's node.
    pub async fn utxo(&self, party: &str) -> Result<UtxoSet> {
        let response: UtxoResponse = self.get(&format!("/api/v1/parties/{}/utxo", party)).await?;
        Ok(response.utxos)
    }

    /// Send a lifecycle command to several parties at once.
    pub async fn head_action(
        &self,
        action: HeadAction,
        parties: &[PartyId],
    ) -> Result<Vec<HeadActionResult>> {
        let body = serde_json::json!({ "parties": parties });
        let response: HeadActionResponse = self
            .post(&format!("/api/v1/head/{}", action.path()), &body)
            .await?;
        Ok(response.results)
    }

    /// Build and sign a transaction.
    pub async fn build_transaction(&self, request: &TxBuildRequest) -> Result<SignedTransaction> {
        self.post("/api/v1/tx/build", request).await
    }

    /// Submit a signed transaction to a party's head.
    pub async fn submit_transaction(
        &self,
        party: &str,
        signed: &SignedTransaction,
    ) -> Result<serde_json::Value> {
        let body = SubmitRequest {
            party,
            cbor_hex: &signed.cbor_hex,
            tx_type: &signed.tx_type,
        };
        self.post("/api/v1/tx/submit", &body).await
    }

    /// Lovelace per address in a party's snapshot.
    pub async fn balances(&self, party: Option<&str>) -> Result<HashMap<String, u64>> {
        let path = match party {
            Some(party) => format!("/api/v1/balances?party={}", party),
            None => "/api/v1/balances".to_string(),
        };
        let response: BalancesResponse = self.get(&path).await?;
        Ok(response
            .balances
            .into_iter()
            .map(|(address, entry)| (address, entry.lovelace))
            .collect())
    }

    /// Start watching for a transfer between parties.
    pub async fn track_transfer(
        &self,
        tracker: &ConfirmationTracker,
        from_party: &str,
        to_parties: &[PartyId],
        expected_total: u64,
    ) -> Result<TrackingHandle> {
        let from_address = self.address_of(from_party).await?;
        let mut recipients = Vec::with_capacity(to_parties.len());
        for party in to_parties {
            recipients.push(self.address_of(party).await?);
        }
        tracker
            .begin_tracking(from_address, recipients, expected_total)
            .await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .http_client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .map_err(|e| HydraError::upstream_unavailable(self.port, e.to_string()))?;
        self.decode(response).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let response = self
            .http_client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await
            .map_err(|e| HydraError::upstream_unavailable(self.port, e.to_string()))?;
        self.decode(response).await
    }

    async fn decode<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            if status.as_u16() == 404 {
                return Err(HydraError::NotFound {
                    resource_type: "coordinator resource".to_string(),
                    id: error_message(&text),
                });
            }
            if status.as_u16() == 400 {
                return Err(HydraError::InvalidInput(error_message(&text)));
            }
            return Err(HydraError::UpstreamRejected {
                port: self.port,
                status: status.as_u16(),
                body: text,
            });
        }

        response
            .json()
            .await
            .map_err(|e| HydraError::SerializationError(e.to_string()))
    }
}

/// Message of a coordinator error body, or the raw text.
fn error_message(text: &str) -> String {
    serde_json::from_str::<ErrorInfo>(text)
        .map(|e| e.message)
        .unwrap_or_else(|_| text.to_string())
}

#[async_trait]
impl BalanceSource for CoordinatorClient {
    async fn balances(&self) -> Result<HashMap<String, u64>> {
        CoordinatorClient::balances(self, self.balance_party.as_deref()).await
    }
}
