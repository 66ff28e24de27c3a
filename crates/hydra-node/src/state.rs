//! Application state.

use std::sync::Arc;

use hydra_channel::{
    ChannelConfig, ClientCommand, CommandChannel, CommandOutcome, CommandReport, HeadNodeClient,
};
use hydra_core::{HeadAction, HeadStatus, HydraError, PartyId, Result, UtxoSet};
use hydra_ledger::{CardanoCli, LedgerCli, PartyDirectory, TxPipeline};
use hydra_state::{InMemoryRepository, SnapshotHistory, SnapshotRecord, StatusStore};
use tracing::{debug, info, warn};

use crate::config::CoordinatorConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<CoordinatorConfig>,

    /// Key store access and address cache.
    pub directory: Arc<PartyDirectory>,

    pub pipeline: Arc<TxPipeline>,

    /// Handshake-gated command delivery.
    pub channel: CommandChannel,

    /// HTTP queries against party nodes.
    pub node: HeadNodeClient,

    /// Last observed head status per party.
    pub statuses: Arc<StatusStore>,

    pub history: SnapshotHistory,
}

impl AppState {
    /// State backed by the real ledger CLI.
    pub fn from_config(config: CoordinatorConfig) -> Self {
        let cli = CardanoCli::new(config.cardano_cli.clone())
            .with_testnet_magic(config.testnet_magic)
            .with_timeout(config.cli_timeout());
        Self::new(config, Arc::new(cli))
    }

    pub fn new(config: CoordinatorConfig, cli: Arc<dyn LedgerCli>) -> Self {
        let directory = Arc::new(PartyDirectory::new(
            config.key_store.clone(),
            cli.clone(),
            Arc::new(InMemoryRepository::<PartyId, String>::new()),
        ));
        let pipeline = Arc::new(TxPipeline::new(directory.clone(), cli));

        let node = HeadNodeClient::new(config.node_host.clone())
            .with_status_timeout(config.status_timeout());
        let channel = CommandChannel::new(ChannelConfig {
            host: config.node_host.clone(),
            timeout: config.channel_timeout(),
        })
        .with_http(node.clone());

        Self {
            history: SnapshotHistory::new(config.snapshot_history_depth),
            config: Arc::new(config),
            directory,
            pipeline,
            channel,
            node,
            statuses: Arc::new(InMemoryRepository::<PartyId, HeadStatus>::new()),
        }
    }

    /// API port of a configured party.
    pub fn port_of(&self, party: &str) -> Result<u16> {
        self.config
            .port_of(party)
            .ok_or_else(|| HydraError::NotFound {
                resource_type: "party".to_string(),
                id: party.to_string(),
            })
    }

    /// Send a head lifecycle command to one party's node.
    ///
    /// `Init` carries the head verification keys of the other `selected` parties.
    pub async fn run_head_command(
        &self,
        party: &str,
        action: HeadAction,
        selected: &[PartyId],
    ) -> Result<CommandReport> {
        let port = self.port_of(party)?;
        let other_keys = match action {
            HeadAction::Init => self.directory.head_keys_except(selected, party).await,
            _ => Vec::new(),
        };

        let report = self
            .channel
            .execute(port, ClientCommand::for_action(action, other_keys))
            .await?;

        match report.outcome.response_tag() {
            Some(tag) => match HeadStatus::from_tag(tag) {
                HeadStatus::Unknown(_) => debug!(party, tag, "response does not name a head status"),
                status => self.statuses.put(party.to_string(), status).await,
            },
            // The node may still be processing, so ask it directly.
            None => {
                if let Err(e) = self.refresh_status(party).await {
                    warn!(party, action = %action, "head status unknown after command: {}", e);
                    self.statuses
                        .put(party.to_string(), HeadStatus::Unknown(format!("{}Pending", action)))
                        .await;
                }
            }
        }

        Ok(report)
    }

    /// Query a party's head status and cache it.
    pub async fn refresh_status(&self, party: &str) -> Result<HeadStatus> {
        let port = self.port_of(party)?;
        let status = self.node.head_status(port).await?;
        self.statuses.put(party.to_string(), status.clone()).await;
        Ok(status)
    }

    /// Query a party's snapshot and record it in the history.
    pub async fn query_snapshot(&self, party: &str) -> Result<(UtxoSet, SnapshotRecord)> {
        let port = self.port_of(party)?;
        let utxos = self.node.snapshot_utxo(port).await?;
        let record = self.history.record(party, utxos.clone()).await;
        Ok((utxos, record))
    }

    /// Refuse unless the party's head accepts transactions.
    ///
    /// Uses the cached status, fetching it when nothing or only an unknown status is cached.
    pub async fn ensure_head_open(&self, party: &str) -> Result<()> {
        let status = match self.statuses.get(&party.to_string()).await {
            Some(status) if !matches!(status, HeadStatus::Unknown(_)) => status,
            _ => self.refresh_status(party).await?,
        };

        if !status.accepts_transactions() {
            return Err(HydraError::HeadNotOpen {
                party: party.to_string(),
                status: status.to_string(),
            });
        }
        Ok(())
    }

    /// Submit a signed transaction to a party's head.
    pub async fn submit_transaction(
        &self,
        party: &str,
        cbor_hex: &str,
        tx_type: &str,
    ) -> Result<CommandReport> {
        let port = self.port_of(party)?;
        self.ensure_head_open(party).await?;

        let report = self
            .channel
            .execute(port, ClientCommand::new_tx(cbor_hex, tx_type))
            .await?;

        if let CommandOutcome::Completed { response_tag, response } = &report.outcome {
            if response_tag == "TxInvalid" {
                let reason = response
                    .get("validationError")
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| response.to_string());
                return Err(HydraError::TransactionRejected {
                    party: party.to_string(),
                    reason,
                });
            }
        }

        info!(party, outcome = ?report.outcome.response_tag(), "transaction submitted");
        Ok(report)
    }
}
