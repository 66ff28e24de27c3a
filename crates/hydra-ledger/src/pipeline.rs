//! Transaction build/sign pipeline.
//!
//! Given a UTXO and a recipient party, the pipeline works out which party really
//! owns the UTXO, builds a fee-less raw transaction spending it, signs it with the
//! owner's payment key and returns the signed CBOR.

use std::path::PathBuf;
use std::sync::Arc;

use hydra_core::{
    format_ada, split_amount, HydraError, Result, SignedTransaction, TextEnvelope, TxBuildRequest,
    UtxoRef,
};
use tracing::{info, warn};

use crate::cli::{LedgerCli, RawTransaction, TxOutput};
use crate::directory::{check_party_id, PartyDirectory};

/// Head transactions carry no fee.
const HEAD_FEE: u64 = 0;

/// Builds and signs head transactions.
pub struct TxPipeline {
    directory: Arc<PartyDirectory>,
    cli: Arc<dyn LedgerCli>,
    work_dir: Option<PathBuf>,
}

impl TxPipeline {
    pub fn new(directory: Arc<PartyDirectory>, cli: Arc<dyn LedgerCli>) -> Self {
        Self {
            directory,
            cli,
            work_dir: None,
        }
    }

    /// Place transient build files under `dir` instead of the system temp dir.
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    pub fn directory(&self) -> &Arc<PartyDirectory> {
        &self.directory
    }

    /// Build, sign and extract a transaction for `request`.
    pub async fn build_and_sign(&self, request: &TxBuildRequest) -> Result<SignedTransaction> {
        let input = UtxoRef::parse(&request.utxo_ref)?;
        check_party_id(&request.from_party)?;
        check_party_id(&request.to_party)?;

        let total = request.utxo.value.lovelace;
        let (send_lovelace, change_lovelace) = split_amount(total, request.send_half);
        if send_lovelace == 0 {
            return Err(HydraError::InvalidInput(format!(
                "UTXO {} holds {} lovelace, nothing to send",
                input, total
            )));
        }

        let resolution = self
            .directory
            .resolve_owner(&request.utxo, &request.from_party)
            .await?;
        let owner = resolution.owner;
        if owner != request.from_party {
            info!(
                assumed = %request.from_party,
                owner = %owner,
                utxo = %input,
                "UTXO belongs to a different party, signing as owner"
            );
        }

        let target_address = match self.directory.address_of(&request.to_party).await {
            Ok(address) => address,
            Err(e) => match &request.target_address {
                Some(address) if !address.is_empty() => {
                    warn!(
                        party = %request.to_party,
                        "recipient address unresolvable ({}), using supplied target address",
                        e
                    );
                    address.clone()
                }
                _ => {
                    return Err(HydraError::InvalidInput(format!(
                        "cannot resolve an address for recipient '{}' and no target address was supplied",
                        request.to_party
                    )))
                }
            },
        };

        let signing_key = self.directory.signing_key(&owner).await?;

        let mut outputs = vec![TxOutput::new(target_address.clone(), send_lovelace)];
        if request.send_half && change_lovelace > 0 {
            let owner_address = self.directory.address_of(&owner).await?;
            outputs.push(TxOutput::new(owner_address, change_lovelace));
        }
        let tx = RawTransaction {
            input: input.clone(),
            outputs,
            fee: HEAD_FEE,
        };

        // Removed on drop, whichever way this function returns.
        let scratch = self.scratch_dir()?;
        let body_file = scratch.path().join("tx.raw");
        let signed_file = scratch.path().join("tx.signed");

        self.cli.build_raw(&tx, &body_file).await?;
        self.cli.sign(&body_file, &signing_key, &signed_file).await?;

        let signed = TextEnvelope::read(&signed_file).await.map_err(|e| match e {
            HydraError::Io(msg) => {
                HydraError::MalformedCliOutput(format!("signed transaction unreadable: {}", msg))
            }
            other => other,
        })?;
        signed.cbor_bytes()?;

        info!(
            owner = %owner,
            utxo = %input,
            send = send_lovelace,
            change = change_lovelace,
            "signed head transaction"
        );

        Ok(SignedTransaction {
            cbor_hex: signed.cbor_hex,
            tx_type: signed.kind,
            actual_owner: owner,
            owner_verified: resolution.verified,
            target_address,
            send_lovelace,
            change_lovelace,
            send_ada: format_ada(send_lovelace),
            change_ada: (change_lovelace > 0).then(|| format_ada(change_lovelace)),
        })
    }

    fn scratch_dir(&self) -> Result<tempfile::TempDir> {
        let builder = {
            let mut b = tempfile::Builder::new();
            b.prefix("hydra-tx-");
            b
        };
        let dir = match &self.work_dir {
            Some(base) => builder.tempdir_in(base)?,
            None => builder.tempdir()?,
        };
        Ok(dir)
    }
}
