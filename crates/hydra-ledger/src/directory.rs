//! Party directory and ownership resolution.
//!
//! Key-store layout, one directory per party under the store root:
//!
//! ```text
//! <root>/<party>/payment.vkey
//! <root>/<party>/payment.skey
//! <root>/<party>/hydra.vkey
//! <root>/<party>/address.txt
//! ```

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use hydra_core::{HydraError, PartyId, Result, TextEnvelope, Utxo};
use hydra_state::AddressStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cli::LedgerCli;

/// Paths of one party's key material.
#[derive(Debug, Clone)]
pub struct PartyKeys {
    dir: PathBuf,
}

impl PartyKeys {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn payment_vkey(&self) -> PathBuf {
        self.dir.join("payment.vkey")
    }

    pub fn payment_skey(&self) -> PathBuf {
        self.dir.join("payment.skey")
    }

    pub fn hydra_vkey(&self) -> PathBuf {
        self.dir.join("hydra.vkey")
    }

    pub fn address_cache(&self) -> PathBuf {
        self.dir.join("address.txt")
    }
}

/// Outcome of an ownership lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerResolution {
    /// Party that should sign.
    pub owner: PartyId,

    /// False when no address matched and the caller's assumption was used.
    pub verified: bool,
}

/// Maps party identifiers to key material and cached addresses.
pub struct PartyDirectory {
    root: PathBuf,
    cli: Arc<dyn LedgerCli>,
    addresses: Arc<AddressStore>,
}

impl PartyDirectory {
    /// Create a directory over a key-store root.
    pub fn new(root: impl Into<PathBuf>, cli: Arc<dyn LedgerCli>, addresses: Arc<AddressStore>) -> Self {
        Self {
            root: root.into(),
            cli,
            addresses,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Key paths for a party. The id must name a directory directly under the root.
    pub fn keys(&self, party: &str) -> Result<PartyKeys> {
        check_party_id(party)?;
        Ok(PartyKeys::new(self.root.join(party)))
    }

    /// All parties with a payment verification key, sorted by id.
    pub async fn parties(&self) -> Result<Vec<PartyId>> {
        let mut parties = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let Ok(keys) = self.keys(&name) else {
                continue;
            };
            if tokio::fs::try_exists(keys.payment_vkey()).await? {
                parties.push(name);
            }
        }

        parties.sort();
        Ok(parties)
    }

    /// Address of a party's payment key, derived once and then served from the cache.
    pub async fn address_of(&self, party: &str) -> Result<String> {
        if let Some(address) = self.addresses.get(&party.to_string()).await {
            return Ok(address);
        }

        let keys = self.keys(party)?;
        let vkey = keys.payment_vkey();
        if !tokio::fs::try_exists(&vkey).await? {
            return Err(HydraError::KeyNotFound {
                party: party.to_string(),
                path: vkey.display().to_string(),
            });
        }

        let address = match read_address_cache(&keys.address_cache()).await {
            Some(address) => address,
            None => {
                let address = self.cli.build_address(&vkey).await?;
                if let Err(e) = tokio::fs::write(keys.address_cache(), &address).await {
                    warn!(party = %party, "could not write address cache: {}", e);
                }
                info!(party = %party, address = %address, "derived party address");
                address
            }
        };

        self.addresses.put(party.to_string(), address.clone()).await;
        Ok(address)
    }

    /// Find the party whose address owns `utxo`, falling back to `assumed`.
    ///
    /// The fallback is not proven: if it is wrong the ledger rejects the spend.
    pub async fn resolve_owner(&self, utxo: &Utxo, assumed: &str) -> Result<OwnerResolution> {
        for party in self.parties().await? {
            match self.address_of(&party).await {
                Ok(address) if address == utxo.address => {
                    debug!(party = %party, address = %address, "resolved UTXO owner");
                    return Ok(OwnerResolution {
                        owner: party,
                        verified: true,
                    });
                }
                Ok(_) => {}
                Err(e) => warn!(party = %party, "skipping party during owner lookup: {}", e),
            }
        }

        warn!(
            address = %utxo.address,
            assumed = %assumed,
            "no party owns this address, assuming the caller's party"
        );
        Ok(OwnerResolution {
            owner: assumed.to_string(),
            verified: false,
        })
    }

    /// Path of a party's payment signing key, which must exist.
    pub async fn signing_key(&self, party: &str) -> Result<PathBuf> {
        let skey = self.keys(party)?.payment_skey();
        if !tokio::fs::try_exists(&skey).await? {
            return Err(HydraError::SigningKeyNotFound {
                party: party.to_string(),
                path: skey.display().to_string(),
            });
        }
        Ok(skey)
    }

    /// Raw hex of a party's head verification key.
    pub async fn head_vkey_hex(&self, party: &str) -> Result<String> {
        let path = self.keys(party)?.hydra_vkey();
        if !tokio::fs::try_exists(&path).await? {
            return Err(HydraError::KeyNotFound {
                party: party.to_string(),
                path: path.display().to_string(),
            });
        }
        let envelope = TextEnvelope::read(&path).await?;
        Ok(envelope.key_hex().to_string())
    }

    /// Head verification keys of every selected party except `exclude`.
    ///
    /// Parties whose key cannot be read are skipped with a warning.
    pub async fn head_keys_except(&self, selected: &[PartyId], exclude: &str) -> Vec<String> {
        let mut keys = Vec::new();
        for party in selected.iter().filter(|p| p.as_str() != exclude) {
            match self.head_vkey_hex(party).await {
                Ok(key) => keys.push(key),
                Err(e) => warn!(party = %party, "skipping head key of other party: {}", e),
            }
        }
        keys
    }
}

/// Reject party ids that are not a single plain path component.
pub fn check_party_id(party: &str) -> Result<()> {
    let mut components = Path::new(party).components();
    let plain = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if !plain || party.contains(['/', '\\']) || party.contains("..") {
        return Err(HydraError::InvalidInput(format!(
            "invalid party id '{}'",
            party
        )));
    }
    Ok(())
}

async fn read_address_cache(path: &Path) -> Option<String> {
    let raw = tokio::fs::read_to_string(path).await.ok()?;
    let address = raw.trim();
    (!address.is_empty()).then(|| address.to_string())
}
