//! Common helper functions for the deployment scripts and tests

use std::time::Duration;

use alloy_primitives::Address;
use rand::{rngs::StdRng, RngCore, SeedableRng};
use serde_json::Value;
use tracing::{info, warn};

pub mod address;
pub mod chain;
pub mod config;
pub mod contract;
pub mod error;
pub mod events;
pub mod receipt;
pub mod telemetry;

pub use address::{ensure_nonzero, parse_address, InvalidAddress};
pub use chain::{Fault, LocalChain, PendingTransaction, Snapshot, TransactionRequest, TxKind};
pub use config::{Config, ConfigError, DEFAULT_CONFIG_PATH};
pub use contract::{Artifacts, CallContext, Code, Contract, Revert};
pub use error::{ChainError, RegistryError, Stage};
pub use events::{find_event, ContractEvent, EventDecodeError};
pub use receipt::{Log, Receipt, TxHash, TxStatus};

/// Deterministic development accounts, the first of which deploys.
pub fn dev_accounts(seed: u64, count: usize) -> Vec<Address> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let mut bytes = [0_u8; 20];
            rng.fill_bytes(&mut bytes);
            Address::from(bytes)
        })
        .collect()
}

/// Script setup: a chain handle plus the accounts that may sign on it
pub struct ScriptSetup {
    pub chain: LocalChain,
    pub deployer: Address,
    pub accounts: Vec<Address>,
    pub config: Config,
}

impl ScriptSetup {
    pub fn confirmation_timeout(&self) -> Duration {
        self.config.network.confirmation_timeout()
    }

    /// Writes the chain state back to the configured state file.
    pub async fn persist(&self) -> Result<(), ChainError> {
        self.chain.save(&self.config.network.state_path).await
    }
}

/// Opens the chain saved at the configured state path (or a fresh one).
pub async fn setup_script(config: Config, artifacts: Artifacts) -> Result<ScriptSetup, ChainError> {
    let chain = LocalChain::open(
        &config.network.state_path,
        artifacts,
        config.network.block_time(),
    )
    .await?;
    let block = chain.block_number().await;
    info!(network = %config.network.name, block, "connected to local chain");
    Ok(accounts_for(chain, config))
}

/// Like [`setup_script`], but on a fresh in-memory chain that is never saved
/// unless [`ScriptSetup::persist`] is called.
pub fn setup_ephemeral(config: Config, artifacts: Artifacts) -> ScriptSetup {
    let chain = LocalChain::with_block_time(artifacts, config.network.block_time());
    accounts_for(chain, config)
}

fn accounts_for(chain: LocalChain, config: Config) -> ScriptSetup {
    let accounts = dev_accounts(config.deployer.seed, config.deployer.accounts.max(1));
    ScriptSetup {
        chain,
        deployer: accounts[0],
        accounts,
        config,
    }
}

/// A contract deployment that has been submitted but maybe not confirmed.
#[derive(Debug)]
pub struct Deployment {
    artifact: String,
    chain: LocalChain,
    tx_hash: TxHash,
    pending: Option<PendingTransaction>,
    address: Option<Address>,
}

impl Deployment {
    pub async fn submit(
        chain: &LocalChain,
        from: Address,
        artifact: &str,
        args: Value,
    ) -> Result<Self, RegistryError> {
        let pending = chain
            .submit(TransactionRequest::deploy(from, artifact, args))
            .await
            .map_err(|err| match err {
                ChainError::Rejected { reason } => RegistryError::DeploymentFailure {
                    artifact: artifact.to_owned(),
                    reason,
                },
                other => other.into(),
            })?;
        info!(artifact, tx_hash = %pending.tx_hash(), "deployment submitted");

        Ok(Self {
            artifact: artifact.to_owned(),
            chain: chain.clone(),
            tx_hash: pending.tx_hash(),
            pending: Some(pending),
            address: None,
        })
    }

    pub fn tx_hash(&self) -> TxHash {
        self.tx_hash
    }

    /// The deployed address, available once the deployment is confirmed.
    pub fn address(&self) -> Result<Address, RegistryError> {
        self.address.ok_or(RegistryError::NotYetConfirmed {
            tx_hash: self.tx_hash,
        })
    }

    /// Waits for confirmation. After a timeout the deployment stays usable:
    /// a later call looks the receipt up by hash instead.
    pub async fn wait_for_deployment(&mut self, timeout: Duration) -> Result<Address, RegistryError> {
        if let Some(address) = self.address {
            return Ok(address);
        }

        let confirmed = match self.pending.take() {
            Some(pending) => pending.wait(timeout).await,
            None => self.chain.wait_for_receipt(self.tx_hash, timeout).await,
        };
        let receipt = match confirmed {
            Ok(receipt) => receipt,
            Err(ChainError::Unconfirmed { tx_hash, timeout }) => {
                warn!(artifact = %self.artifact, %tx_hash, ?timeout, "deployment not confirmed in time");
                return Err(RegistryError::NotYetConfirmed { tx_hash });
            }
            Err(err) => return Err(err.into()),
        };

        if let Some(reason) = receipt.revert_reason() {
            return Err(RegistryError::DeploymentFailure {
                artifact: self.artifact.clone(),
                reason: reason.to_owned(),
            });
        }
        let address = receipt
            .contract_address
            .ok_or_else(|| RegistryError::DeploymentFailure {
                artifact: self.artifact.clone(),
                reason: "receipt carries no contract address".into(),
            })?;

        info!(artifact = %self.artifact, %address, block = receipt.block_number, "deployment confirmed");
        self.address = Some(address);
        Ok(address)
    }
}
