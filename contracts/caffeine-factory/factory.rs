//! CaffeineFactory: mints jar clones of the logic contract and keeps an
//! append-only registry of them.
//!
//! A new jar's address is never returned to the caller directly. It is
//! recovered from the `JarCreated` event in the confirmation of the
//! `createJar` transaction.

use std::time::Duration;

use alloy_primitives::Address;
use caffeine_bottle::{InitializeArgs, LogicReference};
use helpers::{
    ensure_nonzero, find_event, parse_address, CallContext, ChainError, Code, Contract,
    ContractEvent, Deployment, LocalChain, PendingTransaction, Receipt, RegistryError, Revert,
    TransactionRequest, TxHash,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

pub const ARTIFACT: &str = "CaffeineFactory";

const LOGIC: &str = "logic";
const TREASURY: &str = "treasury";
const JARS_LENGTH: &str = "jars.length";

fn jar_slot(index: u64) -> String {
    format!("jars[{index}]")
}

fn index_slot(jar: Address) -> String {
    format!("jarIndex[{jar}]")
}

/// Emitted once per successful `createJar`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JarCreated {
    pub jar_address: Address,
    pub iframe_link: String,
    pub index: u64,
}

impl ContractEvent for JarCreated {
    const NAME: &'static str = "JarCreated";
}

/// A jar as stored in the factory's registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredJar {
    pub jar: Address,
    pub iframe_link: String,
    pub created_at: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConstructorArgs {
    logic: Address,
    treasury: Address,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateJarArgs {
    iframe_link: String,
}

#[derive(Deserialize)]
struct IndexArgs {
    index: u64,
}

#[derive(Deserialize)]
struct JarArgs {
    jar: Address,
}

/// Contract code for the factory.
pub struct CaffeineFactory;

impl CaffeineFactory {
    fn create_jar(ctx: &mut CallContext<'_>, args: &Value) -> Result<Value, Revert> {
        let CreateJarArgs { iframe_link } = CreateJarArgs::deserialize(args)?;
        let logic = required::<Address>(ctx, LOGIC)?;
        let treasury = required::<Address>(ctx, TREASURY)?;

        let jar = ctx.clone_contract(logic)?;
        if jar == logic || jar == treasury || ctx.load::<u64>(&index_slot(jar))?.is_some() {
            return Err(Revert::new(format!("JarAddressCollision({jar})")));
        }
        ctx.call(
            jar,
            "initialize",
            &serde_json::to_value(InitializeArgs {
                iframe_link: iframe_link.clone(),
                treasury,
            })?,
        )?;

        let index = ctx.load::<u64>(JARS_LENGTH)?.unwrap_or(0);
        ctx.store(
            &jar_slot(index),
            &StoredJar {
                jar,
                iframe_link: iframe_link.clone(),
                created_at: index,
            },
        )?;
        ctx.store(&index_slot(jar), &index)?;
        ctx.store(JARS_LENGTH, &(index + 1))?;
        ctx.emit(&JarCreated {
            jar_address: jar,
            iframe_link,
            index,
        })?;
        Ok(json!(jar))
    }

    fn jars(ctx: &CallContext<'_>) -> Result<Vec<StoredJar>, Revert> {
        let length = ctx.load::<u64>(JARS_LENGTH)?.unwrap_or(0);
        (0..length)
            .map(|index| required(ctx, &jar_slot(index)))
            .collect()
    }
}

/// Only the logic contract itself may be cloned. Factories, clones and
/// other contracts are rejected.
fn is_logic_code(code: Option<&Code>) -> bool {
    matches!(code, Some(Code::Artifact { name }) if name == caffeine_bottle::ARTIFACT)
}

fn required<T: DeserializeOwned>(ctx: &CallContext<'_>, slot: &str) -> Result<T, Revert> {
    ctx.load(slot)?
        .ok_or_else(|| Revert::new(format!("EmptySlot({slot})")))
}

impl Contract for CaffeineFactory {
    fn construct(&self, ctx: &mut CallContext<'_>, args: &Value) -> Result<(), Revert> {
        let ConstructorArgs { logic, treasury } = ConstructorArgs::deserialize(args)?;
        if !is_logic_code(ctx.code_at(logic)) {
            return Err(Revert::new("InvalidLogicReference"));
        }
        if treasury.is_zero() {
            return Err(Revert::new("InvalidTreasury"));
        }
        ctx.store(LOGIC, &logic)?;
        ctx.store(TREASURY, &treasury)?;
        ctx.store(JARS_LENGTH, &0u64)
    }

    fn call(&self, ctx: &mut CallContext<'_>, method: &str, args: &Value) -> Result<Value, Revert> {
        match method {
            "createJar" => Self::create_jar(ctx, args),
            "getJars" => Ok(serde_json::to_value(Self::jars(ctx)?)?),
            "getJar" => {
                let IndexArgs { index } = IndexArgs::deserialize(args)?;
                match ctx.load::<StoredJar>(&jar_slot(index))? {
                    Some(jar) => Ok(serde_json::to_value(jar)?),
                    None => Err(Revert::new(format!("IndexOutOfBounds({index})"))),
                }
            }
            "jarCount" => Ok(json!(ctx.load::<u64>(JARS_LENGTH)?.unwrap_or(0))),
            "isJar" => {
                let JarArgs { jar } = JarArgs::deserialize(args)?;
                Ok(json!(ctx.load::<u64>(&index_slot(jar))?.is_some()))
            }
            "logic" => Ok(json!(required::<Address>(ctx, LOGIC)?)),
            "treasury" => Ok(json!(required::<Address>(ctx, TREASURY)?)),
            _ => Err(Revert::unknown_method(method)),
        }
    }
}

/// A jar known to a factory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JarRecord {
    pub address: Address,
    pub config_link: String,
    /// Creation sequence number within the factory.
    pub created_at: u64,
    /// The logic contract this jar clones.
    pub implementation: Address,
}

#[derive(Debug, Clone, Copy)]
enum CreationState {
    Submitted,
    Confirmed,
    TimedOut,
    Rejected,
    EventFound,
    EventMissing,
}

/// Strictly parses a treasury literal. The zero address is not a treasury.
pub fn parse_treasury(literal: &str) -> Result<Address, RegistryError> {
    parse_address(literal)
        .and_then(ensure_nonzero)
        .map_err(|reason| RegistryError::InvalidTreasury {
            treasury: literal.to_owned(),
            reason,
        })
}

/// Client for a deployed factory.
#[derive(Debug, Clone)]
pub struct Factory {
    chain: LocalChain,
    address: Address,
    logic: Address,
    treasury: Address,
    sender: Address,
}

impl Factory {
    /// Submits a factory deployment bound to `logic` and `treasury`.
    ///
    /// The logic must be a confirmed `CryptoCaffeineBottle` deployment, and
    /// the treasury must be non-zero. Both are checked here and again by the
    /// factory constructor.
    pub async fn deploy(
        chain: &LocalChain,
        deployer: Address,
        logic: &LogicReference,
        treasury: Address,
    ) -> Result<PendingFactory, RegistryError> {
        let logic = logic
            .address()
            .map_err(|err| RegistryError::InvalidLogicReference {
                reason: err.to_string(),
            })?;
        if !is_logic_code(chain.code_at(logic).await.as_ref()) {
            return Err(RegistryError::InvalidLogicReference {
                reason: format!("{logic} is not a {} contract", caffeine_bottle::ARTIFACT),
            });
        }
        ensure_nonzero(treasury).map_err(|reason| RegistryError::InvalidTreasury {
            treasury: treasury.to_string(),
            reason,
        })?;

        let deployment = Deployment::submit(
            chain,
            deployer,
            ARTIFACT,
            json!({ "logic": logic, "treasury": treasury }),
        )
        .await?;
        Ok(PendingFactory {
            deployment,
            chain: chain.clone(),
            logic,
            treasury,
            sender: deployer,
        })
    }

    /// Deploys a factory and waits for it to be confirmed.
    pub async fn construct(
        chain: &LocalChain,
        deployer: Address,
        logic: &LogicReference,
        treasury: Address,
        timeout: Duration,
    ) -> Result<Self, RegistryError> {
        Self::deploy(chain, deployer, logic, treasury)
            .await?
            .wait_for_deployment(timeout)
            .await
    }

    /// Attaches to an existing factory. Transactions are sent from `sender`.
    pub async fn at(
        chain: &LocalChain,
        address: Address,
        sender: Address,
    ) -> Result<Self, RegistryError> {
        let expected = Code::Artifact {
            name: ARTIFACT.to_owned(),
        };
        if chain.code_at(address).await.as_ref() != Some(&expected) {
            return Err(RegistryError::UnexpectedContract {
                address,
                expected: ARTIFACT.to_owned(),
            });
        }

        let logic = chain.view_as(address, "logic", &Value::Null).await?;
        let treasury = chain.view_as(address, "treasury", &Value::Null).await?;
        Ok(Self {
            chain: chain.clone(),
            address,
            logic,
            treasury,
            sender,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn logic(&self) -> Address {
        self.logic
    }

    pub fn treasury(&self) -> Address {
        self.treasury
    }

    /// Submits a `createJar` request without waiting for it.
    pub async fn submit_jar(&self, config_link: &str) -> Result<PendingJar, RegistryError> {
        let request = TransactionRequest::call(
            self.sender,
            self.address,
            "createJar",
            json!({ "iframeLink": config_link }),
        );
        let pending = self
            .chain
            .submit(request)
            .await
            .map_err(|err| match err {
                ChainError::Rejected { reason } => {
                    warn!(factory = %self.address, state = ?CreationState::Rejected, %reason, "jar creation refused");
                    RegistryError::SubmissionFailure { reason }
                }
                other => other.into(),
            })?;

        info!(
            factory = %self.address,
            tx_hash = %pending.tx_hash(),
            state = ?CreationState::Submitted,
            "jar creation submitted"
        );
        Ok(PendingJar {
            factory: self.clone(),
            pending,
        })
    }

    /// Creates a jar and waits for the address to be discovered.
    pub async fn create_jar(
        &self,
        config_link: &str,
        timeout: Duration,
    ) -> Result<JarRecord, RegistryError> {
        self.submit_jar(config_link).await?.confirm(timeout).await
    }

    /// All jars in creation order, from confirmed state only.
    pub async fn list_jars(&self) -> Result<Vec<JarRecord>, RegistryError> {
        let jars: Vec<StoredJar> = self.view("getJars", Value::Null).await?;
        Ok(jars.into_iter().map(|jar| self.record(jar)).collect())
    }

    pub async fn jar(&self, index: u64) -> Result<JarRecord, RegistryError> {
        let jar: StoredJar = self.view("getJar", json!({ "index": index })).await?;
        Ok(self.record(jar))
    }

    pub async fn jar_count(&self) -> Result<u64, RegistryError> {
        self.view("jarCount", Value::Null).await
    }

    pub async fn is_jar(&self, address: Address) -> Result<bool, RegistryError> {
        self.view("isJar", json!({ "jar": address })).await
    }

    /// Looks at the stored receipt of an earlier creation.
    ///
    /// `None` means the creation has not been mined, or reverted. A mined
    /// creation without a `JarCreated` event is still an error.
    pub async fn reconcile(&self, tx_hash: TxHash) -> Result<Option<JarRecord>, RegistryError> {
        match self.chain.receipt(tx_hash).await {
            Some(receipt) if receipt.succeeded() => self.discover(&receipt).map(Some),
            Some(_) | None => Ok(None),
        }
    }

    /// Recovers the new jar from a `createJar` confirmation.
    pub fn discover(&self, receipt: &Receipt) -> Result<JarRecord, RegistryError> {
        let Some(event) = find_event::<JarCreated>(receipt, self.address) else {
            warn!(
                factory = %self.address,
                tx_hash = %receipt.tx_hash,
                state = ?CreationState::EventMissing,
                "confirmation carries no creation event"
            );
            return Err(RegistryError::MissingCreationEvent {
                tx_hash: receipt.tx_hash,
                event: JarCreated::NAME,
                emitter: self.address,
            });
        };
        let event = event?;

        info!(
            factory = %self.address,
            jar = %event.jar_address,
            index = event.index,
            state = ?CreationState::EventFound,
            "jar created"
        );
        Ok(JarRecord {
            address: event.jar_address,
            config_link: event.iframe_link,
            created_at: event.index,
            implementation: self.logic,
        })
    }

    fn record(&self, jar: StoredJar) -> JarRecord {
        JarRecord {
            address: jar.jar,
            config_link: jar.iframe_link,
            created_at: jar.created_at,
            implementation: self.logic,
        }
    }

    async fn view<T: DeserializeOwned>(&self, method: &str, args: Value) -> Result<T, RegistryError> {
        Ok(self.chain.view_as(self.address, method, &args).await?)
    }
}

/// A factory deployment that has been submitted.
#[derive(Debug)]
pub struct PendingFactory {
    deployment: Deployment,
    chain: LocalChain,
    logic: Address,
    treasury: Address,
    sender: Address,
}

impl PendingFactory {
    pub async fn wait_for_deployment(mut self, timeout: Duration) -> Result<Factory, RegistryError> {
        let address = match self.deployment.wait_for_deployment(timeout).await {
            Ok(address) => address,
            Err(RegistryError::DeploymentFailure { reason, .. }) if reason == "InvalidTreasury" => {
                return Err(RegistryError::InvalidTreasury {
                    treasury: self.treasury.to_string(),
                    reason: helpers::InvalidAddress::Zero,
                })
            }
            Err(RegistryError::DeploymentFailure { reason, .. })
                if reason == "InvalidLogicReference" =>
            {
                return Err(RegistryError::InvalidLogicReference {
                    reason: format!("{} is not a {} contract", self.logic, caffeine_bottle::ARTIFACT),
                })
            }
            Err(err) => return Err(err),
        };
        Ok(Factory {
            chain: self.chain,
            address,
            logic: self.logic,
            treasury: self.treasury,
            sender: self.sender,
        })
    }
}

/// A submitted `createJar` awaiting confirmation.
#[derive(Debug)]
pub struct PendingJar {
    factory: Factory,
    pending: PendingTransaction,
}

impl PendingJar {
    pub fn tx_hash(&self) -> TxHash {
        self.pending.tx_hash()
    }

    /// Waits for confirmation and recovers the jar from its event log.
    ///
    /// No retries happen here. After `UnconfirmedCreation` the creation may
    /// still land; use [`Factory::reconcile`] before trying again.
    pub async fn confirm(self, timeout: Duration) -> Result<JarRecord, RegistryError> {
        let PendingJar { factory, pending } = self;
        let tx_hash = pending.tx_hash();

        let receipt = match pending.wait(timeout).await {
            Ok(receipt) => receipt,
            Err(ChainError::Unconfirmed { .. }) => {
                warn!(factory = %factory.address, %tx_hash, state = ?CreationState::TimedOut, "jar creation not confirmed");
                return Err(RegistryError::UnconfirmedCreation { tx_hash });
            }
            Err(err) => return Err(err.into()),
        };

        if let Some(reason) = receipt.revert_reason() {
            warn!(factory = %factory.address, %tx_hash, %reason, state = ?CreationState::Rejected, "jar creation reverted");
            return Err(RegistryError::SubmissionFailure {
                reason: reason.to_owned(),
            });
        }
        info!(
            factory = %factory.address,
            %tx_hash,
            block = receipt.block_number,
            state = ?CreationState::Confirmed,
            "jar creation confirmed"
        );
        factory.discover(&receipt)
    }
}
