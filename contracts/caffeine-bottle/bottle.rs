//! CryptoCaffeineBottle: the tip jar logic shared by every jar.
//!
//! The logic contract is deployed once. Jars are minimal clones of it, each
//! with its own storage, initialized by the factory that created them.

use std::time::Duration;

use alloy_primitives::Address;
use helpers::{CallContext, Contract, Deployment, LocalChain, RegistryError, Revert};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const ARTIFACT: &str = "CryptoCaffeineBottle";

const INITIALIZED: &str = "initialized";
const IFRAME_LINK: &str = "iframeLink";
const TREASURY: &str = "treasury";
const FACTORY: &str = "factory";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeArgs {
    pub iframe_link: String,
    pub treasury: Address,
}

/// Contract code for the logic and all of its clones.
pub struct CryptoCaffeineBottle;

impl Contract for CryptoCaffeineBottle {
    fn construct(&self, ctx: &mut CallContext<'_>, _args: &Value) -> Result<(), Revert> {
        // The template itself must never become a jar.
        ctx.store(INITIALIZED, &true)
    }

    fn call(&self, ctx: &mut CallContext<'_>, method: &str, args: &Value) -> Result<Value, Revert> {
        match method {
            "initialize" => {
                if ctx.load::<bool>(INITIALIZED)?.unwrap_or(false) {
                    return Err(Revert::new("AlreadyInitialized"));
                }
                let InitializeArgs {
                    iframe_link,
                    treasury,
                } = InitializeArgs::deserialize(args)?;
                if treasury.is_zero() {
                    return Err(Revert::new("InvalidTreasury"));
                }

                let factory = ctx.caller();
                ctx.store(INITIALIZED, &true)?;
                ctx.store(IFRAME_LINK, &iframe_link)?;
                ctx.store(TREASURY, &treasury)?;
                ctx.store(FACTORY, &factory)?;
                Ok(Value::Null)
            }
            "initialized" => Ok(json!(ctx.load::<bool>(INITIALIZED)?.unwrap_or(false))),
            "iframeLink" => Ok(json!(ctx.load::<String>(IFRAME_LINK)?.unwrap_or_default())),
            "treasury" => Ok(json!(ctx.load::<Address>(TREASURY)?.unwrap_or_default())),
            "factory" => Ok(json!(ctx.load::<Address>(FACTORY)?.unwrap_or_default())),
            _ => Err(Revert::unknown_method(method)),
        }
    }
}

/// Deploys logic contracts from a single deployer account.
#[derive(Debug, Clone)]
pub struct LogicRegistry {
    chain: LocalChain,
    deployer: Address,
}

impl LogicRegistry {
    pub fn new(chain: &LocalChain, deployer: Address) -> Self {
        Self {
            chain: chain.clone(),
            deployer,
        }
    }

    /// Submits a new logic deployment. Not idempotent: each call produces a
    /// distinct reference.
    pub async fn deploy(&self) -> Result<LogicReference, RegistryError> {
        let deployment = Deployment::submit(&self.chain, self.deployer, ARTIFACT, Value::Null).await?;
        Ok(LogicReference {
            source: Source::Deployed(deployment),
        })
    }

    pub fn address_of(reference: &LogicReference) -> Result<Address, RegistryError> {
        reference.address()
    }
}

#[derive(Debug)]
enum Source {
    Deployed(Deployment),
    Existing(Address),
}

/// Handle to a logic implementation.
#[derive(Debug)]
pub struct LogicReference {
    source: Source,
}

impl LogicReference {
    /// A reference to logic that was deployed in an earlier run.
    pub fn existing(address: Address) -> Self {
        Self {
            source: Source::Existing(address),
        }
    }

    /// `NotYetConfirmed` until the deployment has been confirmed.
    pub fn address(&self) -> Result<Address, RegistryError> {
        match &self.source {
            Source::Deployed(deployment) => deployment.address(),
            Source::Existing(address) => Ok(*address),
        }
    }

    pub async fn wait_for_deployment(&mut self, timeout: Duration) -> Result<Address, RegistryError> {
        match &mut self.source {
            Source::Deployed(deployment) => deployment.wait_for_deployment(timeout).await,
            Source::Existing(address) => Ok(*address),
        }
    }
}

/// Read-only client for a single jar.
#[derive(Debug, Clone)]
pub struct Bottle {
    chain: LocalChain,
    address: Address,
}

impl Bottle {
    pub fn at(chain: &LocalChain, address: Address) -> Self {
        Self {
            chain: chain.clone(),
            address,
        }
    }

    pub async fn iframe_link(&self) -> Result<String, RegistryError> {
        self.view("iframeLink").await
    }

    pub async fn treasury(&self) -> Result<Address, RegistryError> {
        self.view("treasury").await
    }

    /// The factory that initialized this jar.
    pub async fn factory(&self) -> Result<Address, RegistryError> {
        self.view("factory").await
    }

    pub async fn is_initialized(&self) -> Result<bool, RegistryError> {
        self.view("initialized").await
    }

    async fn view<T: serde::de::DeserializeOwned>(&self, method: &str) -> Result<T, RegistryError> {
        Ok(self.chain.view_as(self.address, method, &Value::Null).await?)
    }
}
