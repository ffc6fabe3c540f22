use alloy_primitives::Address;
use caffeine_bottle::{CryptoCaffeineBottle, LogicRegistry};
use caffeine_factory::{parse_treasury, CaffeineFactory, Factory, JarRecord};
use helpers::{Artifacts, ChainError, RegistryError, ScriptSetup};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};

/// Outcome of a script flow followed by saving the chain state.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("failed to save chain state: {0}")]
    Persist(#[from] ChainError),
}

/// Every contract the project can deploy.
pub fn artifacts() -> Artifacts {
    Artifacts::new()
        .with(caffeine_bottle::ARTIFACT, CryptoCaffeineBottle)
        .with(caffeine_factory::ARTIFACT, CaffeineFactory)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentSummary {
    pub logic: Address,
    pub factory: Address,
    pub treasury: Address,
}

impl From<&Factory> for DeploymentSummary {
    fn from(factory: &Factory) -> Self {
        Self {
            logic: factory.logic(),
            factory: factory.address(),
            treasury: factory.treasury(),
        }
    }
}

/// Picks the treasury: the explicit literal, then the configured one, then
/// the deployer account.
pub fn resolve_treasury(setup: &ScriptSetup, literal: Option<&str>) -> Result<Address, RegistryError> {
    match literal.or(setup.config.deployer.treasury.as_deref()) {
        Some(literal) => parse_treasury(literal),
        None => Ok(setup.deployer),
    }
}

/// Deploys the logic contract, then a factory bound to it.
pub async fn deploy_system(
    setup: &ScriptSetup,
    treasury: Option<&str>,
) -> Result<Factory, RegistryError> {
    let treasury = resolve_treasury(setup, treasury)?;
    let timeout = setup.confirmation_timeout();

    let mut logic = LogicRegistry::new(&setup.chain, setup.deployer).deploy().await?;
    let logic_address = logic.wait_for_deployment(timeout).await?;
    info!(logic = %logic_address, "logic contract deployed");

    let factory = Factory::construct(&setup.chain, setup.deployer, &logic, treasury, timeout).await?;
    info!(factory = %factory.address(), %treasury, "factory deployed");
    Ok(factory)
}

pub async fn create_jar(
    setup: &ScriptSetup,
    factory: Address,
    config_link: &str,
) -> Result<JarRecord, RegistryError> {
    let factory = Factory::at(&setup.chain, factory, setup.deployer).await?;
    factory
        .create_jar(config_link, setup.confirmation_timeout())
        .await
}

/// Saves the chain state whatever `result` is, since a failed flow may still
/// have landed transactions. A flow error wins over a save error.
pub async fn persist_after<T>(
    setup: &ScriptSetup,
    result: Result<T, RegistryError>,
) -> Result<T, FlowError> {
    let saved = setup.persist().await;
    match (result, saved) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(err)) => Err(FlowError::Persist(err)),
        (Err(err), saved) => {
            if let Err(save_err) = saved {
                error!(path = %setup.config.network.state_path.display(), %save_err, "failed to save chain state");
            }
            Err(FlowError::Registry(err))
        }
    }
}

pub async fn list_jars(setup: &ScriptSetup, factory: Address) -> Result<Vec<JarRecord>, RegistryError> {
    Factory::at(&setup.chain, factory, setup.deployer)
        .await?
        .list_jars()
        .await
}
