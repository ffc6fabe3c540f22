//! Fixtures shared by the integration tests.

use std::time::Duration;

use alloy_primitives::{address, Address};
use caffeine_factory::Factory;
use helpers::{setup_ephemeral, Config, ScriptSetup};

/// Checksummed treasury used across the scenarios.
pub const TREASURY: Address = address!("0x08669bb2714a578Af29c93C4569Ed25De014456F");

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Short enough to make withheld confirmations time out quickly.
pub const SHORT_TIMEOUT: Duration = Duration::from_millis(50);

/// A fresh in-memory chain with every project artifact registered.
pub fn test_setup() -> ScriptSetup {
    let mut config = Config::default();
    config.network.confirmation_timeout_ms = TIMEOUT.as_millis() as u64;
    setup_ephemeral(config, caffeine_project::artifacts())
}

/// A chain with the logic and a factory already deployed.
pub struct TestEnv {
    pub setup: ScriptSetup,
    pub factory: Factory,
}

impl TestEnv {
    pub async fn deploy() -> anyhow::Result<Self> {
        let setup = test_setup();
        let treasury = TREASURY.to_checksum(None);
        let factory = caffeine_project::deploy_system(&setup, Some(treasury.as_str())).await?;
        Ok(Self { setup, factory })
    }

    pub fn logic(&self) -> Address {
        self.factory.logic()
    }
}
