use caffeine_bottle::{LogicReference, LogicRegistry};
use caffeine_factory::{CaffeineFactory, Factory};
use helpers::{
    setup_ephemeral, Artifacts, CallContext, Config, Contract, Fault, RegistryError, Revert, Stage,
};
use serde_json::Value;
use tests::{test_setup, TestEnv, SHORT_TIMEOUT, TIMEOUT, TREASURY};

/// Logic whose clones can never be initialized.
struct SealedBottle;

impl Contract for SealedBottle {
    fn call(&self, _ctx: &mut CallContext<'_>, method: &str, _args: &Value) -> Result<Value, Revert> {
        match method {
            "initialize" => Err(Revert::new("InitializerDisabled")),
            _ => Err(Revert::unknown_method(method)),
        }
    }
}

#[tokio::test]
async fn test_missing_creation_event() -> anyhow::Result<()> {
    // A confirmation without JarCreated is its own error and leaves the registry untouched
    let env = TestEnv::deploy().await?;
    env.factory.create_jar("https://before", TIMEOUT).await?;

    env.setup.chain.inject_fault(Fault::EmptyReceipt).await;
    let err = env
        .factory
        .create_jar("https://a", TIMEOUT)
        .await
        .unwrap_err();

    assert!(matches!(err, RegistryError::MissingCreationEvent { .. }));
    assert_eq!(err.stage(), Stage::Discovery);
    assert!(err.is_ambiguous());
    assert_eq!(env.factory.list_jars().await?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_rejected_submission() -> anyhow::Result<()> {
    let env = TestEnv::deploy().await?;

    env.setup
        .chain
        .inject_fault(Fault::Reject("nonce too low".into()))
        .await;
    let err = env
        .factory
        .create_jar("https://a", TIMEOUT)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RegistryError::SubmissionFailure { ref reason } if reason == "nonce too low"
    ));
    assert_eq!(err.stage(), Stage::Creation);
    assert!(!err.is_ambiguous());
    assert!(env.factory.list_jars().await?.is_empty());

    // The next attempt goes through
    env.factory.create_jar("https://a", TIMEOUT).await?;
    assert_eq!(env.factory.list_jars().await?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_unconfirmed_creation_then_reconcile() -> anyhow::Result<()> {
    let env = TestEnv::deploy().await?;

    env.setup.chain.inject_fault(Fault::WithholdReceipt).await;
    let pending = env.factory.submit_jar("https://slow").await?;
    let tx_hash = pending.tx_hash();
    let err = pending.confirm(SHORT_TIMEOUT).await.unwrap_err();

    assert!(matches!(err, RegistryError::UnconfirmedCreation { tx_hash: hash } if hash == tx_hash));
    assert!(err.is_ambiguous());

    // The creation did land; reconciling finds it instead of retrying
    env.setup.chain.wait_for_receipt(tx_hash, TIMEOUT).await?;
    let jar = env
        .factory
        .reconcile(tx_hash)
        .await?
        .expect("creation was mined");
    assert_eq!(env.factory.list_jars().await?, vec![jar]);

    Ok(())
}

#[tokio::test]
async fn test_reconcile_unknown_transaction() -> anyhow::Result<()> {
    let env = TestEnv::deploy().await?;
    let unknown = alloy_primitives::B256::repeat_byte(0x42);

    assert_eq!(env.factory.reconcile(unknown).await?, None);

    Ok(())
}

#[tokio::test]
async fn test_unconfirmed_logic_is_not_a_reference() -> anyhow::Result<()> {
    let setup = test_setup();
    let registry = LogicRegistry::new(&setup.chain, setup.deployer);

    setup.chain.inject_fault(Fault::WithholdReceipt).await;
    let mut logic = registry.deploy().await?;
    let err = logic.wait_for_deployment(SHORT_TIMEOUT).await.unwrap_err();
    assert!(matches!(err, RegistryError::NotYetConfirmed { .. }));
    assert!(matches!(
        LogicRegistry::address_of(&logic),
        Err(RegistryError::NotYetConfirmed { .. })
    ));

    let err = Factory::deploy(&setup.chain, setup.deployer, &logic, TREASURY)
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::InvalidLogicReference { .. }));

    // Once confirmed the same reference becomes usable
    logic.wait_for_deployment(TIMEOUT).await?;
    Factory::construct(&setup.chain, setup.deployer, &logic, TREASURY, TIMEOUT).await?;

    Ok(())
}

#[tokio::test]
async fn test_factory_and_jar_are_not_logic() -> anyhow::Result<()> {
    // Only the deployed logic contract can back a factory, not other contracts with code
    let env = TestEnv::deploy().await?;
    let jar = env.factory.create_jar("https://a", TIMEOUT).await?;
    let blocks = env.setup.chain.block_number().await;

    for not_logic in [env.factory.address(), jar.address] {
        let err = Factory::construct(
            &env.setup.chain,
            env.setup.deployer,
            &LogicReference::existing(not_logic),
            TREASURY,
            TIMEOUT,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidLogicReference { .. }));
        assert_eq!(err.stage(), Stage::Construction);
    }

    // Rejected before submission, so nothing was mined
    assert_eq!(env.setup.chain.block_number().await, blocks);

    Ok(())
}

#[tokio::test]
async fn test_reverted_creation() -> anyhow::Result<()> {
    // A createJar that reverts is a submission failure, not an ambiguous outcome
    let setup = setup_ephemeral(
        Config::default(),
        Artifacts::new()
            .with(caffeine_bottle::ARTIFACT, SealedBottle)
            .with(caffeine_factory::ARTIFACT, CaffeineFactory),
    );
    let mut logic = LogicRegistry::new(&setup.chain, setup.deployer).deploy().await?;
    logic.wait_for_deployment(TIMEOUT).await?;
    let factory =
        Factory::construct(&setup.chain, setup.deployer, &logic, TREASURY, TIMEOUT).await?;

    let pending = factory.submit_jar("https://a").await?;
    let tx_hash = pending.tx_hash();
    let err = pending.confirm(TIMEOUT).await.unwrap_err();

    assert!(matches!(
        err,
        RegistryError::SubmissionFailure { ref reason } if reason == "InitializerDisabled"
    ));
    assert_eq!(err.stage(), Stage::Creation);
    assert!(!err.is_ambiguous());
    assert!(factory.list_jars().await?.is_empty());
    assert_eq!(factory.jar_count().await?, 0);
    assert_eq!(factory.reconcile(tx_hash).await?, None);

    Ok(())
}

#[tokio::test]
async fn test_attach_to_non_factory() -> anyhow::Result<()> {
    let env = TestEnv::deploy().await?;

    let err = caffeine_project::list_jars(&env.setup, env.logic())
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::UnexpectedContract { .. }));
    assert_eq!(err.stage(), Stage::Query);

    let err = caffeine_project::list_jars(&env.setup, TREASURY)
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::UnexpectedContract { .. }));

    Ok(())
}
