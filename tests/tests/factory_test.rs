use std::collections::HashSet;

use caffeine_bottle::Bottle;
use caffeine_factory::JarCreated;
use helpers::{events::matching_logs, ContractEvent, RegistryError, Stage, TransactionRequest};
use serde_json::json;
use tests::{test_setup, TestEnv, TIMEOUT, TREASURY};

#[tokio::test]
async fn test_single_jar_creation() -> anyhow::Result<()> {
    // Deploy L, Factory(L, T), createJar("https://a"): one record with the link
    let env = TestEnv::deploy().await?;

    let jar = env.factory.create_jar("https://a", TIMEOUT).await?;
    let jars = env.factory.list_jars().await?;

    assert_eq!(jars, vec![jar.clone()]);
    assert_eq!(jar.config_link, "https://a");
    assert_ne!(jar.address, env.logic());
    assert_ne!(jar.address, TREASURY);
    assert_eq!(jar.implementation, env.logic());

    Ok(())
}

#[tokio::test]
async fn test_duplicate_links_create_distinct_jars() -> anyhow::Result<()> {
    let env = TestEnv::deploy().await?;

    let first = env.factory.create_jar("https://dup", TIMEOUT).await?;
    let second = env.factory.create_jar("https://dup", TIMEOUT).await?;

    assert_ne!(first.address, second.address);
    let jars = env.factory.list_jars().await?;
    assert_eq!(jars.len(), 2);
    assert!(jars.iter().all(|jar| jar.config_link == "https://dup"));

    Ok(())
}

#[tokio::test]
async fn test_addresses_distinct_and_ordered() -> anyhow::Result<()> {
    let env = TestEnv::deploy().await?;

    let mut created = Vec::new();
    for i in 0..8 {
        created.push(env.factory.create_jar(&format!("https://jar/{i}"), TIMEOUT).await?);
    }

    let unique: HashSet<_> = created.iter().map(|jar| jar.address).collect();
    assert_eq!(unique.len(), created.len());
    assert_eq!(env.factory.list_jars().await?, created);
    assert!(created
        .iter()
        .enumerate()
        .all(|(i, jar)| jar.created_at == i as u64));

    Ok(())
}

#[tokio::test]
async fn test_concurrent_creations_follow_confirmation_order() -> anyhow::Result<()> {
    // Several creations in flight at once are serialized by the chain
    let env = TestEnv::deploy().await?;

    let mut pending = Vec::new();
    for i in 0..5 {
        pending.push(env.factory.submit_jar(&format!("https://concurrent/{i}")).await?);
    }
    let handles: Vec<_> = pending
        .into_iter()
        .map(|jar| tokio::spawn(jar.confirm(TIMEOUT)))
        .collect();

    let mut confirmed = Vec::new();
    for handle in handles {
        confirmed.push(handle.await??);
    }
    confirmed.sort_by_key(|jar| jar.created_at);

    let listed = env.factory.list_jars().await?;
    assert_eq!(listed, confirmed);
    let links: Vec<_> = listed.iter().map(|jar| jar.config_link.as_str()).collect();
    assert_eq!(
        links,
        (0..5)
            .map(|i| format!("https://concurrent/{i}"))
            .collect::<Vec<_>>()
    );

    Ok(())
}

#[tokio::test]
async fn test_list_jars_is_idempotent() -> anyhow::Result<()> {
    let env = TestEnv::deploy().await?;
    assert!(env.factory.list_jars().await?.is_empty());

    env.factory.create_jar("https://x", TIMEOUT).await?;
    let first = env.factory.list_jars().await?;
    let second = env.factory.list_jars().await?;
    assert_eq!(first, second);
    assert_eq!(env.factory.jar_count().await?, 1);

    Ok(())
}

#[tokio::test]
async fn test_receipt_event_round_trip() -> anyhow::Result<()> {
    // Each confirmation carries exactly one JarCreated whose address is listed
    let env = TestEnv::deploy().await?;

    for link in ["https://one", "https://two"] {
        let pending = env.factory.submit_jar(link).await?;
        let tx_hash = pending.tx_hash();
        let jar = pending.confirm(TIMEOUT).await?;

        let receipt = env.setup.chain.receipt(tx_hash).await.expect("receipt is stored");
        let events: Vec<_> =
            matching_logs(&receipt, JarCreated::NAME, env.factory.address()).collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].args["jarAddress"], json!(jar.address));
        assert!(env.factory.list_jars().await?.contains(&jar));
    }

    Ok(())
}

#[tokio::test]
async fn test_empty_link_is_stored_verbatim() -> anyhow::Result<()> {
    let env = TestEnv::deploy().await?;

    let jar = env.factory.create_jar("", TIMEOUT).await?;
    assert_eq!(jar.config_link, "");
    assert_eq!(env.factory.list_jars().await?[0].config_link, "");
    assert_eq!(Bottle::at(&env.setup.chain, jar.address).iframe_link().await?, "");

    Ok(())
}

#[tokio::test]
async fn test_jar_views() -> anyhow::Result<()> {
    let env = TestEnv::deploy().await?;
    let jar = env.factory.create_jar("https://views", TIMEOUT).await?;

    let bottle = Bottle::at(&env.setup.chain, jar.address);
    assert_eq!(bottle.treasury().await?, TREASURY);
    assert_eq!(bottle.factory().await?, env.factory.address());
    assert!(env.factory.is_jar(jar.address).await?);

    // A jar cannot be re-initialized by anyone
    let receipt = env
        .setup
        .chain
        .submit(TransactionRequest::call(
            env.setup.accounts[1],
            jar.address,
            "initialize",
            json!({ "iframeLink": "https://hijack", "treasury": env.setup.accounts[1] }),
        ))
        .await?
        .wait(TIMEOUT)
        .await?;
    assert_eq!(receipt.revert_reason(), Some("AlreadyInitialized"));
    assert_eq!(bottle.iframe_link().await?, "https://views");

    Ok(())
}

#[tokio::test]
async fn test_zero_treasury_prevents_factory() -> anyhow::Result<()> {
    let setup = test_setup();

    let err = caffeine_project::deploy_system(
        &setup,
        Some("0x0000000000000000000000000000000000000000"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, RegistryError::InvalidTreasury { .. }));
    assert_eq!(err.stage(), Stage::Construction);

    // Nothing was deployed, not even the logic
    assert_eq!(setup.chain.block_number().await, 0);

    Ok(())
}

#[tokio::test]
async fn test_treasury_defaults_to_deployer() -> anyhow::Result<()> {
    let setup = test_setup();

    let factory = caffeine_project::deploy_system(&setup, None).await?;
    assert_eq!(factory.treasury(), setup.deployer);

    Ok(())
}

#[tokio::test]
async fn test_deployment_summary_json() -> anyhow::Result<()> {
    // deploy --json prints these three addresses
    let env = TestEnv::deploy().await?;
    let summary = caffeine_project::DeploymentSummary::from(&env.factory);

    assert_eq!(
        serde_json::to_value(&summary)?,
        json!({
            "logic": env.logic(),
            "factory": env.factory.address(),
            "treasury": TREASURY,
        })
    );

    Ok(())
}
