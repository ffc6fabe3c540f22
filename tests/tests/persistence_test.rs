use caffeine_project::FlowError;
use helpers::{setup_ephemeral, setup_script, ChainError, Config, RegistryError};
use tests::TREASURY;

fn config_in(dir: &tempfile::TempDir) -> Config {
    let mut config = Config::default();
    config.network.state_path = dir.path().join("chain").join("localhost.json");
    config
}

#[tokio::test]
async fn test_scripts_share_state_across_runs() -> anyhow::Result<()> {
    // Mirrors running deploy, then create-jar, then list-jars as separate processes
    let dir = tempfile::tempdir()?;
    let treasury = TREASURY.to_checksum(None);

    let deploy = setup_script(config_in(&dir), caffeine_project::artifacts()).await?;
    let factory = caffeine_project::deploy_system(&deploy, Some(treasury.as_str())).await?;
    deploy.persist().await?;
    drop(deploy);

    let create = setup_script(config_in(&dir), caffeine_project::artifacts()).await?;
    let jar = caffeine_project::create_jar(&create, factory.address(), "https://saved").await?;
    create.persist().await?;
    drop(create);

    let list = setup_script(config_in(&dir), caffeine_project::artifacts()).await?;
    let jars = caffeine_project::list_jars(&list, factory.address()).await?;
    assert_eq!(jars, vec![jar]);

    // Nonces survive the restart, so new addresses never collide with old ones
    let next = caffeine_project::create_jar(&list, factory.address(), "https://next").await?;
    assert_ne!(next.address, jars[0].address);
    assert_eq!(next.created_at, 1);

    Ok(())
}

#[tokio::test]
async fn test_corrupt_state_file_is_an_error() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = config_in(&dir);
    std::fs::create_dir_all(config.network.state_path.parent().expect("has parent"))?;
    std::fs::write(&config.network.state_path, b"{ not json")?;

    let result = setup_script(config, caffeine_project::artifacts()).await;
    assert!(matches!(result, Err(helpers::ChainError::Snapshot(_))));

    Ok(())
}

/// A chain whose state path is a directory, so every save fails.
fn unsavable(dir: &tempfile::TempDir) -> helpers::ScriptSetup {
    let mut config = Config::default();
    config.network.state_path = dir.path().to_path_buf();
    setup_ephemeral(config, caffeine_project::artifacts())
}

#[tokio::test]
async fn test_flow_error_outranks_save_error() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let setup = unsavable(&dir);

    let zero = alloy_primitives::Address::ZERO.to_string();
    let result = caffeine_project::deploy_system(&setup, Some(zero.as_str())).await;
    let err = caffeine_project::persist_after(&setup, result)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        FlowError::Registry(RegistryError::InvalidTreasury { .. })
    ));

    Ok(())
}

#[tokio::test]
async fn test_save_error_after_successful_flow() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let setup = unsavable(&dir);
    let treasury = TREASURY.to_checksum(None);

    let result = caffeine_project::deploy_system(&setup, Some(treasury.as_str())).await;
    assert!(result.is_ok());
    let err = caffeine_project::persist_after(&setup, result)
        .await
        .unwrap_err();

    assert!(matches!(err, FlowError::Persist(ChainError::Io(_))));

    Ok(())
}
