//! Deploys the logic contract and a factory bound to it.

use caffeine_project::FlowError;
use clap::Parser;

#[path = "../common.rs"]
mod common;

#[derive(Debug, Parser)]
#[command(about = "Deploy CryptoCaffeineBottle and CaffeineFactory")]
struct Cli {
    #[command(flatten)]
    common: common::CommonArgs,

    /// Treasury for the factory. Defaults to the deployer account.
    #[arg(long, env = "CAFFEINE_TREASURY")]
    treasury: Option<String>,

    /// Print the deployed addresses as JSON.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let setup = cli.common.setup().await?;

    let result = caffeine_project::deploy_system(&setup, cli.treasury.as_deref()).await;
    let summary = match caffeine_project::persist_after(&setup, result).await {
        Ok(factory) => caffeine_project::DeploymentSummary::from(&factory),
        Err(FlowError::Registry(err)) => common::exit_with(err),
        Err(err) => return Err(err.into()),
    };
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }
    println!("1. Logic Contract deployed to: {}", summary.logic);
    println!("2. Factory Contract deployed to: {}", summary.factory);
    println!("   Treasury: {}", summary.treasury);

    Ok(())
}
