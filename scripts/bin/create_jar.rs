//! Creates a tipping jar on an existing factory.

use anyhow::Context;
use caffeine_project::FlowError;
use clap::Parser;
use helpers::parse_address;

#[path = "../common.rs"]
mod common;

#[derive(Debug, Parser)]
#[command(about = "Create a new tipping jar")]
struct Cli {
    #[command(flatten)]
    common: common::CommonArgs,

    /// Address of the CaffeineFactory.
    #[arg(long, env = "CAFFEINE_FACTORY")]
    factory: String,

    /// Iframe link the jar displays.
    #[arg(long)]
    link: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let factory = parse_address(&cli.factory)
        .with_context(|| format!("invalid --factory {}", cli.factory))?;
    let setup = cli.common.setup().await?;

    println!("Creating a new tipping jar...");
    let result = caffeine_project::create_jar(&setup, factory, &cli.link).await;
    // The creation may have landed even when its confirmation did not.
    match caffeine_project::persist_after(&setup, result).await {
        Ok(jar) => println!("Success! New Jar created at: {}", jar.address),
        Err(FlowError::Registry(err)) => common::exit_with(err),
        Err(err) => return Err(err.into()),
    }

    Ok(())
}
