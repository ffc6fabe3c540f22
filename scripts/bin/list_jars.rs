use anyhow::Context;
use clap::Parser;
use helpers::parse_address;

#[path = "../common.rs"]
mod common;

#[derive(Debug, Parser)]
#[command(about = "List the jars of a factory in creation order")]
struct Cli {
    #[command(flatten)]
    common: common::CommonArgs,

    #[arg(long, env = "CAFFEINE_FACTORY")]
    factory: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let factory = parse_address(&cli.factory)
        .with_context(|| format!("invalid --factory {}", cli.factory))?;
    let setup = cli.common.setup().await?;

    let jars = match caffeine_project::list_jars(&setup, factory).await {
        Ok(jars) => jars,
        Err(err) => common::exit_with(err),
    };
    if jars.is_empty() {
        println!("No jars yet.");
    }
    for jar in jars {
        println!("#{} {} {:?}", jar.created_at, jar.address, jar.config_link);
    }

    Ok(())
}
