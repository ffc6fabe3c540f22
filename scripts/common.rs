//! Arguments and setup shared by every script.

use std::path::PathBuf;

use clap::Args;
use helpers::{setup_script, telemetry::init_tracing, Config, RegistryError, ScriptSetup};
use tracing::Level;

#[derive(Debug, Args)]
pub struct CommonArgs {
    /// Project configuration file.
    #[arg(long, env = "CAFFEINE_CONFIG", default_value = helpers::DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long, env = "CAFFEINE_JSON_LOGS")]
    pub json_logs: bool,

    /// Log level used when RUST_LOG is unset.
    #[arg(long, env = "CAFFEINE_LOG_LEVEL", default_value = "info")]
    pub log_level: Level,
}

impl CommonArgs {
    pub async fn setup(&self) -> anyhow::Result<ScriptSetup> {
        init_tracing(self.json_logs, self.log_level);
        let config = Config::load_or_default(&self.config).await?;
        Ok(setup_script(config, caffeine_project::artifacts()).await?)
    }
}

/// Reports a protocol failure with its stage and exits non-zero.
pub fn exit_with(err: RegistryError) -> ! {
    eprintln!("{} failed: {err}", err.stage());
    if err.is_ambiguous() {
        eprintln!("the jar may or may not exist; run list-jars before retrying");
    }
    std::process::exit(1)
}
