#![doc = include_str!("../README.md")]

mod commands;
mod config;
mod telemetry;

use clap::Parser;
use config::{AppConfig, CliArgs, Command};

// mimalloc holds up better than the system allocator under the many short-lived
// tasks a simulation spawns.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = AppConfig::try_from(args)?;

    telemetry::init_telemetry(config.log_format)?;
    if cfg!(debug_assertions) {
        tracing::debug!("Starting beacon with config: {:#?}", config);
    }

    let output = match &config.command {
        Command::Rings(args) => commands::rings(&config, args)?,
        Command::Decode(args) => commands::decode(args)?,
        Command::PushKey(args) => commands::push_keys(args),
        Command::Simulate(args) => commands::simulate(&config, args).await?,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
