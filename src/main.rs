//! gridsync CLI
//!
//! Inspect, edit and sync a saved dashboard layout from the command line.

use clap::Parser;
use env_logger::Env;
use log::debug;

use gridsync::cli::{commands, Cli, Commands};
use gridsync::EngineConfig;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    let mut config = EngineConfig::resolve(cli.config.as_deref())?;
    if let Some(dir) = cli.storage_dir {
        config.storage_dir = dir;
    }
    debug!("gridsync v{} using {}", env!("CARGO_PKG_VERSION"), config.storage_dir.display());

    match cli.command {
        Commands::Show { json } => commands::show(&config, json),
        Commands::Add {
            id,
            component,
            x,
            y,
            w,
            h,
            props,
            pinned,
        } => commands::add(&config, &id, &component, (x, y, w, h), props.as_deref(), pinned),
        Commands::Remove { id } => commands::remove(&config, &id),
        Commands::Update {
            id,
            x,
            y,
            w,
            h,
            component,
        } => commands::update(&config, &id, (x, y, w, h), component),
        Commands::Migrate => commands::migrate(&config),
        Commands::Records { since, clear } => commands::records(&config, since.as_deref(), clear),
        Commands::Push => commands::push(&config),
        Commands::Watch { seconds } => commands::watch(&config, seconds),
        Commands::Shell => commands::shell(&config),
    }
}
