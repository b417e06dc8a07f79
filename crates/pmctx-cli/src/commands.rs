use super::args::{Cli, Commands, ConfigCommand};
use super::handlers;
use super::logging;
use anyhow::Result;
use pmctx_runtime::{ClientConfig, Registry, resolve_config_path};
use std::path::Path;

pub fn run(cli: Cli) -> Result<()> {
    logging::init(cli.log_level);

    let config_path = resolve_config_path(cli.config.as_deref())?;

    match cli.command {
        Commands::Config { command } => match command {
            ConfigCommand::Show => handlers::config::show(&config_path, cli.format),
            ConfigCommand::Init { force } => handlers::config::init(&config_path, force),
        },

        Commands::Label { target } => {
            let registry = open_registry(&config_path)?;
            handlers::label::handle(&registry, &target, cli.format)
        }

        Commands::Dump {
            targets,
            kind,
            duplicate,
            indom,
        } => {
            let registry = open_registry(&config_path)?;
            handlers::dump::handle(&registry, kind.into(), &targets, duplicate, indom)
        }

        Commands::Probe { host, retries } => {
            let registry = open_registry(&config_path)?;
            handlers::probe::handle(&registry, &host, retries, cli.format)
        }
    }
}

fn open_registry(config_path: &Path) -> Result<Registry> {
    let config = ClientConfig::load_from(config_path)?.apply_env();
    Ok(Registry::new(config))
}
