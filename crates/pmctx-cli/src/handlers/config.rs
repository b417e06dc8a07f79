use crate::types::OutputFormat;
use anyhow::{Result, bail};
use pmctx_runtime::{BackoffSchedule, ClientConfig};
use std::path::Path;

pub fn show(path: &Path, format: OutputFormat) -> Result<()> {
    let config = ClientConfig::load_from(path)?.apply_env();
    let backoff = BackoffSchedule::from_setting(config.reconnect_timeout.as_deref());
    let delays: Vec<u64> = backoff.delays().iter().map(|d| d.as_secs()).collect();

    match format {
        OutputFormat::Json => {
            let value = serde_json::json!({
                "path": path.display().to_string(),
                "exists": path.exists(),
                "config": config,
                "backoff_secs": delays,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Plain => {
            let state = if path.exists() { "" } else { " (not present, defaults)" };
            println!("# {}{}", path.display(), state);
            print!("{}", toml::to_string_pretty(&config)?);
            println!("# effective backoff: {:?}s", delays);
        }
    }
    Ok(())
}

pub fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    ClientConfig::default().save_to(path)?;
    println!("Wrote {}", path.display());
    Ok(())
}
