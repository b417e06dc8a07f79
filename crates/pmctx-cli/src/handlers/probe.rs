use crate::types::OutputFormat;
use anyhow::Result;
use pmctx_runtime::{Error, Registry};
use pmctx_types::ContextKind;
use tracing::info;

pub fn handle(registry: &Registry, host: &str, retries: u32, format: OutputFormat) -> Result<()> {
    let schedule = registry.backoff_schedule();

    let mut attempt: u32 = 0;
    loop {
        match registry.create_context(ContextKind::Host, host) {
            Ok(handle) => {
                let peer =
                    registry.with_context(handle, |ctx| ctx.live().and_then(|l| l.peer()))?;
                report(format, host, peer.as_deref(), attempt)?;
                registry.destroy_context(handle)?;
                return Ok(());
            }
            Err(Error::ConnectFailed(reason)) if attempt < retries => {
                let wait = schedule.delay_for(attempt as usize);
                info!(%reason, wait_secs = wait.as_secs(), "connect failed, retrying");
                std::thread::sleep(wait);
                attempt += 1;
            }
            Err(Error::ConnectFailed(reason)) => {
                report(format, host, None, attempt)?;
                anyhow::bail!("could not connect to {}: {}", host, reason);
            }
            Err(err) => return Err(err.into()),
        }
    }
}

fn report(format: OutputFormat, host: &str, peer: Option<&str>, retries: u32) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let value = serde_json::json!({
                "host": host,
                "connected": peer.is_some(),
                "peer": peer,
                "retries": retries,
            });
            println!("{}", serde_json::to_string(&value)?);
        }
        OutputFormat::Plain => match peer {
            Some(peer) => println!("{}: connected to {}", host, peer),
            None => println!("{}: not connected after {} retries", host, retries),
        },
    }
    Ok(())
}
