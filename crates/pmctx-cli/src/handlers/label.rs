use crate::types::OutputFormat;
use anyhow::{Context as _, Result};
use is_terminal::IsTerminal;
use owo_colors::OwoColorize;
use pmctx_runtime::Registry;
use pmctx_types::ContextKind;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct LabelView {
    name: String,
    hostname: String,
    timezone: String,
    zoneinfo: Option<String>,
    start: String,
    start_time: Option<String>,
    active: bool,
}

pub fn handle(registry: &Registry, target: &str, format: OutputFormat) -> Result<()> {
    let handle = registry
        .create_context(ContextKind::Archive, target)
        .with_context(|| format!("opening {}", target))?;

    let (views, metrics) = registry.with_context(handle, |ctx| {
        let Some(ctrl) = ctx.archive() else {
            return (Vec::new(), 0);
        };
        let views = ctrl
            .entries()
            .iter()
            .enumerate()
            .map(|(i, e)| LabelView {
                name: e.name.clone(),
                hostname: e.hostname.clone(),
                timezone: e.timezone.clone(),
                zoneinfo: e.zoneinfo.clone(),
                start: e.start.to_string(),
                start_time: e.start.to_datetime().map(|t| t.to_rfc3339()),
                active: i == ctrl.current_archive(),
            })
            .collect::<Vec<_>>();
        (views, ctrl.namespace().len())
    })?;
    registry.destroy_context(handle)?;

    match format {
        OutputFormat::Json => {
            let value = serde_json::json!({ "archives": views, "metrics": metrics });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Plain => {
            let color = std::io::stdout().is_terminal();
            for view in &views {
                if color {
                    println!("{}", view.name.bold());
                } else {
                    println!("{}", view.name);
                }
                println!("  host:     {}", view.hostname);
                println!("  timezone: {}", view.timezone);
                match &view.start_time {
                    Some(t) => println!("  start:    {} ({})", view.start, t),
                    None => println!("  start:    {}", view.start),
                }
            }
            println!("{} archive(s), {} metric(s)", views.len(), metrics);
        }
    }
    Ok(())
}
