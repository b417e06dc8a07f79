use anyhow::{Context as _, Result};
use pmctx_runtime::Registry;
use pmctx_types::ContextKind;

pub fn handle(
    registry: &Registry,
    kind: ContextKind,
    targets: &[String],
    duplicate: bool,
    indom: Option<u32>,
) -> Result<()> {
    for target in targets {
        registry
            .create_context(kind, target)
            .with_context(|| format!("opening {} {}", kind, target))?;
    }
    if duplicate {
        registry.duplicate_context()?;
    }
    print!("{}", registry.dump_contexts_indom(None, indom));

    for handle in registry.handles() {
        registry.destroy_context(handle)?;
    }
    Ok(())
}
