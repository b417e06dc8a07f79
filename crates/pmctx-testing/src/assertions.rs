//! Registry-level assertions.
//!
//! - Reference counts of shared archive logs
//! - Ordering of archive chains
//! - Slot table shape

use anyhow::{Context as _, Result};
use pmctx_runtime::{Registry, SlotState};
use pmctx_types::ContextHandle;

/// Assert the shared log for `name` has `expected` references (zero means
/// it must be gone from the cache).
pub fn assert_log_refcount(registry: &Registry, name: &str, expected: usize) -> Result<()> {
    let found = registry
        .cached_logs()
        .into_iter()
        .find(|(n, _)| n == name)
        .map(|(_, count)| count)
        .unwrap_or(0);
    if found != expected {
        anyhow::bail!(
            "Expected refcount {} for {}, got {} (cache: {:?})",
            expected,
            name,
            found,
            registry.cached_logs()
        );
    }
    Ok(())
}

/// Assert the archive chain of `handle` lists archives in this order.
pub fn assert_chain_order(
    registry: &Registry,
    handle: ContextHandle,
    names: &[&str],
) -> Result<()> {
    let actual: Vec<String> = registry
        .with_context(handle, |ctx| {
            ctx.archive()
                .map(|ctrl| ctrl.entries().iter().map(|e| e.name.clone()).collect::<Vec<_>>())
        })?
        .context("Context is not an archive context")?;
    let expected: Vec<String> = names.iter().map(|n| n.to_string()).collect();
    if actual != expected {
        anyhow::bail!("Expected chain {:?}, got {:?}", expected, actual);
    }
    Ok(())
}

/// Assert no slot is mid-creation or mid-teardown.
pub fn assert_slots_settled(registry: &Registry) -> Result<()> {
    for (i, state) in registry.slot_states().into_iter().enumerate() {
        if matches!(state, SlotState::Initializing | SlotState::TearingDown(_)) {
            anyhow::bail!("Slot {} is not settled: {:?}", i, state);
        }
    }
    Ok(())
}
