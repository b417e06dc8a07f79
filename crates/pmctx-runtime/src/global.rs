// Process-wide registry used by the free functions.

use crate::config::ClientConfig;
use crate::error::Result;
use crate::registry::Registry;
use once_cell::sync::Lazy;
use pmctx_types::{ContextHandle, ContextKind};
use tracing::warn;

static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let config = ClientConfig::load().unwrap_or_else(|err| {
        warn!(error = %err, "could not load client config, using defaults");
        ClientConfig::default().apply_env()
    });
    Registry::new(config)
});

/// The process-wide registry.
pub fn registry() -> &'static Registry {
    &REGISTRY
}

pub fn create_context(kind: ContextKind, target: &str) -> Result<ContextHandle> {
    registry().create_context(kind, target)
}

pub fn duplicate_context() -> Result<ContextHandle> {
    registry().duplicate_context()
}

pub fn use_context(handle: ContextHandle) -> Result<()> {
    registry().use_context(handle)
}

pub fn which_context() -> Result<ContextHandle> {
    registry().which_context()
}

pub fn reconnect_context(handle: ContextHandle) -> Result<ContextHandle> {
    registry().reconnect_context(handle)
}

pub fn destroy_context(handle: ContextHandle) -> Result<()> {
    registry().destroy_context(handle)
}

pub fn dump_contexts(target: Option<ContextHandle>) -> String {
    registry().dump_contexts(target)
}
