// Context runtime
// Registry of contexts, per-thread current context, archive chains over a
// shared log cache, and reconnect backoff for live sources.

mod backoff;
mod binder;
mod config;
mod context;
mod controller;
mod current;
mod dump;
mod error;
mod global;
mod hostlink;
mod lifecycle;
mod lockorder;
mod logcontrol;
mod namespace;
mod registry;
mod sequencer;
mod transport;

// Public API
pub use backoff::{BackoffSchedule, BackoffState};
pub use binder::{DerivedMetricBinder, NoopBinder};
pub use config::{ClientConfig, DEFAULT_PMCD_PORT, resolve_config_path};
pub use context::{Context, LiveState, Payload};
pub use controller::{ArchiveController, MultiArchiveEntry};
pub use error::{Error, Result};
pub use global::{
    create_context, destroy_context, dump_contexts, duplicate_context, reconnect_context,
    registry, use_context, which_context,
};
pub use hostlink::{HostLink, LinkCache};
pub use logcontrol::{LogCache, LogControl};
pub use namespace::Namespace;
pub use registry::{ContextGuard, Registry, RegistryBuilder, SlotState};
pub use transport::{Connection, TcpTransport, Transport, TransportError};
