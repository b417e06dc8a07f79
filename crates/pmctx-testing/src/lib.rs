//! Testing infrastructure for pmctx integration tests.
//!
//! - `ArchiveWorld`: isolated directory holding generated archives
//! - `fixtures`: declarative archive descriptions written to disk
//! - `transport`: scripted transport and counting binder for host contexts
//! - `assertions`: registry-level checks

pub mod assertions;
pub mod fixtures;
pub mod transport;
pub mod world;

pub use fixtures::ArchiveFixture;
pub use transport::{CountingBinder, MockTransport};
pub use world::{ArchiveWorld, CliResult};
