mod args;
mod commands;
mod handlers;
mod logging;
pub mod types;

pub use args::{Cli, Commands, ConfigCommand};
pub use commands::run;
