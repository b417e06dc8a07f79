pub mod config;
pub mod dump;
pub mod label;
pub mod probe;
