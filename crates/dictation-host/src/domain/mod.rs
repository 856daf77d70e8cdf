//! Domain types for the host.

pub mod config;

pub use config::HostConfig;
