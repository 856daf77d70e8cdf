//! Storage infrastructure: the client configuration file.

pub mod config;
