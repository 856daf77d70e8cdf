//! Infrastructure layer for the client library.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `dictation_core`, but is never imported by the application layer except
//! through the traits the application layer defines.
//!
//! # Sub-modules
//!
//! - **`discovery`** – mDNS browsing and the observable set of discovered
//!   hosts.
//!
//! - **`transport`** – `Connector` implementations: WebSocket for real hosts,
//!   an in-memory duplex for tests and in-process hosts.
//!
//! - **`storage`** – The TOML client configuration file.

pub mod discovery;
pub mod storage;
pub mod transport;
