//! [`Connector`](crate::application::link::Connector) implementations.
//!
//! - **`websocket`** – `ws://` links to real hosts via `tokio-tungstenite`.
//! - **`memory`** – in-process duplex links backed by `tokio` channels, used
//!   by tests and by hosts embedded in the same process.

pub mod memory;
pub mod websocket;

pub use memory::MemoryConnector;
pub use websocket::WsConnector;
