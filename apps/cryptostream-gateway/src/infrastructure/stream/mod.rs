//! Live Ticker Stream
//!
//! WebSocket client for the exchange's combined ticker stream.
//!
//! - [`codec`]: frame decoding into [`PriceUpdate`](crate::domain::market::PriceUpdate)
//! - [`reconnect`]: linear reconnect backoff
//! - [`TungsteniteTransport`]: the production [`StreamTransport`](crate::application::ports::StreamTransport)
//! - [`StreamConnection`]: session state machine and driver task
//! - [`StreamRegistry`]: shared connection plus subscriber registry

pub mod codec;
mod connection;
pub mod reconnect;
mod registry;
mod transport;

pub use connection::{ConnectionPhase, ConnectionState, StreamConfig, StreamConnection, StreamError};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use registry::StreamRegistry;
pub use transport::TungsteniteTransport;
