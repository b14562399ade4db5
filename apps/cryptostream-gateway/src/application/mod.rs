//! Application Layer - Use cases and port definitions.
//!
//! Services here combine domain types with the outbound ports; concrete
//! adapters live in the infrastructure layer.

/// Port interfaces for upstream market data and stream transports.
pub mod ports;

/// Historical candles, market snapshots and the live board.
pub mod services;
