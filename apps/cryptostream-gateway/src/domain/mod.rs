//! Domain Layer - Market data types and pure business logic.
//!
//! Nothing in this layer performs I/O. Shared state (key rotation, subscriber
//! sets) is guarded by `parking_lot` locks so it can be used from any task.

/// Tracked assets and symbol normalization.
pub mod symbol;

/// Candles, snapshots, live updates and candle queries.
pub mod market;

/// Provider API key rotation and quarantine.
pub mod keys;

/// Stream subscriber registry.
pub mod subscription;
