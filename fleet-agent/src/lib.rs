//! Fleet agent connectivity SDK facade.
//!
//! Bundles the agent's connectivity crates behind feature flags so embedders
//! can pull in only the pieces they need.

#![warn(missing_docs, clippy::pedantic)]

/// Re-export shared primitives for convenience.
pub use agent_primitives as primitives;

/// Durable agent configuration (enabled by `config` feature).
#[cfg(feature = "config")]
pub use agent_config as config;

/// Logging bootstrap (enabled by `telemetry` feature).
#[cfg(feature = "telemetry")]
pub use agent_telemetry as telemetry;

/// Registration, failover, and liveness (enabled by `connectivity` feature).
#[cfg(feature = "connectivity")]
pub use agent_connectivity as connectivity;
