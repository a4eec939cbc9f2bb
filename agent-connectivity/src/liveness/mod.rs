//! Background liveness: auto-discovery, send failure handling, and ping.

pub mod discovery;
pub mod failure;
pub mod ping;
