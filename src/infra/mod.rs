//! Runtime bootstrap: telemetry, engine wiring and the top-level error type.

pub mod error;
pub mod runtime;
pub mod telemetry;
