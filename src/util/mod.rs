//! Shared utilities: clocks and telemetry setup.

pub mod clock;
pub mod telemetry;

pub use clock::*;
pub use telemetry::*;
