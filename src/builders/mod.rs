//! Builders that turn configuration into running pieces.

pub mod scheduler_builder;

pub use scheduler_builder::{build_registry, build_scheduler, SchedulerBuilder};
