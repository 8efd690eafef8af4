//! Runtime adapters used to run job bodies.

pub mod tokio_spawner;

pub use tokio_spawner::{Spawn, TokioSpawner};
