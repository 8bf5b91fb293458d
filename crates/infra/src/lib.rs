//! Infrastructure layer: storage backends, configuration and the engine
//! facade that runs every operation in its own transaction.

pub mod config;
pub mod engine;
pub mod memory;
pub mod postgres;

#[cfg(test)]
mod integration_tests;

pub use config::{ConfigError, EngineConfig, PostgresConfig};
pub use engine::InventoryEngine;
pub use memory::{InMemoryStore, MemoryTx};
pub use postgres::{PgTx, PostgresStore};
