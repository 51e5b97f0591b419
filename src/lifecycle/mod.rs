//! Engine assembly and lifecycle: builder, background upkeep tasks and shutdown.

pub mod config;
pub mod engine;
pub mod error;
pub mod sweeper;
pub mod types;


pub use config::{DEFAULT_FLUSH_INTERVAL_SECS, DEFAULT_INGEST_CHUNK_SIZE, LifecycleConfig};
pub use engine::{Engine, EngineBuilder};
pub use error::{LifecycleError, LifecycleResult};
pub use sweeper::Sweeper;
pub use types::ShutdownReport;
