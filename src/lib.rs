pub mod config;
pub mod error;
pub mod kernel;
pub mod memory;
pub mod planner;
pub mod services;
pub mod telemetry;

pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use kernel::engine::{Capabilities, Engine, EngineOutcome, Reply};
pub use memory::{FactStore, SharedFactStore};
pub use planner::{AnswerSource, TaskStateMachine};
