pub mod config;
pub mod engine;
pub mod hooks;
pub mod limits;
pub mod model;
pub mod observability;
pub mod validation;

pub use config::ChainConfig;
pub use engine::{DataLayer, Engine, EngineError, Outcome};
pub use hooks::IntervalChainMaintainer;
pub use model::{IntervalRecord, Ms, MINUTE_MS};
pub use validation::{Field, Message, ValidationErrors, ValidationResult};
