// Public modules
pub mod application;
pub mod engine;
pub mod error;
pub mod params;
pub mod render;
pub mod sink;
pub mod ssh;
pub mod target;
pub mod template;

// Internal modules - not part of public API
pub(crate) mod paths;

// Re-export common types for convenience
pub use error::{Error, ErrorCode, Result};
pub use template::{
    CommandSpec, CommandType, ExecuteOn, ExecutionRecord, ParameterSpec, ParameterType, TaskType,
    Template, EXIT_NOT_EXECUTED, EXIT_TIMEOUT,
};
