// Library interface for galaxy
// The binary and the integration tests both go through these modules

pub mod cache;
pub mod checkpoint;
pub mod chunk;
pub mod cli;
pub mod cli_utils;
pub mod commands;
pub mod config;
pub mod config_discovery;
pub mod contract;
pub mod demo;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod handler;
pub mod logging;
pub mod resume;
pub mod step;
pub mod storage;
pub mod template;
pub mod workflow;

// Re-export commonly used types
pub use config::GalaxyConfig;
pub use config_discovery::discover_config;
pub use contract::{ShapeSpec, ValueType, WorkUnit};
pub use error::{GalaxyError, Result};
pub use executor::{LocalExecutor, RunReport};
pub use handler::{HandlerRegistry, StepArgs, StepOutputs};
pub use step::{ArtifactSource, Bindings, ConcurrencyPlan, StepHandle, StepInstance};
pub use storage::{FilesystemStore, MemoryStore, ObjectStore};
pub use template::{build_template, Template};
pub use workflow::{WorkflowBuilder, WorkflowOptions};
