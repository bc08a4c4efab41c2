//! Flows: configuration, planning and execution of stage pipelines.
pub mod config;
pub mod executor;
pub mod report;
pub mod resolver;
pub mod stage;

pub use config::{FlowConfig, ProjectFlowConfig};
pub use executor::execute_plan;
pub use resolver::plan;
