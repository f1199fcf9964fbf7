pub mod config;
pub mod types;

pub use config::{ApplierKind, ExecutorConfig, PlanConfig, ReplanConfig};
pub use types::*;
