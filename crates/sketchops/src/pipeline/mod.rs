//! Per-batch processing: prompt, generate, filter, write, import, commit.

pub mod config;
pub mod context;
pub mod error;
pub mod runner;

pub use config::PipelineConfig;
pub use context::{BatchContext, BatchReport, UnitState};
pub use error::PipelineError;
pub use runner::Pipeline;
