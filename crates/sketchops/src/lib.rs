pub mod artifact;
pub mod config;
pub mod db;
pub mod error;
pub mod evidence;
pub mod filter;
pub mod importer;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod poller;
pub mod prompt;
pub mod provider;
pub mod sanitize;
pub mod secrets;
pub mod selector;
pub mod shutdown;

pub use config::{load_from_env, ServiceConfig};
pub use db::{Database, DatabaseError};
pub use error::{ConfigError, Result, SketchopsError};
pub use models::{Outcome, SourceKind};
pub use pipeline::{BatchReport, Pipeline, PipelineConfig, PipelineError};
pub use poller::{PollError, Poller, PollerConfig, TickReport};
pub use shutdown::Shutdown;
