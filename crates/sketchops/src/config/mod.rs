//! Process configuration, read once at startup.
//!
//! Runtime settings (prompts, provider selection and credentials) are not
//! here; they live in the datastore and are reloaded on every tick.

pub mod loader;
pub mod schema;

pub use loader::load_from_env;
pub use schema::ServiceConfig;
