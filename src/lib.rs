// runwatch: track GitHub repositories and poll their recent workflow runs.
// Workflow runs are cached per user and repository and revalidated with ETags.

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod github;
pub mod logging;
pub mod poller;
pub mod registry;
pub mod session;

pub use config::Config;
pub use engine::{EngineSettings, Revalidation, RevalidationOutcome, Revalidator};
pub use error::{Result, RunwatchError};
pub use session::{Credential, Session};
