//! Asynchronous pipeline stages: harmonization and animation jobs.

mod job;
mod orchestrator;

pub use job::{format_status, Job, JobKind, JobResult, JobStatus};
pub use orchestrator::{Orchestrator, OrchestratorError, View, DEFAULT_POLL_INTERVAL};
