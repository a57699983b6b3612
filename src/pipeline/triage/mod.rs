pub mod types;
pub mod merge;
pub mod orchestrator;

pub use types::*;
pub use merge::{build_record, merge_findings, MergedFields};
pub use orchestrator::{triage_incident, TriageOrchestrator};

use thiserror::Error;

use crate::config::ConfigError;
use crate::incident_log::PersistenceError;
use crate::pipeline::analysis::AnalysisError;
use crate::pipeline::image::FetchError;

/// Failure of a single triage invocation. Fetch and analysis failures are
/// absorbed into fallback values, so only persistence can surface here.
#[derive(Error, Debug)]
pub enum TriageError {
    #[error("Failed to persist triage record: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Failure while wiring an orchestrator from configuration.
#[derive(Error, Debug)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}
