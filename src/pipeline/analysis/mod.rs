pub mod types;
pub mod mock;
pub mod gemini;

pub use types::*;
pub use mock::{KeywordTextAnalyzer, StaticImageAnalyzer, UnavailableAnalyzer};
pub use gemini::GeminiClient;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("Analysis service unreachable: {0}")]
    Unreachable(String),

    #[error("Analysis request timed out after {0}s")]
    Timeout(u64),

    #[error("Analysis service error ({status}): {body}")]
    Service { status: u16, body: String },

    #[error("Malformed analysis response: {0}")]
    Malformed(String),

    #[error("Analysis task failed: {0}")]
    TaskFailed(String),

    #[error("Analysis capability unavailable: {0}")]
    Unavailable(String),
}
