use serde::{Deserialize, Serialize};

use super::AnalysisError;

/// Triage severity. Anything a capability cannot classify is `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    #[default]
    Unknown,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Unknown => "unknown",
        }
    }

    /// Lenient parse for model output: unrecognized labels become `Unknown`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "low" => Self::Low,
            "medium" | "moderate" => Self::Medium,
            "high" | "critical" | "severe" => Self::High,
            _ => Self::Unknown,
        }
    }
}

/// WGS84 position in decimal degrees. Defaults to `{0.0, 0.0}` (unresolved).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Analysis dimension with its own capability and finding shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Image,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextFinding {
    pub severity: Severity,
    pub incident_type: String,
    /// At most 200 characters.
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageFinding {
    pub location: Option<GeoPoint>,
    pub visual_cues: Vec<String>,
}

/// Outcome of one capability invocation: a payload or an error description,
/// never both. Serializes as the payload itself or `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Finding<T> {
    Failure { error: String },
    Success(T),
}

impl<T> Finding<T> {
    pub fn success(&self) -> Option<&T> {
        match self {
            Self::Success(payload) => Some(payload),
            Self::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failure { error } => Some(error),
            Self::Success(_) => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl<T> From<Result<T, AnalysisError>> for Finding<T> {
    fn from(result: Result<T, AnalysisError>) -> Self {
        match result {
            Ok(payload) => Self::Success(payload),
            Err(e) => Self::Failure {
                error: e.to_string(),
            },
        }
    }
}

/// Text modality capability.
pub trait TextAnalyzer: Send + Sync {
    fn analyze_text(&self, text: &str) -> Result<TextFinding, AnalysisError>;
}

/// Image modality capability. Receives PNG bytes.
pub trait ImageAnalyzer: Send + Sync {
    fn analyze_image(&self, image_bytes: &[u8]) -> Result<ImageFinding, AnalysisError>;
}
