use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pipeline::analysis::{Finding, GeoPoint, ImageFinding, Severity, TextFinding};

/// Caller-supplied incident report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub text: String,
    pub image_ref: Option<String>,
}

impl Report {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image_ref: None,
        }
    }

    pub fn with_image(mut self, image_ref: Option<String>) -> Self {
        self.image_ref = image_ref;
        self
    }
}

/// Per-modality capability outcomes. `image` is absent when no image analysis ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFindings {
    pub text: Finding<TextFinding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<Finding<ImageFinding>>,
}

/// Merged, persisted outcome of one triage call. Every field is always populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriageRecord {
    pub id: Uuid,
    pub severity: Severity,
    pub incident_type: String,
    pub location: GeoPoint,
    pub summary: String,
    pub visual_cues: Vec<String>,
    pub raw_findings: RawFindings,
    #[serde(with = "utc_timestamp")]
    pub logged_at: DateTime<Utc>,
}

/// Lifecycle of a single triage invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriageStage {
    Received,
    Normalizing,
    Dispatching,
    Merging,
    Persisted,
    Returned,
    Failed,
}

impl TriageStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Normalizing => "normalizing",
            Self::Dispatching => "dispatching",
            Self::Merging => "merging",
            Self::Persisted => "persisted",
            Self::Returned => "returned",
            Self::Failed => "failed",
        }
    }
}

/// RFC 3339, microsecond precision, `Z` suffix.
mod utc_timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Micros, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
