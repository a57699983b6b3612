//! Deterministic merge of per-modality findings into one record.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::types::{RawFindings, TriageRecord};
use crate::pipeline::analysis::{GeoPoint, Severity};
use crate::pipeline::normalize::truncate_summary;

/// Fallback incident type when text analysis did not succeed.
pub const UNKNOWN_INCIDENT_TYPE: &str = "unknown";

/// Scalar fields of a record after defaults are applied.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedFields {
    pub severity: Severity,
    pub incident_type: String,
    pub summary: String,
    pub location: GeoPoint,
    pub visual_cues: Vec<String>,
}

/// Merge findings, substituting defaults for anything missing or failed.
///
/// Text fields come from a successful text finding, else `unknown`/`unknown`
/// and the first 200 chars of `normalized_text`. Location and cues come from
/// a successful image finding, else `{0.0, 0.0}` and no cues.
pub fn merge_findings(normalized_text: &str, raw: &RawFindings) -> MergedFields {
    let (severity, incident_type, summary) = match raw.text.success() {
        Some(text) => (
            text.severity,
            text.incident_type.clone(),
            truncate_summary(&text.summary),
        ),
        None => (
            Severity::Unknown,
            UNKNOWN_INCIDENT_TYPE.to_string(),
            truncate_summary(normalized_text),
        ),
    };

    let image = raw.image.as_ref().and_then(|f| f.success());
    let location = image.and_then(|i| i.location).unwrap_or_default();
    let visual_cues = image.map(|i| i.visual_cues.clone()).unwrap_or_default();

    MergedFields {
        severity,
        incident_type,
        summary,
        location,
        visual_cues,
    }
}

/// Assemble the final record.
pub fn build_record(
    id: Uuid,
    normalized_text: &str,
    raw_findings: RawFindings,
    logged_at: DateTime<Utc>,
) -> TriageRecord {
    let merged = merge_findings(normalized_text, &raw_findings);
    TriageRecord {
        id,
        severity: merged.severity,
        incident_type: merged.incident_type,
        location: merged.location,
        summary: merged.summary,
        visual_cues: merged.visual_cues,
        raw_findings,
        logged_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::analysis::{AnalysisError, Finding, ImageFinding, TextFinding};

    fn text_ok(severity: Severity, kind: &str, summary: &str) -> Finding<TextFinding> {
        Finding::Success(TextFinding {
            severity,
            incident_type: kind.into(),
            summary: summary.into(),
        })
    }

    fn failed<T>() -> Finding<T> {
        Finding::from(Err::<T, _>(AnalysisError::Unreachable("offline".into())))
    }

    fn image_ok(location: Option<GeoPoint>, cues: &[&str]) -> Finding<ImageFinding> {
        Finding::Success(ImageFinding {
            location,
            visual_cues: cues.iter().map(|c| c.to_string()).collect(),
        })
    }

    #[test]
    fn text_success_without_image() {
        let raw = RawFindings {
            text: text_ok(Severity::High, "fire", "Fire near warehouse"),
            image: None,
        };
        let merged = merge_findings("ignored", &raw);
        assert_eq!(merged.severity, Severity::High);
        assert_eq!(merged.incident_type, "fire");
        assert_eq!(merged.summary, "Fire near warehouse");
        assert_eq!(merged.location, GeoPoint { lat: 0.0, lon: 0.0 });
        assert!(merged.visual_cues.is_empty());
    }

    #[test]
    fn text_failure_uses_defaults() {
        let text = "a".repeat(300);
        let raw = RawFindings {
            text: failed(),
            image: None,
        };
        let merged = merge_findings(&text, &raw);
        assert_eq!(merged.severity, Severity::Unknown);
        assert_eq!(merged.incident_type, "unknown");
        assert_eq!(merged.summary, "a".repeat(200));
    }

    #[test]
    fn image_success_supplies_location_and_cues() {
        let point = GeoPoint { lat: 40.7128, lon: -74.0060 };
        let raw = RawFindings {
            text: text_ok(Severity::Medium, "unknown", "cat stuck in tree"),
            image: Some(image_ok(Some(point), &["smoke", "fire"])),
        };
        let merged = merge_findings("cat stuck in tree", &raw);
        assert_eq!(merged.location, point);
        assert_eq!(merged.visual_cues, vec!["smoke", "fire"]);
        assert_eq!(merged.severity, Severity::Medium);
    }

    #[test]
    fn image_success_without_location_defaults_location_only() {
        let raw = RawFindings {
            text: text_ok(Severity::Low, "noise", "n"),
            image: Some(image_ok(None, &["crowd"])),
        };
        let merged = merge_findings("n", &raw);
        assert_eq!(merged.location, GeoPoint::default());
        assert_eq!(merged.visual_cues, vec!["crowd"]);
    }

    #[test]
    fn image_failure_does_not_touch_text_fields() {
        let raw = RawFindings {
            text: text_ok(Severity::High, "flood", "River rising"),
            image: Some(failed()),
        };
        let merged = merge_findings("River rising", &raw);
        assert_eq!(merged.incident_type, "flood");
        assert_eq!(merged.location, GeoPoint::default());
        assert!(merged.visual_cues.is_empty());
    }

    #[test]
    fn overlong_text_summary_is_capped() {
        let raw = RawFindings {
            text: text_ok(Severity::Medium, "unknown", &"s".repeat(400)),
            image: None,
        };
        assert_eq!(merge_findings("", &raw).summary.chars().count(), 200);
    }

    #[test]
    fn both_failed_record_is_total() {
        let raw = RawFindings {
            text: failed(),
            image: Some(failed()),
        };
        let record = build_record(Uuid::new_v4(), "", raw, Utc::now());
        assert_eq!(record.severity, Severity::Unknown);
        assert_eq!(record.incident_type, "unknown");
        assert_eq!(record.summary, "");
        assert_eq!(record.location, GeoPoint::default());
        assert!(record.visual_cues.is_empty());
        assert!(record.raw_findings.text.error().is_some());
    }
}
