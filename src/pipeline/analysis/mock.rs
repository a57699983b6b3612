//! Offline analysis capabilities.
//!
//! `KeywordTextAnalyzer` is a placeholder classifier: a keyword hit marks the
//! report high severity. It stands in for a real model and carries no
//! triage policy of its own.

use std::sync::LazyLock;

use regex::Regex;

use super::types::{
    GeoPoint, ImageAnalyzer, ImageFinding, Severity, TextAnalyzer, TextFinding,
};
use super::AnalysisError;
use crate::pipeline::normalize::truncate_summary;

/// A compiled keyword with the incident type it signals.
struct IncidentKeyword {
    regex: Regex,
    incident_type: &'static str,
}

/// Checked in order; the first match wins.
static INCIDENT_KEYWORDS: LazyLock<Vec<IncidentKeyword>> = LazyLock::new(|| {
    vec![
        keyword(r"(?i)fire|\bablaze\b|\bflames?\b|\bburning\b", "fire"),
        keyword(r"(?i)\bexplo(?:sion|ded|sive)s?\b|\bblast\b", "explosion"),
        keyword(r"(?i)\bgas\s+leak|\bsmell\s+(?:of\s+)?gas\b", "gas_leak"),
        keyword(r"(?i)\bflood(?:ing|ed|s)?\b", "flood"),
        keyword(
            r"(?i)\b(?:building|bridge|roof|wall)\s+(?:has\s+)?collaps",
            "structural_collapse",
        ),
    ]
});

fn keyword(pattern: &str, incident_type: &'static str) -> IncidentKeyword {
    IncidentKeyword {
        regex: Regex::new(pattern).expect("Invalid incident keyword pattern"),
        incident_type,
    }
}

/// Keyword-table text classifier. Never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordTextAnalyzer;

impl KeywordTextAnalyzer {
    /// Incident type of the first matching keyword, if any.
    pub fn classify(text: &str) -> Option<&'static str> {
        INCIDENT_KEYWORDS
            .iter()
            .find(|k| k.regex.is_match(text))
            .map(|k| k.incident_type)
    }
}

impl TextAnalyzer for KeywordTextAnalyzer {
    fn analyze_text(&self, text: &str) -> Result<TextFinding, AnalysisError> {
        let (severity, incident_type) = match Self::classify(text) {
            Some(kind) => (Severity::High, kind),
            None => (Severity::Medium, "unknown"),
        };

        Ok(TextFinding {
            severity,
            incident_type: incident_type.to_string(),
            summary: truncate_summary(text),
        })
    }
}

/// Returns the same image finding for every input.
#[derive(Debug, Clone)]
pub struct StaticImageAnalyzer {
    finding: ImageFinding,
}

impl StaticImageAnalyzer {
    pub fn new(finding: ImageFinding) -> Self {
        Self { finding }
    }
}

impl Default for StaticImageAnalyzer {
    /// Lower Manhattan, smoke and fire.
    fn default() -> Self {
        Self::new(ImageFinding {
            location: Some(GeoPoint {
                lat: 40.7128,
                lon: -74.0060,
            }),
            visual_cues: vec!["smoke".into(), "fire".into()],
        })
    }
}

impl ImageAnalyzer for StaticImageAnalyzer {
    fn analyze_image(&self, image_bytes: &[u8]) -> Result<ImageFinding, AnalysisError> {
        if image_bytes.is_empty() {
            return Err(AnalysisError::Malformed("empty image payload".into()));
        }
        Ok(self.finding.clone())
    }
}

/// Capability that is always down. Useful for degraded-mode deployments and tests.
#[derive(Debug, Clone)]
pub struct UnavailableAnalyzer {
    reason: String,
}

impl UnavailableAnalyzer {
    pub fn new(reason: &str) -> Self {
        Self {
            reason: reason.to_string(),
        }
    }
}

impl TextAnalyzer for UnavailableAnalyzer {
    fn analyze_text(&self, _text: &str) -> Result<TextFinding, AnalysisError> {
        Err(AnalysisError::Unavailable(self.reason.clone()))
    }
}

impl ImageAnalyzer for UnavailableAnalyzer {
    fn analyze_image(&self, _image_bytes: &[u8]) -> Result<ImageFinding, AnalysisError> {
        Err(AnalysisError::Unavailable(self.reason.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fire_report_is_high() {
        let finding = KeywordTextAnalyzer
            .analyze_text("There is a FIRE spreading near the warehouse")
            .unwrap();
        assert_eq!(finding.severity, Severity::High);
        assert_eq!(finding.incident_type, "fire");
        assert_eq!(finding.summary, "There is a FIRE spreading near the warehouse");
    }

    #[test]
    fn wildfire_counts_as_fire() {
        assert_eq!(KeywordTextAnalyzer::classify("wildfire on the ridge"), Some("fire"));
    }

    #[test]
    fn benign_report_is_medium_unknown() {
        let finding = KeywordTextAnalyzer.analyze_text("cat stuck in tree").unwrap();
        assert_eq!(finding.severity, Severity::Medium);
        assert_eq!(finding.incident_type, "unknown");
    }

    #[test]
    fn other_incident_types() {
        assert_eq!(KeywordTextAnalyzer::classify("huge explosion downtown"), Some("explosion"));
        assert_eq!(KeywordTextAnalyzer::classify("strong smell of gas in hallway"), Some("gas_leak"));
        assert_eq!(KeywordTextAnalyzer::classify("basement flooding fast"), Some("flood"));
        assert_eq!(
            KeywordTextAnalyzer::classify("the roof collapsed on the gym"),
            Some("structural_collapse")
        );
    }

    #[test]
    fn summary_capped_at_200_chars() {
        let text = "word ".repeat(100);
        let finding = KeywordTextAnalyzer.analyze_text(&text).unwrap();
        assert_eq!(finding.summary.chars().count(), 200);
    }

    #[test]
    fn static_image_default_finding() {
        let finding = StaticImageAnalyzer::default().analyze_image(&[1, 2, 3]).unwrap();
        assert_eq!(finding.location, Some(GeoPoint { lat: 40.7128, lon: -74.0060 }));
        assert_eq!(finding.visual_cues, vec!["smoke", "fire"]);
    }

    #[test]
    fn static_image_rejects_empty_payload() {
        let err = StaticImageAnalyzer::default().analyze_image(&[]).unwrap_err();
        assert!(matches!(err, AnalysisError::Malformed(_)));
    }

    #[test]
    fn unavailable_fails_both_modalities() {
        let down = UnavailableAnalyzer::new("maintenance");
        assert_eq!(
            down.analyze_text("x").unwrap_err(),
            AnalysisError::Unavailable("maintenance".into())
        );
        assert!(down.analyze_image(&[0]).is_err());
    }
}
