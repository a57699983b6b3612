//! Gemini-backed analysis capabilities.
//!
//! One blocking HTTP client serves both modalities. The model is asked for a
//! JSON object; anything that does not parse into a finding is `Malformed`.

use std::time::Duration;

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use super::types::{
    GeoPoint, ImageAnalyzer, ImageFinding, Severity, TextAnalyzer, TextFinding,
};
use super::AnalysisError;
use crate::pipeline::normalize::truncate_summary;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Per-request bound for model calls.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

const TEXT_PROMPT: &str = "\
You are an emergency dispatcher triaging an incoming incident report. \
Respond with a single JSON object and nothing else, with keys: \
\"severity\" (one of \"low\", \"medium\", \"high\"), \
\"incident_type\" (short snake_case label such as \"fire\", \"flood\", \"medical\", or \"unknown\"), \
\"summary\" (one sentence, at most 200 characters).\n\nReport:\n";

const IMAGE_PROMPT: &str = "\
You are assisting emergency triage. Inspect the attached incident photo. \
Respond with a single JSON object and nothing else, with keys: \
\"visual_cues\" (array of short lowercase labels for hazards you can see, e.g. \"smoke\", \"fire\", \"water\"), \
\"location\" (object with numeric \"lat\" and \"lon\" if a recognizable place lets you infer it, otherwise null).";

/// Gemini `generateContent` client implementing both capability traits.
pub struct GeminiClient {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl GeminiClient {
    pub fn new(api_key: &str, model: &str, timeout: Duration) -> Result<Self, AnalysisError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AnalysisError::Unreachable(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: GEMINI_BASE_URL.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            client,
            timeout_secs: timeout.as_secs(),
        })
    }

    /// Client with the default one-minute request bound.
    pub fn with_defaults(api_key: &str, model: &str) -> Result<Self, AnalysisError> {
        Self::new(api_key, model, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Point at a different endpoint (proxy, regional gateway).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn generate(&self, parts: Vec<RequestPart>) -> Result<String, AnalysisError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = GenerateRequest {
            contents: vec![RequestContent { parts }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                temperature: 0.0,
            },
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    AnalysisError::Timeout(self.timeout_secs)
                } else {
                    AnalysisError::Unreachable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(AnalysisError::Service {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .map_err(|e| AnalysisError::Malformed(e.to_string()))?;

        parsed
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .find_map(|p| p.text)
            .ok_or_else(|| AnalysisError::Malformed("response has no text candidate".into()))
    }
}

impl TextAnalyzer for GeminiClient {
    fn analyze_text(&self, text: &str) -> Result<TextFinding, AnalysisError> {
        let _span = tracing::info_span!("gemini_text", model = %self.model).entered();
        let start = std::time::Instant::now();

        let reply = self.generate(vec![RequestPart::Text {
            text: format!("{TEXT_PROMPT}{text}"),
        }])?;
        let finding = parse_text_reply(&reply)?;

        tracing::info!(
            elapsed_ms = %start.elapsed().as_millis(),
            severity = finding.severity.as_str(),
            incident_type = %finding.incident_type,
            "Text analysis complete"
        );
        Ok(finding)
    }
}

impl ImageAnalyzer for GeminiClient {
    fn analyze_image(&self, image_bytes: &[u8]) -> Result<ImageFinding, AnalysisError> {
        let _span = tracing::info_span!(
            "gemini_image",
            model = %self.model,
            image_size = image_bytes.len(),
        )
        .entered();
        let start = std::time::Instant::now();

        let reply = self.generate(vec![
            RequestPart::Text {
                text: IMAGE_PROMPT.to_string(),
            },
            RequestPart::InlineData {
                inline_data: InlineData {
                    mime_type: "image/png",
                    data: base64::engine::general_purpose::STANDARD.encode(image_bytes),
                },
            },
        ])?;
        let finding = parse_image_reply(&reply)?;

        tracing::info!(
            elapsed_ms = %start.elapsed().as_millis(),
            cues = finding.visual_cues.len(),
            located = finding.location.is_some(),
            "Image analysis complete"
        );
        Ok(finding)
    }
}

// ──────────────────────────────────────────────
// Wire types
// ──────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<RequestContent>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct RequestContent {
    parts: Vec<RequestPart>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum RequestPart {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    InlineData { inline_data: InlineData },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: &'static str,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

// ──────────────────────────────────────────────
// Reply parsing
// ──────────────────────────────────────────────

#[derive(Deserialize)]
struct TextReply {
    severity: Option<String>,
    #[serde(alias = "incidentType")]
    incident_type: Option<String>,
    summary: Option<String>,
}

#[derive(Deserialize)]
struct ImageReply {
    location: Option<LocationReply>,
    #[serde(default, alias = "visualCues")]
    visual_cues: Vec<String>,
}

#[derive(Deserialize)]
struct LocationReply {
    lat: Option<f64>,
    lon: Option<f64>,
}

/// Strip a Markdown code fence if the model wrapped its JSON in one.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn parse_text_reply(raw: &str) -> Result<TextFinding, AnalysisError> {
    let reply: TextReply = serde_json::from_str(strip_code_fence(raw))
        .map_err(|e| AnalysisError::Malformed(format!("text reply: {e}")))?;

    let summary = reply
        .summary
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AnalysisError::Malformed("text reply has no summary".into()))?;

    let incident_type = reply
        .incident_type
        .map(|t| t.trim().to_ascii_lowercase())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "unknown".to_string());

    Ok(TextFinding {
        severity: reply
            .severity
            .as_deref()
            .map(Severity::from_label)
            .unwrap_or_default(),
        incident_type,
        summary: truncate_summary(&summary),
    })
}

fn parse_image_reply(raw: &str) -> Result<ImageFinding, AnalysisError> {
    let reply: ImageReply = serde_json::from_str(strip_code_fence(raw))
        .map_err(|e| AnalysisError::Malformed(format!("image reply: {e}")))?;

    let location = reply.location.and_then(|loc| match (loc.lat, loc.lon) {
        (Some(lat), Some(lon))
            if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon) =>
        {
            Some(GeoPoint { lat, lon })
        }
        _ => None,
    });

    let visual_cues = reply
        .visual_cues
        .into_iter()
        .map(|c| c.trim().to_ascii_lowercase())
        .filter(|c| !c.is_empty())
        .collect();

    Ok(ImageFinding {
        location,
        visual_cues,
    })
}
