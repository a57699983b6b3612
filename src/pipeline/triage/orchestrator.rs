//! Triage Orchestrator
//!
//! Flow per report: normalize text, fetch the image (if any) while the text
//! analysis already runs, analyze the image once fetched, merge both findings
//! with fallbacks, then append the record to the incident log.
//!
//! Capabilities and the fetcher are blocking, so every call goes through
//! `spawn_blocking`. A semaphore caps how many analyses run at once across
//! all invocations sharing this orchestrator.

use std::sync::{Arc, LazyLock};

use chrono::{SubsecRound, Utc};
use tokio::sync::{OnceCell, Semaphore};
use tracing::Instrument;
use uuid::Uuid;

use super::merge::build_record;
use super::types::{RawFindings, Report, TriageRecord, TriageStage};
use super::{SetupError, TriageError};
use crate::config::{AnalysisBackend, ConfigError, TriageConfig, DEFAULT_MAX_CONCURRENT_ANALYSES};
use crate::incident_log::{IncidentLog, JsonIncidentLog, PersistenceError};
use crate::pipeline::analysis::{
    AnalysisError, Finding, GeminiClient, ImageAnalyzer, ImageFinding, KeywordTextAnalyzer,
    Modality, StaticImageAnalyzer, TextAnalyzer, TextFinding,
};
use crate::pipeline::image::{
    extract_gps, fetch_image, FetchError, FetchedImage, HttpImageFetcher, ImageFetcher,
};
use crate::pipeline::normalize::normalize_text;

pub struct TriageOrchestrator {
    text_analyzer: Arc<dyn TextAnalyzer>,
    image_analyzer: Arc<dyn ImageAnalyzer>,
    fetcher: Arc<dyn ImageFetcher>,
    log: Arc<dyn IncidentLog>,
    permits: Arc<Semaphore>,
}

impl TriageOrchestrator {
    pub fn new(
        text_analyzer: Arc<dyn TextAnalyzer>,
        image_analyzer: Arc<dyn ImageAnalyzer>,
        fetcher: Arc<dyn ImageFetcher>,
        log: Arc<dyn IncidentLog>,
    ) -> Self {
        Self {
            text_analyzer,
            image_analyzer,
            fetcher,
            log,
            permits: Arc::new(Semaphore::new(DEFAULT_MAX_CONCURRENT_ANALYSES)),
        }
    }

    /// Cap on analyses running at once. Zero is treated as one.
    pub fn with_max_concurrent_analyses(mut self, limit: usize) -> Self {
        self.permits = Arc::new(Semaphore::new(limit.max(1)));
        self
    }

    /// Share an existing analysis bound with other orchestrators.
    pub fn with_permits(mut self, permits: Arc<Semaphore>) -> Self {
        self.permits = permits;
        self
    }

    /// Wire capabilities, fetcher and log from configuration.
    ///
    /// Builds blocking HTTP clients, so call this outside the async runtime
    /// (or from `spawn_blocking`).
    pub fn from_config(config: &TriageConfig) -> Result<Self, SetupError> {
        let (text_analyzer, image_analyzer): (Arc<dyn TextAnalyzer>, Arc<dyn ImageAnalyzer>) =
            match &config.backend {
                AnalysisBackend::Mock => {
                    let text: Arc<dyn TextAnalyzer> = Arc::new(KeywordTextAnalyzer);
                    let image: Arc<dyn ImageAnalyzer> = Arc::new(StaticImageAnalyzer::default());
                    (text, image)
                }
                AnalysisBackend::Gemini { api_key, model } => {
                    if api_key.trim().is_empty() {
                        return Err(ConfigError::MissingApiKey.into());
                    }
                    let client = Arc::new(GeminiClient::with_defaults(api_key, model)?);
                    let text: Arc<dyn TextAnalyzer> = client.clone();
                    (text, client)
                }
            };

        let fetcher = Arc::new(HttpImageFetcher::new(config.fetch_timeout)?);
        let log = Arc::new(JsonIncidentLog::open(&config.log_file)?);

        tracing::info!(
            log_file = %config.log_file.display(),
            backend = match config.backend {
                AnalysisBackend::Mock => "mock",
                AnalysisBackend::Gemini { .. } => "gemini",
            },
            max_concurrent_analyses = config.max_concurrent_analyses,
            "Triage orchestrator ready"
        );

        Ok(Self::new(text_analyzer, image_analyzer, fetcher, log)
            .with_max_concurrent_analyses(config.max_concurrent_analyses))
    }

    pub fn log(&self) -> &Arc<dyn IncidentLog> {
        &self.log
    }

    /// Triage one report and persist the result.
    ///
    /// Fetch and analysis failures degrade to default fields. The only error
    /// is a failed append, in which case no record is returned.
    pub async fn triage(&self, report: Report) -> Result<TriageRecord, TriageError> {
        let id = Uuid::new_v4();
        let span = tracing::info_span!("triage", incident_id = %id);
        self.run(id, report).instrument(span).await
    }

    async fn run(&self, id: Uuid, report: Report) -> Result<TriageRecord, TriageError> {
        stage(TriageStage::Received);

        stage(TriageStage::Normalizing);
        let text = normalize_text(&report.text);

        stage(TriageStage::Dispatching);
        let (text_finding, image_finding) = tokio::join!(
            self.analyze_text(text.clone()),
            self.analyze_image(report.image_ref),
        );

        stage(TriageStage::Merging);
        let raw_findings = RawFindings {
            text: text_finding,
            image: image_finding,
        };
        // Microsecond precision matches the on-disk timestamp format.
        let record = build_record(id, &text, raw_findings, Utc::now().trunc_subsecs(6));

        if let Err(e) = self.persist(&record).await {
            stage(TriageStage::Failed);
            tracing::error!(error = %e, "Triage record could not be persisted");
            return Err(e.into());
        }
        stage(TriageStage::Persisted);

        tracing::info!(
            severity = record.severity.as_str(),
            incident_type = %record.incident_type,
            text_ok = record.raw_findings.text.is_success(),
            image_ok = record.raw_findings.image.as_ref().map(Finding::is_success),
            "Incident triaged"
        );
        stage(TriageStage::Returned);
        Ok(record)
    }

    async fn analyze_text(&self, text: String) -> Finding<TextFinding> {
        let analyzer = Arc::clone(&self.text_analyzer);
        let result = self
            .run_analysis(Modality::Text, move || analyzer.analyze_text(&text))
            .await;
        finding_for(Modality::Text, result)
    }

    /// `None` when there is no image to analyze (no reference, or fetch failed).
    async fn analyze_image(&self, image_ref: Option<String>) -> Option<Finding<ImageFinding>> {
        let reference = image_ref.filter(|r| !r.trim().is_empty())?;

        let fetcher = Arc::clone(&self.fetcher);
        let fetched = tokio::task::spawn_blocking(move || {
            fetch_image(&*fetcher, Some(reference.as_str())).map(|image| {
                let gps = extract_gps(&image);
                (image.png_bytes, gps)
            })
        })
        .await;

        let (png_bytes, gps) = match fetched {
            Ok(Some(fetched)) => fetched,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "Image fetch task failed, continuing without image");
                return None;
            }
        };

        let analyzer = Arc::clone(&self.image_analyzer);
        let result = self
            .run_analysis(Modality::Image, move || analyzer.analyze_image(&png_bytes))
            .await
            .map(|mut finding| {
                if finding.location.is_none() && gps.is_some() {
                    tracing::debug!("Using EXIF GPS for image location");
                    finding.location = gps;
                }
                finding
            });

        Some(finding_for(Modality::Image, result))
    }

    /// Run one capability call on the blocking pool under a semaphore permit.
    /// A panic inside `work` becomes `TaskFailed` for that modality only.
    async fn run_analysis<T, F>(&self, modality: Modality, work: F) -> Result<T, AnalysisError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, AnalysisError> + Send + 'static,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| AnalysisError::TaskFailed(e.to_string()))?;

        tracing::debug!(modality = modality.as_str(), "Analysis dispatched");
        tokio::task::spawn_blocking(work).await.map_err(|e| {
            if e.is_panic() {
                AnalysisError::TaskFailed(format!("{} analysis panicked", modality.as_str()))
            } else {
                AnalysisError::TaskFailed(e.to_string())
            }
        })?
    }

    async fn persist(&self, record: &TriageRecord) -> Result<(), PersistenceError> {
        let log = Arc::clone(&self.log);
        let record = record.clone();
        tokio::task::spawn_blocking(move || log.append(&record))
            .await
            .map_err(|e| PersistenceError::TaskFailed(e.to_string()))?
    }
}

fn finding_for<T>(modality: Modality, result: Result<T, AnalysisError>) -> Finding<T> {
    if let Err(e) = &result {
        tracing::warn!(
            modality = modality.as_str(),
            error = %e,
            "Analysis failed, falling back to defaults"
        );
    }
    Finding::from(result)
}

fn stage(stage: TriageStage) {
    tracing::debug!(stage = stage.as_str(), "Triage stage");
}

/// Fetcher used when the HTTP client cannot be built: every fetch fails, so
/// reports are triaged without their image.
struct OfflineFetcher {
    reason: String,
}

impl ImageFetcher for OfflineFetcher {
    fn fetch(&self, _reference: &str) -> Result<FetchedImage, FetchError> {
        Err(FetchError::Transport(self.reason.clone()))
    }
}

/// HTTP fetcher shared by every `triage_incident` call. A failed build is not
/// cached, so the next call retries.
static SHARED_FETCHER: OnceCell<Arc<dyn ImageFetcher>> = OnceCell::const_new();

/// Analysis permits shared by every `triage_incident` call.
static SHARED_PERMITS: LazyLock<Arc<Semaphore>> =
    LazyLock::new(|| Arc::new(Semaphore::new(DEFAULT_MAX_CONCURRENT_ANALYSES)));

async fn shared_fetcher() -> Arc<dyn ImageFetcher> {
    let built = SHARED_FETCHER
        .get_or_try_init(|| async {
            match tokio::task::spawn_blocking(HttpImageFetcher::with_default_timeout).await {
                Ok(Ok(fetcher)) => Ok(Arc::new(fetcher) as Arc<dyn ImageFetcher>),
                Ok(Err(e)) => Err(e.to_string()),
                Err(e) => Err(e.to_string()),
            }
        })
        .await;

    match built {
        Ok(fetcher) => Arc::clone(fetcher),
        Err(reason) => {
            tracing::warn!(error = %reason, "HTTP fetcher unavailable, images will be skipped");
            Arc::new(OfflineFetcher { reason })
        }
    }
}

/// One-shot triage with the default HTTP fetcher.
///
/// Convenience for callers that do not keep an orchestrator around. All calls
/// share one fetcher and one analysis bound of `DEFAULT_MAX_CONCURRENT_ANALYSES`.
pub async fn triage_incident(
    report: Report,
    text_analyzer: Arc<dyn TextAnalyzer>,
    image_analyzer: Arc<dyn ImageAnalyzer>,
    log: Arc<dyn IncidentLog>,
) -> Result<TriageRecord, TriageError> {
    let fetcher = shared_fetcher().await;
    TriageOrchestrator::new(text_analyzer, image_analyzer, fetcher, log)
        .with_permits(Arc::clone(&SHARED_PERMITS))
        .triage(report)
        .await
}
