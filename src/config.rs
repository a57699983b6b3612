use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "Sentinels";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Image retrieval is the only bounded operation in a triage call.
pub const FETCH_TIMEOUT_SECS: u64 = 10;

/// Maximum summary length, in characters.
pub const SUMMARY_MAX_CHARS: usize = 200;

/// File name of the incident log inside the data directory.
pub const DEFAULT_LOG_FILE: &str = "triage_log.json";

/// Refuse to decode anything larger than this (25 MB).
pub const MAX_IMAGE_BYTES: usize = 25 * 1024 * 1024;

/// Upper bound on analysis tasks running at once per orchestrator.
pub const DEFAULT_MAX_CONCURRENT_ANALYSES: usize = 8;

/// Default Gemini model for the production analyzers.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "sentinels_lib=info,sentinels=info,warn"
}

/// Get the application data directory.
/// ~/Sentinels/ on all platforms, falling back to the working directory.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(APP_NAME))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Default location of the incident log.
pub fn default_log_path() -> PathBuf {
    app_data_dir().join(DEFAULT_LOG_FILE)
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("API key is required")]
    MissingApiKey,

    #[error("Unknown analysis backend: {0}")]
    UnknownBackend(String),

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

/// Which analysis capabilities the orchestrator is built with.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisBackend {
    /// Keyword text analyzer + static image analyzer. No network.
    Mock,
    /// Gemini `generateContent` for both modalities.
    Gemini { api_key: String, model: String },
}

/// Runtime configuration for a triage deployment.
#[derive(Debug, Clone)]
pub struct TriageConfig {
    pub log_file: PathBuf,
    pub backend: AnalysisBackend,
    pub fetch_timeout: Duration,
    pub max_concurrent_analyses: usize,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            log_file: default_log_path(),
            backend: AnalysisBackend::Mock,
            fetch_timeout: Duration::from_secs(FETCH_TIMEOUT_SECS),
            max_concurrent_analyses: DEFAULT_MAX_CONCURRENT_ANALYSES,
        }
    }
}

impl TriageConfig {
    /// Build from `SENTINELS_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Unset variables keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup("SENTINELS_LOG_FILE").filter(|p| !p.trim().is_empty()) {
            config.log_file = PathBuf::from(path);
        }

        if let Some(raw) = lookup("SENTINELS_MAX_CONCURRENT_ANALYSES") {
            config.max_concurrent_analyses = match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        name: "SENTINELS_MAX_CONCURRENT_ANALYSES",
                        value: raw,
                    })
                }
            };
        }

        let backend = lookup("SENTINELS_BACKEND").unwrap_or_else(|| "mock".into());
        config.backend = match backend.trim().to_ascii_lowercase().as_str() {
            "mock" | "" => AnalysisBackend::Mock,
            "gemini" => {
                let api_key = lookup("SENTINELS_API_KEY")
                    .map(|k| k.trim().to_string())
                    .filter(|k| !k.is_empty())
                    .ok_or(ConfigError::MissingApiKey)?;
                let model = lookup("SENTINELS_MODEL")
                    .map(|m| m.trim().to_string())
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string());
                AnalysisBackend::Gemini { api_key, model }
            }
            other => return Err(ConfigError::UnknownBackend(other.to_string())),
        };

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn app_data_dir_ends_with_app_name() {
        assert!(app_data_dir().ends_with("Sentinels"));
    }

    #[test]
    fn default_log_path_under_app_data() {
        let path = default_log_path();
        assert!(path.starts_with(app_data_dir()));
        assert!(path.ends_with(DEFAULT_LOG_FILE));
    }

    #[test]
    fn defaults_without_environment() {
        let config = TriageConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.backend, AnalysisBackend::Mock);
        assert_eq!(config.fetch_timeout, Duration::from_secs(10));
        assert_eq!(config.max_concurrent_analyses, DEFAULT_MAX_CONCURRENT_ANALYSES);
    }

    #[test]
    fn log_file_override() {
        let config =
            TriageConfig::from_lookup(lookup_from(&[("SENTINELS_LOG_FILE", "/tmp/x.json")]))
                .unwrap();
        assert_eq!(config.log_file, PathBuf::from("/tmp/x.json"));
    }

    #[test]
    fn gemini_requires_api_key() {
        let err = TriageConfig::from_lookup(lookup_from(&[("SENTINELS_BACKEND", "gemini")]))
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingApiKey);
        assert_eq!(err.to_string(), "API key is required");
    }

    #[test]
    fn blank_api_key_is_missing() {
        let err = TriageConfig::from_lookup(lookup_from(&[
            ("SENTINELS_BACKEND", "gemini"),
            ("SENTINELS_API_KEY", "   "),
        ]))
        .unwrap_err();
        assert_eq!(err, ConfigError::MissingApiKey);
    }

    #[test]
    fn gemini_backend_with_default_model() {
        let config = TriageConfig::from_lookup(lookup_from(&[
            ("SENTINELS_BACKEND", "Gemini"),
            ("SENTINELS_API_KEY", "k-123"),
        ]))
        .unwrap();
        assert_eq!(
            config.backend,
            AnalysisBackend::Gemini {
                api_key: "k-123".into(),
                model: DEFAULT_GEMINI_MODEL.into(),
            }
        );
    }

    #[test]
    fn unknown_backend_rejected() {
        let err = TriageConfig::from_lookup(lookup_from(&[("SENTINELS_BACKEND", "oracle")]))
            .unwrap_err();
        assert_eq!(err, ConfigError::UnknownBackend("oracle".into()));
    }

    #[test]
    fn zero_concurrency_rejected() {
        let err = TriageConfig::from_lookup(lookup_from(&[(
            "SENTINELS_MAX_CONCURRENT_ANALYSES",
            "0",
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, env!("CARGO_PKG_VERSION"));
    }
}
