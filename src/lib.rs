pub mod config;
pub mod incident_log;
pub mod pipeline;

use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

pub use incident_log::{IncidentLog, JsonIncidentLog, MemoryIncidentLog, PersistenceError};
pub use pipeline::triage::{
    triage_incident, Report, SetupError, TriageError, TriageOrchestrator, TriageRecord,
};

const USAGE: &str = "usage: sentinels <report-text> [image-url]";

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

/// Parse `<text> [image-url]`. `None` on wrong arity.
fn parse_args(args: &[String]) -> Option<Report> {
    match args {
        [text] => Some(Report::new(text.as_str())),
        [text, image] => Some(Report::new(text.as_str()).with_image(Some(image.clone()))),
        _ => None,
    }
}

/// Triage a single report from the command line and print the record.
pub fn run() -> ExitCode {
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(report) = parse_args(&args) else {
        eprintln!("{USAGE}");
        return ExitCode::from(2);
    };

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = match config::TriageConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::from(2);
        }
    };

    // Blocking HTTP clients must be built before entering the runtime.
    let orchestrator = match TriageOrchestrator::from_config(&config) {
        Ok(orchestrator) => orchestrator,
        Err(SetupError::Persistence(e)) => {
            eprintln!("Cannot open incident log {}: {e}", config.log_file.display());
            return ExitCode::from(1);
        }
        Err(e) => {
            eprintln!("Setup error: {e}");
            return ExitCode::from(2);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let outcome = runtime.block_on(orchestrator.triage(report));

    match outcome {
        Ok(record) => match serde_json::to_string_pretty(&record) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Record persisted but could not be printed: {e}");
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            eprintln!("{e}");
            ExitCode::from(1)
        }
    }
}
