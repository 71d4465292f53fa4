use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use vidmood_core::artifacts::{ArtifactPattern, ArtifactStore};
use vidmood_core::error::CoreError;
use vidmood_core::media::{MediaPolicy, DEFAULT_ACCEPTED_MEDIA_TYPE};
use vidmood_core::orchestrator::{OrchestratorConfig, DEFAULT_RESULT_PATTERN};
use vidmood_core::query::{QueryService, DEFAULT_DATASET_PATTERN, DEFAULT_SUMMARY_PATTERN};
use vidmood_core::runner::command::CommandRunner;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `900`). Should exceed the
    /// analysis timeout so jobs end with a `TIMEOUT` outcome, not a dropped request.
    pub request_timeout_secs: u64,
    /// Maximum request body size in bytes (default: 512 MiB).
    pub max_upload_bytes: usize,
    /// Worker, directory and artifact settings.
    pub analysis: AnalysisConfig,
}

/// Settings for the external analysis worker and its artifacts.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub upload_dir: PathBuf,
    pub results_dir: PathBuf,
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub timeout_secs: u64,
    pub accepted_media_types: Vec<String>,
    pub result_pattern: String,
    pub dataset_pattern: String,
    pub summary_pattern: String,
    pub publish_derived: bool,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `900`                      |
    /// | `MAX_UPLOAD_BYTES`     | `536870912`                |
    ///
    /// See [`AnalysisConfig::from_env`] for the analysis block.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = parse_env("PORT", "3000");
        let cors_origins = split_list(&env_or("CORS_ORIGINS", "http://localhost:5173"), ',');
        let request_timeout_secs: u64 = parse_env("REQUEST_TIMEOUT_SECS", "900");
        let max_upload_bytes: usize = parse_env("MAX_UPLOAD_BYTES", "536870912");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            max_upload_bytes,
            analysis: AnalysisConfig::from_env(),
        }
    }
}

impl AnalysisConfig {
    /// Load the analysis block from environment variables with defaults.
    ///
    /// | Env Var                     | Default                    |
    /// |-----------------------------|----------------------------|
    /// | `UPLOAD_DIR`                | `uploads`                  |
    /// | `RESULTS_DIR`               | `results`                  |
    /// | `ANALYSIS_PROGRAM`          | `python3`                  |
    /// | `ANALYSIS_ARGS`             | `videoprocessing.py`       |
    /// | `ANALYSIS_WORKING_DIR`      | unset                      |
    /// | `ANALYSIS_TIMEOUT_SECS`     | `600`                      |
    /// | `ACCEPTED_MEDIA_TYPES`      | `video/mp4`                |
    /// | `RESULT_PATTERN`            | `*.json`                   |
    /// | `DATASET_PATTERN`           | `emotion_dataset_*.csv`    |
    /// | `SUMMARY_PATTERN`           | `emotion_summary_*.json`   |
    /// | `PUBLISH_DERIVED_ARTIFACTS` | `true`                     |
    pub fn from_env() -> Self {
        Self {
            upload_dir: PathBuf::from(env_or("UPLOAD_DIR", "uploads")),
            results_dir: PathBuf::from(env_or("RESULTS_DIR", "results")),
            program: env_or("ANALYSIS_PROGRAM", "python3"),
            args: env_or("ANALYSIS_ARGS", "videoprocessing.py")
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            working_dir: std::env::var("ANALYSIS_WORKING_DIR")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            timeout_secs: parse_env("ANALYSIS_TIMEOUT_SECS", "600"),
            accepted_media_types: split_list(
                &env_or("ACCEPTED_MEDIA_TYPES", DEFAULT_ACCEPTED_MEDIA_TYPE),
                ',',
            ),
            result_pattern: env_or("RESULT_PATTERN", DEFAULT_RESULT_PATTERN),
            dataset_pattern: env_or("DATASET_PATTERN", DEFAULT_DATASET_PATTERN),
            summary_pattern: env_or("SUMMARY_PATTERN", DEFAULT_SUMMARY_PATTERN),
            publish_derived: parse_flag("PUBLISH_DERIVED_ARTIFACTS", true),
        }
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Validate the patterns and media types into an orchestrator config.
    pub fn orchestrator_config(&self) -> Result<OrchestratorConfig, CoreError> {
        Ok(OrchestratorConfig {
            upload_dir: self.upload_dir.clone(),
            results_dir: self.results_dir.clone(),
            job_timeout: self.job_timeout(),
            media_policy: MediaPolicy::new(&self.accepted_media_types)?,
            result_pattern: ArtifactPattern::new(&self.result_pattern)?,
            publish_derived: self.publish_derived,
        })
    }

    /// Query service over the same results directory the jobs write to.
    pub fn query_service(&self) -> Result<QueryService, CoreError> {
        Ok(QueryService::new(
            ArtifactStore::new(self.results_dir.clone()),
            ArtifactPattern::new(&self.dataset_pattern)?,
            ArtifactPattern::new(&self.summary_pattern)?,
        ))
    }

    /// The production worker.
    pub fn command_runner(&self) -> CommandRunner {
        let runner = CommandRunner::new(self.program.clone(), self.args.clone());
        match &self.working_dir {
            Some(dir) => runner.with_working_directory(dir.clone()),
            None => runner,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

/// Parse an env var, panicking at startup on malformed values.
fn parse_env<T>(key: &str, default: &str) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_or(key, default)
        .trim()
        .parse()
        .unwrap_or_else(|e| panic!("{key} is not valid: {e}"))
}

fn parse_flag(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            other => panic!("{key} must be a boolean, got '{other}'"),
        },
        Err(_) => default,
    }
}

fn split_list(raw: &str, separator: char) -> Vec<String> {
    raw.split(separator)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
