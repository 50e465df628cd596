//! HTTP client for the remote summarization pipeline.
//!
//! Owns the three calls the service exposes:
//! - `POST /run_pipeline` — start a job (multipart form)
//! - `GET /pipeline_status` — poll a running job
//! - `GET /sessions/{id}/{artifact}.json` — fetch a result artifact
//!
//! Raw responses are translated into [`PollResult`] values here; callers
//! never see wire shapes.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::debug;

use crate::errors::{AggregationError, PollError, SubmitError};
use crate::stage::StageName;

/// Upper bound the service accepts for the dataset entry count.
const MAX_ENTRIES: u32 = 1000;

/// Shown in place of a summary the service completed without generating.
const NO_SUMMARY: &str = "No summary generated";

/// Dataset corpora known to the pipeline service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DatasetId {
    /// Indian Legal Corpus.
    Ilc,
    /// IN-ABS abstractive judgments.
    InAbs,
}

impl DatasetId {
    /// Name the service expects in the submit form.
    pub fn wire_name(self) -> &'static str {
        match self {
            DatasetId::Ilc => "ILC",
            DatasetId::InAbs => "IN-ABS",
        }
    }

    /// Lowercased identifier used in artifact names.
    pub fn slug(self) -> &'static str {
        match self {
            DatasetId::Ilc => "ilc",
            DatasetId::InAbs => "in-abs",
        }
    }
}

impl std::fmt::Display for DatasetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// A job submission request, validated locally before any network call.
#[derive(Debug, Clone)]
pub enum JobRequest {
    /// Upload one document for summarization.
    Upload { file: PathBuf },
    /// Summarize a slice of a prepared dataset.
    Dataset {
        dataset: DatasetId,
        /// Number of entries to process, 1..=1000.
        entries: u32,
        /// Specific entry id; a positive id overrides the entry count.
        entry_id: Option<i64>,
    },
}

impl JobRequest {
    /// Check required fields without touching the network.
    pub fn validate(&self) -> Result<(), SubmitError> {
        match self {
            JobRequest::Upload { file } => {
                if !file.is_file() {
                    return Err(SubmitError::Validation(format!(
                        "document file not found: {}",
                        file.display()
                    )));
                }
            }
            JobRequest::Dataset {
                entries, entry_id, ..
            } => {
                if let Some(id) = entry_id {
                    if *id <= 0 {
                        return Err(SubmitError::Validation(
                            "entry id must be positive".to_string(),
                        ));
                    }
                }
                if *entries == 0 || *entries > MAX_ENTRIES {
                    return Err(SubmitError::Validation(format!(
                        "entry count must be between 1 and {MAX_ENTRIES}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Identifier used to parameterize artifact names for this job.
    pub fn artifact_slug(&self) -> String {
        match self {
            JobRequest::Upload { .. } => "upload".to_string(),
            JobRequest::Dataset { dataset, .. } => dataset.slug().to_string(),
        }
    }
}

/// Outcome of one status poll, with the two observed wire shapes unified.
#[derive(Debug, Clone, PartialEq)]
pub enum PollResult {
    /// The service has not registered the session yet (HTTP 404). Expected
    /// shortly after submit; retried silently.
    NotYetVisible,
    /// Still running. `completed` is the cumulative set of finished stages;
    /// `running` holds stages the service explicitly reported as in flight.
    InProgress {
        completed: BTreeSet<StageName>,
        running: BTreeSet<StageName>,
    },
    /// Terminal success, with the summaries reported inline.
    Completed { summaries: Vec<String> },
    /// Terminal failure reported by the pipeline itself.
    Failed(String),
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    stages: Vec<WireStage>,
    #[serde(default)]
    completed: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    results: Option<Value>,
}

/// The service has been observed to report `stages` both as bare names and
/// as `{stage, status}` objects; accept either. A bare name counts as a
/// completed stage; an object counts as completed only when its status says
/// so, otherwise as a running indicator.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireStage {
    Entry {
        stage: String,
        #[serde(default)]
        status: Option<String>,
    },
    Name(String),
}

impl StatusResponse {
    fn into_poll_result(self) -> PollResult {
        if let Some(message) = self.error {
            return PollResult::Failed(message);
        }
        if self.completed {
            return PollResult::Completed {
                summaries: extract_summaries(self.results.as_ref()),
            };
        }

        let mut completed = BTreeSet::new();
        let mut running = BTreeSet::new();
        for entry in self.stages {
            let (name, done) = match entry {
                WireStage::Name(name) => (name, true),
                WireStage::Entry { stage, status } => {
                    let done = status
                        .as_deref()
                        .map(|s| s.eq_ignore_ascii_case("completed"))
                        .unwrap_or(true);
                    (stage, done)
                }
            };
            match StageName::from_wire(&name) {
                Some(stage) if done => {
                    completed.insert(stage);
                }
                Some(stage) => {
                    running.insert(stage);
                }
                None => debug!(stage = %name, "ignoring unknown pipeline stage"),
            }
        }
        PollResult::InProgress { completed, running }
    }
}

/// Pull the summary texts out of the `results` payload, tolerating entries
/// without a usable `summary_text`.
fn extract_summaries(results: Option<&Value>) -> Vec<String> {
    results
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .map(|entry| {
                    entry
                        .get("summary_text")
                        .and_then(Value::as_str)
                        .filter(|text| !text.is_empty())
                        .unwrap_or(NO_SUMMARY)
                        .to_string()
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Client for the remote pipeline service.
pub struct PipelineClient {
    http: reqwest::Client,
    base: String,
}

impl PipelineClient {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: base.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    /// Submit a job and return the session id the service issued.
    ///
    /// Validation failures surface as [`SubmitError::Validation`] before any
    /// request is sent; a remote rejection becomes [`SubmitError::Startup`]
    /// carrying the service's `detail`/`error` message.
    pub async fn submit(&self, request: &JobRequest) -> Result<String, SubmitError> {
        request.validate()?;
        let form = self.build_form(request).await?;

        let response = self
            .http
            .post(format!("{}/run_pipeline", self.base))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);

        if !status.is_success() {
            let message = body
                .get("detail")
                .or_else(|| body.get("error"))
                .and_then(Value::as_str)
                .unwrap_or("pipeline failed to start")
                .to_string();
            return Err(SubmitError::Startup {
                status: status.as_u16(),
                message,
            });
        }

        body.get("session_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| SubmitError::Startup {
                status: status.as_u16(),
                message: "response did not include a session id".to_string(),
            })
    }

    async fn build_form(
        &self,
        request: &JobRequest,
    ) -> Result<reqwest::multipart::Form, SubmitError> {
        use reqwest::multipart::{Form, Part};

        let form = match request {
            JobRequest::Upload { file } => {
                let bytes = tokio::fs::read(file).await.map_err(|err| {
                    SubmitError::Validation(format!("failed to read {}: {err}", file.display()))
                })?;
                let file_name = file
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "document".to_string());
                let mime = mime_guess::from_path(file).first_or_octet_stream();
                let part = Part::bytes(bytes)
                    .file_name(file_name)
                    .mime_str(mime.as_ref())
                    .map_err(|err| {
                        SubmitError::Validation(format!("unusable document type: {err}"))
                    })?;
                Form::new().text("mode", "upload").part("file", part)
            }
            JobRequest::Dataset {
                dataset,
                entries,
                entry_id,
            } => {
                let mut form = Form::new()
                    .text("mode", "dataset")
                    .text("dataset", dataset.wire_name())
                    .text("n", entries.to_string());
                if let Some(id) = entry_id {
                    form = form.text("entry_id", id.to_string());
                }
                form
            }
        };
        Ok(form)
    }

    /// Poll the status of a session once.
    pub async fn poll(&self, session_id: &str) -> Result<PollResult, PollError> {
        let response = self
            .http
            .get(format!("{}/pipeline_status", self.base))
            .query(&[("session_id", session_id)])
            .send()
            .await
            .map_err(PollError::Request)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(PollResult::NotYetVisible);
        }
        if !response.status().is_success() {
            return Err(PollError::Http {
                status: response.status().as_u16(),
            });
        }

        let body = response.text().await.map_err(PollError::Request)?;
        let status: StatusResponse =
            serde_json::from_str(&body).map_err(PollError::Malformed)?;
        Ok(status.into_poll_result())
    }

    /// Fetch one named result artifact. Only meaningful after the session
    /// reported `Completed`.
    pub async fn fetch_artifact(
        &self,
        session_id: &str,
        name: &str,
    ) -> Result<Value, AggregationError> {
        let url = format!("{}/sessions/{}/{}.json", self.base, session_id, name);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| AggregationError::Fetch {
                artifact: name.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(AggregationError::Http {
                artifact: name.to_string(),
                status: response.status().as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|source| AggregationError::Fetch {
                artifact: name.to_string(),
                source,
            })?;
        serde_json::from_str(&body).map_err(|source| AggregationError::Malformed {
            artifact: name.to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> PollResult {
        serde_json::from_str::<StatusResponse>(json)
            .unwrap()
            .into_poll_result()
    }

    // ── wire shape: bare names ───────────────────────────────────────

    #[test]
    fn bare_name_stages_count_as_completed() {
        let result = parse(r#"{"stages": ["Cleaning"], "completed": false}"#);
        match result {
            PollResult::InProgress { completed, running } => {
                assert!(completed.contains(&StageName::Cleaning));
                assert!(running.is_empty());
            }
            other => panic!("Expected InProgress, got {other:?}"),
        }
    }

    #[test]
    fn unknown_stage_names_are_ignored() {
        let result =
            parse(r#"{"stages": ["Cleaning", "Chunking", "Evaluation"], "completed": false}"#);
        match result {
            PollResult::InProgress { completed, .. } => {
                assert_eq!(completed.len(), 1);
                assert!(completed.contains(&StageName::Cleaning));
            }
            other => panic!("Expected InProgress, got {other:?}"),
        }
    }

    // ── wire shape: {stage, status} objects ──────────────────────────

    #[test]
    fn object_stages_split_completed_and_running() {
        let result = parse(
            r#"{"stages": [
                {"stage": "Cleaning", "status": "completed"},
                {"stage": "LegalBERT Extractive", "status": "running"}
            ], "completed": false}"#,
        );
        match result {
            PollResult::InProgress { completed, running } => {
                assert!(completed.contains(&StageName::Cleaning));
                assert!(running.contains(&StageName::Extraction));
            }
            other => panic!("Expected InProgress, got {other:?}"),
        }
    }

    #[test]
    fn object_stage_without_status_counts_as_completed() {
        let result = parse(r#"{"stages": [{"stage": "Cleaning"}], "completed": false}"#);
        match result {
            PollResult::InProgress { completed, .. } => {
                assert!(completed.contains(&StageName::Cleaning));
            }
            other => panic!("Expected InProgress, got {other:?}"),
        }
    }

    // ── terminal responses ───────────────────────────────────────────

    #[test]
    fn error_takes_precedence_over_completed() {
        let result = parse(
            r#"{"stages": [], "completed": true, "error": "CUDA out of memory"}"#,
        );
        assert_eq!(result, PollResult::Failed("CUDA out of memory".to_string()));
    }

    #[test]
    fn completed_extracts_summary_texts() {
        let result = parse(
            r#"{"stages": ["Cleaning"], "completed": true,
                "results": [{"summary_text": "the appeal is dismissed"}, {"summary_text": ""}]}"#,
        );
        match result {
            PollResult::Completed { summaries } => {
                assert_eq!(summaries.len(), 2);
                assert_eq!(summaries[0], "the appeal is dismissed");
                assert_eq!(summaries[1], NO_SUMMARY);
            }
            other => panic!("Expected Completed, got {other:?}"),
        }
    }

    #[test]
    fn completed_with_non_array_results_yields_no_summaries() {
        let result = parse(r#"{"completed": true, "results": {"entries": []}}"#);
        assert_eq!(
            result,
            PollResult::Completed {
                summaries: Vec::new()
            }
        );
    }

    #[test]
    fn missing_fields_default_to_empty_in_progress() {
        let result = parse(r#"{}"#);
        assert_eq!(
            result,
            PollResult::InProgress {
                completed: BTreeSet::new(),
                running: BTreeSet::new(),
            }
        );
    }

    // ── JobRequest validation ────────────────────────────────────────

    #[test]
    fn upload_requires_an_existing_file() {
        let request = JobRequest::Upload {
            file: PathBuf::from("/definitely/not/here.pdf"),
        };
        match request.validate() {
            Err(SubmitError::Validation(message)) => {
                assert!(message.contains("not found"));
            }
            other => panic!("Expected Validation error, got {other:?}"),
        }
    }

    #[test]
    fn upload_accepts_an_existing_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let request = JobRequest::Upload {
            file: file.path().to_path_buf(),
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn dataset_entry_count_bounds() {
        let request = |entries| JobRequest::Dataset {
            dataset: DatasetId::Ilc,
            entries,
            entry_id: None,
        };
        assert!(matches!(
            request(0).validate(),
            Err(SubmitError::Validation(_))
        ));
        assert!(matches!(
            request(1001).validate(),
            Err(SubmitError::Validation(_))
        ));
        assert!(request(1).validate().is_ok());
        assert!(request(1000).validate().is_ok());
    }

    #[test]
    fn dataset_entry_id_must_be_positive() {
        let request = JobRequest::Dataset {
            dataset: DatasetId::InAbs,
            entries: 5,
            entry_id: Some(0),
        };
        assert!(matches!(
            request.validate(),
            Err(SubmitError::Validation(_))
        ));

        let request = JobRequest::Dataset {
            dataset: DatasetId::InAbs,
            entries: 5,
            entry_id: Some(3),
        };
        assert!(request.validate().is_ok());
    }

    // ── artifact slugs ───────────────────────────────────────────────

    #[test]
    fn artifact_slug_follows_dataset_choice() {
        let dataset = JobRequest::Dataset {
            dataset: DatasetId::InAbs,
            entries: 1,
            entry_id: None,
        };
        assert_eq!(dataset.artifact_slug(), "in-abs");

        let upload = JobRequest::Upload {
            file: PathBuf::from("doc.pdf"),
        };
        assert_eq!(upload.artifact_slug(), "upload");
    }

    #[test]
    fn dataset_wire_names() {
        assert_eq!(DatasetId::Ilc.wire_name(), "ILC");
        assert_eq!(DatasetId::InAbs.wire_name(), "IN-ABS");
        assert_eq!(DatasetId::Ilc.to_string(), "ILC");
    }
}
