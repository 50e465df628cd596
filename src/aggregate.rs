//! Post-completion artifact aggregation.
//!
//! After a session completes, the service leaves three JSON artifacts behind:
//! the cleaned inputs, the final summaries, and a score report. This module
//! fetches them concurrently and joins the first two by record key into
//! unified display records, with the score report reduced to named aggregate
//! metrics.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

use crate::client::PipelineClient;
use crate::errors::AggregationError;

/// Placeholder for fields missing from a source artifact.
pub const NOT_AVAILABLE: &str = "not available";

/// Metric names expected in the score report.
const SCORE_NAMES: [&str; 3] = ["rouge1", "rouge2", "rougeL"];

/// The artifact names to fetch for one session, derived from its dataset
/// choice (`cleaned`, `t5_{slug}_final`, `rouge_{slug}`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSet {
    pub cleaned: String,
    pub summary: String,
    pub scores: String,
}

impl ArtifactSet {
    pub fn for_slug(slug: &str) -> Self {
        Self {
            cleaned: "cleaned".to_string(),
            summary: format!("t5_{slug}_final"),
            scores: format!("rouge_{slug}"),
        }
    }
}

/// One joined document after completion.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    /// Join key shared across artifacts.
    pub key: i64,
    pub source_text: String,
    pub reference_summary: String,
    pub generated_summary: String,
}

/// Everything the aggregation step hands to the UI layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateOutcome {
    pub records: Vec<ResultRecord>,
    /// Named metric → fractional value in [0,1]; absent metrics are omitted.
    pub scores: BTreeMap<String, f64>,
}

/// Fetches and joins a completed session's artifacts.
pub struct ResultAggregator<'a> {
    client: &'a PipelineClient,
}

impl<'a> ResultAggregator<'a> {
    pub fn new(client: &'a PipelineClient) -> Self {
        Self { client }
    }

    /// Fetch the three artifacts concurrently and assemble the outcome.
    ///
    /// Any one fetch failing surfaces as a single [`AggregationError`];
    /// no partial outcome is ever produced.
    pub async fn fetch_and_join(
        &self,
        session_id: &str,
        artifacts: &ArtifactSet,
    ) -> Result<AggregateOutcome, AggregationError> {
        let (cleaned, summaries, report) = tokio::try_join!(
            self.client.fetch_artifact(session_id, &artifacts.cleaned),
            self.client.fetch_artifact(session_id, &artifacts.summary),
            self.client.fetch_artifact(session_id, &artifacts.scores),
        )?;

        let records = join_records(&cleaned, &summaries, artifacts)?;
        let scores = extract_scores(&report);
        Ok(AggregateOutcome { records, scores })
    }
}

/// Outer-join the cleaned-input and final-summary artifacts by record key.
///
/// The cleaned artifact is the left set: exactly one record is produced per
/// key it contains, with the sentinel filling any field the summary artifact
/// lacks. Summary entries whose key never appears in the cleaned set are
/// dropped.
pub fn join_records(
    cleaned: &Value,
    summaries: &Value,
    artifacts: &ArtifactSet,
) -> Result<Vec<ResultRecord>, AggregationError> {
    let cleaned_entries = cleaned
        .as_array()
        .ok_or_else(|| AggregationError::Shape {
            artifact: artifacts.cleaned.clone(),
            reason: "expected a JSON array".to_string(),
        })?;
    let summary_entries = summaries
        .as_array()
        .ok_or_else(|| AggregationError::Shape {
            artifact: artifacts.summary.clone(),
            reason: "expected a JSON array".to_string(),
        })?;

    let summaries_by_key: BTreeMap<i64, &Value> = summary_entries
        .iter()
        .filter_map(|entry| {
            entry
                .get("id")
                .and_then(Value::as_i64)
                .map(|key| (key, entry))
        })
        .collect();

    let mut seen = BTreeSet::new();
    let mut records = Vec::with_capacity(cleaned_entries.len());
    for entry in cleaned_entries {
        let Some(key) = entry.get("id").and_then(Value::as_i64) else {
            warn!("skipping cleaned entry without an id");
            continue;
        };
        if !seen.insert(key) {
            warn!(key, "duplicate key in cleaned artifact, keeping the first");
            continue;
        }
        let generated_summary = summaries_by_key
            .get(&key)
            .map(|summary| string_field(summary, "refined_summary_improved"))
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());
        records.push(ResultRecord {
            key,
            source_text: string_field(entry, "input_text"),
            reference_summary: string_field(entry, "summary_text"),
            generated_summary,
        });
    }
    Ok(records)
}

fn string_field(entry: &Value, name: &str) -> String {
    entry
        .get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

/// Reduce the score report to named fractional metrics.
///
/// The evaluator nests averages under a `scores` object, but older reports
/// kept them at the top level; both are accepted. Absent metrics are simply
/// omitted and values outside [0,1] are discarded.
pub fn extract_scores(report: &Value) -> BTreeMap<String, f64> {
    let nested = report.get("scores");
    let mut scores = BTreeMap::new();
    for name in SCORE_NAMES {
        let value = nested
            .and_then(|section| section.get(name))
            .or_else(|| report.get(name))
            .and_then(Value::as_f64);
        match value {
            Some(value) if (0.0..=1.0).contains(&value) => {
                scores.insert(name.to_string(), value);
            }
            Some(value) => {
                warn!(metric = name, value, "discarding out-of-range score");
            }
            None => {}
        }
    }
    scores
}
