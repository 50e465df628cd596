//! Ordered pipeline stages and the completion model that drives them.
//!
//! The remote pipeline reports a cumulative set of finished stage names per
//! poll. `StageModel` maps that sparse, eventually-consistent signal onto a
//! deterministic local state machine: stages complete exactly once, never
//! regress, and only enter `InProgress` after every earlier stage finished.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Display target while a stage is still running. 100 is reserved for
/// confirmed completion so a stage never looks done while work is in flight.
pub const INTERIM_TARGET: f32 = 85.0;

/// Display value for a confirmed-complete stage.
pub const DONE: f32 = 100.0;

/// The pipeline phases tracked by this client, in execution order.
///
/// Wire names are matched exactly; the service also emits bookkeeping entries
/// (e.g. "Chunking") that have no local counterpart and are ignored.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum StageName {
    /// Document cleaning and normalization.
    #[serde(rename = "Cleaning")]
    Cleaning,
    /// LegalBERT extractive sentence selection.
    #[serde(rename = "LegalBERT Extractive")]
    Extraction,
    /// T5 abstractive refinement.
    #[serde(rename = "T5 Abstractive")]
    Abstraction,
}

impl StageName {
    pub const ALL: [StageName; 3] = [
        StageName::Cleaning,
        StageName::Extraction,
        StageName::Abstraction,
    ];

    /// Exact name used by the remote service for this stage.
    pub fn wire_name(self) -> &'static str {
        match self {
            StageName::Cleaning => "Cleaning",
            StageName::Extraction => "LegalBERT Extractive",
            StageName::Abstraction => "T5 Abstractive",
        }
    }

    /// Exact-match lookup from a wire name. Unknown names yield `None`.
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|stage| stage.wire_name() == name)
    }

    /// Rank within the pipeline; stages execute in ascending order upstream.
    pub fn order(self) -> usize {
        match self {
            StageName::Cleaning => 0,
            StageName::Extraction => 1,
            StageName::Abstraction => 2,
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    InProgress,
    Completed,
}

/// A local stage transition produced by applying one poll response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageEvent {
    /// The stage entered `InProgress`; animate toward the interim target.
    Started(StageName),
    /// The stage completed; animate toward 100.
    Completed(StageName),
}

/// Local state of every pipeline stage for one session.
#[derive(Debug)]
pub struct StageModel {
    statuses: [StageStatus; StageName::ALL.len()],
}

impl Default for StageModel {
    fn default() -> Self {
        Self::new()
    }
}

impl StageModel {
    pub fn new() -> Self {
        Self {
            statuses: [StageStatus::Pending; StageName::ALL.len()],
        }
    }

    pub fn status(&self, stage: StageName) -> StageStatus {
        self.statuses[stage.order()]
    }

    fn set_status(&mut self, stage: StageName, status: StageStatus) {
        self.statuses[stage.order()] = status;
    }

    fn predecessors_completed(&self, stage: StageName) -> bool {
        StageName::ALL[..stage.order()]
            .iter()
            .all(|earlier| self.status(*earlier) == StageStatus::Completed)
    }

    fn first_pending(&self) -> Option<StageName> {
        StageName::ALL
            .into_iter()
            .find(|stage| self.status(*stage) != StageStatus::Completed)
    }

    /// Apply the cumulative set of stages the service reports as finished,
    /// plus any explicit "currently running" indicators.
    ///
    /// Completion transitions are applied first and emitted exactly once per
    /// stage (re-reporting an already-completed stage is a no-op). A stage
    /// then enters `InProgress` only when its full predecessor chain is
    /// completed and it is either explicitly reported as running or inferred
    /// as the first not-yet-completed stage.
    pub fn apply_completed_set(
        &mut self,
        completed: &BTreeSet<StageName>,
        running: &BTreeSet<StageName>,
    ) -> Vec<StageEvent> {
        let mut events = Vec::new();

        for stage in StageName::ALL {
            if self.status(stage) != StageStatus::Completed && completed.contains(&stage) {
                self.set_status(stage, StageStatus::Completed);
                events.push(StageEvent::Completed(stage));
            }
        }

        for stage in StageName::ALL {
            if self.status(stage) != StageStatus::Pending {
                continue;
            }
            if !self.predecessors_completed(stage) {
                continue;
            }
            let started = running.contains(&stage) || self.first_pending() == Some(stage);
            if started {
                self.set_status(stage, StageStatus::InProgress);
                events.push(StageEvent::Started(stage));
            }
        }

        events
    }

    /// Force every stage to `Completed` on a terminal success response.
    ///
    /// Closes stages that finished too fast between polls to be individually
    /// observed; the emitted events cover only stages not already completed.
    pub fn apply_terminal(&mut self) -> Vec<StageEvent> {
        let mut events = Vec::new();
        for stage in StageName::ALL {
            if self.status(stage) != StageStatus::Completed {
                self.set_status(stage, StageStatus::Completed);
                events.push(StageEvent::Completed(stage));
            }
        }
        events
    }
}
