//! Session lifecycle and the polling loop that drives it.
//!
//! `SessionController` is the only entry point the UI layer talks to. It:
//! - submits the job and owns the resulting session
//! - spawns one polling task per session, cancelling any prior loop first
//! - translates poll results into stage/animation updates
//! - emits a single terminal event once the session ends
//!
//! The polling task multiplexes a 200 ms animation ticker with a per-attempt
//! poll delay via `tokio::select!`. Cancellation is cooperative: one flag,
//! checked once per loop step, so an in-flight request completes but its
//! result is discarded.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::aggregate::{ArtifactSet, ResultAggregator, ResultRecord};
use crate::animator::{ProgressAnimator, TICK_INTERVAL};
use crate::client::{JobRequest, PipelineClient, PollResult};
use crate::errors::SubmitError;
use crate::retry::{AbortReason, NotVisibleTracker, RetryPolicy};
use crate::stage::{DONE, INTERIM_TARGET, StageEvent, StageModel, StageName, StageStatus};

/// How a job was submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Upload,
    Dataset,
}

impl From<&JobRequest> for Mode {
    fn from(request: &JobRequest) -> Self {
        match request {
            JobRequest::Upload { .. } => Mode::Upload,
            JobRequest::Dataset { .. } => Mode::Dataset,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Submitting,
    Running,
    Completed,
    Failed,
    TimedOut,
    LostConnection,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionStatus::Submitting | SessionStatus::Running)
    }
}

/// One submitted pipeline run.
#[derive(Debug, Clone)]
pub struct Session {
    /// Opaque id issued by the remote service.
    pub id: String,
    pub mode: Mode,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    artifacts: ArtifactSet,
}

/// Updates pushed to the UI layer. Nothing else crosses the boundary.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A stage's displayed progress or status changed.
    Stage {
        stage: StageName,
        percent: f32,
        status: StageStatus,
    },
    /// The session reached a terminal state. Emitted exactly once.
    Terminal(TerminalEvent),
}

#[derive(Debug, Clone)]
pub struct TerminalEvent {
    pub status: SessionStatus,
    /// Summaries reported inline with the terminal status response.
    pub summaries: Vec<String>,
    /// Joined per-document records from the result artifacts.
    pub records: Vec<ResultRecord>,
    /// Named aggregate metrics in [0,1].
    pub scores: BTreeMap<String, f64>,
    pub error: Option<String>,
}

impl TerminalEvent {
    fn failure(status: SessionStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            summaries: Vec::new(),
            records: Vec::new(),
            scores: BTreeMap::new(),
            error: Some(message.into()),
        }
    }
}

/// Top-level orchestration for one session at a time.
pub struct SessionController {
    client: Arc<PipelineClient>,
    policy: RetryPolicy,
    events: mpsc::Sender<SessionEvent>,
    active: Option<ActiveSession>,
}

struct ActiveSession {
    id: String,
    cancelled: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl SessionController {
    pub fn new(
        client: PipelineClient,
        policy: RetryPolicy,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        Self {
            client: Arc::new(client),
            policy,
            events,
            active: None,
        }
    }

    /// Id of the session currently being polled, if any.
    pub fn session_id(&self) -> Option<&str> {
        self.active.as_ref().map(|active| active.id.as_str())
    }

    /// Whether a polling loop is still live.
    pub fn is_active(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| !active.task.is_finished())
    }

    /// Cancel the active polling loop, if any.
    ///
    /// Cooperative: an in-flight request completes but its result is
    /// discarded, and no terminal event is emitted for the abandoned session.
    pub fn reset(&mut self) {
        if let Some(active) = self.active.take() {
            debug!(session = %active.id, "cancelling polling loop");
            active.cancelled.store(true, Ordering::SeqCst);
        }
    }

    /// Submit a job and start polling it.
    ///
    /// Any prior loop is cancelled before the submit request is issued, so at
    /// most one polling loop is ever active.
    pub async fn start(&mut self, request: JobRequest) -> Result<String, SubmitError> {
        self.reset();

        let id = self.client.submit(&request).await?;
        info!(session = %id, "pipeline started");

        let session = Session {
            id: id.clone(),
            mode: Mode::from(&request),
            status: SessionStatus::Running,
            started_at: Utc::now(),
            artifacts: ArtifactSet::for_slug(&request.artifact_slug()),
        };
        let cancelled = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(poll_loop(
            Arc::clone(&self.client),
            self.policy.clone(),
            session,
            self.events.clone(),
            Arc::clone(&cancelled),
        ));
        self.active = Some(ActiveSession {
            id: id.clone(),
            cancelled,
            task,
        });
        Ok(id)
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.reset();
    }
}

/// The per-session polling task.
///
/// Within one poll cycle, stage-completion updates are applied before
/// interim-progress updates, and both before the terminal condition, so a
/// terminal response always leaves every stage at 100%.
async fn poll_loop(
    client: Arc<PipelineClient>,
    policy: RetryPolicy,
    mut session: Session,
    events: mpsc::Sender<SessionEvent>,
    cancelled: Arc<AtomicBool>,
) {
    let mut model = StageModel::new();
    let mut animator = ProgressAnimator::new();
    let mut tracker = NotVisibleTracker::default();
    let mut attempt: u32 = 0;
    let mut consecutive_failures: u32 = 0;

    let mut anim = tokio::time::interval(TICK_INTERVAL);
    anim.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        // Animate while waiting out the poll delay.
        let delay = tokio::time::sleep(policy.next_delay(attempt));
        tokio::pin!(delay);
        loop {
            tokio::select! {
                _ = anim.tick() => {
                    if cancelled.load(Ordering::SeqCst) {
                        return;
                    }
                    if flush_animation(&model, &mut animator, &events).await.is_err() {
                        return;
                    }
                }
                _ = &mut delay => break,
            }
        }
        if cancelled.load(Ordering::SeqCst) {
            return;
        }

        attempt += 1;
        if let Some(reason) = policy.should_abort(attempt, consecutive_failures) {
            emit_abort(&mut session, reason, &events).await;
            return;
        }

        let outcome = client.poll(&session.id).await;
        if cancelled.load(Ordering::SeqCst) {
            // Cancelled while the request was in flight; discard its result.
            return;
        }

        match outcome {
            Ok(PollResult::NotYetVisible) => {
                if tracker.should_warn(attempt, policy.not_visible_log_every) {
                    warn!(session = %session.id, attempt, "session not yet visible, retrying");
                }
            }
            Ok(PollResult::InProgress { completed, running }) => {
                consecutive_failures = 0;
                tracker.reset();
                let stage_events = model.apply_completed_set(&completed, &running);
                if apply_stage_events(&model, &mut animator, stage_events, &events)
                    .await
                    .is_err()
                {
                    return;
                }
            }
            Ok(PollResult::Completed { summaries }) => {
                consecutive_failures = 0;
                tracker.reset();
                model.apply_terminal();
                // Every stage lands on exactly 100, including any that
                // completed too fast between polls to be observed.
                for stage in StageName::ALL {
                    animator.finish(stage);
                    let update = SessionEvent::Stage {
                        stage,
                        percent: DONE,
                        status: StageStatus::Completed,
                    };
                    if events.send(update).await.is_err() {
                        return;
                    }
                }

                let terminal = if summaries.is_empty() {
                    session.status = SessionStatus::Failed;
                    TerminalEvent::failure(
                        session.status,
                        "pipeline completed but returned no summaries",
                    )
                } else {
                    let aggregator = ResultAggregator::new(&client);
                    match aggregator.fetch_and_join(&session.id, &session.artifacts).await {
                        Ok(outcome) => {
                            session.status = SessionStatus::Completed;
                            TerminalEvent {
                                status: session.status,
                                summaries,
                                records: outcome.records,
                                scores: outcome.scores,
                                error: None,
                            }
                        }
                        Err(err) => {
                            session.status = SessionStatus::Failed;
                            TerminalEvent::failure(
                                session.status,
                                format!("failed to assemble results: {err}"),
                            )
                        }
                    }
                };
                if cancelled.load(Ordering::SeqCst) {
                    return;
                }
                let _ = events.send(SessionEvent::Terminal(terminal)).await;
                return;
            }
            Ok(PollResult::Failed(message)) => {
                session.status = SessionStatus::Failed;
                let terminal =
                    TerminalEvent::failure(session.status, format!("pipeline error: {message}"));
                let _ = events.send(SessionEvent::Terminal(terminal)).await;
                return;
            }
            Err(err) => {
                consecutive_failures += 1;
                debug!(
                    session = %session.id,
                    consecutive_failures,
                    error = %err,
                    "status poll failed"
                );
                if let Some(reason) = policy.should_abort(attempt, consecutive_failures) {
                    emit_abort(&mut session, reason, &events).await;
                    return;
                }
            }
        }
    }
}

async fn flush_animation(
    model: &StageModel,
    animator: &mut ProgressAnimator,
    events: &mpsc::Sender<SessionEvent>,
) -> Result<(), mpsc::error::SendError<SessionEvent>> {
    for (stage, percent) in animator.tick() {
        events
            .send(SessionEvent::Stage {
                stage,
                percent,
                status: model.status(stage),
            })
            .await?;
    }
    Ok(())
}

async fn apply_stage_events(
    model: &StageModel,
    animator: &mut ProgressAnimator,
    stage_events: Vec<StageEvent>,
    events: &mpsc::Sender<SessionEvent>,
) -> Result<(), mpsc::error::SendError<SessionEvent>> {
    for event in stage_events {
        let stage = match event {
            StageEvent::Completed(stage) => {
                animator.set_target(stage, DONE);
                stage
            }
            StageEvent::Started(stage) => {
                animator.set_target(stage, INTERIM_TARGET);
                stage
            }
        };
        events
            .send(SessionEvent::Stage {
                stage,
                percent: animator.displayed(stage),
                status: model.status(stage),
            })
            .await?;
    }
    Ok(())
}

async fn emit_abort(
    session: &mut Session,
    reason: AbortReason,
    events: &mpsc::Sender<SessionEvent>,
) {
    let (status, message) = match reason {
        AbortReason::AttemptsExhausted => (
            SessionStatus::TimedOut,
            "pipeline timed out before completing",
        ),
        AbortReason::ConsecutiveFailures => (
            SessionStatus::LostConnection,
            "lost connection to the pipeline service",
        ),
    };
    session.status = status;
    warn!(session = %session.id, %message, "polling aborted");
    let _ = events
        .send(SessionEvent::Terminal(TerminalEvent::failure(
            status, message,
        )))
        .await;
}
