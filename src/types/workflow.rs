//! Stage 5 types: workflow state machine and per-invocation results
//!
//! ```text
//! Pending ──Started──▶ Running{completed, failed}
//!   Running ──StageSucceeded──▶ Running{completed + 1, failed}
//!   Running ──StageFailed──▶ Failed                  (halt policy)
//!   Running ──StageFailed──▶ Running{.., failed + 1} (continue policy)
//!   Running ──ObservationRejected──▶ Partial
//!   Running ──Finished──▶ Completed | Partial | Failed
//! ```
//!
//! Terminal states absorb every event.

use super::observation::NormalizationOutcome;
use super::reading::{PerceptionRecord, RawReading};
use super::recommendation::RecommendationOutcome;
use super::risk::RiskAnalysis;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Stages
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Perception,
    Normalization,
    Analysis,
    Recommendation,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Perception => "perception",
            Stage::Normalization => "normalization",
            Stage::Analysis => "analysis",
            Stage::Recommendation => "recommendation",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Status & State Machine
// ============================================================================

/// Externally visible workflow status
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Partial,
}

impl WorkflowStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Partial
        )
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkflowStatus::Pending => "pending",
            WorkflowStatus::Running => "running",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Partial => "partial",
        };
        write!(f, "{s}")
    }
}

/// What to do when a required stage fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ContinuationPolicy {
    /// Finalize as failed immediately
    #[default]
    Halt,
    /// Keep running stages whose inputs are available
    Continue,
}

impl ContinuationPolicy {
    pub fn from_flag(continue_on_failure: bool) -> Self {
        if continue_on_failure {
            ContinuationPolicy::Continue
        } else {
            ContinuationPolicy::Halt
        }
    }
}

/// Inputs to the workflow state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowEvent {
    Started,
    StageSucceeded,
    StageFailed,
    ObservationRejected,
    Finished,
}

/// Single state field driving one invocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WorkflowState {
    #[default]
    Pending,
    Running { completed: u8, failed: u8 },
    Completed,
    Partial,
    Failed,
}

impl WorkflowState {
    /// Pure transition function.
    pub fn transition(self, event: WorkflowEvent, policy: ContinuationPolicy) -> Self {
        match (self, event) {
            (WorkflowState::Pending, WorkflowEvent::Started) => WorkflowState::Running {
                completed: 0,
                failed: 0,
            },
            (WorkflowState::Pending, _) => WorkflowState::Pending,
            (WorkflowState::Running { completed, failed }, WorkflowEvent::StageSucceeded) => {
                WorkflowState::Running {
                    completed: completed.saturating_add(1),
                    failed,
                }
            }
            (WorkflowState::Running { completed, failed }, WorkflowEvent::StageFailed) => {
                match policy {
                    ContinuationPolicy::Halt => WorkflowState::Failed,
                    ContinuationPolicy::Continue => WorkflowState::Running {
                        completed,
                        failed: failed.saturating_add(1),
                    },
                }
            }
            (WorkflowState::Running { .. }, WorkflowEvent::ObservationRejected) => {
                WorkflowState::Partial
            }
            (WorkflowState::Running { completed, failed }, WorkflowEvent::Finished) => {
                if failed == 0 {
                    WorkflowState::Completed
                } else if completed > 0 {
                    WorkflowState::Partial
                } else {
                    WorkflowState::Failed
                }
            }
            (state @ WorkflowState::Running { .. }, WorkflowEvent::Started) => state,
            (terminal, _) => terminal,
        }
    }

    pub fn status(self) -> WorkflowStatus {
        match self {
            WorkflowState::Pending => WorkflowStatus::Pending,
            WorkflowState::Running { .. } => WorkflowStatus::Running,
            WorkflowState::Completed => WorkflowStatus::Completed,
            WorkflowState::Partial => WorkflowStatus::Partial,
            WorkflowState::Failed => WorkflowStatus::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.status().is_terminal()
    }
}

// ============================================================================
// Results
// ============================================================================

/// Structured stage failure recorded on the workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowError {
    pub stage: Stage,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

/// Everything one pipeline invocation produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub workflow_id: String,
    pub status: WorkflowStatus,
    pub stages_completed: Vec<Stage>,
    pub stages_failed: Vec<Stage>,
    /// Stages intentionally not run (e.g. recommendation when not needed)
    pub stages_skipped: Vec<Stage>,
    pub input: RawReading,
    pub perception: Option<PerceptionRecord>,
    pub normalization: Option<NormalizationOutcome>,
    pub analysis: Option<RiskAnalysis>,
    pub recommendation: Option<RecommendationOutcome>,
    pub errors: Vec<WorkflowError>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: f64,
}

impl WorkflowResult {
    /// Fresh result in `pending` status
    pub fn new(workflow_id: String, input: RawReading, started_at: DateTime<Utc>) -> Self {
        Self {
            workflow_id,
            status: WorkflowStatus::Pending,
            stages_completed: Vec::new(),
            stages_failed: Vec::new(),
            stages_skipped: Vec::new(),
            input,
            perception: None,
            normalization: None,
            analysis: None,
            recommendation: None,
            errors: Vec::new(),
            started_at,
            completed_at: None,
            duration_ms: 0.0,
        }
    }

    pub fn completed(&self, stage: Stage) -> bool {
        self.stages_completed.contains(&stage)
    }

    pub fn failed(&self, stage: Stage) -> bool {
        self.stages_failed.contains(&stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(events: &[WorkflowEvent], policy: ContinuationPolicy) -> WorkflowState {
        events
            .iter()
            .fold(WorkflowState::Pending, |s, e| s.transition(*e, policy))
    }

    #[test]
    fn test_happy_path_completes() {
        let state = run(
            &[
                WorkflowEvent::Started,
                WorkflowEvent::StageSucceeded,
                WorkflowEvent::StageSucceeded,
                WorkflowEvent::Finished,
            ],
            ContinuationPolicy::Halt,
        );
        assert_eq!(state, WorkflowState::Completed);
    }

    #[test]
    fn test_failure_halts() {
        let state = run(
            &[WorkflowEvent::Started, WorkflowEvent::StageFailed],
            ContinuationPolicy::Halt,
        );
        assert_eq!(state, WorkflowState::Failed);
    }

    #[test]
    fn test_failure_with_continuation_is_partial() {
        let state = run(
            &[
                WorkflowEvent::Started,
                WorkflowEvent::StageSucceeded,
                WorkflowEvent::StageFailed,
                WorkflowEvent::Finished,
            ],
            ContinuationPolicy::Continue,
        );
        assert_eq!(state, WorkflowState::Partial);
    }

    #[test]
    fn test_all_failed_with_continuation_is_failed() {
        let state = run(
            &[
                WorkflowEvent::Started,
                WorkflowEvent::StageFailed,
                WorkflowEvent::Finished,
            ],
            ContinuationPolicy::Continue,
        );
        assert_eq!(state, WorkflowState::Failed);
    }

    #[test]
    fn test_rejection_is_partial() {
        let state = run(
            &[
                WorkflowEvent::Started,
                WorkflowEvent::StageSucceeded,
                WorkflowEvent::ObservationRejected,
            ],
            ContinuationPolicy::Halt,
        );
        assert_eq!(state, WorkflowState::Partial);
    }

    #[test]
    fn test_terminal_states_absorb_events() {
        for terminal in [WorkflowState::Completed, WorkflowState::Partial, WorkflowState::Failed] {
            for event in [
                WorkflowEvent::Started,
                WorkflowEvent::StageSucceeded,
                WorkflowEvent::StageFailed,
                WorkflowEvent::ObservationRejected,
                WorkflowEvent::Finished,
            ] {
                assert_eq!(terminal.transition(event, ContinuationPolicy::Continue), terminal);
            }
        }
    }

    #[test]
    fn test_pending_ignores_events_until_started() {
        let state = WorkflowState::Pending
            .transition(WorkflowEvent::StageSucceeded, ContinuationPolicy::Halt);
        assert_eq!(state, WorkflowState::Pending);
        assert_eq!(state.status(), WorkflowStatus::Pending);
    }
}
