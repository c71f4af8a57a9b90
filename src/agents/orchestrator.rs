//! Orchestrator - Stage 5: fault-aware sequencing of the four stages
//!
//! ```text
//! RawReading
//!   → Perception      (fails fast on invalid input)
//!   → Normalization   (rejection ends the workflow as partial)
//!   → Analysis
//!   → Recommendation  (skipped when the analysis does not need it)
//!   → WorkflowResult  (finalized exactly once)
//! ```
//!
//! A single `WorkflowState` drives each invocation through the pure
//! transition function in `types::workflow`. Stage errors never escape
//! `process`; they are recorded on the result with their stage and time.

use super::analysis::{AnalysisAgent, AnalysisStats};
use super::normalization::{NormalizationAgent, NormalizationStats};
use super::perception::{PerceptionAgent, PerceptionStats};
use super::recommendation::{RecommendationAgent, RecommendationStats};
use crate::clock::{Clock, SystemClock};
use crate::config::PipelineConfig;
use crate::notifier::{Notification, Notifier, TracingNotifier};
use crate::storage::{HistoryStore, InMemoryHistoryStore};
use crate::types::{
    ContinuationPolicy, NormalizationOutcome, RawReading, RiskLevel, Stage, WorkflowError,
    WorkflowEvent, WorkflowResult, WorkflowState, WorkflowStatus,
};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A stage error as seen by the orchestrator
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{stage} stage failed: {message}")]
pub struct StageFailure {
    pub stage: Stage,
    pub message: String,
}

impl StageFailure {
    fn new(stage: Stage, err: impl std::fmt::Display) -> Self {
        Self {
            stage,
            message: err.to_string(),
        }
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

pub struct Orchestrator {
    perception: PerceptionAgent,
    normalization: NormalizationAgent,
    analysis: AnalysisAgent,
    recommendation: RecommendationAgent,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    policy: ContinuationPolicy,
    notify_min_risk_level: RiskLevel,
    /// Finalized workflows, oldest first
    history: VecDeque<WorkflowResult>,
    history_capacity: usize,
    metrics: WorkflowMetrics,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("policy", &self.policy)
            .field("notifier", &self.notifier.notifier_name())
            .field("history_len", &self.history.len())
            .field("metrics", &self.metrics)
            .finish()
    }
}

impl Orchestrator {
    /// In-memory history, wall clock, tracing notifier
    pub fn new(config: &PipelineConfig) -> Self {
        Self::with_components(
            config,
            Arc::new(InMemoryHistoryStore::new()),
            Arc::new(TracingNotifier),
            Arc::new(SystemClock),
        )
    }

    pub fn with_defaults() -> Self {
        Self::new(&PipelineConfig::default())
    }

    /// Wire the stages with injected capabilities.
    pub fn with_components(
        config: &PipelineConfig,
        history: Arc<dyn HistoryStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        info!(
            history = history.store_name(),
            notifier = notifier.notifier_name(),
            continue_on_failure = config.orchestrator.continue_on_failure,
            "Initializing SST pipeline orchestrator"
        );

        // Configs built in code skip from_toml_str
        let mut config = config.clone();
        config.normalize_keys();

        let capacity = config.orchestrator.history_capacity.max(1);
        Self {
            perception: PerceptionAgent::new(config.perception),
            normalization: NormalizationAgent::new(config.normalization),
            analysis: AnalysisAgent::new(config.analysis, history, Arc::clone(&clock)),
            recommendation: RecommendationAgent::new(config.recommendation, Arc::clone(&clock)),
            notifier,
            clock,
            policy: ContinuationPolicy::from_flag(config.orchestrator.continue_on_failure),
            notify_min_risk_level: config.orchestrator.notify_min_risk_level,
            history: VecDeque::with_capacity(capacity),
            history_capacity: capacity,
            metrics: WorkflowMetrics::default(),
        }
    }

    pub fn policy(&self) -> ContinuationPolicy {
        self.policy
    }

    /// Run one reading through the pipeline. Always returns a finalized result.
    pub fn process(&mut self, reading: &RawReading) -> WorkflowResult {
        let started = Instant::now();
        let now = self.clock.now();
        let mut result = WorkflowResult::new(Uuid::new_v4().to_string(), reading.clone(), now);
        let mut state = self.step(WorkflowState::Pending, WorkflowEvent::Started, &mut result);

        debug!(workflow_id = %result.workflow_id, sensor_type = %reading.sensor_type, "Workflow started");

        // Stage 1: Perception
        let perception = match self.perception.process_at(reading, now) {
            Ok(record) => {
                state = self.succeed(state, &mut result, Stage::Perception);
                Some(record)
            }
            Err(e) => {
                state = self.fail(state, &mut result, StageFailure::new(Stage::Perception, e));
                None
            }
        };
        result.perception = perception.clone();
        if state.is_terminal() {
            return self.finalize(result, state, started);
        }

        // Stage 2: Normalization
        let observation = match &perception {
            Some(record) => match self.normalization.process(
                record.value,
                &record.unit,
                &record.sensor_type,
                &record.source,
            ) {
                Ok(outcome) => {
                    state = self.succeed(state, &mut result, Stage::Normalization);
                    let observation = outcome.observation().cloned();
                    let rejected = outcome.is_rejected();
                    result.normalization = Some(outcome);
                    if rejected {
                        state = self.step(state, WorkflowEvent::ObservationRejected, &mut result);
                    }
                    observation
                }
                Err(e) => {
                    state = self.fail(state, &mut result, StageFailure::new(Stage::Normalization, e));
                    None
                }
            },
            None => None,
        };
        if state.is_terminal() {
            return self.finalize(result, state, started);
        }

        // Stage 3: Analysis
        let analysis = match (&observation, &perception) {
            (Some(obs), Some(record)) => match self.analysis.process(
                obs.value,
                &obs.unit,
                &obs.source_metadata.sensor_type,
                obs.quality_score,
                &record.location,
            ) {
                Ok(analysis) => {
                    state = self.succeed(state, &mut result, Stage::Analysis);
                    Some(analysis)
                }
                Err(e) => {
                    state = self.fail(state, &mut result, StageFailure::new(Stage::Analysis, e));
                    None
                }
            },
            _ => None,
        };
        result.analysis = analysis.clone();
        if state.is_terminal() {
            return self.finalize(result, state, started);
        }

        // Stage 4: Recommendation (conditional)
        if let Some(analysis) = &analysis {
            if analysis.recommendations_needed {
                match self.recommendation.process(analysis) {
                    Ok(outcome) => {
                        state = self.succeed(state, &mut result, Stage::Recommendation);
                        result.recommendation = Some(outcome);
                    }
                    Err(e) => {
                        state = self.fail(state, &mut result, StageFailure::new(Stage::Recommendation, e));
                    }
                }
            } else {
                result.stages_skipped.push(Stage::Recommendation);
            }
        }

        self.finalize(result, state, started)
    }

    /// Run readings one after another; one result per reading, in order.
    pub fn process_batch(&mut self, readings: &[RawReading]) -> Vec<WorkflowResult> {
        let results: Vec<WorkflowResult> = readings.iter().map(|r| self.process(r)).collect();
        info!(
            batch_size = readings.len(),
            completed = results.iter().filter(|r| r.status == WorkflowStatus::Completed).count(),
            partial = results.iter().filter(|r| r.status == WorkflowStatus::Partial).count(),
            failed = results.iter().filter(|r| r.status == WorkflowStatus::Failed).count(),
            "Batch processed"
        );
        results
    }

    // ========================================================================
    // State transitions
    // ========================================================================

    fn step(&self, state: WorkflowState, event: WorkflowEvent, result: &mut WorkflowResult) -> WorkflowState {
        let next = state.transition(event, self.policy);
        result.status = next.status();
        next
    }

    fn succeed(&self, state: WorkflowState, result: &mut WorkflowResult, stage: Stage) -> WorkflowState {
        result.stages_completed.push(stage);
        self.step(state, WorkflowEvent::StageSucceeded, result)
    }

    fn fail(&self, state: WorkflowState, result: &mut WorkflowResult, failure: StageFailure) -> WorkflowState {
        warn!(
            workflow_id = %result.workflow_id,
            stage = %failure.stage,
            error = %failure.message,
            "Stage failed"
        );
        result.stages_failed.push(failure.stage);
        result.errors.push(WorkflowError {
            stage: failure.stage,
            error: failure.message,
            timestamp: self.clock.now(),
        });
        self.step(state, WorkflowEvent::StageFailed, result)
    }

    fn finalize(&mut self, mut result: WorkflowResult, state: WorkflowState, started: Instant) -> WorkflowResult {
        let state = if state.is_terminal() {
            state
        } else {
            state.transition(WorkflowEvent::Finished, self.policy)
        };
        result.status = state.status();
        result.completed_at = Some(self.clock.now());
        result.duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        self.metrics.record(&result);

        info!(
            workflow_id = %result.workflow_id,
            status = %result.status,
            completed = result.stages_completed.len(),
            failed = result.stages_failed.len(),
            duration_ms = result.duration_ms,
            "Workflow finalized"
        );

        if self.should_notify(&result) {
            let notification = Notification::from_result(&result, self.clock.now());
            if let Err(e) = self.notifier.notify(&notification) {
                warn!(
                    workflow_id = %result.workflow_id,
                    notifier = self.notifier.notifier_name(),
                    error = %e,
                    "Notification failed"
                );
            }
        }

        if self.history.len() >= self.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(result.clone());
        result
    }

    fn should_notify(&self, result: &WorkflowResult) -> bool {
        result.status == WorkflowStatus::Failed
            || result
                .analysis
                .as_ref()
                .is_some_and(|a| a.risk_level >= self.notify_min_risk_level)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Up to `n` most recent workflows, newest first
    pub fn recent(&self, n: usize) -> Vec<&WorkflowResult> {
        self.history.iter().rev().take(n).collect()
    }

    pub fn find(&self, workflow_id: &str) -> Option<&WorkflowResult> {
        self.history.iter().rev().find(|r| r.workflow_id == workflow_id)
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn metrics(&self) -> &WorkflowMetrics {
        &self.metrics
    }

    pub fn stage_stats(&self) -> StageStats {
        StageStats {
            perception: self.perception.stats(),
            normalization: self.normalization.stats(),
            analysis: self.analysis.stats(),
            recommendation: self.recommendation.stats(),
        }
    }

    /// Zero metrics and per-stage counters; history windows are kept.
    pub fn reset_stats(&mut self) {
        self.metrics = WorkflowMetrics::default();
        self.perception.reset_stats();
        self.normalization.reset_stats();
        self.analysis.reset_stats();
        self.recommendation.reset_stats();
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::with_defaults()
    }
}

// ============================================================================
// Metrics
// ============================================================================

/// Running aggregate over every finalized workflow
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct WorkflowMetrics {
    pub workflows_executed: u64,
    pub workflows_successful: u64,
    pub workflows_partial: u64,
    pub workflows_failed: u64,
    pub observations_rejected: u64,
    pub plans_generated: u64,
    pub average_duration_ms: f64,
}

impl WorkflowMetrics {
    fn record(&mut self, result: &WorkflowResult) {
        self.workflows_executed += 1;
        match result.status {
            WorkflowStatus::Completed => self.workflows_successful += 1,
            WorkflowStatus::Partial => self.workflows_partial += 1,
            WorkflowStatus::Failed => self.workflows_failed += 1,
            WorkflowStatus::Pending | WorkflowStatus::Running => {}
        }
        if result.normalization.as_ref().is_some_and(NormalizationOutcome::is_rejected) {
            self.observations_rejected += 1;
        }
        if result.recommendation.as_ref().and_then(|r| r.plan()).is_some() {
            self.plans_generated += 1;
        }
        self.average_duration_ms +=
            (result.duration_ms - self.average_duration_ms) / self.workflows_executed as f64;
    }

    /// Completed workflows as a percentage of all executed
    pub fn success_rate(&self) -> f64 {
        if self.workflows_executed == 0 {
            0.0
        } else {
            self.workflows_successful as f64 / self.workflows_executed as f64 * 100.0
        }
    }
}

impl std::fmt::Display for WorkflowMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Workflows: {} (completed {}, partial {}, failed {}; {:.1}% success), \
             Rejected: {}, Plans: {}, Avg: {:.3} ms",
            self.workflows_executed,
            self.workflows_successful,
            self.workflows_partial,
            self.workflows_failed,
            self.success_rate(),
            self.observations_rejected,
            self.plans_generated,
            self.average_duration_ms,
        )
    }
}

/// Per-stage counters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageStats {
    pub perception: PerceptionStats,
    pub normalization: NormalizationStats,
    pub analysis: AnalysisStats,
    pub recommendation: RecommendationStats,
}

impl std::fmt::Display for StageStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Perception     | {}", self.perception)?;
        writeln!(f, "Normalization  | {}", self.normalization)?;
        writeln!(f, "Analysis       | {}", self.analysis)?;
        write!(f, "Recommendation | {}", self.recommendation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::ChannelNotifier;

    fn reading(sensor_type: &str, value: f64, unit: &str) -> RawReading {
        RawReading::new("sensor-07", sensor_type, value, unit, "Atelier B")
    }

    #[test]
    fn test_normal_reading_completes_and_skips_recommendation() {
        let mut orch = Orchestrator::with_defaults();
        let result = orch.process(&reading("temperature", 22.0, "°C"));
        assert_eq!(result.status, WorkflowStatus::Completed);
        assert_eq!(
            result.stages_completed,
            vec![Stage::Perception, Stage::Normalization, Stage::Analysis]
        );
        assert_eq!(result.stages_skipped, vec![Stage::Recommendation]);
        assert!(result.recommendation.is_none());
        assert!(result.completed_at.is_some());
    }

    #[test]
    fn test_high_risk_reading_produces_plan() {
        let mut orch = Orchestrator::with_defaults();
        let result = orch.process(&reading("noise", 95.0, "dB"));
        assert_eq!(result.status, WorkflowStatus::Completed);
        assert!(result.completed(Stage::Recommendation));
        let plan = result.recommendation.as_ref().and_then(|r| r.plan()).expect("plan");
        assert!(!plan.recommendations.is_empty());
        assert_eq!(orch.metrics().plans_generated, 1);
    }

    #[test]
    fn test_invalid_reading_fails_at_perception() {
        let mut orch = Orchestrator::with_defaults();
        let mut bad = reading("noise", 95.0, "dB");
        bad.source.clear();
        let result = orch.process(&bad);
        assert_eq!(result.status, WorkflowStatus::Failed);
        assert_eq!(result.stages_failed, vec![Stage::Perception]);
        assert!(result.failed(Stage::Perception));
        assert!(!result.failed(Stage::Normalization));
        assert!(result.stages_completed.is_empty());
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].stage, Stage::Perception);
        assert!(result.errors[0].error.contains("source"));
    }

    #[test]
    fn test_continuation_with_nothing_downstream_is_failed() {
        let mut config = PipelineConfig::default();
        config.orchestrator.continue_on_failure = true;
        let mut orch = Orchestrator::new(&config);
        let mut bad = reading("noise", 95.0, "dB");
        bad.value = None;
        let result = orch.process(&bad);
        assert_eq!(result.status, WorkflowStatus::Failed);
        assert_eq!(result.stages_failed, vec![Stage::Perception]);
    }

    #[test]
    fn test_rejection_is_partial() {
        let mut orch = Orchestrator::with_defaults();
        let result = orch.process(&reading("temperature", 900.0, "°C"));
        assert_eq!(result.status, WorkflowStatus::Partial);
        assert!(result.completed(Stage::Normalization));
        assert!(!result.completed(Stage::Analysis));
        assert!(result.analysis.is_none());
        assert!(result.normalization.as_ref().is_some_and(|n| n.is_rejected()));
        assert_eq!(orch.metrics().observations_rejected, 1);
        assert_eq!(orch.metrics().workflows_partial, 1);
    }

    #[test]
    fn test_history_ring_buffer_is_bounded() {
        let mut config = PipelineConfig::default();
        config.orchestrator.history_capacity = 3;
        let mut orch = Orchestrator::new(&config);
        let results = orch.process_batch(&vec![reading("temperature", 21.0, "°C"); 5]);
        assert_eq!(orch.history_len(), 3);
        assert!(orch.find(&results[0].workflow_id).is_none());
        assert!(orch.find(&results[4].workflow_id).is_some());
        assert_eq!(orch.recent(1)[0].workflow_id, results[4].workflow_id);
        assert_eq!(orch.metrics().workflows_executed, 5);
    }

    #[test]
    fn test_notifies_on_high_risk_only() {
        let (notifier, rx) = ChannelNotifier::new();
        let mut orch = Orchestrator::with_components(
            &PipelineConfig::default(),
            Arc::new(InMemoryHistoryStore::new()),
            Arc::new(notifier),
            Arc::new(SystemClock),
        );
        orch.process(&reading("temperature", 22.0, "°C"));
        assert!(rx.try_recv().is_err());

        orch.process(&reading("temperature", 42.0, "°C"));
        let n = rx.try_recv().expect("critical reading notifies");
        assert_eq!(n.risk_level, Some(RiskLevel::Critical));
        assert!(n.recommendations > 0);
    }

    #[test]
    fn test_metrics_average_duration() {
        let mut orch = Orchestrator::with_defaults();
        let results = orch.process_batch(&[
            reading("temperature", 21.0, "°C"),
            reading("noise", 60.0, "dB"),
        ]);
        let mean = results.iter().map(|r| r.duration_ms).sum::<f64>() / 2.0;
        assert!((orch.metrics().average_duration_ms - mean).abs() < 1e-9);
        assert!((orch.metrics().success_rate() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_reset_stats() {
        let mut orch = Orchestrator::with_defaults();
        orch.process(&reading("noise", 95.0, "dB"));
        orch.reset_stats();
        assert_eq!(orch.metrics(), &WorkflowMetrics::default());
        assert_eq!(orch.stage_stats().perception, PerceptionStats::default());
    }
}
