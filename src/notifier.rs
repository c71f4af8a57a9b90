//! Notifier capability
//!
//! Outbound signal raised by the orchestrator after a workflow is finalized
//! with elevated risk or a failure. Backends:
//! - `TracingNotifier`: structured log line (default)
//! - `NoOpNotifier`: drops everything
//! - `ChannelNotifier`: forwards to an `mpsc` receiver owned by the caller

use crate::types::{RiskLevel, WorkflowResult, WorkflowStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::mpsc;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification channel closed")]
    ChannelClosed,

    #[error("notifier lock poisoned")]
    LockPoisoned,
}

/// Summary of a finalized workflow worth attention
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub workflow_id: String,
    pub status: WorkflowStatus,
    pub sensor_type: String,
    pub location: String,
    pub risk_score: Option<f64>,
    pub risk_level: Option<RiskLevel>,
    pub recommendations: usize,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Build from a finalized workflow.
    pub fn from_result(result: &WorkflowResult, created_at: DateTime<Utc>) -> Self {
        let analysis = result.analysis.as_ref();
        let recommendations = result
            .recommendation
            .as_ref()
            .and_then(|r| r.plan())
            .map_or(0, |p| p.recommendations.len());

        let message = match (result.status, analysis) {
            (WorkflowStatus::Failed, _) => {
                let detail = result
                    .errors
                    .first()
                    .map(|e| format!("{} stage: {}", e.stage, e.error))
                    .unwrap_or_else(|| "no error detail".to_string());
                format!("Workflow failed ({detail})")
            }
            (_, Some(a)) => format!(
                "{} risk ({:.1}) for {} at {}",
                a.risk_level, a.risk_score, a.sensor_type, a.location
            ),
            (status, None) => format!("Workflow {status} without analysis"),
        };

        Self {
            workflow_id: result.workflow_id.clone(),
            status: result.status,
            sensor_type: result.input.sensor_type.trim().to_lowercase(),
            location: result.input.location.trim().to_string(),
            risk_score: analysis.map(|a| a.risk_score),
            risk_level: analysis.map(|a| a.risk_level),
            recommendations,
            message,
            created_at,
        }
    }
}

/// Trait for notification backends
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;

    /// Get the notifier name for logging
    fn notifier_name(&self) -> &'static str;
}

/// Logs each notification through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, n: &Notification) -> Result<(), NotifyError> {
        if n.status == WorkflowStatus::Failed || n.risk_level == Some(RiskLevel::Critical) {
            error!(
                workflow_id = %n.workflow_id,
                sensor_type = %n.sensor_type,
                location = %n.location,
                recommendations = n.recommendations,
                "{}", n.message
            );
        } else {
            warn!(
                workflow_id = %n.workflow_id,
                sensor_type = %n.sensor_type,
                location = %n.location,
                recommendations = n.recommendations,
                "{}", n.message
            );
        }
        Ok(())
    }

    fn notifier_name(&self) -> &'static str {
        "Tracing"
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpNotifier;

impl Notifier for NoOpNotifier {
    fn notify(&self, _notification: &Notification) -> Result<(), NotifyError> {
        Ok(())
    }

    fn notifier_name(&self) -> &'static str {
        "NoOp"
    }
}

/// Forwards notifications to a channel
#[derive(Debug)]
pub struct ChannelNotifier {
    sender: Mutex<mpsc::Sender<Notification>>,
}

impl ChannelNotifier {
    /// Notifier plus the receiving end for the caller
    pub fn new() -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel();
        (Self { sender: Mutex::new(tx) }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let sender = self.sender.lock().map_err(|_| NotifyError::LockPoisoned)?;
        sender
            .send(notification.clone())
            .map_err(|_| NotifyError::ChannelClosed)
    }

    fn notifier_name(&self) -> &'static str {
        "Channel"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RawReading, Stage, WorkflowError};

    fn failed_result() -> WorkflowResult {
        let now = Utc::now();
        let mut result = WorkflowResult::new(
            "wf-1".to_string(),
            RawReading::new("s1", "Noise", 90.0, "dB", "Atelier B"),
            now,
        );
        result.status = WorkflowStatus::Failed;
        result.errors.push(WorkflowError {
            stage: Stage::Perception,
            error: "missing required field 'source'".to_string(),
            timestamp: now,
        });
        result
    }

    #[test]
    fn test_failed_notification_carries_error_detail() {
        let n = Notification::from_result(&failed_result(), Utc::now());
        assert_eq!(n.status, WorkflowStatus::Failed);
        assert!(n.message.contains("perception stage"));
        assert_eq!(n.sensor_type, "noise");
        assert_eq!(n.risk_level, None);
    }

    #[test]
    fn test_channel_notifier_delivers() {
        let (notifier, rx) = ChannelNotifier::new();
        let n = Notification::from_result(&failed_result(), Utc::now());
        notifier.notify(&n).unwrap();
        assert_eq!(rx.try_recv().unwrap(), n);
    }

    #[test]
    fn test_channel_notifier_reports_closed_receiver() {
        let (notifier, rx) = ChannelNotifier::new();
        drop(rx);
        let n = Notification::from_result(&failed_result(), Utc::now());
        assert!(matches!(notifier.notify(&n), Err(NotifyError::ChannelClosed)));
    }

    #[test]
    fn test_trait_objects() {
        let notifiers: Vec<Box<dyn Notifier>> = vec![Box::new(TracingNotifier), Box::new(NoOpNotifier)];
        let n = Notification::from_result(&failed_result(), Utc::now());
        for notifier in &notifiers {
            assert!(notifier.notify(&n).is_ok(), "{}", notifier.notifier_name());
        }
    }
}
