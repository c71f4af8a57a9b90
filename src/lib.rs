//! SST Pipeline: occupational health & safety sensor intelligence
//!
//! Five-stage pipeline turning raw workplace sensor readings into
//! risk assessments and prioritized corrective action plans.
//!
//! ## Architecture
//!
//! - **Perception**: input validation, static alert levels, advisories
//! - **Normalization**: SI units and a plausibility quality score
//! - **Analysis**: regulatory limits, z-score anomalies, trend slope
//! - **Recommendation**: hierarchy-of-controls plans ranked by ROI
//! - **Orchestrator**: state-machine driven sequencing with partial results

pub mod agents;
pub mod clock;
pub mod config;
pub mod notifier;
pub mod storage;
pub mod types;

// Re-export configuration
pub use config::{ConfigError, PipelineConfig};

// Re-export commonly used types
pub use types::{
    ActionPlan, AlertLevel, NormalizationOutcome, NormalizedObservation, PerceptionRecord,
    RawReading, RecommendationOutcome, RiskAnalysis, RiskLevel, Stage, WorkflowResult,
    WorkflowStatus,
};

// Re-export agents
pub use agents::{
    AnalysisAgent, NormalizationAgent, Orchestrator, PerceptionAgent, RecommendationAgent,
    WorkflowMetrics,
};

// Re-export capabilities
pub use clock::{Clock, FixedClock, SystemClock};
pub use notifier::{ChannelNotifier, NoOpNotifier, Notification, Notifier, TracingNotifier};
pub use storage::{HistoryKey, HistoryStore, InMemoryHistoryStore, SledHistoryStore};
