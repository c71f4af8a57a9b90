//! The five pipeline stages
//!
//! ## Agents
//!
//! - **Perception** (Stage 1): validation and static-threshold tagging
//! - **Normalization** (Stage 2): SI conversion and quality grading
//! - **Analysis** (Stage 3): regulatory, anomaly and trend risk scoring
//! - **Recommendation** (Stage 4): hierarchy-of-controls action plans
//! - **Orchestrator** (Stage 5): sequencing, fault handling, metrics
//!
//! Each agent is stateless apart from its counters, except Analysis which
//! owns the per-(sensor, location) history through a `HistoryStore`.

pub mod analysis;
pub mod normalization;
pub mod orchestrator;
pub mod perception;
pub mod recommendation;

pub use analysis::{AnalysisAgent, AnalysisError, AnalysisStats};
pub use normalization::{NormalizationAgent, NormalizationError, NormalizationStats};
pub use orchestrator::{Orchestrator, StageFailure, StageStats, WorkflowMetrics};
pub use perception::{PerceptionAgent, PerceptionError, PerceptionStats};
pub use recommendation::{
    RecommendationAgent, RecommendationError, RecommendationRequest, RecommendationStats,
};
