//! Shared data structures for the SST sensor pipeline
//!
//! Data flows strictly forward through the five stages:
//! - Stage 1: RawReading → PerceptionRecord (perception agent)
//! - Stage 2: NormalizedObservation / Rejection (normalization agent)
//! - Stage 3: RiskAnalysis (analysis agent)
//! - Stage 4: ActionPlan / NoActionNeeded (recommendation agent)
//! - Stage 5: WorkflowResult (orchestrator)

mod reading;
mod observation;
mod risk;
mod recommendation;
mod workflow;

pub use reading::*;
pub use observation::*;
pub use risk::*;
pub use recommendation::*;
pub use workflow::*;
