//! System-wide default constants.
//!
//! Tunables that are not per-deployment config live here, grouped by stage.

// ============================================================================
// Analysis
// ============================================================================

/// Rolling history retained per (sensor_type, location).
pub const HISTORY_WINDOW_SIZE: usize = 100;

/// History samples required before z-score anomaly detection runs.
pub const MIN_SAMPLES_FOR_ANOMALY: usize = 5;

/// Points considered for trend detection (4 history values + current).
pub const TREND_WINDOW: usize = 5;

/// Quality score below which the analysis notes reduced data quality.
pub const LOW_QUALITY_FACTOR_THRESHOLD: f64 = 0.8;

// ============================================================================
// Recommendation
// ============================================================================

/// Maximum recommendations per action plan.
pub const MAX_RECOMMENDATIONS: usize = 5;

/// ROI multiplier used when an action has no direct cost.
pub const ZERO_COST_ROI_MULTIPLIER: f64 = 10.0;

/// Cost unit for ROI calculation (cost / 1000).
pub const ROI_COST_UNIT: f64 = 1000.0;

/// Floor applied to the cost factor so cheap actions do not dominate.
pub const ROI_MIN_COST_FACTOR: f64 = 0.1;

/// Risk score that scales ROI to 1.0x.
pub const ROI_REFERENCE_SCORE: f64 = 50.0;

// ============================================================================
// Orchestrator
// ============================================================================

/// Finalized workflows kept in the in-memory history.
pub const WORKFLOW_HISTORY_CAPACITY: usize = 100;

// ============================================================================
// Storage
// ============================================================================

/// sled tree holding per-sensor rolling windows.
pub const SLED_HISTORY_TREE: &str = "sensor_history";
