//! Stage 3 types: threshold violations, anomaly/trend results and risk analysis

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Risk Level
// ============================================================================

/// Discrete risk bucket derived from the 0-100 risk score
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    Minimal = 0,
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl RiskLevel {
    /// Fixed-boundary bucketing: ≥80 critical, ≥60 high, ≥40 medium, ≥20 low.
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            RiskLevel::Critical
        } else if score >= 60.0 {
            RiskLevel::High
        } else if score >= 40.0 {
            RiskLevel::Medium
        } else if score >= 20.0 {
            RiskLevel::Low
        } else {
            RiskLevel::Minimal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Minimal => "minimal",
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str().to_uppercase())
    }
}

// ============================================================================
// Hazard Category
// ============================================================================

/// Occupational hazard family a sensor type belongs to
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum HazardCategory {
    Thermal,
    Noise,
    Chemical,
    Ergonomic,
    Physical,
    #[default]
    General,
}

impl std::fmt::Display for HazardCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HazardCategory::Thermal => "thermal",
            HazardCategory::Noise => "noise",
            HazardCategory::Chemical => "chemical",
            HazardCategory::Ergonomic => "ergonomic",
            HazardCategory::Physical => "physical",
            HazardCategory::General => "general",
        };
        write!(f, "{s}")
    }
}

// ============================================================================
// Threshold Violations
// ============================================================================

/// Which regulatory bound a value crossed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ViolationBound {
    Min,
    Max,
    CriticalLow,
    Critical,
}

impl ViolationBound {
    pub fn is_critical(self) -> bool {
        matches!(self, ViolationBound::Critical | ViolationBound::CriticalLow)
    }

    /// True for bounds crossed from below (value too low)
    pub fn is_low_side(self) -> bool {
        matches!(self, ViolationBound::Min | ViolationBound::CriticalLow)
    }
}

impl std::fmt::Display for ViolationBound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ViolationBound::Min => "min",
            ViolationBound::Max => "max",
            ViolationBound::CriticalLow => "critical_low",
            ViolationBound::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

/// One regulatory bound crossed by a value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdViolation {
    pub bound: ViolationBound,
    pub limit: f64,
    pub value: f64,
    /// Exceedance severity in [0, 1]
    pub severity: f64,
    pub regulation: String,
}

// ============================================================================
// Anomaly & Trend
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyDirection {
    High,
    Low,
}

/// Z-score check of a value against its rolling window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnomalyResult {
    pub is_anomaly: bool,
    pub z_score: f64,
    pub direction: Option<AnomalyDirection>,
    pub window_mean: f64,
    pub window_std_dev: f64,
    /// Number of history samples the check was evaluated on
    pub samples: usize,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    #[default]
    Stable,
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrendDirection::Increasing => write!(f, "increasing"),
            TrendDirection::Decreasing => write!(f, "decreasing"),
            TrendDirection::Stable => write!(f, "stable"),
        }
    }
}

/// Short-term trend over the most recent samples
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendResult {
    pub direction: TrendDirection,
    /// Mean step-to-step change
    pub slope: f64,
    /// min(1, |slope| / 2)
    pub strength: f64,
    pub samples: usize,
}

// ============================================================================
// Alerts
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    ThresholdExceeded,
    AnomalyDetected,
    TrendWarning,
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertType::ThresholdExceeded => write!(f, "threshold_exceeded"),
            AlertType::AnomalyDetected => write!(f, "anomaly_detected"),
            AlertType::TrendWarning => write!(f, "trend_warning"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Medium,
    High,
    Critical,
}

/// Alert raised by the analysis stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAlert {
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub message: String,
    /// Regulation reference for threshold alerts
    pub regulation: Option<String>,
    pub value: f64,
    pub threshold: Option<f64>,
}

// ============================================================================
// Risk Analysis
// ============================================================================

/// Output of the analysis stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAnalysis {
    pub sensor_type: String,
    pub location: String,
    pub value: f64,
    pub unit: String,
    /// Bounded risk score in [0, 100]
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub hazard_category: HazardCategory,
    pub violations: Vec<ThresholdViolation>,
    /// Max violation severity in [0, 1]
    pub threshold_severity: f64,
    pub anomaly: AnomalyResult,
    pub trend: TrendResult,
    pub alerts: Vec<RiskAlert>,
    pub contributing_factors: Vec<String>,
    /// Confidence in [0, 1]
    pub confidence: f64,
    pub recommendations_needed: bool,
    pub analyzed_at: DateTime<Utc>,
}

impl RiskAnalysis {
    pub fn has_alert(&self, alert_type: AlertType) -> bool {
        self.alerts.iter().any(|a| a.alert_type == alert_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_level_boundaries() {
        assert_eq!(RiskLevel::from_score(0.0), RiskLevel::Minimal);
        assert_eq!(RiskLevel::from_score(19.99), RiskLevel::Minimal);
        assert_eq!(RiskLevel::from_score(20.0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(40.0), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(59.9), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(60.0), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(80.0), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(100.0), RiskLevel::Critical);
    }

    #[test]
    fn test_risk_level_serde_snake_case() {
        let json = serde_json::to_string(&RiskLevel::Critical).unwrap();
        assert_eq!(json, "\"critical\"");
        let back: RiskLevel = serde_json::from_str("\"medium\"").unwrap();
        assert_eq!(back, RiskLevel::Medium);
    }
}
