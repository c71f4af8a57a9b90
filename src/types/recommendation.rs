//! Stage 4 types: hierarchy-of-controls recommendations and action plans

use super::risk::RiskLevel;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Hierarchy of Controls
// ============================================================================

/// Hazard-mitigation strategy, ordered from most to least preferred
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ControlType {
    Elimination,
    Substitution,
    Engineering,
    Administrative,
    Ppe,
    Monitoring,
}

impl ControlType {
    /// Position in the control hierarchy (0 = most preferred)
    pub fn rank(self) -> usize {
        match self {
            ControlType::Elimination => 0,
            ControlType::Substitution => 1,
            ControlType::Engineering => 2,
            ControlType::Administrative => 3,
            ControlType::Ppe => 4,
            ControlType::Monitoring => 5,
        }
    }
}

impl std::fmt::Display for ControlType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ControlType::Elimination => "elimination",
            ControlType::Substitution => "substitution",
            ControlType::Engineering => "engineering",
            ControlType::Administrative => "administrative",
            ControlType::Ppe => "ppe",
            ControlType::Monitoring => "monitoring",
        };
        write!(f, "{s}")
    }
}

// ============================================================================
// Priority
// ============================================================================

/// Action priority, derived only from the triggering risk level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Immediate,
    Urgent,
    High,
    Medium,
    Low,
}

impl Priority {
    /// critical→immediate, high→urgent, medium→high, low→medium, minimal→low
    pub fn from_risk_level(level: RiskLevel) -> Self {
        match level {
            RiskLevel::Critical => Priority::Immediate,
            RiskLevel::High => Priority::Urgent,
            RiskLevel::Medium => Priority::High,
            RiskLevel::Low => Priority::Medium,
            RiskLevel::Minimal => Priority::Low,
        }
    }

    /// Fixed time allowed before the deadline
    pub fn deadline_offset(self) -> Duration {
        match self {
            Priority::Immediate => Duration::hours(1),
            Priority::Urgent => Duration::hours(24),
            Priority::High => Duration::days(7),
            Priority::Medium => Duration::days(30),
            Priority::Low => Duration::days(90),
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Immediate => write!(f, "IMMEDIATE"),
            Priority::Urgent => write!(f, "URGENT"),
            Priority::High => write!(f, "HIGH"),
            Priority::Medium => write!(f, "MEDIUM"),
            Priority::Low => write!(f, "LOW"),
        }
    }
}

// ============================================================================
// Risk Types & Templates
// ============================================================================

/// Knowledge-base key selecting a family of recommendation templates
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RiskType {
    TemperatureHigh,
    NoiseHigh,
    ChemicalExposure,
    ErgonomicRisk,
    GeneralRisk,
}

impl std::fmt::Display for RiskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RiskType::TemperatureHigh => "temperature_high",
            RiskType::NoiseHigh => "noise_high",
            RiskType::ChemicalExposure => "chemical_exposure",
            RiskType::ErgonomicRisk => "ergonomic_risk",
            RiskType::GeneralRisk => "general_risk",
        };
        write!(f, "{s}")
    }
}

/// Knowledge-base entry for one candidate corrective action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationTemplate {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub action_type: ControlType,
    /// Expected risk reduction in [0, 100]
    pub risk_reduction: f64,
    /// Estimated cost; zero means "no direct cost"
    #[serde(default)]
    pub estimated_cost: f64,
    #[serde(default)]
    pub estimated_duration: String,
    #[serde(default)]
    pub regulatory_reference: String,
}

// ============================================================================
// Recommendations & Plans
// ============================================================================

/// A concrete, scheduled corrective action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub title: String,
    pub description: String,
    pub action_type: ControlType,
    pub priority: Priority,
    pub deadline: DateTime<Utc>,
    pub estimated_cost: f64,
    pub estimated_duration: String,
    /// Expected risk reduction in [0, 100]
    pub estimated_risk_reduction: f64,
    pub roi_score: f64,
    pub regulatory_reference: String,
}

/// Ordered set of recommendations for one analysed risk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPlan {
    pub plan_id: String,
    pub risk_type: RiskType,
    pub risk_level: RiskLevel,
    pub risk_score: f64,
    pub location: String,
    pub sensor_type: String,
    pub recommendations: Vec<Recommendation>,
    /// Diminishing-returns aggregate, capped
    pub total_risk_reduction: f64,
    pub total_estimated_cost: f64,
    pub implementation_timeline: String,
    /// Analysis findings that motivated the plan
    pub contributing_factors: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Result of the recommendation stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecommendationOutcome {
    Plan(ActionPlan),
    NoActionNeeded { risk_score: f64, minimum_score: f64 },
}

impl RecommendationOutcome {
    pub fn plan(&self) -> Option<&ActionPlan> {
        match self {
            RecommendationOutcome::Plan(plan) => Some(plan),
            RecommendationOutcome::NoActionNeeded { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_hierarchy_order() {
        assert!(ControlType::Elimination.rank() < ControlType::Substitution.rank());
        assert!(ControlType::Engineering.rank() < ControlType::Administrative.rank());
        assert!(ControlType::Ppe.rank() < ControlType::Monitoring.rank());
    }

    #[test]
    fn test_priority_mapping() {
        assert_eq!(Priority::from_risk_level(RiskLevel::Critical), Priority::Immediate);
        assert_eq!(Priority::from_risk_level(RiskLevel::High), Priority::Urgent);
        assert_eq!(Priority::from_risk_level(RiskLevel::Medium), Priority::High);
        assert_eq!(Priority::from_risk_level(RiskLevel::Low), Priority::Medium);
        assert_eq!(Priority::from_risk_level(RiskLevel::Minimal), Priority::Low);
    }

    #[test]
    fn test_deadline_offsets() {
        assert_eq!(Priority::Immediate.deadline_offset(), Duration::hours(1));
        assert_eq!(Priority::Urgent.deadline_offset(), Duration::hours(24));
        assert_eq!(Priority::High.deadline_offset(), Duration::days(7));
        assert_eq!(Priority::Medium.deadline_offset(), Duration::days(30));
        assert_eq!(Priority::Low.deadline_offset(), Duration::days(90));
    }

    #[test]
    fn test_risk_type_serde_keys() {
        let json = serde_json::to_string(&RiskType::ChemicalExposure).unwrap();
        assert_eq!(json, "\"chemical_exposure\"");
        assert_eq!(RiskType::TemperatureHigh.to_string(), "temperature_high");
    }
}
