//! Recommendation Agent - Stage 4
//!
//! Turns a scored risk into a costed, scheduled action plan:
//!
//! 1. Classify the risk into a knowledge-base key (`RiskType`)
//! 2. Instantiate that key's templates with priority, deadline and ROI
//! 3. Order by control hierarchy, then risk reduction, then ROI
//! 4. Keep the top N and aggregate with a diminishing-returns discount
//!
//! Priority and deadline depend only on the risk level and the injected clock.

use crate::clock::{Clock, SystemClock};
use crate::config::defaults::{
    ROI_COST_UNIT, ROI_MIN_COST_FACTOR, ROI_REFERENCE_SCORE, ZERO_COST_ROI_MULTIPLIER,
};
use crate::config::RecommendationConfig;
use crate::types::{
    ActionPlan, AlertType, AnomalyDirection, HazardCategory, Priority, Recommendation,
    RecommendationOutcome, RecommendationTemplate, RiskAlert, RiskAnalysis, RiskLevel, RiskType,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecommendationError {
    #[error("risk score must be finite (got {0})")]
    NonFiniteScore(f64),

    #[error("no recommendation templates for '{0}' and no general_risk fallback")]
    MissingTemplates(RiskType),
}

/// Everything the stage needs from an analysis
#[derive(Debug, Clone, PartialEq)]
pub struct RecommendationRequest {
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub hazard_category: HazardCategory,
    /// True when every threshold violation is on the low side (too cold, too dark)
    pub low_side_only: bool,
    pub alerts: Vec<RiskAlert>,
    /// Side of the window mean an anomalous value fell on
    pub anomaly_direction: Option<AnomalyDirection>,
    pub contributing_factors: Vec<String>,
    pub location: String,
    pub sensor_type: String,
}

impl RecommendationRequest {
    pub fn has_alert(&self, alert_type: AlertType) -> bool {
        self.alerts.iter().any(|a| a.alert_type == alert_type)
    }

    /// Whether the alerts point at an excess (too hot, too loud, too much gas).
    ///
    /// Without alerts the violation side decides.
    fn is_excess(&self) -> bool {
        if self.alerts.is_empty() {
            return !self.low_side_only;
        }
        let over_limit = self.has_alert(AlertType::ThresholdExceeded) && !self.low_side_only;
        let spiking = self.has_alert(AlertType::AnomalyDetected)
            && self.anomaly_direction == Some(AnomalyDirection::High);
        over_limit || spiking || self.has_alert(AlertType::TrendWarning)
    }
}

impl From<&RiskAnalysis> for RecommendationRequest {
    fn from(analysis: &RiskAnalysis) -> Self {
        Self {
            risk_score: analysis.risk_score,
            risk_level: analysis.risk_level,
            hazard_category: analysis.hazard_category,
            low_side_only: !analysis.violations.is_empty()
                && analysis.violations.iter().all(|v| v.bound.is_low_side()),
            alerts: analysis.alerts.clone(),
            anomaly_direction: analysis.anomaly.direction,
            contributing_factors: analysis.contributing_factors.clone(),
            location: analysis.location.clone(),
            sensor_type: analysis.sensor_type.clone(),
        }
    }
}

// ============================================================================
// Agent
// ============================================================================

pub struct RecommendationAgent {
    config: RecommendationConfig,
    clock: Arc<dyn Clock>,
    plans_generated: u64,
    no_action_results: u64,
    recommendations_issued: u64,
}

impl std::fmt::Debug for RecommendationAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecommendationAgent")
            .field("plans_generated", &self.plans_generated)
            .field("no_action_results", &self.no_action_results)
            .field("recommendations_issued", &self.recommendations_issued)
            .finish()
    }
}

impl RecommendationAgent {
    pub fn new(config: RecommendationConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            plans_generated: 0,
            no_action_results: 0,
            recommendations_issued: 0,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(RecommendationConfig::default(), Arc::new(SystemClock))
    }

    /// Build a plan for an analysis.
    pub fn process(&mut self, analysis: &RiskAnalysis) -> Result<RecommendationOutcome, RecommendationError> {
        self.process_request(&RecommendationRequest::from(analysis))
    }

    pub fn process_request(
        &mut self,
        request: &RecommendationRequest,
    ) -> Result<RecommendationOutcome, RecommendationError> {
        if !request.risk_score.is_finite() {
            return Err(RecommendationError::NonFiniteScore(request.risk_score));
        }

        if request.risk_score < self.config.min_risk_score {
            self.no_action_results += 1;
            debug!(
                risk_score = request.risk_score,
                minimum = self.config.min_risk_score,
                "Risk below action threshold"
            );
            return Ok(RecommendationOutcome::NoActionNeeded {
                risk_score: request.risk_score,
                minimum_score: self.config.min_risk_score,
            });
        }

        let risk_type = classify_risk(request);
        let templates = self.templates_for(risk_type)?;

        let priority = Priority::from_risk_level(request.risk_level);
        let deadline = self.clock.now() + priority.deadline_offset();

        let mut recommendations: Vec<Recommendation> = templates
            .iter()
            .map(|t| Recommendation {
                title: t.title.clone(),
                description: t.description.clone(),
                action_type: t.action_type,
                priority,
                deadline,
                estimated_cost: t.estimated_cost,
                estimated_duration: t.estimated_duration.clone(),
                estimated_risk_reduction: t.risk_reduction,
                roi_score: roi_score(t.risk_reduction, t.estimated_cost, request.risk_score),
                regulatory_reference: t.regulatory_reference.clone(),
            })
            .collect();

        recommendations.sort_by(|a, b| {
            a.action_type
                .rank()
                .cmp(&b.action_type.rank())
                .then_with(|| b.estimated_risk_reduction.total_cmp(&a.estimated_risk_reduction))
                .then_with(|| b.roi_score.total_cmp(&a.roi_score))
        });
        recommendations.truncate(self.config.max_recommendations);

        let summed: f64 = recommendations.iter().map(|r| r.estimated_risk_reduction).sum();
        let total_risk_reduction =
            (summed * self.config.diminishing_returns_factor).min(self.config.max_total_risk_reduction);
        let total_estimated_cost = recommendations.iter().map(|r| r.estimated_cost).sum();
        let implementation_timeline = self
            .config
            .timelines
            .get(&request.risk_level)
            .cloned()
            .unwrap_or_else(|| format!("Implement within {} days", priority.deadline_offset().num_days()));

        self.plans_generated += 1;
        self.recommendations_issued += recommendations.len() as u64;

        info!(
            risk_type = %risk_type,
            risk_level = %request.risk_level,
            location = %request.location,
            recommendations = recommendations.len(),
            total_risk_reduction,
            "Action plan generated"
        );

        Ok(RecommendationOutcome::Plan(ActionPlan {
            plan_id: Uuid::new_v4().to_string(),
            risk_type,
            risk_level: request.risk_level,
            risk_score: request.risk_score,
            location: request.location.clone(),
            sensor_type: request.sensor_type.clone(),
            recommendations,
            total_risk_reduction,
            total_estimated_cost,
            implementation_timeline,
            contributing_factors: request.contributing_factors.clone(),
            created_at: self.clock.now(),
        }))
    }

    /// Templates for a risk type, falling back to `general_risk`
    fn templates_for(&self, risk_type: RiskType) -> Result<&[RecommendationTemplate], RecommendationError> {
        let non_empty = |rt: RiskType| {
            self.config
                .templates
                .get(&rt)
                .filter(|t| !t.is_empty())
                .map(Vec::as_slice)
        };
        if let Some(templates) = non_empty(risk_type) {
            return Ok(templates);
        }
        debug!(risk_type = %risk_type, "No templates for risk type, using general_risk");
        non_empty(RiskType::GeneralRisk).ok_or(RecommendationError::MissingTemplates(risk_type))
    }

    pub fn stats(&self) -> RecommendationStats {
        RecommendationStats {
            plans_generated: self.plans_generated,
            no_action_results: self.no_action_results,
            recommendations_issued: self.recommendations_issued,
        }
    }

    pub fn reset_stats(&mut self) {
        self.plans_generated = 0;
        self.no_action_results = 0;
        self.recommendations_issued = 0;
    }
}

/// Knowledge-base key for a request.
///
/// Thermal, noise and chemical tables hold measures against an excess, so
/// they are only chosen when the alerts show one. Low readings (cold, a
/// sudden drop) get the general table. Ergonomic measures cover both sides.
pub fn classify_risk(request: &RecommendationRequest) -> RiskType {
    let excess = request.is_excess();
    let risk_type = match request.hazard_category {
        HazardCategory::Thermal if excess => RiskType::TemperatureHigh,
        HazardCategory::Noise if excess => RiskType::NoiseHigh,
        HazardCategory::Chemical if excess => RiskType::ChemicalExposure,
        HazardCategory::Ergonomic => RiskType::ErgonomicRisk,
        _ => RiskType::GeneralRisk,
    };
    debug!(
        sensor_type = %request.sensor_type,
        hazard_category = %request.hazard_category,
        alerts = request.alerts.len(),
        excess,
        risk_type = %risk_type,
        "Risk classified"
    );
    risk_type
}

/// Ranking heuristic, not a financial figure.
///
/// Zero-cost actions score `risk_reduction × 10`; otherwise risk reduction is
/// scaled by how far the score sits from 50 and divided by cost in thousands.
pub fn roi_score(risk_reduction: f64, estimated_cost: f64, risk_score: f64) -> f64 {
    if estimated_cost <= 0.0 {
        risk_reduction * ZERO_COST_ROI_MULTIPLIER
    } else {
        (risk_reduction * (risk_score / ROI_REFERENCE_SCORE))
            / (estimated_cost / ROI_COST_UNIT).max(ROI_MIN_COST_FACTOR)
    }
}

// ============================================================================
// Statistics
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecommendationStats {
    pub plans_generated: u64,
    pub no_action_results: u64,
    pub recommendations_issued: u64,
}

impl std::fmt::Display for RecommendationStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Plans: {}, No action: {}, Recommendations: {}",
            self.plans_generated, self.no_action_results, self.recommendations_issued
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::types::{AlertSeverity, ControlType};
    use chrono::{Duration, TimeZone, Utc};

    fn request(score: f64, category: HazardCategory) -> RecommendationRequest {
        RecommendationRequest {
            risk_score: score,
            risk_level: RiskLevel::from_score(score),
            hazard_category: category,
            low_side_only: false,
            alerts: Vec::new(),
            anomaly_direction: None,
            contributing_factors: vec!["max limit crossed".to_string()],
            location: "Atelier B".to_string(),
            sensor_type: "noise".to_string(),
        }
    }

    fn fixed_agent() -> (RecommendationAgent, chrono::DateTime<Utc>) {
        let now = Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap();
        let agent = RecommendationAgent::new(RecommendationConfig::default(), Arc::new(FixedClock::new(now)));
        (agent, now)
    }

    fn plan(outcome: RecommendationOutcome) -> ActionPlan {
        match outcome {
            RecommendationOutcome::Plan(plan) => plan,
            other => panic!("expected plan, got {other:?}"),
        }
    }

    #[test]
    fn test_below_minimum_needs_no_action() {
        let mut agent = RecommendationAgent::with_defaults();
        let outcome = agent.process_request(&request(15.0, HazardCategory::Noise)).unwrap();
        assert!(matches!(outcome, RecommendationOutcome::NoActionNeeded { .. }));
        assert_eq!(agent.stats().no_action_results, 1);
        assert_eq!(agent.stats().plans_generated, 0);
    }

    #[test]
    fn test_noise_plan_follows_control_hierarchy() {
        let (mut agent, _) = fixed_agent();
        let plan = plan(agent.process_request(&request(51.25, HazardCategory::Noise)).unwrap());
        assert_eq!(plan.risk_type, RiskType::NoiseHigh);
        assert!(plan.recommendations.len() <= 5);
        let ranks: Vec<usize> = plan.recommendations.iter().map(|r| r.action_type.rank()).collect();
        assert!(ranks.windows(2).all(|w| w[0] <= w[1]), "{ranks:?}");
        assert_eq!(plan.recommendations[0].action_type, ControlType::Substitution);
        // both engineering controls, higher risk reduction first
        assert!(plan.recommendations[1].estimated_risk_reduction >= plan.recommendations[2].estimated_risk_reduction);
    }

    #[test]
    fn test_plan_totals() {
        let (mut agent, _) = fixed_agent();
        let plan = plan(agent.process_request(&request(90.0, HazardCategory::Thermal)).unwrap());
        let summed: f64 = plan.recommendations.iter().map(|r| r.estimated_risk_reduction).sum();
        assert!((plan.total_risk_reduction - (summed * 0.7).min(95.0)).abs() < 1e-9);
        assert!(plan.total_risk_reduction <= 95.0);
        let cost: f64 = plan.recommendations.iter().map(|r| r.estimated_cost).sum();
        assert!((plan.total_estimated_cost - cost).abs() < 1e-9);
        assert!(plan.implementation_timeline.starts_with("Immediate"));
        assert_eq!(plan.contributing_factors, vec!["max limit crossed".to_string()]);
    }

    #[test]
    fn test_priority_and_deadline_from_level() {
        let (mut agent, now) = fixed_agent();
        let critical = plan(agent.process_request(&request(85.0, HazardCategory::Noise)).unwrap());
        assert!(critical.recommendations.iter().all(|r| r.priority == Priority::Immediate));
        assert!(critical.recommendations.iter().all(|r| r.deadline == now + Duration::hours(1)));

        let low = plan(agent.process_request(&request(25.0, HazardCategory::Noise)).unwrap());
        assert!(low.recommendations.iter().all(|r| r.priority == Priority::Medium));
        assert!(low.recommendations.iter().all(|r| r.deadline == now + Duration::days(30)));
    }

    #[test]
    fn test_classification() {
        let mut cold = request(60.0, HazardCategory::Thermal);
        assert_eq!(classify_risk(&cold), RiskType::TemperatureHigh);
        cold.low_side_only = true;
        assert_eq!(classify_risk(&cold), RiskType::GeneralRisk);
        assert_eq!(classify_risk(&request(60.0, HazardCategory::Chemical)), RiskType::ChemicalExposure);
        assert_eq!(classify_risk(&request(60.0, HazardCategory::Ergonomic)), RiskType::ErgonomicRisk);
        assert_eq!(classify_risk(&request(60.0, HazardCategory::Physical)), RiskType::GeneralRisk);
    }

    fn alert(alert_type: AlertType) -> RiskAlert {
        RiskAlert {
            alert_type,
            severity: AlertSeverity::High,
            message: String::new(),
            regulation: None,
            value: 0.0,
            threshold: None,
        }
    }

    #[test]
    fn test_classification_follows_alerts() {
        // sudden drop in temperature with no violation: not a heat problem
        let mut drop = request(30.0, HazardCategory::Thermal);
        drop.alerts = vec![alert(AlertType::AnomalyDetected)];
        drop.anomaly_direction = Some(AnomalyDirection::Low);
        assert_eq!(classify_risk(&drop), RiskType::GeneralRisk);

        drop.anomaly_direction = Some(AnomalyDirection::High);
        assert_eq!(classify_risk(&drop), RiskType::TemperatureHigh);

        let mut rising = request(30.0, HazardCategory::Chemical);
        rising.alerts = vec![alert(AlertType::TrendWarning)];
        assert_eq!(classify_risk(&rising), RiskType::ChemicalExposure);

        let mut dark = request(50.0, HazardCategory::Ergonomic);
        dark.low_side_only = true;
        dark.alerts = vec![alert(AlertType::ThresholdExceeded)];
        assert_eq!(classify_risk(&dark), RiskType::ErgonomicRisk);

        let mut quiet = request(40.0, HazardCategory::Noise);
        quiet.alerts = vec![alert(AlertType::ThresholdExceeded)];
        quiet.low_side_only = true;
        assert_eq!(classify_risk(&quiet), RiskType::GeneralRisk);
    }

    #[test]
    fn test_request_carries_analysis_alerts() {
        let mut analysis = crate::agents::AnalysisAgent::with_defaults();
        let result = analysis.process(42.0, "°C", "temperature", 1.0, "Fonderie").unwrap();
        let request = RecommendationRequest::from(&result);
        assert!(request.has_alert(AlertType::ThresholdExceeded));
        assert_eq!(request.alerts, result.alerts);
        assert_eq!(classify_risk(&request), RiskType::TemperatureHigh);
    }

    #[test]
    fn test_empty_table_falls_back_to_general() {
        let mut config = RecommendationConfig::default();
        config.templates.insert(RiskType::NoiseHigh, Vec::new());
        let mut agent = RecommendationAgent::new(config, Arc::new(SystemClock));
        let plan = plan(agent.process_request(&request(70.0, HazardCategory::Noise)).unwrap());
        assert_eq!(plan.risk_type, RiskType::NoiseHigh);
        assert!(plan.recommendations.iter().all(|r| r.regulatory_reference == "RSST general obligations"));
    }

    #[test]
    fn test_missing_general_table_is_an_error() {
        let mut config = RecommendationConfig::default();
        config.templates.clear();
        let mut agent = RecommendationAgent::new(config, Arc::new(SystemClock));
        assert_eq!(
            agent.process_request(&request(70.0, HazardCategory::Noise)),
            Err(RecommendationError::MissingTemplates(RiskType::NoiseHigh))
        );
    }

    #[test]
    fn test_cap_is_configurable() {
        let config = RecommendationConfig {
            max_recommendations: 2,
            ..RecommendationConfig::default()
        };
        let mut agent = RecommendationAgent::new(config, Arc::new(SystemClock));
        let plan = plan(agent.process_request(&request(70.0, HazardCategory::Chemical)).unwrap());
        assert_eq!(plan.recommendations.len(), 2);
        assert_eq!(plan.recommendations[0].action_type, ControlType::Elimination);
    }

    #[test]
    fn test_roi_formula() {
        assert_eq!(roi_score(30.0, 0.0, 60.0), 300.0);
        // 60 × (50 / 50) / (20000 / 1000)
        assert!((roi_score(60.0, 20_000.0, 50.0) - 3.0).abs() < 1e-9);
        // cost factor floored at 0.1
        assert!((roi_score(10.0, 50.0, 50.0) - 100.0).abs() < 1e-9);
    }
}
