//! Analysis Agent - Stage 3
//!
//! Scores a normalized value from three independent signals and combines them
//! into a bounded 0-100 risk score:
//!
//! 1. Regulatory threshold check (severity in [0, 1])
//! 2. Z-score anomaly against the rolling (sensor_type, location) window
//! 3. Short-term trend over the last few samples
//!
//! ```text
//! threshold = exceeded ? 40 + severity × 60 : 0
//! anomaly   = is_anomaly ? min(30, |z| × 10) : 0
//! trend     = increasing ? strength × 20 : 0
//! score     = clamp((threshold + anomaly + trend) × quality, 0, 100)
//! ```
//!
//! The value is appended to the window only after scoring, so a reading is
//! never compared against itself.

use crate::clock::{Clock, SystemClock};
use crate::config::defaults::LOW_QUALITY_FACTOR_THRESHOLD;
use crate::config::{normalize_key, AnalysisConfig, RegulatoryLimit};
use crate::storage::{HistoryError, HistoryKey, HistoryStore, InMemoryHistoryStore};
use crate::types::{
    AlertSeverity, AlertType, AnomalyDirection, AnomalyResult, RiskAlert, RiskAnalysis, RiskLevel,
    ThresholdViolation, TrendDirection, TrendResult, ViolationBound,
};
use statrs::statistics::Statistics;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Points available to the threshold component
const THRESHOLD_BASE: f64 = 40.0;
const THRESHOLD_SEVERITY_SPAN: f64 = 60.0;
/// Cap and per-sigma weight of the anomaly component
const ANOMALY_CAP: f64 = 30.0;
const ANOMALY_WEIGHT: f64 = 10.0;
/// Points available to the trend component
const TREND_WEIGHT: f64 = 20.0;
/// |z| above which an anomaly alert is high severity
const HIGH_SEVERITY_Z: f64 = 3.0;
/// Trend strength above which an increasing trend raises an alert
const TREND_ALERT_STRENGTH: f64 = 0.5;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("value must be finite (got {0})")]
    NonFiniteValue(f64),

    #[error("quality score must be finite (got {0})")]
    NonFiniteQuality(f64),

    #[error("history store failure: {0}")]
    History(#[from] HistoryError),
}

// ============================================================================
// Agent
// ============================================================================

pub struct AnalysisAgent {
    config: AnalysisConfig,
    history: Arc<dyn HistoryStore>,
    clock: Arc<dyn Clock>,
    analyses_performed: u64,
    anomalies_detected: u64,
    alerts_generated: u64,
}

impl std::fmt::Debug for AnalysisAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisAgent")
            .field("history", &self.history.store_name())
            .field("analyses_performed", &self.analyses_performed)
            .field("anomalies_detected", &self.anomalies_detected)
            .field("alerts_generated", &self.alerts_generated)
            .finish()
    }
}

impl AnalysisAgent {
    pub fn new(config: AnalysisConfig, history: Arc<dyn HistoryStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            history,
            clock,
            analyses_performed: 0,
            anomalies_detected: 0,
            alerts_generated: 0,
        }
    }

    /// Default config, private in-memory history, wall clock
    pub fn with_defaults() -> Self {
        Self::new(
            AnalysisConfig::default(),
            Arc::new(InMemoryHistoryStore::new()),
            Arc::new(SystemClock),
        )
    }

    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.history
    }

    /// Score one normalized value and append it to its history window.
    pub fn process(
        &mut self,
        value: f64,
        unit: &str,
        sensor_type: &str,
        quality_score: f64,
        location: &str,
    ) -> Result<RiskAnalysis, AnalysisError> {
        if !value.is_finite() {
            return Err(AnalysisError::NonFiniteValue(value));
        }
        if !quality_score.is_finite() {
            return Err(AnalysisError::NonFiniteQuality(quality_score));
        }
        let quality = quality_score.clamp(0.0, 1.0);
        let sensor_type = normalize_key(sensor_type);
        let key = HistoryKey::new(sensor_type.clone(), location.trim());

        let mut window = self.history.window(&key)?;
        if window.len() > self.config.window_size {
            window.drain(..window.len() - self.config.window_size);
        }

        // 1. Thresholds
        let violations = match self.config.regulatory.get(&sensor_type) {
            Some(limit) if units_match(&limit.unit, unit) => check_thresholds(value, limit),
            Some(limit) => {
                debug!(
                    sensor_type = %sensor_type,
                    unit = %unit,
                    limit_unit = %limit.unit,
                    "Value unit differs from regulatory unit, threshold check skipped"
                );
                Vec::new()
            }
            None => {
                debug!(sensor_type = %sensor_type, "No regulatory limits configured");
                Vec::new()
            }
        };
        let threshold_severity = violations.iter().map(|v| v.severity).fold(0.0, f64::max);

        // 2. Anomaly, 3. Trend
        let anomaly = detect_anomaly(
            value,
            &window,
            self.config.min_samples,
            self.config.anomaly_sensitivity,
            self.config.min_std_floor,
        );
        let trend = detect_trend(
            value,
            &window,
            self.config.trend_window,
            self.config.trend_slope_threshold,
            self.config.trend_strength_divisor,
        );

        // 4. Score, 5. Level
        let risk_score = combine_score(!violations.is_empty(), threshold_severity, &anomaly, &trend, quality);
        let risk_level = RiskLevel::from_score(risk_score);

        // 6. Alerts & narrative
        let alerts = build_alerts(&sensor_type, value, unit, &violations, &anomaly, &trend);
        let contributing_factors = contributing_factors(unit, &violations, &anomaly, &trend, quality);
        let history_factor = 0.6 + 0.4 * (window.len() as f64 / self.config.min_samples.max(1) as f64).min(1.0);
        let confidence = (quality * history_factor).clamp(0.0, 1.0);
        let recommendations_needed = risk_score >= self.config.alert_threshold;

        self.history.append(&key, value, self.config.window_size)?;

        self.analyses_performed += 1;
        if anomaly.is_anomaly {
            self.anomalies_detected += 1;
        }
        self.alerts_generated += alerts.len() as u64;

        if risk_level >= RiskLevel::High {
            info!(
                sensor_type = %sensor_type,
                location = %key.location,
                value,
                risk_score,
                risk_level = %risk_level,
                alerts = alerts.len(),
                "Elevated risk"
            );
        } else {
            debug!(
                sensor_type = %sensor_type,
                location = %key.location,
                value,
                risk_score,
                risk_level = %risk_level,
                "Analysis complete"
            );
        }

        Ok(RiskAnalysis {
            hazard_category: self
                .config
                .hazard_categories
                .get(&sensor_type)
                .copied()
                .unwrap_or_default(),
            sensor_type,
            location: key.location,
            value,
            unit: unit.to_string(),
            risk_score,
            risk_level,
            violations,
            threshold_severity,
            anomaly,
            trend,
            alerts,
            contributing_factors,
            confidence,
            recommendations_needed,
            analyzed_at: self.clock.now(),
        })
    }

    pub fn stats(&self) -> AnalysisStats {
        AnalysisStats {
            analyses_performed: self.analyses_performed,
            anomalies_detected: self.anomalies_detected,
            alerts_generated: self.alerts_generated,
        }
    }

    pub fn reset_stats(&mut self) {
        self.analyses_performed = 0;
        self.anomalies_detected = 0;
        self.alerts_generated = 0;
    }
}

fn units_match(limit_unit: &str, unit: &str) -> bool {
    let (limit_unit, unit) = (limit_unit.trim(), unit.trim());
    limit_unit.is_empty() || unit.is_empty() || limit_unit.to_lowercase() == unit.to_lowercase()
}

// ============================================================================
// Sub-algorithms
// ============================================================================

/// Regulatory bound check.
///
/// A crossed critical bound yields a single violation at severity 1.0.
/// Otherwise severity is the exceedance relative to the bound's magnitude
/// (floored at 1.0), capped at 1.0.
pub fn check_thresholds(value: f64, limit: &RegulatoryLimit) -> Vec<ThresholdViolation> {
    let violation = |bound, limit_value: f64, severity: f64| ThresholdViolation {
        bound,
        limit: limit_value,
        value,
        severity,
        regulation: limit.regulation.clone(),
    };

    if let Some(critical) = limit.critical {
        if value >= critical {
            return vec![violation(ViolationBound::Critical, critical, 1.0)];
        }
    }
    if let Some(critical_low) = limit.critical_low {
        if value <= critical_low {
            return vec![violation(ViolationBound::CriticalLow, critical_low, 1.0)];
        }
    }

    let mut violations = Vec::new();
    if let Some(max) = limit.max {
        if value > max {
            let severity = ((value - max) / max.abs().max(1.0)).min(1.0);
            violations.push(violation(ViolationBound::Max, max, severity));
        }
    }
    if let Some(min) = limit.min {
        if value < min {
            let severity = ((min - value) / min.abs().max(1.0)).min(1.0);
            violations.push(violation(ViolationBound::Min, min, severity));
        }
    }
    violations
}

/// Z-score of `value` against a window, using population statistics.
///
/// Windows shorter than `min_samples` are never anomalous.
pub fn detect_anomaly(
    value: f64,
    window: &[f64],
    min_samples: usize,
    sensitivity: f64,
    min_std_floor: f64,
) -> AnomalyResult {
    if window.len() < min_samples.max(1) {
        return AnomalyResult {
            samples: window.len(),
            ..AnomalyResult::default()
        };
    }

    let mean = window.iter().mean();
    let std_dev = window.iter().population_std_dev().max(min_std_floor);
    let z_score = (value - mean) / std_dev;
    let is_anomaly = z_score.abs() > sensitivity;
    let direction = is_anomaly.then(|| {
        if z_score > 0.0 {
            AnomalyDirection::High
        } else {
            AnomalyDirection::Low
        }
    });

    AnomalyResult {
        is_anomaly,
        z_score,
        direction,
        window_mean: mean,
        window_std_dev: std_dev,
        samples: window.len(),
    }
}

/// Mean step-to-step slope over the last `trend_window - 1` history values
/// plus the current value.
pub fn detect_trend(
    value: f64,
    window: &[f64],
    trend_window: usize,
    slope_threshold: f64,
    strength_divisor: f64,
) -> TrendResult {
    let tail = trend_window.saturating_sub(1).min(window.len());
    let mut points: Vec<f64> = window[window.len() - tail..].to_vec();
    points.push(value);

    if points.len() < 2 {
        return TrendResult {
            samples: points.len(),
            ..TrendResult::default()
        };
    }

    let slope = points.windows(2).map(|w| w[1] - w[0]).sum::<f64>() / (points.len() - 1) as f64;
    let direction = if slope > slope_threshold {
        TrendDirection::Increasing
    } else if slope < -slope_threshold {
        TrendDirection::Decreasing
    } else {
        TrendDirection::Stable
    };

    TrendResult {
        direction,
        slope,
        strength: (slope.abs() / strength_divisor).min(1.0),
        samples: points.len(),
    }
}

/// Quality-weighted combination of the three components, clamped to [0, 100].
pub fn combine_score(
    exceeded: bool,
    threshold_severity: f64,
    anomaly: &AnomalyResult,
    trend: &TrendResult,
    quality_score: f64,
) -> f64 {
    let threshold_component = if exceeded {
        THRESHOLD_BASE + threshold_severity * THRESHOLD_SEVERITY_SPAN
    } else {
        0.0
    };
    let anomaly_component = if anomaly.is_anomaly {
        (anomaly.z_score.abs() * ANOMALY_WEIGHT).min(ANOMALY_CAP)
    } else {
        0.0
    };
    let trend_component = if trend.direction == TrendDirection::Increasing {
        trend.strength * TREND_WEIGHT
    } else {
        0.0
    };

    let raw = threshold_component + anomaly_component + trend_component;
    let score = raw * quality_score;
    if score.is_finite() {
        score.clamp(0.0, 100.0)
    } else {
        warn!(raw, quality_score, "Non-finite risk score, clamping to 0");
        0.0
    }
}

fn build_alerts(
    sensor_type: &str,
    value: f64,
    unit: &str,
    violations: &[ThresholdViolation],
    anomaly: &AnomalyResult,
    trend: &TrendResult,
) -> Vec<RiskAlert> {
    let mut alerts: Vec<RiskAlert> = violations
        .iter()
        .map(|v| {
            let severity = if v.bound.is_critical() {
                AlertSeverity::Critical
            } else {
                AlertSeverity::High
            };
            let verb = match v.bound {
                ViolationBound::Critical => "reaches critical limit",
                ViolationBound::CriticalLow => "falls to critical low limit",
                ViolationBound::Max => "exceeds maximum",
                ViolationBound::Min => "is below minimum",
            };
            RiskAlert {
                alert_type: AlertType::ThresholdExceeded,
                severity,
                message: format!("{sensor_type} {value} {unit} {verb} {} {unit}", v.limit),
                regulation: Some(v.regulation.clone()),
                value,
                threshold: Some(v.limit),
            }
        })
        .collect();

    if anomaly.is_anomaly {
        alerts.push(RiskAlert {
            alert_type: AlertType::AnomalyDetected,
            severity: if anomaly.z_score.abs() > HIGH_SEVERITY_Z {
                AlertSeverity::High
            } else {
                AlertSeverity::Medium
            },
            message: format!(
                "{sensor_type} {value} {unit} deviates from its recent mean {:.2} (z = {:.2})",
                anomaly.window_mean, anomaly.z_score
            ),
            regulation: None,
            value,
            threshold: None,
        });
    }

    if trend.direction == TrendDirection::Increasing && trend.strength > TREND_ALERT_STRENGTH {
        alerts.push(RiskAlert {
            alert_type: AlertType::TrendWarning,
            severity: AlertSeverity::Medium,
            message: format!(
                "{sensor_type} rising by {:.2} {unit} per sample over the last {} samples",
                trend.slope, trend.samples
            ),
            regulation: None,
            value,
            threshold: None,
        });
    }

    alerts
}

fn contributing_factors(
    unit: &str,
    violations: &[ThresholdViolation],
    anomaly: &AnomalyResult,
    trend: &TrendResult,
    quality_score: f64,
) -> Vec<String> {
    let mut factors: Vec<String> = violations
        .iter()
        .map(|v| {
            format!(
                "{} limit {} {unit} crossed ({}; severity {:.2})",
                v.bound, v.limit, v.regulation, v.severity
            )
        })
        .collect();

    if anomaly.is_anomaly {
        let direction = match anomaly.direction {
            Some(AnomalyDirection::Low) => "low",
            _ => "high",
        };
        factors.push(format!(
            "Statistical anomaly ({direction}, z = {:.2} over {} samples)",
            anomaly.z_score, anomaly.samples
        ));
    }
    if trend.direction == TrendDirection::Increasing {
        factors.push(format!(
            "Increasing trend ({:.2} {unit}/sample, strength {:.2})",
            trend.slope, trend.strength
        ));
    }
    if quality_score < LOW_QUALITY_FACTOR_THRESHOLD {
        factors.push(format!("Reduced data quality (score {quality_score:.2})"));
    }
    factors
}

// ============================================================================
// Statistics
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnalysisStats {
    pub analyses_performed: u64,
    pub anomalies_detected: u64,
    pub alerts_generated: u64,
}

impl std::fmt::Display for AnalysisStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Analyses: {}, Anomalies: {}, Alerts: {}",
            self.analyses_performed, self.anomalies_detected, self.alerts_generated
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HazardCategory;

    fn agent() -> AnalysisAgent {
        AnalysisAgent::with_defaults()
    }

    #[test]
    fn test_critical_temperature() {
        let mut agent = agent();
        let analysis = agent.process(42.0, "°C", "temperature", 0.9, "Fonderie").unwrap();
        assert_eq!(analysis.threshold_severity, 1.0);
        assert!((analysis.risk_score - 90.0).abs() < 1e-9);
        assert_eq!(analysis.risk_level, RiskLevel::Critical);
        assert!(analysis.has_alert(AlertType::ThresholdExceeded));
        assert_eq!(analysis.hazard_category, HazardCategory::Thermal);
        assert!(analysis.recommendations_needed);
        assert_eq!(analysis.alerts[0].severity, AlertSeverity::Critical);
    }

    #[test]
    fn test_noise_over_action_level() {
        let mut agent = agent();
        let analysis = agent.process(95.0, "dB", "noise", 1.0, "Atelier B").unwrap();
        // 40 + (15 / 80) × 60
        assert!((analysis.risk_score - 51.25).abs() < 1e-9);
        assert_eq!(analysis.risk_level, RiskLevel::Medium);
        assert!(analysis.recommendations_needed);
        assert_eq!(analysis.alerts[0].regulation.as_deref(), Some("RSST noise exposure"));
        assert_eq!(analysis.alerts[0].severity, AlertSeverity::High);
    }

    #[test]
    fn test_vibration_velocity_skips_acceleration_limit() {
        let mut agent = agent();
        let analysis = agent.process(2.0, "m/s", "vibration", 1.0, "Quai 3").unwrap();
        assert!(analysis.violations.is_empty());
        assert!(!analysis.has_alert(AlertType::ThresholdExceeded));

        let analysis = agent.process(2.0, "m/s²", "vibration", 1.0, "Quai 3").unwrap();
        assert_eq!(analysis.violations.len(), 1);
        assert_eq!(analysis.alerts[0].severity, AlertSeverity::Critical);
    }

    #[test]
    fn test_within_limits_scores_zero() {
        let mut agent = agent();
        let analysis = agent.process(22.0, "°C", "temperature", 1.0, "Bureau").unwrap();
        assert_eq!(analysis.risk_score, 0.0);
        assert_eq!(analysis.risk_level, RiskLevel::Minimal);
        assert!(analysis.alerts.is_empty());
        assert!(!analysis.recommendations_needed);
    }

    #[test]
    fn test_low_side_violations() {
        let limit = &crate::config::tables::default_regulatory_limits()["temperature"];
        let cold = check_thresholds(15.0, limit);
        assert_eq!(cold.len(), 1);
        assert_eq!(cold[0].bound, ViolationBound::Min);
        assert!((cold[0].severity - 3.0 / 18.0).abs() < 1e-9);

        let freezing = check_thresholds(4.0, limit);
        assert_eq!(freezing[0].bound, ViolationBound::CriticalLow);
        assert_eq!(freezing[0].severity, 1.0);
    }

    #[test]
    fn test_score_monotonic_in_severity() {
        let anomaly = AnomalyResult::default();
        let trend = TrendResult::default();
        let mut prev = combine_score(false, 0.0, &anomaly, &trend, 0.8);
        for i in 0..=20 {
            let severity = f64::from(i) / 20.0;
            let score = combine_score(true, severity, &anomaly, &trend, 0.8);
            assert!(score >= prev);
            prev = score;
        }
    }

    #[test]
    fn test_anomaly_requires_min_samples() {
        let result = detect_anomaly(100.0, &[20.0, 21.0, 20.5, 20.8], 5, 2.0, 0.001);
        assert!(!result.is_anomaly);
        assert_eq!(result.samples, 4);
    }

    #[test]
    fn test_anomaly_detects_jump_from_flat_window() {
        let window = [20.0; 10];
        let result = detect_anomaly(21.0, &window, 5, 2.0, 0.001);
        assert!(result.is_anomaly);
        assert_eq!(result.direction, Some(AnomalyDirection::High));

        let same = detect_anomaly(20.0, &window, 5, 2.0, 0.001);
        assert!(!same.is_anomaly);
        assert_eq!(same.z_score, 0.0);
    }

    #[test]
    fn test_anomaly_low_direction() {
        let window = [50.0, 52.0, 48.0, 51.0, 49.0, 50.0];
        let result = detect_anomaly(30.0, &window, 5, 2.0, 0.001);
        assert!(result.is_anomaly);
        assert_eq!(result.direction, Some(AnomalyDirection::Low));
        assert!(result.z_score < -3.0);
    }

    #[test]
    fn test_trend_classification() {
        let rising = detect_trend(24.0, &[20.0, 21.0, 22.0, 23.0], 5, 0.5, 2.0);
        assert_eq!(rising.direction, TrendDirection::Increasing);
        assert!((rising.slope - 1.0).abs() < 1e-9);
        assert!((rising.strength - 0.5).abs() < 1e-9);

        let falling = detect_trend(16.0, &[20.0, 19.0, 18.0, 17.0], 5, 0.5, 2.0);
        assert_eq!(falling.direction, TrendDirection::Decreasing);

        let lone = detect_trend(16.0, &[], 5, 0.5, 2.0);
        assert_eq!(lone.direction, TrendDirection::Stable);
        assert_eq!(lone.strength, 0.0);
    }

    #[test]
    fn test_trend_uses_only_recent_samples() {
        let window = [0.0, 100.0, 20.0, 20.0, 20.0, 20.0];
        let trend = detect_trend(20.0, &window, 5, 0.5, 2.0);
        assert_eq!(trend.samples, 5);
        assert_eq!(trend.slope, 0.0);
    }

    #[test]
    fn test_history_appended_after_scoring() {
        let mut agent = agent();
        for _ in 0..6 {
            agent.process(400.0, "ppm", "co2", 1.0, "Salle 3").unwrap();
        }
        let key = HistoryKey::new("co2", "Salle 3");
        assert_eq!(agent.history().window(&key).unwrap().len(), 6);

        let analysis = agent.process(900.0, "ppm", "co2", 1.0, "Salle 3").unwrap();
        assert!(analysis.anomaly.is_anomaly);
        assert_eq!(analysis.anomaly.samples, 6);
        assert!(analysis.has_alert(AlertType::AnomalyDetected));
        assert_eq!(agent.stats().anomalies_detected, 1);
    }

    #[test]
    fn test_rising_trend_raises_warning() {
        let mut agent = agent();
        for v in [20.0, 21.5, 23.0, 24.5] {
            agent.process(v, "°C", "temperature", 1.0, "Entrepot").unwrap();
        }
        let analysis = agent.process(26.0, "°C", "temperature", 1.0, "Entrepot").unwrap();
        assert_eq!(analysis.trend.direction, TrendDirection::Increasing);
        assert!(analysis.has_alert(AlertType::TrendWarning));
        // trend only: 0.75 × 20
        assert!((analysis.risk_score - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_grows_with_history() {
        let mut agent = agent();
        let first = agent.process(22.0, "°C", "temperature", 1.0, "Quai").unwrap();
        assert!((first.confidence - 0.6).abs() < 1e-9);
        for _ in 0..5 {
            agent.process(22.0, "°C", "temperature", 1.0, "Quai").unwrap();
        }
        let later = agent.process(22.0, "°C", "temperature", 1.0, "Quai").unwrap();
        assert!((later.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_low_quality_noted() {
        let mut agent = agent();
        let analysis = agent.process(95.0, "dB", "noise", 0.5, "Atelier B").unwrap();
        assert!(analysis
            .contributing_factors
            .iter()
            .any(|f| f.contains("Reduced data quality")));
    }

    #[test]
    fn test_unknown_sensor_type_uses_general_category() {
        let mut agent = agent();
        let analysis = agent.process(3.0, "Bq", "radon", 1.0, "Sous-sol").unwrap();
        assert_eq!(analysis.hazard_category, HazardCategory::General);
        assert!(analysis.violations.is_empty());
    }

    #[test]
    fn test_non_finite_inputs_rejected() {
        let mut agent = agent();
        assert!(matches!(
            agent.process(f64::NAN, "°C", "temperature", 1.0, "A"),
            Err(AnalysisError::NonFiniteValue(_))
        ));
        assert!(matches!(
            agent.process(20.0, "°C", "temperature", f64::NAN, "A"),
            Err(AnalysisError::NonFiniteQuality(_))
        ));
    }
}
