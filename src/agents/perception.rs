//! Perception Agent - Stage 1
//!
//! Validates a raw reading, tags it with a static-threshold alert level and
//! attaches template advice. No history, no I/O: the alert level depends only
//! on the reading and the configured bands.

use crate::config::{normalize_key, PerceptionConfig, StaticThreshold};
use crate::types::{AlertLevel, PerceptionRecord, RawReading};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info};

/// Template key used when a sensor type has no advisories of its own
const DEFAULT_ADVISORY_KEY: &str = "default";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PerceptionError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("value must be finite (got {0})")]
    NonFiniteValue(f64),
}

// ============================================================================
// Agent
// ============================================================================

#[derive(Debug)]
pub struct PerceptionAgent {
    config: PerceptionConfig,
    observations_processed: u64,
    alerts_raised: u64,
}

impl PerceptionAgent {
    pub fn new(config: PerceptionConfig) -> Self {
        Self {
            config,
            observations_processed: 0,
            alerts_raised: 0,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(PerceptionConfig::default())
    }

    /// Validate and tag a reading, stamping missing timestamps with `Utc::now()`.
    pub fn process(&mut self, reading: &RawReading) -> Result<PerceptionRecord, PerceptionError> {
        self.process_at(reading, Utc::now())
    }

    /// Validate and tag a reading; `received_at` stands in for a missing timestamp.
    pub fn process_at(
        &mut self,
        reading: &RawReading,
        received_at: DateTime<Utc>,
    ) -> Result<PerceptionRecord, PerceptionError> {
        let (value, sensor_type) = Self::validate(reading)?;
        let unit = reading.unit.trim().to_string();
        let location = reading.location.trim().to_string();

        let alert_level = match self.config.thresholds.get(&sensor_type) {
            Some(threshold) if Self::unit_matches(threshold, &unit) => {
                classify(value, threshold, self.config.critical_margin_fraction)
            }
            Some(threshold) => {
                debug!(
                    sensor_type = %sensor_type,
                    unit = %unit,
                    threshold_unit = ?threshold.unit,
                    "Reading unit differs from threshold unit, static check skipped"
                );
                AlertLevel::Normal
            }
            None => AlertLevel::Normal,
        };

        let advisory_text = if alert_level.is_alert() {
            self.render_advisories(alert_level, &sensor_type, value, &unit, &location)
        } else {
            Vec::new()
        };

        self.observations_processed += 1;
        if alert_level.is_alert() {
            self.alerts_raised += 1;
            info!(
                sensor_type = %sensor_type,
                location = %location,
                value,
                unit = %unit,
                level = %alert_level,
                "Static threshold alert"
            );
        }

        Ok(PerceptionRecord {
            source: reading.source.trim().to_string(),
            sensor_type,
            value,
            unit,
            location,
            timestamp: reading.timestamp.unwrap_or(received_at),
            alert_level,
            advisory_text,
        })
    }

    fn validate(reading: &RawReading) -> Result<(f64, String), PerceptionError> {
        if reading.source.trim().is_empty() {
            return Err(PerceptionError::MissingField("source"));
        }
        let sensor_type = normalize_key(&reading.sensor_type);
        if sensor_type.is_empty() {
            return Err(PerceptionError::MissingField("sensor_type"));
        }
        if reading.location.trim().is_empty() {
            return Err(PerceptionError::MissingField("location"));
        }
        let value = reading.value.ok_or(PerceptionError::MissingField("value"))?;
        if !value.is_finite() {
            return Err(PerceptionError::NonFiniteValue(value));
        }
        Ok((value, sensor_type))
    }

    /// Bands without a unit apply to every reading; an empty reading unit
    /// is assumed to already be in the band's unit.
    fn unit_matches(threshold: &StaticThreshold, unit: &str) -> bool {
        match &threshold.unit {
            None => true,
            Some(expected) => unit.is_empty() || expected.trim().to_lowercase() == unit.to_lowercase(),
        }
    }

    fn render_advisories(
        &self,
        level: AlertLevel,
        sensor_type: &str,
        value: f64,
        unit: &str,
        location: &str,
    ) -> Vec<String> {
        let Some(templates) = self
            .config
            .advisories
            .get(sensor_type)
            .or_else(|| self.config.advisories.get(DEFAULT_ADVISORY_KEY))
        else {
            return Vec::new();
        };

        let lines = match level {
            AlertLevel::Critical => &templates.critical,
            AlertLevel::Warning => &templates.warning,
            AlertLevel::Normal => return Vec::new(),
        };

        let value = value.to_string();
        lines
            .iter()
            .map(|line| {
                line.replace("{value}", &value)
                    .replace("{unit}", unit)
                    .replace("{location}", location)
                    .replace("{sensor_type}", sensor_type)
            })
            .collect()
    }

    pub fn stats(&self) -> PerceptionStats {
        PerceptionStats {
            observations_processed: self.observations_processed,
            alerts_raised: self.alerts_raised,
        }
    }

    pub fn reset_stats(&mut self) {
        self.observations_processed = 0;
        self.alerts_raised = 0;
    }
}

impl Default for PerceptionAgent {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Static-band classification.
///
/// The margin is a fraction of the band width, or of |bound| (floored at 1.0)
/// when only one side is configured.
pub fn classify(value: f64, threshold: &StaticThreshold, critical_margin_fraction: f64) -> AlertLevel {
    let range = match (threshold.min, threshold.max) {
        (Some(lo), Some(hi)) if hi > lo => hi - lo,
        (Some(b), None) | (None, Some(b)) => b.abs().max(1.0),
        (Some(b), Some(_)) => b.abs().max(1.0),
        (None, None) => return AlertLevel::Normal,
    };
    let margin = critical_margin_fraction * range;

    let deviation = match (threshold.min, threshold.max) {
        (Some(lo), _) if value < lo => lo - value,
        (_, Some(hi)) if value > hi => value - hi,
        _ => return AlertLevel::Normal,
    };

    if deviation > margin {
        AlertLevel::Critical
    } else {
        AlertLevel::Warning
    }
}

// ============================================================================
// Statistics
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PerceptionStats {
    pub observations_processed: u64,
    pub alerts_raised: u64,
}

impl std::fmt::Display for PerceptionStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rate = if self.observations_processed > 0 {
            self.alerts_raised as f64 / self.observations_processed as f64 * 100.0
        } else {
            0.0
        };
        write!(
            f,
            "Observations: {}, Alerts: {} ({:.1}%)",
            self.observations_processed, self.alerts_raised, rate
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(sensor_type: &str, value: f64, unit: &str) -> RawReading {
        RawReading::new("sensor-01", sensor_type, value, unit, "Atelier A")
    }

    #[test]
    fn test_normal_reading_has_no_advice() {
        let mut agent = PerceptionAgent::with_defaults();
        let record = agent.process(&reading("temperature", 22.0, "°C")).unwrap();
        assert_eq!(record.alert_level, AlertLevel::Normal);
        assert!(record.advisory_text.is_empty());
        assert_eq!(agent.stats().observations_processed, 1);
        assert_eq!(agent.stats().alerts_raised, 0);
    }

    #[test]
    fn test_temperature_warning_and_critical() {
        let mut agent = PerceptionAgent::with_defaults();
        // band 5-35, margin 0.2 * 30 = 6
        let warn = agent.process(&reading("temperature", 38.0, "°C")).unwrap();
        assert_eq!(warn.alert_level, AlertLevel::Warning);
        let crit = agent.process(&reading("temperature", 42.0, "°C")).unwrap();
        assert_eq!(crit.alert_level, AlertLevel::Critical);
        let cold = agent.process(&reading("temperature", -2.0, "°C")).unwrap();
        assert_eq!(cold.alert_level, AlertLevel::Critical);
        assert_eq!(agent.stats().alerts_raised, 3);
    }

    #[test]
    fn test_single_bound_uses_bound_magnitude() {
        let threshold = StaticThreshold { min: None, max: Some(85.0), unit: None };
        // margin 0.2 * 85 = 17
        assert_eq!(classify(95.0, &threshold, 0.2), AlertLevel::Warning);
        assert_eq!(classify(103.0, &threshold, 0.2), AlertLevel::Critical);
        assert_eq!(classify(85.0, &threshold, 0.2), AlertLevel::Normal);
    }

    #[test]
    fn test_unknown_sensor_type_is_normal() {
        let mut agent = PerceptionAgent::with_defaults();
        let record = agent.process(&reading("radon", 9999.0, "Bq/m3")).unwrap();
        assert_eq!(record.alert_level, AlertLevel::Normal);
    }

    #[test]
    fn test_unit_mismatch_skips_static_check() {
        let mut agent = PerceptionAgent::with_defaults();
        let record = agent.process(&reading("temperature", 98.6, "°F")).unwrap();
        assert_eq!(record.alert_level, AlertLevel::Normal);
    }

    #[test]
    fn test_advisories_substitute_placeholders() {
        let mut agent = PerceptionAgent::with_defaults();
        let record = agent.process(&reading("noise", 90.0, "dB")).unwrap();
        assert_eq!(record.alert_level, AlertLevel::Warning);
        assert!(!record.advisory_text.is_empty());
        assert!(record.advisory_text[0].contains("90 dB"));
        assert!(record.advisory_text.iter().any(|t| t.contains("Atelier A")));
        assert!(record.advisory_text.iter().all(|t| !t.contains('{')));
    }

    #[test]
    fn test_missing_fields_rejected() {
        let mut agent = PerceptionAgent::with_defaults();
        let mut r = reading("noise", 70.0, "dB");
        r.location = "  ".to_string();
        assert_eq!(agent.process(&r), Err(PerceptionError::MissingField("location")));

        let mut r = reading("noise", 70.0, "dB");
        r.value = None;
        assert_eq!(agent.process(&r), Err(PerceptionError::MissingField("value")));

        let mut r = reading("noise", 70.0, "dB");
        r.source.clear();
        assert_eq!(agent.process(&r), Err(PerceptionError::MissingField("source")));

        let r = reading("noise", f64::NAN, "dB");
        assert!(matches!(agent.process(&r), Err(PerceptionError::NonFiniteValue(_))));
        assert_eq!(agent.stats().observations_processed, 0);
    }

    #[test]
    fn test_sensor_type_normalized_and_timestamp_filled() {
        let mut agent = PerceptionAgent::with_defaults();
        let received = chrono::DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let record = agent
            .process_at(&reading("  Temperature ", 20.0, "°C"), received)
            .unwrap();
        assert_eq!(record.sensor_type, "temperature");
        assert_eq!(record.timestamp, received);
    }

    #[test]
    fn test_reset_stats() {
        let mut agent = PerceptionAgent::with_defaults();
        agent.process(&reading("noise", 120.0, "dB")).unwrap();
        agent.reset_stats();
        assert_eq!(agent.stats(), PerceptionStats::default());
    }
}
