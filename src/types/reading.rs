//! Stage 1 types: raw sensor readings and perception records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Raw Reading
// ============================================================================

/// A single observation as delivered by a sensor/IoT adapter.
///
/// Mirrors the adapter payload field-for-field. String fields default to empty
/// when absent on the wire so that a missing field surfaces as a perception
/// validation error instead of a deserialization failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    /// Emitting device or adapter identifier
    #[serde(default)]
    pub source: String,
    /// Sensor family (e.g. "temperature", "noise", "co2")
    #[serde(default)]
    pub sensor_type: String,
    /// Measured value in `unit`
    #[serde(default)]
    pub value: Option<f64>,
    /// Unit as reported by the device (e.g. "°F", "psi", "ppb")
    #[serde(default)]
    pub unit: String,
    /// Work area / zone the sensor is installed in
    #[serde(default)]
    pub location: String,
    /// Capture time; processing time is used when absent
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl RawReading {
    /// Convenience constructor for a fully populated reading.
    pub fn new(
        source: impl Into<String>,
        sensor_type: impl Into<String>,
        value: f64,
        unit: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            sensor_type: sensor_type.into(),
            value: Some(value),
            unit: unit.into(),
            location: location.into(),
            timestamp: None,
        }
    }

    /// Attach a capture timestamp.
    #[must_use]
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

// ============================================================================
// Alert Level
// ============================================================================

/// Static-threshold alert level assigned at perception time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    #[default]
    Normal,
    Warning,
    Critical,
}

impl AlertLevel {
    pub fn is_alert(self) -> bool {
        self != AlertLevel::Normal
    }
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertLevel::Normal => write!(f, "NORMAL"),
            AlertLevel::Warning => write!(f, "WARNING"),
            AlertLevel::Critical => write!(f, "CRITICAL"),
        }
    }
}

// ============================================================================
// Perception Record
// ============================================================================

/// Output of the perception stage: a validated, tagged reading.
///
/// `alert_level` depends only on the static per-sensor-type thresholds known
/// when the record was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerceptionRecord {
    pub source: String,
    /// Normalized (trimmed, lowercase) sensor type
    pub sensor_type: String,
    pub value: f64,
    pub unit: String,
    pub location: String,
    pub timestamp: DateTime<Utc>,
    pub alert_level: AlertLevel,
    /// Template-derived advice for non-normal readings
    pub advisory_text: Vec<String>,
}
