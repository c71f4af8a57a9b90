//! Normalization Agent - Stage 2
//!
//! Converts a raw value to SI units through the configured conversion table,
//! grades its plausibility against the sensor type's valid range and, when
//! auto-reject is on, turns invalid data into a `Rejection` outcome.
//!
//! Unknown units and unknown sensor types are recoverable: the value passes
//! through unconverted / ungraded and a log line records it.

use crate::config::{normalize_key, NormalizationConfig};
use crate::types::{
    NormalizationOutcome, NormalizedObservation, QualityLevel, Rejection, SourceMetadata,
};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormalizationError {
    #[error("value must be finite (got {0})")]
    NonFiniteValue(f64),

    #[error("conversion of {value} {unit} produced a non-finite result")]
    NonFiniteConversion { value: f64, unit: String },
}

/// A value expressed in SI units
#[derive(Debug, Clone, PartialEq)]
pub struct Converted {
    pub value: f64,
    pub unit: String,
    /// False when the unit was not found and the value passed through
    pub recognized: bool,
}

#[derive(Debug)]
pub struct NormalizationAgent {
    config: NormalizationConfig,
    observations_processed: u64,
    observations_rejected: u64,
    unknown_units: u64,
}

impl NormalizationAgent {
    pub fn new(config: NormalizationConfig) -> Self {
        Self {
            config,
            observations_processed: 0,
            observations_rejected: 0,
            unknown_units: 0,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(NormalizationConfig::default())
    }

    pub fn auto_reject(&self) -> bool {
        self.config.auto_reject
    }

    /// Convert, grade and (optionally) reject one value.
    pub fn process(
        &mut self,
        value: f64,
        unit: &str,
        sensor_type: &str,
        source_agent_id: &str,
    ) -> Result<NormalizationOutcome, NormalizationError> {
        if !value.is_finite() {
            return Err(NormalizationError::NonFiniteValue(value));
        }

        let sensor_type = normalize_key(sensor_type);
        let converted = self.convert(value, unit);
        if !converted.value.is_finite() {
            return Err(NormalizationError::NonFiniteConversion {
                value,
                unit: unit.to_string(),
            });
        }
        if !converted.recognized {
            self.unknown_units += 1;
            warn!(
                unit = %unit,
                sensor_type = %sensor_type,
                "Unknown unit, value passed through unconverted"
            );
        }

        let quality_score = self.quality_score(converted.value, &sensor_type);
        let quality_level = QualityLevel::from_score(quality_score);
        self.observations_processed += 1;

        if self.config.auto_reject && quality_level == QualityLevel::Invalid {
            self.observations_rejected += 1;
            let reason = format!(
                "quality score {quality_score:.2} for {} {} is below the acceptance floor",
                converted.value, converted.unit
            );
            info!(
                sensor_type = %sensor_type,
                value = converted.value,
                unit = %converted.unit,
                quality_score,
                "Observation rejected"
            );
            return Ok(NormalizationOutcome::Rejected(Rejection {
                reason,
                quality_score,
                quality_level,
                value: converted.value,
                unit: converted.unit,
            }));
        }

        debug!(
            sensor_type = %sensor_type,
            value = converted.value,
            unit = %converted.unit,
            quality_score,
            quality = %quality_level,
            "Observation normalized"
        );

        Ok(NormalizationOutcome::Accepted(NormalizedObservation {
            value: converted.value,
            unit: converted.unit,
            quality_score,
            quality_level,
            source_metadata: SourceMetadata {
                source_agent_id: source_agent_id.to_string(),
                sensor_type,
                original_value: value,
                original_unit: unit.to_string(),
                unit_recognized: converted.recognized,
            },
        }))
    }

    /// Table lookup, case-insensitive on the trimmed unit.
    pub fn convert(&self, value: f64, unit: &str) -> Converted {
        let key = normalize_key(unit);
        match self.config.conversions.get(&key) {
            Some(entry) => Converted {
                value: entry.conversion.apply(value),
                unit: entry.si_unit.clone(),
                recognized: true,
            },
            None => Converted {
                value,
                unit: unit.trim().to_string(),
                recognized: false,
            },
        }
    }

    /// Plausibility of an SI value for a sensor type, in [0, 1].
    ///
    /// Sensor types without a valid range score 1.0.
    pub fn quality_score(&self, value: f64, sensor_type: &str) -> f64 {
        let Some(range) = self.config.valid_ranges.get(sensor_type) else {
            debug!(sensor_type = %sensor_type, "No valid range configured, quality not graded");
            return 1.0;
        };

        let width = range.max - range.min;
        if width <= 0.0 {
            return 1.0;
        }

        let deviation = if value < range.min {
            range.min - value
        } else if value > range.max {
            value - range.max
        } else {
            0.0
        };

        let mut score = 1.0;
        if deviation > 0.0 {
            if deviation > self.config.implausible_range_factor * width {
                return 0.0;
            }
            score -= (deviation / width).min(self.config.out_of_range_penalty_cap);
        }

        let center = (range.min + range.max) / 2.0;
        if (value - center).abs() <= self.config.central_band_fraction * width / 2.0 {
            score += self.config.central_band_bonus;
        }

        if value == 0.0 && !range.zero_plausible {
            score -= self.config.zero_value_penalty;
        }

        score.clamp(0.0, 1.0)
    }

    pub fn stats(&self) -> NormalizationStats {
        NormalizationStats {
            observations_processed: self.observations_processed,
            observations_rejected: self.observations_rejected,
            unknown_units: self.unknown_units,
        }
    }

    pub fn reset_stats(&mut self) {
        self.observations_processed = 0;
        self.observations_rejected = 0;
        self.unknown_units = 0;
    }
}

impl Default for NormalizationAgent {
    fn default() -> Self {
        Self::with_defaults()
    }
}

// ============================================================================
// Statistics
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizationStats {
    pub observations_processed: u64,
    pub observations_rejected: u64,
    pub unknown_units: u64,
}

impl std::fmt::Display for NormalizationStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Normalized: {}, Rejected: {}, Unknown units: {}",
            self.observations_processed, self.observations_rejected, self.unknown_units
        )
    }
}
