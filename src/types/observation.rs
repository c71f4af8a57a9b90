//! Stage 2 types: SI-normalized observations and quality grading

use serde::{Deserialize, Serialize};

/// Plausibility grade derived from a quality score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityLevel {
    Invalid = 0,
    Poor = 1,
    Acceptable = 2,
    Good = 3,
    Excellent = 4,
}

impl QualityLevel {
    /// Bucket a quality score.
    ///
    /// ≥0.95 excellent, ≥0.80 good, ≥0.60 acceptable, ≥0.40 poor, else invalid.
    /// NaN buckets as invalid.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.95 {
            QualityLevel::Excellent
        } else if score >= 0.80 {
            QualityLevel::Good
        } else if score >= 0.60 {
            QualityLevel::Acceptable
        } else if score >= 0.40 {
            QualityLevel::Poor
        } else {
            QualityLevel::Invalid
        }
    }
}

impl std::fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QualityLevel::Invalid => write!(f, "invalid"),
            QualityLevel::Poor => write!(f, "poor"),
            QualityLevel::Acceptable => write!(f, "acceptable"),
            QualityLevel::Good => write!(f, "good"),
            QualityLevel::Excellent => write!(f, "excellent"),
        }
    }
}

/// Where a normalized value came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// Agent/adapter that produced the raw value
    pub source_agent_id: String,
    pub sensor_type: String,
    pub original_value: f64,
    pub original_unit: String,
    /// False when the unit was not in the conversion table and passed through
    pub unit_recognized: bool,
}

/// A reading converted to SI units and graded for plausibility
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedObservation {
    pub value: f64,
    /// SI unit (or the original unit when unrecognized)
    pub unit: String,
    /// Plausibility in [0, 1]
    pub quality_score: f64,
    pub quality_level: QualityLevel,
    pub source_metadata: SourceMetadata,
}

/// Terminal, reportable outcome for data too implausible to analyse
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    pub reason: String,
    pub quality_score: f64,
    pub quality_level: QualityLevel,
    pub value: f64,
    pub unit: String,
}

/// Result of the normalization stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NormalizationOutcome {
    Accepted(NormalizedObservation),
    Rejected(Rejection),
}

impl NormalizationOutcome {
    pub fn observation(&self) -> Option<&NormalizedObservation> {
        match self {
            NormalizationOutcome::Accepted(obs) => Some(obs),
            NormalizationOutcome::Rejected(_) => None,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, NormalizationOutcome::Rejected(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_buckets() {
        assert_eq!(QualityLevel::from_score(1.0), QualityLevel::Excellent);
        assert_eq!(QualityLevel::from_score(0.95), QualityLevel::Excellent);
        assert_eq!(QualityLevel::from_score(0.94), QualityLevel::Good);
        assert_eq!(QualityLevel::from_score(0.80), QualityLevel::Good);
        assert_eq!(QualityLevel::from_score(0.60), QualityLevel::Acceptable);
        assert_eq!(QualityLevel::from_score(0.40), QualityLevel::Poor);
        assert_eq!(QualityLevel::from_score(0.39), QualityLevel::Invalid);
        assert_eq!(QualityLevel::from_score(f64::NAN), QualityLevel::Invalid);
    }

    #[test]
    fn test_bucketing_is_monotonic() {
        let mut prev = QualityLevel::Invalid;
        for i in 0..=100 {
            let level = QualityLevel::from_score(f64::from(i) / 100.0);
            assert!(level >= prev, "bucket dropped at score {}", i);
            prev = level;
        }
    }
}
