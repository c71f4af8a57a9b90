//! Pipeline Configuration - every stage threshold and lookup table as TOML
//!
//! Each section implements `Default` with the built-in tables, so an empty
//! file (or no file at all) yields the stock behavior. Stages only ever read
//! these values; nothing in the pipeline mutates a loaded config.

use super::tables;
use crate::types::{HazardCategory, RecommendationTemplate, RiskLevel, RiskType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "SST_CONFIG";

/// Config file looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "sst_pipeline.toml";

/// Lookup form of a sensor-type or unit key
pub fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

fn fold_keys<V>(map: &mut BTreeMap<String, V>, table: &str) {
    if map.keys().all(|k| *k == normalize_key(k)) {
        return;
    }
    for (key, value) in std::mem::take(map) {
        let folded = normalize_key(&key);
        if map.insert(folded.clone(), value).is_some() {
            warn!(table, key = %folded, original = %key, "Duplicate key after case folding, later entry wins");
        }
    }
}

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one pipeline deployment.
///
/// Load with `PipelineConfig::load()` which searches:
/// 1. `$SST_CONFIG` env var
/// 2. `./sst_pipeline.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Static thresholds and advisory templates
    #[serde(default)]
    pub perception: PerceptionConfig,

    /// Unit conversions, valid ranges and rejection policy
    #[serde(default)]
    pub normalization: NormalizationConfig,

    /// Regulatory limits, anomaly and trend detection
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Recommendation knowledge base and plan assembly
    #[serde(default)]
    pub recommendation: RecommendationConfig,

    /// Workflow sequencing policy
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

impl PipelineConfig {
    /// Load configuration using the standard search order:
    /// 1. `$SST_CONFIG` environment variable
    /// 2. `./sst_pipeline.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded pipeline config from SST_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from SST_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "SST_CONFIG points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded pipeline config from ./{}", LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        info!("No pipeline config found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Toml(inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    ///
    /// Unknown keys are reported as warnings; type errors and failed
    /// validation are returned.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let mut config: Self = toml::from_str(contents)?;
        config.normalize_keys();
        config.validate()?;
        for w in super::validation::validate_table_consistency(&config) {
            warn!("{}", w);
        }
        Ok(config)
    }

    /// Fold every sensor-type and unit keyed table to trimmed lowercase keys.
    ///
    /// Stages look these tables up with normalized keys, so `[analysis.regulatory.Radon]`
    /// and `[normalization.conversions."degF"]` must land under `radon` / `degf`.
    pub fn normalize_keys(&mut self) {
        fold_keys(&mut self.perception.thresholds, "perception.thresholds");
        fold_keys(&mut self.perception.advisories, "perception.advisories");
        fold_keys(&mut self.normalization.conversions, "normalization.conversions");
        fold_keys(&mut self.normalization.valid_ranges, "normalization.valid_ranges");
        fold_keys(&mut self.analysis.regulatory, "analysis.regulatory");
        fold_keys(&mut self.analysis.hazard_categories, "analysis.hazard_categories");
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save config to a file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "Pipeline config saved");
        Ok(())
    }

    /// Validate all tables and tuning values for internal consistency.
    ///
    /// Every problem is collected so one pass reports them all.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        // Perception
        let p = &self.perception;
        for (sensor, t) in &p.thresholds {
            Self::check_bounds(t.min, t.max, &format!("perception.thresholds.{sensor}"), &mut errors);
        }
        Self::check_finite(p.critical_margin_fraction, "perception.critical_margin_fraction", &mut errors);
        if p.critical_margin_fraction < 0.0 {
            errors.push("perception.critical_margin_fraction must be >= 0".to_string());
        }

        // Normalization
        let n = &self.normalization;
        for (sensor, r) in &n.valid_ranges {
            Self::check_bounds(Some(r.min), Some(r.max), &format!("normalization.valid_ranges.{sensor}"), &mut errors);
            if r.min >= r.max {
                errors.push(format!(
                    "normalization.valid_ranges.{sensor}: min ({:.3}) must be < max ({:.3})",
                    r.min, r.max
                ));
            }
        }
        for (unit, c) in &n.conversions {
            if let Err(msg) = c.conversion.check() {
                errors.push(format!("normalization.conversions.{unit}: {msg}"));
            }
            if c.si_unit.trim().is_empty() {
                errors.push(format!("normalization.conversions.{unit}: si_unit must not be empty"));
            }
        }
        if n.implausible_range_factor <= 0.0 || !n.implausible_range_factor.is_finite() {
            errors.push("normalization.implausible_range_factor must be a finite value > 0".to_string());
        }
        if !(0.0..=1.0).contains(&n.out_of_range_penalty_cap) {
            errors.push("normalization.out_of_range_penalty_cap must be within [0, 1]".to_string());
        }
        if !(0.0..=1.0).contains(&n.central_band_fraction) {
            errors.push("normalization.central_band_fraction must be within [0, 1]".to_string());
        }

        // Analysis
        let a = &self.analysis;
        if a.window_size == 0 {
            errors.push("analysis.window_size must be > 0".to_string());
        }
        if a.min_samples == 0 {
            errors.push("analysis.min_samples must be > 0".to_string());
        }
        if a.min_samples > a.window_size {
            errors.push(format!(
                "analysis.min_samples ({}) must be <= window_size ({})",
                a.min_samples, a.window_size
            ));
        }
        if a.anomaly_sensitivity <= 0.0 || !a.anomaly_sensitivity.is_finite() {
            errors.push("analysis.anomaly_sensitivity must be a finite value > 0".to_string());
        }
        if a.min_std_floor <= 0.0 || !a.min_std_floor.is_finite() {
            errors.push("analysis.min_std_floor must be a finite value > 0".to_string());
        }
        if a.trend_window < 2 {
            errors.push("analysis.trend_window must be >= 2".to_string());
        }
        if a.trend_strength_divisor <= 0.0 || !a.trend_strength_divisor.is_finite() {
            errors.push("analysis.trend_strength_divisor must be a finite value > 0".to_string());
        }
        if !(0.0..=100.0).contains(&a.alert_threshold) {
            errors.push("analysis.alert_threshold must be within [0, 100]".to_string());
        }
        for (sensor, r) in &a.regulatory {
            let name = format!("analysis.regulatory.{sensor}");
            Self::check_bounds(r.min, r.max, &name, &mut errors);
            if let (Some(max), Some(critical)) = (r.max, r.critical) {
                Self::check_escalation(max, critical, &name, &mut errors);
            }
            if let (Some(min), Some(critical_low)) = (r.min, r.critical_low) {
                if critical_low > min {
                    errors.push(format!(
                        "{name}: critical_low ({critical_low:.3}) must be <= min ({min:.3})"
                    ));
                }
            }
        }

        // Recommendation
        let r = &self.recommendation;
        if r.max_recommendations == 0 {
            errors.push("recommendation.max_recommendations must be > 0".to_string());
        }
        if !(r.diminishing_returns_factor > 0.0 && r.diminishing_returns_factor <= 1.0) {
            errors.push("recommendation.diminishing_returns_factor must be within (0, 1]".to_string());
        }
        if !(r.max_total_risk_reduction > 0.0 && r.max_total_risk_reduction <= 100.0) {
            errors.push("recommendation.max_total_risk_reduction must be within (0, 100]".to_string());
        }
        if !(0.0..=100.0).contains(&r.min_risk_score) {
            errors.push("recommendation.min_risk_score must be within [0, 100]".to_string());
        }
        if r.templates.get(&RiskType::GeneralRisk).map_or(true, Vec::is_empty) {
            errors.push("recommendation.templates.general_risk must not be empty (fallback table)".to_string());
        }
        for (risk_type, templates) in &r.templates {
            for t in templates {
                if !(0.0..=100.0).contains(&t.risk_reduction) {
                    errors.push(format!(
                        "recommendation.templates.{risk_type} '{}': risk_reduction must be within [0, 100]",
                        t.title
                    ));
                }
                if t.estimated_cost < 0.0 || !t.estimated_cost.is_finite() {
                    errors.push(format!(
                        "recommendation.templates.{risk_type} '{}': estimated_cost must be a finite value >= 0",
                        t.title
                    ));
                }
            }
        }

        // Orchestrator
        if self.orchestrator.history_capacity == 0 {
            errors.push("orchestrator.history_capacity must be > 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_finite(value: f64, name: &str, errors: &mut Vec<String>) {
        if !value.is_finite() {
            errors.push(format!("{name}: value must be finite (got {value})"));
        }
    }

    fn check_bounds(min: Option<f64>, max: Option<f64>, name: &str, errors: &mut Vec<String>) {
        for v in [min, max].into_iter().flatten() {
            if !v.is_finite() {
                errors.push(format!("{name}: bounds must be finite (got {v})"));
                return;
            }
        }
        if let (Some(min), Some(max)) = (min, max) {
            if min > max {
                errors.push(format!("{name}: min ({min:.3}) must be <= max ({max:.3})"));
            }
        }
    }

    fn check_escalation(limit: f64, critical: f64, name: &str, errors: &mut Vec<String>) {
        // NaN comparisons silently pass
        if !limit.is_finite() || !critical.is_finite() {
            errors.push(format!(
                "{name}: values must be finite (got max={limit}, critical={critical})"
            ));
            return;
        }
        if critical < limit {
            errors.push(format!(
                "{name}: critical ({critical:.3}) must be >= max ({limit:.3})"
            ));
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Config parse error ({}): {}", .0.display(), .1)]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Config serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
}

// ============================================================================
// Perception
// ============================================================================

/// Static alert band for one sensor type, in the unit the device reports
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticThreshold {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    /// Unit the bounds are expressed in; readings in another unit are not checked
    #[serde(default)]
    pub unit: Option<String>,
}

/// Advisory sentences per severity. Placeholders: `{value}`, `{unit}`,
/// `{location}`, `{sensor_type}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryTemplates {
    #[serde(default)]
    pub warning: Vec<String>,
    #[serde(default)]
    pub critical: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerceptionConfig {
    /// Static thresholds keyed by sensor type
    #[serde(default = "tables::default_static_thresholds")]
    pub thresholds: BTreeMap<String, StaticThreshold>,

    /// Fraction of the threshold range beyond a bound that escalates to critical
    #[serde(default = "default_critical_margin_fraction")]
    pub critical_margin_fraction: f64,

    /// Advisory templates keyed by sensor type, with a `default` entry
    #[serde(default = "tables::default_advisories")]
    pub advisories: BTreeMap<String, AdvisoryTemplates>,
}

fn default_critical_margin_fraction() -> f64 { 0.2 }

impl Default for PerceptionConfig {
    fn default() -> Self {
        Self {
            thresholds: tables::default_static_thresholds(),
            critical_margin_fraction: default_critical_margin_fraction(),
            advisories: tables::default_advisories(),
        }
    }
}

// ============================================================================
// Normalization
// ============================================================================

/// How a raw value maps to its SI value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Conversion {
    Identity,
    /// `si = value × factor`
    Scale { factor: f64 },
    /// `si = value × scale + offset`
    Affine { scale: f64, offset: f64 },
}

impl Conversion {
    pub fn apply(self, value: f64) -> f64 {
        match self {
            Conversion::Identity => value,
            Conversion::Scale { factor } => value * factor,
            Conversion::Affine { scale, offset } => value.mul_add(scale, offset),
        }
    }

    fn check(self) -> Result<(), String> {
        match self {
            Conversion::Identity => Ok(()),
            Conversion::Scale { factor } => {
                if factor.is_finite() && factor != 0.0 {
                    Ok(())
                } else {
                    Err(format!("scale factor must be finite and non-zero (got {factor})"))
                }
            }
            Conversion::Affine { scale, offset } => {
                if scale.is_finite() && scale != 0.0 && offset.is_finite() {
                    Ok(())
                } else {
                    Err(format!("affine scale/offset must be finite, scale non-zero (got {scale}, {offset})"))
                }
            }
        }
    }
}

/// One entry of the unit conversion table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitConversion {
    pub si_unit: String,
    pub conversion: Conversion,
}

/// Physically plausible SI range for a sensor type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidRange {
    pub min: f64,
    pub max: f64,
    /// Whether an exact 0.0 reading is plausible (otherwise penalized)
    #[serde(default)]
    pub zero_plausible: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizationConfig {
    /// Reject observations graded `invalid`
    #[serde(default = "default_auto_reject")]
    pub auto_reject: bool,

    /// Deviation (in range widths) beyond which a value scores 0.0
    #[serde(default = "default_implausible_range_factor")]
    pub implausible_range_factor: f64,

    /// Cap on the deviation-proportional out-of-range penalty
    #[serde(default = "default_out_of_range_penalty_cap")]
    pub out_of_range_penalty_cap: f64,

    /// Width of the central band (fraction of the valid range) earning a bonus
    #[serde(default = "default_central_band_fraction")]
    pub central_band_fraction: f64,

    #[serde(default = "default_central_band_bonus")]
    pub central_band_bonus: f64,

    /// Penalty for an exact 0.0 where zero is implausible
    #[serde(default = "default_zero_value_penalty")]
    pub zero_value_penalty: f64,

    /// Unit conversion table keyed by lowercase unit
    #[serde(default = "tables::default_conversions")]
    pub conversions: BTreeMap<String, UnitConversion>,

    /// Valid SI ranges keyed by sensor type
    #[serde(default = "tables::default_valid_ranges")]
    pub valid_ranges: BTreeMap<String, ValidRange>,
}

fn default_auto_reject() -> bool { true }
fn default_implausible_range_factor() -> f64 { 1.0 }
fn default_out_of_range_penalty_cap() -> f64 { 0.5 }
fn default_central_band_fraction() -> f64 { 0.3 }
fn default_central_band_bonus() -> f64 { 0.1 }
fn default_zero_value_penalty() -> f64 { 0.2 }

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            auto_reject: default_auto_reject(),
            implausible_range_factor: default_implausible_range_factor(),
            out_of_range_penalty_cap: default_out_of_range_penalty_cap(),
            central_band_fraction: default_central_band_fraction(),
            central_band_bonus: default_central_band_bonus(),
            zero_value_penalty: default_zero_value_penalty(),
            conversions: tables::default_conversions(),
            valid_ranges: tables::default_valid_ranges(),
        }
    }
}

// ============================================================================
// Analysis
// ============================================================================

/// Regulatory limits for one sensor type, in SI units
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegulatoryLimit {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    /// High-side bound that forces severity 1.0
    #[serde(default)]
    pub critical: Option<f64>,
    /// Low-side bound that forces severity 1.0
    #[serde(default)]
    pub critical_low: Option<f64>,
    #[serde(default)]
    pub unit: String,
    /// Reference quoted in threshold alerts
    #[serde(default)]
    pub regulation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Maximum retained history samples per (sensor_type, location)
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Minimum history samples before anomaly detection runs
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,

    /// |z| above which a value is anomalous
    #[serde(default = "default_anomaly_sensitivity")]
    pub anomaly_sensitivity: f64,

    /// Floor applied to the window standard deviation
    #[serde(default = "default_min_std_floor")]
    pub min_std_floor: f64,

    /// Points used for trend detection (history tail + current value)
    #[serde(default = "default_trend_window")]
    pub trend_window: usize,

    /// |slope| above which a trend is increasing/decreasing
    #[serde(default = "default_trend_slope_threshold")]
    pub trend_slope_threshold: f64,

    /// strength = min(1, |slope| / divisor)
    #[serde(default = "default_trend_strength_divisor")]
    pub trend_strength_divisor: f64,

    /// Risk score at or above which recommendations are requested
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold: f64,

    /// Regulatory limits keyed by sensor type
    #[serde(default = "tables::default_regulatory_limits")]
    pub regulatory: BTreeMap<String, RegulatoryLimit>,

    /// Hazard category keyed by sensor type
    #[serde(default = "tables::default_hazard_categories")]
    pub hazard_categories: BTreeMap<String, HazardCategory>,
}

fn default_window_size() -> usize { super::defaults::HISTORY_WINDOW_SIZE }
fn default_min_samples() -> usize { super::defaults::MIN_SAMPLES_FOR_ANOMALY }
fn default_anomaly_sensitivity() -> f64 { 2.0 }
fn default_min_std_floor() -> f64 { 0.001 }
fn default_trend_window() -> usize { super::defaults::TREND_WINDOW }
fn default_trend_slope_threshold() -> f64 { 0.5 }
fn default_trend_strength_divisor() -> f64 { 2.0 }
fn default_alert_threshold() -> f64 { 50.0 }

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            min_samples: default_min_samples(),
            anomaly_sensitivity: default_anomaly_sensitivity(),
            min_std_floor: default_min_std_floor(),
            trend_window: default_trend_window(),
            trend_slope_threshold: default_trend_slope_threshold(),
            trend_strength_divisor: default_trend_strength_divisor(),
            alert_threshold: default_alert_threshold(),
            regulatory: tables::default_regulatory_limits(),
            hazard_categories: tables::default_hazard_categories(),
        }
    }
}

// ============================================================================
// Recommendation
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationConfig {
    /// Below this risk score no plan is generated
    #[serde(default = "default_min_risk_score")]
    pub min_risk_score: f64,

    /// Plan size cap
    #[serde(default = "default_max_recommendations")]
    pub max_recommendations: usize,

    /// Discount applied to summed risk reductions
    #[serde(default = "default_diminishing_returns_factor")]
    pub diminishing_returns_factor: f64,

    /// Cap on the aggregate plan risk reduction
    #[serde(default = "default_max_total_risk_reduction")]
    pub max_total_risk_reduction: f64,

    /// Candidate actions keyed by risk type
    #[serde(default = "tables::default_recommendation_templates")]
    pub templates: BTreeMap<RiskType, Vec<RecommendationTemplate>>,

    /// Implementation timeline text keyed by risk level
    #[serde(default = "tables::default_timelines")]
    pub timelines: BTreeMap<RiskLevel, String>,
}

fn default_min_risk_score() -> f64 { 20.0 }
fn default_max_recommendations() -> usize { super::defaults::MAX_RECOMMENDATIONS }
fn default_diminishing_returns_factor() -> f64 { 0.7 }
fn default_max_total_risk_reduction() -> f64 { 95.0 }

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            min_risk_score: default_min_risk_score(),
            max_recommendations: default_max_recommendations(),
            diminishing_returns_factor: default_diminishing_returns_factor(),
            max_total_risk_reduction: default_max_total_risk_reduction(),
            templates: tables::default_recommendation_templates(),
            timelines: tables::default_timelines(),
        }
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Keep running later stages after a stage failure
    #[serde(default)]
    pub continue_on_failure: bool,

    /// Finalized workflows retained in memory
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Lowest risk level that triggers a notification
    #[serde(default = "default_notify_min_risk_level")]
    pub notify_min_risk_level: RiskLevel,
}

fn default_history_capacity() -> usize { super::defaults::WORKFLOW_HISTORY_CAPACITY }
fn default_notify_min_risk_level() -> RiskLevel { RiskLevel::High }

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            continue_on_failure: false,
            history_capacity: default_history_capacity(),
            notify_min_risk_level: default_notify_min_risk_level(),
        }
    }
}
