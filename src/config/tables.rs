//! Built-in lookup tables: thresholds, unit conversions, valid ranges,
//! regulatory limits, hazard categories and the recommendation knowledge base.
//!
//! Every table here is the serde default for its config field, so a
//! deployment overrides an entire table by redefining it in TOML.

use super::pipeline_config::{
    AdvisoryTemplates, Conversion, RegulatoryLimit, StaticThreshold, UnitConversion, ValidRange,
};
use crate::types::{ControlType, HazardCategory, RecommendationTemplate, RiskLevel, RiskType};
use std::collections::BTreeMap;

// ============================================================================
// Perception
// ============================================================================

fn band(min: Option<f64>, max: Option<f64>, unit: &str) -> StaticThreshold {
    StaticThreshold {
        min,
        max,
        unit: Some(unit.to_string()),
    }
}

pub fn default_static_thresholds() -> BTreeMap<String, StaticThreshold> {
    BTreeMap::from([
        ("temperature".to_string(), band(Some(5.0), Some(35.0), "°C")),
        ("humidity".to_string(), band(Some(30.0), Some(70.0), "%")),
        ("noise".to_string(), band(None, Some(85.0), "dB")),
        ("co2".to_string(), band(None, Some(1000.0), "ppm")),
        ("co".to_string(), band(None, Some(25.0), "ppm")),
        ("vibration".to_string(), band(None, Some(0.5), "m/s²")),
        ("illuminance".to_string(), band(Some(200.0), None, "lux")),
    ])
}

fn advisory(warning: &[&str], critical: &[&str]) -> AdvisoryTemplates {
    AdvisoryTemplates {
        warning: warning.iter().map(|s| s.to_string()).collect(),
        critical: critical.iter().map(|s| s.to_string()).collect(),
    }
}

pub fn default_advisories() -> BTreeMap<String, AdvisoryTemplates> {
    BTreeMap::from([
        (
            "temperature".to_string(),
            advisory(
                &[
                    "Temperature of {value} {unit} at {location} is outside the comfort range.",
                    "Check ventilation and heating at {location}; schedule breaks in a temperate area.",
                ],
                &[
                    "Temperature of {value} {unit} at {location} is at a hazardous level.",
                    "Apply heat/cold stress procedures at {location} and limit exposure time.",
                ],
            ),
        ),
        (
            "humidity".to_string(),
            advisory(
                &["Relative humidity of {value} {unit} at {location} is outside the recommended band."],
                &["Relative humidity of {value} {unit} at {location} is extreme; adjust ventilation now."],
            ),
        ),
        (
            "noise".to_string(),
            advisory(
                &[
                    "Noise level of {value} {unit} at {location} exceeds the exposure guideline.",
                    "Hearing protection is recommended at {location}.",
                ],
                &[
                    "Noise level of {value} {unit} at {location} is hazardous.",
                    "Hearing protection is mandatory at {location}; restrict access to essential staff.",
                ],
            ),
        ),
        (
            "co2".to_string(),
            advisory(
                &["CO2 concentration of {value} {unit} at {location} indicates poor ventilation."],
                &["CO2 concentration of {value} {unit} at {location} is hazardous; ventilate and evacuate if symptoms appear."],
            ),
        ),
        (
            "co".to_string(),
            advisory(
                &["Carbon monoxide at {value} {unit} detected at {location}; identify the combustion source."],
                &["Carbon monoxide at {value} {unit} at {location} is dangerous; evacuate the area immediately."],
            ),
        ),
        (
            "vibration".to_string(),
            advisory(
                &["Vibration of {value} {unit} at {location} exceeds the action value."],
                &["Vibration of {value} {unit} at {location} exceeds the limit value; stop exposed work."],
            ),
        ),
        (
            "illuminance".to_string(),
            advisory(
                &["Lighting of {value} {unit} at {location} is below the recommended level."],
                &["Lighting of {value} {unit} at {location} is unsafe for work; stop precision tasks."],
            ),
        ),
        (
            "default".to_string(),
            advisory(
                &["{sensor_type} reading of {value} {unit} at {location} is outside its expected range."],
                &["{sensor_type} reading of {value} {unit} at {location} is far outside its expected range; investigate immediately."],
            ),
        ),
    ])
}

// ============================================================================
// Normalization
// ============================================================================

fn conv(si_unit: &str, conversion: Conversion) -> UnitConversion {
    UnitConversion {
        si_unit: si_unit.to_string(),
        conversion,
    }
}

fn scale(factor: f64) -> Conversion {
    Conversion::Scale { factor }
}

/// Unit conversion table keyed by lowercase unit string
pub fn default_conversions() -> BTreeMap<String, UnitConversion> {
    let fahrenheit = Conversion::Affine {
        scale: 5.0 / 9.0,
        offset: -32.0 * 5.0 / 9.0,
    };
    let kelvin = Conversion::Affine {
        scale: 1.0,
        offset: -273.15,
    };

    let entries = [
        // Temperature
        ("°c", conv("°C", Conversion::Identity)),
        ("c", conv("°C", Conversion::Identity)),
        ("celsius", conv("°C", Conversion::Identity)),
        ("°f", conv("°C", fahrenheit)),
        ("f", conv("°C", fahrenheit)),
        ("fahrenheit", conv("°C", fahrenheit)),
        ("k", conv("°C", kelvin)),
        ("kelvin", conv("°C", kelvin)),
        // Pressure
        ("pa", conv("Pa", Conversion::Identity)),
        ("kpa", conv("Pa", scale(1000.0))),
        ("psi", conv("Pa", scale(6894.757))),
        ("bar", conv("Pa", scale(100_000.0))),
        ("atm", conv("Pa", scale(101_325.0))),
        // Acceleration
        ("m/s²", conv("m/s²", Conversion::Identity)),
        ("m/s2", conv("m/s²", Conversion::Identity)),
        ("g", conv("m/s²", scale(9.80665))),
        ("mm/s²", conv("m/s²", scale(0.001))),
        ("mm/s2", conv("m/s²", scale(0.001))),
        // Velocity. Vibration velocity in mm/s stays a velocity; the default
        // vibration limit is an acceleration, so those readings carry no
        // regulatory check unless a m/s limit is configured.
        ("m/s", conv("m/s", Conversion::Identity)),
        ("mm/s", conv("m/s", scale(0.001))),
        // Concentration
        ("ppm", conv("ppm", Conversion::Identity)),
        ("ppb", conv("ppm", scale(0.001))),
        // Illuminance
        ("lux", conv("lux", Conversion::Identity)),
        ("lx", conv("lux", Conversion::Identity)),
        ("fc", conv("lux", scale(10.7639))),
        // Sound level
        ("db", conv("dB", Conversion::Identity)),
        ("dba", conv("dB", Conversion::Identity)),
        ("db(a)", conv("dB", Conversion::Identity)),
        // Relative humidity
        ("%", conv("%", Conversion::Identity)),
        ("%rh", conv("%", Conversion::Identity)),
    ];

    entries
        .into_iter()
        .map(|(unit, c)| (unit.to_string(), c))
        .collect()
}

fn range(min: f64, max: f64, zero_plausible: bool) -> ValidRange {
    ValidRange {
        min,
        max,
        zero_plausible,
    }
}

/// Physically plausible SI ranges keyed by sensor type
pub fn default_valid_ranges() -> BTreeMap<String, ValidRange> {
    BTreeMap::from([
        ("temperature".to_string(), range(-50.0, 60.0, false)),
        ("humidity".to_string(), range(0.0, 100.0, true)),
        ("noise".to_string(), range(0.0, 140.0, false)),
        ("co2".to_string(), range(250.0, 5000.0, false)),
        ("co".to_string(), range(0.0, 500.0, true)),
        ("vibration".to_string(), range(0.0, 50.0, true)),
        ("illuminance".to_string(), range(0.0, 100_000.0, true)),
        ("pressure".to_string(), range(80_000.0, 120_000.0, false)),
    ])
}

// ============================================================================
// Analysis
// ============================================================================

fn limit(
    min: Option<f64>,
    max: Option<f64>,
    critical: Option<f64>,
    critical_low: Option<f64>,
    unit: &str,
    regulation: &str,
) -> RegulatoryLimit {
    RegulatoryLimit {
        min,
        max,
        critical,
        critical_low,
        unit: unit.to_string(),
        regulation: regulation.to_string(),
    }
}

/// Regulatory limits keyed by sensor type, in SI units
pub fn default_regulatory_limits() -> BTreeMap<String, RegulatoryLimit> {
    BTreeMap::from([
        (
            "temperature".to_string(),
            limit(Some(18.0), Some(30.0), Some(40.0), Some(5.0), "°C", "RSST thermal environment"),
        ),
        (
            "humidity".to_string(),
            limit(Some(20.0), Some(70.0), None, None, "%", "RSST ventilation and humidity"),
        ),
        (
            "noise".to_string(),
            limit(None, Some(80.0), Some(100.0), None, "dB", "RSST noise exposure"),
        ),
        (
            "co2".to_string(),
            limit(None, Some(1000.0), Some(5000.0), None, "ppm", "RSST air quality (CO2)"),
        ),
        (
            "co".to_string(),
            limit(None, Some(35.0), Some(200.0), None, "ppm", "RSST contaminant exposure (CO)"),
        ),
        (
            "vibration".to_string(),
            limit(None, Some(0.5), Some(1.15), None, "m/s²", "Whole-body vibration exposure"),
        ),
        (
            "illuminance".to_string(),
            limit(Some(200.0), None, None, Some(50.0), "lux", "RSST workplace lighting"),
        ),
    ])
}

pub fn default_hazard_categories() -> BTreeMap<String, HazardCategory> {
    BTreeMap::from([
        ("temperature".to_string(), HazardCategory::Thermal),
        ("humidity".to_string(), HazardCategory::Thermal),
        ("noise".to_string(), HazardCategory::Noise),
        ("co2".to_string(), HazardCategory::Chemical),
        ("co".to_string(), HazardCategory::Chemical),
        ("vibration".to_string(), HazardCategory::Ergonomic),
        ("illuminance".to_string(), HazardCategory::Ergonomic),
        ("pressure".to_string(), HazardCategory::Physical),
    ])
}

// ============================================================================
// Recommendation Knowledge Base
// ============================================================================

fn template(
    title: &str,
    description: &str,
    action_type: ControlType,
    risk_reduction: f64,
    estimated_cost: f64,
    estimated_duration: &str,
    regulatory_reference: &str,
) -> RecommendationTemplate {
    RecommendationTemplate {
        title: title.to_string(),
        description: description.to_string(),
        action_type,
        risk_reduction,
        estimated_cost,
        estimated_duration: estimated_duration.to_string(),
        regulatory_reference: regulatory_reference.to_string(),
    }
}

pub fn default_recommendation_templates() -> BTreeMap<RiskType, Vec<RecommendationTemplate>> {
    use ControlType::*;

    let temperature_high = vec![
        template(
            "Relocate heat-generating processes",
            "Move ovens, furnaces or other heat sources out of occupied work areas.",
            Elimination, 80.0, 25_000.0, "3-6 months", "RSST thermal environment",
        ),
        template(
            "Install local exhaust and cooling",
            "Add spot cooling, exhaust hoods or air conditioning to the affected area.",
            Engineering, 60.0, 15_000.0, "1-2 months", "RSST thermal environment",
        ),
        template(
            "Insulate hot surfaces",
            "Shield or insulate radiant heat sources near workstations.",
            Engineering, 40.0, 5_000.0, "2-4 weeks", "RSST thermal environment",
        ),
        template(
            "Work-rest cycle and hydration program",
            "Schedule breaks in a cool area and provide drinking water based on heat index.",
            Administrative, 30.0, 500.0, "1 week", "Heat stress prevention guideline",
        ),
        template(
            "Provide cooling vests",
            "Issue personal cooling garments to workers in the affected area.",
            Ppe, 20.0, 2_000.0, "1 week", "RSST thermal environment",
        ),
        template(
            "Continuous temperature monitoring",
            "Add alarmed temperature logging with supervisor notification.",
            Monitoring, 10.0, 1_000.0, "1 week", "RSST thermal environment",
        ),
    ];

    let noise_high = vec![
        template(
            "Replace noisy equipment",
            "Substitute the loudest machines with low-noise models.",
            Substitution, 70.0, 40_000.0, "3-6 months", "RSST noise exposure",
        ),
        template(
            "Enclose or isolate noise sources",
            "Build acoustic enclosures or barriers around the dominant sources.",
            Engineering, 60.0, 20_000.0, "1-3 months", "RSST noise exposure",
        ),
        template(
            "Install vibration dampers",
            "Mount machines on anti-vibration pads to cut structure-borne noise.",
            Engineering, 35.0, 6_000.0, "2-4 weeks", "RSST noise exposure",
        ),
        template(
            "Limit exposure time",
            "Rotate workers and restrict time spent in high-noise zones.",
            Administrative, 30.0, 0.0, "Immediate", "RSST noise exposure",
        ),
        template(
            "Mandatory hearing protection",
            "Provide fitted earplugs or earmuffs and enforce their use.",
            Ppe, 25.0, 1_500.0, "Immediate", "RSST noise exposure",
        ),
        template(
            "Audiometric testing program",
            "Run baseline and periodic hearing tests for exposed workers.",
            Monitoring, 10.0, 3_000.0, "1 month", "RSST noise exposure",
        ),
    ];

    let chemical_exposure = vec![
        template(
            "Eliminate the contaminant source",
            "Remove the process or combustion source generating the contaminant.",
            Elimination, 90.0, 30_000.0, "1-3 months", "RSST contaminant exposure",
        ),
        template(
            "Substitute with electric equipment",
            "Replace fuel-powered equipment with electric alternatives.",
            Substitution, 75.0, 20_000.0, "1-2 months", "RSST contaminant exposure",
        ),
        template(
            "Increase mechanical ventilation",
            "Raise air change rate and add local exhaust at the source.",
            Engineering, 60.0, 12_000.0, "2-6 weeks", "RSST air quality",
        ),
        template(
            "Restrict access and post warnings",
            "Limit entry to trained staff and post exposure warnings.",
            Administrative, 25.0, 300.0, "Immediate", "RSST contaminant exposure",
        ),
        template(
            "Respiratory protection",
            "Provide fit-tested respirators for tasks in the affected area.",
            Ppe, 30.0, 2_500.0, "1 week", "RSST contaminant exposure",
        ),
        template(
            "Continuous gas detection",
            "Install fixed gas detectors with audible alarms.",
            Monitoring, 15.0, 4_000.0, "2 weeks", "RSST air quality",
        ),
    ];

    let ergonomic_risk = vec![
        template(
            "Isolate vibrating equipment",
            "Decouple operator platforms from vibrating machinery.",
            Engineering, 50.0, 10_000.0, "1-2 months", "Whole-body vibration exposure",
        ),
        template(
            "Upgrade task lighting",
            "Install task lighting to reach the required illuminance.",
            Engineering, 45.0, 4_000.0, "2-4 weeks", "RSST workplace lighting",
        ),
        template(
            "Job rotation and task redesign",
            "Rotate workers and redesign tasks to reduce exposure duration.",
            Administrative, 30.0, 1_000.0, "2 weeks", "Ergonomics program",
        ),
        template(
            "Anti-vibration gloves and seating",
            "Provide anti-vibration gloves and suspension seats.",
            Ppe, 20.0, 1_500.0, "1 week", "Whole-body vibration exposure",
        ),
        template(
            "Periodic ergonomic assessment",
            "Schedule workstation assessments and exposure measurements.",
            Monitoring, 10.0, 800.0, "1 month", "Ergonomics program",
        ),
    ];

    let general_risk = vec![
        template(
            "Engineering review of the hazard",
            "Commission an engineering assessment of the affected process.",
            Engineering, 40.0, 5_000.0, "1 month", "RSST general obligations",
        ),
        template(
            "Update safe work procedure",
            "Revise the procedure and brief workers on the identified hazard.",
            Administrative, 25.0, 500.0, "1 week", "RSST general obligations",
        ),
        template(
            "Provide task-appropriate PPE",
            "Issue PPE matched to the identified hazard.",
            Ppe, 15.0, 1_000.0, "1 week", "RSST general obligations",
        ),
        template(
            "Increase inspection frequency",
            "Add the location to the inspection round until readings normalize.",
            Monitoring, 10.0, 0.0, "Immediate", "RSST general obligations",
        ),
    ];

    BTreeMap::from([
        (RiskType::TemperatureHigh, temperature_high),
        (RiskType::NoiseHigh, noise_high),
        (RiskType::ChemicalExposure, chemical_exposure),
        (RiskType::ErgonomicRisk, ergonomic_risk),
        (RiskType::GeneralRisk, general_risk),
    ])
}

pub fn default_timelines() -> BTreeMap<RiskLevel, String> {
    BTreeMap::from([
        (
            RiskLevel::Critical,
            "Immediate: emergency measures within 1 hour, permanent controls within 7 days".to_string(),
        ),
        (
            RiskLevel::High,
            "Urgent: interim measures within 24 hours, permanent controls within 30 days".to_string(),
        ),
        (RiskLevel::Medium, "Planned: implement within 7 days".to_string()),
        (RiskLevel::Low, "Scheduled: implement within 30 days".to_string()),
        (RiskLevel::Minimal, "Routine: review at the next planned inspection".to_string()),
    ])
}
