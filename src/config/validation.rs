//! Config validation: unknown-key detection with Levenshtein suggestions
//! and consistency checks across the lookup tables.
//!
//! Two-pass parse approach: the raw TOML is first read into `toml::Value`,
//! its key tree walked and compared against known key patterns, and a warning
//! with a "did you mean?" suggestion is emitted for every unknown key. Serde
//! deserialization then runs as normal. Warnings never break a config.
//!
//! Sections keyed by sensor type, unit or risk type accept any key; those
//! path segments are written as `*` in the pattern list.

use super::pipeline_config::{normalize_key, Conversion, PipelineConfig};

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Dotted key patterns accepted in a pipeline config file.
///
/// Must track the struct hierarchy in pipeline_config.rs.
pub fn known_key_patterns() -> &'static [&'static str] {
    &[
        // [perception]
        "perception",
        "perception.critical_margin_fraction",
        "perception.thresholds",
        "perception.thresholds.*",
        "perception.thresholds.*.min",
        "perception.thresholds.*.max",
        "perception.thresholds.*.unit",
        "perception.advisories",
        "perception.advisories.*",
        "perception.advisories.*.warning",
        "perception.advisories.*.critical",
        // [normalization]
        "normalization",
        "normalization.auto_reject",
        "normalization.implausible_range_factor",
        "normalization.out_of_range_penalty_cap",
        "normalization.central_band_fraction",
        "normalization.central_band_bonus",
        "normalization.zero_value_penalty",
        "normalization.conversions",
        "normalization.conversions.*",
        "normalization.conversions.*.si_unit",
        "normalization.conversions.*.conversion",
        "normalization.conversions.*.conversion.kind",
        "normalization.conversions.*.conversion.factor",
        "normalization.conversions.*.conversion.scale",
        "normalization.conversions.*.conversion.offset",
        "normalization.valid_ranges",
        "normalization.valid_ranges.*",
        "normalization.valid_ranges.*.min",
        "normalization.valid_ranges.*.max",
        "normalization.valid_ranges.*.zero_plausible",
        // [analysis]
        "analysis",
        "analysis.window_size",
        "analysis.min_samples",
        "analysis.anomaly_sensitivity",
        "analysis.min_std_floor",
        "analysis.trend_window",
        "analysis.trend_slope_threshold",
        "analysis.trend_strength_divisor",
        "analysis.alert_threshold",
        "analysis.regulatory",
        "analysis.regulatory.*",
        "analysis.regulatory.*.min",
        "analysis.regulatory.*.max",
        "analysis.regulatory.*.critical",
        "analysis.regulatory.*.critical_low",
        "analysis.regulatory.*.unit",
        "analysis.regulatory.*.regulation",
        "analysis.hazard_categories",
        "analysis.hazard_categories.*",
        // [recommendation]
        "recommendation",
        "recommendation.min_risk_score",
        "recommendation.max_recommendations",
        "recommendation.diminishing_returns_factor",
        "recommendation.max_total_risk_reduction",
        "recommendation.templates",
        "recommendation.templates.*",
        "recommendation.templates.*.title",
        "recommendation.templates.*.description",
        "recommendation.templates.*.action_type",
        "recommendation.templates.*.risk_reduction",
        "recommendation.templates.*.estimated_cost",
        "recommendation.templates.*.estimated_duration",
        "recommendation.templates.*.regulatory_reference",
        "recommendation.timelines",
        "recommendation.timelines.*",
        // [orchestrator]
        "orchestrator",
        "orchestrator.continue_on_failure",
        "orchestrator.history_capacity",
        "orchestrator.notify_min_risk_level",
    ]
}

/// Whether a dotted key matches a pattern segment-by-segment.
fn matches_pattern(key: &[&str], pattern: &str) -> bool {
    let parts: Vec<&str> = pattern.split('.').collect();
    parts.len() == key.len()
        && parts
            .iter()
            .zip(key)
            .all(|(p, k)| *p == "*" || p == k)
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects every key path as
/// segments. Arrays of tables contribute their element keys under the
/// array's own path.
///
/// For example, a table `{ a = { b = 1, c = 2 } }` yields:
/// `[["a"], ["a", "b"], ["a", "c"]]`
pub fn walk_toml_keys(value: &toml::Value, prefix: &[String]) -> Vec<Vec<String>> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let mut path = prefix.to_vec();
            path.push(k.clone());
            keys.push(path.clone());
            match v {
                toml::Value::Table(_) => keys.extend(walk_toml_keys(v, &path)),
                toml::Value::Array(items) => {
                    for item in items.iter().filter(|i| i.is_table()) {
                        keys.extend(walk_toml_keys(item, &path));
                    }
                }
                _ => {}
            }
        }
    }
    keys.dedup();
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

/// Compute the Levenshtein edit distance between two strings (by chars).
fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let a_len = a.chars().count();
    let b_len = b_chars.len();
    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_len]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
///
/// Wildcard segments are filled with the unknown key's own segment so map
/// entries only compete on their field names.
pub fn suggest_correction(unknown: &[&str], patterns: &[&str]) -> Option<String> {
    let unknown_joined = unknown.join(".");
    let mut best: Option<(String, usize)> = None;
    for pattern in patterns {
        let candidate: Vec<&str> = pattern
            .split('.')
            .enumerate()
            .map(|(i, p)| if p == "*" { unknown.get(i).copied().unwrap_or(p) } else { p })
            .collect();
        let candidate = candidate.join(".");
        let dist = levenshtein(&unknown_joined, &candidate);
        if dist <= 3 && best.as_ref().map_or(true, |(_, d)| dist < *d) {
            best = Some((candidate, dist));
        }
    }
    best.map(|(k, _)| k)
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// This does NOT fail on unknown keys; it only warns.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // parse errors are handled by serde later
    };

    let patterns = known_key_patterns();
    let mut warnings = Vec::new();

    for key in walk_toml_keys(&value, &[]) {
        let segments: Vec<&str> = key.iter().map(String::as_str).collect();
        if patterns.iter().any(|p| matches_pattern(&segments, p)) {
            continue;
        }
        let field = segments.join(".");
        warnings.push(ValidationWarning {
            message: format!("Unknown config key '{field}'"),
            suggestion: suggest_correction(&segments, patterns),
            field,
        });
    }

    warnings
}

// ============================================================================
// Table Consistency
// ============================================================================

/// Cross-table checks on a parsed config. Everything reported here is
/// suspicious but not fatal.
pub fn validate_table_consistency(config: &PipelineConfig) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    let a = &config.analysis;
    if !(1.0..=6.0).contains(&a.anomaly_sensitivity) {
        warnings.push(ValidationWarning {
            field: "analysis.anomaly_sensitivity".to_string(),
            message: format!(
                "anomaly_sensitivity = {:.2} is outside the typical range (1-6 sigma)",
                a.anomaly_sensitivity
            ),
            suggestion: None,
        });
    }

    if a.alert_threshold < config.recommendation.min_risk_score {
        warnings.push(ValidationWarning {
            field: "analysis.alert_threshold".to_string(),
            message: format!(
                "alert_threshold ({:.1}) is below recommendation.min_risk_score ({:.1}); \
                 some analyses will request recommendations that are never produced",
                a.alert_threshold, config.recommendation.min_risk_score
            ),
            suggestion: None,
        });
    }

    for sensor in a.regulatory.keys() {
        if !config.normalization.valid_ranges.contains_key(sensor) {
            warnings.push(ValidationWarning {
                field: format!("normalization.valid_ranges.{sensor}"),
                message: format!(
                    "sensor type '{sensor}' has regulatory limits but no valid range; \
                     its observations are never quality-graded"
                ),
                suggestion: None,
            });
        }
    }

    // Converting an already-SI value must be a no-op
    let conversions = &config.normalization.conversions;
    for (unit, entry) in conversions {
        let si_key = normalize_key(&entry.si_unit);
        let si_is_identity = conversions
            .get(&si_key)
            .is_some_and(|si| si.conversion == Conversion::Identity && si.si_unit == entry.si_unit);
        if !si_is_identity {
            warnings.push(ValidationWarning {
                field: format!("normalization.conversions.{unit}"),
                message: format!(
                    "SI unit '{}' of '{unit}' has no identity entry in the conversion table",
                    entry.si_unit
                ),
                suggestion: None,
            });
        }
    }

    warnings
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_identical() {
        assert_eq!(levenshtein("hello", "hello"), 0);
    }

    #[test]
    fn test_levenshtein_one_edit() {
        assert_eq!(levenshtein("sensitivty", "sensitivity"), 1);
    }

    #[test]
    fn test_levenshtein_counts_chars_not_bytes() {
        assert_eq!(levenshtein("°c", "c"), 1);
        assert_eq!(levenshtein("", "m/s²"), 4);
    }

    #[test]
    fn test_wildcard_pattern_matching() {
        assert!(matches_pattern(&["analysis", "regulatory", "noise", "max"], "analysis.regulatory.*.max"));
        assert!(!matches_pattern(&["analysis", "regulatory", "noise", "maxx"], "analysis.regulatory.*.max"));
        assert!(!matches_pattern(&["analysis", "regulatory"], "analysis.regulatory.*"));
    }

    #[test]
    fn test_walk_toml_keys_descends_template_arrays() {
        let toml: toml::Value = r#"
            [[recommendation.templates.noise_high]]
            title = "Enclose compressor"
            action_type = "engineering"
            risk_reduction = 60.0
        "#
        .parse()
        .unwrap();
        let keys: Vec<String> = walk_toml_keys(&toml, &[]).iter().map(|k| k.join(".")).collect();
        assert!(keys.contains(&"recommendation.templates.noise_high".to_string()));
        assert!(keys.contains(&"recommendation.templates.noise_high.title".to_string()));
    }

    #[test]
    fn test_valid_config_has_no_unknown_keys() {
        let warnings = validate_unknown_keys(
            r#"
            [analysis]
            window_size = 50

            [analysis.regulatory.noise]
            max = 85.0
            critical = 100.0
            regulation = "Local noise bylaw"

            [normalization.conversions."°f"]
            si_unit = "°C"
            conversion = { kind = "affine", scale = 0.5555, offset = -17.7778 }
        "#,
        );
        assert!(warnings.is_empty(), "unexpected: {warnings:?}");
    }

    #[test]
    fn test_typo_gets_suggestion() {
        let warnings = validate_unknown_keys(
            r#"
            [analysis]
            anomaly_sensitivty = 2.5
        "#,
        );
        assert_eq!(warnings.len(), 1);
        assert_eq!(
            warnings[0].suggestion.as_deref(),
            Some("analysis.anomaly_sensitivity")
        );
    }

    #[test]
    fn test_typo_inside_map_entry_keeps_entry_name() {
        let warnings = validate_unknown_keys(
            r#"
            [analysis.regulatory.humidity]
            maxx = 70.0
        "#,
        );
        assert_eq!(warnings.len(), 1);
        assert_eq!(
            warnings[0].suggestion.as_deref(),
            Some("analysis.regulatory.humidity.max")
        );
    }

    #[test]
    fn test_unknown_section_without_close_match() {
        let warnings = validate_unknown_keys("[dashboard]\nport = 8080\n");
        assert!(warnings.iter().any(|w| w.field == "dashboard"));
        assert!(warnings.iter().all(|w| w.suggestion.is_none()));
    }

    #[test]
    fn test_default_tables_are_consistent() {
        let warnings = validate_table_consistency(&PipelineConfig::default());
        assert!(warnings.is_empty(), "unexpected: {warnings:?}");
    }

    #[test]
    fn test_missing_si_identity_is_flagged() {
        let mut config = PipelineConfig::default();
        config.normalization.conversions.remove("pa");
        let warnings = validate_table_consistency(&config);
        assert!(warnings.iter().any(|w| w.field == "normalization.conversions.kpa"));
    }
}
