//! Plant config checks.
//!
//! Unknown keys are only warned about, with a "did you mean" hint drawn from
//! the keys of the same section. Out-of-range values are errors; every one is
//! collected so a single run reports them all.

use super::{defaults, PlantConfig};

/// Accepted fields per TOML section.
///
/// Must follow the fields of `PlantConfig`.
const SECTIONS: &[(&str, &[&str])] = &[
    ("plant", &["name", "blocks", "lifts"]),
    ("catalog", &["path"]),
    ("lifecycle", &["dwell_secs", "auto_advance"]),
    ("lineage", &["batch_pool_size", "reference_path"]),
    ("evaluation", &["strict_missing_metrics"]),
    ("simulation", &["seed"]),
];

/// Hints further than this many edits away are dropped.
const MAX_HINT_DISTANCE: usize = 3;

// ============================================================================
// Unknown Keys
// ============================================================================

/// A key present in the file that `PlantConfig` does not read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownKey {
    /// Dotted path, `section` or `section.field`
    pub key: String,
    /// Closest accepted key, if any is near enough
    pub suggestion: Option<String>,
}

impl std::fmt::Display for UnknownKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Unknown config key '{}'", self.key)?;
        match &self.suggestion {
            Some(hint) => write!(f, " (did you mean '{hint}'?)"),
            None => Ok(()),
        }
    }
}

/// List keys of `doc` that no config section accepts. Unknown sections are
/// reported once, without descending into their fields.
pub fn unknown_keys(doc: &toml::Table) -> Vec<UnknownKey> {
    let mut unknown = Vec::new();
    for (section, value) in doc {
        let Some(&(_, fields)) = SECTIONS.iter().find(|(name, _)| *name == section.as_str()) else {
            unknown.push(UnknownKey {
                key: section.clone(),
                suggestion: nearest(section, SECTIONS.iter().map(|(name, _)| *name)).map(str::to_string),
            });
            continue;
        };
        // A section that is not a table is a type error for serde to report
        let Some(table) = value.as_table() else {
            continue;
        };
        for field in table.keys().filter(|k| !fields.contains(&k.as_str())) {
            unknown.push(UnknownKey {
                key: format!("{section}.{field}"),
                suggestion: nearest(field, fields.iter().copied()).map(|f| format!("{section}.{f}")),
            });
        }
    }
    unknown
}

/// Closest candidate by edit distance; ties go to the alphabetically first.
fn nearest<'a>(word: &str, candidates: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    candidates
        .map(|c| (edit_distance(word, c), c))
        .filter(|&(d, _)| d <= MAX_HINT_DISTANCE)
        .min()
        .map(|(_, c)| c)
}

/// Levenshtein distance over chars, one row at a time.
fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = (above + 1).min(row[j] + 1).min(diagonal + usize::from(ca != cb));
            diagonal = above;
        }
    }
    row[b.len()]
}

// ============================================================================
// Ranges
// ============================================================================

/// Problems found in a parsed config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeReport {
    /// Values the engine cannot run with
    pub errors: Vec<String>,
    /// Accepted but suspicious values
    pub warnings: Vec<String>,
}

pub fn check_ranges(config: &PlantConfig) -> RangeReport {
    let mut report = RangeReport::default();
    let mut error = |ok: bool, message: String| {
        if !ok {
            report.errors.push(message);
        }
    };

    let plant = &config.plant;
    error(plant.blocks > 0, "plant.blocks must be > 0".to_string());
    error(plant.lifts > 0, "plant.lifts must be > 0".to_string());
    error(
        config.cell_count() <= u64::from(defaults::MAX_GRID_CELLS),
        format!(
            "plant.blocks × plant.lifts = {} exceeds the maximum grid of {} cells",
            config.cell_count(),
            defaults::MAX_GRID_CELLS
        ),
    );

    let dwell = config.lifecycle.dwell_secs;
    error(
        dwell.is_finite() && dwell > 0.0,
        format!("lifecycle.dwell_secs must be a positive number (got {dwell})"),
    );
    error(
        config.lineage.batch_pool_size > 0,
        "lineage.batch_pool_size must be > 0".to_string(),
    );
    error(
        config.catalog.path.as_ref().map_or(true, |p| !p.as_os_str().is_empty()),
        "catalog.path must not be empty when set".to_string(),
    );

    if plant.name.trim().is_empty() {
        report.warnings.push("plant.name is empty".to_string());
    }
    if dwell.is_finite() && dwell > defaults::MAX_DWELL_SECS {
        report.warnings.push(format!(
            "lifecycle.dwell_secs = {dwell} is unusually long (> {} s)",
            defaults::MAX_DWELL_SECS
        ));
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> toml::Table {
        text.parse().expect("valid toml")
    }

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("seed", "seed"), 0);
        assert_eq!(edit_distance("dwel_secs", "dwell_secs"), 1);
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("abc", ""), 3);
    }

    #[test]
    fn test_typo_field_suggests_same_section_key() {
        let unknown = unknown_keys(&doc("[lineage]\nbatch_pool_sise = 4\n"));
        assert_eq!(
            unknown,
            vec![UnknownKey {
                key: "lineage.batch_pool_sise".to_string(),
                suggestion: Some("lineage.batch_pool_size".to_string()),
            }]
        );
        assert!(unknown[0].to_string().contains("did you mean 'lineage.batch_pool_size'"));
    }

    #[test]
    fn test_typo_section_suggests_section() {
        let unknown = unknown_keys(&doc("[lineag]\nbatch_pool_size = 4\n"));
        assert_eq!(unknown.len(), 1);
        assert_eq!(unknown[0].suggestion.as_deref(), Some("lineage"));
    }

    #[test]
    fn test_every_known_key_is_accepted() {
        let text = r#"
[plant]
name = "Upper Dam"
blocks = 3
lifts = 5

[catalog]
path = "rules.json"

[lifecycle]
dwell_secs = 1.5
auto_advance = true

[lineage]
batch_pool_size = 4
reference_path = "lineage.json"

[evaluation]
strict_missing_metrics = true

[simulation]
seed = 7
"#;
        assert_eq!(unknown_keys(&doc(text)), Vec::new());
    }

    #[test]
    fn test_unrelated_section_has_no_hint() {
        let unknown = unknown_keys(&doc("[dashboard]\nport = 8080\n"));
        assert_eq!(unknown.len(), 1);
        assert_eq!(unknown[0].key, "dashboard");
        assert!(unknown[0].suggestion.is_none());
    }

    #[test]
    fn test_range_errors_collected() {
        let mut config = PlantConfig::default();
        config.plant.lifts = 0;
        config.lifecycle.dwell_secs = f64::NAN;
        let report = check_ranges(&config);
        assert_eq!(report.errors.len(), 2, "{:?}", report.errors);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_oversized_grid_rejected() {
        let mut config = PlantConfig::default();
        config.plant.blocks = 1_000;
        config.plant.lifts = 1_000;
        assert!(check_ranges(&config).errors.iter().any(|e| e.contains("maximum grid")));
    }

    #[test]
    fn test_long_dwell_is_warning() {
        let mut config = PlantConfig::default();
        config.lifecycle.dwell_secs = 10_000.0;
        let report = check_ranges(&config);
        assert!(report.errors.is_empty());
        assert_eq!(report.warnings.len(), 1);
    }
}
