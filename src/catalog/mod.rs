//! Rule Catalog
//!
//! Holds the declarative threshold rules. The catalog is loaded once from a
//! [`CatalogSource`]; later `load()` calls return the cached set. The current
//! rule set is published through an `ArcSwapOption`, so readers never block
//! while an operator patch is being applied.
//!
//! Loading is all-or-nothing: a document that fails to parse or fails
//! validation leaves the catalog unloaded.

mod source;

pub use source::{CatalogSource, FileCatalogSource, StaticCatalogSource, BUILTIN_RULES_JSON};

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwapOption;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::types::{ConditionOperator, MetricKey, ProcessStage, RuleDescriptor, RulePatch};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Rule catalog unavailable ({origin}): {reason}")]
    Unavailable { origin: String, reason: String },

    #[error("Rule catalog schema error ({origin}): {error}")]
    Schema {
        origin: String,
        error: serde_json::Error,
    },

    #[error("Rule catalog validation failed: {}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error("Rule catalog not loaded")]
    NotInitialized,

    #[error("Unknown rule: {0}")]
    UnknownRule(String),

    #[error("Patch for rule {rule_id} rejected: {}", .reasons.join("; "))]
    InvalidPatch { rule_id: String, reasons: Vec<String> },
}

// ============================================================================
// Validation
// ============================================================================

/// Check a single descriptor, returning every problem found.
pub fn validate_rule(rule: &RuleDescriptor) -> Vec<String> {
    let mut errors = Vec::new();
    let id = &rule.rule_id;

    if id.trim().is_empty() {
        errors.push("ruleId must not be empty".to_string());
    }
    if rule.metric.as_str().trim().is_empty() {
        errors.push(format!("{id}: metric must not be empty"));
    }
    for (name, value) in [("thresholdLow", rule.threshold_low), ("thresholdHigh", rule.threshold_high)] {
        if let Some(v) = value {
            if !v.is_finite() {
                errors.push(format!("{id}: {name} must be finite (got {v})"));
            }
        }
    }
    if let (Some(low), Some(high)) = (rule.threshold_low, rule.threshold_high) {
        if low > high {
            errors.push(format!(
                "{id}: thresholdLow ({low}) must be <= thresholdHigh ({high})"
            ));
        }
    }
    errors
}

/// Validate a whole catalog: per-rule checks plus `ruleId` uniqueness.
pub fn validate_rules(rules: &[RuleDescriptor]) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    for rule in rules {
        errors.extend(validate_rule(rule));
        if !seen.insert(rule.rule_id.as_str()) {
            errors.push(format!("duplicate ruleId '{}'", rule.rule_id));
        }
    }
    errors
}

/// Parse and validate a catalog document.
pub fn parse_catalog(raw: &str, origin: &str) -> Result<Vec<RuleDescriptor>, CatalogError> {
    let rules: Vec<RuleDescriptor> =
        serde_json::from_str(raw).map_err(|error| CatalogError::Schema {
            origin: origin.to_string(),
            error,
        })?;

    let errors = validate_rules(&rules);
    if !errors.is_empty() {
        return Err(CatalogError::Invalid(errors));
    }

    for rule in &rules {
        if let ConditionOperator::Unrecognized(ref op) = rule.condition_operator {
            warn!(rule_id = %rule.rule_id, operator = %op, "Unrecognized operator, rule will always pass");
        }
        if let MetricKey::Other(ref name) = rule.metric {
            debug!(rule_id = %rule.rule_id, metric = %name, "Metric outside derivation table, must be reported");
        }
    }

    Ok(rules)
}

// ============================================================================
// Rule Catalog
// ============================================================================

/// Loaded-once, patchable table of rule descriptors.
pub struct RuleCatalog {
    source: Box<dyn CatalogSource>,
    rules: ArcSwapOption<Vec<RuleDescriptor>>,
    /// Serializes concurrent first loads so the source is fetched once
    load_lock: tokio::sync::Mutex<()>,
    /// Serializes patches
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for RuleCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleCatalog")
            .field("source", &self.source.source_name())
            .field("loaded", &self.is_loaded())
            .field("rules", &self.rules.load_full().map(|r| r.len()))
            .finish()
    }
}

impl RuleCatalog {
    /// Create an unloaded catalog backed by `source`.
    pub fn new(source: impl CatalogSource) -> Self {
        Self {
            source: Box::new(source),
            rules: ArcSwapOption::empty(),
            load_lock: tokio::sync::Mutex::new(()),
            write_lock: Mutex::new(()),
        }
    }

    /// Unloaded catalog over the bundled rules.
    pub fn builtin() -> Self {
        Self::new(StaticCatalogSource::builtin())
    }

    /// Catalog that is already loaded with `rules` (validated).
    pub fn from_rules(rules: Vec<RuleDescriptor>) -> Result<Self, CatalogError> {
        let errors = validate_rules(&rules);
        if !errors.is_empty() {
            return Err(CatalogError::Invalid(errors));
        }
        let catalog = Self::new(StaticCatalogSource::new("inline", "[]"));
        catalog.rules.store(Some(Arc::new(rules)));
        Ok(catalog)
    }

    /// Load the catalog from its source. Idempotent: once loaded, the cached
    /// set is returned without fetching again.
    pub async fn load(&self) -> Result<Arc<Vec<RuleDescriptor>>, CatalogError> {
        if let Some(rules) = self.rules.load_full() {
            return Ok(rules);
        }

        let _guard = self.load_lock.lock().await;
        if let Some(rules) = self.rules.load_full() {
            return Ok(rules);
        }

        let origin = self.source.source_name().to_string();
        let raw = self.source.fetch().await.map_err(|e| {
            warn!(source = %origin, error = %e, "Rule catalog fetch failed");
            e
        })?;
        let rules = Arc::new(parse_catalog(&raw, &origin)?);
        self.rules.store(Some(Arc::clone(&rules)));

        info!(source = %origin, rules = rules.len(), "Rule catalog loaded");
        Ok(rules)
    }

    pub fn is_loaded(&self) -> bool {
        self.rules.load().is_some()
    }

    /// Current rule set. Fails with `NotInitialized` before `load()`.
    pub fn rules(&self) -> Result<Arc<Vec<RuleDescriptor>>, CatalogError> {
        self.rules.load_full().ok_or(CatalogError::NotInitialized)
    }

    /// Rules belonging to one process stage, in catalog order.
    pub fn rules_for_stage(&self, stage: ProcessStage) -> Result<Vec<RuleDescriptor>, CatalogError> {
        Ok(self
            .rules()?
            .iter()
            .filter(|r| r.process_stage == stage)
            .cloned()
            .collect())
    }

    /// Look up a rule by id.
    pub fn get(&self, rule_id: &str) -> Result<Option<RuleDescriptor>, CatalogError> {
        Ok(self.rules()?.iter().find(|r| r.rule_id == rule_id).cloned())
    }

    /// Apply a shallow merge to one rule.
    ///
    /// Unknown `rule_id`s are ignored (logged at debug) and the unchanged set
    /// is returned. A patch that would make the rule invalid is rejected.
    pub fn patch(
        &self,
        rule_id: &str,
        patch: &RulePatch,
    ) -> Result<Arc<Vec<RuleDescriptor>>, CatalogError> {
        match self.try_patch(rule_id, patch) {
            Err(CatalogError::UnknownRule(id)) => {
                debug!(rule_id = %id, "Patch for unknown rule ignored");
                self.rules()
            }
            other => other,
        }
    }

    /// Strict variant of [`patch`](Self::patch): unknown ids are an error.
    pub fn try_patch(
        &self,
        rule_id: &str,
        patch: &RulePatch,
    ) -> Result<Arc<Vec<RuleDescriptor>>, CatalogError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.rules()?;

        let index = current
            .iter()
            .position(|r| r.rule_id == rule_id)
            .ok_or_else(|| CatalogError::UnknownRule(rule_id.to_string()))?;

        let mut updated = current.as_ref().clone();
        updated[index].apply(patch);

        let reasons = validate_rule(&updated[index]);
        if !reasons.is_empty() {
            return Err(CatalogError::InvalidPatch {
                rule_id: rule_id.to_string(),
                reasons,
            });
        }

        let updated = Arc::new(updated);
        self.rules.store(Some(Arc::clone(&updated)));
        info!(rule_id = %rule_id, "Rule patched");
        Ok(updated)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Severity;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        fetches: Arc<AtomicUsize>,
        json: String,
    }

    #[async_trait]
    impl CatalogSource for CountingSource {
        async fn fetch(&self) -> Result<String, CatalogError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.json.clone())
        }

        fn source_name(&self) -> &str {
            "counting"
        }
    }

    struct BrokenSource;

    #[async_trait]
    impl CatalogSource for BrokenSource {
        async fn fetch(&self) -> Result<String, CatalogError> {
            Err(CatalogError::Unavailable {
                origin: "broken".to_string(),
                reason: "connection refused".to_string(),
            })
        }

        fn source_name(&self) -> &str {
            "broken"
        }
    }

    #[tokio::test]
    async fn test_builtin_catalog_loads() {
        let catalog = RuleCatalog::builtin();
        let rules = catalog.load().await.expect("builtin catalog must be valid");
        assert!(!rules.is_empty());
        for stage in ProcessStage::ALL {
            assert!(
                rules.iter().any(|r| r.process_stage == stage),
                "builtin catalog has no rules for {stage}"
            );
        }
    }

    #[tokio::test]
    async fn test_load_is_idempotent() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let catalog = RuleCatalog::new(CountingSource {
            fetches: Arc::clone(&fetches),
            json: BUILTIN_RULES_JSON.to_string(),
        });
        let first = catalog.load().await.expect("load");
        let second = catalog.load().await.expect("load");
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_unavailable_source_leaves_catalog_unloaded() {
        let catalog = RuleCatalog::new(BrokenSource);
        let err = catalog.load().await.expect_err("broken source must fail");
        assert!(matches!(err, CatalogError::Unavailable { .. }));
        assert!(matches!(catalog.rules(), Err(CatalogError::NotInitialized)));
    }

    #[tokio::test]
    async fn test_partial_catalog_rejected() {
        // Second entry is missing required fields
        let json = r#"[
            {"ruleId":"A","processStage":"curing","metric":"curing_days","conditionOperator":"MONTH_CYCLE",
             "allowedRangeLabel":"x","severity":"LOW","alarmType":"X","description":"x"},
            {"ruleId":"B","processStage":"curing"}
        ]"#;
        let catalog = RuleCatalog::new(StaticCatalogSource::new("partial", json));
        let err = catalog.load().await.expect_err("partial catalog must fail");
        assert!(matches!(err, CatalogError::Schema { .. }));
        assert!(!catalog.is_loaded());
    }

    #[tokio::test]
    async fn test_duplicate_ids_rejected() {
        let json = r#"[
            {"ruleId":"A","processStage":"curing","metric":"curing_days","conditionOperator":"MONTH_CYCLE",
             "allowedRangeLabel":"x","severity":"LOW","alarmType":"X","description":"x"},
            {"ruleId":"A","processStage":"curing","metric":"curing_days","conditionOperator":"MONTH_CYCLE",
             "allowedRangeLabel":"x","severity":"LOW","alarmType":"X","description":"x"}
        ]"#;
        let catalog = RuleCatalog::new(StaticCatalogSource::new("dup", json));
        match catalog.load().await {
            Err(CatalogError::Invalid(errors)) => {
                assert!(errors.iter().any(|e| e.contains("duplicate")));
            }
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_patch_severity_changes_only_target() {
        let catalog = RuleCatalog::builtin();
        let before = catalog.load().await.expect("load");
        let target = before[0].rule_id.clone();

        let after = catalog
            .patch(&target, &RulePatch { severity: Some(Severity::Low), ..Default::default() })
            .expect("patch");

        assert_eq!(after.len(), before.len());
        for (old, new) in before.iter().zip(after.iter()) {
            if old.rule_id == target {
                let mut expected = old.clone();
                expected.severity = Severity::Low;
                assert_eq!(new, &expected);
            } else {
                assert_eq!(new, old);
            }
        }
    }

    #[tokio::test]
    async fn test_patch_unknown_rule_is_noop() {
        let catalog = RuleCatalog::builtin();
        let before = catalog.load().await.expect("load");
        let after = catalog
            .patch("NOPE-999", &RulePatch { severity: Some(Severity::Low), ..Default::default() })
            .expect("unknown rule is ignored");
        assert_eq!(before, after);
        assert!(matches!(
            catalog.try_patch("NOPE-999", &RulePatch::default()),
            Err(CatalogError::UnknownRule(_))
        ));
    }

    #[tokio::test]
    async fn test_patch_rejects_inverted_thresholds() {
        let catalog = RuleCatalog::builtin();
        let rules = catalog.load().await.expect("load");
        let between = rules
            .iter()
            .find(|r| r.threshold_low.is_some() && r.threshold_high.is_some())
            .expect("builtin has a two-sided rule");
        let err = catalog
            .patch(
                &between.rule_id,
                &RulePatch { threshold_low: Some(Some(1e6)), ..Default::default() },
            )
            .expect_err("inverted thresholds must be rejected");
        assert!(matches!(err, CatalogError::InvalidPatch { .. }));
    }

    #[test]
    fn test_patch_before_load_fails() {
        let catalog = RuleCatalog::builtin();
        assert!(matches!(
            catalog.patch("PLC-001", &RulePatch::default()),
            Err(CatalogError::NotInitialized)
        ));
    }
}
