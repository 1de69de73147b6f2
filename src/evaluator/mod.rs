//! Rule Evaluator
//!
//! Pure mapping from (rule, metrics snapshot) to a [`RuleResult`]. The only
//! ambient input is the snapshot's reference time, used to pick the calendar
//! month for `MONTH_MAX` / `MONTH_CYCLE` rules.
//!
//! ## Month tables
//!
//! | Month | MONTH_MAX ceiling | MONTH_CYCLE minimum |
//! |-------|-------------------|---------------------|
//! | Jan–Apr | 18 | 14 |
//! | May | 19 | 21 |
//! | Jun | 16 | 21 |
//! | Jul–Aug | 15 | 21 |
//! | Sep | 18 | 21 |
//! | Oct | 18 | 21 |
//! | Nov–Dec | 18 | 14 |

pub mod metrics;

use chrono::Datelike;
use tracing::warn;

use crate::types::{Comparison, MetricsSnapshot, RuleDescriptor, RuleResult, ValueSource};

/// Message for a passing rule
pub const WITHIN_SPEC: &str = "Within spec";

/// Ceiling applied by `MONTH_MAX` for a calendar month (1-12).
pub fn month_ceiling(month: u32) -> f64 {
    match month {
        5 => 19.0,
        6 => 16.0,
        7 | 8 => 15.0,
        // September shares the default ceiling
        _ => 18.0,
    }
}

/// Minimum applied by `MONTH_CYCLE` for a calendar month (1-12).
pub fn month_minimum(month: u32) -> f64 {
    match month {
        5..=10 => 21.0,
        _ => 14.0,
    }
}

/// Check a value against a resolved comparison.
pub fn compare(comparison: Comparison, value: f64, month: u32) -> bool {
    match comparison {
        Comparison::AtLeast(low) => value >= low,
        Comparison::AtMost(high) => value <= high,
        Comparison::Below(high) => value < high,
        Comparison::Within { low, high } => value >= low && value <= high,
        Comparison::MonthlyCeiling => value <= month_ceiling(month),
        Comparison::MonthlyMinimum => value >= month_minimum(month),
        Comparison::Permissive => true,
    }
}

/// Rule evaluator with its missing-metric policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct Evaluator {
    /// Fail rules whose metric is neither reported nor derivable
    /// instead of comparing against 0.
    pub strict_missing_metrics: bool,
}

impl Evaluator {
    pub fn new(strict_missing_metrics: bool) -> Self {
        Self { strict_missing_metrics }
    }

    /// Evaluate one rule against a snapshot.
    pub fn evaluate(&self, rule: &RuleDescriptor, snapshot: &MetricsSnapshot) -> RuleResult {
        let (value, source) = metrics::resolve(&rule.metric, snapshot);

        if source == ValueSource::Defaulted {
            warn!(
                rule_id = %rule.rule_id,
                metric = %rule.metric,
                strict = self.strict_missing_metrics,
                "Metric not reported and not derivable"
            );
            if self.strict_missing_metrics {
                return RuleResult {
                    rule: rule.clone(),
                    value,
                    passed: false,
                    message: format!("Missing metric · {}", rule.metric),
                    source,
                };
            }
        }

        let passed = compare(rule.comparison(), value, snapshot.reference_time.month());
        let message = if passed {
            WITHIN_SPEC.to_string()
        } else {
            format!("Out of spec · {}", rule.allowed_range_label)
        };

        RuleResult {
            rule: rule.clone(),
            value,
            passed,
            message,
            source,
        }
    }

    /// Evaluate every rule in order.
    pub fn evaluate_all<'a, I>(&self, rules: I, snapshot: &MetricsSnapshot) -> Vec<RuleResult>
    where
        I: IntoIterator<Item = &'a RuleDescriptor>,
    {
        rules.into_iter().map(|r| self.evaluate(r, snapshot)).collect()
    }
}

/// Evaluate with the default (lenient) missing-metric policy.
pub fn evaluate(rule: &RuleDescriptor, snapshot: &MetricsSnapshot) -> RuleResult {
    Evaluator::default().evaluate(rule, snapshot)
}
