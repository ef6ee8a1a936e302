//! Threshold alert rules evaluated against a metric provider.
//!
//! The engine knows nothing about how a metric is computed: the caller hands
//! in a provider that resolves a rule to a current scalar value (or absent).
//! One evaluation pass produces at most one event per rule; a failing rule
//! never aborts the rest of the pass.

use crate::model::{current_timestamp_ms, SymbolPair};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Which signal a rule watches, with the parameters that signal needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "metric", rename_all = "snake_case")]
pub enum Metric {
    Price { symbol: String },
    Spread { pair: SymbolPair, window: usize },
    Zscore { pair: SymbolPair, window: usize },
    RollingCorr { pair: SymbolPair, window: usize },
    Adf { pair: SymbolPair, window: usize },
}

impl Metric {
    pub fn name(&self) -> &'static str {
        match self {
            Metric::Price { .. } => "price",
            Metric::Spread { .. } => "spread",
            Metric::Zscore { .. } => "zscore",
            Metric::RollingCorr { .. } => "rolling_corr",
            Metric::Adf { .. } => "adf",
        }
    }

    /// The symbol or `LEFT:RIGHT` pair the rule applies to.
    pub fn symbol_label(&self) -> String {
        match self {
            Metric::Price { symbol } => symbol.clone(),
            Metric::Spread { pair, .. }
            | Metric::Zscore { pair, .. }
            | Metric::RollingCorr { pair, .. }
            | Metric::Adf { pair, .. } => pair.label(),
        }
    }

    pub fn window(&self) -> Option<usize> {
        match self {
            Metric::Price { .. } => None,
            Metric::Spread { window, .. }
            | Metric::Zscore { window, .. }
            | Metric::RollingCorr { window, .. }
            | Metric::Adf { window, .. } => Some(*window),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "==")]
    Eq,
}

impl Comparison {
    pub fn as_str(&self) -> &'static str {
        match self {
            Comparison::Gt => ">",
            Comparison::Lt => "<",
            Comparison::Ge => ">=",
            Comparison::Le => "<=",
            Comparison::Eq => "==",
        }
    }

    /// Non-finite values never match, regardless of operator.
    pub fn matches(&self, value: f64, threshold: f64) -> bool {
        if !value.is_finite() || !threshold.is_finite() {
            return false;
        }
        match self {
            Comparison::Gt => value > threshold,
            Comparison::Lt => value < threshold,
            Comparison::Ge => value >= threshold,
            Comparison::Le => value <= threshold,
            Comparison::Eq => value == threshold,
        }
    }
}

/// Operator-defined predicate over a metric. `id` is immutable once assigned;
/// all other fields may change between evaluation cycles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub metric: Metric,
    pub comparison: Comparison,
    pub threshold: f64,
    pub enabled: bool,
}

impl AlertRule {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        metric: Metric,
        comparison: Comparison,
        threshold: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            metric,
            comparison,
            threshold,
            enabled: true,
        }
    }
}

/// One firing of a rule. Append-only; never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub rule_id: String,
    pub rule_name: String,
    pub metric: String,
    pub symbol: String,
    pub ts_ms: i64,
    pub value: f64,
    pub comparison: Comparison,
    pub threshold: f64,
    pub message: String,
}

/// Evaluate every enabled rule against `provider`, collecting one event per
/// rule whose predicate holds.
///
/// The provider returns `Ok(None)` when the metric is currently unavailable
/// (not an error) and `Err` when resolution itself failed; either way the
/// remaining rules are still evaluated.
pub fn evaluate_rules<F>(rules: &[AlertRule], mut provider: F) -> Vec<AlertEvent>
where
    F: FnMut(&AlertRule) -> Result<Option<f64>, Box<dyn std::error::Error>>,
{
    let mut events = Vec::new();
    for rule in rules {
        if !rule.enabled {
            continue;
        }
        let value = match provider(rule) {
            Ok(Some(value)) => value,
            Ok(None) => continue,
            Err(e) => {
                log::warn!("⚠️  Error evaluating rule '{}': {}", rule.name, e);
                continue;
            }
        };
        if rule.comparison.matches(value, rule.threshold) {
            events.push(AlertEvent {
                rule_id: rule.id.clone(),
                rule_name: rule.name.clone(),
                metric: rule.metric.name().to_string(),
                symbol: rule.metric.symbol_label(),
                ts_ms: current_timestamp_ms(),
                value,
                comparison: rule.comparison,
                threshold: rule.threshold,
                message: format!(
                    "{} {:.6} {} {:.6}",
                    rule.metric.name(),
                    value,
                    rule.comparison.as_str(),
                    rule.threshold
                ),
            });
        }
    }
    events
}

/// Fixed-capacity most-recent-N event retention.
#[derive(Debug)]
pub struct AlertLog {
    events: VecDeque<AlertEvent>,
    capacity: usize,
}

impl AlertLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, event: AlertEvent) {
        while self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn extend(&mut self, events: Vec<AlertEvent>) {
        for event in events {
            self.push(event);
        }
    }

    /// Oldest-first iteration over retained events.
    pub fn events(&self) -> impl Iterator<Item = &AlertEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
