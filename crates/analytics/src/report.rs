use core_types::StrategyId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// The value of one metric: a point statistic or a derived series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Scalar(f64),
    Series(Vec<f64>),
}

impl MetricValue {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            MetricValue::Scalar(v) => Some(*v),
            MetricValue::Series(_) => None,
        }
    }

    /// Scalars must be finite; series may contain anything.
    pub fn is_finite(&self) -> bool {
        match self {
            MetricValue::Scalar(v) => v.is_finite(),
            MetricValue::Series(_) => true,
        }
    }
}

/// The metrics computed for one strategy. `None` marks a metric that failed
/// and serializes as `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricResult(BTreeMap<String, Option<MetricValue>>);

impl MetricResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Option<MetricValue>) {
        self.0.insert(name.into(), value);
    }

    /// `None` when the metric is absent, `Some(None)` when it failed.
    pub fn get(&self, name: &str) -> Option<&Option<MetricValue>> {
        self.0.get(name)
    }

    pub fn scalar(&self, name: &str) -> Option<f64> {
        self.0.get(name)?.as_ref()?.as_scalar()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Option<MetricValue>)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.0.values().filter(|v| v.is_some()).count()
    }

    pub fn failed(&self) -> usize {
        self.0.values().filter(|v| v.is_none()).count()
    }

    /// Adds every entry of `other`; entries of `other` win on collision.
    pub fn merge(&mut self, other: MetricResult) {
        self.0.extend(other.0);
    }

    /// The same result with every key prefixed, e.g. `oos_` for out-of-sample columns.
    pub fn prefixed(&self, prefix: &str) -> MetricResult {
        MetricResult(
            self.0
                .iter()
                .map(|(k, v)| (format!("{prefix}{k}"), v.clone()))
                .collect(),
        )
    }

    /// Flattens the numeric fields of a backtest `stats` object.
    ///
    /// Non-numeric fields are skipped; nested objects are not descended into.
    pub fn from_stats(stats: &Value) -> MetricResult {
        let mut result = MetricResult::new();
        if let Value::Object(map) = stats {
            for (key, value) in map {
                if let Some(number) = value.as_f64() {
                    result.insert(key.clone(), Some(MetricValue::Scalar(number)));
                } else if value.is_null() {
                    result.insert(key.clone(), None);
                }
            }
        }
        result
    }
}

impl FromIterator<(String, Option<MetricValue>)> for MetricResult {
    fn from_iter<I: IntoIterator<Item = (String, Option<MetricValue>)>>(iter: I) -> Self {
        MetricResult(iter.into_iter().collect())
    }
}

/// Per-strategy union of two result maps; `b` wins on metric-name collision.
pub fn merge_results(
    a: BTreeMap<StrategyId, MetricResult>,
    b: BTreeMap<StrategyId, MetricResult>,
) -> BTreeMap<StrategyId, MetricResult> {
    let mut merged = a;
    for (id, result) in b {
        merged.entry(id).or_default().merge(result);
    }
    merged
}

/// Success and failure counts for one batch run. Logged, never part of the output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub strategies: usize,
    pub skipped: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn record(&mut self, result: &MetricResult) {
        self.strategies += 1;
        self.succeeded += result.succeeded();
        self.failed += result.failed();
    }
}

/// One row of a [`MetricsTable`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsRow {
    pub id: StrategyId,
    pub name: Option<String>,
    pub values: Vec<Option<MetricValue>>,
}

/// Strategy × metric matrix, ready for rendering or serialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsTable {
    pub columns: Vec<String>,
    pub rows: Vec<MetricsRow>,
}

impl MetricsTable {
    /// Builds rows in the order of `names` for every id that has a result.
    /// Columns are the sorted union of the metric names; missing cells are `None`.
    pub fn from_results(
        names: &[(StrategyId, Option<String>)],
        results: &BTreeMap<StrategyId, MetricResult>,
    ) -> Self {
        let columns: Vec<String> = results
            .values()
            .flat_map(|r| r.keys().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let rows = names
            .iter()
            .filter_map(|(id, name)| {
                let Some(result) = results.get(id) else {
                    tracing::debug!(symphony = %id, "No metrics for symphony, leaving it out of the table");
                    return None;
                };
                let values = columns
                    .iter()
                    .map(|c| result.get(c).cloned().flatten())
                    .collect();
                Some(MetricsRow { id: id.clone(), name: name.clone(), values })
            })
            .collect();

        Self { columns, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
