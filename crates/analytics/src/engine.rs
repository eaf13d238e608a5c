use crate::catalog::{MetricCatalog, MetricDefinition};
use crate::error::AnalyticsError;
use crate::report::{BatchSummary, MetricResult, MetricValue};
use crate::series::{ValueSeries, portfolio_values};
use crate::stats::MetricParams;
use chrono::NaiveDate;
use configuration::{MetricsConfig, OosAlignment};
use core_types::{DailyFrame, StrategyId};
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};

/// Applies the metric catalog to many strategies' portfolio frames.
///
/// The engine holds no state between calls: the same input always produces the
/// same output. Failures are absorbed at two levels. A metric that errors,
/// panics or produces a non-finite number is recorded as `None`; a strategy
/// whose frame cannot yield a value series is left out of the output.
#[derive(Debug, Clone)]
pub struct MetricsEngine {
    catalog: MetricCatalog,
    params: MetricParams,
    oos_alignment: OosAlignment,
}

impl MetricsEngine {
    pub fn new(config: &MetricsConfig) -> Self {
        Self {
            catalog: MetricCatalog::new(config),
            params: MetricParams::from(config),
            oos_alignment: config.oos_alignment,
        }
    }

    pub fn with_catalog(catalog: MetricCatalog, params: MetricParams, oos_alignment: OosAlignment) -> Self {
        Self { catalog, params, oos_alignment }
    }

    pub fn catalog(&self) -> &MetricCatalog {
        &self.catalog
    }

    /// Runs every catalog metric on one value series.
    pub fn evaluate(&self, series: &ValueSeries) -> MetricResult {
        self.catalog
            .iter()
            .map(|definition| (definition.name.to_string(), self.run_metric(definition, series)))
            .collect()
    }

    fn run_metric(&self, definition: &MetricDefinition, series: &ValueSeries) -> Option<MetricValue> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| (definition.function)(series, &self.params)));

        match outcome {
            Ok(Ok(value)) if value.is_finite() => Some(value),
            Ok(Ok(_)) => {
                tracing::debug!(metric = definition.name, "Metric produced a non-finite value");
                None
            }
            Ok(Err(e)) => {
                tracing::debug!(metric = definition.name, error = %e, "Metric failed");
                None
            }
            Err(_) => {
                tracing::warn!(metric = definition.name, "Metric panicked");
                None
            }
        }
    }

    fn evaluate_frame(&self, frame: &DailyFrame) -> Result<MetricResult, AnalyticsError> {
        let series = portfolio_values(frame)?;
        Ok(self.evaluate(&series))
    }

    pub fn compute_metrics(&self, frames: &BTreeMap<StrategyId, DailyFrame>) -> BTreeMap<StrategyId, MetricResult> {
        self.compute_metrics_with_summary(frames).0
    }

    pub fn compute_metrics_with_summary(
        &self,
        frames: &BTreeMap<StrategyId, DailyFrame>,
    ) -> (BTreeMap<StrategyId, MetricResult>, BatchSummary) {
        let mut results = BTreeMap::new();
        let mut summary = BatchSummary::default();

        for (id, frame) in frames {
            match self.evaluate_frame(frame) {
                Ok(result) => {
                    summary.record(&result);
                    results.insert(id.clone(), result);
                }
                Err(e) => {
                    tracing::warn!(symphony = %id, error = %e, "Skipping symphony");
                    summary.skipped += 1;
                }
            }
        }

        tracing::info!(
            strategies = summary.strategies,
            skipped = summary.skipped,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Computed metrics"
        );
        (results, summary)
    }

    /// Metrics over the rows at or after each strategy's out-of-sample start.
    ///
    /// Only strategies present in both maps are considered.
    pub fn compute_oos_metrics(
        &self,
        frames: &BTreeMap<StrategyId, DailyFrame>,
        oos_start: &BTreeMap<StrategyId, NaiveDate>,
    ) -> BTreeMap<StrategyId, MetricResult> {
        self.compute_oos_metrics_with_summary(frames, oos_start).0
    }

    pub fn compute_oos_metrics_with_summary(
        &self,
        frames: &BTreeMap<StrategyId, DailyFrame>,
        oos_start: &BTreeMap<StrategyId, NaiveDate>,
    ) -> (BTreeMap<StrategyId, MetricResult>, BatchSummary) {
        let mut results = BTreeMap::new();
        let mut summary = BatchSummary::default();

        for (id, frame) in frames {
            let Some(start) = oos_start.get(id) else {
                continue;
            };
            let Some(slice) = self.oos_slice(id, frame, *start) else {
                summary.skipped += 1;
                continue;
            };

            match self.evaluate_frame(&slice) {
                Ok(result) => {
                    summary.record(&result);
                    results.insert(id.clone(), result);
                }
                Err(e) => {
                    tracing::warn!(symphony = %id, error = %e, "Skipping out-of-sample metrics");
                    summary.skipped += 1;
                }
            }
        }

        tracing::info!(
            strategies = summary.strategies,
            skipped = summary.skipped,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Computed out-of-sample metrics"
        );
        (results, summary)
    }

    fn oos_slice(&self, id: &StrategyId, frame: &DailyFrame, start: NaiveDate) -> Option<DailyFrame> {
        let position = match self.oos_alignment {
            OosAlignment::Exact => frame.position(start),
            OosAlignment::NextAvailable => {
                let position = frame.index().partition_point(|date| *date < start);
                (position < frame.len()).then_some(position)
            }
        };

        let Some(position) = position else {
            tracing::warn!(symphony = %id, %start, policy = ?self.oos_alignment, "Out-of-sample start not found in series");
            return None;
        };

        let slice = frame.slice_from(position);
        if slice.is_empty() {
            tracing::warn!(symphony = %id, %start, "Out-of-sample slice is empty");
            return None;
        }
        Some(slice)
    }
}

impl Default for MetricsEngine {
    fn default() -> Self {
        Self::new(&MetricsConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DEFINITIONS;
    use crate::stats::MetricOutput;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn capital(values: &[f64]) -> DailyFrame {
        let mut frame = DailyFrame::zeroed(
            ymd(2024, 1, 1),
            ymd(2024, 1, values.len() as u32),
            vec!["capital".to_string()],
        );
        for (i, v) in values.iter().enumerate() {
            frame.set(ymd(2024, 1, i as u32 + 1), 0, *v);
        }
        frame
    }

    fn last_value(series: &ValueSeries, _: &MetricParams) -> MetricOutput {
        series
            .values()
            .last()
            .map(|v| MetricValue::Scalar(*v))
            .ok_or(AnalyticsError::EmptySeries)
    }

    fn first_value(series: &ValueSeries, _: &MetricParams) -> MetricOutput {
        series
            .values()
            .first()
            .map(|v| MetricValue::Scalar(*v))
            .ok_or(AnalyticsError::EmptySeries)
    }

    fn count(series: &ValueSeries, _: &MetricParams) -> MetricOutput {
        Ok(MetricValue::Scalar(series.len() as f64))
    }

    fn always_fails(_: &ValueSeries, _: &MetricParams) -> MetricOutput {
        Err(AnalyticsError::Calculation("broken".into()))
    }

    fn panics(_: &ValueSeries, _: &MetricParams) -> MetricOutput {
        panic!("metric bug")
    }

    fn infinite(_: &ValueSeries, _: &MetricParams) -> MetricOutput {
        Ok(MetricValue::Scalar(f64::INFINITY))
    }

    fn engine(definitions: &[MetricDefinition], alignment: OosAlignment) -> MetricsEngine {
        MetricsEngine::with_catalog(
            MetricCatalog::from_definitions(definitions, &[]),
            MetricParams::default(),
            alignment,
        )
    }

    fn probe_engine() -> MetricsEngine {
        engine(
            &[
                MetricDefinition::scalar("count", count),
                MetricDefinition::scalar("first", first_value),
                MetricDefinition::scalar("last", last_value),
            ],
            OosAlignment::Exact,
        )
    }

    fn id(s: &str) -> StrategyId {
        StrategyId::from(s)
    }

    #[test]
    fn zero_rows_are_filtered_before_metrics() {
        let frames = BTreeMap::from([(id("a"), capital(&[0.0, 105.0]))]);
        let results = probe_engine().compute_metrics(&frames);
        assert_eq!(results[&id("a")].scalar("count"), Some(1.0));
        assert_eq!(results[&id("a")].scalar("first"), Some(105.0));
    }

    #[test]
    fn failing_metrics_become_null_without_aborting() {
        let engine = engine(
            &[
                MetricDefinition::scalar("broken", always_fails),
                MetricDefinition::scalar("count", count),
                MetricDefinition::scalar("infinite", infinite),
                MetricDefinition::scalar("panics", panics),
            ],
            OosAlignment::Exact,
        );
        let frames = BTreeMap::from([
            (id("a"), capital(&[100.0, 101.0])),
            (id("b"), capital(&[100.0, 99.0, 98.0])),
        ]);

        let (results, summary) = engine.compute_metrics_with_summary(&frames);
        assert_eq!(results.len(), 2);
        for result in results.values() {
            assert_eq!(result.get("broken"), Some(&None));
            assert_eq!(result.get("infinite"), Some(&None));
            assert_eq!(result.get("panics"), Some(&None));
            assert!(result.scalar("count").is_some());
        }
        assert_eq!(summary, BatchSummary { strategies: 2, skipped: 0, succeeded: 2, failed: 6 });
    }

    #[test]
    fn unusable_frames_are_skipped() {
        let empty = DailyFrame::zeroed(ymd(2024, 1, 2), ymd(2024, 1, 1), vec!["capital".into()]);
        let columnless = DailyFrame::zeroed(ymd(2024, 1, 1), ymd(2024, 1, 3), vec![]);
        let frames = BTreeMap::from([
            (id("empty"), empty),
            (id("columnless"), columnless),
            (id("good"), capital(&[100.0])),
        ]);

        let (results, summary) = probe_engine().compute_metrics_with_summary(&frames);
        assert_eq!(results.keys().collect::<Vec<_>>(), vec![&id("good")]);
        assert_eq!(summary.skipped, 2);
    }

    #[test]
    fn compute_metrics_is_idempotent() {
        let engine = MetricsEngine::default();
        let frames = BTreeMap::from([
            (id("a"), capital(&[100.0, 102.0, 101.0, 103.0, 0.0, 104.0, 99.0, 100.5])),
            (id("b"), capital(&[50.0, 49.0, 51.0, 52.5, 52.0])),
        ]);
        let first = engine.compute_metrics(&frames);
        let second = engine.compute_metrics(&frames);
        assert_eq!(first, second);
        assert_eq!(first[&id("a")].len(), engine.catalog().len());
    }

    #[test]
    fn default_engine_runs_the_full_catalog() {
        let engine = MetricsEngine::default();
        assert!(engine.catalog().len() < DEFINITIONS.len());
        let frames = BTreeMap::from([(id("a"), capital(&[100.0, 110.0, 99.0, 108.9]))]);
        let result = &engine.compute_metrics(&frames)[&id("a")];
        let max_drawdown = result.scalar("max_drawdown").unwrap();
        assert!((max_drawdown + 0.1).abs() < 1e-9);
    }

    #[test]
    fn oos_with_an_empty_input_is_empty() {
        let engine = probe_engine();
        let frames = BTreeMap::from([(id("a"), capital(&[100.0, 101.0]))]);
        let starts = BTreeMap::from([(id("a"), ymd(2024, 1, 1))]);
        assert!(engine.compute_oos_metrics(&BTreeMap::new(), &starts).is_empty());
        assert!(engine.compute_oos_metrics(&frames, &BTreeMap::new()).is_empty());
    }

    #[test]
    fn oos_uses_the_key_intersection_and_slices_from_the_start() {
        let engine = probe_engine();
        let frames = BTreeMap::from([
            (id("a"), capital(&[100.0, 101.0, 102.0, 103.0])),
            (id("only_frame"), capital(&[100.0, 101.0])),
        ]);
        let starts = BTreeMap::from([
            (id("a"), ymd(2024, 1, 3)),
            (id("only_start"), ymd(2024, 1, 1)),
        ]);

        let results = engine.compute_oos_metrics(&frames, &starts);
        assert_eq!(results.keys().collect::<Vec<_>>(), vec![&id("a")]);
        assert_eq!(results[&id("a")].scalar("count"), Some(2.0));
        assert_eq!(results[&id("a")].scalar("first"), Some(102.0));
    }

    #[test]
    fn oos_start_without_exact_match_is_skipped_by_default() {
        let frames = BTreeMap::from([(id("a"), capital(&[100.0, 101.0, 102.0]))]);
        let starts = BTreeMap::from([(id("a"), ymd(2023, 12, 30))]);

        let (exact, summary) = probe_engine().compute_oos_metrics_with_summary(&frames, &starts);
        assert!(exact.is_empty());
        assert_eq!(summary.skipped, 1);

        let snapping = engine(&[MetricDefinition::scalar("first", first_value)], OosAlignment::NextAvailable);
        let snapped = snapping.compute_oos_metrics(&frames, &starts);
        assert_eq!(snapped[&id("a")].scalar("first"), Some(100.0));
    }

    #[test]
    fn oos_start_after_the_series_is_skipped() {
        let frames = BTreeMap::from([(id("a"), capital(&[100.0, 101.0]))]);
        let starts = BTreeMap::from([(id("a"), ymd(2024, 2, 1))]);
        for alignment in [OosAlignment::Exact, OosAlignment::NextAvailable] {
            let engine = engine(&[MetricDefinition::scalar("count", count)], alignment);
            assert!(engine.compute_oos_metrics(&frames, &starts).is_empty());
        }
    }
}
