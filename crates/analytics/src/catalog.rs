use crate::stats::{self, MetricOutput, MetricParams};
use crate::series::ValueSeries;
use configuration::MetricsConfig;
use std::collections::HashSet;
use std::sync::OnceLock;

pub type MetricFn = fn(&ValueSeries, &MetricParams) -> MetricOutput;

/// Whether a metric produces a point statistic or a derived series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricArity {
    Scalar,
    Series,
}

#[derive(Clone, Copy)]
pub struct MetricDefinition {
    pub name: &'static str,
    pub function: MetricFn,
    pub requires_benchmark: bool,
    pub arity: MetricArity,
}

impl MetricDefinition {
    pub const fn scalar(name: &'static str, function: MetricFn) -> Self {
        Self { name, function, requires_benchmark: false, arity: MetricArity::Scalar }
    }

    pub const fn series(name: &'static str, function: MetricFn) -> Self {
        Self { name, function, requires_benchmark: false, arity: MetricArity::Series }
    }

    pub const fn benchmark(name: &'static str, arity: MetricArity) -> Self {
        Self { name, function: stats::requires_benchmark, requires_benchmark: true, arity }
    }

    /// Only single-series point statistics run in batch.
    pub fn is_batch_eligible(&self) -> bool {
        !self.requires_benchmark && self.arity == MetricArity::Scalar
    }
}

impl std::fmt::Debug for MetricDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricDefinition")
            .field("name", &self.name)
            .field("requires_benchmark", &self.requires_benchmark)
            .field("arity", &self.arity)
            .finish()
    }
}

use MetricArity::{Scalar, Series};

/// Every metric the statistics library offers, in alphabetical order.
/// Aliases appear under each of their names.
pub static DEFINITIONS: &[MetricDefinition] = &[
    MetricDefinition::scalar("adjusted_sortino", stats::adjusted_sortino),
    MetricDefinition::scalar("autocorr_penalty", stats::autocorr_penalty),
    MetricDefinition::scalar("avg_loss", stats::avg_loss),
    MetricDefinition::scalar("avg_return", stats::avg_return),
    MetricDefinition::scalar("avg_win", stats::avg_win),
    MetricDefinition::scalar("best", stats::best),
    MetricDefinition::scalar("cagr", stats::cagr),
    MetricDefinition::scalar("calmar", stats::calmar),
    MetricDefinition::scalar("common_sense_ratio", stats::common_sense_ratio),
    MetricDefinition::scalar("comp", stats::comp),
    MetricDefinition::series("compsum", stats::compsum),
    MetricDefinition::scalar("conditional_value_at_risk", stats::conditional_value_at_risk),
    MetricDefinition::scalar("consecutive_losses", stats::consecutive_losses),
    MetricDefinition::scalar("consecutive_wins", stats::consecutive_wins),
    MetricDefinition::scalar("cpc_index", stats::cpc_index),
    MetricDefinition::scalar("cvar", stats::conditional_value_at_risk),
    MetricDefinition::scalar("expected_return", stats::expected_return),
    MetricDefinition::scalar("expected_shortfall", stats::conditional_value_at_risk),
    MetricDefinition::scalar("exposure", stats::exposure),
    MetricDefinition::scalar("gain_to_pain_ratio", stats::gain_to_pain_ratio),
    MetricDefinition::scalar("geometric_mean", stats::expected_return),
    MetricDefinition::scalar("ghpr", stats::expected_return),
    MetricDefinition::benchmark("greeks", Series),
    MetricDefinition::series("implied_volatility", stats::implied_volatility),
    MetricDefinition::benchmark("information_ratio", Scalar),
    MetricDefinition::scalar("kelly_criterion", stats::kelly_criterion),
    MetricDefinition::scalar("kurtosis", stats::kurtosis),
    MetricDefinition::scalar("max_drawdown", stats::max_drawdown),
    MetricDefinition::series("monthly_returns", stats::monthly_returns),
    MetricDefinition::scalar("omega", stats::omega),
    MetricDefinition::scalar("outlier_loss_ratio", stats::outlier_loss_ratio),
    MetricDefinition::scalar("outlier_win_ratio", stats::outlier_win_ratio),
    MetricDefinition::series("outliers", stats::outliers),
    MetricDefinition::scalar("payoff_ratio", stats::payoff_ratio),
    MetricDefinition::series("pct_rank", stats::pct_rank),
    MetricDefinition::scalar("probabilistic_adjusted_sortino_ratio", stats::probabilistic_adjusted_sortino_ratio),
    MetricDefinition::scalar("probabilistic_ratio", stats::probabilistic_sharpe_ratio),
    MetricDefinition::scalar("probabilistic_sharpe_ratio", stats::probabilistic_sharpe_ratio),
    MetricDefinition::scalar("probabilistic_sortino_ratio", stats::probabilistic_sortino_ratio),
    MetricDefinition::scalar("profit_factor", stats::profit_factor),
    MetricDefinition::scalar("profit_ratio", stats::profit_ratio),
    MetricDefinition::benchmark("r2", Scalar),
    MetricDefinition::benchmark("r_squared", Scalar),
    MetricDefinition::scalar("rar", stats::rar),
    MetricDefinition::scalar("recovery_factor", stats::recovery_factor),
    MetricDefinition::series("remove_outliers", stats::remove_outliers),
    MetricDefinition::scalar("risk_of_ruin", stats::risk_of_ruin),
    MetricDefinition::scalar("risk_return_ratio", stats::risk_return_ratio),
    MetricDefinition::series("rolling_sharpe", stats::rolling_sharpe),
    MetricDefinition::series("rolling_sortino", stats::rolling_sortino),
    MetricDefinition::series("rolling_volatility", stats::rolling_volatility),
    MetricDefinition::scalar("ror", stats::risk_of_ruin),
    MetricDefinition::scalar("serenity_index", stats::serenity_index),
    MetricDefinition::scalar("sharpe", stats::sharpe),
    MetricDefinition::scalar("skew", stats::skew),
    MetricDefinition::scalar("smart_sharpe", stats::smart_sharpe),
    MetricDefinition::scalar("smart_sortino", stats::smart_sortino),
    MetricDefinition::scalar("sortino", stats::sortino),
    MetricDefinition::scalar("tail_ratio", stats::tail_ratio),
    MetricDefinition::series("to_drawdown_series", stats::to_drawdown_series),
    MetricDefinition::scalar("ulcer_index", stats::ulcer_index),
    MetricDefinition::scalar("ulcer_performance_index", stats::ulcer_performance_index),
    MetricDefinition::scalar("upi", stats::ulcer_performance_index),
    MetricDefinition::scalar("value_at_risk", stats::value_at_risk),
    MetricDefinition::scalar("var", stats::value_at_risk),
    MetricDefinition::scalar("volatility", stats::volatility),
    MetricDefinition::scalar("win_loss_ratio", stats::payoff_ratio),
    MetricDefinition::scalar("win_rate", stats::win_rate),
    MetricDefinition::scalar("worst", stats::worst),
];

/// The metrics a batch run computes: the library minus the denylist,
/// benchmark-relative metrics and series-valued metrics.
#[derive(Debug, Clone)]
pub struct MetricCatalog {
    metrics: Vec<MetricDefinition>,
}

impl MetricCatalog {
    pub fn new(config: &MetricsConfig) -> Self {
        Self::from_definitions(DEFINITIONS, &config.denylist)
    }

    pub fn from_definitions(definitions: &[MetricDefinition], denylist: &[String]) -> Self {
        let denied: HashSet<&str> = denylist.iter().map(String::as_str).collect();
        let metrics: Vec<MetricDefinition> = definitions
            .iter()
            .filter(|d| !denied.contains(d.name) && d.is_batch_eligible())
            .copied()
            .collect();

        tracing::debug!(
            available = definitions.len(),
            selected = metrics.len(),
            "Built metric catalog"
        );
        Self { metrics }
    }

    /// The catalog for the default configuration, built on first use.
    pub fn shared() -> &'static MetricCatalog {
        static CATALOG: OnceLock<MetricCatalog> = OnceLock::new();
        CATALOG.get_or_init(|| MetricCatalog::new(&MetricsConfig::default()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricDefinition> {
        self.metrics.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.metrics.iter().map(|d| d.name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.metrics.iter().any(|d| d.name == name)
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use configuration::DEFAULT_METRIC_DENYLIST;

    #[test]
    fn definitions_are_sorted_and_unique() {
        let names: Vec<_> = DEFINITIONS.iter().map(|d| d.name).collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(names, sorted);
    }

    #[test]
    fn default_catalog_excludes_denied_benchmark_and_series_metrics() {
        let catalog = MetricCatalog::shared();
        for denied in DEFAULT_METRIC_DENYLIST {
            assert!(!catalog.contains(denied), "{denied} should be denied");
        }
        assert!(!catalog.contains("information_ratio"));
        assert!(!catalog.contains("r_squared"));
        assert!(catalog.contains("sharpe"));
        assert!(catalog.contains("max_drawdown"));
        assert!(catalog.iter().all(MetricDefinition::is_batch_eligible));
    }

    #[test]
    fn monthly_returns_is_listed_once() {
        let series: Vec<_> = DEFINITIONS
            .iter()
            .filter(|d| d.arity == MetricArity::Series)
            .map(|d| d.name)
            .collect();
        assert!(series.contains(&"monthly_returns"));
        assert!(!series.contains(&"distribution"));
    }

    #[test]
    fn denylist_is_taken_from_configuration() {
        let config = MetricsConfig {
            denylist: vec!["sharpe".to_string(), "sortino".to_string()],
            ..MetricsConfig::default()
        };
        let catalog = MetricCatalog::new(&config);
        assert!(!catalog.contains("sharpe"));
        assert!(!catalog.contains("sortino"));
        // `comp` is scalar, so it is only excluded while denied.
        assert!(catalog.contains("comp"));
        assert!(!MetricCatalog::shared().contains("comp"));
    }

    #[test]
    fn order_is_declaration_order() {
        let catalog = MetricCatalog::from_definitions(DEFINITIONS, &[]);
        let names: Vec<_> = catalog.names().collect();
        assert_eq!(names.first(), Some(&"adjusted_sortino"));
        assert_eq!(names.last(), Some(&"worst"));
    }
}
