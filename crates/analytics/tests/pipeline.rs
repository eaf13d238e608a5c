use analytics::{MetricResult, MetricsEngine, MetricsTable, merge_results};
use chrono::{Datelike, NaiveDate, Weekday};
use configuration::{MetricsConfig, OosAlignment};
use core_types::{DailyFrame, StrategyId, encode_trading_date};
use data_processing::{reshape_batch, reshape_json};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// A Composer-style response with one capital value per weekday.
fn backtest(name: &str, start: NaiveDate, closes: &[f64]) -> Value {
    let mut capital = Map::new();
    let mut weights = Map::new();
    let mut day = start;
    for close in closes {
        while matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            day = day.succ_opt().unwrap();
        }
        let key = encode_trading_date(day).to_string();
        capital.insert(key.clone(), json!(close));
        weights.insert(key, json!(1.0));
        day = day.succ_opt().unwrap();
    }
    let last = day.pred_opt().unwrap();

    json!({
        "legend": { "bt": { "name": name } },
        "first_day": encode_trading_date(start),
        "last_market_day": encode_trading_date(last),
        "last_market_days_holdings": { "SPY": 12.0 },
        "tdvm_weights": { "SPY": Value::Object(weights) },
        "dvm_capital": { "bt": Value::Object(capital) },
        "stats": { "sharpe_ratio": 1.23, "cumulative_return": 0.05 }
    })
}

fn closes() -> Vec<f64> {
    let mut value = 100_000.0;
    (0..40)
        .map(|i| {
            value *= if i % 3 == 0 { 0.99 } else { 1.008 };
            value
        })
        .collect()
}

fn frames(documents: Vec<(StrategyId, Value)>) -> BTreeMap<StrategyId, DailyFrame> {
    reshape_batch(documents)
        .into_iter()
        .map(|(id, backtest)| (id, backtest.portfolio_values))
        .collect()
}

#[test]
fn weekend_rows_are_zero_filled_and_then_dropped() {
    // 2024-01-05 is a Friday.
    let reshaped = reshape_json(backtest("Weekly", ymd(2024, 1, 5), &[100.0, 101.0])).unwrap();
    let capital = &reshaped.portfolio_values;
    assert_eq!(capital.len(), 4);
    assert_eq!(capital.get(ymd(2024, 1, 6), "capital"), Some(0.0));

    let engine = MetricsEngine::default();
    let series = analytics::portfolio_values(capital).unwrap();
    assert_eq!(series.values(), &[100.0, 101.0]);
    let result = engine.evaluate(&series);
    assert!((result.scalar("best").unwrap() - 0.01).abs() < 1e-12);
}

#[test]
fn full_and_out_of_sample_metrics_end_to_end() {
    let start = ymd(2024, 1, 1);
    let frames = frames(vec![
        (StrategyId::from("alpha"), backtest("Alpha", start, &closes())),
        (StrategyId::from("broken"), json!({ "legend": {} })),
    ]);
    assert_eq!(frames.len(), 1);

    let engine = MetricsEngine::default();
    let full = engine.compute_metrics(&frames);
    let alpha = &full[&StrategyId::from("alpha")];
    assert_eq!(alpha.len(), engine.catalog().len());
    assert!(alpha.scalar("max_drawdown").unwrap() < 0.0);
    assert!(alpha.scalar("volatility").unwrap() > 0.0);
    assert!(alpha.get("comp").is_none());

    let starts = BTreeMap::from([(StrategyId::from("alpha"), ymd(2024, 1, 15))]);
    let oos = engine.compute_oos_metrics(&frames, &starts);
    assert_eq!(oos.len(), 1);
    let oos_alpha = &oos[&StrategyId::from("alpha")];
    assert_ne!(oos_alpha.scalar("best"), None);
    assert_ne!(oos_alpha, alpha);

    let stats = BTreeMap::from([(
        StrategyId::from("alpha"),
        MetricResult::from_stats(&json!({ "sharpe_ratio": 1.23 })),
    )]);
    let prefixed = oos
        .iter()
        .map(|(id, result)| (id.clone(), result.prefixed("oos_")))
        .collect();
    let merged = merge_results(merge_results(stats, full), prefixed);

    let table = MetricsTable::from_results(&[(StrategyId::from("alpha"), Some("Alpha".into()))], &merged);
    assert_eq!(table.rows.len(), 1);
    assert!(table.columns.contains(&"sharpe_ratio".to_string()));
    assert!(table.columns.contains(&"sharpe".to_string()));
    assert!(table.columns.contains(&"oos_sharpe".to_string()));
}

#[test]
fn weekend_oos_start_depends_on_the_alignment_policy() {
    let frames = frames(vec![(StrategyId::from("alpha"), backtest("Alpha", ymd(2024, 1, 1), &closes()))]);
    // Saturday rows are filtered out only inside the engine, so the date is in the index.
    let saturday = BTreeMap::from([(StrategyId::from("alpha"), ymd(2024, 1, 13))]);
    assert_eq!(MetricsEngine::default().compute_oos_metrics(&frames, &saturday).len(), 1);

    let before = BTreeMap::from([(StrategyId::from("alpha"), ymd(2023, 6, 1))]);
    assert!(MetricsEngine::default().compute_oos_metrics(&frames, &before).is_empty());

    let snapping = MetricsEngine::new(&MetricsConfig {
        oos_alignment: OosAlignment::NextAvailable,
        ..MetricsConfig::default()
    });
    assert_eq!(snapping.compute_oos_metrics(&frames, &before).len(), 1);
}
