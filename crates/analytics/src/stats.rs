//! The statistics library behind the metric catalog.
//!
//! Every function takes a [`ValueSeries`] and the run's [`MetricParams`] and
//! returns either a scalar or a derived series. Formulas follow the usual
//! quantstats definitions: sample standard deviation (ddof = 1), linear
//! quantile interpolation, bias-corrected skew and excess kurtosis.

use crate::error::AnalyticsError;
use crate::report::MetricValue;
use crate::series::ValueSeries;
use chrono::Datelike;
use configuration::MetricsConfig;
use statrs::distribution::{ContinuousCDF, Normal};
use std::collections::BTreeMap;

/// Window of the rolling ratio series.
const ROLLING_WINDOW: usize = 126;
/// Window of the rolling percentile rank.
const PCT_RANK_WINDOW: usize = 60;
const OUTLIER_QUANTILE: f64 = 0.95;
const DAYS_PER_YEAR: f64 = 365.0;

pub type MetricOutput = Result<MetricValue, AnalyticsError>;

/// Parameters shared by every metric in a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricParams {
    pub periods_per_year: f64,
    /// Annual risk-free rate.
    pub risk_free_rate: f64,
    pub var_confidence: f64,
}

impl Default for MetricParams {
    fn default() -> Self {
        Self::from(&MetricsConfig::default())
    }
}

impl From<&MetricsConfig> for MetricParams {
    fn from(config: &MetricsConfig) -> Self {
        Self {
            periods_per_year: f64::from(config.periods_per_year),
            risk_free_rate: config.risk_free_rate,
            var_confidence: config.var_confidence,
        }
    }
}

impl MetricParams {
    /// The risk-free rate converted to one period.
    fn period_risk_free(&self) -> f64 {
        (1.0 + self.risk_free_rate).powf(1.0 / self.periods_per_year) - 1.0
    }
}

// ==============================================================================
// Helpers
// ==============================================================================

fn scalar(value: f64) -> MetricOutput {
    Ok(MetricValue::Scalar(value))
}

fn require(name: &str, values: &[f64], min: usize) -> Result<(), AnalyticsError> {
    if values.len() < min {
        return Err(AnalyticsError::NotEnoughData(format!(
            "{name} needs at least {min} observations, got {}",
            values.len()
        )));
    }
    Ok(())
}

fn divide(name: &str, numerator: f64, denominator: f64) -> Result<f64, AnalyticsError> {
    if denominator == 0.0 || !denominator.is_finite() {
        return Err(AnalyticsError::DivisionByZero(name.to_string()));
    }
    Ok(numerator / denominator)
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

fn std_dev(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let m = mean(values)?;
    let var = values.iter().map(|x| (x - m) * (x - m)).sum::<f64>() / (n as f64 - 1.0);
    Some(var.sqrt())
}

/// Linear-interpolated quantile, `q` in `[0, 1]`.
fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}

fn filtered(values: &[f64], keep: impl Fn(f64) -> bool) -> Vec<f64> {
    values.iter().copied().filter(|v| keep(*v)).collect()
}

fn compounded(returns: &[f64]) -> f64 {
    returns.iter().fold(1.0, |acc, r| acc * (1.0 + r)) - 1.0
}

fn excess_returns(series: &ValueSeries, params: &MetricParams) -> Vec<f64> {
    let rf = params.period_risk_free();
    series.returns().into_iter().map(|r| r - rf).collect()
}

/// Drawdown from the running peak, as a non-positive fraction.
fn drawdowns(prices: &[f64]) -> Vec<f64> {
    let mut peak = f64::NEG_INFINITY;
    prices
        .iter()
        .map(|p| {
            peak = peak.max(*p);
            if peak > 0.0 { p / peak - 1.0 } else { 0.0 }
        })
        .collect()
}

fn longest_streak(returns: &[f64], hit: impl Fn(f64) -> bool) -> usize {
    let mut best = 0;
    let mut current = 0;
    for r in returns {
        if hit(*r) {
            current += 1;
            best = best.max(current);
        } else {
            current = 0;
        }
    }
    best
}

fn central_moments(values: &[f64]) -> Option<(f64, f64, f64)> {
    let n = values.len() as f64;
    let m = mean(values)?;
    let (mut m2, mut m3, mut m4) = (0.0, 0.0, 0.0);
    for x in values {
        let d = x - m;
        m2 += d * d;
        m3 += d * d * d;
        m4 += d * d * d * d;
    }
    Some((m2 / n, m3 / n, m4 / n))
}

/// Bias-corrected sample skewness (pandas `skew`).
fn sample_skew(values: &[f64]) -> Option<f64> {
    let n = values.len() as f64;
    if values.len() < 3 {
        return None;
    }
    let (m2, m3, _) = central_moments(values)?;
    if m2 == 0.0 {
        return None;
    }
    let g1 = m3 / m2.powf(1.5);
    Some(g1 * (n * (n - 1.0)).sqrt() / (n - 2.0))
}

/// Bias-corrected excess kurtosis (pandas `kurt`).
fn sample_excess_kurtosis(values: &[f64]) -> Option<f64> {
    let n = values.len() as f64;
    if values.len() < 4 {
        return None;
    }
    let (m2, _, m4) = central_moments(values)?;
    if m2 == 0.0 {
        return None;
    }
    let g2 = m4 / (m2 * m2) - 3.0;
    Some(((n + 1.0) * g2 + 6.0) * (n - 1.0) / ((n - 2.0) * (n - 3.0)))
}

fn standard_normal() -> Result<Normal, AnalyticsError> {
    Normal::new(0.0, 1.0).map_err(|e| AnalyticsError::InternalError(e.to_string()))
}

fn win_rate_of(returns: &[f64]) -> Result<f64, AnalyticsError> {
    let active = filtered(returns, |r| r != 0.0);
    let wins = active.iter().filter(|r| **r > 0.0).count();
    divide("win_rate", wins as f64, active.len() as f64)
}

fn payoff_of(returns: &[f64]) -> Result<f64, AnalyticsError> {
    let avg_win = mean(&filtered(returns, |r| r > 0.0))
        .ok_or_else(|| AnalyticsError::NotEnoughData("payoff_ratio needs a winning period".into()))?;
    let avg_loss = mean(&filtered(returns, |r| r < 0.0))
        .ok_or_else(|| AnalyticsError::NotEnoughData("payoff_ratio needs a losing period".into()))?;
    divide("payoff_ratio", avg_win, avg_loss.abs())
}

fn profit_factor_of(returns: &[f64]) -> Result<f64, AnalyticsError> {
    let gains: f64 = filtered(returns, |r| r >= 0.0).iter().sum();
    let losses: f64 = filtered(returns, |r| r < 0.0).iter().sum();
    divide("profit_factor", gains, losses.abs())
}

fn tail_ratio_of(returns: &[f64]) -> Result<f64, AnalyticsError> {
    let upper = quantile(returns, 0.95).ok_or(AnalyticsError::EmptySeries)?;
    let lower = quantile(returns, 0.05).ok_or(AnalyticsError::EmptySeries)?;
    divide("tail_ratio", upper, lower).map(f64::abs)
}

fn max_drawdown_of(series: &ValueSeries) -> Result<f64, AnalyticsError> {
    drawdowns(&series.prices())
        .into_iter()
        .reduce(f64::min)
        .ok_or(AnalyticsError::EmptySeries)
}

fn ulcer_of(series: &ValueSeries) -> Result<f64, AnalyticsError> {
    let dd = drawdowns(&series.prices());
    require("ulcer_index", &dd, 2)?;
    Ok((dd.iter().map(|d| d * d).sum::<f64>() / (dd.len() - 1) as f64).sqrt())
}

fn cagr_of(series: &ValueSeries) -> Result<f64, AnalyticsError> {
    let returns = series.returns();
    require("cagr", &returns, 1)?;
    let years = series.span_days() as f64 / DAYS_PER_YEAR;
    let exponent = divide("cagr", 1.0, years)?;
    Ok((compounded(&returns) + 1.0).abs().powf(exponent) - 1.0)
}

fn exposure_of(returns: &[f64]) -> Result<f64, AnalyticsError> {
    let active = returns.iter().filter(|r| **r != 0.0).count();
    let ratio = divide("exposure", active as f64, returns.len() as f64)?;
    Ok((ratio * 100.0).ceil() / 100.0)
}

fn parametric_var(values: &[f64], confidence: f64) -> Result<f64, AnalyticsError> {
    let mu = mean(values).ok_or(AnalyticsError::EmptySeries)?;
    let sigma = std_dev(values)
        .ok_or_else(|| AnalyticsError::NotEnoughData("value_at_risk needs 2 observations".into()))?;
    let normal = Normal::new(mu, sigma).map_err(|e| AnalyticsError::Calculation(e.to_string()))?;
    Ok(normal.inverse_cdf(1.0 - confidence))
}

/// Mean of the observations below the parametric VaR, or the VaR itself when there are none.
fn conditional_var(values: &[f64], confidence: f64) -> Result<f64, AnalyticsError> {
    let var = parametric_var(values, confidence)?;
    Ok(mean(&filtered(values, |v| v < var)).unwrap_or(var))
}

fn autocorr_penalty_of(returns: &[f64]) -> Result<f64, AnalyticsError> {
    require("autocorr_penalty", returns, 3)?;
    let (head, tail) = (&returns[..returns.len() - 1], &returns[1..]);
    let (mh, mt) = (mean(head).unwrap_or(0.0), mean(tail).unwrap_or(0.0));
    let cov: f64 = head.iter().zip(tail).map(|(a, b)| (a - mh) * (b - mt)).sum();
    let var_h: f64 = head.iter().map(|a| (a - mh) * (a - mh)).sum();
    let var_t: f64 = tail.iter().map(|b| (b - mt) * (b - mt)).sum();
    let coef = divide("autocorr_penalty", cov, (var_h * var_t).sqrt())?.abs();

    let num = returns.len() as f64;
    let corr: f64 = (1..returns.len())
        .map(|x| ((num - x as f64) / num) * coef.powi(x as i32))
        .sum();
    Ok((1.0 + 2.0 * corr).sqrt())
}

fn sharpe_of(returns: &[f64], params: &MetricParams, smart: bool, annualize: bool) -> Result<f64, AnalyticsError> {
    let m = mean(returns).ok_or(AnalyticsError::EmptySeries)?;
    let mut divisor =
        std_dev(returns).ok_or_else(|| AnalyticsError::NotEnoughData("sharpe needs 2 observations".into()))?;
    if smart {
        divisor *= autocorr_penalty_of(returns)?;
    }
    let ratio = divide("sharpe", m, divisor)?;
    Ok(if annualize { ratio * params.periods_per_year.sqrt() } else { ratio })
}

fn sortino_of(returns: &[f64], params: &MetricParams, smart: bool, annualize: bool) -> Result<f64, AnalyticsError> {
    let m = mean(returns).ok_or(AnalyticsError::EmptySeries)?;
    let downside_sq: f64 = filtered(returns, |r| r < 0.0).iter().map(|r| r * r).sum();
    let mut downside = (downside_sq / returns.len() as f64).sqrt();
    if smart {
        downside *= autocorr_penalty_of(returns)?;
    }
    let ratio = divide("sortino", m, downside)?;
    Ok(if annualize { ratio * params.periods_per_year.sqrt() } else { ratio })
}

/// Probability that the true ratio exceeds zero given the sample's skew and kurtosis.
fn probabilistic_of(returns: &[f64], base: f64) -> Result<f64, AnalyticsError> {
    let skew = sample_skew(returns)
        .ok_or_else(|| AnalyticsError::NotEnoughData("probabilistic ratio needs skew".into()))?;
    let kurt = sample_excess_kurtosis(returns)
        .ok_or_else(|| AnalyticsError::NotEnoughData("probabilistic ratio needs kurtosis".into()))?
        + 3.0;
    let n = returns.len() as f64;
    let variance = (1.0 - skew * base + ((kurt - 1.0) / 4.0) * base * base) / (n - 1.0);
    if variance <= 0.0 {
        return Err(AnalyticsError::Calculation("negative ratio variance".into()));
    }
    Ok(standard_normal()?.cdf(base / variance.sqrt()))
}

fn rolling(returns: &[f64], window: usize, f: impl Fn(&[f64]) -> Option<f64>) -> Result<Vec<f64>, AnalyticsError> {
    require("rolling window", returns, window)?;
    Ok(returns.windows(window).filter_map(f).collect())
}

// ==============================================================================
// Scalar metrics
// ==============================================================================

pub fn avg_loss(series: &ValueSeries, _: &MetricParams) -> MetricOutput {
    let losses = filtered(&series.returns(), |r| r < 0.0);
    scalar(mean(&losses).ok_or_else(|| AnalyticsError::NotEnoughData("no losing periods".into()))?)
}

pub fn avg_return(series: &ValueSeries, _: &MetricParams) -> MetricOutput {
    let active = filtered(&series.returns(), |r| r != 0.0);
    scalar(mean(&active).ok_or_else(|| AnalyticsError::NotEnoughData("no active periods".into()))?)
}

pub fn avg_win(series: &ValueSeries, _: &MetricParams) -> MetricOutput {
    let wins = filtered(&series.returns(), |r| r > 0.0);
    scalar(mean(&wins).ok_or_else(|| AnalyticsError::NotEnoughData("no winning periods".into()))?)
}

pub fn best(series: &ValueSeries, _: &MetricParams) -> MetricOutput {
    scalar(series.returns().into_iter().reduce(f64::max).ok_or(AnalyticsError::EmptySeries)?)
}

pub fn worst(series: &ValueSeries, _: &MetricParams) -> MetricOutput {
    scalar(series.returns().into_iter().reduce(f64::min).ok_or(AnalyticsError::EmptySeries)?)
}

pub fn comp(series: &ValueSeries, _: &MetricParams) -> MetricOutput {
    let returns = series.returns();
    require("comp", &returns, 1)?;
    scalar(compounded(&returns))
}

pub fn cagr(series: &ValueSeries, _: &MetricParams) -> MetricOutput {
    scalar(cagr_of(series)?)
}

pub fn max_drawdown(series: &ValueSeries, _: &MetricParams) -> MetricOutput {
    scalar(max_drawdown_of(series)?)
}

pub fn calmar(series: &ValueSeries, _: &MetricParams) -> MetricOutput {
    scalar(divide("calmar", cagr_of(series)?, max_drawdown_of(series)?.abs())?)
}

pub fn volatility(series: &ValueSeries, params: &MetricParams) -> MetricOutput {
    let std = std_dev(&series.returns())
        .ok_or_else(|| AnalyticsError::NotEnoughData("volatility needs 2 observations".into()))?;
    scalar(std * params.periods_per_year.sqrt())
}

pub fn sharpe(series: &ValueSeries, params: &MetricParams) -> MetricOutput {
    scalar(sharpe_of(&excess_returns(series, params), params, false, true)?)
}

pub fn smart_sharpe(series: &ValueSeries, params: &MetricParams) -> MetricOutput {
    scalar(sharpe_of(&excess_returns(series, params), params, true, true)?)
}

pub fn sortino(series: &ValueSeries, params: &MetricParams) -> MetricOutput {
    scalar(sortino_of(&excess_returns(series, params), params, false, true)?)
}

pub fn smart_sortino(series: &ValueSeries, params: &MetricParams) -> MetricOutput {
    scalar(sortino_of(&excess_returns(series, params), params, true, true)?)
}

pub fn adjusted_sortino(series: &ValueSeries, params: &MetricParams) -> MetricOutput {
    let sortino = sortino_of(&excess_returns(series, params), params, false, true)?;
    scalar(sortino / std::f64::consts::SQRT_2)
}

pub fn autocorr_penalty(series: &ValueSeries, _: &MetricParams) -> MetricOutput {
    scalar(autocorr_penalty_of(&series.returns())?)
}

pub fn probabilistic_sharpe_ratio(series: &ValueSeries, params: &MetricParams) -> MetricOutput {
    let returns = excess_returns(series, params);
    scalar(probabilistic_of(&returns, sharpe_of(&returns, params, false, false)?)?)
}

pub fn probabilistic_sortino_ratio(series: &ValueSeries, params: &MetricParams) -> MetricOutput {
    let returns = excess_returns(series, params);
    scalar(probabilistic_of(&returns, sortino_of(&returns, params, false, false)?)?)
}

pub fn probabilistic_adjusted_sortino_ratio(series: &ValueSeries, params: &MetricParams) -> MetricOutput {
    let returns = excess_returns(series, params);
    let base = sortino_of(&returns, params, false, false)? / std::f64::consts::SQRT_2;
    scalar(probabilistic_of(&returns, base)?)
}

pub fn risk_return_ratio(series: &ValueSeries, _: &MetricParams) -> MetricOutput {
    let returns = series.returns();
    let m = mean(&returns).ok_or(AnalyticsError::EmptySeries)?;
    let std = std_dev(&returns)
        .ok_or_else(|| AnalyticsError::NotEnoughData("risk_return_ratio needs 2 observations".into()))?;
    scalar(divide("risk_return_ratio", m, std)?)
}

pub fn omega(series: &ValueSeries, _: &MetricParams) -> MetricOutput {
    let returns = series.returns();
    let gains: f64 = filtered(&returns, |r| r > 0.0).iter().sum();
    let losses: f64 = -filtered(&returns, |r| r < 0.0).iter().sum::<f64>();
    scalar(divide("omega", gains, losses)?)
}

pub fn gain_to_pain_ratio(series: &ValueSeries, _: &MetricParams) -> MetricOutput {
    let returns = series.returns();
    let pain: f64 = filtered(&returns, |r| r < 0.0).iter().sum();
    scalar(divide("gain_to_pain_ratio", returns.iter().sum(), pain.abs())?)
}

pub fn win_rate(series: &ValueSeries, _: &MetricParams) -> MetricOutput {
    scalar(win_rate_of(&series.returns())?)
}

pub fn payoff_ratio(series: &ValueSeries, _: &MetricParams) -> MetricOutput {
    scalar(payoff_of(&series.returns())?)
}

pub fn profit_factor(series: &ValueSeries, _: &MetricParams) -> MetricOutput {
    scalar(profit_factor_of(&series.returns())?)
}

pub fn profit_ratio(series: &ValueSeries, _: &MetricParams) -> MetricOutput {
    let returns = series.returns();
    let wins = filtered(&returns, |r| r >= 0.0);
    let losses = filtered(&returns, |r| r < 0.0);
    let win_ratio = divide("profit_ratio", mean(&wins).unwrap_or(f64::NAN), wins.len() as f64)?.abs();
    let loss_ratio = divide("profit_ratio", mean(&losses).unwrap_or(f64::NAN), losses.len() as f64)?.abs();
    scalar(divide("profit_ratio", win_ratio, loss_ratio)?)
}

pub fn cpc_index(series: &ValueSeries, _: &MetricParams) -> MetricOutput {
    let returns = series.returns();
    scalar(profit_factor_of(&returns)? * win_rate_of(&returns)? * payoff_of(&returns)?)
}

pub fn tail_ratio(series: &ValueSeries, _: &MetricParams) -> MetricOutput {
    scalar(tail_ratio_of(&series.returns())?)
}

pub fn common_sense_ratio(series: &ValueSeries, _: &MetricParams) -> MetricOutput {
    let returns = series.returns();
    scalar(profit_factor_of(&returns)? * tail_ratio_of(&returns)?)
}

pub fn outlier_win_ratio(series: &ValueSeries, _: &MetricParams) -> MetricOutput {
    let returns = series.returns();
    let top = quantile(&returns, 0.99).ok_or(AnalyticsError::EmptySeries)?;
    let avg_gain = mean(&filtered(&returns, |r| r >= 0.0)).unwrap_or(0.0);
    scalar(divide("outlier_win_ratio", top, avg_gain)?)
}

pub fn outlier_loss_ratio(series: &ValueSeries, _: &MetricParams) -> MetricOutput {
    let returns = series.returns();
    let bottom = quantile(&returns, 0.01).ok_or(AnalyticsError::EmptySeries)?;
    let avg_loss = mean(&filtered(&returns, |r| r < 0.0)).unwrap_or(0.0);
    scalar(divide("outlier_loss_ratio", bottom, avg_loss)?)
}

/// Geometric mean return per period.
pub fn expected_return(series: &ValueSeries, _: &MetricParams) -> MetricOutput {
    let returns = series.returns();
    require("expected_return", &returns, 1)?;
    let growth = returns.iter().fold(1.0, |acc, r| acc * (1.0 + r));
    scalar(growth.powf(1.0 / returns.len() as f64) - 1.0)
}

pub fn exposure(series: &ValueSeries, _: &MetricParams) -> MetricOutput {
    scalar(exposure_of(&series.returns())?)
}

pub fn rar(series: &ValueSeries, _: &MetricParams) -> MetricOutput {
    scalar(divide("rar", cagr_of(series)?, exposure_of(&series.returns())?)?)
}

pub fn consecutive_wins(series: &ValueSeries, _: &MetricParams) -> MetricOutput {
    let returns = series.returns();
    require("consecutive_wins", &returns, 1)?;
    scalar(longest_streak(&returns, |r| r > 0.0) as f64)
}

pub fn consecutive_losses(series: &ValueSeries, _: &MetricParams) -> MetricOutput {
    let returns = series.returns();
    require("consecutive_losses", &returns, 1)?;
    scalar(longest_streak(&returns, |r| r < 0.0) as f64)
}

pub fn kelly_criterion(series: &ValueSeries, _: &MetricParams) -> MetricOutput {
    let returns = series.returns();
    let win_loss = payoff_of(&returns)?;
    let win_prob = win_rate_of(&returns)?;
    scalar(divide("kelly_criterion", win_loss * win_prob - (1.0 - win_prob), win_loss)?)
}

pub fn risk_of_ruin(series: &ValueSeries, _: &MetricParams) -> MetricOutput {
    let returns = series.returns();
    let wins = win_rate_of(&returns)?;
    scalar(((1.0 - wins) / (1.0 + wins)).powi(returns.len() as i32))
}

pub fn value_at_risk(series: &ValueSeries, params: &MetricParams) -> MetricOutput {
    scalar(parametric_var(&series.returns(), params.var_confidence)?)
}

pub fn conditional_value_at_risk(series: &ValueSeries, params: &MetricParams) -> MetricOutput {
    scalar(conditional_var(&series.returns(), params.var_confidence)?)
}

pub fn skew(series: &ValueSeries, _: &MetricParams) -> MetricOutput {
    scalar(sample_skew(&series.returns()).ok_or_else(|| {
        AnalyticsError::NotEnoughData("skew needs 3 varying observations".into())
    })?)
}

pub fn kurtosis(series: &ValueSeries, _: &MetricParams) -> MetricOutput {
    scalar(sample_excess_kurtosis(&series.returns()).ok_or_else(|| {
        AnalyticsError::NotEnoughData("kurtosis needs 4 varying observations".into())
    })?)
}

pub fn recovery_factor(series: &ValueSeries, _: &MetricParams) -> MetricOutput {
    let total: f64 = series.returns().iter().sum();
    scalar(divide("recovery_factor", total.abs(), max_drawdown_of(series)?.abs())?)
}

pub fn ulcer_index(series: &ValueSeries, _: &MetricParams) -> MetricOutput {
    scalar(ulcer_of(series)?)
}

pub fn ulcer_performance_index(series: &ValueSeries, _: &MetricParams) -> MetricOutput {
    let returns = series.returns();
    require("ulcer_performance_index", &returns, 1)?;
    scalar(divide("ulcer_performance_index", compounded(&returns), ulcer_of(series)?)?)
}

pub fn serenity_index(series: &ValueSeries, params: &MetricParams) -> MetricOutput {
    let returns = series.returns();
    let std = std_dev(&returns)
        .ok_or_else(|| AnalyticsError::NotEnoughData("serenity_index needs 2 observations".into()))?;
    let dd = drawdowns(&series.prices());
    let pitfall = divide("serenity_index", -conditional_var(&dd, params.var_confidence)?, std)?;
    scalar(divide("serenity_index", returns.iter().sum(), ulcer_of(series)? * pitfall)?)
}

/// Placeholder for metrics that compare against a benchmark; never eligible in batch runs.
pub fn requires_benchmark(_: &ValueSeries, _: &MetricParams) -> MetricOutput {
    Err(AnalyticsError::BenchmarkRequired("benchmark-relative metric".into()))
}

// ==============================================================================
// Series metrics
// ==============================================================================

pub fn compsum(series: &ValueSeries, _: &MetricParams) -> MetricOutput {
    let mut growth = 1.0;
    let curve = series
        .returns()
        .into_iter()
        .map(|r| {
            growth *= 1.0 + r;
            growth - 1.0
        })
        .collect();
    Ok(MetricValue::Series(curve))
}

pub fn to_drawdown_series(series: &ValueSeries, _: &MetricParams) -> MetricOutput {
    Ok(MetricValue::Series(drawdowns(&series.prices())))
}

pub fn rolling_volatility(series: &ValueSeries, params: &MetricParams) -> MetricOutput {
    let scale = params.periods_per_year.sqrt();
    let values = rolling(&series.returns(), ROLLING_WINDOW, |w| std_dev(w).map(|s| s * scale))?;
    Ok(MetricValue::Series(values))
}

pub fn rolling_sharpe(series: &ValueSeries, params: &MetricParams) -> MetricOutput {
    let returns = excess_returns(series, params);
    let values = rolling(&returns, ROLLING_WINDOW, |w| sharpe_of(w, params, false, true).ok())?;
    Ok(MetricValue::Series(values))
}

pub fn rolling_sortino(series: &ValueSeries, params: &MetricParams) -> MetricOutput {
    let returns = excess_returns(series, params);
    let values = rolling(&returns, ROLLING_WINDOW, |w| sortino_of(w, params, false, true).ok())?;
    Ok(MetricValue::Series(values))
}

pub fn implied_volatility(series: &ValueSeries, params: &MetricParams) -> MetricOutput {
    let logs: Vec<f64> = series.returns().iter().map(|r| (1.0 + r).ln()).collect();
    let window = params.periods_per_year as usize;
    let scale = params.periods_per_year.sqrt();
    let values = rolling(&logs, window, |w| std_dev(w).map(|s| s * scale))?;
    Ok(MetricValue::Series(values))
}

pub fn outliers(series: &ValueSeries, _: &MetricParams) -> MetricOutput {
    let returns = series.returns();
    let cutoff = quantile(&returns, OUTLIER_QUANTILE).ok_or(AnalyticsError::EmptySeries)?;
    Ok(MetricValue::Series(filtered(&returns, |r| r > cutoff)))
}

pub fn remove_outliers(series: &ValueSeries, _: &MetricParams) -> MetricOutput {
    let returns = series.returns();
    let cutoff = quantile(&returns, OUTLIER_QUANTILE).ok_or(AnalyticsError::EmptySeries)?;
    Ok(MetricValue::Series(filtered(&returns, |r| r < cutoff)))
}

/// Percentile rank of each price within its trailing window.
pub fn pct_rank(series: &ValueSeries, _: &MetricParams) -> MetricOutput {
    let values = rolling(&series.prices(), PCT_RANK_WINDOW, |w| {
        let last = *w.last()?;
        let below = w.iter().filter(|p| **p <= last).count();
        Some(below as f64 / w.len() as f64 * 100.0)
    })?;
    Ok(MetricValue::Series(values))
}

/// Compounded return of each calendar month, oldest first.
pub fn monthly_returns(series: &ValueSeries, _: &MetricParams) -> MetricOutput {
    let mut months: BTreeMap<(i32, u32), f64> = BTreeMap::new();
    for (date, r) in series.dated_returns() {
        let growth = months.entry((date.year(), date.month())).or_insert(1.0);
        *growth *= 1.0 + r;
    }
    if months.is_empty() {
        return Err(AnalyticsError::EmptySeries);
    }
    Ok(MetricValue::Series(months.into_values().map(|g| g - 1.0).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn prices(values: &[f64]) -> ValueSeries {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let dates = (0..values.len())
            .map(|i| start + chrono::Duration::days(i as i64))
            .collect();
        ValueSeries::new(dates, values.to_vec()).unwrap()
    }

    fn value(output: MetricOutput) -> f64 {
        match output {
            Ok(MetricValue::Scalar(v)) => v,
            other => panic!("expected a scalar, got {other:?}"),
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn quantile_interpolates_linearly() {
        let values = [4.0, 1.0, 3.0, 2.0];
        assert!(close(quantile(&values, 0.5).unwrap(), 2.5));
        assert!(close(quantile(&values, 0.0).unwrap(), 1.0));
        assert!(close(quantile(&values, 1.0).unwrap(), 4.0));
        assert!(quantile(&[], 0.5).is_none());
    }

    #[test]
    fn compounding_metrics_agree_with_the_price_path() {
        let series = prices(&[100.0, 110.0, 99.0, 108.9]);
        let params = MetricParams::default();
        assert!(close(value(comp(&series, &params)), 0.089));
        assert!(close(value(best(&series, &params)), 0.1));
        assert!(close(value(worst(&series, &params)), -0.1));
        assert!(close(value(max_drawdown(&series, &params)), -0.1));
        assert!(close(value(consecutive_wins(&series, &params)), 1.0));
        assert!(close(value(win_rate(&series, &params)), 2.0 / 3.0));
    }

    #[test]
    fn sharpe_is_annualized_mean_over_std() {
        let series = prices(&[100.0, 101.0, 100.0, 102.0, 101.0, 103.0]);
        let params = MetricParams::default();
        let returns = series.returns();
        let expected = mean(&returns).unwrap() / std_dev(&returns).unwrap() * 252f64.sqrt();
        assert!(close(value(sharpe(&series, &params)), expected));

        let vol = value(volatility(&series, &params));
        assert!(close(vol, std_dev(&returns).unwrap() * 252f64.sqrt()));
    }

    #[test]
    fn sortino_uses_downside_deviation_over_all_periods() {
        let series = prices(&[100.0, 102.0, 101.0, 104.0]);
        let params = MetricParams::default();
        let returns = series.returns();
        let downside = (returns.iter().filter(|r| **r < 0.0).map(|r| r * r).sum::<f64>() / 3.0).sqrt();
        let expected = mean(&returns).unwrap() / downside * 252f64.sqrt();
        assert!(close(value(sortino(&series, &params)), expected));
        assert!(close(
            value(adjusted_sortino(&series, &params)),
            expected / std::f64::consts::SQRT_2
        ));
    }

    #[test]
    fn cagr_uses_calendar_years() {
        // Doubling over 730 days is sqrt(2) - 1 per year.
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let series = ValueSeries::new(
            vec![start, start + chrono::Duration::days(730)],
            vec![100.0, 200.0],
        )
        .unwrap();
        assert!(close(value(cagr(&series, &MetricParams::default())), 2f64.sqrt() - 1.0));
    }

    #[test]
    fn undefined_ratios_are_errors_not_infinities() {
        // Only gains: no losses to divide by.
        let series = prices(&[100.0, 101.0, 102.0, 103.0]);
        let params = MetricParams::default();
        assert!(matches!(profit_factor(&series, &params), Err(AnalyticsError::DivisionByZero(_))));
        assert!(matches!(max_drawdown(&series, &params), Ok(MetricValue::Scalar(v)) if v == 0.0));
        assert!(calmar(&series, &params).is_err());
        assert!(avg_loss(&series, &params).is_err());
    }

    #[test]
    fn short_series_report_not_enough_data() {
        let series = prices(&[100.0]);
        let params = MetricParams::default();
        assert!(matches!(volatility(&series, &params), Err(AnalyticsError::NotEnoughData(_))));
        assert!(matches!(skew(&series, &params), Err(AnalyticsError::NotEnoughData(_))));
        assert!(matches!(rolling_sharpe(&series, &params), Err(AnalyticsError::NotEnoughData(_))));
    }

    #[test]
    fn skew_and_kurtosis_match_the_bias_corrected_estimators() {
        let series = ValueSeries::new(
            (1..=5).map(|d| NaiveDate::from_ymd_opt(2023, 1, d).unwrap()).collect(),
            vec![0.01, -0.02, 0.03, 0.0, 0.05],
        )
        .unwrap();
        let params = MetricParams::default();
        // Reference values from pandas Series.skew() / Series.kurt().
        assert!((value(skew(&series, &params)) - 0.182_523_3).abs() < 1e-5);
        assert!((value(kurtosis(&series, &params)) - (-0.681_178_5)).abs() < 1e-5);
    }

    #[test]
    fn value_at_risk_is_a_lower_tail_quantile() {
        let series = prices(&[100.0, 101.0, 99.5, 100.5, 98.0, 101.5, 100.0]);
        let params = MetricParams::default();
        let var = value(value_at_risk(&series, &params));
        let cvar = value(conditional_value_at_risk(&series, &params));
        assert!(var < 0.0);
        assert!(cvar <= var);
    }

    #[test]
    fn monthly_returns_group_by_calendar_month() {
        let dates = vec![
            NaiveDate::from_ymd_opt(2024, 1, 30).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
        ];
        let series = ValueSeries::new(dates, vec![100.0, 110.0, 121.0]).unwrap();
        match monthly_returns(&series, &MetricParams::default()) {
            Ok(MetricValue::Series(months)) => {
                assert_eq!(months.len(), 2);
                assert!(close(months[0], 0.1));
                assert!(close(months[1], 0.1));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn drawdown_series_tracks_the_running_peak() {
        match to_drawdown_series(&prices(&[100.0, 120.0, 90.0, 130.0]), &MetricParams::default()) {
            Ok(MetricValue::Series(dd)) => {
                assert!(close(dd[0], 0.0));
                assert!(close(dd[2], -0.25));
                assert!(close(dd[3], 0.0));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
