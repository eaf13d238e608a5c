use crate::error::AnalyticsError;
use chrono::NaiveDate;
use core_types::DailyFrame;

/// A single dated column of portfolio values, the input of every metric.
///
/// Values that look like prices (all non-negative, some above 1) are turned
/// into period returns by [`ValueSeries::returns`]; anything else is treated
/// as returns already.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueSeries {
    dates: Vec<NaiveDate>,
    values: Vec<f64>,
}

impl ValueSeries {
    pub fn new(dates: Vec<NaiveDate>, values: Vec<f64>) -> Result<Self, AnalyticsError> {
        if dates.len() != values.len() {
            return Err(AnalyticsError::Calculation(format!(
                "{} dates for {} values",
                dates.len(),
                values.len()
            )));
        }
        Ok(Self { dates, values })
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_price_like(&self) -> bool {
        let finite = || self.values.iter().copied().filter(|v| v.is_finite());
        let min = finite().fold(f64::INFINITY, f64::min);
        let max = finite().fold(f64::NEG_INFINITY, f64::max);
        min >= 0.0 && max > 1.0
    }

    /// Period returns paired with the date they were realized on.
    ///
    /// Non-finite returns (e.g. after a zero value) are dropped.
    pub fn dated_returns(&self) -> Vec<(NaiveDate, f64)> {
        if self.is_price_like() {
            self.values
                .windows(2)
                .zip(self.dates.iter().skip(1))
                .map(|(pair, date)| (*date, pair[1] / pair[0] - 1.0))
                .filter(|(_, r)| r.is_finite())
                .collect()
        } else {
            self.dates
                .iter()
                .copied()
                .zip(self.values.iter().copied())
                .filter(|(_, r)| r.is_finite())
                .collect()
        }
    }

    pub fn returns(&self) -> Vec<f64> {
        self.dated_returns().into_iter().map(|(_, r)| r).collect()
    }

    /// The equity curve: the values themselves, or returns compounded from 1.0.
    pub fn prices(&self) -> Vec<f64> {
        if self.is_price_like() {
            return self.values.iter().copied().filter(|v| v.is_finite()).collect();
        }
        let mut equity = 1.0;
        let mut curve = Vec::with_capacity(self.values.len() + 1);
        curve.push(equity);
        for r in self.values.iter().filter(|r| r.is_finite()) {
            equity *= 1.0 + r;
            curve.push(equity);
        }
        curve
    }

    /// Calendar days between the first and last observation.
    pub fn span_days(&self) -> i64 {
        match (self.dates.first(), self.dates.last()) {
            (Some(first), Some(last)) => (*last - *first).num_days(),
            _ => 0,
        }
    }
}

/// Extracts the value series the metrics run on from a portfolio frame.
///
/// Rows where every column is exactly zero are placeholders for days without
/// trading and are dropped. If that leaves nothing, the unfiltered first
/// column is used instead.
pub fn portfolio_values(frame: &DailyFrame) -> Result<ValueSeries, AnalyticsError> {
    if frame.columns().is_empty() {
        return Err(AnalyticsError::NoColumns);
    }
    if frame.is_empty() {
        return Err(AnalyticsError::EmptySeries);
    }

    let trading = frame.filter_rows(|row| row.iter().any(|v| *v != 0.0));
    let source = if trading.is_empty() {
        tracing::warn!("All rows contain only zeros, using the original first column");
        frame
    } else {
        &trading
    };

    let values = source.column(0).ok_or(AnalyticsError::NoColumns)?;
    tracing::debug!(points = values.len(), "Extracted portfolio values");
    ValueSeries::new(source.index().to_vec(), values)
}
