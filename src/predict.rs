//! Linear trend extrapolation of moving averages.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::model::Bar;

/// Bars the trend line is fitted to.
pub const FIT_WINDOW: usize = 21;
/// Trading days projected forward.
pub const PREDICT_DAYS: usize = 5;

/// `y = slope * x + intercept`, fitted over `x = 0..n`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendLine {
    pub slope: f64,
    pub intercept: f64,
}

impl TrendLine {
    pub fn at(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionPoint {
    pub date: NaiveDate,
    pub ma13: f64,
    pub ma21: f64,
}

/// Least-squares line through `(i, values[i])`.
pub fn fit_line(values: &[f64]) -> Result<TrendLine, Report<IndicatorError>> {
    if values.len() < 2 {
        bail!(IndicatorError::InsufficientData {
            required: 2,
            available: values.len(),
        });
    }
    let n = values.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = values.iter().sum::<f64>() / n;

    let (sxy, sxx) = values
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(sxy, sxx), (i, &y)| {
            let dx = i as f64 - mean_x;
            (sxy + dx * (y - mean_y), sxx + dx * dx)
        });

    let slope = sxy / sxx;
    Ok(TrendLine {
        slope,
        intercept: mean_y - slope * mean_x,
    })
}

/// Project the `period` moving average `days` steps ahead.
///
/// The trailing window starts as the last `period` closes. Each step
/// evaluates the fitted line one position past the data, drops the oldest
/// window entry and appends the projection. The mean is always taken over
/// `period`, even when fewer closes were available to seed the window.
pub fn predict_ma(
    closes: &[f64],
    period: usize,
    days: usize,
) -> Result<Vec<f64>, Report<IndicatorError>> {
    if period == 0 {
        bail!(IndicatorError::InvalidParameter {
            name: "period must be > 0".into(),
        });
    }
    let line = fit_line(closes)?;

    let mut window: Vec<f64> = closes[closes.len().saturating_sub(period)..].to_vec();
    let mut predictions = Vec::with_capacity(days);
    for step in 0..days {
        let next = line.at((closes.len() + step) as f64);
        if window.len() >= period {
            window.remove(0);
        }
        window.push(next);
        let tail = &window[window.len().saturating_sub(period)..];
        predictions.push(tail.iter().sum::<f64>() / period as f64);
    }
    Ok(predictions)
}

/// The next `count` weekdays after `last`. Exchange holidays are not known.
pub fn next_trading_dates(last: NaiveDate, count: usize) -> Vec<NaiveDate> {
    let mut dates = Vec::with_capacity(count);
    let mut current = last;
    while dates.len() < count {
        current += Duration::days(1);
        if !matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
            dates.push(current);
        }
    }
    dates
}

/// MA13 and MA21 projections for the next [`PREDICT_DAYS`] weekdays, fitted
/// to the last [`FIT_WINDOW`] closes.
pub fn predict(bars: &[Bar]) -> Result<Vec<PredictionPoint>, Report<IndicatorError>> {
    let recent = &bars[bars.len().saturating_sub(FIT_WINDOW)..];
    let closes: Vec<f64> = recent
        .iter()
        .map(|b| b.close)
        .filter(|c| c.is_finite())
        .collect();

    let ma13 = predict_ma(&closes, 13, PREDICT_DAYS)?;
    let ma21 = predict_ma(&closes, 21, PREDICT_DAYS)?;
    let Some(last) = recent.last() else {
        bail!(IndicatorError::InsufficientData {
            required: 2,
            available: 0,
        });
    };

    Ok(next_trading_dates(last.date(), PREDICT_DAYS)
        .into_iter()
        .zip(ma13.into_iter().zip(ma21))
        .map(|(date, (ma13, ma21))| PredictionPoint { date, ma13, ma21 })
        .collect())
}
