pub mod bollinger;
pub mod ma;
pub mod macd;
pub mod rsi;
pub mod volume;

use error_stack::Report;

use crate::error::IndicatorError;
use crate::indicator::bollinger::BollingerBands;
use crate::indicator::ma::Sma;
use crate::indicator::macd::Macd;
use crate::indicator::rsi::Rsi;
use crate::indicator::volume::VolumeMA;
use crate::model::Bar;

/// Moving-average periods shown in every report.
pub const MA_PERIODS: [usize; 5] = [3, 5, 8, 13, 21];

/// A technical indicator over a bar series.
///
/// Bars must be in ascending chronological order (oldest first). Output is
/// aligned with the input: one entry per bar, `None` where the trailing
/// window is not yet full or the value is not finite.
pub trait Indicator: Send {
    fn calculate(&self, bars: &[Bar]) -> Vec<Option<f64>>;
}

/// Extract close prices from a slice of bars.
pub fn close_prices(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}

/// Extract volumes from a slice of bars.
pub fn volumes(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.volume).collect()
}

/// `Some(v)` only for finite values.
pub fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

/// Trailing arithmetic mean, right-aligned with `values`.
pub(crate) fn rolling_mean(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    for (i, window) in values.windows(period).enumerate() {
        out[i + period - 1] = finite(window.iter().sum::<f64>() / period as f64);
    }
    out
}

/// One moving-average line with its period.
#[derive(Debug, Clone)]
pub struct MaLine {
    pub period: usize,
    pub values: Vec<Option<f64>>,
}

/// Every indicator the daily and minute reports use, aligned with the bars.
#[derive(Debug, Clone)]
pub struct IndicatorSeries {
    pub moving_averages: Vec<MaLine>,
    pub macd: Vec<Option<f64>>,
    pub signal: Vec<Option<f64>>,
    pub histogram: Vec<Option<f64>>,
    pub rsi: Vec<Option<f64>>,
    pub bb_upper: Vec<Option<f64>>,
    pub bb_middle: Vec<Option<f64>>,
    pub bb_lower: Vec<Option<f64>>,
    pub volume_ma5: Vec<Option<f64>>,
}

/// Indicator values at one bar.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorRow {
    /// `(period, value)` in [`MA_PERIODS`] order.
    pub moving_averages: Vec<(usize, Option<f64>)>,
    pub macd: Option<f64>,
    pub signal: Option<f64>,
    pub histogram: Option<f64>,
    pub rsi: Option<f64>,
    pub bb_upper: Option<f64>,
    pub bb_middle: Option<f64>,
    pub bb_lower: Option<f64>,
    pub volume_ma5: Option<f64>,
}

impl IndicatorSeries {
    /// Compute the standard set: MA3/5/8/13/21, MACD(12,26,9), RSI(14),
    /// Bollinger(20, 2) and volume MA5.
    pub fn compute(bars: &[Bar]) -> Result<Self, Report<IndicatorError>> {
        let moving_averages = MA_PERIODS
            .iter()
            .map(|&period| {
                Ok(MaLine {
                    period,
                    values: Sma::new(period)?.calculate(bars),
                })
            })
            .collect::<Result<Vec<_>, Report<IndicatorError>>>()?;

        let macd = Macd::new(12, 26, 9)?.calculate_full(bars);
        let bands = BollingerBands::new(20, 2.0)?.calculate_bands(bars);

        Ok(Self {
            moving_averages,
            macd: macd.macd,
            signal: macd.signal,
            histogram: macd.histogram,
            rsi: Rsi::new(14)?.calculate(bars),
            bb_upper: bands.upper,
            bb_middle: bands.middle,
            bb_lower: bands.lower,
            volume_ma5: VolumeMA::new(5)?.calculate(bars),
        })
    }

    pub fn len(&self) -> usize {
        self.macd.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macd.is_empty()
    }

    /// Values of the moving average with `period`, if it was computed.
    pub fn ma(&self, period: usize) -> Option<&[Option<f64>]> {
        self.moving_averages
            .iter()
            .find(|line| line.period == period)
            .map(|line| line.values.as_slice())
    }

    /// Snapshot of every indicator at bar `index`.
    pub fn row(&self, index: usize) -> Option<IndicatorRow> {
        if index >= self.len() {
            return None;
        }
        Some(IndicatorRow {
            moving_averages: self
                .moving_averages
                .iter()
                .map(|line| (line.period, line.values[index]))
                .collect(),
            macd: self.macd[index],
            signal: self.signal[index],
            histogram: self.histogram[index],
            rsi: self.rsi[index],
            bb_upper: self.bb_upper[index],
            bb_middle: self.bb_middle[index],
            bb_lower: self.bb_lower[index],
            volume_ma5: self.volume_ma5[index],
        })
    }

    pub fn last(&self) -> Option<IndicatorRow> {
        self.len().checked_sub(1).and_then(|i| self.row(i))
    }
}

impl IndicatorRow {
    pub fn ma(&self, period: usize) -> Option<f64> {
        self.moving_averages
            .iter()
            .find(|(p, _)| *p == period)
            .and_then(|(_, v)| *v)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    pub(crate) fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(15, 0, 0)
            .unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar {
                timestamp: start + Duration::days(i as i64),
                open: c,
                high: c,
                low: c,
                close: c,
                volume: 1000.0 + i as f64,
                amount: c * 1000.0,
                turnover_rate: Some(1.0),
            })
            .collect()
    }

    #[test]
    fn rolling_mean_is_right_aligned() {
        let out = rolling_mean(&[1.0, 2.0, 3.0, 4.0], 3);
        assert_eq!(out, vec![None, None, Some(2.0), Some(3.0)]);
    }

    #[test]
    fn rolling_mean_nan_window_is_undefined() {
        let out = rolling_mean(&[1.0, f64::NAN, 3.0, 4.0, 5.0], 2);
        assert_eq!(out, vec![None, None, None, Some(3.5), Some(4.5)]);
    }

    #[test]
    fn series_is_aligned_with_bars() {
        let bars = bars_from_closes(&[10.0; 30]);
        let series = IndicatorSeries::compute(&bars).unwrap();
        assert_eq!(series.len(), 30);
        assert_eq!(series.rsi.len(), 30);
        assert_eq!(series.ma(21).unwrap().len(), 30);
        assert!(series.ma(4).is_none());
    }

    #[test]
    fn short_series_leaves_long_windows_undefined() {
        let bars = bars_from_closes(&(1..=10).map(f64::from).collect::<Vec<_>>());
        let series = IndicatorSeries::compute(&bars).unwrap();
        assert!(series.bb_middle.iter().all(Option::is_none));
        assert!(series.bb_upper.iter().all(Option::is_none));
        assert!(series.ma(13).unwrap().iter().all(Option::is_none));
        assert!(series.rsi.iter().all(Option::is_none));
        // EMAs are defined from the first bar.
        assert!(series.macd.iter().all(Option::is_some));
    }

    #[test]
    fn histogram_is_macd_minus_signal() {
        let closes: Vec<f64> = (0..60).map(|i| 10.0 + (i as f64 * 0.7).sin() * 3.0).collect();
        let series = IndicatorSeries::compute(&bars_from_closes(&closes)).unwrap();
        for i in 0..series.len() {
            let (m, s, h) = (series.macd[i], series.signal[i], series.histogram[i]);
            assert_eq!(h, m.zip(s).map(|(m, s)| m - s));
        }
    }

    #[test]
    fn row_snapshot_matches_columns() {
        let closes: Vec<f64> = (1..=25).map(f64::from).collect();
        let series = IndicatorSeries::compute(&bars_from_closes(&closes)).unwrap();
        let last = series.last().unwrap();
        assert_eq!(last.ma(3), Some(24.0));
        assert_eq!(last.ma(21), series.ma(21).unwrap()[24]);
        assert_eq!(last.moving_averages.len(), MA_PERIODS.len());
        assert!(series.row(25).is_none());
    }
}
