use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::{Indicator, close_prices, finite};
use crate::model::Bar;

/// RSI using a simple rolling mean of gains and losses.
///
/// The value at bar `i` uses the `period` close-to-close deltas ending at
/// `i`, so the first `period` bars are undefined.
pub struct Rsi {
    period: usize,
}

impl Rsi {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        if period == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "period must be > 0".into(),
            });
        }
        Ok(Self { period })
    }

    pub fn calculate_prices(&self, prices: &[f64]) -> Vec<Option<f64>> {
        let mut out = vec![None; prices.len()];
        if prices.len() <= self.period {
            return out;
        }

        let deltas: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();
        for (i, window) in deltas.windows(self.period).enumerate() {
            if window.iter().any(|d| !d.is_finite()) {
                continue;
            }
            let avg_gain = window.iter().map(|&d| d.max(0.0)).sum::<f64>() / self.period as f64;
            let avg_loss = window.iter().map(|&d| (-d).max(0.0)).sum::<f64>() / self.period as f64;
            // deltas[j] ends at bar j + 1
            out[i + self.period] = rsi_value(avg_gain, avg_loss);
        }
        out
    }
}

impl Indicator for Rsi {
    fn calculate(&self, bars: &[Bar]) -> Vec<Option<f64>> {
        self.calculate_prices(&close_prices(bars))
    }
}

/// A window with neither gains nor losses has no defined RSI.
fn rsi_value(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    if avg_loss == 0.0 {
        return (avg_gain > 0.0).then_some(100.0);
    }
    let rs = avg_gain / avg_loss;
    finite(100.0 - 100.0 / (1.0 + rs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::tests::bars_from_closes;

    #[test]
    fn rsi_period_zero_invalid() {
        assert!(Rsi::new(0).is_err());
    }

    #[test]
    fn rsi_short_input_all_undefined() {
        let rsi = Rsi::new(14).unwrap();
        let values = rsi.calculate(&bars_from_closes(&[1.0; 14]));
        assert!(values.iter().all(Option::is_none));
    }

    #[test]
    fn rsi_first_value_at_period() {
        let rsi = Rsi::new(14).unwrap();
        let closes: Vec<f64> = (0..20).map(|i| 10.0 + i as f64).collect();
        let values = rsi.calculate(&bars_from_closes(&closes));
        assert!(values[..14].iter().all(Option::is_none));
        assert_eq!(values[14], Some(100.0));
    }

    #[test]
    fn rsi_all_losses_returns_0() {
        let rsi = Rsi::new(3).unwrap();
        let values = rsi.calculate_prices(&[4.0, 3.0, 2.0, 1.0]);
        assert!((values[3].unwrap() - 0.0).abs() < 1e-9);
    }

    #[test]
    fn rsi_zero_loss_with_gain_is_exactly_100() {
        let rsi = Rsi::new(3).unwrap();
        // deltas 0, 0, +1: avg_gain = 1/3, avg_loss = 0
        let values = rsi.calculate_prices(&[10.0, 10.0, 10.0, 11.0]);
        assert_eq!(values[3], Some(100.0));
    }

    #[test]
    fn rsi_flat_window_is_undefined() {
        let rsi = Rsi::new(3).unwrap();
        let values = rsi.calculate_prices(&[5.0; 6]);
        assert!(values.iter().all(Option::is_none));
    }

    #[test]
    fn rsi_known_value() {
        let rsi = Rsi::new(2).unwrap();
        // deltas +2, -1: avg_gain = 1, avg_loss = 0.5, rs = 2 -> 66.67
        let values = rsi.calculate_prices(&[10.0, 12.0, 11.0]);
        assert!((values[2].unwrap() - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn rsi_bounded() {
        let rsi = Rsi::new(14).unwrap();
        let closes: Vec<f64> = (0..120)
            .map(|i| 50.0 + (i as f64 * 1.3).sin() * 7.0 + (i % 7) as f64)
            .collect();
        for v in rsi.calculate_prices(&closes).into_iter().flatten() {
            assert!((0.0..=100.0).contains(&v));
        }
    }
}
