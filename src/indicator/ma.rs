use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::{Indicator, close_prices, finite, rolling_mean};
use crate::model::Bar;

/// Simple Moving Average of closes.
pub struct Sma {
    period: usize,
}

impl Sma {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        if period == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "period must be > 0".into(),
            });
        }
        Ok(Self { period })
    }

    /// Calculate SMA values from a price slice (internal helper).
    pub fn calculate_prices(&self, prices: &[f64]) -> Vec<Option<f64>> {
        rolling_mean(prices, self.period)
    }
}

impl Indicator for Sma {
    fn calculate(&self, bars: &[Bar]) -> Vec<Option<f64>> {
        self.calculate_prices(&close_prices(bars))
    }
}

/// Exponential Moving Average without bias adjustment.
///
/// The recursion is seeded with the first finite observation, so the output
/// is defined from that bar onward. Non-finite inputs carry the previous
/// value forward.
pub struct Ema {
    period: usize,
}

impl Ema {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        if period == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "period must be > 0".into(),
            });
        }
        Ok(Self { period })
    }

    pub fn alpha(&self) -> f64 {
        2.0 / (self.period as f64 + 1.0)
    }

    /// Calculate EMA values from a price slice (internal helper).
    pub fn calculate_prices(&self, prices: &[f64]) -> Vec<Option<f64>> {
        let k = self.alpha();
        let mut ema: Option<f64> = None;
        prices
            .iter()
            .map(|&price| {
                if price.is_finite() {
                    ema = Some(match ema {
                        Some(prev) => price * k + prev * (1.0 - k),
                        None => price,
                    });
                }
                ema.and_then(finite)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::tests::bars_from_closes;

    #[test]
    fn sma_period_zero_invalid() {
        assert!(Sma::new(0).is_err());
    }

    #[test]
    fn sma_short_input_all_undefined() {
        let sma = Sma::new(5).unwrap();
        let values = sma.calculate(&bars_from_closes(&[1.0; 4]));
        assert_eq!(values, vec![None; 4]);
    }

    #[test]
    fn sma_flat_prices() {
        let sma = Sma::new(3).unwrap();
        let values = sma.calculate(&bars_from_closes(&[10.0; 5]));
        assert_eq!(values.iter().flatten().count(), 3);
        for v in values.iter().flatten() {
            assert!((v - 10.0).abs() < 1e-9);
        }
    }

    #[test]
    fn sma_known_value() {
        let sma = Sma::new(3).unwrap();
        let values = sma.calculate(&bars_from_closes(&[1.0, 2.0, 3.0, 4.0]));
        // (1+2+3)/3 = 2.0, (2+3+4)/3 = 3.0
        assert_eq!(values, vec![None, None, Some(2.0), Some(3.0)]);
    }

    #[test]
    fn ema_period_zero_invalid() {
        assert!(Ema::new(0).is_err());
    }

    #[test]
    fn ema_seeds_from_first_observation() {
        let ema = Ema::new(3).unwrap();
        let values = ema.calculate_prices(&[1.0, 2.0, 3.0]);
        // alpha = 0.5: 1.0, 1.5, 2.25
        assert_eq!(values, vec![Some(1.0), Some(1.5), Some(2.25)]);
    }

    #[test]
    fn ema_flat_prices() {
        let ema = Ema::new(12).unwrap();
        for v in ema.calculate_prices(&[10.0; 6]) {
            assert!((v.unwrap() - 10.0).abs() < 1e-9);
        }
    }

    #[test]
    fn ema_skips_gaps() {
        let ema = Ema::new(3).unwrap();
        let values = ema.calculate_prices(&[f64::NAN, 2.0, f64::NAN, 4.0]);
        assert_eq!(values, vec![None, Some(2.0), Some(2.0), Some(3.0)]);
    }
}
