use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::ma::Sma;
use crate::indicator::{close_prices, finite};
use crate::model::Bar;

pub struct BollingerBands {
    period: usize,
    std_dev_multiplier: f64,
}

/// Upper, middle and lower bands aligned with the bars.
#[derive(Debug, Clone, PartialEq)]
pub struct Bands {
    pub upper: Vec<Option<f64>>,
    pub middle: Vec<Option<f64>>,
    pub lower: Vec<Option<f64>>,
}

impl BollingerBands {
    /// `period` must be at least 2 since the bands use the sample standard
    /// deviation.
    pub fn new(period: usize, std_dev_multiplier: f64) -> Result<Self, Report<IndicatorError>> {
        if period < 2 {
            bail!(IndicatorError::InvalidParameter {
                name: "period must be >= 2".into(),
            });
        }
        if std_dev_multiplier <= 0.0 {
            bail!(IndicatorError::InvalidParameter {
                name: "std_dev_multiplier must be > 0".into(),
            });
        }
        Ok(Self {
            period,
            std_dev_multiplier,
        })
    }

    pub fn calculate_bands(&self, bars: &[Bar]) -> Bands {
        let prices = close_prices(bars);
        let middle = Sma::new(self.period)
            .map(|sma| sma.calculate_prices(&prices))
            .unwrap_or_else(|_| vec![None; prices.len()]);

        let mut upper = vec![None; prices.len()];
        let mut lower = vec![None; prices.len()];
        if prices.len() >= self.period {
            for (i, window) in prices.windows(self.period).enumerate() {
                let idx = i + self.period - 1;
                let Some(mean) = middle[idx] else {
                    continue;
                };
                let variance = window.iter().map(|&p| (p - mean).powi(2)).sum::<f64>()
                    / (self.period - 1) as f64;
                let width = self.std_dev_multiplier * variance.sqrt();
                upper[idx] = finite(mean + width);
                lower[idx] = finite(mean - width);
            }
        }

        Bands {
            upper,
            middle,
            lower,
        }
    }
}
