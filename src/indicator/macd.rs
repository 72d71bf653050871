use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::ma::Ema;
use crate::indicator::{close_prices, finite};
use crate::model::Bar;

pub struct Macd {
    fast: Ema,
    slow: Ema,
    signal: Ema,
}

/// MACD line, signal line and histogram, each aligned with the bars.
#[derive(Debug, Clone, PartialEq)]
pub struct MacdSeries {
    pub macd: Vec<Option<f64>>,
    pub signal: Vec<Option<f64>>,
    pub histogram: Vec<Option<f64>>,
}

impl Macd {
    pub fn new(
        fast_period: usize,
        slow_period: usize,
        signal_period: usize,
    ) -> Result<Self, Report<IndicatorError>> {
        if fast_period == 0 || slow_period == 0 || signal_period == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "all periods must be > 0".into(),
            });
        }
        if fast_period >= slow_period {
            bail!(IndicatorError::InvalidParameter {
                name: "fast_period must be < slow_period".into(),
            });
        }
        Ok(Self {
            fast: Ema::new(fast_period)?,
            slow: Ema::new(slow_period)?,
            signal: Ema::new(signal_period)?,
        })
    }

    pub fn calculate_full(&self, bars: &[Bar]) -> MacdSeries {
        self.calculate_prices(&close_prices(bars))
    }

    pub fn calculate_prices(&self, prices: &[f64]) -> MacdSeries {
        let fast = self.fast.calculate_prices(prices);
        let slow = self.slow.calculate_prices(prices);

        let macd: Vec<Option<f64>> = fast
            .iter()
            .zip(&slow)
            .map(|(f, s)| f.zip(*s).and_then(|(f, s)| finite(f - s)))
            .collect();

        let line: Vec<f64> = macd.iter().map(|v| v.unwrap_or(f64::NAN)).collect();
        let signal = self.signal.calculate_prices(&line);

        let histogram = macd
            .iter()
            .zip(&signal)
            .map(|(m, s)| m.zip(*s).map(|(m, s)| m - s))
            .collect();

        MacdSeries {
            macd,
            signal,
            histogram,
        }
    }
}
