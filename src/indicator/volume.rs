use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::{Indicator, rolling_mean, volumes};
use crate::model::Bar;

/// Volume Moving Average: simple average of traded volume over a period.
pub struct VolumeMA {
    period: usize,
}

impl VolumeMA {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        if period == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "period must be > 0".into(),
            });
        }
        Ok(Self { period })
    }
}

impl Indicator for VolumeMA {
    fn calculate(&self, bars: &[Bar]) -> Vec<Option<f64>> {
        rolling_mean(&volumes(bars), self.period)
    }
}

/// Volume relative to its moving average, `0.0` where the average is
/// undefined.
///
/// An average of exactly zero (five bars without trades) counts as undefined,
/// since the quotient would be infinite or NaN. A non-finite `volume` passes
/// through, so callers format the result with an N/A fallback.
pub fn volume_ratio(volume: f64, volume_ma: Option<f64>) -> f64 {
    match volume_ma {
        Some(ma) if ma != 0.0 => volume / ma,
        _ => 0.0,
    }
}
