//! Classification of indicator states and the closing recommendation.

use derive_more::Display;

use crate::config::Thresholds;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum RsiZone {
    #[display("overbought")]
    Overbought,
    #[display("oversold")]
    Oversold,
    #[display("neutral")]
    Neutral,
}

pub fn rsi_zone(rsi: f64, thresholds: &Thresholds) -> RsiZone {
    if rsi > thresholds.rsi_overbought {
        RsiZone::Overbought
    } else if rsi < thresholds.rsi_oversold {
        RsiZone::Oversold
    } else {
        RsiZone::Neutral
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Alignment {
    #[display("bullish alignment (MA3 > MA5 > MA8 > MA13 > MA21)")]
    Bullish,
    #[display("bearish alignment (MA3 < MA5 < MA8 < MA13 < MA21)")]
    Bearish,
    #[display("mixed, moving averages are crossing; watch for a trend change")]
    Mixed,
}

/// Classify moving averages given shortest period first.
///
/// Any undefined value makes the alignment mixed.
pub fn ma_alignment(values: &[Option<f64>]) -> Alignment {
    let Some(values) = values.iter().copied().collect::<Option<Vec<f64>>>() else {
        return Alignment::Mixed;
    };
    if values.len() < 2 {
        return Alignment::Mixed;
    }
    if values.windows(2).all(|w| w[0] > w[1]) {
        Alignment::Bullish
    } else if values.windows(2).all(|w| w[0] < w[1]) {
        Alignment::Bearish
    } else {
        Alignment::Mixed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum MacdCross {
    #[display("golden cross")]
    Golden,
    #[display("death cross")]
    Death,
}

pub fn macd_cross(macd: f64, signal: f64) -> MacdCross {
    if macd > signal {
        MacdCross::Golden
    } else {
        MacdCross::Death
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum BandPosition {
    #[display("price is above the upper band, a pullback is possible")]
    AboveUpper,
    #[display("price is below the lower band, a rebound is possible")]
    BelowLower,
    #[display("price is moving inside the band")]
    Inside,
}

pub fn band_position(price: f64, upper: f64, lower: f64) -> BandPosition {
    if price > upper {
        BandPosition::AboveUpper
    } else if price < lower {
        BandPosition::BelowLower
    } else {
        BandPosition::Inside
    }
}

/// Position of `price` within the band in percent (0 = lower, 100 = upper).
/// Undefined for a zero-width band.
pub fn band_percent(price: f64, upper: f64, lower: f64) -> Option<f64> {
    let width = upper - lower;
    (width != 0.0)
        .then(|| (price - lower) / width * 100.0)
        .filter(|v| v.is_finite())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum TurnoverTier {
    #[display("extremely high, trading is very active")]
    Extreme,
    #[display("high, strong market activity")]
    High,
    #[display("moderate, fairly active trading")]
    Moderate,
    #[display("low, thin trading")]
    Low,
}

pub fn turnover_tier(turnover: f64, thresholds: &Thresholds) -> TurnoverTier {
    if turnover > thresholds.turnover_extreme {
        TurnoverTier::Extreme
    } else if turnover > thresholds.turnover_high {
        TurnoverTier::High
    } else if turnover > thresholds.turnover_moderate {
        TurnoverTier::Moderate
    } else {
        TurnoverTier::Low
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum VolumeTrend {
    #[display("expanding")]
    Expanding,
    #[display("contracting")]
    Contracting,
}

pub fn volume_trend(latest: f64, average: f64) -> VolumeTrend {
    if latest > average {
        VolumeTrend::Expanding
    } else {
        VolumeTrend::Contracting
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum BullishSignal {
    #[display("short-term MA5 is above MA13")]
    ShortAboveLong,
    #[display("RSI is in the rising zone")]
    RsiRising,
    #[display("MACD shows a golden cross")]
    MacdGolden,
    #[display("price is above the Bollinger middle band")]
    AboveMiddleBand,
}

#[derive(Debug, Clone, Copy, PartialEq, Display)]
pub enum Risk {
    #[display("RSI is overbought, watch for a pullback")]
    RsiOverbought,
    #[display("price broke above the upper Bollinger band, watch for a pullback")]
    AboveUpperBand,
    #[display("volume expanded sharply, expect larger price swings")]
    VolumeSurge,
    #[display("turnover reached {_0:.2}%, trading is overheated")]
    HighTurnover(f64),
}

/// Latest-bar values the tallies are computed from.
#[derive(Debug, Clone, Default)]
pub struct SignalInputs {
    pub close: f64,
    pub ma5: Option<f64>,
    pub ma13: Option<f64>,
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub signal: Option<f64>,
    pub bb_middle: Option<f64>,
    pub bb_upper: Option<f64>,
    pub latest_volume: f64,
    pub average_volume: f64,
    pub turnover: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Recommendation {
    #[display("consider buying on dips")]
    BuyOnDips,
    #[display("stay cautious and keep positions small")]
    Caution,
    #[display("wait for a clearer signal")]
    Wait,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalTally {
    pub bullish: Vec<BullishSignal>,
    pub risks: Vec<Risk>,
}

impl SignalTally {
    /// Undefined inputs never satisfy a condition.
    pub fn evaluate(inputs: &SignalInputs, thresholds: &Thresholds) -> Self {
        let mut bullish = Vec::new();
        if inputs.ma5.zip(inputs.ma13).is_some_and(|(a, b)| a > b) {
            bullish.push(BullishSignal::ShortAboveLong);
        }
        if inputs.rsi.is_some_and(|r| r > thresholds.rsi_bullish) {
            bullish.push(BullishSignal::RsiRising);
        }
        if inputs.macd.zip(inputs.signal).is_some_and(|(m, s)| m > s) {
            bullish.push(BullishSignal::MacdGolden);
        }
        if inputs.bb_middle.is_some_and(|m| inputs.close > m) {
            bullish.push(BullishSignal::AboveMiddleBand);
        }

        let mut risks = Vec::new();
        if inputs.rsi.is_some_and(|r| r > thresholds.rsi_overbought) {
            risks.push(Risk::RsiOverbought);
        }
        if inputs.bb_upper.is_some_and(|u| inputs.close > u) {
            risks.push(Risk::AboveUpperBand);
        }
        if inputs.latest_volume > inputs.average_volume * thresholds.volume_surge_multiplier {
            risks.push(Risk::VolumeSurge);
        }
        if let Some(turnover) = inputs.turnover.filter(|t| *t > thresholds.turnover_risk) {
            risks.push(Risk::HighTurnover(turnover));
        }

        Self { bullish, risks }
    }

    pub fn recommendation(&self, thresholds: &Thresholds) -> Recommendation {
        if self.bullish.len() >= thresholds.bullish_signal_min && self.risks.is_empty() {
            Recommendation::BuyOnDips
        } else if self.risks.len() >= thresholds.caution_risk_min {
            Recommendation::Caution
        } else {
            Recommendation::Wait
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t() -> Thresholds {
        Thresholds::default()
    }

    #[test]
    fn rsi_zone_boundaries_are_exclusive() {
        assert_eq!(rsi_zone(70.0, &t()), RsiZone::Neutral);
        assert_eq!(rsi_zone(70.1, &t()), RsiZone::Overbought);
        assert_eq!(rsi_zone(30.0, &t()), RsiZone::Neutral);
        assert_eq!(rsi_zone(29.9, &t()), RsiZone::Oversold);
    }

    #[test]
    fn alignment_requires_strict_chain() {
        let up = [Some(5.0), Some(4.0), Some(3.0), Some(2.0), Some(1.0)];
        let down = [Some(1.0), Some(2.0), Some(3.0), Some(4.0), Some(5.0)];
        let tie = [Some(5.0), Some(4.0), Some(4.0), Some(2.0), Some(1.0)];
        let gap = [Some(5.0), Some(4.0), Some(3.0), Some(2.0), None];
        assert_eq!(ma_alignment(&up), Alignment::Bullish);
        assert_eq!(ma_alignment(&down), Alignment::Bearish);
        assert_eq!(ma_alignment(&tie), Alignment::Mixed);
        assert_eq!(ma_alignment(&gap), Alignment::Mixed);
    }

    #[test]
    fn macd_equal_lines_is_death_cross() {
        assert_eq!(macd_cross(1.0, 0.5), MacdCross::Golden);
        assert_eq!(macd_cross(0.5, 0.5), MacdCross::Death);
    }

    #[test]
    fn band_classification() {
        assert_eq!(band_position(11.0, 10.0, 8.0), BandPosition::AboveUpper);
        assert_eq!(band_position(7.0, 10.0, 8.0), BandPosition::BelowLower);
        assert_eq!(band_position(10.0, 10.0, 8.0), BandPosition::Inside);
        assert_eq!(band_percent(9.0, 10.0, 8.0), Some(50.0));
        assert_eq!(band_percent(9.0, 9.0, 9.0), None);
    }

    #[test]
    fn turnover_tiers() {
        assert_eq!(turnover_tier(25.0, &t()), TurnoverTier::Extreme);
        assert_eq!(turnover_tier(20.0, &t()), TurnoverTier::High);
        assert_eq!(turnover_tier(6.0, &t()), TurnoverTier::Moderate);
        assert_eq!(turnover_tier(5.0, &t()), TurnoverTier::Low);
    }

    #[test]
    fn volume_trend_compares_to_average() {
        assert_eq!(volume_trend(2.0, 1.0), VolumeTrend::Expanding);
        assert_eq!(volume_trend(1.0, 1.0), VolumeTrend::Contracting);
    }

    fn strong_inputs() -> SignalInputs {
        SignalInputs {
            close: 12.0,
            ma5: Some(11.5),
            ma13: Some(11.0),
            rsi: Some(60.0),
            macd: Some(0.3),
            signal: Some(0.2),
            bb_middle: Some(11.0),
            bb_upper: Some(13.0),
            latest_volume: 100.0,
            average_volume: 90.0,
            turnover: Some(3.0),
        }
    }

    #[test]
    fn all_bullish_no_risk_recommends_buying() {
        let tally = SignalTally::evaluate(&strong_inputs(), &t());
        assert_eq!(tally.bullish.len(), 4);
        assert!(tally.risks.is_empty());
        assert_eq!(tally.recommendation(&t()), Recommendation::BuyOnDips);
    }

    #[test]
    fn two_risks_recommend_caution() {
        let inputs = SignalInputs {
            rsi: Some(75.0),
            close: 14.0,
            ..strong_inputs()
        };
        let tally = SignalTally::evaluate(&inputs, &t());
        assert_eq!(tally.risks, vec![Risk::RsiOverbought, Risk::AboveUpperBand]);
        assert_eq!(tally.recommendation(&t()), Recommendation::Caution);
    }

    #[test]
    fn single_risk_waits() {
        let inputs = SignalInputs {
            latest_volume: 200.0,
            ..strong_inputs()
        };
        let tally = SignalTally::evaluate(&inputs, &t());
        assert_eq!(tally.risks, vec![Risk::VolumeSurge]);
        assert_eq!(tally.recommendation(&t()), Recommendation::Wait);
    }

    #[test]
    fn high_turnover_is_a_risk_and_undefined_inputs_are_not_signals() {
        let inputs = SignalInputs {
            turnover: Some(16.5),
            latest_volume: 1.0,
            average_volume: 1.0,
            ..SignalInputs::default()
        };
        let tally = SignalTally::evaluate(&inputs, &t());
        assert!(tally.bullish.is_empty());
        assert_eq!(tally.risks, vec![Risk::HighTurnover(16.5)]);
        assert_eq!(
            tally.risks[0].to_string(),
            "turnover reached 16.50%, trading is overheated"
        );
    }
}
