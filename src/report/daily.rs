//! Daily technical-analysis report.

use std::cmp::Ordering;

use chrono::NaiveDateTime;
use error_stack::Report;
use tracing::{info, warn};

use crate::config::Thresholds;
use crate::error::IndicatorError;
use crate::indicator::volume::volume_ratio;
use crate::indicator::{IndicatorRow, IndicatorSeries, MA_PERIODS};
use crate::model::Bar;
use crate::predict::{self, PredictionPoint};
use crate::report::{
    ReportContext, Subject, finish, finite_mean, fmt_num, fmt_opt, header, ten_thousands,
};
use crate::signal::{
    SignalInputs, SignalTally, band_percent, band_position, ma_alignment, macd_cross,
    rsi_zone, turnover_tier, volume_trend,
};
use crate::source::{self, DateRange};

const LABEL: &str = "daily";
pub const STEPS: usize = 5;
/// Trading days shown in the table and used for volume statistics.
pub const RECENT_BARS: usize = 21;

const TITLE: &str = "daily technical report";

/// Bars plus the window they were requested for.
pub struct DailyInput<'a> {
    pub subject: &'a Subject,
    pub bars: &'a [Bar],
    pub range: Option<DateRange>,
    pub now: NaiveDateTime,
}

pub async fn run(ctx: &ReportContext<'_>, subject: &Subject) -> String {
    ctx.progress.update(LABEL, 0, STEPS, "fetching daily bars");
    let series = match source::fetch_daily_series(
        ctx.source,
        &subject.security,
        ctx.today(),
        ctx.config.fetch.daily_lookback_days,
    )
    .await
    {
        Ok(series) => series,
        Err(e) => {
            warn!(code = %subject.security, error = ?e, "daily report has no data");
            ctx.progress.update(LABEL, STEPS, STEPS, "no data");
            return unavailable(subject, ctx.now);
        }
    };
    ctx.progress.update(LABEL, 1, STEPS, "daily bars fetched");

    let input = DailyInput {
        subject,
        bars: &series.bars,
        range: Some(series.range),
        now: ctx.now,
    };
    let indicators = match IndicatorSeries::compute(&series.bars) {
        Ok(indicators) => indicators,
        Err(e) => {
            warn!(code = %subject.security, error = ?e, "indicator computation failed");
            ctx.progress.update(LABEL, STEPS, STEPS, "failed");
            return unavailable(subject, ctx.now);
        }
    };
    ctx.progress.update(LABEL, 2, STEPS, "indicators computed");

    let predictions = predict::predict(&series.bars);
    ctx.progress.update(LABEL, 3, STEPS, "forecast ready");

    let text = render_analysis(&input, &indicators, &predictions, &ctx.config.thresholds);
    ctx.progress.update(LABEL, 4, STEPS, "report rendered");

    info!(code = %subject.security, bars = series.bars.len(), "daily report rendered");
    ctx.progress.update(LABEL, STEPS, STEPS, "done");
    text
}

fn unavailable(subject: &Subject, now: NaiveDateTime) -> String {
    let mut lines = header(TITLE, subject, now);
    lines.push(format!(
        "Data unavailable: no daily bars could be fetched for {}.",
        subject.security.code
    ));
    finish(lines)
}

pub fn render_analysis(
    input: &DailyInput<'_>,
    indicators: &IndicatorSeries,
    predictions: &Result<Vec<PredictionPoint>, Report<IndicatorError>>,
    thresholds: &Thresholds,
) -> String {
    let bars = input.bars;
    let (Some(last_bar), Some(latest)) = (bars.last(), indicators.last()) else {
        return unavailable(input.subject, input.now);
    };

    let mut lines = header(TITLE, input.subject, input.now);
    basic_info(&mut lines, input);

    let start = bars.len().saturating_sub(RECENT_BARS);
    recent_table(&mut lines, &bars[start..], indicators, start);
    ranking(&mut lines, &latest);

    let average_volume = finite_mean(bars[start..].iter().map(|b| b.volume));
    volume_section(&mut lines, last_bar.volume, average_volume);

    let ma_values: Vec<Option<f64>> = MA_PERIODS.iter().map(|&p| latest.ma(p)).collect();
    lines.push("## Moving average alignment".into());
    lines.push(ma_alignment(&ma_values).to_string());
    lines.push(String::new());

    lines.push("## Technical indicators".into());
    lines.push(String::new());
    macd_section(&mut lines, &latest);
    rsi_section(&mut lines, &latest, thresholds);
    bollinger_section(&mut lines, last_bar.close, &latest);
    turnover_section(&mut lines, last_bar.turnover_rate, thresholds);

    forecast_section(&mut lines, predictions);

    let inputs = SignalInputs {
        close: last_bar.close,
        ma5: latest.ma(5),
        ma13: latest.ma(13),
        rsi: latest.rsi,
        macd: latest.macd,
        signal: latest.signal,
        bb_middle: latest.bb_middle,
        bb_upper: latest.bb_upper,
        latest_volume: last_bar.volume,
        average_volume: average_volume.unwrap_or(f64::NAN),
        turnover: last_bar.turnover_rate.filter(|t| t.is_finite()),
    };
    summary_section(&mut lines, &SignalTally::evaluate(&inputs, thresholds), thresholds);

    finish(lines)
}

fn basic_info(lines: &mut Vec<String>, input: &DailyInput<'_>) {
    let first = input.bars.first().map(Bar::date);
    let start = input.range.and_then(|r| r.start).or(first);
    let end = input
        .range
        .map(|r| r.end)
        .or_else(|| input.bars.last().map(Bar::date));
    let ymd = |d: Option<chrono::NaiveDate>| {
        d.map(|d| d.format("%Y%m%d").to_string())
            .unwrap_or_else(|| "N/A".into())
    };

    lines.push("## Basic information".into());
    lines.push("Period: daily".into());
    lines.push(format!("Date range: {} - {}", ymd(start), ymd(end)));
    lines.push(format!("Bars: {}", input.bars.len()));
    lines.push(String::new());
}

fn recent_table(
    lines: &mut Vec<String>,
    recent: &[Bar],
    indicators: &IndicatorSeries,
    offset: usize,
) {
    let ma_headers: Vec<String> = MA_PERIODS.iter().map(|p| format!("MA{p}")).collect();
    lines.push(format!("## Last {} trading days", recent.len()));
    lines.push(format!(
        "| Date | Close | Volume (10k lots) | Volume ratio | Turnover | {} |",
        ma_headers.join(" | ")
    ));
    lines.push(format!("|{}", "---|".repeat(5 + MA_PERIODS.len())));
    for (i, bar) in recent.iter().enumerate() {
        if let Some(row) = indicators.row(offset + i) {
            lines.push(table_row(bar, &row));
        }
    }
    lines.push(String::new());
}

fn table_row(bar: &Bar, row: &IndicatorRow) -> String {
    let turnover = match bar.turnover_rate.filter(|t| t.is_finite()) {
        Some(t) => format!("{t:.2}%"),
        None => "N/A".into(),
    };
    let mas: Vec<String> = row
        .moving_averages
        .iter()
        .map(|(_, v)| fmt_opt(*v, 2))
        .collect();
    format!(
        "| {} | {} | {} | {} | {turnover} | {} |",
        bar.date().format("%Y-%m-%d"),
        fmt_num(bar.close, 2),
        fmt_num(ten_thousands(bar.volume), 2),
        fmt_num(volume_ratio(bar.volume, row.volume_ma5), 2),
        mas.join(" | ")
    )
}

fn ranking(lines: &mut Vec<String>, latest: &IndicatorRow) {
    let mut ranked = latest.moving_averages.clone();
    ranked.sort_by(|a, b| match (a.1, b.1) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });

    lines.push("## Moving averages, highest first".into());
    for (period, value) in ranked {
        lines.push(format!("MA{period}: {}", fmt_opt(value, 2)));
    }
    lines.push(String::new());
}

fn volume_section(lines: &mut Vec<String>, latest: f64, average: Option<f64>) {
    lines.push("## Volume".into());
    lines.push(format!(
        "{RECENT_BARS}-day average volume: {} (10k lots)",
        fmt_opt(average.map(ten_thousands), 2)
    ));
    lines.push(format!(
        "Latest volume: {} (10k lots)",
        fmt_num(ten_thousands(latest), 2)
    ));
    let trend = average
        .filter(|_| latest.is_finite())
        .map(|avg| volume_trend(latest, avg).to_string())
        .unwrap_or_else(|| "N/A".into());
    lines.push(format!("Volume trend: {trend}"));
    lines.push(String::new());
}

fn macd_section(lines: &mut Vec<String>, latest: &IndicatorRow) {
    lines.push("### MACD".into());
    if let (Some(macd), Some(signal)) = (latest.macd, latest.signal) {
        lines.push(format!("State: {}", macd_cross(macd, signal)));
        lines.push(format!("Strength: {:.3}", (macd - signal).abs()));
    }
    lines.push(format!("MACD: {}", fmt_opt(latest.macd, 3)));
    lines.push(format!("Signal: {}", fmt_opt(latest.signal, 3)));
    lines.push(format!("Histogram: {}", fmt_opt(latest.histogram, 3)));
    lines.push(String::new());
}

fn rsi_section(lines: &mut Vec<String>, latest: &IndicatorRow, thresholds: &Thresholds) {
    lines.push("### RSI".into());
    match latest.rsi {
        Some(rsi) => lines.push(format!("RSI: {rsi:.1} ({})", rsi_zone(rsi, thresholds))),
        None => lines.push("RSI: N/A".into()),
    }
    lines.push(String::new());
}

fn bollinger_section(lines: &mut Vec<String>, price: f64, latest: &IndicatorRow) {
    lines.push("### Bollinger bands".into());
    lines.push(format!("Price: {}", fmt_num(price, 2)));
    lines.push(format!("Upper band: {}", fmt_opt(latest.bb_upper, 2)));
    lines.push(format!("Middle band: {}", fmt_opt(latest.bb_middle, 2)));
    lines.push(format!("Lower band: {}", fmt_opt(latest.bb_lower, 2)));
    match (latest.bb_upper, latest.bb_lower) {
        (Some(upper), Some(lower)) => {
            let position = band_percent(price, upper, lower);
            lines.push(format!("Band position: {}%", fmt_opt(position, 1)));
            lines.push(band_position(price, upper, lower).to_string());
        }
        _ => lines.push("Band position: N/A".into()),
    }
    lines.push(String::new());
}

fn turnover_section(lines: &mut Vec<String>, turnover: Option<f64>, thresholds: &Thresholds) {
    let Some(turnover) = turnover.filter(|t| t.is_finite()) else {
        return;
    };
    lines.push("### Turnover".into());
    lines.push(format!(
        "Turnover: {turnover:.2}% - {}",
        turnover_tier(turnover, thresholds)
    ));
    lines.push(String::new());
}

fn forecast_section(
    lines: &mut Vec<String>,
    predictions: &Result<Vec<PredictionPoint>, Report<IndicatorError>>,
) {
    lines.push(format!(
        "## Moving average forecast, next {} trading days",
        predict::PREDICT_DAYS
    ));
    let points = match predictions {
        Ok(points) if !points.is_empty() => points,
        Ok(_) => {
            lines.push("Forecast unavailable.".into());
            lines.push(String::new());
            return;
        }
        Err(e) => {
            lines.push(format!("Forecast unavailable: {}", e.current_context()));
            lines.push(String::new());
            return;
        }
    };

    lines.push("| Date | MA13 | MA21 | Difference |".into());
    lines.push("|---|---|---|---|".into());
    for point in points {
        lines.push(format!(
            "| {} | {:.2} | {:.2} | {:.2} |",
            point.date.format("%Y-%m-%d"),
            point.ma13,
            point.ma21,
            point.ma13 - point.ma21
        ));
    }
    lines.push(String::new());

    if let (Some(first), Some(last)) = (points.first(), points.last()) {
        lines.push(format!("MA13 5-day change: {:.2}", last.ma13 - first.ma13));
        lines.push(format!("MA21 5-day change: {:.2}", last.ma21 - first.ma21));
    }
    lines.push(String::new());
}

fn summary_section(lines: &mut Vec<String>, tally: &SignalTally, thresholds: &Thresholds) {
    lines.push("## Summary".into());
    lines.push(String::new());
    lines.push("### Trend signals".into());
    if tally.bullish.is_empty() {
        lines.push("No clear bullish signal".into());
    } else {
        lines.push("Bullish signals:".into());
        lines.extend(tally.bullish.iter().map(|s| format!("- {s}")));
    }
    lines.push(String::new());

    lines.push("### Risks".into());
    if tally.risks.is_empty() {
        lines.push("No clear risk signal".into());
    } else {
        lines.extend(tally.risks.iter().map(|r| format!("- {r}")));
    }
    lines.push(String::new());

    lines.push("### Recommendation".into());
    lines.push(tally.recommendation(thresholds).to_string());
}
