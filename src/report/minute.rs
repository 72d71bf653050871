//! Intraday (5/15/60-minute) bar report.

use chrono::NaiveDateTime;
use tracing::{info, warn};

use crate::model::{Bar, Resolution};
use crate::report::{
    ReportContext, Subject, finish, finite_max, finite_mean, finite_min, fmt_num, fmt_opt, header,
    ten_thousands,
};
use crate::source;

const LABEL: &str = "minute";
pub const STEPS: usize = 6;
/// Most recent bars listed per resolution.
pub const RECENT_BARS: usize = 20;

const TITLE: &str = "intraday bar report";

/// Fetch and section order.
const REPORT_ORDER: [Resolution; 3] = [Resolution::Min15, Resolution::Min5, Resolution::Min60];
/// Row order of the cross-resolution comparison.
const COMPARISON_ORDER: [Resolution; 3] = [Resolution::Min5, Resolution::Min15, Resolution::Min60];

#[derive(Debug, Clone)]
pub struct MinuteSeries {
    pub resolution: Resolution,
    pub lookback_days: u32,
    pub bars: Vec<Bar>,
}

pub async fn run(ctx: &ReportContext<'_>, subject: &Subject) -> String {
    let lookbacks = ctx.config.fetch.minute_lookback_days;
    let mut series = Vec::with_capacity(REPORT_ORDER.len());

    for (step, resolution) in REPORT_ORDER.into_iter().enumerate() {
        ctx.progress
            .update(LABEL, step, STEPS, &format!("fetching {resolution} bars"));
        let lookback_days = lookbacks.days(resolution).unwrap_or(1);
        match source::fetch_minute_series(
            ctx.source,
            &subject.security,
            resolution,
            ctx.today(),
            lookback_days,
        )
        .await
        {
            Ok(bars) => series.push(MinuteSeries {
                resolution,
                lookback_days,
                bars,
            }),
            Err(e) => {
                warn!(code = %subject.security, resolution = %resolution, error = ?e, "minute series unavailable");
                ctx.progress.update(LABEL, STEPS, STEPS, "incomplete data");
                return incomplete(subject, ctx.now);
            }
        }
    }
    ctx.progress.update(LABEL, 3, STEPS, "all resolutions fetched");

    ctx.progress.update(LABEL, 4, STEPS, "analysing resolutions");
    let text = render(subject, ctx.now, &series);
    ctx.progress.update(LABEL, 5, STEPS, "report rendered");

    info!(code = %subject.security, "minute report rendered");
    ctx.progress.update(LABEL, STEPS, STEPS, "done");
    text
}

/// Report body when any resolution could not be fetched.
pub fn incomplete(subject: &Subject, now: NaiveDateTime) -> String {
    let mut lines = header(TITLE, subject, now);
    lines.push(format!(
        "Incomplete minute data: not every resolution could be fetched for {}.",
        subject.security.code
    ));
    finish(lines)
}

/// Render all three series. Any missing resolution yields [`incomplete`].
pub fn render(subject: &Subject, now: NaiveDateTime, series: &[MinuteSeries]) -> String {
    let find = |r: Resolution| series.iter().find(|s| s.resolution == r && !s.bars.is_empty());
    if REPORT_ORDER.iter().any(|&r| find(r).is_none()) {
        return incomplete(subject, now);
    }

    let mut lines = header(TITLE, subject, now);
    for s in REPORT_ORDER.iter().filter_map(|&r| find(r)) {
        series_section(&mut lines, s);
    }

    lines.push("## Overview".into());
    lines.push("### Price range by resolution".into());
    lines.push("| Resolution | High | Low | Amplitude | Mean volume (10k lots) |".into());
    lines.push("|---|---|---|---|---|".into());
    let compared: Vec<&MinuteSeries> = COMPARISON_ORDER.iter().filter_map(|&r| find(r)).collect();
    for s in &compared {
        let high = finite_max(s.bars.iter().map(|b| b.high));
        let low = finite_min(s.bars.iter().map(|b| b.low));
        let amplitude = high.zip(low).map(|(h, l)| h - l);
        let volume = finite_mean(s.bars.iter().map(|b| b.volume)).map(ten_thousands);
        lines.push(format!(
            "| {} | {} | {} | {} | {} |",
            resolution_label(s.resolution),
            fmt_opt(high, 2),
            fmt_opt(low, 2),
            fmt_opt(amplitude, 2),
            fmt_opt(volume, 2)
        ));
    }
    lines.push(String::new());

    lines.push("### Latest bars".into());
    for s in &compared {
        if let Some(bar) = s.bars.last() {
            lines.push(format!(
                "- Latest {} bar: open {}, close {}, change {}%",
                resolution_label(s.resolution),
                fmt_num(bar.open, 2),
                fmt_num(bar.close, 2),
                fmt_opt(bar_change_pct(bar), 2)
            ));
        }
    }

    finish(lines)
}

fn series_section(lines: &mut Vec<String>, series: &MinuteSeries) {
    let label = resolution_label(series.resolution);
    let bars = &series.bars;
    lines.push(format!(
        "## {label} bars (last {} days)",
        series.lookback_days
    ));
    lines.push(format!("{} {label} bars fetched", bars.len()));
    lines.push(String::new());

    let range = |values: Vec<f64>, scale: fn(f64) -> f64| {
        let min = finite_min(values.iter().copied()).map(scale);
        let max = finite_max(values.iter().copied()).map(scale);
        format!("{} - {}", fmt_opt(min, 2), fmt_opt(max, 2))
    };
    lines.push("### Statistics".into());
    lines.push(format!(
        "- High range: {}",
        range(bars.iter().map(|b| b.high).collect(), |v| v)
    ));
    lines.push(format!(
        "- Low range: {}",
        range(bars.iter().map(|b| b.low).collect(), |v| v)
    ));
    lines.push(format!(
        "- Volume range (10k): {}",
        range(bars.iter().map(|b| b.volume).collect(), ten_thousands)
    ));
    lines.push(format!(
        "- Mean volume (10k): {}",
        fmt_opt(finite_mean(bars.iter().map(|b| b.volume)).map(ten_thousands), 2)
    ));
    lines.push(String::new());

    let recent = &bars[bars.len().saturating_sub(RECENT_BARS)..];
    lines.push(format!("### Last {} {label} bars", recent.len()));
    lines.push("| Time | Open | Close | High | Low | Volume (10k) | Amount (10k) |".into());
    lines.push("|---|---|---|---|---|---|---|".into());
    for bar in recent {
        lines.push(format!(
            "| {} | {} | {} | {} | {} | {} | {} |",
            bar.timestamp.format("%Y-%m-%d %H:%M"),
            fmt_num(bar.open, 2),
            fmt_num(bar.close, 2),
            fmt_num(bar.high, 2),
            fmt_num(bar.low, 2),
            fmt_num(ten_thousands(bar.volume), 2),
            fmt_num(ten_thousands(bar.amount), 2)
        ));
    }
    lines.push(String::new());
}

fn resolution_label(resolution: Resolution) -> String {
    match resolution.minutes() {
        Some(m) => format!("{m}-minute"),
        None => "daily".into(),
    }
}

/// Open-to-close change of one bar in percent.
fn bar_change_pct(bar: &Bar) -> Option<f64> {
    (bar.open != 0.0)
        .then(|| (bar.close - bar.open) / bar.open * 100.0)
        .filter(|v| v.is_finite())
}
