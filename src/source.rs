pub mod chain;
pub mod eastmoney;
pub mod tencent;

use chrono::{Duration, NaiveDate};
use error_stack::Report;
use futures::future::BoxFuture;
use tracing::info;

use crate::error::SourceError;
use crate::model::{
    Bar, BillboardEntry, CompanyProfile, Dividend, FundFlowDay, MarginDay, NorthboundFlowDay,
    NorthboundHolding, Resolution, Security, SnapshotEntry, Statement, StatementPeriod,
};

/// Abstraction over a public A-share market data provider.
///
/// Uses `BoxFuture` (from `futures` crate) instead of `async fn` in trait
/// to keep the trait object-safe (`dyn DataSource`). An empty result is a
/// normal outcome, not an error.
///
/// Only price bars are required. The financial, northbound, margin,
/// dragon-tiger and index-constituent endpoints default to
/// [`SourceError::Unsupported`].
pub trait DataSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Daily bars, forward-adjusted for equities.
    fn fetch_daily(
        &self,
        security: &Security,
        range: DateRange,
    ) -> BoxFuture<'_, Result<Vec<Bar>, Report<SourceError>>>;

    /// Intraday bars at `resolution`.
    fn fetch_minute(
        &self,
        security: &Security,
        resolution: Resolution,
        range: DateRange,
    ) -> BoxFuture<'_, Result<Vec<Bar>, Report<SourceError>>>;

    /// Current equity snapshot keyed by bare code.
    fn fetch_snapshot(&self) -> BoxFuture<'_, Result<Vec<SnapshotEntry>, Report<SourceError>>>;

    /// Daily main-force capital flow, oldest first.
    fn fetch_fund_flow(
        &self,
        security: &Security,
    ) -> BoxFuture<'_, Result<Vec<FundFlowDay>, Report<SourceError>>>;

    fn fetch_profile(
        &self,
        security: &Security,
    ) -> BoxFuture<'_, Result<Option<CompanyProfile>, Report<SourceError>>>;

    /// The latest `periods` reporting periods of `statement`, oldest first.
    fn fetch_statement(
        &self,
        _security: &Security,
        _statement: Statement,
        _periods: usize,
    ) -> BoxFuture<'_, Result<Vec<StatementPeriod>, Report<SourceError>>> {
        unsupported(self.name(), "financial statements")
    }

    /// Dividend plans, oldest first.
    fn fetch_dividends(
        &self,
        _security: &Security,
    ) -> BoxFuture<'_, Result<Vec<Dividend>, Report<SourceError>>> {
        unsupported(self.name(), "dividends")
    }

    /// Market-wide northbound net buying over the last `days` trading days,
    /// oldest first.
    fn fetch_northbound_flow(
        &self,
        _days: usize,
    ) -> BoxFuture<'_, Result<Vec<NorthboundFlowDay>, Report<SourceError>>> {
        unsupported(self.name(), "northbound flow")
    }

    fn fetch_northbound_holdings(
        &self,
        _security: &Security,
        _days: usize,
    ) -> BoxFuture<'_, Result<Vec<NorthboundHolding>, Report<SourceError>>> {
        unsupported(self.name(), "northbound holdings")
    }

    fn fetch_margin(
        &self,
        _security: &Security,
        _days: usize,
    ) -> BoxFuture<'_, Result<Vec<MarginDay>, Report<SourceError>>> {
        unsupported(self.name(), "margin trading")
    }

    /// The latest `limit` dragon-tiger list appearances, oldest first.
    fn fetch_billboard(
        &self,
        _security: &Security,
        _limit: usize,
    ) -> BoxFuture<'_, Result<Vec<BillboardEntry>, Report<SourceError>>> {
        unsupported(self.name(), "dragon-tiger list")
    }

    /// Bare six-digit codes of the stocks in `index`.
    fn fetch_index_constituents(
        &self,
        _index: &Security,
    ) -> BoxFuture<'_, Result<Vec<String>, Report<SourceError>>> {
        unsupported(self.name(), "index constituents")
    }
}

/// Immediate [`SourceError::Unsupported`] answer.
pub fn unsupported<T: Send + 'static>(
    source_name: &str,
    operation: &str,
) -> BoxFuture<'static, Result<T, Report<SourceError>>> {
    let report = Report::new(SourceError::Unsupported {
        source_name: source_name.into(),
        operation: operation.into(),
    });
    Box::pin(std::future::ready(Err(report)))
}

/// Inclusive calendar-date window; `start = None` asks for full history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn lookback(today: NaiveDate, days: u32) -> Self {
        Self {
            start: Some(today - Duration::days(i64::from(days))),
            end: today,
        }
    }

    pub fn full_history(today: NaiveDate) -> Self {
        Self {
            start: None,
            end: today,
        }
    }
}

/// Daily bars together with the window they were requested for.
#[derive(Debug, Clone)]
pub struct DailySeries {
    pub range: DateRange,
    pub bars: Vec<Bar>,
}

/// Fetch the daily series used by the technical report.
///
/// Indices are requested over their full history, equities over the
/// `lookback_days` calendar days ending `today`.
pub async fn fetch_daily_series(
    source: &dyn DataSource,
    security: &Security,
    today: NaiveDate,
    lookback_days: u32,
) -> Result<DailySeries, Report<SourceError>> {
    let range = if security.is_index() {
        DateRange::full_history(today)
    } else {
        DateRange::lookback(today, lookback_days)
    };

    info!(code = %security, index = security.is_index(), "fetching daily bars");
    let bars = prepare_bars(source.fetch_daily(security, range).await?);
    if bars.is_empty() {
        return Err(unavailable("daily bars", security));
    }

    info!(code = %security, bars = bars.len(), "daily bars fetched");
    Ok(DailySeries { range, bars })
}

/// Fetch one intraday series over `lookback_days` calendar days.
pub async fn fetch_minute_series(
    source: &dyn DataSource,
    security: &Security,
    resolution: Resolution,
    today: NaiveDate,
    lookback_days: u32,
) -> Result<Vec<Bar>, Report<SourceError>> {
    let range = DateRange::lookback(today, lookback_days);
    info!(code = %security, resolution = %resolution, lookback_days, "fetching minute bars");

    let bars = prepare_bars(source.fetch_minute(security, resolution, range).await?);
    if bars.is_empty() {
        return Err(unavailable(&format!("{resolution} bars"), security));
    }
    Ok(bars)
}

/// Sort bars ascending and drop repeated timestamps, keeping the last copy.
pub fn prepare_bars(mut bars: Vec<Bar>) -> Vec<Bar> {
    bars.sort_by_key(|b| b.timestamp);
    let mut out: Vec<Bar> = Vec::with_capacity(bars.len());
    for bar in bars {
        match out.last_mut() {
            Some(last) if last.timestamp == bar.timestamp => *last = bar,
            _ => out.push(bar),
        }
    }
    out
}

/// Parse a numeric field, turning anything unparsable into `NaN`.
pub fn parse_number(raw: &str) -> f64 {
    raw.trim().parse::<f64>().unwrap_or(f64::NAN)
}

pub fn unavailable(what: &str, security: &Security) -> Report<SourceError> {
    Report::new(SourceError::Unavailable {
        what: what.to_owned(),
        code: security.code.clone(),
    })
}
