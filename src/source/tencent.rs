use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::SourceError;
use crate::model::{Bar, CompanyProfile, FundFlowDay, Resolution, Security, SnapshotEntry};
use crate::source::{DataSource, DateRange, parse_number};

const SOURCE_NAME: &str = "tencent";
const DAILY_URL: &str = "https://web.ifzq.gtimg.cn/appstock/app/fqkline/get";
const MINUTE_URL: &str = "https://ifzq.gtimg.cn/appstock/app/kline/mkline";
/// Largest page the daily endpoint serves.
const MAX_DAILY_BARS: usize = 640;
/// Trading minutes per session day.
const SESSION_MINUTES: u32 = 240;

/// Tencent quote endpoints: price bars only, no turnover or amount.
pub struct TencentSource {
    client: reqwest::Client,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

impl TencentSource {
    pub fn new(request_interval: Duration) -> Self {
        let quota =
            Quota::with_period(request_interval).unwrap_or_else(|| Quota::per_second(nonzero!(2u32)));
        Self {
            client: reqwest::Client::new(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    async fn get(&self, url: &str, param: String) -> Result<TencentResponse, Report<SourceError>> {
        self.rate_limiter.until_ready().await;
        debug!(url, param = %param, "tencent request");

        let response = self
            .client
            .get(url)
            .query(&[("param", param)])
            .send()
            .await
            .change_context(SourceError::Request {
                source_name: SOURCE_NAME.into(),
            })?;

        if !response.status().is_success() {
            return Err(Report::new(SourceError::Request {
                source_name: SOURCE_NAME.into(),
            })
            .attach(format!("HTTP status: {}", response.status())));
        }

        response
            .json()
            .await
            .change_context(SourceError::ResponseParse {
                source_name: SOURCE_NAME.into(),
            })
    }

    fn unsupported<T>(operation: &str) -> Result<T, Report<SourceError>> {
        Err(Report::new(SourceError::Unsupported {
            source_name: SOURCE_NAME.into(),
            operation: operation.into(),
        }))
    }
}

impl DataSource for TencentSource {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn fetch_daily(
        &self,
        security: &Security,
        range: DateRange,
    ) -> BoxFuture<'_, Result<Vec<Bar>, Report<SourceError>>> {
        let security = security.clone();
        Box::pin(async move {
            let symbol = security.prefixed();
            let (adjust, series_key) = if security.is_index() {
                ("", "day")
            } else {
                ("qfq", "qfqday")
            };
            let param = format!(
                "{symbol},day,{},{},{MAX_DAILY_BARS},{adjust}",
                range
                    .start
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_default(),
                range.end.format("%Y-%m-%d"),
            );

            let body = self.get(DAILY_URL, param).await?;
            let rows = body.series(&symbol, &[series_key, "day"]);
            Ok(parse_rows(rows, parse_daily_stamp))
        })
    }

    fn fetch_minute(
        &self,
        security: &Security,
        resolution: Resolution,
        range: DateRange,
    ) -> BoxFuture<'_, Result<Vec<Bar>, Report<SourceError>>> {
        let security = security.clone();
        Box::pin(async move {
            let Some(minutes) = resolution.minutes() else {
                return Self::unsupported("daily bars through the minute endpoint");
            };
            let symbol = security.prefixed();
            let days = range
                .start
                .map(|start| (range.end - start).num_days().max(1) as u32)
                .unwrap_or(1);
            let count = SESSION_MINUTES / minutes * days;
            let key = format!("m{minutes}");
            let param = format!("{symbol},{key},,{count}");

            let body = self.get(MINUTE_URL, param).await?;
            let rows = body.series(&symbol, &[key.as_str()]);
            let bars = parse_rows(rows, parse_minute_stamp);
            Ok(match range.start {
                Some(start) => bars.into_iter().filter(|b| b.date() >= start).collect(),
                None => bars,
            })
        })
    }

    fn fetch_snapshot(&self) -> BoxFuture<'_, Result<Vec<SnapshotEntry>, Report<SourceError>>> {
        Box::pin(async { Self::unsupported("an equity snapshot") })
    }

    fn fetch_fund_flow(
        &self,
        _security: &Security,
    ) -> BoxFuture<'_, Result<Vec<FundFlowDay>, Report<SourceError>>> {
        Box::pin(async { Self::unsupported("capital flow") })
    }

    fn fetch_profile(
        &self,
        _security: &Security,
    ) -> BoxFuture<'_, Result<Option<CompanyProfile>, Report<SourceError>>> {
        Box::pin(async { Self::unsupported("company profiles") })
    }
}

fn parse_daily_stamp(raw: &str) -> Option<NaiveDateTime> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()?
        .and_hms_opt(15, 0, 0)
}

fn parse_minute_stamp(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, "%Y%m%d%H%M").ok()
}

/// Rows are `[stamp, open, close, high, low, volume, ...]` with numbers as strings.
fn parse_rows(rows: &[Value], stamp: fn(&str) -> Option<NaiveDateTime>) -> Vec<Bar> {
    rows.iter()
        .filter_map(|row| {
            let bar = parse_row(row, stamp);
            if bar.is_none() {
                warn!(row = %row, "malformed tencent row, skipping");
            }
            bar
        })
        .collect()
}

fn parse_row(row: &Value, stamp: fn(&str) -> Option<NaiveDateTime>) -> Option<Bar> {
    let cells = row.as_array()?;
    if cells.len() < 6 {
        return None;
    }
    let field = |i: usize| match &cells[i] {
        Value::String(s) => parse_number(s),
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        _ => f64::NAN,
    };

    Some(Bar {
        timestamp: stamp(cells[0].as_str()?)?,
        open: field(1),
        close: field(2),
        high: field(3),
        low: field(4),
        volume: field(5),
        amount: f64::NAN,
        turnover_rate: None,
    })
}

#[derive(Debug, Deserialize)]
struct TencentResponse {
    #[serde(default)]
    data: Value,
}

impl TencentResponse {
    /// First non-empty series under `data.<symbol>.<key>` among `keys`.
    fn series(&self, symbol: &str, keys: &[&str]) -> &[Value] {
        let Some(entry) = self.data.get(symbol) else {
            return &[];
        };
        keys.iter()
            .filter_map(|key| entry.get(*key).and_then(Value::as_array))
            .find(|rows| !rows.is_empty())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
