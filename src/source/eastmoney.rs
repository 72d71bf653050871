use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::SourceError;
use crate::model::{
    Bar, BillboardEntry, CompanyProfile, Dividend, FundFlowDay, MarginDay, Market,
    NorthboundFlowDay, NorthboundHolding, Resolution, Security, SnapshotEntry, Statement,
    StatementPeriod,
};
use crate::source::{DataSource, DateRange, parse_number, unsupported};

const SOURCE_NAME: &str = "eastmoney";
const KLINE_URL: &str = "https://push2his.eastmoney.com/api/qt/stock/kline/get";
const FUND_FLOW_URL: &str = "https://push2his.eastmoney.com/api/qt/stock/fflow/daykline/get";
const QUOTE_URL: &str = "https://push2.eastmoney.com/api/qt/stock/get";
const SNAPSHOT_URL: &str = "https://82.push2.eastmoney.com/api/qt/clist/get";
const NORTHBOUND_URL: &str = "https://push2his.eastmoney.com/api/qt/kamt.kline/get";
const DATACENTER_URL: &str = "https://datacenter-web.eastmoney.com/api/data/v1/get";
/// All Shanghai/Shenzhen/Beijing A-share boards.
const SNAPSHOT_BOARDS: &str = "m:0 t:6,m:0 t:80,m:1 t:2,m:1 t:23,m:0 t:81 s:2048";
/// The clist endpoint serves at most 100 rows per page whatever `pz` asks for.
const CLIST_PAGE_SIZE: usize = 100;
/// Upper bound on pages per listing, well above the ~5,400 listed A-shares.
const CLIST_MAX_PAGES: u32 = 200;
/// Eastmoney boards that mirror index membership, keyed by index digits.
const INDEX_BOARDS: [(&str, &str); 4] = [
    ("000300", "BK0500"),
    ("000016", "BK0611"),
    ("000905", "BK0701"),
    ("399006", "BK0638"),
];
/// Northbound amounts arrive in units of 10,000 yuan.
const NORTHBOUND_UNIT: f64 = 10_000.0;
const KLINE_FIELDS: &str = "f51,f52,f53,f54,f55,f56,f57,f58,f59,f60,f61";
const FUND_FLOW_FIELDS: &str = "f51,f52,f53,f54,f55,f56,f57,f58,f59,f60,f61,f62,f63,f64,f65";
const PROFILE_FIELDS: &str = "f43,f57,f58,f84,f85,f116,f117,f127,f162,f167,f189";
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7)";

/// Eastmoney `klt` value for daily bars.
const DAILY_KLT: u32 = 101;

/// Eastmoney push2 endpoints: the primary source for every data kind.
pub struct EastmoneySource {
    client: reqwest::Client,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

impl EastmoneySource {
    /// `request_interval` is the minimum spacing between two requests.
    pub fn new(request_interval: Duration) -> Self {
        let quota =
            Quota::with_period(request_interval).unwrap_or_else(|| Quota::per_second(nonzero!(2u32)));
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<T, Report<SourceError>> {
        // Wait for rate limiter before making the request
        self.rate_limiter.until_ready().await;
        debug!(url, "eastmoney request");

        let response = self
            .client
            .get(url)
            .query(params)
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

    async fn fetch_klines(
        &self,
        security: &Security,
        klt: u32,
        adjust: u32,
        range: DateRange,
    ) -> Result<Vec<String>, Report<SourceError>> {
        let params = [
            ("secid", secid(security)),
            ("klt", klt.to_string()),
            ("fqt", adjust.to_string()),
            (
                "beg",
                range
                    .start
                    .map(|d| d.format("%Y%m%d").to_string())
                    .unwrap_or_else(|| "0".into()),
            ),
            ("end", range.end.format("%Y%m%d").to_string()),
            ("lmt", "1000000".into()),
            ("fields1", "f1,f2,f3,f4,f5,f6".into()),
            ("fields2", KLINE_FIELDS.into()),
        ];

        let body: KlineResponse = self.get_json(KLINE_URL, &params).await?;
        Ok(body.data.and_then(|d| d.klines).unwrap_or_default())
    }

    /// Every row of a clist listing, page by page.
    async fn fetch_clist(&self, boards: &str) -> Result<Vec<SnapshotRow>, Report<SourceError>> {
        collect_pages(|page| {
            let params = [
                ("pn", page.to_string()),
                ("pz", CLIST_PAGE_SIZE.to_string()),
                ("po", "1".into()),
                ("np", "1".into()),
                ("fltt", "2".into()),
                ("invt", "2".into()),
                ("fid", "f3".into()),
                ("fs", boards.to_owned()),
                ("fields", "f12,f14".into()),
            ];
            async move { self.get_json(SNAPSHOT_URL, &params).await }
        })
        .await
    }

    /// First page of a datacenter report, newest rows first.
    async fn fetch_report(
        &self,
        report_name: &str,
        filter: String,
        sort_column: &str,
        page_size: usize,
    ) -> Result<Vec<Row>, Report<SourceError>> {
        let params = [
            ("reportName", report_name.to_owned()),
            ("columns", "ALL".into()),
            ("filter", filter),
            ("sortColumns", sort_column.to_owned()),
            ("sortTypes", "-1".into()),
            ("pageNumber", "1".into()),
            ("pageSize", page_size.to_string()),
            ("source", "WEB".into()),
            ("client", "WEB".into()),
        ];
        let body: DatacenterResponse = self.get_json(DATACENTER_URL, &params).await?;
        if body.result.is_none() {
            debug!(report_name, message = ?body.message, "datacenter report is empty");
        }
        Ok(body.result.map(|r| r.data).unwrap_or_default())
    }
}

/// Fetch pages `1..` until the rows collected reach the reported `total`, a
/// page comes back empty, or [`CLIST_MAX_PAGES`] is hit.
async fn collect_pages<F, Fut>(mut fetch_page: F) -> Result<Vec<SnapshotRow>, Report<SourceError>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<SnapshotResponse, Report<SourceError>>>,
{
    let mut rows = Vec::new();
    for page in 1..=CLIST_MAX_PAGES {
        let Some(data) = fetch_page(page).await?.data else {
            break;
        };
        if data.diff.is_empty() {
            break;
        }
        rows.extend(data.diff);
        debug!(page, rows = rows.len(), total = data.total, "clist page fetched");
        if rows.len() >= data.total {
            break;
        }
    }
    Ok(rows)
}

/// `(SECURITY_CODE="600519")`
fn code_filter(column: &str, security: &Security) -> String {
    format!("({column}=\"{}\")", security.digits)
}

impl DataSource for EastmoneySource {
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
            // Equities are forward-adjusted (fqt=1); index levels are never adjusted.
            let adjust = if security.is_index() { 0 } else { 1 };
            let lines = self
                .fetch_klines(&security, DAILY_KLT, adjust, range)
                .await?;
            Ok(parse_klines(&lines, security.is_index()))
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
            let klt = resolution.minutes().unwrap_or(DAILY_KLT);
            let lines = self.fetch_klines(&security, klt, 0, range).await?;
            Ok(parse_klines(&lines, security.is_index()))
        })
    }

    fn fetch_snapshot(&self) -> BoxFuture<'_, Result<Vec<SnapshotEntry>, Report<SourceError>>> {
        Box::pin(async move {
            let entries: Vec<SnapshotEntry> = self
                .fetch_clist(SNAPSHOT_BOARDS)
                .await?
                .into_iter()
                .map(|row| SnapshotEntry {
                    code: row.f12,
                    name: row.f14,
                })
                .collect();
            debug!(entries = entries.len(), "eastmoney snapshot fetched");
            Ok(entries)
        })
    }

    fn fetch_fund_flow(
        &self,
        security: &Security,
    ) -> BoxFuture<'_, Result<Vec<FundFlowDay>, Report<SourceError>>> {
        let security = security.clone();
        Box::pin(async move {
            if security.is_index() {
                return Ok(vec![]);
            }
            let params = [
                ("secid", secid(&security)),
                ("lmt", "0".into()),
                ("klt", DAILY_KLT.to_string()),
                ("fields1", "f1,f2,f3,f7".into()),
                ("fields2", FUND_FLOW_FIELDS.into()),
            ];
            let body: KlineResponse = self.get_json(FUND_FLOW_URL, &params).await?;
            let lines = body.data.and_then(|d| d.klines).unwrap_or_default();
            Ok(lines.iter().filter_map(|l| parse_fund_flow(l)).collect())
        })
    }

    fn fetch_profile(
        &self,
        security: &Security,
    ) -> BoxFuture<'_, Result<Option<CompanyProfile>, Report<SourceError>>> {
        let security = security.clone();
        Box::pin(async move {
            let params = [
                ("secid", secid(&security)),
                ("fltt", "2".into()),
                ("invt", "2".into()),
                ("fields", PROFILE_FIELDS.into()),
            ];
            let body: QuoteResponse = self.get_json(QUOTE_URL, &params).await?;
            Ok(body.data.map(|fields| parse_profile(&security, &fields)))
        })
    }

    fn fetch_statement(
        &self,
        security: &Security,
        statement: Statement,
        periods: usize,
    ) -> BoxFuture<'_, Result<Vec<StatementPeriod>, Report<SourceError>>> {
        let security = security.clone();
        Box::pin(async move {
            let layout = StatementLayout::of(statement);
            let rows = self
                .fetch_report(
                    layout.report_name,
                    code_filter("SECURITY_CODE", &security),
                    layout.date_column,
                    periods,
                )
                .await?;
            Ok(parse_statement(&rows, &layout))
        })
    }

    fn fetch_dividends(
        &self,
        security: &Security,
    ) -> BoxFuture<'_, Result<Vec<Dividend>, Report<SourceError>>> {
        let security = security.clone();
        Box::pin(async move {
            let rows = self
                .fetch_report(
                    "RPT_SHAREBONUS_DET",
                    code_filter("SECURITY_CODE", &security),
                    "REPORT_DATE",
                    20,
                )
                .await?;
            Ok(oldest_first(rows.iter().filter_map(parse_dividend), |d| d.report_date))
        })
    }

    fn fetch_northbound_flow(
        &self,
        days: usize,
    ) -> BoxFuture<'_, Result<Vec<NorthboundFlowDay>, Report<SourceError>>> {
        Box::pin(async move {
            let params = [
                ("fields1", "f1,f3,f5".to_owned()),
                ("fields2", "f51,f52".into()),
                ("klt", DAILY_KLT.to_string()),
                ("lmt", days.to_string()),
            ];
            let body: NorthboundResponse = self.get_json(NORTHBOUND_URL, &params).await?;
            Ok(body
                .data
                .map(|d| parse_northbound(&d.hk2sh, &d.hk2sz))
                .unwrap_or_default())
        })
    }

    fn fetch_northbound_holdings(
        &self,
        security: &Security,
        days: usize,
    ) -> BoxFuture<'_, Result<Vec<NorthboundHolding>, Report<SourceError>>> {
        let security = security.clone();
        Box::pin(async move {
            let rows = self
                .fetch_report(
                    "RPT_MUTUAL_HOLDSTOCKNORTH_STA",
                    code_filter("SECURITY_CODE", &security),
                    "TRADE_DATE",
                    days,
                )
                .await?;
            Ok(oldest_first(rows.iter().filter_map(parse_holding), |h| h.date))
        })
    }

    fn fetch_margin(
        &self,
        security: &Security,
        days: usize,
    ) -> BoxFuture<'_, Result<Vec<MarginDay>, Report<SourceError>>> {
        let security = security.clone();
        Box::pin(async move {
            let rows = self
                .fetch_report(
                    "RPTA_WEB_RZRQ_GGMX",
                    code_filter("SCODE", &security),
                    "DATE",
                    days,
                )
                .await?;
            Ok(oldest_first(rows.iter().filter_map(parse_margin), |m| m.date))
        })
    }

    fn fetch_billboard(
        &self,
        security: &Security,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<BillboardEntry>, Report<SourceError>>> {
        let security = security.clone();
        Box::pin(async move {
            let rows = self
                .fetch_report(
                    "RPT_DAILYBILLBOARD_DETAILSNEW",
                    code_filter("SECURITY_CODE", &security),
                    "TRADE_DATE",
                    limit,
                )
                .await?;
            Ok(oldest_first(rows.iter().filter_map(parse_billboard), |b| b.date))
        })
    }

    fn fetch_index_constituents(
        &self,
        index: &Security,
    ) -> BoxFuture<'_, Result<Vec<String>, Report<SourceError>>> {
        let Some(board) = index_board(index) else {
            return unsupported(SOURCE_NAME, &format!("constituents of {index}"));
        };
        Box::pin(async move {
            let rows = self.fetch_clist(&format!("b:{board}")).await?;
            debug!(board, constituents = rows.len(), "index constituents fetched");
            Ok(rows.into_iter().map(|row| row.f12).collect())
        })
    }
}

fn index_board(index: &Security) -> Option<&'static str> {
    if !index.is_index() {
        return None;
    }
    INDEX_BOARDS
        .iter()
        .find(|(digits, _)| *digits == index.digits)
        .map(|(_, board)| *board)
}

/// Eastmoney security id: `1.` for Shanghai, `0.` for Shenzhen and Beijing.
fn secid(security: &Security) -> String {
    let market = match security.market {
        Market::Shanghai => 1,
        Market::Shenzhen | Market::Beijing => 0,
    };
    format!("{market}.{}", security.digits)
}

fn parse_klines(lines: &[String], is_index: bool) -> Vec<Bar> {
    lines
        .iter()
        .filter_map(|line| {
            let bar = parse_kline(line, is_index);
            if bar.is_none() {
                warn!(line = %line, "malformed eastmoney kline, skipping");
            }
            bar
        })
        .collect()
}

/// Parse `date,open,close,high,low,volume,amount,amplitude,pct,chg,turnover`.
fn parse_kline(line: &str, is_index: bool) -> Option<Bar> {
    let parts: Vec<&str> = line.split(',').collect();
    if parts.len() < 7 {
        return None;
    }

    let timestamp = parse_timestamp(parts[0])?;
    let turnover_rate = if is_index {
        None
    } else {
        parts
            .get(10)
            .map(|raw| parse_number(raw))
            .filter(|v| !v.is_nan())
    };

    Some(Bar {
        timestamp,
        open: parse_number(parts[1]),
        close: parse_number(parts[2]),
        high: parse_number(parts[3]),
        low: parse_number(parts[4]),
        volume: parse_number(parts[5]),
        amount: parse_number(parts[6]),
        turnover_rate,
    })
}

/// Daily stamps (`2024-01-02`) are placed at the 15:00 close; minute stamps
/// (`2024-01-02 09:35`) are kept as-is.
fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.len() == 10 {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()?
            .and_hms_opt(15, 0, 0)
    } else {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M").ok()
    }
}

/// Parse `date,main,small,medium,large,super,main%,small%,medium%,large%,super%,close,chg%,...`.
fn parse_fund_flow(line: &str) -> Option<FundFlowDay> {
    let parts: Vec<&str> = line.split(',').collect();
    if parts.len() < 13 {
        warn!(line = %line, "malformed eastmoney fund flow row, skipping");
        return None;
    }
    Some(FundFlowDay {
        date: NaiveDate::parse_from_str(parts[0].trim(), "%Y-%m-%d").ok()?,
        main_net: parse_number(parts[1]),
        small_net: parse_number(parts[2]),
        medium_net: parse_number(parts[3]),
        large_net: parse_number(parts[4]),
        super_large_net: parse_number(parts[5]),
        main_net_pct: parse_number(parts[6]),
        close: parse_number(parts[11]),
        change_pct: parse_number(parts[12]),
    })
}

fn parse_profile(security: &Security, fields: &Row) -> CompanyProfile {
    let number = |key: &str| row_number(fields, key);
    let text = |key: &str| row_text(fields, key);
    let listing_date = fields
        .get("f189")
        .and_then(value_f64)
        .and_then(|v| NaiveDate::parse_from_str(&format!("{v:.0}"), "%Y%m%d").ok());

    CompanyProfile {
        code: text("f57").unwrap_or_else(|| security.digits.clone()),
        name: text("f58"),
        industry: text("f127"),
        listing_date,
        latest_price: number("f43"),
        total_shares: number("f84"),
        float_shares: number("f85"),
        total_market_cap: number("f116"),
        float_market_cap: number("f117"),
        pe_dynamic: number("f162"),
        pb: number("f167"),
    }
}

/// Datacenter report, date column and value columns of a statement.
struct StatementLayout {
    report_name: &'static str,
    date_column: &'static str,
    /// In [`Statement::columns`] order.
    value_columns: &'static [&'static str],
}

impl StatementLayout {
    fn of(statement: Statement) -> Self {
        match statement {
            Statement::Summary => Self {
                report_name: "RPT_LICO_FN_CPD",
                date_column: "REPORTDATE",
                value_columns: &[
                    "BASIC_EPS",
                    "BPS",
                    "TOTAL_OPERATE_INCOME",
                    "PARENT_NETPROFIT",
                    "YSTZ",
                    "SJLTZ",
                    "WEIGHTAVG_ROE",
                    "XSMLL",
                ],
            },
            Statement::Income => Self {
                report_name: "RPT_DMSK_FN_INCOME",
                date_column: "REPORT_DATE",
                value_columns: &[
                    "TOTAL_OPERATE_INCOME",
                    "TOTAL_OPERATE_COST",
                    "OPERATE_PROFIT",
                    "PARENT_NETPROFIT",
                ],
            },
            Statement::Balance => Self {
                report_name: "RPT_DMSK_FN_BALANCE",
                date_column: "REPORT_DATE",
                value_columns: &[
                    "TOTAL_ASSETS",
                    "TOTAL_LIABILITIES",
                    "TOTAL_EQUITY",
                    "DEBT_ASSET_RATIO",
                ],
            },
            Statement::CashFlow => Self {
                report_name: "RPT_DMSK_FN_CASHFLOW",
                date_column: "REPORT_DATE",
                value_columns: &["NETCASH_OPERATE", "NETCASH_INVEST", "NETCASH_FINANCE"],
            },
        }
    }
}

fn parse_statement(rows: &[Row], layout: &StatementLayout) -> Vec<StatementPeriod> {
    let periods = rows.iter().filter_map(|row| {
        Some(StatementPeriod {
            report_date: row_date(row, layout.date_column)?,
            values: layout
                .value_columns
                .iter()
                .map(|column| row_number(row, column))
                .collect(),
        })
    });
    oldest_first(periods, |p| p.report_date)
}

fn parse_dividend(row: &Row) -> Option<Dividend> {
    Some(Dividend {
        report_date: row_date(row, "REPORT_DATE")?,
        plan: row_text(row, "IMPL_PLAN_PROFILE"),
        ex_dividend_date: row_date(row, "EX_DIVIDEND_DATE"),
        progress: row_text(row, "ASSIGN_PROGRESS"),
    })
}

fn parse_holding(row: &Row) -> Option<NorthboundHolding> {
    Some(NorthboundHolding {
        date: row_date(row, "TRADE_DATE")?,
        shares: row_number(row, "HOLD_SHARES"),
        market_value: row_number(row, "HOLD_MARKET_CAP"),
        float_ratio_pct: row_number(row, "FREE_SHARES_RATIO"),
    })
}

fn parse_margin(row: &Row) -> Option<MarginDay> {
    Some(MarginDay {
        date: row_date(row, "DATE")?,
        financing_balance: row_number(row, "RZYE"),
        financing_buy: row_number(row, "RZMRE"),
        financing_repay: row_number(row, "RZCHE"),
        lending_volume: row_number(row, "RQYL"),
        lending_balance: row_number(row, "RQYE"),
        total_balance: row_number(row, "RZRQYE"),
    })
}

fn parse_billboard(row: &Row) -> Option<BillboardEntry> {
    Some(BillboardEntry {
        date: row_date(row, "TRADE_DATE")?,
        reason: row_text(row, "EXPLANATION"),
        close: row_number(row, "CLOSE_PRICE"),
        change_pct: row_number(row, "CHANGE_RATE"),
        net_buy: row_number(row, "BILLBOARD_NET_AMT"),
        buy: row_number(row, "BILLBOARD_BUY_AMT"),
        sell: row_number(row, "BILLBOARD_SELL_AMT"),
    })
}

/// Merge the Shanghai and Shenzhen channels by date. Lines are
/// `date,net_inflow`.
fn parse_northbound(shanghai: &[String], shenzhen: &[String]) -> Vec<NorthboundFlowDay> {
    let mut days: BTreeMap<NaiveDate, NorthboundFlowDay> = BTreeMap::new();
    let mut merge = |lines: &[String], set: fn(&mut NorthboundFlowDay, Option<f64>)| {
        for line in lines {
            let Some((date, value)) = line.split_once(',') else {
                warn!(line = %line, "malformed northbound row, skipping");
                continue;
            };
            let Ok(date) = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d") else {
                warn!(line = %line, "malformed northbound row, skipping");
                continue;
            };
            let value = value.split(',').next().map(parse_number);
            let day = days.entry(date).or_insert(NorthboundFlowDay {
                date,
                shanghai_net: None,
                shenzhen_net: None,
            });
            set(day, value.filter(|v| v.is_finite()).map(|v| v * NORTHBOUND_UNIT));
        }
    };
    merge(shanghai, |day, v| day.shanghai_net = v);
    merge(shenzhen, |day, v| day.shenzhen_net = v);
    days.into_values().collect()
}

fn oldest_first<T>(items: impl Iterator<Item = T>, date: fn(&T) -> NaiveDate) -> Vec<T> {
    let mut items: Vec<T> = items.collect();
    items.sort_by_key(date);
    items
}

fn row_number(row: &Row, key: &str) -> Option<f64> {
    row.get(key).and_then(value_f64)
}

fn row_text(row: &Row, key: &str) -> Option<String> {
    row.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "-")
        .map(str::to_owned)
}

/// Datacenter dates look like `2024-03-31 00:00:00`.
fn row_date(row: &Row, key: &str) -> Option<NaiveDate> {
    let raw = row.get(key)?.as_str()?;
    NaiveDate::parse_from_str(raw.get(..10)?, "%Y-%m-%d").ok()
}

/// Numbers arrive either as JSON numbers or as strings, with `"-"` for missing.
fn value_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// ── REST response types ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct KlineResponse {
    data: Option<KlineData>,
}

#[derive(Debug, Deserialize)]
struct KlineData {
    klines: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct SnapshotResponse {
    data: Option<SnapshotData>,
}

#[derive(Debug, Deserialize)]
struct SnapshotData {
    /// Rows in the whole listing, not in this page.
    #[serde(default)]
    total: usize,
    #[serde(default)]
    diff: Vec<SnapshotRow>,
}

#[derive(Debug, Deserialize)]
struct SnapshotRow {
    f12: String,
    f14: String,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    data: Option<Row>,
}

type Row = serde_json::Map<String, Value>;

#[derive(Debug, Deserialize)]
struct DatacenterResponse {
    result: Option<DatacenterResult>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DatacenterResult {
    #[serde(default)]
    data: Vec<Row>,
}

#[derive(Debug, Deserialize)]
struct NorthboundResponse {
    data: Option<NorthboundData>,
}

#[derive(Debug, Deserialize)]
struct NorthboundData {
    #[serde(default)]
    hk2sh: Vec<String>,
    #[serde(default)]
    hk2sz: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn security(code: &str) -> Security {
        Security::from_normalized(code).unwrap()
    }

    #[test]
    fn secid_maps_markets() {
        assert_eq!(secid(&security("sh000001")), "1.000001");
        assert_eq!(secid(&security("sz399001")), "0.399001");
        assert_eq!(secid(&security("600519")), "1.600519");
        assert_eq!(secid(&security("000858")), "0.000858");
        assert_eq!(secid(&security("bj830799")), "0.830799");
    }

    #[test]
    fn daily_kline_parses_into_bar() {
        let line = "2024-01-02,10.50,10.80,10.90,10.40,123456,1.3e8,4.76,2.86,0.30,1.25";
        let bar = parse_kline(line, false).unwrap();
        assert_eq!(bar.date(), NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(bar.timestamp.hour(), 15);
        assert_eq!(bar.open, 10.5);
        assert_eq!(bar.close, 10.8);
        assert_eq!(bar.high, 10.9);
        assert_eq!(bar.low, 10.4);
        assert_eq!(bar.volume, 123456.0);
        assert_eq!(bar.turnover_rate, Some(1.25));
    }

    #[test]
    fn index_kline_has_no_turnover() {
        let line = "2024-01-02,2962.28,2962.28,2976.27,2962.28,311000000,3.2e11,0.47,-0.43,-12.66,0.86";
        let bar = parse_kline(line, true).unwrap();
        assert_eq!(bar.turnover_rate, None);
    }

    #[test]
    fn minute_kline_keeps_time() {
        let line = "2024-01-02 09:35,10.50,10.52,10.55,10.49,5000,5.2e6,0.57,0.19,0.02,0.05";
        let bar = parse_kline(line, false).unwrap();
        assert_eq!(bar.timestamp.hour(), 9);
        assert_eq!(bar.timestamp.minute(), 35);
    }

    #[test]
    fn unparsable_numbers_become_nan_and_short_lines_are_dropped() {
        let bar = parse_kline("2024-01-02,-,10.80,10.90,10.40,100,200", false).unwrap();
        assert!(bar.open.is_nan());
        assert_eq!(bar.turnover_rate, None);

        assert!(parse_kline("2024-01-02,10.50", false).is_none());
        assert!(parse_kline("not-a-date,1,2,3,4,5,6", false).is_none());
        let lines = vec!["garbage".to_owned(), "2024-01-03,1,1,1,1,1,1".to_owned()];
        assert_eq!(parse_klines(&lines, false).len(), 1);
    }

    #[test]
    fn kline_response_tolerates_null_data() {
        let body: KlineResponse = serde_json::from_str(r#"{"rc":0,"data":null}"#).unwrap();
        assert!(body.data.is_none());
    }

    #[test]
    fn snapshot_response_parses() {
        let json = r#"{"data":{"total":2,"diff":[{"f12":"600519","f14":"贵州茅台"},{"f12":"000858","f14":"五粮液"}]}}"#;
        let body: SnapshotResponse = serde_json::from_str(json).unwrap();
        let diff = body.data.unwrap().diff;
        assert_eq!(diff.len(), 2);
        assert_eq!(diff[0].f12, "600519");
        assert_eq!(diff[1].f14, "五粮液");
    }

    fn page(json: &str) -> SnapshotResponse {
        serde_json::from_str(json).unwrap()
    }

    #[tokio::test]
    async fn clist_pages_until_total_is_reached() {
        let pages = [
            r#"{"data":{"total":3,"diff":[{"f12":"600519","f14":"贵州茅台"},{"f12":"000858","f14":"五粮液"}]}}"#,
            r#"{"data":{"total":3,"diff":[{"f12":"300750","f14":"宁德时代"}]}}"#,
            r#"{"data":{"total":3,"diff":[{"f12":"999999","f14":"不应请求"}]}}"#,
        ];
        let mut requested = Vec::new();
        let rows = collect_pages(|n| {
            requested.push(n);
            std::future::ready(Ok(page(pages[n as usize - 1])))
        })
        .await
        .unwrap();

        let codes: Vec<&str> = rows.iter().map(|r| r.f12.as_str()).collect();
        assert_eq!(codes, ["600519", "000858", "300750"]);
        assert_eq!(requested, [1, 2]);
    }

    #[tokio::test]
    async fn clist_stops_on_an_empty_or_missing_page() {
        let mut requested = Vec::new();
        let rows = collect_pages(|n| {
            requested.push(n);
            let body = match n {
                1 => r#"{"data":{"total":5000,"diff":[{"f12":"600519","f14":"贵州茅台"}]}}"#,
                _ => r#"{"data":{"total":5000,"diff":[]}}"#,
            };
            std::future::ready(Ok(page(body)))
        })
        .await
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(requested, [1, 2]);

        let rows = collect_pages(|_| std::future::ready(Ok(page(r#"{"rc":0,"data":null}"#))))
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn clist_page_errors_propagate() {
        let result = collect_pages(|_| {
            std::future::ready(Err(Report::new(SourceError::Request {
                source_name: SOURCE_NAME.into(),
            })))
        })
        .await;
        assert!(result.is_err());
    }

    fn report_rows(json: &str) -> Vec<Row> {
        let body: DatacenterResponse = serde_json::from_str(json).unwrap();
        body.result.map(|r| r.data).unwrap_or_default()
    }

    #[test]
    fn empty_datacenter_report_has_no_rows() {
        let rows = report_rows(r#"{"version":null,"result":null,"success":false,"message":"返回数据为空","code":9201}"#);
        assert!(rows.is_empty());
    }

    #[test]
    fn statement_columns_match_layout() {
        for statement in Statement::ALL {
            assert_eq!(
                StatementLayout::of(statement).value_columns.len(),
                statement.columns().len(),
                "{statement:?}"
            );
        }
    }

    #[test]
    fn statement_rows_parse_oldest_first() {
        let rows = report_rows(
            r#"{"result":{"pages":1,"count":2,"data":[
                {"REPORT_DATE":"2024-03-31 00:00:00","TOTAL_ASSETS":2.9e11,"TOTAL_LIABILITIES":"4.1e10","TOTAL_EQUITY":2.5e11,"DEBT_ASSET_RATIO":14.1},
                {"REPORT_DATE":"2023-12-31 00:00:00","TOTAL_ASSETS":2.7e11,"TOTAL_LIABILITIES":null,"TOTAL_EQUITY":"-","DEBT_ASSET_RATIO":17.9},
                {"REPORT_DATE":null,"TOTAL_ASSETS":1.0}
            ]}}"#,
        );
        let periods = parse_statement(&rows, &StatementLayout::of(Statement::Balance));
        assert_eq!(periods.len(), 2);
        assert_eq!(periods[0].report_date, NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
        assert_eq!(periods[0].values, vec![Some(2.7e11), None, None, Some(17.9)]);
        assert_eq!(periods[1].values[1], Some(4.1e10));
    }

    #[test]
    fn dividend_rows_parse() {
        let rows = report_rows(
            r#"{"result":{"data":[{"REPORT_DATE":"2023-12-31 00:00:00","IMPL_PLAN_PROFILE":"10派308.76元(含税)",
                "EX_DIVIDEND_DATE":"2024-06-19 00:00:00","ASSIGN_PROGRESS":"实施分配"},
                {"REPORT_DATE":"2024-06-30 00:00:00","IMPL_PLAN_PROFILE":"不分配不转增","EX_DIVIDEND_DATE":null,"ASSIGN_PROGRESS":"-"}]}}"#,
        );
        let dividends: Vec<Dividend> = rows.iter().filter_map(parse_dividend).collect();
        assert_eq!(dividends[0].plan.as_deref(), Some("10派308.76元(含税)"));
        assert_eq!(dividends[0].ex_dividend_date, NaiveDate::from_ymd_opt(2024, 6, 19));
        assert_eq!(dividends[1].ex_dividend_date, None);
        assert_eq!(dividends[1].progress, None);
    }

    #[test]
    fn margin_holding_and_billboard_rows_parse() {
        let margin = report_rows(
            r#"{"result":{"data":[{"DATE":"2024-01-03 00:00:00","RZYE":1.8e10,"RZMRE":5.1e8,"RZCHE":4.9e8,
                "RQYL":120000,"RQYE":2.1e8,"RZRQYE":1.82e10}]}}"#,
        );
        let day = parse_margin(&margin[0]).unwrap();
        assert_eq!(day.financing_balance, Some(1.8e10));
        assert_eq!(day.lending_volume, Some(120000.0));
        assert_eq!(day.total_balance, Some(1.82e10));

        let holding = report_rows(
            r#"{"result":{"data":[{"TRADE_DATE":"2024-01-03 00:00:00","HOLD_SHARES":8.5e7,"HOLD_MARKET_CAP":1.4e11,"FREE_SHARES_RATIO":"6.77"}]}}"#,
        );
        let held = parse_holding(&holding[0]).unwrap();
        assert_eq!(held.shares, Some(8.5e7));
        assert_eq!(held.float_ratio_pct, Some(6.77));

        let billboard = report_rows(
            r#"{"result":{"data":[{"TRADE_DATE":"2024-01-03 00:00:00","EXPLANATION":"日涨幅偏离值达到7%的前5只证券",
                "CLOSE_PRICE":12.3,"CHANGE_RATE":10.01,"BILLBOARD_NET_AMT":3.2e7,"BILLBOARD_BUY_AMT":8.0e7,"BILLBOARD_SELL_AMT":4.8e7}]}}"#,
        );
        let entry = parse_billboard(&billboard[0]).unwrap();
        assert_eq!(entry.reason.as_deref(), Some("日涨幅偏离值达到7%的前5只证券"));
        assert_eq!(entry.net_buy, Some(3.2e7));
        assert!(parse_billboard(&Row::new()).is_none());
    }

    #[test]
    fn northbound_channels_merge_by_date() {
        let body: NorthboundResponse = serde_json::from_str(
            r#"{"data":{"hk2sh":["2024-01-02,12345.5","2024-01-03,-200.0"],"hk2sz":["2024-01-03,100.0","bad"],"s2n":[]}}"#,
        )
        .unwrap();
        let data = body.data.unwrap();
        let days = parse_northbound(&data.hk2sh, &data.hk2sz);
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].shanghai_net, Some(123_455_000.0));
        assert_eq!(days[0].shenzhen_net, None);
        assert_eq!(days[1].total(), Some(-1_000_000.0));
    }

    #[test]
    fn index_boards_cover_tracked_indices_only() {
        assert_eq!(index_board(&security("sh000300")), Some("BK0500"));
        assert_eq!(index_board(&security("sz399006")), Some("BK0638"));
        assert_eq!(index_board(&security("sh000001")), None);
        assert_eq!(index_board(&security("600519")), None);
    }

    #[tokio::test]
    async fn unmapped_index_constituents_are_unsupported() {
        let source = EastmoneySource::new(Duration::from_millis(10));
        let err = source
            .fetch_index_constituents(&security("bj899050"))
            .await
            .unwrap_err();
        assert!(matches!(err.current_context(), SourceError::Unsupported { .. }));
    }

    #[test]
    fn filters_quote_the_bare_code() {
        assert_eq!(
            code_filter("SECURITY_CODE", &security("sh600519")),
            r#"(SECURITY_CODE="600519")"#
        );
    }

    #[test]
    fn fund_flow_row_parses() {
        let line = "2024-01-02,-1.2e7,3.0e6,9.0e6,-4.0e6,-8.0e6,-5.1,1.2,3.9,-1.7,-3.4,10.80,2.86,0.00,0.00";
        let day = parse_fund_flow(line).unwrap();
        assert_eq!(day.date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(day.main_net, -1.2e7);
        assert_eq!(day.super_large_net, -8.0e6);
        assert_eq!(day.main_net_pct, -5.1);
        assert_eq!(day.close, 10.8);
        assert_eq!(day.change_pct, 2.86);
        assert!(parse_fund_flow("2024-01-02,1,2").is_none());
    }

    #[test]
    fn profile_parses_mixed_value_types() {
        let json = r#"{"data":{"f43":1688.0,"f57":"600519","f58":"贵州茅台","f84":1256197800.0,
            "f85":"1256197800","f116":2.12e12,"f117":2.12e12,"f127":"酿酒行业",
            "f162":"-","f167":8.9,"f189":20010827}}"#;
        let body: QuoteResponse = serde_json::from_str(json).unwrap();
        let profile = parse_profile(&security("600519"), &body.data.unwrap());
        assert_eq!(profile.code, "600519");
        assert_eq!(profile.name.as_deref(), Some("贵州茅台"));
        assert_eq!(profile.industry.as_deref(), Some("酿酒行业"));
        assert_eq!(profile.float_shares, Some(1256197800.0));
        assert_eq!(profile.pe_dynamic, None);
        assert_eq!(profile.pb, Some(8.9));
        assert_eq!(
            profile.listing_date,
            NaiveDate::from_ymd_opt(2001, 8, 27)
        );
    }

    /// Integration test: requires network access. Run with `cargo test -- --ignored`
    #[tokio::test]
    #[ignore]
    async fn integration_fetch_daily() {
        let source = EastmoneySource::new(Duration::from_millis(500));
        let today = chrono::Local::now().date_naive();
        let bars = source
            .fetch_daily(&security("600519"), DateRange::lookback(today, 30))
            .await
            .unwrap();
        assert!(!bars.is_empty());
        assert!(bars.iter().all(|b| b.turnover_rate.is_some()));
    }

    /// Integration test: requires network access. Run with `cargo test -- --ignored`
    #[tokio::test]
    #[ignore]
    async fn integration_fetch_margin() {
        let source = EastmoneySource::new(Duration::from_millis(500));
        let days = source.fetch_margin(&security("600519"), 10).await.unwrap();
        assert!(days.windows(2).all(|w| w[0].date <= w[1].date));
    }

    /// Integration test: requires network access. Run with `cargo test -- --ignored`
    #[tokio::test]
    #[ignore]
    async fn integration_fetch_snapshot() {
        let source = EastmoneySource::new(Duration::from_millis(500));
        let entries = source.fetch_snapshot().await.unwrap();
        assert!(entries.iter().any(|e| e.code == "600519"));
    }
}
