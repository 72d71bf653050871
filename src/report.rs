pub mod daily;
pub mod fund_flow;
pub mod index_membership;
pub mod minute;
pub mod profile;
pub mod writer;

use chrono::NaiveDateTime;
use clap::ValueEnum;
use derive_more::Display;
use error_stack::Report;
use tracing::warn;

use crate::config::AppConfig;
use crate::error::SourceError;
use crate::model::Security;
use crate::progress::Progress;
use crate::source::DataSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, ValueEnum, Display)]
pub enum ReportKind {
    #[display("daily")]
    Daily,
    #[display("minute")]
    Minute,
    #[display("fund-flow")]
    FundFlow,
    #[display("profile")]
    Profile,
    #[display("index-membership")]
    IndexMembership,
}

impl ReportKind {
    pub const ALL: [ReportKind; 5] = [
        Self::Daily,
        Self::Minute,
        Self::FundFlow,
        Self::Profile,
        Self::IndexMembership,
    ];

    /// File-name component.
    pub fn slug(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Minute => "minute",
            Self::FundFlow => "fund_flow",
            Self::Profile => "profile",
            Self::IndexMembership => "index_membership",
        }
    }
}

/// The security a report is about, with its display name when known.
#[derive(Debug, Clone)]
pub struct Subject {
    pub security: Security,
    pub name: Option<String>,
}

impl Subject {
    /// `code (name)`, or just the code.
    pub fn title(&self) -> String {
        match &self.name {
            Some(name) => format!("{} ({name})", self.security.code),
            None => self.security.code.clone(),
        }
    }
}

/// Everything a report pipeline needs besides the subject.
pub struct ReportContext<'a> {
    pub source: &'a dyn DataSource,
    pub config: &'a AppConfig,
    pub progress: &'a dyn Progress,
    /// Exchange-local time the run started.
    pub now: NaiveDateTime,
}

impl ReportContext<'_> {
    pub fn today(&self) -> chrono::NaiveDate {
        self.now.date()
    }
}

/// Fetch and render one report. Data problems are part of the text; this
/// never fails.
pub async fn generate(kind: ReportKind, ctx: &ReportContext<'_>, subject: &Subject) -> String {
    match kind {
        ReportKind::Daily => daily::run(ctx, subject).await,
        ReportKind::Minute => minute::run(ctx, subject).await,
        ReportKind::FundFlow => fund_flow::run(ctx, subject).await,
        ReportKind::Profile => profile::run(ctx, subject).await,
        ReportKind::IndexMembership => index_membership::run(ctx, subject).await,
    }
}

/// Rows from an optional section; a failed fetch is logged and leaves the
/// section empty.
pub(crate) fn or_empty<T>(
    what: &str,
    security: &Security,
    fetched: Result<Vec<T>, Report<SourceError>>,
) -> Vec<T> {
    fetched.unwrap_or_else(|e| {
        warn!(code = %security, what, error = ?e, "report section unavailable");
        Vec::new()
    })
}

/// Opening lines shared by every report.
pub(crate) fn header(title: &str, subject: &Subject, now: NaiveDateTime) -> Vec<String> {
    vec![
        format!("# {} {title}", subject.title()),
        format!("Generated at: {}", now.format("%Y-%m-%d %H:%M:%S")),
        String::new(),
    ]
}

pub(crate) fn finish(lines: Vec<String>) -> String {
    let mut text = lines.join("\n");
    text.push('\n');
    text
}

/// Fixed-precision number, `N/A` when undefined.
pub(crate) fn fmt_opt(value: Option<f64>, precision: usize) -> String {
    match value.filter(|v| v.is_finite()) {
        Some(v) => format!("{v:.precision$}"),
        None => "N/A".into(),
    }
}

pub(crate) fn fmt_num(value: f64, precision: usize) -> String {
    fmt_opt(Some(value), precision)
}

/// Value in units of 10,000 (lots or yuan).
pub(crate) fn ten_thousands(value: f64) -> f64 {
    value / 10_000.0
}

/// Value in units of 100 million (shares or yuan).
pub(crate) fn hundred_millions(value: f64) -> f64 {
    value / 100_000_000.0
}

/// `%Y-%m-%d`, `N/A` when unknown.
pub(crate) fn fmt_date(date: Option<chrono::NaiveDate>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "N/A".into())
}

/// Mean of the finite values, `None` if there are none.
pub(crate) fn finite_mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (count > 0).then(|| sum / count as f64)
}

pub(crate) fn finite_max(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
}

pub(crate) fn finite_min(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.min(v))))
}
