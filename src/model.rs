use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};

/// Exchange a security is listed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Market {
    Shanghai,
    Shenzhen,
    Beijing,
}

impl Market {
    /// Parse a two-letter market prefix (`sh`, `sz`, `bj`), case-insensitive.
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix.to_ascii_lowercase().as_str() {
            "sh" => Some(Self::Shanghai),
            "sz" => Some(Self::Shenzhen),
            "bj" => Some(Self::Beijing),
            _ => None,
        }
    }

    pub fn prefix(self) -> &'static str {
        match self {
            Self::Shanghai => "sh",
            Self::Shenzhen => "sz",
            Self::Beijing => "bj",
        }
    }

    /// Market a bare six-digit equity code trades on.
    pub fn for_equity(digits: &str) -> Self {
        match digits.as_bytes().first() {
            Some(b'6') | Some(b'9') => Self::Shanghai,
            Some(b'4') | Some(b'8') => Self::Beijing,
            _ => Self::Shenzhen,
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.prefix())
    }
}

/// Which symbol space a normalized code belongs to.
///
/// Index and equity series come from different endpoints with different
/// schemas; the normalized code alone decides which one is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityKind {
    Index,
    Equity,
}

/// A normalized code split into its market and six-digit body.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Security {
    /// Normalized code as produced by [`crate::code::normalize`].
    pub code: String,
    pub market: Market,
    pub digits: String,
    pub kind: SecurityKind,
}

impl Security {
    /// Build from an already normalized code.
    ///
    /// `sh000xxx`, `sz399xxx` and `bj899xxx` are indices; every other code is
    /// an equity.
    /// Returns `None` when the code does not end in six digits.
    pub fn from_normalized(code: &str) -> Option<Self> {
        if !code.is_ascii() {
            return None;
        }
        let (prefix, digits) = if code.len() == 8 {
            code.split_at(2)
        } else {
            ("", code)
        };
        if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        let market = if prefix.is_empty() {
            Market::for_equity(digits)
        } else {
            Market::from_prefix(prefix)?
        };

        let kind = match (prefix, &digits[..3]) {
            ("sh", "000") | ("sz", "399") | ("bj", "899") => SecurityKind::Index,
            _ => SecurityKind::Equity,
        };

        Some(Self {
            code: code.to_owned(),
            market,
            digits: digits.to_owned(),
            kind,
        })
    }

    pub fn is_index(&self) -> bool {
        self.kind == SecurityKind::Index
    }

    /// Market-prefixed form, e.g. `sh600000`.
    pub fn prefixed(&self) -> String {
        format!("{}{}", self.market.prefix(), self.digits)
    }
}

impl fmt::Display for Security {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)
    }
}

/// Bar resolution supported by the data sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    Min5,
    Min15,
    Min60,
    Daily,
}

impl Resolution {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Min5 => "5m",
            Self::Min15 => "15m",
            Self::Min60 => "60m",
            Self::Daily => "1d",
        }
    }

    /// Minutes per bar; `None` for daily bars.
    pub fn minutes(self) -> Option<u32> {
        match self {
            Self::Min5 => Some(5),
            Self::Min15 => Some(15),
            Self::Min60 => Some(60),
            Self::Daily => None,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One OHLCV quote bar.
///
/// Numeric fields that failed to parse hold `f64::NAN`. Volume is in lots
/// (100 shares); `turnover_rate` is a percentage and absent for indices.
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub amount: f64,
    pub turnover_rate: Option<f64>,
}

impl Bar {
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }
}

/// One row of the live equity snapshot used for name lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub code: String,
    pub name: String,
}

/// Daily capital flow split by order size; amounts in yuan.
#[derive(Debug, Clone, PartialEq)]
pub struct FundFlowDay {
    pub date: NaiveDate,
    pub main_net: f64,
    pub small_net: f64,
    pub medium_net: f64,
    pub large_net: f64,
    pub super_large_net: f64,
    /// Main-force net inflow as a percentage of turnover.
    pub main_net_pct: f64,
    pub close: f64,
    pub change_pct: f64,
}

/// Company facts shown in the profile report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompanyProfile {
    pub code: String,
    pub name: Option<String>,
    pub industry: Option<String>,
    pub listing_date: Option<NaiveDate>,
    pub latest_price: Option<f64>,
    pub total_shares: Option<f64>,
    pub float_shares: Option<f64>,
    pub total_market_cap: Option<f64>,
    pub float_market_cap: Option<f64>,
    pub pe_dynamic: Option<f64>,
    pub pb: Option<f64>,
}

/// Financial statements shown in the profile report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Statement {
    Summary,
    Income,
    Balance,
    CashFlow,
}

/// How a statement value is displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Yuan,
    PerShare,
    Percent,
}

impl Statement {
    pub const ALL: [Statement; 4] = [Self::Summary, Self::Income, Self::Balance, Self::CashFlow];

    pub fn title(self) -> &'static str {
        match self {
            Self::Summary => "Financial summary",
            Self::Income => "Income statement",
            Self::Balance => "Balance sheet",
            Self::CashFlow => "Cash flow statement",
        }
    }

    /// Column labels, in the order of [`StatementPeriod::values`].
    pub fn columns(self) -> &'static [(&'static str, Unit)] {
        match self {
            Self::Summary => &[
                ("EPS", Unit::PerShare),
                ("Book value per share", Unit::PerShare),
                ("Revenue", Unit::Yuan),
                ("Net profit", Unit::Yuan),
                ("Revenue YoY", Unit::Percent),
                ("Net profit YoY", Unit::Percent),
                ("ROE", Unit::Percent),
                ("Gross margin", Unit::Percent),
            ],
            Self::Income => &[
                ("Total revenue", Unit::Yuan),
                ("Operating cost", Unit::Yuan),
                ("Operating profit", Unit::Yuan),
                ("Net profit", Unit::Yuan),
            ],
            Self::Balance => &[
                ("Total assets", Unit::Yuan),
                ("Total liabilities", Unit::Yuan),
                ("Total equity", Unit::Yuan),
                ("Debt ratio", Unit::Percent),
            ],
            Self::CashFlow => &[
                ("Operating cash flow", Unit::Yuan),
                ("Investing cash flow", Unit::Yuan),
                ("Financing cash flow", Unit::Yuan),
            ],
        }
    }
}

/// One reporting period of a [`Statement`].
#[derive(Debug, Clone, PartialEq)]
pub struct StatementPeriod {
    pub report_date: NaiveDate,
    /// Aligned with [`Statement::columns`].
    pub values: Vec<Option<f64>>,
}

/// One dividend or bonus-share plan.
#[derive(Debug, Clone, PartialEq)]
pub struct Dividend {
    pub report_date: NaiveDate,
    pub plan: Option<String>,
    pub ex_dividend_date: Option<NaiveDate>,
    pub progress: Option<String>,
}

/// Market-wide northbound Stock Connect net buying; amounts in yuan.
#[derive(Debug, Clone, PartialEq)]
pub struct NorthboundFlowDay {
    pub date: NaiveDate,
    pub shanghai_net: Option<f64>,
    pub shenzhen_net: Option<f64>,
}

impl NorthboundFlowDay {
    /// Sum of the channels that reported.
    pub fn total(&self) -> Option<f64> {
        match (self.shanghai_net, self.shenzhen_net) {
            (None, None) => None,
            (sh, sz) => Some(sh.unwrap_or(0.0) + sz.unwrap_or(0.0)),
        }
    }
}

/// Northbound holdings of one stock at a trading day's close.
#[derive(Debug, Clone, PartialEq)]
pub struct NorthboundHolding {
    pub date: NaiveDate,
    pub shares: Option<f64>,
    /// Yuan.
    pub market_value: Option<f64>,
    /// Percentage of the float.
    pub float_ratio_pct: Option<f64>,
}

/// Margin trading figures for one stock and day; amounts in yuan, volume in
/// shares.
#[derive(Debug, Clone, PartialEq)]
pub struct MarginDay {
    pub date: NaiveDate,
    pub financing_balance: Option<f64>,
    pub financing_buy: Option<f64>,
    pub financing_repay: Option<f64>,
    pub lending_volume: Option<f64>,
    pub lending_balance: Option<f64>,
    pub total_balance: Option<f64>,
}

/// One appearance on the exchange's dragon-tiger list; amounts in yuan.
#[derive(Debug, Clone, PartialEq)]
pub struct BillboardEntry {
    pub date: NaiveDate,
    pub reason: Option<String>,
    pub close: Option<f64>,
    pub change_pct: Option<f64>,
    pub net_buy: Option<f64>,
    pub buy: Option<f64>,
    pub sell: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixed_index_codes_are_indices() {
        let sh = Security::from_normalized("sh000001").unwrap();
        assert_eq!(sh.kind, SecurityKind::Index);
        assert_eq!(sh.market, Market::Shanghai);
        assert_eq!(sh.digits, "000001");

        let sz = Security::from_normalized("sz399006").unwrap();
        assert!(sz.is_index());
        assert_eq!(sz.market, Market::Shenzhen);
    }

    #[test]
    fn beijing_899_prefix_is_an_index() {
        let bse50 = Security::from_normalized("bj899050").unwrap();
        assert!(bse50.is_index());
        assert_eq!(bse50.market, Market::Beijing);
        assert!(!Security::from_normalized("bj830799").unwrap().is_index());
    }

    #[test]
    fn northbound_total_sums_reported_channels() {
        let day = |sh, sz| NorthboundFlowDay {
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            shanghai_net: sh,
            shenzhen_net: sz,
        };
        assert_eq!(day(Some(1.0), Some(-3.0)).total(), Some(-2.0));
        assert_eq!(day(Some(1.0), None).total(), Some(1.0));
        assert_eq!(day(None, None).total(), None);
    }

    #[test]
    fn shenzhen_000_prefix_is_an_equity() {
        let bank = Security::from_normalized("sz000001").unwrap();
        assert_eq!(bank.kind, SecurityKind::Equity);
    }

    #[test]
    fn bare_equity_market_is_inferred() {
        assert_eq!(
            Security::from_normalized("600519").unwrap().market,
            Market::Shanghai
        );
        assert_eq!(
            Security::from_normalized("300750").unwrap().market,
            Market::Shenzhen
        );
        assert_eq!(
            Security::from_normalized("830799").unwrap().market,
            Market::Beijing
        );
        assert_eq!(
            Security::from_normalized("600519").unwrap().prefixed(),
            "sh600519"
        );
    }

    #[test]
    fn malformed_codes_rejected() {
        assert!(Security::from_normalized("1A0001").is_none());
        assert!(Security::from_normalized("xx600000").is_none());
        assert!(Security::from_normalized("60000").is_none());
    }

    #[test]
    fn resolution_minutes() {
        assert_eq!(Resolution::Min5.minutes(), Some(5));
        assert_eq!(Resolution::Min60.minutes(), Some(60));
        assert_eq!(Resolution::Daily.minutes(), None);
        assert_eq!(Resolution::Min15.to_string(), "15m");
    }
}
