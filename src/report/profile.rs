//! Company fundamentals report (equities only): profile, financial
//! statements and dividends.

use chrono::NaiveDateTime;
use tracing::{info, warn};

use crate::model::{CompanyProfile, Dividend, Statement, StatementPeriod, Unit};
use crate::report::{
    ReportContext, Subject, finish, fmt_date, fmt_opt, header, hundred_millions, or_empty,
};

const LABEL: &str = "profile";
pub const STEPS: usize = 7;
const TITLE: &str = "company fundamentals";
/// Reporting periods shown per statement.
pub const STATEMENT_PERIODS: usize = 4;
pub const DIVIDEND_ROWS: usize = 10;

/// Everything the report shows. Sections that could not be fetched are
/// `None` or empty.
#[derive(Debug, Clone, Default)]
pub struct Fundamentals {
    pub profile: Option<CompanyProfile>,
    /// Oldest period first within each statement.
    pub statements: Vec<(Statement, Vec<StatementPeriod>)>,
    pub dividends: Vec<Dividend>,
}

impl Fundamentals {
    pub fn is_empty(&self) -> bool {
        self.profile.is_none()
            && self.statements.iter().all(|(_, periods)| periods.is_empty())
            && self.dividends.is_empty()
    }
}

pub async fn run(ctx: &ReportContext<'_>, subject: &Subject) -> String {
    let security = &subject.security;
    if security.is_index() {
        ctx.progress.update(LABEL, STEPS, STEPS, "not applicable to indices");
        return render(subject, ctx.now, &Fundamentals::default());
    }

    ctx.progress.update(LABEL, 0, STEPS, "fetching company profile");
    let profile = match ctx.source.fetch_profile(security).await {
        Ok(profile) => profile,
        Err(e) => {
            warn!(code = %security, error = ?e, "company profile unavailable");
            None
        }
    };

    let mut statements = Vec::with_capacity(Statement::ALL.len());
    for (i, statement) in Statement::ALL.into_iter().enumerate() {
        let what = statement.title().to_lowercase();
        ctx.progress
            .update(LABEL, i + 1, STEPS, &format!("fetching {what}"));
        let periods = or_empty(
            &what,
            security,
            ctx.source
                .fetch_statement(security, statement, STATEMENT_PERIODS)
                .await,
        );
        statements.push((statement, periods));
    }

    ctx.progress.update(LABEL, 5, STEPS, "fetching dividends");
    let dividends = or_empty("dividends", security, ctx.source.fetch_dividends(security).await);

    ctx.progress.update(LABEL, 6, STEPS, "rendering");
    let fundamentals = Fundamentals {
        profile,
        statements,
        dividends,
    };
    let text = render(subject, ctx.now, &fundamentals);
    info!(code = %security, dividends = fundamentals.dividends.len(), "fundamentals report rendered");
    ctx.progress.update(LABEL, STEPS, STEPS, "done");
    text
}

pub fn render(subject: &Subject, now: NaiveDateTime, data: &Fundamentals) -> String {
    let mut lines = header(TITLE, subject, now);
    if subject.security.is_index() {
        lines.push("Company profiles are not available for indices.".into());
        return finish(lines);
    }
    if data.is_empty() {
        lines.push(format!(
            "Data unavailable: no company fundamentals could be fetched for {}.",
            subject.security.code
        ));
        return finish(lines);
    }

    match &data.profile {
        Some(p) => profile_section(&mut lines, subject, p),
        None => {
            lines.push("## Basic information".into());
            lines.push("Data unavailable.".into());
            lines.push(String::new());
        }
    }
    for (statement, periods) in &data.statements {
        statement_section(&mut lines, *statement, periods);
    }
    dividend_section(&mut lines, &data.dividends);

    finish(lines)
}

fn profile_section(lines: &mut Vec<String>, subject: &Subject, p: &CompanyProfile) {
    let text = |v: &Option<String>| v.clone().unwrap_or_else(|| "N/A".into());
    let yi = |v: Option<f64>| fmt_opt(v.map(hundred_millions), 2);

    lines.push("## Basic information".into());
    lines.push(format!("- Code: {}", p.code));
    lines.push(format!(
        "- Name: {}",
        text(&p.name.clone().or_else(|| subject.name.clone()))
    ));
    lines.push(format!("- Industry: {}", text(&p.industry)));
    lines.push(format!("- Listing date: {}", fmt_date(p.listing_date)));
    lines.push(String::new());

    lines.push("## Market data".into());
    lines.push(format!("- Latest price: {}", fmt_opt(p.latest_price, 2)));
    lines.push(format!("- Total shares: {} (100m)", yi(p.total_shares)));
    lines.push(format!("- Float shares: {} (100m)", yi(p.float_shares)));
    lines.push(format!(
        "- Total market cap: {} (100m yuan)",
        yi(p.total_market_cap)
    ));
    lines.push(format!(
        "- Float market cap: {} (100m yuan)",
        yi(p.float_market_cap)
    ));
    lines.push(format!("- P/E (dynamic): {}", fmt_opt(p.pe_dynamic, 2)));
    lines.push(format!("- P/B: {}", fmt_opt(p.pb, 2)));
    lines.push(String::new());
}

fn statement_section(lines: &mut Vec<String>, statement: Statement, periods: &[StatementPeriod]) {
    let recent = &periods[periods.len().saturating_sub(STATEMENT_PERIODS)..];
    if recent.is_empty() {
        lines.push(format!("## {}", statement.title()));
        lines.push("Data unavailable.".into());
        lines.push(String::new());
        return;
    }

    let columns = statement.columns();
    let headers: Vec<String> = columns
        .iter()
        .map(|(label, unit)| match unit {
            Unit::Yuan => format!("{label} (100m yuan)"),
            Unit::PerShare => format!("{label} (yuan)"),
            Unit::Percent => format!("{label} %"),
        })
        .collect();

    lines.push(format!("## {}, last {} periods", statement.title(), recent.len()));
    lines.push(format!("| Report date | {} |", headers.join(" | ")));
    lines.push(format!("|{}", "---|".repeat(columns.len() + 1)));
    for period in recent.iter().rev() {
        let cells: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, (_, unit))| {
                let value = period.values.get(i).copied().flatten();
                match unit {
                    Unit::Yuan => fmt_opt(value.map(hundred_millions), 2),
                    Unit::PerShare => fmt_opt(value, 3),
                    Unit::Percent => fmt_opt(value, 2),
                }
            })
            .collect();
        lines.push(format!(
            "| {} | {} |",
            period.report_date.format("%Y-%m-%d"),
            cells.join(" | ")
        ));
    }
    lines.push(String::new());
}

fn dividend_section(lines: &mut Vec<String>, dividends: &[Dividend]) {
    lines.push("## Dividends".into());
    if dividends.is_empty() {
        lines.push("No dividend records found.".into());
        return;
    }
    lines.push("| Report date | Plan | Ex-dividend date | Progress |".into());
    lines.push("|---|---|---|---|".into());
    for d in dividends.iter().rev().take(DIVIDEND_ROWS) {
        lines.push(format!(
            "| {} | {} | {} | {} |",
            d.report_date.format("%Y-%m-%d"),
            d.plan.as_deref().unwrap_or("N/A"),
            fmt_date(d.ex_dividend_date),
            d.progress.as_deref().unwrap_or("N/A")
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::tests::{noon, subject};
    use chrono::NaiveDate;

    fn quarter(year: i32, month: u32, day: u32, values: Vec<Option<f64>>) -> StatementPeriod {
        StatementPeriod {
            report_date: NaiveDate::from_ymd_opt(year, month, day).unwrap(),
            values,
        }
    }

    fn with_profile(profile: CompanyProfile) -> Fundamentals {
        Fundamentals {
            profile: Some(profile),
            ..Fundamentals::default()
        }
    }

    #[test]
    fn renders_known_fields() {
        let profile = CompanyProfile {
            code: "600519".into(),
            name: Some("贵州茅台".into()),
            industry: Some("酿酒行业".into()),
            listing_date: NaiveDate::from_ymd_opt(2001, 8, 27),
            latest_price: Some(1685.5),
            total_shares: Some(1_256_197_800.0),
            total_market_cap: Some(2.1e12),
            pe_dynamic: Some(28.456),
            ..CompanyProfile::default()
        };
        let text = render(&subject("600519", None), noon(), &with_profile(profile));
        assert!(text.contains("- Name: 贵州茅台"));
        assert!(text.contains("- Listing date: 2001-08-27"));
        assert!(text.contains("- Total shares: 12.56 (100m)"));
        assert!(text.contains("- Total market cap: 21000.00 (100m yuan)"));
        assert!(text.contains("- P/E (dynamic): 28.46"));
        assert!(text.contains("- Float shares: N/A (100m)"));
        assert!(text.contains("- P/B: N/A"));
        assert!(text.contains("No dividend records found."));
    }

    #[test]
    fn missing_name_falls_back_to_subject() {
        let profile = CompanyProfile {
            code: "600519".into(),
            ..CompanyProfile::default()
        };
        let text = render(&subject("600519", Some("贵州茅台")), noon(), &with_profile(profile));
        assert!(text.contains("- Name: 贵州茅台"));
        assert!(text.contains("- Industry: N/A"));
    }

    #[test]
    fn statements_list_latest_periods_newest_first() {
        let periods = vec![
            quarter(2023, 3, 31, vec![Some(1.0e11), Some(2.0e10), Some(8.0e10), Some(15.0)]),
            quarter(2023, 6, 30, vec![Some(1.1e11), None, Some(8.5e10), Some(14.0)]),
            quarter(2023, 9, 30, vec![Some(1.2e11), None, Some(9.0e10), Some(13.0)]),
            quarter(2023, 12, 31, vec![Some(1.3e11), None, Some(9.5e10), Some(12.0)]),
            quarter(2024, 3, 31, vec![Some(1.4e11), Some(1.6e10), Some(1.0e11), Some(11.4)]),
        ];
        let data = Fundamentals {
            statements: vec![(Statement::Balance, periods), (Statement::CashFlow, vec![])],
            ..Fundamentals::default()
        };
        let text = render(&subject("600519", None), noon(), &data);

        assert!(text.contains("## Basic information\nData unavailable."));
        assert!(text.contains("## Balance sheet, last 4 periods"));
        assert!(text.contains(
            "| Report date | Total assets (100m yuan) | Total liabilities (100m yuan) | Total equity (100m yuan) | Debt ratio % |"
        ));
        let rows: Vec<&str> = text.lines().filter(|l| l.starts_with("| 202")).collect();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0], "| 2024-03-31 | 1400.00 | 160.00 | 1000.00 | 11.40 |");
        assert_eq!(rows[3], "| 2023-06-30 | 1100.00 | N/A | 850.00 | 14.00 |");
        assert!(text.contains("## Cash flow statement\nData unavailable."));
    }

    #[test]
    fn per_share_values_keep_three_decimals() {
        let mut values = vec![None; Statement::Summary.columns().len()];
        values[0] = Some(19.163);
        let data = Fundamentals {
            statements: vec![(Statement::Summary, vec![quarter(2024, 3, 31, values)])],
            ..Fundamentals::default()
        };
        let text = render(&subject("600519", None), noon(), &data);
        assert!(text.contains("| EPS (yuan) | Book value per share (yuan) |"));
        assert!(text.contains("| 2024-03-31 | 19.163 | N/A |"));
    }

    #[test]
    fn dividends_newest_first() {
        let dividend = |year: i32, plan: &str| Dividend {
            report_date: NaiveDate::from_ymd_opt(year, 12, 31).unwrap(),
            plan: Some(plan.into()),
            ex_dividend_date: NaiveDate::from_ymd_opt(year + 1, 6, 19),
            progress: None,
        };
        let data = Fundamentals {
            dividends: vec![dividend(2022, "10派259.11元"), dividend(2023, "10派308.76元")],
            ..Fundamentals::default()
        };
        let text = render(&subject("600519", None), noon(), &data);
        let rows: Vec<&str> = text.lines().filter(|l| l.starts_with("| 202")).collect();
        assert_eq!(rows[0], "| 2023-12-31 | 10派308.76元 | 2024-06-19 | N/A |");
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn missing_fundamentals_are_unavailable() {
        let text = render(&subject("600519", None), noon(), &Fundamentals::default());
        assert!(text.contains("Data unavailable"));
        assert!(!text.contains("## Dividends"));
    }

    #[test]
    fn index_is_not_applicable() {
        let text = render(&subject("399001", None), noon(), &Fundamentals::default());
        assert!(text.contains("not available for indices"));
    }
}
