//! Capital flow report (equities only): main-force flow, northbound capital,
//! margin trading and the dragon-tiger list.

use chrono::NaiveDateTime;
use tracing::info;

use crate::model::{BillboardEntry, FundFlowDay, MarginDay, NorthboundFlowDay, NorthboundHolding};
use crate::report::{
    ReportContext, Subject, finish, fmt_num, fmt_opt, header, hundred_millions, or_empty,
    ten_thousands,
};

const LABEL: &str = "fund-flow";
pub const STEPS: usize = 6;
const TITLE: &str = "capital flow report";
/// Days listed in the table and used for the longer cumulative figure.
pub const RECENT_DAYS: usize = 20;
pub const SHORT_DAYS: usize = 5;
/// Rows fetched and listed for northbound, margin and dragon-tiger data.
pub const DETAIL_ROWS: usize = 10;

/// Every section of the report, each oldest first. A section that could not
/// be fetched is empty.
#[derive(Debug, Clone, Default)]
pub struct CapitalFlow {
    pub main_force: Vec<FundFlowDay>,
    pub northbound: Vec<NorthboundFlowDay>,
    pub holdings: Vec<NorthboundHolding>,
    pub margin: Vec<MarginDay>,
    pub billboard: Vec<BillboardEntry>,
}

impl CapitalFlow {
    pub fn is_empty(&self) -> bool {
        self.main_force.is_empty()
            && self.northbound.is_empty()
            && self.holdings.is_empty()
            && self.margin.is_empty()
            && self.billboard.is_empty()
    }
}

pub async fn run(ctx: &ReportContext<'_>, subject: &Subject) -> String {
    let security = &subject.security;
    if security.is_index() {
        ctx.progress.update(LABEL, STEPS, STEPS, "not applicable to indices");
        return render(subject, ctx.now, &CapitalFlow::default());
    }

    ctx.progress.update(LABEL, 0, STEPS, "fetching main-force flow");
    let main_force = or_empty("capital flow", security, ctx.source.fetch_fund_flow(security).await);
    ctx.progress.update(LABEL, 1, STEPS, "fetching northbound flow");
    let northbound = or_empty(
        "northbound flow",
        security,
        ctx.source.fetch_northbound_flow(DETAIL_ROWS).await,
    );
    ctx.progress.update(LABEL, 2, STEPS, "fetching northbound holdings");
    let holdings = or_empty(
        "northbound holdings",
        security,
        ctx.source.fetch_northbound_holdings(security, DETAIL_ROWS).await,
    );
    ctx.progress.update(LABEL, 3, STEPS, "fetching margin trading");
    let margin = or_empty(
        "margin trading",
        security,
        ctx.source.fetch_margin(security, DETAIL_ROWS).await,
    );
    ctx.progress.update(LABEL, 4, STEPS, "fetching dragon-tiger list");
    let billboard = or_empty(
        "dragon-tiger list",
        security,
        ctx.source.fetch_billboard(security, DETAIL_ROWS).await,
    );

    ctx.progress.update(LABEL, 5, STEPS, "rendering");
    let flow = CapitalFlow {
        main_force,
        northbound,
        holdings,
        margin,
        billboard,
    };
    let text = render(subject, ctx.now, &flow);
    info!(
        code = %security,
        days = flow.main_force.len(),
        margin_days = flow.margin.len(),
        billboard = flow.billboard.len(),
        "capital flow report rendered"
    );
    ctx.progress.update(LABEL, STEPS, STEPS, "done");
    text
}

pub fn render(subject: &Subject, now: NaiveDateTime, flow: &CapitalFlow) -> String {
    let mut lines = header(TITLE, subject, now);
    if subject.security.is_index() {
        lines.push("Capital flow data is not available for indices.".into());
        return finish(lines);
    }
    if flow.is_empty() {
        lines.push(format!(
            "Data unavailable: no capital flow data could be fetched for {}.",
            subject.security.code
        ));
        return finish(lines);
    }

    main_force_section(&mut lines, &flow.main_force);
    northbound_section(&mut lines, &flow.northbound);
    holdings_section(&mut lines, &flow.holdings);
    margin_section(&mut lines, &flow.margin);
    billboard_section(&mut lines, &subject.security.code, &flow.billboard);

    finish(lines)
}

fn main_force_section(lines: &mut Vec<String>, days: &[FundFlowDay]) {
    if days.is_empty() {
        lines.push("## Main-force flow".into());
        lines.push("Data unavailable.".into());
        lines.push(String::new());
        return;
    }

    let recent = &days[days.len().saturating_sub(RECENT_DAYS)..];
    lines.push(format!("## Main-force flow, last {} days", recent.len()));
    lines.push(
        "| Date | Main net (10k) | Main net % | Super large (10k) | Large (10k) | Medium (10k) | Small (10k) | Close | Change % |"
            .into(),
    );
    lines.push("|---|---|---|---|---|---|---|---|---|".into());
    for day in recent.iter().rev() {
        lines.push(format!(
            "| {} | {} | {}% | {} | {} | {} | {} | {} | {}% |",
            day.date.format("%Y-%m-%d"),
            fmt_num(ten_thousands(day.main_net), 2),
            fmt_num(day.main_net_pct, 2),
            fmt_num(ten_thousands(day.super_large_net), 2),
            fmt_num(ten_thousands(day.large_net), 2),
            fmt_num(ten_thousands(day.medium_net), 2),
            fmt_num(ten_thousands(day.small_net), 2),
            fmt_num(day.close, 2),
            fmt_num(day.change_pct, 2),
        ));
    }
    lines.push(String::new());

    let short = cumulative_main_net(days, SHORT_DAYS);
    let long = cumulative_main_net(days, RECENT_DAYS);
    let inflow_days = recent.iter().filter(|d| d.main_net > 0.0).count();

    lines.push("## Main-force summary".into());
    lines.push(format!(
        "{SHORT_DAYS}-day main net inflow: {} (10k yuan)",
        fmt_num(ten_thousands(short), 2)
    ));
    lines.push(format!(
        "{RECENT_DAYS}-day main net inflow: {} (10k yuan)",
        fmt_num(ten_thousands(long), 2)
    ));
    lines.push(format!("Inflow days: {inflow_days} of {}", recent.len()));
    lines.push(format!("Short term: {}", direction("main force", short)));
    lines.push(format!("Medium term: {}", direction("main force", long)));
    lines.push(String::new());
}

fn northbound_section(lines: &mut Vec<String>, days: &[NorthboundFlowDay]) {
    let recent = &days[days.len().saturating_sub(DETAIL_ROWS)..];
    if recent.is_empty() {
        lines.push("## Northbound capital".into());
        lines.push("Data unavailable.".into());
        lines.push(String::new());
        return;
    }

    let yi = |v: Option<f64>| fmt_opt(v.map(hundred_millions), 2);
    lines.push(format!("## Northbound capital, last {} days", recent.len()));
    lines.push("| Date | Shanghai connect (100m yuan) | Shenzhen connect (100m yuan) | Total (100m yuan) |".into());
    lines.push("|---|---|---|---|".into());
    for day in recent.iter().rev() {
        lines.push(format!(
            "| {} | {} | {} | {} |",
            day.date.format("%Y-%m-%d"),
            yi(day.shanghai_net),
            yi(day.shenzhen_net),
            yi(day.total())
        ));
    }
    let net: f64 = recent.iter().filter_map(NorthboundFlowDay::total).sum();
    lines.push(String::new());
    lines.push(format!(
        "{}-day northbound net: {} (100m yuan), {}",
        recent.len(),
        fmt_num(hundred_millions(net), 2),
        direction("northbound capital", net)
    ));
    lines.push(String::new());
}

fn holdings_section(lines: &mut Vec<String>, holdings: &[NorthboundHolding]) {
    let recent = &holdings[holdings.len().saturating_sub(DETAIL_ROWS)..];
    lines.push("## Northbound holdings".into());
    let (Some(first), Some(last)) = (recent.first(), recent.last()) else {
        lines.push("Data unavailable.".into());
        lines.push(String::new());
        return;
    };

    lines.push("| Date | Shares held (10k) | Market value (100m yuan) | Share of float |".into());
    lines.push("|---|---|---|---|".into());
    for h in recent.iter().rev() {
        lines.push(format!(
            "| {} | {} | {} | {}% |",
            h.date.format("%Y-%m-%d"),
            fmt_opt(h.shares.map(ten_thousands), 2),
            fmt_opt(h.market_value.map(hundred_millions), 2),
            fmt_opt(h.float_ratio_pct, 2)
        ));
    }
    let change = last.shares.zip(first.shares).map(|(l, f)| l - f);
    lines.push(String::new());
    lines.push(format!(
        "Change in shares held since {}: {} (10k)",
        first.date.format("%Y-%m-%d"),
        fmt_opt(change.map(ten_thousands), 2)
    ));
    lines.push(String::new());
}

fn margin_section(lines: &mut Vec<String>, margin: &[MarginDay]) {
    let recent = &margin[margin.len().saturating_sub(DETAIL_ROWS)..];
    let (Some(first), Some(last)) = (recent.first(), recent.last()) else {
        lines.push("## Margin trading".into());
        lines.push("Data unavailable.".into());
        lines.push(String::new());
        return;
    };

    let yi = |v: Option<f64>| fmt_opt(v.map(hundred_millions), 2);
    lines.push(format!("## Margin trading, last {} days", recent.len()));
    lines.push(
        "| Date | Financing balance (100m) | Financing buy (100m) | Financing repay (100m) | Lending volume (10k shares) | Lending balance (100m) | Total balance (100m) |"
            .into(),
    );
    lines.push("|---|---|---|---|---|---|---|".into());
    for day in recent.iter().rev() {
        lines.push(format!(
            "| {} | {} | {} | {} | {} | {} | {} |",
            day.date.format("%Y-%m-%d"),
            yi(day.financing_balance),
            yi(day.financing_buy),
            yi(day.financing_repay),
            fmt_opt(day.lending_volume.map(ten_thousands), 2),
            yi(day.lending_balance),
            yi(day.total_balance)
        ));
    }
    let change = last
        .financing_balance
        .zip(first.financing_balance)
        .map(|(l, f)| l - f);
    lines.push(String::new());
    lines.push(format!(
        "Financing balance change since {}: {} (100m yuan)",
        first.date.format("%Y-%m-%d"),
        yi(change)
    ));
    lines.push(String::new());
}

fn billboard_section(lines: &mut Vec<String>, code: &str, entries: &[BillboardEntry]) {
    lines.push("## Dragon-tiger list".into());
    if entries.is_empty() {
        lines.push(format!("No recent dragon-tiger list appearances found for {code}."));
        return;
    }

    let wan = |v: Option<f64>| fmt_opt(v.map(ten_thousands), 2);
    lines.push("| Date | Reason | Close | Change % | Net buy (10k yuan) | Buy (10k yuan) | Sell (10k yuan) |".into());
    lines.push("|---|---|---|---|---|---|---|".into());
    for entry in entries.iter().rev().take(DETAIL_ROWS) {
        lines.push(format!(
            "| {} | {} | {} | {}% | {} | {} | {} |",
            entry.date.format("%Y-%m-%d"),
            entry.reason.as_deref().unwrap_or("N/A"),
            fmt_opt(entry.close, 2),
            fmt_opt(entry.change_pct, 2),
            wan(entry.net_buy),
            wan(entry.buy),
            wan(entry.sell)
        ));
    }
}

/// Sum of main-force net flow over the last `days` entries, skipping gaps.
pub fn cumulative_main_net(flow: &[FundFlowDay], days: usize) -> f64 {
    flow[flow.len().saturating_sub(days)..]
        .iter()
        .map(|d| d.main_net)
        .filter(|v| v.is_finite())
        .sum()
}

fn direction(actor: &str, net: f64) -> String {
    if net > 0.0 {
        format!("{actor} is net buying")
    } else if net < 0.0 {
        format!("{actor} is net selling")
    } else {
        format!("{actor} flow is balanced")
    }
}
