//! Index membership report (equities only): which major indices hold the
//! stock, and how those indices traded recently.

use chrono::NaiveDateTime;
use tracing::{info, warn};

use crate::code::strip_market_prefix;
use crate::model::{Bar, Market, Security};
use crate::report::{
    ReportContext, Subject, finish, fmt_num, fmt_opt, header, or_empty, ten_thousands,
};
use crate::source::{self, DataSource, DateRange};

const LABEL: &str = "index-membership";
const TITLE: &str = "index membership report";
/// Calendar days of history fetched for each member index.
pub const PERFORMANCE_LOOKBACK_DAYS: u32 = 30;
/// Daily rows listed per member index.
pub const PERFORMANCE_ROWS: usize = 10;

/// Listing segment an index draws its constituents from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Universe {
    /// Shanghai and Shenzhen, every board.
    ShanghaiShenzhen,
    Shanghai,
    ChiNext,
    Star,
    Beijing,
}

impl Universe {
    pub fn contains(self, security: &Security) -> bool {
        let digits = security.digits.as_str();
        match self {
            Self::ShanghaiShenzhen => matches!(security.market, Market::Shanghai | Market::Shenzhen),
            Self::Shanghai => security.market == Market::Shanghai,
            Self::ChiNext => security.market == Market::Shenzhen && digits.starts_with("30"),
            Self::Star => {
                security.market == Market::Shanghai
                    && (digits.starts_with("688") || digits.starts_with("689"))
            }
            Self::Beijing => security.market == Market::Beijing,
        }
    }
}

#[derive(Debug)]
pub struct TrackedIndex {
    pub name: &'static str,
    pub code: &'static str,
    pub universe: Universe,
}

impl TrackedIndex {
    pub fn security(&self) -> Option<Security> {
        Security::from_normalized(self.code)
    }
}

const TRACKED: usize = 6;

pub static TRACKED_INDICES: [TrackedIndex; TRACKED] = [
    TrackedIndex {
        name: "CSI 300",
        code: "sh000300",
        universe: Universe::ShanghaiShenzhen,
    },
    TrackedIndex {
        name: "SSE 50",
        code: "sh000016",
        universe: Universe::Shanghai,
    },
    TrackedIndex {
        name: "CSI 500",
        code: "sh000905",
        universe: Universe::ShanghaiShenzhen,
    },
    TrackedIndex {
        name: "ChiNext Index",
        code: "sz399006",
        universe: Universe::ChiNext,
    },
    TrackedIndex {
        name: "STAR 50",
        code: "sh000688",
        universe: Universe::Star,
    },
    TrackedIndex {
        name: "BSE 50",
        code: "bj899050",
        universe: Universe::Beijing,
    },
];

/// One check per tracked index, then performance and rendering.
pub const STEPS: usize = TRACKED + 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Member { constituents: usize },
    NotMember { constituents: usize },
    /// The stock trades on a board the index never samples.
    OutsideUniverse,
    /// Constituents could not be fetched.
    Unknown,
}

#[derive(Debug)]
pub struct IndexCheck {
    pub index: &'static TrackedIndex,
    pub membership: Membership,
}

/// Recent daily bars of a member index, oldest first.
#[derive(Debug)]
pub struct IndexPerformance {
    pub index: &'static TrackedIndex,
    pub bars: Vec<Bar>,
}

pub async fn run(ctx: &ReportContext<'_>, subject: &Subject) -> String {
    let security = &subject.security;
    if security.is_index() {
        ctx.progress.update(LABEL, STEPS, STEPS, "not applicable to indices");
        return render(subject, ctx.now, &[], &[]);
    }

    let mut checks = Vec::with_capacity(TRACKED);
    for (step, index) in TRACKED_INDICES.iter().enumerate() {
        ctx.progress
            .update(LABEL, step, STEPS, &format!("checking {}", index.name));
        let membership = check(ctx.source, security, index).await;
        checks.push(IndexCheck { index, membership });
    }

    ctx.progress
        .update(LABEL, TRACKED, STEPS, "fetching member index bars");
    let range = DateRange::lookback(ctx.today(), PERFORMANCE_LOOKBACK_DAYS);
    let mut performance = Vec::new();
    for check in checks
        .iter()
        .filter(|c| matches!(c.membership, Membership::Member { .. }))
    {
        let Some(index) = check.index.security() else {
            continue;
        };
        let bars = or_empty("index bars", &index, ctx.source.fetch_daily(&index, range).await);
        performance.push(IndexPerformance {
            index: check.index,
            bars: source::prepare_bars(bars),
        });
    }

    ctx.progress
        .update(LABEL, TRACKED + 1, STEPS, "rendering");
    let text = render(subject, ctx.now, &checks, &performance);
    info!(code = %security, member_of = performance.len(), "index membership report rendered");
    ctx.progress.update(LABEL, STEPS, STEPS, "done");
    text
}

async fn check(source: &dyn DataSource, security: &Security, index: &TrackedIndex) -> Membership {
    if !index.universe.contains(security) {
        return Membership::OutsideUniverse;
    }
    let Some(index_security) = index.security() else {
        return Membership::Unknown;
    };
    match source.fetch_index_constituents(&index_security).await {
        Ok(codes) => membership_of(security, &codes),
        Err(e) => {
            warn!(code = %security, index = index.code, error = ?e, "constituents unavailable");
            Membership::Unknown
        }
    }
}

/// Constituent codes may carry a market prefix.
pub fn membership_of(security: &Security, constituents: &[String]) -> Membership {
    let constituents_len = constituents.len();
    if constituents
        .iter()
        .any(|code| strip_market_prefix(code) == security.digits)
    {
        Membership::Member {
            constituents: constituents_len,
        }
    } else {
        Membership::NotMember {
            constituents: constituents_len,
        }
    }
}

pub fn render(
    subject: &Subject,
    now: NaiveDateTime,
    checks: &[IndexCheck],
    performance: &[IndexPerformance],
) -> String {
    let mut lines = header(TITLE, subject, now);
    if subject.security.is_index() {
        lines.push("Index membership applies to equities only.".into());
        return finish(lines);
    }

    lines.push("## Constituent checks".into());
    lines.push("| Index | Code | Constituents | Member |".into());
    lines.push("|---|---|---|---|".into());
    for c in checks {
        let (count, member) = match c.membership {
            Membership::Member { constituents } => (constituents.to_string(), "yes"),
            Membership::NotMember { constituents } => (constituents.to_string(), "no"),
            Membership::OutsideUniverse => ("N/A".into(), "no (outside the index universe)"),
            Membership::Unknown => ("N/A".into(), "unknown (constituents unavailable)"),
        };
        lines.push(format!(
            "| {} | {} | {count} | {member} |",
            c.index.name, c.index.code
        ));
    }
    lines.push(String::new());

    let names = |wanted: fn(&Membership) -> bool| -> Vec<&'static str> {
        checks
            .iter()
            .filter(|c| wanted(&c.membership))
            .map(|c| c.index.name)
            .collect()
    };
    let members = names(|m| matches!(m, Membership::Member { .. }));
    let unknown = names(|m| *m == Membership::Unknown);

    let code = &subject.security.code;
    lines.push("## Membership".into());
    if members.is_empty() {
        lines.push(format!("{code} is not a constituent of any tracked index."));
    } else {
        lines.push(format!("{code} is a constituent of: {}", members.join(", ")));
    }
    if !unknown.is_empty() {
        lines.push(format!("Membership could not be checked for: {}", unknown.join(", ")));
    }

    if !performance.is_empty() {
        lines.push(String::new());
        lines.push("## Recent performance of member indices".into());
        for p in performance {
            lines.push(String::new());
            performance_section(&mut lines, p);
        }
    }

    finish(lines)
}

fn performance_section(lines: &mut Vec<String>, p: &IndexPerformance) {
    lines.push(format!("### {} ({})", p.index.name, p.index.code));
    let start = p.bars.len().saturating_sub(PERFORMANCE_ROWS);
    let (Some(first), Some(last)) = (p.bars[start..].first(), p.bars.last()) else {
        lines.push("Daily data unavailable.".into());
        return;
    };

    lines.push("| Date | Close | Change % | Volume (10k lots) |".into());
    lines.push("|---|---|---|---|".into());
    for i in (start..p.bars.len()).rev() {
        let bar = &p.bars[i];
        let change = i
            .checked_sub(1)
            .and_then(|prev| change_pct(p.bars[prev].close, bar.close));
        lines.push(format!(
            "| {} | {} | {} | {} |",
            bar.date().format("%Y-%m-%d"),
            fmt_num(bar.close, 2),
            fmt_opt(change, 2),
            fmt_num(ten_thousands(bar.volume), 2)
        ));
    }
    let listed = p.bars.len() - start;
    lines.push(format!(
        "Change over the last {listed} trading days: {}%",
        fmt_opt(change_pct(first.close, last.close), 2)
    ));
}

fn change_pct(from: f64, to: f64) -> Option<f64> {
    let pct = (to - from) / from * 100.0;
    (from != 0.0 && pct.is_finite()).then_some(pct)
}
