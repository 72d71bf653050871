//! Stock and index code validation, normalization and name lookup.

use std::sync::LazyLock;

use error_stack::{Report, bail};
use regex::Regex;
use tracing::{debug, warn};

use crate::error::CodeError;
use crate::model::Security;
use crate::source::DataSource;

static EQUITY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:sh|sz|bj)?[0-9]{6}$").expect("valid equity pattern"));
static INDEX_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(000[0-9]{3}|399[0-9]{3}|[0-9][A-Z][0-9]{4})$").expect("valid index pattern")
});
static LEGACY_INDEX_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9][A-Z][0-9]{4}$").expect("valid legacy pattern"));
static BARE_INDEX_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(000[0-9]{3}|399[0-9]{3})$").expect("valid bare index pattern"));
static MARKET_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(sh|sz|bj)").expect("valid prefix pattern"));

/// A well-known index with a fixed display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexInfo {
    /// Canonical market-prefixed code.
    pub code: &'static str,
    pub display_name: &'static str,
}

const KNOWN_INDICES: &[IndexInfo] = &[
    IndexInfo {
        code: "sh000001",
        display_name: "上证指数",
    },
    IndexInfo {
        code: "sz399001",
        display_name: "深证成指",
    },
    IndexInfo {
        code: "sz399006",
        display_name: "创业板指",
    },
    IndexInfo {
        code: "sh000300",
        display_name: "沪深300",
    },
    IndexInfo {
        code: "sh000016",
        display_name: "上证50",
    },
    IndexInfo {
        code: "sz399905",
        display_name: "中证500",
    },
];

/// Legacy and bare index codes mapped to their canonical prefixed form.
const INDEX_ALIASES: &[(&str, &str)] = &[
    ("1A0001", "sh000001"),
    ("000001", "sh000001"),
    ("399001", "sz399001"),
    ("399006", "sz399006"),
    ("000300", "sh000300"),
    ("000016", "sh000016"),
    ("399905", "sz399905"),
];

/// Whether `raw` looks like an equity code (optionally market-prefixed) or an
/// index code in modern or legacy form.
pub fn is_valid(raw: &str) -> bool {
    let raw = raw.trim();
    EQUITY_PATTERN.is_match(&raw.to_ascii_lowercase())
        || INDEX_PATTERN.is_match(&raw.to_ascii_uppercase())
}

/// Validate and normalize a user-supplied code.
///
/// Known bare or legacy index codes become their canonical prefixed form,
/// prefixed codes are lower-cased, plain equity codes pass through. The
/// function is idempotent.
pub fn normalize(raw: &str) -> Result<String, Report<CodeError>> {
    let code = raw.trim();
    if !is_valid(code) {
        bail!(CodeError::InvalidFormat {
            input: raw.to_owned(),
        });
    }

    let upper = code.to_ascii_uppercase();
    if LEGACY_INDEX_PATTERN.is_match(&upper) || BARE_INDEX_PATTERN.is_match(code) {
        let canonical = alias_target(&upper)
            .or_else(|| alias_target(code))
            .unwrap_or(code);
        return Ok(canonical.to_owned());
    }

    let lower = code.to_ascii_lowercase();
    if MARKET_PREFIX.is_match(&lower) {
        return Ok(lower);
    }

    Ok(code.to_owned())
}

/// Normalize `raw` and split it into market and kind.
pub fn parse(raw: &str) -> Result<Security, Report<CodeError>> {
    let normalized = normalize(raw)?;
    match Security::from_normalized(&normalized) {
        Some(security) => Ok(security),
        None => bail!(CodeError::InvalidFormat {
            input: raw.to_owned(),
        }),
    }
}

/// Look up a well-known index by canonical code or alias.
pub fn index_info(code: &str) -> Option<&'static IndexInfo> {
    let trimmed = code.trim();
    let canonical = alias_target(&trimmed.to_ascii_uppercase()).unwrap_or(trimmed);
    KNOWN_INDICES
        .iter()
        .find(|info| info.code.eq_ignore_ascii_case(canonical))
}

/// Resolve a human-readable name for `raw`.
///
/// The static index table is consulted first (normalized code, then the raw
/// input). Otherwise the bare equity code is looked up in the live snapshot.
/// Lookup failures are logged and yield `None`; they never propagate.
pub async fn resolve_name(raw: &str, source: &dyn DataSource) -> Option<String> {
    let normalized = normalize(raw).ok()?;

    if let Some(info) = index_info(&normalized).or_else(|| index_info(raw)) {
        return Some(info.display_name.to_owned());
    }

    let bare = strip_market_prefix(&normalized);
    match source.fetch_snapshot().await {
        Ok(entries) => {
            let name = entries
                .into_iter()
                .find(|entry| entry.code == bare)
                .map(|entry| entry.name);
            debug!(code = %bare, found = name.is_some(), "snapshot name lookup");
            name
        }
        Err(e) => {
            warn!(code = %bare, error = ?e, "name lookup failed, continuing without a name");
            None
        }
    }
}

/// Remove a leading `sh`/`sz`/`bj` market prefix.
pub fn strip_market_prefix(code: &str) -> String {
    MARKET_PREFIX
        .replace(&code.to_ascii_lowercase(), "")
        .into_owned()
}

fn alias_target(code: &str) -> Option<&'static str> {
    INDEX_ALIASES
        .iter()
        .find(|(alias, _)| *alias == code)
        .map(|(_, canonical)| *canonical)
}
