use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use error_stack::{Report, ResultExt};
use serde::Deserialize;
use tracing::debug;

use crate::error::ConfigError;
use crate::model::Resolution;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "text".into()
}

fn default_output_dir() -> String {
    "outputs/stock_results".into()
}

fn default_daily_lookback_days() -> u32 {
    90
}

fn default_request_interval_ms() -> u64 {
    500
}

fn default_true() -> bool {
    true
}

fn default_sources() -> Vec<SourceConfig> {
    ["eastmoney", "tencent"]
        .into_iter()
        .map(|name| SourceConfig {
            name: name.into(),
            enabled: true,
        })
        .collect()
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    /// Fallback order: earlier entries are tried first.
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub thresholds: Thresholds,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            fetch: FetchConfig::default(),
            sources: default_sources(),
            thresholds: Thresholds::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Accepted values: `"text"` | `"json"`
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            output_dir: default_output_dir(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct FetchConfig {
    /// Calendar days of daily history requested for equities.
    #[serde(default = "default_daily_lookback_days")]
    pub daily_lookback_days: u32,
    /// Minimum spacing between requests to one source.
    #[serde(default = "default_request_interval_ms")]
    pub request_interval_ms: u64,
    #[serde(default)]
    pub minute_lookback_days: MinuteLookback,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            daily_lookback_days: default_daily_lookback_days(),
            request_interval_ms: default_request_interval_ms(),
            minute_lookback_days: MinuteLookback::default(),
        }
    }
}

impl FetchConfig {
    pub fn request_interval(&self) -> Duration {
        Duration::from_millis(self.request_interval_ms)
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct MinuteLookback {
    pub m5: u32,
    pub m15: u32,
    pub m60: u32,
}

impl Default for MinuteLookback {
    fn default() -> Self {
        Self {
            m5: 3,
            m15: 5,
            m60: 21,
        }
    }
}

impl MinuteLookback {
    /// Lookback for an intraday resolution; `None` for daily bars.
    pub fn days(&self, resolution: Resolution) -> Option<u32> {
        match resolution {
            Resolution::Min5 => Some(self.m5),
            Resolution::Min15 => Some(self.m15),
            Resolution::Min60 => Some(self.m60),
            Resolution::Daily => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Cut-offs used to classify indicator states and pick a recommendation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    /// RSI above this counts as a bullish signal.
    pub rsi_bullish: f64,
    pub turnover_extreme: f64,
    pub turnover_high: f64,
    pub turnover_moderate: f64,
    /// Turnover (%) above this counts as a risk.
    pub turnover_risk: f64,
    /// Latest volume above `multiplier * average` counts as a risk.
    pub volume_surge_multiplier: f64,
    pub bullish_signal_min: usize,
    pub caution_risk_min: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
            rsi_bullish: 50.0,
            turnover_extreme: 20.0,
            turnover_high: 10.0,
            turnover_moderate: 5.0,
            turnover_risk: 15.0,
            volume_surge_multiplier: 2.0,
            bullish_signal_min: 3,
            caution_risk_min: 2,
        }
    }
}

/// Load and validate an `AppConfig` from a TOML file at `path`.
pub fn load(path: &Path) -> Result<AppConfig, Report<ConfigError>> {
    let content = std::fs::read_to_string(path)
        .change_context(ConfigError::ReadFile)
        .attach_with(|| format!("path: {}", path.display()))?;

    let config: AppConfig = toml::from_str(&content)
        .change_context(ConfigError::Parse {
            reason: "invalid TOML syntax or schema mismatch".into(),
        })
        .attach_with(|| format!("path: {}", path.display()))?;

    validate(&config)?;

    Ok(config)
}

/// Like [`load`], but a missing file yields the built-in defaults.
pub fn load_or_default(path: &Path) -> Result<AppConfig, Report<ConfigError>> {
    if !path.exists() {
        debug!(path = %path.display(), "no config file, using defaults");
        return Ok(AppConfig::default());
    }
    load(path)
}

pub const KNOWN_SOURCES: &[&str] = &["eastmoney", "tencent"];
const LOG_FORMATS: &[&str] = &["text", "json"];

fn validate(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    validate_general(config)?;
    validate_fetch(config)?;
    validate_sources(config)?;
    validate_thresholds(config)?;
    Ok(())
}

fn invalid(field: String) -> Report<ConfigError> {
    Report::new(ConfigError::Validation { field })
}

fn validate_general(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    if !LOG_FORMATS.contains(&config.general.log_format.as_str()) {
        return Err(invalid(format!(
            "general.log_format \"{}\" must be one of {LOG_FORMATS:?}",
            config.general.log_format
        )));
    }
    if config.general.output_dir.trim().is_empty() {
        return Err(invalid("general.output_dir must not be empty".into()));
    }
    Ok(())
}

fn validate_fetch(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let fetch = &config.fetch;
    let lookbacks = [
        ("daily_lookback_days", fetch.daily_lookback_days),
        ("minute_lookback_days.m5", fetch.minute_lookback_days.m5),
        ("minute_lookback_days.m15", fetch.minute_lookback_days.m15),
        ("minute_lookback_days.m60", fetch.minute_lookback_days.m60),
    ];
    if let Some((name, _)) = lookbacks.iter().find(|(_, days)| *days == 0) {
        return Err(invalid(format!("fetch.{name} must be > 0")));
    }
    if fetch.request_interval_ms == 0 {
        return Err(invalid("fetch.request_interval_ms must be > 0".into()));
    }
    Ok(())
}

fn validate_sources(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let mut seen = HashSet::new();
    for source in &config.sources {
        if !KNOWN_SOURCES.contains(&source.name.as_str()) {
            return Err(invalid(format!(
                "sources[\"{}\"]: unknown source, expected one of {KNOWN_SOURCES:?}",
                source.name
            )));
        }
        if !seen.insert(source.name.as_str()) {
            return Err(invalid(format!("sources: duplicate name \"{}\"", source.name)));
        }
    }
    if !config.sources.iter().any(|s| s.enabled) {
        return Err(invalid("sources: at least one source must be enabled".into()));
    }
    Ok(())
}

fn validate_thresholds(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let t = &config.thresholds;
    if t.rsi_oversold >= t.rsi_overbought {
        return Err(invalid(format!(
            "thresholds.rsi_oversold ({}) must be < rsi_overbought ({})",
            t.rsi_oversold, t.rsi_overbought
        )));
    }
    if !(t.turnover_extreme > t.turnover_high && t.turnover_high > t.turnover_moderate) {
        return Err(invalid(
            "thresholds: turnover_extreme > turnover_high > turnover_moderate is required".into(),
        ));
    }
    if t.volume_surge_multiplier <= 0.0 {
        return Err(invalid("thresholds.volume_surge_multiplier must be > 0".into()));
    }
    Ok(())
}
