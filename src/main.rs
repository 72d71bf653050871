mod code;
mod config;
mod error;
mod indicator;
mod model;
mod predict;
mod progress;
mod report;
mod signal;
mod source;

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use chrono_tz::Asia::Shanghai;
use clap::Parser;
use derive_more::{Display, Error};
use error_stack::{Report, ResultExt};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use config::AppConfig;
use progress::terminal::TerminalProgress;
use report::writer;
use report::{ReportContext, ReportKind, Subject};
use source::DataSource;
use source::chain::SourceChain;
use source::eastmoney::EastmoneySource;
use source::tencent::TencentSource;

#[derive(Debug, Display, Error)]
pub enum AppError {
    #[display("configuration error")]
    Config,
    #[display("input error")]
    Input,
}

#[derive(Parser)]
#[command(
    name = "ashare-report",
    about = "Technical analysis reports for A-share stocks and indices"
)]
struct Cli {
    /// Stock or index code, e.g. 600519, sz000858, 000001, 1A0001
    code: Option<String>,

    /// Output file, used only when exactly one report kind is selected
    output: Option<PathBuf>,

    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Report kinds to generate (repeatable)
    #[arg(short, long = "report", value_enum)]
    reports: Vec<ReportKind>,

    /// Generate every report kind
    #[arg(long, conflicts_with_all = ["reports", "basic"])]
    all: bool,

    /// Generate the daily and minute reports
    #[arg(long, conflicts_with = "reports")]
    basic: bool,
}

impl Cli {
    /// Selected kinds in generation order, without repeats. Daily by default.
    fn kinds(&self) -> Vec<ReportKind> {
        let mut kinds = if self.all {
            ReportKind::ALL.to_vec()
        } else if self.basic {
            vec![ReportKind::Daily, ReportKind::Minute]
        } else if self.reports.is_empty() {
            vec![ReportKind::Daily]
        } else {
            self.reports.clone()
        };
        kinds.sort();
        kinds.dedup();
        kinds
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(report) = run().await {
        eprintln!("{report:?}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Report<AppError>> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => config::load(path),
        None => config::load_or_default(Path::new(config::DEFAULT_CONFIG_PATH)),
    }
    .change_context(AppError::Config)?;

    init_tracing(&config);

    let raw = match &cli.code {
        Some(code) => code.clone(),
        None => match prompt_code().change_context(AppError::Input)? {
            Some(code) => code,
            None => return Ok(()),
        },
    };

    let security = match code::parse(&raw) {
        Ok(security) => security,
        Err(e) => {
            eprintln!("{}", e.current_context());
            return Ok(());
        }
    };

    let source = build_sources(&config);
    if source.is_empty() {
        warn!("no data sources enabled; nothing to do");
        return Ok(());
    }

    let now = Utc::now().with_timezone(&Shanghai).naive_local();
    let name = code::resolve_name(&raw, &source).await;
    let subject = Subject { security, name };
    info!(code = %subject.security, name = ?subject.name, "generating reports");

    let kinds = cli.kinds();
    let progress = TerminalProgress;
    let ctx = ReportContext {
        source: &source,
        config: &config,
        progress: &progress,
        now,
    };

    let mut completed = 0;
    for &kind in &kinds {
        let path = output_path(&cli, &config, &subject, kind, &kinds, now);
        let text = report::generate(kind, &ctx, &subject).await;
        match writer::write(&path, &text) {
            Ok(()) => {
                completed += 1;
                println!("{kind} report written to {}", path.display());
            }
            Err(e) => {
                error!(kind = %kind, error = ?e, "report could not be written");
                eprintln!("{kind} report failed: {}", e.current_context());
            }
        }
    }

    println!("completed {completed}/{} reports", kinds.len());
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::new(&config.general.log_level);
    match config.general.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

fn build_sources(config: &AppConfig) -> SourceChain {
    let interval = config.fetch.request_interval();
    let sources = config
        .sources
        .iter()
        .filter(|s| s.enabled)
        .filter_map(|s| match s.name.as_str() {
            "eastmoney" => Some(Arc::new(EastmoneySource::new(interval)) as Arc<dyn DataSource>),
            "tencent" => Some(Arc::new(TencentSource::new(interval)) as Arc<dyn DataSource>),
            other => {
                warn!(name = other, "unknown source in config, skipping");
                None
            }
        })
        .collect();
    SourceChain::new(sources)
}

fn output_path(
    cli: &Cli,
    config: &AppConfig,
    subject: &Subject,
    kind: ReportKind,
    kinds: &[ReportKind],
    now: chrono::NaiveDateTime,
) -> PathBuf {
    if kinds.len() == 1 {
        return cli
            .output
            .clone()
            .unwrap_or_else(|| writer::single_path(subject, kind, now));
    }
    if cli.output.is_some() {
        warn!("OUTPUT is ignored when several report kinds are selected");
    }
    writer::batch_path(Path::new(&config.general.output_dir), subject, kind, now)
}

/// Ask for a code on stdin. `None` on `q` or end of input.
fn prompt_code() -> Result<Option<String>, Report<std::io::Error>> {
    let stdin = std::io::stdin();
    let mut out = std::io::stdout();
    loop {
        write!(out, "Enter a stock or index code (q to quit): ")?;
        out.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        match line.trim() {
            "" => continue,
            "q" | "Q" => return Ok(None),
            code => return Ok(Some(code.to_owned())),
        }
    }
}
