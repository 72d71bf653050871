//! Report file naming and output.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use error_stack::{Report, ResultExt};
use tracing::info;

use crate::error::ReportError;
use crate::report::{ReportKind, Subject};

/// File for one report of a multi-report run:
/// `{output_dir}/{yyyymmdd}/{code}[_{name}]_{kind}_{yyyymmdd}_{HHMMSS}.txt`.
pub fn batch_path(
    output_dir: &Path,
    subject: &Subject,
    kind: ReportKind,
    now: NaiveDateTime,
) -> PathBuf {
    let stem = match subject.name.as_deref().map(sanitize).filter(|n| !n.is_empty()) {
        Some(name) => format!("{}_{name}", subject.security.code),
        None => subject.security.code.clone(),
    };
    output_dir
        .join(now.format("%Y%m%d").to_string())
        .join(format!(
            "{stem}_{}_{}.txt",
            kind.slug(),
            now.format("%Y%m%d_%H%M%S")
        ))
}

/// Default file for a single-report run: `{code}_{kind}_{yyyymmdd_HHMMSS}.txt`.
pub fn single_path(subject: &Subject, kind: ReportKind, now: NaiveDateTime) -> PathBuf {
    PathBuf::from(format!(
        "{}_{}_{}.txt",
        subject.security.code,
        kind.slug(),
        now.format("%Y%m%d_%H%M%S")
    ))
}

/// Keep names usable as a file-name component.
fn sanitize(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect()
}

/// Create parent directories and write `text` to `path`.
pub fn write(path: &Path, text: &str) -> Result<(), Report<ReportError>> {
    let context = || ReportError::Write {
        path: path.display().to_string(),
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .change_context_lazy(context)
            .attach_with(|| format!("creating directory {}", parent.display()))?;
    }
    std::fs::write(path, text).change_context_lazy(context)?;

    info!(path = %path.display(), bytes = text.len(), "report written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::tests::{noon, subject};

    #[test]
    fn batch_path_groups_by_day_and_includes_name() {
        let path = batch_path(
            Path::new("outputs/stock_results"),
            &subject("600519", Some("贵州茅台")),
            ReportKind::Daily,
            noon(),
        );
        assert_eq!(
            path,
            PathBuf::from("outputs/stock_results/20240201/600519_贵州茅台_daily_20240201_120000.txt")
        );
    }

    #[test]
    fn batch_path_without_name() {
        let path = batch_path(Path::new("out"), &subject("1A0001", None), ReportKind::FundFlow, noon());
        assert_eq!(path, PathBuf::from("out/20240201/sh000001_fund_flow_20240201_120000.txt"));
    }

    #[test]
    fn names_are_sanitized() {
        let path = batch_path(Path::new("out"), &subject("600001", Some("*ST A/B")), ReportKind::Minute, noon());
        assert_eq!(path.file_name().unwrap(), "600001__ST_A_B_minute_20240201_120000.txt");
    }

    #[test]
    fn single_path_is_relative() {
        let path = single_path(&subject("sz000858", None), ReportKind::Minute, noon());
        assert_eq!(path, PathBuf::from("sz000858_minute_20240201_120000.txt"));
    }

    #[test]
    fn write_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/report.txt");
        write(&path, "hello\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello\n");
    }

    #[test]
    fn write_into_a_file_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();
        let err = write(&blocker.join("report.txt"), "text").unwrap_err();
        assert!(matches!(err.current_context(), ReportError::Write { .. }));
    }
}
