pub mod terminal;

/// Bar width in characters.
pub const BAR_WIDTH: usize = 30;

/// Sink for pipeline step updates.
pub trait Progress: Send + Sync {
    /// Step `done` of `total` of the pipeline `label` has completed.
    fn update(&self, label: &str, done: usize, total: usize, step: &str);
}

/// Discards every update.
pub struct Silent;

impl Progress for Silent {
    fn update(&self, _label: &str, _done: usize, _total: usize, _step: &str) {}
}

/// `label |███---| done/total step`
pub fn render_line(label: &str, done: usize, total: usize, step: &str) -> String {
    let filled = if total == 0 {
        BAR_WIDTH
    } else {
        (BAR_WIDTH * done.min(total)) / total
    };
    format!(
        "{label} |{}{}| {done}/{total} {step}",
        "█".repeat(filled),
        "-".repeat(BAR_WIDTH - filled)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_full_bars() {
        let empty = render_line("daily", 0, 5, "start");
        assert_eq!(empty, format!("daily |{}| 0/5 start", "-".repeat(BAR_WIDTH)));
        let full = render_line("daily", 5, 5, "done");
        assert_eq!(full, format!("daily |{}| 5/5 done", "█".repeat(BAR_WIDTH)));
    }

    #[test]
    fn partial_bar_rounds_down() {
        let line = render_line("minute", 1, 6, "fetch");
        assert!(line.starts_with(&format!("minute |{}-", "█".repeat(5))));
        assert!(line.ends_with("| 1/6 fetch"));
    }

    #[test]
    fn overshoot_is_clamped() {
        let line = render_line("x", 9, 3, "");
        assert!(line.contains(&"█".repeat(BAR_WIDTH)));
    }
}
