use std::sync::LazyLock;

use regex::Regex;

use crate::summary::RunSummary;

const MAX_FILENAME_LEN: usize = 80;
const DEFAULT_FILENAME: &str = "console-logs";

static UNSAFE_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9._-]+").expect("valid filename regex"));

/// Console output captured for one test, ready to upload as a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub title: String,
    pub filename: String,
    pub content: String,
}

/// Turn a test display name into a `.txt` filename Slack will accept.
pub fn make_filename(test_name: &str) -> String {
    let safe = UNSAFE_FILENAME_CHARS.replace_all(test_name, "_");
    let trimmed: String = safe.trim_matches('_').chars().take(MAX_FILENAME_LEN).collect();
    if trimmed.is_empty() {
        format!("{DEFAULT_FILENAME}.txt")
    } else {
        format!("{trimmed}.txt")
    }
}

/// One entry per test whose console log is non-blank, in run order.
pub fn build_failure_log_entries(summary: &RunSummary) -> Vec<LogEntry> {
    summary
        .tests
        .iter()
        .filter_map(|test| {
            let content = test.console_logs.as_deref().map(str::trim)?;
            if content.is_empty() {
                return None;
            }
            let display_name = test.display_name();
            Some(LogEntry {
                title: format!("{} > {}", test.suite_name, display_name),
                filename: make_filename(&display_name),
                content: content.to_string(),
            })
        })
        .collect()
}
