use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Outcome of a finished test run, as handed over by the test reporter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub passed: u64,
    pub failed: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flaky: Option<u64>,
    pub skipped: u64,
    #[serde(default)]
    pub failures: Vec<FailureDetail>,
    #[serde(default)]
    pub tests: Vec<TestRecord>,
    #[serde(default)]
    pub meta: Vec<MetaEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureDetail {
    pub suite: String,
    pub test: String,
    pub failure_reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaEntry {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TestStatus {
    Passed,
    Failed,
    TimedOut,
    Skipped,
    Interrupted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRecord {
    pub name: String,
    pub suite_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub console_logs: Option<String>,
    pub status: TestStatus,
    #[serde(default)]
    pub retry: u32,
}

impl RunSummary {
    /// Read a JSON run summary from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Reading run summary {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Parsing run summary {}", path.display()))
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0 || !self.failures.is_empty()
    }

    /// Copy of this summary with the failure breakdown removed, used when
    /// failures are posted into the thread instead of the root message.
    pub fn without_failures(&self) -> Self {
        Self {
            failures: Vec::new(),
            ..self.clone()
        }
    }
}

impl TestRecord {
    /// Test name decorated with the browser/project it ran under.
    pub fn display_name(&self) -> String {
        let browser = self.browser.as_deref().filter(|b| !b.is_empty());
        let project = self.project_name.as_deref().filter(|p| !p.is_empty());
        match (browser, project) {
            (Some(browser), Some(project)) if browser == project => {
                format!("{} [{}]", self.name, browser)
            }
            (Some(browser), Some(project)) => {
                format!("{} [Project Name: {}] using {}", self.name, project, browser)
            }
            _ => self.name.clone(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn test_record(name: &str) -> TestRecord {
        TestRecord {
            name: name.to_string(),
            suite_name: "checkout".to_string(),
            browser: None,
            project_name: None,
            console_logs: None,
            status: TestStatus::Passed,
            retry: 0,
        }
    }

    pub(crate) fn failing_summary(count: usize) -> RunSummary {
        RunSummary {
            passed: 3,
            failed: count as u64,
            flaky: None,
            skipped: 1,
            failures: (0..count)
                .map(|i| FailureDetail {
                    suite: "checkout".to_string(),
                    test: format!("case {i}"),
                    failure_reason: format!("expected 200\nreceived {}", 500 + i),
                })
                .collect(),
            tests: Vec::new(),
            meta: Vec::new(),
        }
    }

    #[test]
    fn display_name_with_matching_browser_and_project() {
        let mut t = test_record("T");
        t.browser = Some("chrome".into());
        t.project_name = Some("chrome".into());
        assert_eq!(t.display_name(), "T [chrome]");
    }

    #[test]
    fn display_name_with_distinct_project() {
        let mut t = test_record("T");
        t.browser = Some("chrome".into());
        t.project_name = Some("proj".into());
        assert_eq!(t.display_name(), "T [Project Name: proj] using chrome");
    }

    #[test]
    fn display_name_without_browser_info() {
        assert_eq!(test_record("T").display_name(), "T");

        let mut only_browser = test_record("T");
        only_browser.browser = Some("firefox".into());
        only_browser.project_name = Some(String::new());
        assert_eq!(only_browser.display_name(), "T");
    }

    #[test]
    fn parses_camel_case_summary() {
        let raw = r#"{
            "passed": 1,
            "failed": 1,
            "flaky": 0,
            "skipped": 0,
            "failures": [{"suite": "s", "test": "t", "failureReason": "boom"}],
            "tests": [{
                "name": "t",
                "suiteName": "s",
                "browser": "webkit",
                "projectName": "mobile",
                "consoleLogs": "log line",
                "status": "timedOut"
            }]
        }"#;
        let summary: RunSummary = serde_json::from_str(raw).unwrap();
        assert_eq!(summary.failures[0].failure_reason, "boom");
        assert_eq!(summary.tests[0].status, TestStatus::TimedOut);
        assert_eq!(summary.tests[0].retry, 0);
        assert!(summary.meta.is_empty());
        assert!(summary.has_failures());
        assert!(summary.without_failures().failures.is_empty());
    }
}
