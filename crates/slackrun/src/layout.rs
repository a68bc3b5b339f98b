//! Block Kit layouts for a run summary, and the registry through which
//! custom layouts are made available by name.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use serde_json::json;

use crate::blocks::Block;
use crate::dispatcher::DispatchOptions;
use crate::summary::RunSummary;

const MAX_FAILURE_REASON_CHARS: usize = 650;
const MAX_CONTEXT_ELEMENTS: usize = 10;

type SyncLayoutFn = dyn Fn(&RunSummary, usize) -> Vec<Block> + Send + Sync;
type AsyncLayoutFn = dyn for<'a> Fn(&'a RunSummary, usize) -> BoxFuture<'a, Vec<Block>> + Send + Sync;

/// A layout computed in place from `(summary, max_failures)`.
#[derive(Clone)]
pub struct SyncLayout(Arc<SyncLayoutFn>);

impl SyncLayout {
    pub fn new<F>(layout: F) -> Self
    where
        F: Fn(&RunSummary, usize) -> Vec<Block> + Send + Sync + 'static,
    {
        Self(Arc::new(layout))
    }

    pub fn render(&self, summary: &RunSummary, max_failures: usize) -> Vec<Block> {
        (self.0)(summary, max_failures)
    }
}

impl fmt::Debug for SyncLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SyncLayout(..)")
    }
}

/// A layout that has to await something (a lookup, a template fetch) first.
#[derive(Clone)]
pub struct AsyncLayout(Arc<AsyncLayoutFn>);

impl AsyncLayout {
    pub fn new<F>(layout: F) -> Self
    where
        F: for<'a> Fn(&'a RunSummary, usize) -> BoxFuture<'a, Vec<Block>> + Send + Sync + 'static,
    {
        Self(Arc::new(layout))
    }

    pub async fn render(&self, summary: &RunSummary, max_failures: usize) -> Vec<Block> {
        (self.0)(summary, max_failures).await
    }
}

impl fmt::Debug for AsyncLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AsyncLayout(..)")
    }
}

/// Blocks for the root message and for follow-up replies in its thread.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayoutPlan {
    pub root: Vec<Block>,
    pub thread: Vec<Block>,
}

/// Produce the blocks for a dispatch.
///
/// A sync custom layout wins over an async one, which wins over the
/// default layout. Only custom layouts are split into root and thread
/// portions; the split index is taken as-is and an index past the end
/// simply leaves the thread empty.
pub async fn build_layout(options: &DispatchOptions) -> LayoutPlan {
    let max_failures = options.max_number_of_failures;
    let custom = if let Some(layout) = &options.custom_layout {
        Some(layout.render(&options.summary, max_failures))
    } else if let Some(layout) = &options.custom_layout_async {
        Some(layout.render(&options.summary, max_failures).await)
    } else {
        None
    };

    match custom {
        Some(mut blocks) => match options
            .send_custom_blocks_in_thread_after_index
            .filter(|index| *index > 0)
        {
            Some(index) => {
                let thread = blocks.split_off(index.min(blocks.len()));
                LayoutPlan { root: blocks, thread }
            }
            None => LayoutPlan {
                root: blocks,
                thread: Vec::new(),
            },
        },
        None if options.show_in_thread => LayoutPlan {
            root: generate_blocks(&options.summary.without_failures(), max_failures),
            thread: Vec::new(),
        },
        None => LayoutPlan {
            root: generate_blocks(&options.summary, max_failures),
            thread: Vec::new(),
        },
    }
}

/// Plain-text fallback shown in notifications and by clients without
/// Block Kit support.
pub fn generate_fallback_text(summary: &RunSummary) -> String {
    let mut parts = vec![
        format!("✅ {}", summary.passed),
        format!("❌ {}", summary.failed),
    ];
    if let Some(flaky) = summary.flaky {
        parts.push(format!("🟡 {flaky}"));
    }
    parts.push(format!("⏩ {}", summary.skipped));
    parts.join(" ")
}

fn summary_section(summary: &RunSummary) -> Block {
    let mut counts = vec![
        format!("✅ *{}* passed", summary.passed),
        format!("❌ *{}* failed", summary.failed),
    ];
    if let Some(flaky) = summary.flaky {
        counts.push(format!("🟡 *{flaky}* flaky"));
    }
    counts.push(format!("⏩ *{}* skipped", summary.skipped));
    json!({
        "type": "section",
        "text": { "type": "mrkdwn", "text": counts.join(" | ") },
    })
}

fn meta_blocks(summary: &RunSummary) -> Vec<Block> {
    summary
        .meta
        .chunks(MAX_CONTEXT_ELEMENTS)
        .map(|entries| {
            let elements: Vec<Block> = entries
                .iter()
                .map(|entry| {
                    json!({ "type": "mrkdwn", "text": format!("*{}*: {}", entry.key, entry.value) })
                })
                .collect();
            json!({ "type": "context", "elements": elements })
        })
        .collect()
}

/// The default layout: run counts, metadata, then the failure breakdown.
pub fn generate_blocks(summary: &RunSummary, max_failures: usize) -> Vec<Block> {
    let mut blocks = vec![summary_section(summary)];
    blocks.extend(meta_blocks(summary));
    blocks.extend(generate_failures(summary, max_failures));
    blocks
}

/// Only the failure breakdown; empty when nothing failed.
pub fn generate_failures(summary: &RunSummary, max_failures: usize) -> Vec<Block> {
    if summary.failures.is_empty() {
        return Vec::new();
    }

    let shown = summary.failures.len().min(max_failures);
    let mut blocks = vec![json!({ "type": "divider" })];
    for failure in &summary.failures[..shown] {
        let reason: String = failure
            .failure_reason
            .chars()
            .take(MAX_FAILURE_REASON_CHARS)
            .collect();
        let quoted = reason
            .lines()
            .map(|line| format!(">{line}"))
            .collect::<Vec<_>>()
            .join("\n");
        blocks.push(json!({
            "type": "section",
            "text": {
                "type": "mrkdwn",
                "text": format!("*{} > {}*\n{}", failure.suite, failure.test, quoted),
            },
        }));
    }
    if summary.failures.len() > shown {
        blocks.push(json!({
            "type": "section",
            "text": {
                "type": "mrkdwn",
                "text": format!(
                    "*⚠️ There are too many failures to display - {} out of {} failures shown*",
                    shown,
                    summary.failures.len()
                ),
            },
        }));
    }
    blocks
}

/// Counts only, without metadata or failures.
pub fn generate_compact_blocks(summary: &RunSummary, _max_failures: usize) -> Vec<Block> {
    vec![summary_section(summary)]
}

/// Named layouts registered at startup; configuration refers to them by
/// name instead of pointing at code to load.
#[derive(Debug, Clone, Default)]
pub struct LayoutRegistry {
    sync_layouts: HashMap<String, SyncLayout>,
    async_layouts: HashMap<String, AsyncLayout>,
}

impl LayoutRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the `default` and `compact` layouts.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_sync("default", generate_blocks);
        registry.register_sync("compact", generate_compact_blocks);
        registry
    }

    pub fn register_sync<F>(&mut self, name: impl Into<String>, layout: F) -> &mut Self
    where
        F: Fn(&RunSummary, usize) -> Vec<Block> + Send + Sync + 'static,
    {
        self.sync_layouts.insert(name.into(), SyncLayout::new(layout));
        self
    }

    pub fn register_async<F>(&mut self, name: impl Into<String>, layout: F) -> &mut Self
    where
        F: for<'a> Fn(&'a RunSummary, usize) -> BoxFuture<'a, Vec<Block>> + Send + Sync + 'static,
    {
        self.async_layouts.insert(name.into(), AsyncLayout::new(layout));
        self
    }

    pub fn resolve_sync(&self, name: &str) -> Result<SyncLayout> {
        self.sync_layouts
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow!("Layout '{}' is not registered (known: {})", name, self.known_names(false)))
    }

    pub fn resolve_async(&self, name: &str) -> Result<AsyncLayout> {
        self.async_layouts
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow!("Async layout '{}' is not registered (known: {})", name, self.known_names(true)))
    }

    fn known_names(&self, async_layouts: bool) -> String {
        let mut names: Vec<&str> = if async_layouts {
            self.async_layouts.keys().map(String::as_str).collect()
        } else {
            self.sync_layouts.keys().map(String::as_str).collect()
        };
        if names.is_empty() {
            return "none".to_string();
        }
        names.sort_unstable();
        names.join(", ")
    }
}
