//! Incoming-webhook delivery. Webhooks cannot thread, so only the root
//! portion of the layout is sent, one message per chunk.

use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::json;

use crate::blocks::{chunk_blocks, MAX_BLOCKS_PER_MESSAGE};
use crate::dispatcher::{ChannelResult, DispatchOptions};
use crate::layout::{build_layout, generate_fallback_text};

pub const WEBHOOK_CHANNEL: &str = "webhook";

pub fn webhook_client(proxy: Option<&str>, request_timeout_ms: u64) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().timeout(Duration::from_millis(request_timeout_ms.max(1)));
    if let Some(proxy) = proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy).with_context(|| format!("Invalid proxy URL {proxy}"))?);
    }
    builder.build().context("Creating webhook HTTP client")
}

pub async fn post_webhook(
    client: &reqwest::Client,
    webhook_url: &str,
    payload: &serde_json::Value,
) -> Result<()> {
    client
        .post(webhook_url)
        .json(payload)
        .send()
        .await
        .with_context(|| "Sending Slack webhook")?
        .error_for_status()
        .with_context(|| "Slack webhook error")?;
    Ok(())
}

/// Render the layout and post it through the webhook. Produces a single
/// result describing the whole delivery.
pub async fn send_webhook(
    client: &reqwest::Client,
    webhook_url: &str,
    options: &DispatchOptions,
) -> ChannelResult {
    let plan = build_layout(options).await;
    let text = generate_fallback_text(&options.summary);
    if !plan.thread.is_empty() {
        tracing::warn!(
            dropped = plan.thread.len(),
            "Webhooks cannot post into a thread, blocks after the split index were not sent"
        );
    }
    let chunks = chunk_blocks(&plan.root, MAX_BLOCKS_PER_MESSAGE);
    let messages = chunks.len().max(1);

    let mut delivery = Ok(());
    if chunks.is_empty() {
        delivery = post_webhook(client, webhook_url, &json!({ "text": text })).await;
    }
    for chunk in &chunks {
        let payload = json!({
            "text": text,
            "blocks": chunk,
            "unfurl_links": !options.disable_unfurl,
        });
        delivery = post_webhook(client, webhook_url, &payload).await;
        if delivery.is_err() {
            break;
        }
    }

    match delivery {
        Ok(()) => {
            tracing::info!(messages, "✅ Message sent via webhook");
            ChannelResult {
                channel: WEBHOOK_CHANNEL.to_string(),
                outcome: "✅ Message sent via webhook".to_string(),
                ts: None,
            }
        }
        Err(err) => {
            tracing::warn!("❌ Message not sent via webhook: {err:#}");
            ChannelResult {
                channel: WEBHOOK_CHANNEL.to_string(),
                outcome: format!("❌ Message not sent via webhook \r\n {err:#}"),
                ts: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::Block;
    use crate::layout::SyncLayout;
    use crate::summary::tests::failing_summary;
    use crate::summary::RunSummary;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn webhook_receives_rendered_blocks() {
        let server = MockServer::start();
        let hook = server.mock(|when, then| {
            when.method(POST)
                .path("/services/T/B/X")
                .json_body_includes(r#"{"text": "✅ 3 ❌ 1 ⏩ 1", "unfurl_links": true}"#);
            then.status(200).body("ok");
        });

        let client = webhook_client(None, 2_000).unwrap();
        let options = DispatchOptions::new(Vec::new(), failing_summary(1));
        let result = send_webhook(&client, &server.url("/services/T/B/X"), &options).await;

        hook.assert();
        assert!(result.is_success());
        assert_eq!(result.channel, WEBHOOK_CHANNEL);
    }

    fn numbered_blocks(_summary: &RunSummary, _max: usize) -> Vec<Block> {
        (0..60)
            .map(|i| json!({ "type": "section", "text": { "type": "mrkdwn", "text": format!("block {i}") } }))
            .collect()
    }

    #[tokio::test]
    async fn webhook_sends_root_portion_only() {
        let server = MockServer::start();
        let hook = server.mock(|when, then| {
            when.method(POST).path("/hook");
            then.status(200).body("ok");
        });

        let client = webhook_client(None, 2_000).unwrap();
        let mut options = DispatchOptions::new(Vec::new(), failing_summary(1));
        options.custom_layout = Some(SyncLayout::new(numbered_blocks));
        options.send_custom_blocks_in_thread_after_index = Some(10);
        let result = send_webhook(&client, &server.url("/hook"), &options).await;

        assert!(result.is_success());
        assert_eq!(hook.calls(), 1);
    }

    #[tokio::test]
    async fn webhook_chunks_oversized_root() {
        let server = MockServer::start();
        let hook = server.mock(|when, then| {
            when.method(POST).path("/hook");
            then.status(200).body("ok");
        });

        let client = webhook_client(None, 2_000).unwrap();
        let mut options = DispatchOptions::new(Vec::new(), failing_summary(1));
        options.custom_layout = Some(SyncLayout::new(numbered_blocks));
        let result = send_webhook(&client, &server.url("/hook"), &options).await;

        assert!(result.is_success());
        assert_eq!(hook.calls(), 2);
    }

    #[tokio::test]
    async fn webhook_error_status_becomes_failure_outcome() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/hook");
            then.status(404).body("no_service");
        });

        let client = webhook_client(None, 2_000).unwrap();
        let options = DispatchOptions::new(Vec::new(), failing_summary(0));
        let result = send_webhook(&client, &server.url("/hook"), &options).await;

        assert!(!result.is_success());
        assert!(result.outcome.contains("404"), "{}", result.outcome);
    }
}
