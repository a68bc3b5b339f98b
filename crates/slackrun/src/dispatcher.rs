//! Posting run summaries to Slack channels and collecting per-channel
//! outcomes.
//!
//! Every channel and every chunk is sent strictly one after another. A
//! failed request is turned into a [`ChannelResult`] (or an observer event
//! for threaded replies) and never stops the remaining channels.

use std::sync::Arc;

use anyhow::bail;
use serde::Serialize;
use thiserror::Error;

use crate::blocks::{chunk_blocks, Block, MAX_BLOCKS_PER_MESSAGE};
use crate::layout::{build_layout, generate_failures, generate_fallback_text, AsyncLayout, SyncLayout};
use crate::logs::build_failure_log_entries;
use crate::observer::{DispatchEvent, DispatchObserver, TracingObserver};
use crate::summary::RunSummary;
use crate::transport::{FileUpload, MessageTransport, PostMessageRequest, UploadFilesRequest};

pub const DEFAULT_MAX_NUMBER_OF_FAILURES: usize = 10;
pub const CONSOLE_LOG_BATCH_SIZE: usize = 5;

const SUCCESS_GLYPH: &str = "✅";

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Channel ids [{0}] is not valid")]
    InvalidChannels(String),
}

/// Outcome of one logical message for one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelResult {
    pub channel: String,
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ts: Option<String>,
}

impl ChannelResult {
    fn success(channel: &str, outcome: String, ts: Option<String>) -> Self {
        Self {
            channel: channel.to_string(),
            outcome,
            ts,
        }
    }

    fn failure(channel: &str, outcome: String) -> Self {
        Self {
            channel: channel.to_string(),
            outcome,
            ts: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.starts_with(SUCCESS_GLYPH)
    }
}

#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub channel_ids: Vec<String>,
    pub summary: RunSummary,
    pub disable_unfurl: bool,
    pub show_in_thread: bool,
    pub max_number_of_failures: usize,
    pub custom_layout: Option<SyncLayout>,
    pub custom_layout_async: Option<AsyncLayout>,
    /// Custom-layout blocks from this index on are posted as replies in the
    /// root message's thread.
    pub send_custom_blocks_in_thread_after_index: Option<usize>,
}

impl DispatchOptions {
    pub fn new(channel_ids: Vec<String>, summary: RunSummary) -> Self {
        Self {
            channel_ids,
            summary,
            disable_unfurl: false,
            show_in_thread: false,
            max_number_of_failures: DEFAULT_MAX_NUMBER_OF_FAILURES,
            custom_layout: None,
            custom_layout_async: None,
            send_custom_blocks_in_thread_after_index: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AttachDetailsOptions {
    pub channel_ids: Vec<String>,
    pub thread_ts: String,
    pub summary: RunSummary,
    pub max_number_of_failures: usize,
    pub disable_unfurl: bool,
}

#[derive(Debug, Clone)]
pub struct ConsoleLogOptions {
    pub channel_ids: Vec<String>,
    pub summary: RunSummary,
    /// Carried for parity with the other operations; every test with
    /// console output gets a log file regardless.
    pub max_number_of_failures: usize,
    pub thread_ts: Option<String>,
}

pub struct Dispatcher {
    transport: Arc<dyn MessageTransport>,
    observer: Arc<dyn DispatchObserver>,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn MessageTransport>) -> Self {
        Self {
            transport,
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn DispatchObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Post the run summary to every channel, then any thread follow-ups
    /// under each root message that was accepted.
    ///
    /// Returns exactly one result per requested channel. The only error is
    /// an empty channel list, detected before anything is rendered or sent.
    pub async fn send_message(
        &self,
        options: &DispatchOptions,
    ) -> Result<Vec<ChannelResult>, DispatchError> {
        if options.channel_ids.is_empty() {
            return Err(DispatchError::InvalidChannels(options.channel_ids.join(",")));
        }

        let plan = build_layout(options).await;
        let text = generate_fallback_text(&options.summary);
        let unfurl = !options.disable_unfurl;

        // Root blocks past the per-message limit follow in the thread.
        let (root, overflow) = plan.root.split_at(plan.root.len().min(MAX_BLOCKS_PER_MESSAGE));
        let follow_ups: Vec<Block> = overflow.iter().chain(plan.thread.iter()).cloned().collect();

        let mut results = Vec::with_capacity(options.channel_ids.len());
        for channel in &options.channel_ids {
            let request = PostMessageRequest {
                channel: channel.clone(),
                text: text.clone(),
                blocks: root.to_vec(),
                unfurl_links: unfurl,
                thread_ts: None,
            };
            let result = match self.transport.post_message(&request).await {
                Ok(response) if response.ok => {
                    self.observer.notify(&DispatchEvent::MessageSent { channel });
                    ChannelResult::success(
                        response.channel.as_deref().unwrap_or(channel),
                        format!("{SUCCESS_GLYPH} Message sent to {channel}"),
                        response.ts,
                    )
                }
                Ok(response) => {
                    let detail = response.to_pretty_json();
                    self.observer.notify(&DispatchEvent::MessageNotSent {
                        channel,
                        reason: &detail,
                    });
                    ChannelResult::failure(channel, format!("❌ Message not sent to {channel} \r\n {detail}"))
                }
                Err(err) => {
                    let detail = format!("{err:#}");
                    self.observer.notify(&DispatchEvent::MessageNotSent {
                        channel,
                        reason: &detail,
                    });
                    ChannelResult::failure(channel, format!("❌ Message not sent to {channel} \r\n {detail}"))
                }
            };
            results.push(result);
        }

        if !follow_ups.is_empty() {
            let chunks = chunk_blocks(&follow_ups, MAX_BLOCKS_PER_MESSAGE);
            for result in &results {
                let Some(ts) = result.ts.as_deref() else {
                    continue;
                };
                match self
                    .post_thread_replies(&result.channel, &text, &chunks, unfurl, ts)
                    .await
                {
                    Ok(()) => self.observer.notify(&DispatchEvent::ThreadRepliesSent {
                        channel: &result.channel,
                        messages: chunks.len(),
                    }),
                    Err(err) => self.observer.notify(&DispatchEvent::ThreadRepliesFailed {
                        channel: &result.channel,
                        reason: &format!("{err:#}"),
                    }),
                }
            }
        }

        Ok(results)
    }

    async fn post_thread_replies(
        &self,
        channel: &str,
        text: &str,
        chunks: &[Vec<Block>],
        unfurl: bool,
        thread_ts: &str,
    ) -> anyhow::Result<()> {
        for chunk in chunks {
            let request = PostMessageRequest {
                channel: channel.to_string(),
                text: text.to_string(),
                blocks: chunk.clone(),
                unfurl_links: unfurl,
                thread_ts: Some(thread_ts.to_string()),
            };
            let response = self.transport.post_message(&request).await?;
            if !response.ok {
                bail!("Slack rejected threaded reply: {}", response.to_pretty_json());
            }
        }
        Ok(())
    }

    /// Post the failure breakdown into an existing thread.
    ///
    /// Each channel ends up with at most one result: the outcome of the
    /// last chunk that got an answer, or the transport error that stopped
    /// the channel's sequence.
    pub async fn attach_details_to_thread(&self, options: &AttachDetailsOptions) -> Vec<ChannelResult> {
        let blocks = generate_failures(&options.summary, options.max_number_of_failures);
        if blocks.is_empty() {
            return Vec::new();
        }

        let text = generate_fallback_text(&options.summary);
        let chunks = chunk_blocks(&blocks, MAX_BLOCKS_PER_MESSAGE);
        let thread_ts = options.thread_ts.as_str();
        let mut results = Vec::new();

        for channel in &options.channel_ids {
            let mut latest: Option<ChannelResult> = None;
            let mut failure: Option<String> = None;
            for chunk in &chunks {
                let request = PostMessageRequest {
                    channel: channel.clone(),
                    text: text.clone(),
                    blocks: chunk.clone(),
                    unfurl_links: !options.disable_unfurl,
                    thread_ts: Some(options.thread_ts.clone()),
                };
                match self.transport.post_message(&request).await {
                    Ok(response) if response.ok => {
                        latest = Some(ChannelResult::success(
                            channel,
                            format!("{SUCCESS_GLYPH} Message sent to {channel} within thread {thread_ts}"),
                            response.ts,
                        ));
                    }
                    Ok(response) => {
                        let detail = response.to_pretty_json();
                        latest = Some(ChannelResult::failure(
                            channel,
                            format!("❌ Failed to send failure details to {channel} within thread {thread_ts}: {detail}"),
                        ));
                        failure = Some(detail);
                    }
                    Err(err) => {
                        let detail = format!("{err:#}");
                        latest = Some(ChannelResult::failure(
                            channel,
                            format!("❌ Failed to send failure details to {channel} within thread {thread_ts}: {detail}"),
                        ));
                        failure = Some(detail);
                        break;
                    }
                }
            }

            match &failure {
                None => self.observer.notify(&DispatchEvent::DetailsSent {
                    channel,
                    thread_ts,
                    messages: chunks.len(),
                }),
                Some(reason) => self.observer.notify(&DispatchEvent::DetailsFailed {
                    channel,
                    thread_ts,
                    reason,
                }),
            }
            results.extend(latest);
        }

        results
    }

    /// Upload captured console output as files, five per upload.
    ///
    /// Unlike [`Dispatcher::attach_details_to_thread`], every upload gets
    /// its own result, so a channel may appear several times.
    pub async fn send_failure_console_logs(&self, options: &ConsoleLogOptions) -> Vec<ChannelResult> {
        let entries = build_failure_log_entries(&options.summary);
        if entries.is_empty() {
            return Vec::new();
        }

        let batches: Vec<_> = entries.chunks(CONSOLE_LOG_BATCH_SIZE).collect();
        let mut results = Vec::new();

        for channel in &options.channel_ids {
            for (index, batch) in batches.iter().enumerate() {
                let batch_number = index + 1;
                let request = UploadFilesRequest {
                    channel_id: channel.clone(),
                    thread_ts: options.thread_ts.clone(),
                    initial_comment: format!("Console logs ({}/{})", batch_number, batches.len()),
                    file_uploads: batch
                        .iter()
                        .map(|entry| FileUpload {
                            content: entry.content.clone(),
                            filename: entry.filename.clone(),
                            title: entry.title.clone(),
                        })
                        .collect(),
                };

                let failure = match self.transport.upload_files(&request).await {
                    Ok(response) if response.ok => {
                        let outcome = match &options.thread_ts {
                            Some(ts) => format!("{SUCCESS_GLYPH} Console logs sent to {channel} within thread {ts}"),
                            None => format!("{SUCCESS_GLYPH} Console logs sent to {channel}"),
                        };
                        results.push(ChannelResult::success(channel, outcome, None));
                        self.observer.notify(&DispatchEvent::ConsoleLogsSent {
                            channel,
                            batch: batch_number,
                            batches: batches.len(),
                        });
                        continue;
                    }
                    Ok(response) => response.to_pretty_json(),
                    Err(err) => format!("{err:#}"),
                };
                results.push(ChannelResult::failure(
                    channel,
                    format!("❌ Failed to send console logs to {channel}: {failure}"),
                ));
                self.observer.notify(&DispatchEvent::ConsoleLogsFailed {
                    channel,
                    batch: batch_number,
                    batches: batches.len(),
                    reason: &failure,
                });
            }
        }

        results
    }
}
