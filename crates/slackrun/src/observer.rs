/// Things worth reporting while a dispatch runs. Outcomes already returned
/// as `ChannelResult`s are repeated here so they can be logged as they
/// happen; threaded-reply failures are only reported here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchEvent<'a> {
    MessageSent {
        channel: &'a str,
    },
    MessageNotSent {
        channel: &'a str,
        reason: &'a str,
    },
    ThreadRepliesSent {
        channel: &'a str,
        messages: usize,
    },
    ThreadRepliesFailed {
        channel: &'a str,
        reason: &'a str,
    },
    DetailsSent {
        channel: &'a str,
        thread_ts: &'a str,
        messages: usize,
    },
    DetailsFailed {
        channel: &'a str,
        thread_ts: &'a str,
        reason: &'a str,
    },
    ConsoleLogsSent {
        channel: &'a str,
        batch: usize,
        batches: usize,
    },
    ConsoleLogsFailed {
        channel: &'a str,
        batch: usize,
        batches: usize,
        reason: &'a str,
    },
}

pub trait DispatchObserver: Send + Sync {
    fn notify(&self, event: &DispatchEvent<'_>);
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

/// Default observer: one `tracing` event per dispatch event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl DispatchObserver for TracingObserver {
    fn notify(&self, event: &DispatchEvent<'_>) {
        match *event {
            DispatchEvent::MessageSent { channel } => {
                tracing::info!(channel, "✅ Message sent to {channel}");
            }
            DispatchEvent::MessageNotSent { channel, reason } => {
                tracing::warn!(channel, "❌ Message not sent to {channel}: {reason}");
            }
            DispatchEvent::ThreadRepliesSent { channel, messages } => {
                tracing::info!(
                    channel,
                    messages,
                    "✅ Threaded messages sent to {channel} ({messages} message{})",
                    plural(messages)
                );
            }
            DispatchEvent::ThreadRepliesFailed { channel, reason } => {
                tracing::error!(channel, "❌ Failed to send threaded message to {channel}: {reason}");
            }
            DispatchEvent::DetailsSent {
                channel,
                thread_ts,
                messages,
            } => {
                tracing::info!(
                    channel,
                    thread_ts,
                    "✅ All failure details sent to {channel} within thread {thread_ts} ({messages} message{})",
                    plural(messages)
                );
            }
            DispatchEvent::DetailsFailed {
                channel,
                thread_ts,
                reason,
            } => {
                tracing::error!(
                    channel,
                    thread_ts,
                    "❌ Failed to send failure details to {channel} within thread {thread_ts}: {reason}"
                );
            }
            DispatchEvent::ConsoleLogsSent {
                channel,
                batch,
                batches,
            } => {
                tracing::info!(channel, "✅ Console logs ({batch}/{batches}) sent to {channel}");
            }
            DispatchEvent::ConsoleLogsFailed {
                channel,
                batch,
                batches,
                reason,
            } => {
                tracing::warn!(
                    channel,
                    "❌ Failed to send console logs ({batch}/{batches}) to {channel}: {reason}"
                );
            }
        }
    }
}
