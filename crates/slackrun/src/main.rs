use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use owo_colors::OwoColorize;
use tokio::runtime::Runtime;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use slackrun::cli::{Cli, Commands};
use slackrun::config::{Config, LogLevel, SendResults, BOT_TOKEN_ENV};
use slackrun::dispatcher::{AttachDetailsOptions, ConsoleLogOptions};
use slackrun::layout::LayoutRegistry;
use slackrun::sink::{send_webhook, webhook_client};
use slackrun::summary::RunSummary;
use slackrun::{ChannelResult, DispatchOptions, Dispatcher, SlackWebTransport};

use tabled::settings::{object::Rows, Padding, Modify, Style};
use tabled::{Table, Tabled};

fn init_tracing(level: LogLevel) {
    let default_level = level.as_str().parse::<LevelFilter>().unwrap_or(LevelFilter::INFO);
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn dispatch_options(
    config: &Config,
    registry: &LayoutRegistry,
    summary: RunSummary,
) -> anyhow::Result<DispatchOptions> {
    let channel_ids = config
        .send_using_bot
        .as_ref()
        .map(|bot| {
            bot.channels
                .iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let mut options = DispatchOptions::new(channel_ids, summary);
    options.disable_unfurl = config.disable_unfurl;
    options.show_in_thread = config.show_in_thread;
    options.max_number_of_failures = config.max_number_of_failures;
    options.send_custom_blocks_in_thread_after_index = config.send_custom_blocks_in_thread_after_index;
    options.custom_layout = config
        .custom_layout
        .as_deref()
        .map(|name| registry.resolve_sync(name))
        .transpose()?;
    options.custom_layout_async = config
        .custom_layout_async
        .as_deref()
        .map(|name| registry.resolve_async(name))
        .transpose()?;
    Ok(options)
}

async fn deliver(config: &Config, options: &DispatchOptions) -> anyhow::Result<Vec<ChannelResult>> {
    if let Some(hook) = &config.send_using_webhook {
        let client = webhook_client(config.proxy.as_deref(), config.request_timeout_ms)?;
        return Ok(vec![send_webhook(&client, &hook.webhook_url, options).await]);
    }

    let token = std::env::var(BOT_TOKEN_ENV)
        .with_context(|| format!("{BOT_TOKEN_ENV} must be set to send using a bot"))?;
    let transport = SlackWebTransport::new(
        &config.api_base,
        &token,
        config.proxy.as_deref(),
        config.request_timeout_ms,
    )?;
    let dispatcher = Dispatcher::new(Arc::new(transport));

    let mut results = dispatcher.send_message(options).await?;

    let roots: Vec<(String, String)> = results
        .iter()
        .filter_map(|r| r.ts.clone().map(|ts| (r.channel.clone(), ts)))
        .collect();
    for (channel, ts) in roots {
        if config.show_in_thread {
            let details = AttachDetailsOptions {
                channel_ids: vec![channel.clone()],
                thread_ts: ts.clone(),
                summary: options.summary.clone(),
                max_number_of_failures: options.max_number_of_failures,
                disable_unfurl: options.disable_unfurl,
            };
            results.extend(dispatcher.attach_details_to_thread(&details).await);
        }
        if config.upload_console_logs {
            let logs = ConsoleLogOptions {
                channel_ids: vec![channel],
                summary: options.summary.clone(),
                max_number_of_failures: options.max_number_of_failures,
                thread_ts: Some(ts),
            };
            results.extend(dispatcher.send_failure_console_logs(&logs).await);
        }
    }

    Ok(results)
}

fn print_results(results: &[ChannelResult], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(results)?);
        return Ok(());
    }

    #[derive(Tabled)]
    struct Row {
        #[tabled(rename = "channel")]
        channel: String,
        #[tabled(rename = "outcome")]
        outcome: String,
        #[tabled(rename = "ts")]
        ts: String,
    }

    let rows: Vec<Row> = results
        .iter()
        .map(|r| Row {
            channel: r.channel.clone(),
            outcome: r.outcome.replace("\r\n", " ").split_whitespace().collect::<Vec<_>>().join(" "),
            ts: r.ts.clone().unwrap_or_default(),
        })
        .collect();

    let mut table = Table::new(rows);
    table
        .with(Style::modern())
        .with(Modify::new(Rows::new(0..)).with(Padding::new(1, 1, 0, 0)));
    println!("{}", table);

    let delivered = results.iter().filter(|r| r.is_success()).count();
    let line = format!("{delivered}/{} deliveries succeeded", results.len());
    if delivered == results.len() {
        println!("{}", line.green());
    } else {
        println!("{}", line.red());
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let rt = Runtime::new()?;
    rt.block_on(async {
        match cli.command {
            Commands::Send { summary, json } => {
                let config = Config::load(cli.config.clone())?;
                init_tracing(config.slack_log_level.raised_by(cli.verbose));

                let mut run = RunSummary::load(&summary)?;
                run.meta.extend(config.meta.iter().cloned());

                if config.send_results == SendResults::OnFailure && !run.has_failures() {
                    tracing::info!("No failures in this run, nothing sent");
                    return Ok(());
                }

                let registry = LayoutRegistry::with_builtins();
                let options = dispatch_options(&config, &registry, run)?;
                let results = deliver(&config, &options).await?;
                print_results(&results, json)?;

                // Exit code: 0 = everything delivered, 1 = at least one failure
                if results.iter().any(|r| !r.is_success()) {
                    std::process::exit(1);
                }
            }
            Commands::Version { json } => {
                if json {
                    let info = serde_json::json!({
                        "version": env!("CARGO_PKG_VERSION"),
                        "commit": option_env!("GIT_SHA").unwrap_or("unknown"),
                        "build_date": option_env!("BUILD_DATE").unwrap_or("unknown"),
                    });
                    println!("{}", serde_json::to_string_pretty(&info)?);
                } else {
                    println!(
                        "slackrun {} (commit: {}, built: {})",
                        env!("CARGO_PKG_VERSION"),
                        option_env!("GIT_SHA").unwrap_or("unknown"),
                        option_env!("BUILD_DATE").unwrap_or("unknown"),
                    );
                }
            }
        }
        Ok(())
    })
}
