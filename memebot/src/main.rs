//! memebot command-line front end
//!
//! Loads configuration, builds the serialized Ollama queue and runs one
//! command against it. Ctrl-C rejects whatever is still waiting and lets the
//! in-flight request finish.

use std::path::Path;

use anyhow::Context;
use clap::Parser;
use futures::stream::{FuturesUnordered, StreamExt};
use memebot_dispatch::QueuePosition;
use memebot_llm::{ChatMessage, ChatOptions, GenerateOptions, OllamaQueue};
use serde_json::json;

mod cli;
mod config_helpers;
mod tracing_setup;

use cli::{Cli, Command};
use config_helpers::{parse_batch, queue_options_from_config};
use tracing_setup::install_tracing_from_config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config_path.as_deref())?;
    install_tracing_from_config(&config.logging);
    tracing::debug!(config_path = ?cli.config_path, "configuration loaded");

    let queue = OllamaQueue::new(queue_options_from_config(&config))
        .context("failed to set up the ollama queue")?;

    let interrupt = tokio::spawn(shutdown_on_ctrl_c(queue.clone()));

    let result = run(cli.command, &queue, cli.json).await;

    queue.wait_idle().await;
    queue.shutdown();
    interrupt.abort();

    let stats = queue.stats();
    tracing::info!(
        submitted = stats.submitted,
        succeeded = stats.succeeded,
        failed = stats.failed,
        rejected = stats.rejected,
        "done"
    );
    result
}

/// Load and validate configuration from file (if any) and environment.
fn load_config(path: Option<&Path>) -> anyhow::Result<memebot_config::Config> {
    let config = memebot_config::load_config(path).context("failed to load configuration")?;
    memebot_config::validate_config(&config).context("invalid configuration")?;
    Ok(config)
}

async fn shutdown_on_ctrl_c(queue: OllamaQueue) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            let rejected = queue.shutdown();
            tracing::warn!(rejected, "interrupted; waiting for the in-flight request");
        }
        Err(error) => tracing::error!(%error, "failed to listen for ctrl-c"),
    }
}

async fn run(command: Command, queue: &OllamaQueue, json_output: bool) -> anyhow::Result<()> {
    match command {
        Command::Generate {
            prompt,
            system,
            priority,
        } => {
            let mut options = GenerateOptions::new(prompt)
                .with_priority(priority)
                .on_position(log_position(None));
            if let Some(system) = system {
                options = options.with_system(system);
            }
            let response = queue.generate(options).await.context("generate failed")?;
            if json_output {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                println!("{}", response.response);
            }
        }
        Command::Chat {
            message,
            system,
            priority,
        } => {
            let mut messages = Vec::with_capacity(2);
            if let Some(system) = system {
                messages.push(ChatMessage::system(system));
            }
            messages.push(ChatMessage::user(message));

            let options = ChatOptions::new(messages)
                .with_priority(priority)
                .on_position(log_position(None));
            let response = queue.chat(options).await.context("chat failed")?;
            if json_output {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                println!("{}", response.message.content);
            }
        }
        Command::Batch {
            file,
            system,
            priority_prefix,
        } => {
            let contents = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            run_batch(queue, &contents, system, priority_prefix, json_output).await?;
        }
    }
    Ok(())
}

/// Submit every line up front, then report results in the order they settle.
async fn run_batch(
    queue: &OllamaQueue,
    contents: &str,
    system: Option<String>,
    priority_prefix: bool,
    json_output: bool,
) -> anyhow::Result<()> {
    let items = parse_batch(contents, priority_prefix);
    if items.is_empty() {
        tracing::warn!("batch file has no prompts");
        return Ok(());
    }

    let total = items.len();
    let mut pending = FuturesUnordered::new();
    for item in items {
        let mut options = GenerateOptions::new(item.prompt)
            .with_priority(item.priority)
            .on_position(log_position(Some(item.line)));
        if let Some(system) = &system {
            options = options.with_system(system.clone());
        }
        let submission = queue.submit_generate(options);
        let line = item.line;
        pending.push(async move { (line, submission.await) });
    }
    tracing::info!(total, queued = queue.queue_length(), "batch submitted");

    let mut failed = 0usize;
    while let Some((line, result)) = pending.next().await {
        match result {
            Ok(response) if json_output => println!(
                "{}",
                json!({
                    "line": line,
                    "response": response.response,
                    "done_reason": response.done_reason,
                })
            ),
            Ok(response) => println!("[{line}] {}", response.response),
            Err(error) => {
                failed += 1;
                tracing::warn!(line, %error, "batch prompt failed");
                if json_output {
                    println!("{}", json!({ "line": line, "error": error.to_string() }));
                } else {
                    println!("[{line}] error: {error}");
                }
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {total} batch prompts failed");
    }
    Ok(())
}

/// Position callback that logs where a request stands in the queue.
fn log_position(line: Option<usize>) -> impl Fn(QueuePosition) + Send + Sync + 'static {
    move |p: QueuePosition| {
        tracing::info!(
            line = ?line,
            position = p.position,
            total = p.total,
            "waiting in queue"
        );
    }
}
