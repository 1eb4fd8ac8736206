// ABOUTME: Command implementations for the replybook CLI
// ABOUTME: Handles execution of serve, query, and check commands

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use super::config::Config;
use crate::engine::ReplyEngine;
use crate::registry::Registry;
use crate::transport::{InboundMessage, ReplySink, StdoutSink};

async fn open_engine(
    dir: Option<PathBuf>,
    sink: Arc<dyn ReplySink>,
    config: &Config,
) -> Result<Arc<ReplyEngine>> {
    let registry_config = config.registry_config(dir);
    info!("Loading word lists from {}", registry_config.dir.display());

    let registry = Registry::open(registry_config)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open word list directory: {}", e))?;
    info!("Registered {} word lists", registry.len().await);

    Ok(ReplyEngine::new(registry, sink, config.engine_config()))
}

/// Answer triggers read from stdin until EOF or Ctrl-C
pub async fn serve(
    dir: Option<PathBuf>,
    sender: String,
    group: String,
    show_source: bool,
    config: &Config,
) -> Result<()> {
    let sink = Arc::new(StdoutSink::new().with_source(show_source));
    let engine = open_engine(dir, sink.clone(), config).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupt received, shutting down");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    debug!("Input closed");
                    break;
                };

                let message = InboundMessage::new(line, sender.as_str()).in_group(group.as_str());
                if message.trigger().is_empty() {
                    continue;
                }

                let context = message.into_context();
                for reply in engine.lookup(context.clone()).await {
                    if let Err(e) = sink.deliver(&reply, &context).await {
                        warn!("Failed to write reply: {}", e);
                    }
                }
            }
        }
    }

    engine.shutdown(config.shutdown_grace).await;
    Ok(())
}

/// Look up a single trigger and print the replies
pub async fn query(trigger: String, dir: Option<PathBuf>, json: bool, config: &Config) -> Result<()> {
    let sink = Arc::new(StdoutSink::new());
    let engine = open_engine(dir, sink, config).await?;

    let replies = engine.lookup_trigger(trigger.trim()).await;
    if json {
        let json_content = serde_json::to_string_pretty(&replies)
            .map_err(|e| anyhow::anyhow!("Failed to serialize replies to JSON: {}", e))?;
        println!("{}", json_content);
    } else if replies.is_empty() {
        println!("No reply for '{}'", trigger.trim());
    } else {
        for reply in &replies {
            println!("{}", reply);
        }
    }

    // Let deferred calls queued by the templates finish before exiting.
    engine.shutdown(config.shutdown_grace).await;
    Ok(())
}

/// Load every word list and report entry counts and parse problems
pub async fn check(dir: Option<PathBuf>, json: bool, config: &Config) -> Result<()> {
    let registry_config = config.registry_config(dir);
    let registry = Registry::open(registry_config.clone())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open word list directory: {}", e))?;

    let summaries = registry.sources().await;
    registry.shutdown().await;

    let problems: usize = summaries.iter().map(|s| s.diagnostics.len()).sum();

    if json {
        let json_content = serde_json::to_string_pretty(&summaries)
            .map_err(|e| anyhow::anyhow!("Failed to serialize summaries to JSON: {}", e))?;
        println!("{}", json_content);
    } else {
        println!(
            "{} word lists in {}",
            summaries.len(),
            registry_config.dir.display()
        );

        for summary in &summaries {
            println!("  {}: {} entries", summary.name, summary.entries);
            for diagnostic in &summary.diagnostics {
                println!("    warning: {}", diagnostic);
            }
        }
    }

    if problems > 0 {
        if !json {
            println!("✗ {} problems found", problems);
        }
        return Err(anyhow::anyhow!(
            "{} problems found in {}",
            problems,
            registry_config.dir.display()
        ));
    }

    if !json {
        println!("✓ All word lists parsed cleanly");
    }
    Ok(())
}
