// ABOUTME: Stock reply sinks for the console and for in-process consumers
// ABOUTME: Stdout printing and an mpsc channel forwarder

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::debug;

use super::error::{DeliveryError, Result};
use super::ReplySink;
use crate::engine::{InvocationContext, Reply};

/// Prints each reply on its own line.
#[derive(Debug, Clone, Default)]
pub struct StdoutSink {
    show_source: bool,
}

impl StdoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix replies with `[source:line]`.
    pub fn with_source(mut self, show_source: bool) -> Self {
        self.show_source = show_source;
        self
    }

    pub fn format(&self, reply: &Reply) -> String {
        if self.show_source {
            format!("[{}:{}] {}", reply.source, reply.line, reply.text)
        } else {
            reply.text.clone()
        }
    }
}

#[async_trait]
impl ReplySink for StdoutSink {
    async fn deliver(&self, reply: &Reply, _context: &InvocationContext) -> Result<()> {
        let mut line = self.format(reply);
        line.push('\n');

        let mut stdout = tokio::io::stdout();
        stdout.write_all(line.as_bytes()).await?;
        stdout.flush().await?;

        debug!("Reply written to stdout ({} chars)", reply.text.len());
        Ok(())
    }
}

/// A reply together with the invocation that produced it.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub reply: Reply,
    pub context: InvocationContext,
}

/// Forwards deliveries to an in-process receiver.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<Delivery>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Delivery>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl ReplySink for ChannelSink {
    async fn deliver(&self, reply: &Reply, context: &InvocationContext) -> Result<()> {
        self.sender
            .send(Delivery {
                reply: reply.clone(),
                context: context.clone(),
            })
            .map_err(|_| DeliveryError::ChannelClosed)
    }
}
