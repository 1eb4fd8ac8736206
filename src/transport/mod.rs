// ABOUTME: Boundary between the reply engine and a chat transport
// ABOUTME: Defines inbound messages and the outward delivery trait with stock sinks

pub mod error;
pub mod sink;

use async_trait::async_trait;

use crate::engine::{InvocationContext, Reply};

pub use error::{DeliveryError, Result};
pub use sink::{ChannelSink, Delivery, StdoutSink};

/// Outward delivery path, used for replies that are not returned inline.
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn deliver(&self, reply: &Reply, context: &InvocationContext) -> Result<()>;
}

/// An event as received from a transport.
#[derive(Debug, Clone, Default)]
pub struct InboundMessage {
    pub content: Option<String>,
    pub sender_id: String,
    pub group_id: String,
}

impl InboundMessage {
    pub fn new(content: impl Into<String>, sender_id: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            sender_id: sender_id.into(),
            group_id: String::new(),
        }
    }

    pub fn in_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = group_id.into();
        self
    }

    /// The exact trigger text: message content with surrounding whitespace removed.
    pub fn trigger(&self) -> &str {
        self.content.as_deref().unwrap_or_default().trim()
    }

    pub fn into_context(self) -> InvocationContext {
        let trigger = self.trigger().to_string();
        InvocationContext::new(trigger, self.sender_id, self.group_id)
    }
}
