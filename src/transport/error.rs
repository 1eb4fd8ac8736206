// ABOUTME: Error types for outward reply delivery
// ABOUTME: Delivery failures are logged by callers and never abort a render

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Reply channel closed")]
    ChannelClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DeliveryError>;
