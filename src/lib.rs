// ABOUTME: Main library module for the replybook reply engine
// ABOUTME: Exports all core modules and provides the public API

pub mod cli;
pub mod engine;
pub mod registry;
pub mod source;
pub mod transport;

// Re-export commonly used types
pub use cli::{App, Args, Config};
pub use engine::{EngineConfig, InvocationContext, Origin, Reply, ReplyEngine};
pub use registry::{Registry, RegistryConfig};
pub use source::{Entry, Source};
pub use transport::{InboundMessage, ReplySink};

// Error handling
pub type Result<T> = anyhow::Result<T>;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
