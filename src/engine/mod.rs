// ABOUTME: Template evaluation engine for replybook
// ABOUTME: Renders matched entries, running directives, callbacks, and deferred calls

pub mod context;
pub mod directives;
pub mod error;
pub mod evaluator;
pub mod result;
pub mod scheduler;

pub use context::{InvocationContext, Origin};
pub use error::{DirectiveError, EvalError, Result};
pub use evaluator::{EngineConfig, ReplyEngine, DEFAULT_MAX_CALLBACKS, DEFAULT_MAX_CALLBACK_DEPTH};
pub use result::Reply;
pub use scheduler::DeferredScheduler;
