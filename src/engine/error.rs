// ABOUTME: Error types for template evaluation
// ABOUTME: Directive and recursion failures degrade in place and are only logged

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DirectiveError {
    #[error("Repeat count '{count}' for '{token}' is not a non-negative integer")]
    InvalidCount { token: String, count: String },

    #[error("Repeat count {count} exceeds the limit of {max}")]
    CountTooLarge { count: usize, max: usize },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("Malformed directive: {0}")]
    Directive(#[from] DirectiveError),

    #[error("Callback depth limit {depth} reached while resolving '{trigger}'")]
    RecursionLimit { trigger: String, depth: usize },

    #[error("Callback cycle: '{trigger}' is already being resolved")]
    CallbackCycle { trigger: String },

    #[error("Callback budget of {budget} exhausted while resolving '{trigger}'")]
    CallbackBudget { trigger: String, budget: usize },
}

pub type Result<T> = std::result::Result<T, EvalError>;
