// ABOUTME: Rendered reply type handed to transports
// ABOUTME: One reply per matching word list, carrying its cost and origin line

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    pub source: String,
    pub text: String,
    pub cost_ms: f64,
    pub line: usize,
}

impl std::fmt::Display for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text)
    }
}
