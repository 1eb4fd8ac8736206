// ABOUTME: Word list sources backed by text files
// ABOUTME: Exports the stanza parser, the hot-reloading Source, and their errors

pub mod error;
pub mod library;
pub mod parser;

pub use error::{ParseError, Result, SourceError};
pub use library::{LoadReport, Source, SourceMatch, SourceSummary, DEFAULT_POLL_INTERVAL};
pub use parser::{parse_entries, Entry, ParseOutcome};
