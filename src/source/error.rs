// ABOUTME: Error types for word list parsing and file access
// ABOUTME: Parse diagnostics are reported per stanza, I/O failures per source file

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Stanza at line {line} has no reply lines: {aliases:?}")]
    EmptyStanza { line: usize, aliases: Vec<String> },
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Word list vanished: {}", path.display())]
    Vanished { path: PathBuf },

    #[error("Failed to read word list {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SourceError {
    /// Classify an I/O error for `path`, treating a missing file as removal
    pub fn from_io(path: PathBuf, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            SourceError::Vanished { path }
        } else {
            SourceError::Io { path, source }
        }
    }

    pub fn is_vanished(&self) -> bool {
        matches!(self, SourceError::Vanished { .. })
    }
}

pub type Result<T> = std::result::Result<T, SourceError>;
