// ABOUTME: Registry of word list sources for a watched directory
// ABOUTME: Exports the catalogue, its configuration, and the fan-out lookup

pub mod catalog;
pub mod error;
pub mod lookup;

pub use catalog::{Registry, RegistryConfig, SyncReport, DEFAULT_SCAN_INTERVAL};
pub use error::{RegistryError, Result};
pub use lookup::{Lookup, Match};
