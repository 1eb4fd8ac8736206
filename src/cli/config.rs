// ABOUTME: Configuration management for replybook
// ABOUTME: Handles loading configuration from YAML files and environment variables

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::engine::{EngineConfig, DEFAULT_MAX_CALLBACKS, DEFAULT_MAX_CALLBACK_DEPTH};
use crate::engine::directives::DEFAULT_MAX_REPEAT;
use crate::registry::{RegistryConfig, DEFAULT_SCAN_INTERVAL};
use crate::source::DEFAULT_POLL_INTERVAL;

fn default_words_dir() -> PathBuf {
    PathBuf::from("words")
}

fn default_extension() -> String {
    "txt".to_string()
}

fn default_scan_interval() -> Duration {
    DEFAULT_SCAN_INTERVAL
}

fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

fn default_max_callback_depth() -> usize {
    DEFAULT_MAX_CALLBACK_DEPTH
}

fn default_max_callbacks() -> usize {
    DEFAULT_MAX_CALLBACKS
}

fn default_max_repeat() -> usize {
    DEFAULT_MAX_REPEAT
}

fn default_shutdown_grace() -> Duration {
    Duration::from_secs(5)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_words_dir")]
    pub words_dir: PathBuf,

    #[serde(default = "default_extension")]
    pub extension: String,

    #[serde(with = "humantime_serde", default = "default_scan_interval")]
    pub scan_interval: Duration,

    #[serde(with = "humantime_serde", default = "default_poll_interval")]
    pub poll_interval: Duration,

    #[serde(default = "default_max_callback_depth")]
    pub max_callback_depth: usize,

    #[serde(default = "default_max_callbacks")]
    pub max_callbacks: usize,

    #[serde(default = "default_max_repeat")]
    pub max_repeat: usize,

    #[serde(with = "humantime_serde", default = "default_shutdown_grace")]
    pub shutdown_grace: Duration,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            words_dir: default_words_dir(),
            extension: default_extension(),
            scan_interval: default_scan_interval(),
            poll_interval: default_poll_interval(),
            max_callback_depth: default_max_callback_depth(),
            max_callbacks: default_max_callbacks(),
            max_repeat: default_max_repeat(),
            shutdown_grace: default_shutdown_grace(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file path or default locations
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p,
            None => Self::find_config_file(),
        };

        let mut config = if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)?;
            serde_yaml::from_str(&contents)?
        } else {
            Config::default()
        };

        config.merge_env()?;
        Ok(config)
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> PathBuf {
        let possible_paths = [
            PathBuf::from("replybook.yaml"),
            PathBuf::from("replybook.yml"),
            PathBuf::from(".replybook.yaml"),
            PathBuf::from(".replybook.yml"),
        ];

        if let Some(home_dir) = dirs::home_dir() {
            let home_config = home_dir.join(".replybook").join("config.yaml");
            if home_config.exists() {
                return home_config;
            }
        }

        for path in possible_paths {
            if path.exists() {
                return path;
            }
        }

        // Return default path (may not exist)
        PathBuf::from("replybook.yaml")
    }

    /// Merge environment variables into configuration
    fn merge_env(&mut self) -> Result<()> {
        if let Ok(dir) = std::env::var("REPLYBOOK_WORDS_DIR") {
            self.words_dir = PathBuf::from(dir);
        }
        if let Ok(extension) = std::env::var("REPLYBOOK_EXTENSION") {
            self.extension = extension;
        }
        if let Ok(interval) = std::env::var("REPLYBOOK_SCAN_INTERVAL") {
            self.scan_interval = humantime_serde::re::humantime::parse_duration(&interval)?;
        }
        if let Ok(interval) = std::env::var("REPLYBOOK_POLL_INTERVAL") {
            self.poll_interval = humantime_serde::re::humantime::parse_duration(&interval)?;
        }
        if let Ok(depth) = std::env::var("REPLYBOOK_MAX_CALLBACK_DEPTH") {
            self.max_callback_depth = depth.parse()?;
        }
        if let Ok(budget) = std::env::var("REPLYBOOK_MAX_CALLBACKS") {
            self.max_callbacks = budget.parse()?;
        }

        // Logging configuration
        if let Ok(level) = std::env::var("REPLYBOOK_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("REPLYBOOK_LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }

    pub fn registry_config(&self, dir: Option<PathBuf>) -> RegistryConfig {
        RegistryConfig {
            dir: dir.unwrap_or_else(|| self.words_dir.clone()),
            extension: self.extension.clone(),
            scan_interval: self.scan_interval,
            poll_interval: self.poll_interval,
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_callback_depth: self.max_callback_depth,
            max_callbacks: self.max_callbacks,
            max_repeat: self.max_repeat,
        }
    }
}
