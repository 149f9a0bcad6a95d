//! Application configuration types.
//!
//! The top-level [`Config`] struct carries the import and event sub-configs.
//! Every section defaults sensibly so an empty file is valid. Parsing is left
//! to the caller (the binary reads TOML), this module only defines the shape
//! and the validation rules.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::Error;

/// Default per-track queue capacity, in samples.
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub import: ImportConfig,
    pub events: EventsConfig,
}

impl Config {
    /// Reject configurations the import core cannot run with.
    pub fn check(&self) -> Result<()> {
        if self.import.queue_capacity == 0 {
            return Err(Error::Config("import.queue_capacity must be at least 1".into()));
        }
        if self.events.capacity == 0 {
            return Err(Error::Config("events.capacity must be at least 1".into()));
        }
        if !(self.import.progress_event_step > 0.0 && self.import.progress_event_step <= 1.0) {
            return Err(Error::Config(format!(
                "import.progress_event_step must be in (0, 1], got {}",
                self.import.progress_event_step
            )));
        }
        Ok(())
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.import.queue_capacity > 4096 {
            warnings.push(format!(
                "import.queue_capacity {} buffers a lot of samples per track",
                self.import.queue_capacity
            ));
        }

        if self.import.progress_event_step < 0.001 {
            warnings.push(
                "import.progress_event_step below 0.001 floods the event bus".into(),
            );
        }

        if self.import.thread_name_prefix.is_empty() {
            warnings.push("import.thread_name_prefix is empty; worker threads are unnamed".into());
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Import worker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Samples buffered per track before the worker moves on to other tracks.
    pub queue_capacity: usize,
    /// Minimum aggregate progress delta between two progress events.
    pub progress_event_step: f64,
    /// Prefix for worker thread names.
    pub thread_name_prefix: String,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            progress_event_step: 0.01,
            thread_name_prefix: "tracklift-import".into(),
        }
    }
}

/// Event bus settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Broadcast channel buffer size.
    pub capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_check() {
        let config = Config::default();
        assert!(config.check().is_ok());
        assert!(config.validate().is_empty());
        assert_eq!(config.import.queue_capacity, DEFAULT_QUEUE_CAPACITY);
    }

    #[test]
    fn empty_json_is_default() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.import.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.events.capacity, 256);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"import": {"queue_capacity": 4}}"#).unwrap();
        assert_eq!(config.import.queue_capacity, 4);
        assert_eq!(config.import.thread_name_prefix, "tracklift-import");
    }

    #[test]
    fn zero_capacity_rejected() {
        let mut config = Config::default();
        config.import.queue_capacity = 0;
        let err = config.check().unwrap_err();
        assert!(err.to_string().contains("queue_capacity"));
    }

    #[test]
    fn bad_progress_step_rejected() {
        let mut config = Config::default();
        config.import.progress_event_step = 0.0;
        assert!(config.check().is_err());
        config.import.progress_event_step = 1.5;
        assert!(config.check().is_err());
    }

    #[test]
    fn warnings_for_odd_values() {
        let mut config = Config::default();
        config.import.queue_capacity = 10_000;
        config.import.thread_name_prefix.clear();
        let warnings = config.validate();
        assert_eq!(warnings.len(), 2);
    }
}
