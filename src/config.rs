//! Runtime tunables.
//!
//! Every knob has a built-in default matching the constants the runtime
//! was designed around; deployments override them from a JSON document.

use crate::error::{Error, ErrorKind, Result};
use serde::Deserialize;

/// Tunable constants threaded through a runtime context.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Knobs {
    /// Events below this severity are discarded (numeric severity value).
    pub min_trace_severity: i32,
    /// Seconds between automatic trace flushes.
    pub trace_flush_interval: f64,
    /// Trace file rolls once logged plus buffered bytes exceed this.
    pub trace_roll_size: u64,
    /// Oldest trace files are deleted once the directory exceeds this.
    pub trace_max_logs_size: u64,
    /// Byte budget for events buffered before the log opens.
    pub trace_preopen_buffer_bytes: usize,
    /// Events larger than this are replaced with an overflow warning.
    pub trace_event_max_size: usize,
    /// Suppression map entries before the map is cleared.
    pub max_trace_suppressions: usize,
    /// Whether the writer fsyncs after each flushed batch.
    pub trace_sync_enabled: bool,
    /// Tasks dispatched per priority class per loop turn.
    pub ready_queue_budget: usize,
    /// Blocks per per-thread magazine in the buffer pool.
    pub buffer_magazine_size: usize,
}

impl Default for Knobs {
    fn default() -> Self {
        Self {
            min_trace_severity: 10,
            trace_flush_interval: 0.25,
            trace_roll_size: 10 << 20,
            trace_max_logs_size: 100 << 20,
            trace_preopen_buffer_bytes: 1_000_000,
            trace_event_max_size: 4_000,
            max_trace_suppressions: 20_000,
            trace_sync_enabled: false,
            ready_queue_budget: 100,
            buffer_magazine_size: 32,
        }
    }
}

impl Knobs {
    /// Parses overrides from a JSON document; absent fields keep their
    /// defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|_| Error::new(ErrorKind::SerializationFailed))
    }

    /// Reads overrides from a JSON file.
    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let knobs = Knobs::default();
        assert_eq!(knobs.min_trace_severity, 10);
        assert!(knobs.trace_flush_interval > 0.0);
        assert!(knobs.ready_queue_budget > 0);
    }

    #[test]
    fn partial_overrides_keep_defaults() {
        let knobs = Knobs::from_json_str(r#"{ "ready_queue_budget": 7 }"#).unwrap();
        assert_eq!(knobs.ready_queue_budget, 7);
        assert_eq!(knobs.trace_event_max_size, 4_000);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = Knobs::from_json_str(r#"{ "no_such_knob": 1 }"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SerializationFailed);
    }
}
