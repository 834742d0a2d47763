//! Timer state persistence.
//!
//! Assist timer progress and dwell stamps are written to a small JSON file so
//! accumulated hysteresis state survives restarts. The file format is
//! versioned and load is tolerant: entries that fail to deserialize are
//! skipped rather than discarding the whole file.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::assist::AssistTimerState;
use crate::error::Result;
use crate::logging::{StructuredLogger, get_logger};

pub const STORAGE_VERSION: u32 = 1;

/// Durable storage for assist timer state.
pub trait TimerPersistence: Send + Sync {
    /// Load all stored timer states, keyed by device id.
    fn load(&self) -> Result<HashMap<String, AssistTimerState>>;

    /// Persist the full timer state map.
    fn save(&self, timers: &HashMap<String, AssistTimerState>) -> Result<()>;
}

#[derive(Serialize)]
struct TimerFileOut<'a> {
    version: u32,
    saved_at: DateTime<Utc>,
    timers: &'a HashMap<String, AssistTimerState>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct TimerFileIn {
    version: u32,
    timers: HashMap<String, serde_json::Value>,
}

/// JSON-file implementation of [`TimerPersistence`].
pub struct FileTimerStore {
    file_path: String,
    logger: StructuredLogger,
}

impl FileTimerStore {
    pub fn new(file_path: &str) -> Self {
        Self {
            file_path: file_path.to_string(),
            logger: get_logger("persistence"),
        }
    }
}

impl TimerPersistence for FileTimerStore {
    fn load(&self) -> Result<HashMap<String, AssistTimerState>> {
        let path = Path::new(&self.file_path);

        if !path.exists() {
            self.logger.info("No timer state file found, starting fresh");
            return Ok(HashMap::new());
        }

        let contents = std::fs::read_to_string(path)?;
        let parsed: TimerFileIn = serde_json::from_str(&contents)?;

        if parsed.version != STORAGE_VERSION {
            self.logger.warn(&format!(
                "Timer state file has version {}, expected {STORAGE_VERSION}; loading anyway",
                parsed.version
            ));
        }

        let mut timers = HashMap::new();
        for (device_id, value) in parsed.timers {
            match serde_json::from_value::<AssistTimerState>(value) {
                Ok(state) => {
                    timers.insert(device_id, state);
                }
                Err(err) => {
                    self.logger.warn(&format!(
                        "Skipping unreadable timer state for {device_id}: {err}"
                    ));
                }
            }
        }

        self.logger
            .info(&format!("Loaded {} timer state(s) from disk", timers.len()));
        Ok(timers)
    }

    fn save(&self, timers: &HashMap<String, AssistTimerState>) -> Result<()> {
        let file = TimerFileOut {
            version: STORAGE_VERSION,
            saved_at: Utc::now(),
            timers,
        };
        let contents = serde_json::to_string_pretty(&file)?;
        std::fs::write(&self.file_path, contents)?;

        self.logger
            .debug(&format!("Saved {} timer state(s) to disk", timers.len()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn store_in(dir: &tempfile::TempDir) -> FileTimerStore {
        let path = dir.path().join("timers.json");
        FileTimerStore::new(path.to_str().unwrap())
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let stamp = Utc.with_ymd_and_hms(2025, 1, 15, 8, 30, 0).unwrap();
        let mut timers = HashMap::new();
        timers.insert(
            "air_pump".to_string(),
            AssistTimerState {
                on_timer_seconds: 120.5,
                active_condition: "eta_high".to_string(),
                running_state: true,
                last_on: Some(stamp),
                ..Default::default()
            },
        );
        store.save(&timers).unwrap();

        let loaded = store.load().unwrap();
        let state = &loaded["air_pump"];
        assert_eq!(state.on_timer_seconds, 120.5);
        assert_eq!(state.active_condition, "eta_high");
        assert!(state.running_state);
        assert_eq!(state.last_on, Some(stamp));
        assert_eq!(state.last_off, None);
    }

    #[test]
    fn unreadable_entries_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("timers.json");
        std::fs::write(
            &path,
            r#"{
                "version": 1,
                "saved_at": "2025-01-15T08:30:00Z",
                "timers": {
                    "good": {"on_timer_seconds": 10.0},
                    "bad": {"on_timer_seconds": "not a number"}
                }
            }"#,
        )
        .unwrap();

        let store = FileTimerStore::new(path.to_str().unwrap());
        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded["good"].on_timer_seconds, 10.0);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("timers.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = FileTimerStore::new(path.to_str().unwrap());
        assert!(store.load().is_err());
    }
}
