use std::sync::Arc;
use std::time::Duration;

use netvar_frame::Value;
use serde::{Deserialize, Serialize};

/// Cycle interval used when none is configured.
pub const DEFAULT_CYCLE_INTERVAL: Duration = Duration::from_millis(1000);

/// Called with `(name, new_value)` for every variable an inbound frame changed.
///
/// Runs on the receive thread, after the list's state lock is released, so it
/// may call back into the list.
pub type ChangeHandler = Arc<dyn Fn(&str, &Value) + Send + Sync>;

/// Per-list behavior.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListOptions {
    /// Re-send the pending state every cycle interval.
    pub cyclic: bool,
    /// Cycle interval in milliseconds. Unset or 0 means 1000.
    pub cycle_interval_ms: Option<u64>,
    /// Send the whole list as one frame instead of one frame per variable.
    pub packed: bool,
}

impl ListOptions {
    pub fn with_cyclic(mut self, interval: Duration) -> Self {
        self.cyclic = true;
        self.cycle_interval_ms = Some(interval.as_millis() as u64);
        self
    }

    pub fn with_packed(mut self, packed: bool) -> Self {
        self.packed = packed;
        self
    }

    /// Effective cycle interval.
    pub fn cycle_interval(&self) -> Duration {
        self.cycle_interval_ms
            .filter(|&ms| ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_CYCLE_INTERVAL)
    }
}
