use serde::{Deserialize, Serialize};

use crate::spatial::Listener;

/// Audio configuration applied when the system starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Master volume multiplier (0.0–1.0).
    pub master_volume: f32,
    /// Sound effects volume multiplier (0.0–1.0).
    pub effects_volume: f32,
    /// Initial listener placement.
    pub listener: Listener,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            master_volume: 1.0,
            effects_volume: 1.0,
            listener: Listener::default(),
        }
    }
}

impl AudioConfig {
    /// Listener gain (master * effects), clamped to be non-negative.
    pub fn listener_gain(&self) -> f32 {
        (self.master_volume * self.effects_volume).max(0.0)
    }
}
