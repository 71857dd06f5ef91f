use glam::Vec3;
use serde::{Deserialize, Serialize};

/// The global reference point that sources are positioned against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Listener {
    pub position: Vec3,
    pub velocity: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
}

impl Default for Listener {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            forward: -Vec3::Z,
            up: Vec3::Y,
        }
    }
}

/// Gain and stereo placement of a source as heard by the listener.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialParams {
    /// Distance attenuation factor (0.0–1.0).
    pub gain: f64,
    /// Stereo panning (-1.0 = full left, 0.0 = center, 1.0 = full right).
    pub panning: f64,
}

/// Distance below which no attenuation is applied.
const REFERENCE_DISTANCE: f32 = 1.0;

/// Distance beyond which attenuation stops increasing.
const MAX_DISTANCE: f32 = 100.0;

const ROLLOFF_FACTOR: f32 = 1.0;

/// Attenuation and panning for a source at `source_pos`.
///
/// Gain follows the clamped inverse distance model:
/// `ref / (ref + rolloff * (d - ref))` with `d` clamped to
/// `[REFERENCE_DISTANCE, MAX_DISTANCE]`.
pub fn compute_spatial(listener: &Listener, source_pos: Vec3) -> SpatialParams {
    let to_source = source_pos - listener.position;
    let distance = to_source.length();

    if distance < f32::EPSILON {
        return SpatialParams {
            gain: 1.0,
            panning: 0.0,
        };
    }

    let clamped = distance.clamp(REFERENCE_DISTANCE, MAX_DISTANCE);
    let gain = REFERENCE_DISTANCE
        / (REFERENCE_DISTANCE + ROLLOFF_FACTOR * (clamped - REFERENCE_DISTANCE));

    let right = listener.forward.cross(listener.up).normalize_or_zero();
    let panning = to_source.normalize().dot(right);

    SpatialParams {
        gain: f64::from(gain).clamp(0.0, 1.0),
        panning: f64::from(panning).clamp(-1.0, 1.0),
    }
}
