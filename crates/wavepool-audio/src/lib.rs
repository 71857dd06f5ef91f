//! Wavepool Audio - WAV buffer loading and source pooling
//!
//! A thin layer over a handle-based native audio API ([`AudioBackend`]):
//! WAV assets are parsed into buffers, playback channels are recycled
//! through a pool, and [`Sound`]s bundle a buffer with the parameters it is
//! played with.

pub mod backend;
mod config;
mod error;
mod pool;
mod sound;
mod spatial;
mod system;
pub mod wav;

pub use backend::{AudioBackend, BufferId, KiraBackend, SoftwareBackend, SourceId, SourceState};
pub use config::AudioConfig;
pub use error::AudioError;
pub use pool::{BufferTracker, SourceParams, SourcePool};
pub use sound::{Sound, SoundState};
pub use spatial::{compute_spatial, Listener, SpatialParams};
pub use system::{AudioSystem, ShutdownReport};
pub use wav::{PcmFormat, WavError, WavHeader};
