//! The boundary between the pooling layer and the native-style audio API.
//!
//! The API is modelled after handle-based C audio libraries: buffers and
//! sources are plain integer names, most calls return nothing, and failures
//! are recorded in a sticky error flag that has to be drained with
//! [`AudioBackend::take_error`]. A flag left set by one call is reported by
//! whichever caller drains next, so stale errors can be attributed to the
//! wrong operation.

mod kira_backend;
mod software;

use std::num::NonZeroU32;

use glam::Vec3;

use crate::error::AudioError;
use crate::wav::PcmFormat;

pub use kira_backend::KiraBackend;
pub use software::{SoftwareBackend, SoftwareBuffer, SoftwareListener, SoftwareSource};

/// Name of a buffer of PCM samples owned by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(NonZeroU32);

/// Name of a playback channel owned by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(NonZeroU32);

impl BufferId {
    /// Returns `None` for the zero name, which never refers to a buffer.
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl SourceId {
    /// Returns `None` for the zero name, which never refers to a source.
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl std::fmt::Display for BufferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "buffer#{}", self.0)
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "source#{}", self.0)
    }
}

/// Playback state of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    /// Created (or rewound) and never played since.
    Initial,
    Playing,
    Paused,
    Stopped,
}

impl SourceState {
    /// Whether a source in this state may be handed to a new owner.
    pub fn is_reusable(self) -> bool {
        matches!(self, SourceState::Initial | SourceState::Stopped)
    }
}

/// Values of the backend's global error flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ErrorCode {
    #[error("invalid name")]
    InvalidName,
    #[error("invalid enum")]
    InvalidEnum,
    #[error("invalid value")]
    InvalidValue,
    #[error("invalid operation")]
    InvalidOperation,
    #[error("out of memory")]
    OutOfMemory,
}

/// Failures of the device and context calls, which report directly instead
/// of through the error flag.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("no output device available: {0}")]
    NoDevice(String),

    #[error("device is not open")]
    DeviceNotOpen,

    #[error("no context has been created")]
    NoContext,
}

/// A handle-based audio API in the style of the classic native 3D audio libraries.
pub trait AudioBackend {
    // ---- Device & context ----

    fn open_device(&mut self) -> Result<(), BackendError>;
    fn create_context(&mut self) -> Result<(), BackendError>;
    /// Attach (`true`) or detach (`false`) the context. Handle calls need an
    /// attached context.
    fn make_context_current(&mut self, current: bool) -> Result<(), BackendError>;
    fn destroy_context(&mut self);
    fn close_device(&mut self);

    // ---- Buffers ----

    fn gen_buffer(&mut self) -> Option<BufferId>;
    fn delete_buffer(&mut self, buffer: BufferId);
    fn buffer_data(&mut self, buffer: BufferId, format: PcmFormat, data: &[u8], frequency: u32);
    /// Size of the uploaded sample data in bytes.
    fn buffer_size(&mut self, buffer: BufferId) -> usize;

    // ---- Sources ----

    fn gen_source(&mut self) -> Option<SourceId>;
    fn delete_source(&mut self, source: SourceId);
    fn set_source_buffer(&mut self, source: SourceId, buffer: Option<BufferId>);
    fn source_buffer(&mut self, source: SourceId) -> Option<BufferId>;
    fn set_source_pitch(&mut self, source: SourceId, pitch: f32);
    fn set_source_gain(&mut self, source: SourceId, gain: f32);
    fn set_source_position(&mut self, source: SourceId, position: Vec3);
    fn set_source_velocity(&mut self, source: SourceId, velocity: Vec3);
    fn set_source_looping(&mut self, source: SourceId, looping: bool);
    fn source_state(&mut self, source: SourceId) -> SourceState;
    fn play_source(&mut self, source: SourceId);
    fn stop_source(&mut self, source: SourceId);
    fn pause_source(&mut self, source: SourceId);

    // ---- Listener ----

    fn set_listener_position(&mut self, position: Vec3);
    fn set_listener_velocity(&mut self, velocity: Vec3);
    fn set_listener_orientation(&mut self, forward: Vec3, up: Vec3);
    fn set_listener_gain(&mut self, gain: f32);

    /// Read and clear the error flag.
    fn take_error(&mut self) -> Option<ErrorCode>;
}

/// Drain the error flag, turning a pending error into an [`AudioError`]
/// attributed to `operation`.
pub(crate) fn drain_error<B: AudioBackend + ?Sized>(
    backend: &mut B,
    operation: &'static str,
) -> Result<(), AudioError> {
    match backend.take_error() {
        Some(code) => Err(AudioError::Backend { operation, code }),
        None => Ok(()),
    }
}

/// Error for a `gen_*` call that produced no name.
pub(crate) fn generation_failed<B: AudioBackend + ?Sized>(
    backend: &mut B,
    operation: &'static str,
) -> AudioError {
    AudioError::Backend {
        operation,
        code: backend.take_error().unwrap_or(ErrorCode::OutOfMemory),
    }
}

/// Sticky error flag: the first error raised is kept until drained.
#[derive(Debug, Default)]
pub(crate) struct ErrorFlag(Option<ErrorCode>);

impl ErrorFlag {
    pub(crate) fn raise(&mut self, code: ErrorCode) {
        if self.0.is_none() {
            self.0 = Some(code);
        }
    }

    pub(crate) fn take(&mut self) -> Option<ErrorCode> {
        self.0.take()
    }
}

/// Hands out increasing non-zero names. Names are never recycled.
#[derive(Debug)]
pub(crate) struct NameAllocator {
    next: u32,
}

impl Default for NameAllocator {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl NameAllocator {
    pub(crate) fn next(&mut self) -> Option<NonZeroU32> {
        let name = NonZeroU32::new(self.next)?;
        self.next = self.next.checked_add(1)?;
        Some(name)
    }
}

/// Device/context lifecycle shared by the backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum ContextState {
    #[default]
    None,
    Created,
    Current,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_names_are_rejected() {
        assert!(BufferId::new(0).is_none());
        assert!(SourceId::new(0).is_none());
        assert_eq!(SourceId::new(7).map(SourceId::get), Some(7));
    }

    #[test]
    fn error_flag_keeps_first_error() {
        let mut flag = ErrorFlag::default();
        flag.raise(ErrorCode::InvalidName);
        flag.raise(ErrorCode::OutOfMemory);
        assert_eq!(flag.take(), Some(ErrorCode::InvalidName));
        assert_eq!(flag.take(), None);
    }

    #[test]
    fn reusable_states() {
        assert!(SourceState::Initial.is_reusable());
        assert!(SourceState::Stopped.is_reusable());
        assert!(!SourceState::Playing.is_reusable());
        assert!(!SourceState::Paused.is_reusable());
    }

    #[test]
    fn names_start_at_one() {
        let mut names = NameAllocator::default();
        assert_eq!(names.next().map(NonZeroU32::get), Some(1));
        assert_eq!(names.next().map(NonZeroU32::get), Some(2));
    }
}
