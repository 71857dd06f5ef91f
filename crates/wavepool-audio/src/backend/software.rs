//! A deterministic in-memory backend.
//!
//! Nothing is rendered; playback is simulated by advancing each playing
//! source through its buffer when [`SoftwareBackend::advance`] is called.
//! Every created and deleted name is recorded so callers can check for
//! leaks and double deletions.

use std::collections::HashMap;
use std::time::Duration;

use glam::Vec3;
use tracing::debug;

use super::{
    AudioBackend, BackendError, BufferId, ContextState, ErrorCode, ErrorFlag, NameAllocator,
    SourceId, SourceState,
};
use crate::wav::PcmFormat;

/// Uploaded sample data.
#[derive(Debug, Clone, Default)]
pub struct SoftwareBuffer {
    pub format: Option<PcmFormat>,
    pub frequency: u32,
    pub data: Vec<u8>,
}

impl SoftwareBuffer {
    /// Number of sample frames held.
    pub fn frames(&self) -> usize {
        match self.format {
            Some(format) => self.data.len() / format.frame_size(),
            None => 0,
        }
    }
}

/// Parameters and playback position of a simulated source.
#[derive(Debug, Clone)]
pub struct SoftwareSource {
    pub buffer: Option<BufferId>,
    pub pitch: f32,
    pub gain: f32,
    pub position: Vec3,
    pub velocity: Vec3,
    pub looping: bool,
    pub state: SourceState,
    /// Playback position in frames.
    pub offset: f64,
}

impl Default for SoftwareSource {
    fn default() -> Self {
        Self {
            buffer: None,
            pitch: 1.0,
            gain: 1.0,
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            looping: false,
            state: SourceState::Initial,
            offset: 0.0,
        }
    }
}

/// Listener parameters as last set.
#[derive(Debug, Clone, PartialEq)]
pub struct SoftwareListener {
    pub position: Vec3,
    pub velocity: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
    pub gain: f32,
}

impl Default for SoftwareListener {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            forward: -Vec3::Z,
            up: Vec3::Y,
            gain: 1.0,
        }
    }
}

/// Simulated backend used for headless runs and tests.
#[derive(Debug, Default)]
pub struct SoftwareBackend {
    device_open: bool,
    context: ContextState,
    fail_device: bool,
    fail_context: bool,
    source_limit: Option<usize>,

    buffers: HashMap<BufferId, SoftwareBuffer>,
    sources: HashMap<SourceId, SoftwareSource>,
    listener: SoftwareListener,
    error: ErrorFlag,
    buffer_names: NameAllocator,
    source_names: NameAllocator,

    created_buffers: Vec<BufferId>,
    created_sources: Vec<SourceId>,
    deleted_buffers: Vec<BufferId>,
    deleted_sources: Vec<SourceId>,
}

impl SoftwareBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `open_device` fail.
    pub fn with_failing_device(mut self) -> Self {
        self.fail_device = true;
        self
    }

    /// Make `create_context` fail.
    pub fn with_failing_context(mut self) -> Self {
        self.fail_context = true;
        self
    }

    /// Refuse to have more than `limit` sources alive at once.
    pub fn with_source_limit(mut self, limit: usize) -> Self {
        self.source_limit = Some(limit);
        self
    }

    /// Set the error flag as if an earlier call had failed.
    pub fn inject_error(&mut self, code: ErrorCode) {
        self.error.raise(code);
    }

    /// Move every playing source forward by `elapsed`.
    pub fn advance(&mut self, elapsed: Duration) {
        let seconds = elapsed.as_secs_f64();
        for source in self.sources.values_mut() {
            if source.state != SourceState::Playing {
                continue;
            }
            let (frames, frequency) = match source.buffer.and_then(|b| self.buffers.get(&b)) {
                Some(buffer) => (buffer.frames(), buffer.frequency),
                None => (0, 0),
            };
            if frames == 0 {
                source.state = SourceState::Stopped;
                source.offset = 0.0;
                continue;
            }

            source.offset += seconds * f64::from(frequency) * f64::from(source.pitch);
            let total = frames as f64;
            if source.offset >= total {
                if source.looping {
                    source.offset %= total;
                } else {
                    source.state = SourceState::Stopped;
                    source.offset = 0.0;
                }
            }
        }
    }

    pub fn is_device_open(&self) -> bool {
        self.device_open
    }

    pub fn has_current_context(&self) -> bool {
        self.context == ContextState::Current
    }

    pub fn buffer(&self, buffer: BufferId) -> Option<&SoftwareBuffer> {
        self.buffers.get(&buffer)
    }

    pub fn source(&self, source: SourceId) -> Option<&SoftwareSource> {
        self.sources.get(&source)
    }

    pub fn listener(&self) -> &SoftwareListener {
        &self.listener
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_sources(&self) -> usize {
        self.sources.len()
    }

    /// Every buffer name ever generated, in order.
    pub fn created_buffers(&self) -> &[BufferId] {
        &self.created_buffers
    }

    /// Every source name ever generated, in order.
    pub fn created_sources(&self) -> &[SourceId] {
        &self.created_sources
    }

    /// Every successful buffer deletion, in order.
    pub fn deleted_buffers(&self) -> &[BufferId] {
        &self.deleted_buffers
    }

    /// Every successful source deletion, in order.
    pub fn deleted_sources(&self) -> &[SourceId] {
        &self.deleted_sources
    }

    fn require_context(&mut self) -> bool {
        if self.context == ContextState::Current {
            true
        } else {
            self.error.raise(ErrorCode::InvalidOperation);
            false
        }
    }

    fn source_mut(&mut self, source: SourceId) -> Option<&mut SoftwareSource> {
        if !self.require_context() {
            return None;
        }
        let found = self.sources.get_mut(&source);
        if found.is_none() {
            self.error.raise(ErrorCode::InvalidName);
        }
        found
    }

    fn is_attached(&self, buffer: BufferId) -> bool {
        self.sources.values().any(|s| s.buffer == Some(buffer))
    }
}

impl AudioBackend for SoftwareBackend {
    fn open_device(&mut self) -> Result<(), BackendError> {
        if self.fail_device {
            return Err(BackendError::NoDevice("simulated device failure".into()));
        }
        self.device_open = true;
        Ok(())
    }

    fn create_context(&mut self) -> Result<(), BackendError> {
        if !self.device_open {
            return Err(BackendError::DeviceNotOpen);
        }
        if self.fail_context {
            return Err(BackendError::NoDevice("simulated context failure".into()));
        }
        self.context = ContextState::Created;
        Ok(())
    }

    fn make_context_current(&mut self, current: bool) -> Result<(), BackendError> {
        match (self.context, current) {
            (ContextState::None, true) => Err(BackendError::NoContext),
            (ContextState::None, false) => Ok(()),
            (_, true) => {
                self.context = ContextState::Current;
                Ok(())
            }
            (_, false) => {
                self.context = ContextState::Created;
                Ok(())
            }
        }
    }

    fn destroy_context(&mut self) {
        if self.context == ContextState::Current {
            // Destroying the current context is not allowed.
            self.error.raise(ErrorCode::InvalidOperation);
            return;
        }
        self.context = ContextState::None;
    }

    fn close_device(&mut self) {
        self.device_open = false;
    }

    fn gen_buffer(&mut self) -> Option<BufferId> {
        if !self.require_context() {
            return None;
        }
        let Some(buffer) = self.buffer_names.next().map(BufferId) else {
            self.error.raise(ErrorCode::OutOfMemory);
            return None;
        };
        self.buffers.insert(buffer, SoftwareBuffer::default());
        self.created_buffers.push(buffer);
        Some(buffer)
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        if !self.require_context() {
            return;
        }
        if !self.buffers.contains_key(&buffer) {
            self.error.raise(ErrorCode::InvalidName);
            return;
        }
        if self.is_attached(buffer) {
            self.error.raise(ErrorCode::InvalidOperation);
            return;
        }
        self.buffers.remove(&buffer);
        self.deleted_buffers.push(buffer);
    }

    fn buffer_data(&mut self, buffer: BufferId, format: PcmFormat, data: &[u8], frequency: u32) {
        if !self.require_context() {
            return;
        }
        if !self.buffers.contains_key(&buffer) {
            self.error.raise(ErrorCode::InvalidName);
            return;
        }
        if self.is_attached(buffer) {
            self.error.raise(ErrorCode::InvalidOperation);
            return;
        }
        if frequency == 0 || data.len() % format.frame_size() != 0 {
            self.error.raise(ErrorCode::InvalidValue);
            return;
        }
        if let Some(target) = self.buffers.get_mut(&buffer) {
            target.format = Some(format);
            target.frequency = frequency;
            target.data = data.to_vec();
        }
    }

    fn buffer_size(&mut self, buffer: BufferId) -> usize {
        if !self.require_context() {
            return 0;
        }
        match self.buffers.get(&buffer) {
            Some(b) => b.data.len(),
            None => {
                self.error.raise(ErrorCode::InvalidName);
                0
            }
        }
    }

    fn gen_source(&mut self) -> Option<SourceId> {
        if !self.require_context() {
            return None;
        }
        if self.source_limit.is_some_and(|limit| self.sources.len() >= limit) {
            self.error.raise(ErrorCode::OutOfMemory);
            return None;
        }
        let Some(source) = self.source_names.next().map(SourceId) else {
            self.error.raise(ErrorCode::OutOfMemory);
            return None;
        };
        self.sources.insert(source, SoftwareSource::default());
        self.created_sources.push(source);
        Some(source)
    }

    fn delete_source(&mut self, source: SourceId) {
        if !self.require_context() {
            return;
        }
        if self.sources.remove(&source).is_none() {
            self.error.raise(ErrorCode::InvalidName);
            return;
        }
        self.deleted_sources.push(source);
    }

    fn set_source_buffer(&mut self, source: SourceId, buffer: Option<BufferId>) {
        if let Some(b) = buffer {
            if !self.buffers.contains_key(&b) {
                self.error.raise(ErrorCode::InvalidValue);
                return;
            }
        }
        let Some(target) = self.source_mut(source) else {
            return;
        };
        if matches!(target.state, SourceState::Playing | SourceState::Paused) {
            self.error.raise(ErrorCode::InvalidOperation);
            return;
        }
        target.buffer = buffer;
        target.offset = 0.0;
    }

    fn set_source_pitch(&mut self, source: SourceId, pitch: f32) {
        if !(pitch > 0.0) {
            self.error.raise(ErrorCode::InvalidValue);
            return;
        }
        if let Some(target) = self.source_mut(source) {
            target.pitch = pitch;
        }
    }

    fn set_source_gain(&mut self, source: SourceId, gain: f32) {
        if !(gain >= 0.0) {
            self.error.raise(ErrorCode::InvalidValue);
            return;
        }
        if let Some(target) = self.source_mut(source) {
            target.gain = gain;
        }
    }

    fn set_source_position(&mut self, source: SourceId, position: Vec3) {
        if let Some(target) = self.source_mut(source) {
            target.position = position;
        }
    }

    fn set_source_velocity(&mut self, source: SourceId, velocity: Vec3) {
        if let Some(target) = self.source_mut(source) {
            target.velocity = velocity;
        }
    }

    fn set_source_looping(&mut self, source: SourceId, looping: bool) {
        if let Some(target) = self.source_mut(source) {
            target.looping = looping;
        }
    }

    fn source_buffer(&mut self, source: SourceId) -> Option<BufferId> {
        self.source_mut(source).and_then(|s| s.buffer)
    }

    fn source_state(&mut self, source: SourceId) -> SourceState {
        self.source_mut(source)
            .map(|s| s.state)
            .unwrap_or(SourceState::Initial)
    }

    fn play_source(&mut self, source: SourceId) {
        let Some(target) = self.source_mut(source) else {
            return;
        };
        if target.state != SourceState::Paused {
            target.offset = 0.0;
        }
        target.state = SourceState::Playing;
        let bound = target.buffer;

        let has_samples = bound
            .and_then(|b| self.buffers.get(&b))
            .is_some_and(|b| b.frames() > 0);
        if !has_samples {
            debug!("{source} played without samples, stopping");
            if let Some(target) = self.sources.get_mut(&source) {
                target.state = SourceState::Stopped;
            }
        }
    }

    fn stop_source(&mut self, source: SourceId) {
        if let Some(target) = self.source_mut(source) {
            target.state = SourceState::Stopped;
            target.offset = 0.0;
        }
    }

    fn pause_source(&mut self, source: SourceId) {
        if let Some(target) = self.source_mut(source) {
            if target.state == SourceState::Playing {
                target.state = SourceState::Paused;
            }
        }
    }

    fn set_listener_position(&mut self, position: Vec3) {
        if self.require_context() {
            self.listener.position = position;
        }
    }

    fn set_listener_velocity(&mut self, velocity: Vec3) {
        if self.require_context() {
            self.listener.velocity = velocity;
        }
    }

    fn set_listener_orientation(&mut self, forward: Vec3, up: Vec3) {
        if self.require_context() {
            self.listener.forward = forward;
            self.listener.up = up;
        }
    }

    fn set_listener_gain(&mut self, gain: f32) {
        if !(gain >= 0.0) {
            self.error.raise(ErrorCode::InvalidValue);
            return;
        }
        if self.require_context() {
            self.listener.gain = gain;
        }
    }

    fn take_error(&mut self) -> Option<ErrorCode> {
        self.error.take()
    }
}
