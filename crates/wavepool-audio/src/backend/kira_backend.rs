//! Real audio output through kira.
//!
//! The device is a kira `AudioManager`. Buffers hold decoded
//! `StaticSoundData`; a source starts a new `StaticSoundHandle` each time it
//! is played from the beginning. Distance attenuation and panning are
//! computed from the listener with [`compute_spatial`].

use std::collections::HashMap;
use std::io::Cursor;

use glam::Vec3;
use kira::manager::backend::DefaultBackend;
use kira::manager::{AudioManager, AudioManagerSettings};
use kira::sound::static_sound::{StaticSoundData, StaticSoundHandle, StaticSoundSettings};
use kira::sound::PlaybackState;
use kira::tween::Tween;
use tracing::{info, warn};

use super::{
    AudioBackend, BackendError, BufferId, ContextState, ErrorCode, ErrorFlag, NameAllocator,
    SourceId, SourceState,
};
use crate::spatial::{compute_spatial, Listener};
use crate::wav::{encode_wav, PcmFormat};

#[derive(Default)]
struct KiraBuffer {
    sound: Option<StaticSoundData>,
    size: usize,
}

struct KiraSource {
    buffer: Option<BufferId>,
    pitch: f32,
    gain: f32,
    position: Vec3,
    velocity: Vec3,
    looping: bool,
    handle: Option<StaticSoundHandle>,
    /// Set once played; an unplayed source reports `Initial`.
    started: bool,
}

impl Default for KiraSource {
    fn default() -> Self {
        Self {
            buffer: None,
            pitch: 1.0,
            gain: 1.0,
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            looping: false,
            handle: None,
            started: false,
        }
    }
}

impl KiraSource {
    fn state(&self) -> SourceState {
        match &self.handle {
            None if self.started => SourceState::Stopped,
            None => SourceState::Initial,
            Some(handle) => match handle.state() {
                PlaybackState::Paused | PlaybackState::Pausing => SourceState::Paused,
                PlaybackState::Stopped | PlaybackState::Stopping => SourceState::Stopped,
                _ => SourceState::Playing,
            },
        }
    }

    /// Volume and kira panning (0.0 left, 0.5 center, 1.0 right).
    fn mix(&self, listener: &Listener, listener_gain: f32) -> (f64, f64) {
        let spatial = compute_spatial(listener, self.position);
        let volume = spatial.gain * f64::from(self.gain) * f64::from(listener_gain);
        let panning = (spatial.panning + 1.0) / 2.0;
        (volume, panning)
    }

    fn settings(&self, listener: &Listener, listener_gain: f32) -> StaticSoundSettings {
        let (volume, panning) = self.mix(listener, listener_gain);
        let settings = StaticSoundSettings::new()
            .volume(volume)
            .playback_rate(f64::from(self.pitch))
            .panning(panning);
        if self.looping {
            settings.loop_region(..)
        } else {
            settings
        }
    }

    /// Push current parameters to a live handle.
    fn refresh(&mut self, listener: &Listener, listener_gain: f32) {
        let (volume, panning) = self.mix(listener, listener_gain);
        let pitch = f64::from(self.pitch);
        if let Some(handle) = self.handle.as_mut() {
            handle.set_volume(volume, Tween::default());
            handle.set_panning(panning, Tween::default());
            handle.set_playback_rate(pitch, Tween::default());
        }
    }

    fn halt(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.stop(Tween::default());
        }
    }
}

/// Backend playing through the default output device.
///
/// Velocities are recorded but there is no doppler shift. Changing the
/// looping flag of a playing source takes effect the next time it starts.
#[derive(Default)]
pub struct KiraBackend {
    manager: Option<AudioManager<DefaultBackend>>,
    context: ContextState,
    buffers: HashMap<BufferId, KiraBuffer>,
    sources: HashMap<SourceId, KiraSource>,
    listener: Listener,
    listener_gain: f32,
    error: ErrorFlag,
    buffer_names: NameAllocator,
    source_names: NameAllocator,
}

impl KiraBackend {
    pub fn new() -> Self {
        Self {
            listener_gain: 1.0,
            ..Self::default()
        }
    }

    fn require_context(&mut self) -> bool {
        if self.context == ContextState::Current {
            true
        } else {
            self.error.raise(ErrorCode::InvalidOperation);
            false
        }
    }

    fn source_mut(&mut self, source: SourceId) -> Option<&mut KiraSource> {
        if !self.require_context() {
            return None;
        }
        let found = self.sources.get_mut(&source);
        if found.is_none() {
            self.error.raise(ErrorCode::InvalidName);
        }
        found
    }

    fn update_source(&mut self, source: SourceId, update: impl FnOnce(&mut KiraSource)) {
        let listener = self.listener;
        let listener_gain = self.listener_gain;
        if let Some(target) = self.source_mut(source) {
            update(target);
            target.refresh(&listener, listener_gain);
        }
    }

    fn refresh_all(&mut self) {
        for source in self.sources.values_mut() {
            source.refresh(&self.listener, self.listener_gain);
        }
    }

    fn is_attached(&self, buffer: BufferId) -> bool {
        self.sources.values().any(|s| s.buffer == Some(buffer))
    }
}

impl AudioBackend for KiraBackend {
    fn open_device(&mut self) -> Result<(), BackendError> {
        let manager = AudioManager::<DefaultBackend>::new(AudioManagerSettings::default())
            .map_err(|e| BackendError::NoDevice(e.to_string()))?;
        self.manager = Some(manager);
        info!("Opened default audio output device");
        Ok(())
    }

    fn create_context(&mut self) -> Result<(), BackendError> {
        if self.manager.is_none() {
            return Err(BackendError::DeviceNotOpen);
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
            self.error.raise(ErrorCode::InvalidOperation);
            return;
        }
        for source in self.sources.values_mut() {
            source.halt();
        }
        self.sources.clear();
        self.buffers.clear();
        self.context = ContextState::None;
    }

    fn close_device(&mut self) {
        self.manager = None;
    }

    fn gen_buffer(&mut self) -> Option<BufferId> {
        if !self.require_context() {
            return None;
        }
        let Some(buffer) = self.buffer_names.next().map(BufferId) else {
            self.error.raise(ErrorCode::OutOfMemory);
            return None;
        };
        self.buffers.insert(buffer, KiraBuffer::default());
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

        let wav = encode_wav(format, frequency, data);
        match StaticSoundData::from_cursor(Cursor::new(wav)) {
            Ok(sound) => {
                if let Some(target) = self.buffers.get_mut(&buffer) {
                    target.sound = Some(sound);
                    target.size = data.len();
                }
            }
            Err(e) => {
                warn!("kira rejected sample data for {buffer}: {e}");
                self.error.raise(ErrorCode::InvalidValue);
            }
        }
    }

    fn buffer_size(&mut self, buffer: BufferId) -> usize {
        if !self.require_context() {
            return 0;
        }
        match self.buffers.get(&buffer) {
            Some(b) => b.size,
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
        let Some(source) = self.source_names.next().map(SourceId) else {
            self.error.raise(ErrorCode::OutOfMemory);
            return None;
        };
        self.sources.insert(source, KiraSource::default());
        Some(source)
    }

    fn delete_source(&mut self, source: SourceId) {
        if !self.require_context() {
            return;
        }
        match self.sources.remove(&source) {
            Some(mut removed) => removed.halt(),
            None => self.error.raise(ErrorCode::InvalidName),
        }
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
        if matches!(target.state(), SourceState::Playing | SourceState::Paused) {
            self.error.raise(ErrorCode::InvalidOperation);
            return;
        }
        target.halt();
        target.buffer = buffer;
    }

    fn set_source_pitch(&mut self, source: SourceId, pitch: f32) {
        if !(pitch > 0.0) {
            self.error.raise(ErrorCode::InvalidValue);
            return;
        }
        self.update_source(source, |s| s.pitch = pitch);
    }

    fn set_source_gain(&mut self, source: SourceId, gain: f32) {
        if !(gain >= 0.0) {
            self.error.raise(ErrorCode::InvalidValue);
            return;
        }
        self.update_source(source, |s| s.gain = gain);
    }

    fn set_source_position(&mut self, source: SourceId, position: Vec3) {
        self.update_source(source, |s| s.position = position);
    }

    fn set_source_velocity(&mut self, source: SourceId, velocity: Vec3) {
        self.update_source(source, |s| s.velocity = velocity);
    }

    fn set_source_looping(&mut self, source: SourceId, looping: bool) {
        self.update_source(source, |s| s.looping = looping);
    }

    fn source_buffer(&mut self, source: SourceId) -> Option<BufferId> {
        self.source_mut(source).and_then(|s| s.buffer)
    }

    fn source_state(&mut self, source: SourceId) -> SourceState {
        self.source_mut(source)
            .map(|s| s.state())
            .unwrap_or(SourceState::Initial)
    }

    fn play_source(&mut self, source: SourceId) {
        if !self.require_context() {
            return;
        }
        let Some(target) = self.sources.get_mut(&source) else {
            self.error.raise(ErrorCode::InvalidName);
            return;
        };

        if target.state() == SourceState::Paused {
            if let Some(handle) = target.handle.as_mut() {
                handle.resume(Tween::default());
            }
            return;
        }

        target.halt();
        target.started = true;
        let Some(sound) = target
            .buffer
            .and_then(|b| self.buffers.get(&b))
            .and_then(|b| b.sound.clone())
        else {
            // Nothing to play: the source goes straight to stopped.
            return;
        };
        let Some(manager) = self.manager.as_mut() else {
            self.error.raise(ErrorCode::InvalidOperation);
            return;
        };

        let settings = target.settings(&self.listener, self.listener_gain);
        match manager.play(sound.with_settings(settings)) {
            Ok(handle) => target.handle = Some(handle),
            Err(e) => {
                warn!("kira could not start {source}: {e:?}");
                self.error.raise(ErrorCode::OutOfMemory);
            }
        }
    }

    fn stop_source(&mut self, source: SourceId) {
        if let Some(target) = self.source_mut(source) {
            target.halt();
            target.started = true;
        }
    }

    fn pause_source(&mut self, source: SourceId) {
        if let Some(target) = self.source_mut(source) {
            if target.state() == SourceState::Playing {
                if let Some(handle) = target.handle.as_mut() {
                    handle.pause(Tween::default());
                }
            }
        }
    }

    fn set_listener_position(&mut self, position: Vec3) {
        if self.require_context() {
            self.listener.position = position;
            self.refresh_all();
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
            self.refresh_all();
        }
    }

    fn set_listener_gain(&mut self, gain: f32) {
        if !(gain >= 0.0) {
            self.error.raise(ErrorCode::InvalidValue);
            return;
        }
        if self.require_context() {
            self.listener_gain = gain;
            self.refresh_all();
        }
    }

    fn take_error(&mut self) -> Option<ErrorCode> {
        self.error.take()
    }
}
