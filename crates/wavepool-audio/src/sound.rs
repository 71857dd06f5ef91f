use glam::Vec3;
use tracing::{debug, error};
use wavepool_core::DataSource;

use crate::backend::{drain_error, AudioBackend, BufferId, SourceId, SourceState};
use crate::error::AudioError;
use crate::pool::{apply_playback_params, SourceParams};
use crate::system::{AudioSystem, DropQueue};

/// Where a [`Sound`] is in its playback lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundState {
    /// No source has been acquired yet (or it was returned by `stop`).
    Unbound,
    /// A source is bound but not playing.
    Idle,
    Playing,
    Paused,
}

/// A buffer plus the parameters it is played with.
///
/// The public fields are applied whenever the sound acquires a source; call
/// [`Sound::apply`] to push changes to a source that is already bound.
///
/// Dropping a bound sound hands its source back to the audio system, which
/// stops it and returns it to the pool on its next pool operation.
/// [`Sound::destroy`] does the same immediately.
#[derive(Debug)]
pub struct Sound {
    pub pitch: f32,
    pub gain: f32,
    pub position: Vec3,
    pub velocity: Vec3,
    pub looping: bool,
    buffer: BufferId,
    /// Most recently played source.
    source: Option<SourceId>,
    /// Where the bound source goes if the sound is dropped.
    drop_queue: Option<DropQueue>,
}

impl Sound {
    /// A sound over a buffer owned by the caller, possibly shared with other sounds.
    pub fn new(buffer: BufferId) -> Self {
        Self {
            pitch: 1.0,
            gain: 1.0,
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            looping: false,
            buffer,
            source: None,
            drop_queue: None,
        }
    }

    /// Load `data` into a buffer of its own. The buffer is deleted when the
    /// audio system shuts down.
    pub fn load<B: AudioBackend>(
        audio: &mut AudioSystem<B>,
        data: &dyn DataSource,
    ) -> Result<Self, AudioError> {
        let buffer = audio.create_tracked_buffer(data)?;
        Ok(Self::new(buffer))
    }

    pub fn buffer(&self) -> BufferId {
        self.buffer
    }

    /// The bound source, if any.
    pub fn source(&self) -> Option<SourceId> {
        self.source
    }

    fn params(&self) -> SourceParams {
        SourceParams {
            buffer: self.buffer,
            pitch: self.pitch,
            gain: self.gain,
            position: self.position,
            velocity: self.velocity,
            looping: self.looping,
        }
    }

    pub fn state<B: AudioBackend>(&self, audio: &mut AudioSystem<B>) -> SoundState {
        let Some(source) = self.source else {
            return SoundState::Unbound;
        };
        match audio.backend_mut().source_state(source) {
            SourceState::Playing => SoundState::Playing,
            SourceState::Paused => SoundState::Paused,
            SourceState::Initial | SourceState::Stopped => SoundState::Idle,
        }
    }

    /// Start playing.
    ///
    /// With `overlap`, a sound that is already playing leaves its current
    /// source running in the pool and starts again on another one, so the
    /// instances overlap. Without it, playback restarts on the same source.
    /// A paused sound resumes.
    pub fn play<B: AudioBackend>(
        &mut self,
        audio: &mut AudioSystem<B>,
        overlap: bool,
    ) -> Result<(), AudioError> {
        self.try_play(audio, overlap)
            .inspect_err(|e| error!("Error occurred playing sound: {e}"))
    }

    fn try_play<B: AudioBackend>(
        &mut self,
        audio: &mut AudioSystem<B>,
        overlap: bool,
    ) -> Result<(), AudioError> {
        let source = match self.source {
            None => audio.acquire_source(&self.params())?,
            Some(current) if overlap && self.state(audio) == SoundState::Playing => {
                audio.release_source(current);
                self.source = None;
                audio.acquire_source(&self.params())?
            }
            Some(current) => current,
        };
        self.source = Some(source);
        if self.drop_queue.is_none() {
            self.drop_queue = Some(audio.drop_queue());
        }

        audio.backend_mut().play_source(source);
        drain_error(audio.backend_mut(), "playing sound")
    }

    /// Stop playback and return the source to the pool.
    pub fn stop<B: AudioBackend>(&mut self, audio: &mut AudioSystem<B>) -> Result<(), AudioError> {
        let Some(source) = self.source.take() else {
            let e = AudioError::NotBound { operation: "stop" };
            error!("{e}");
            return Err(e);
        };
        audio.backend_mut().stop_source(source);
        audio.release_source(source);
        drain_error(audio.backend_mut(), "stopping sound")
            .inspect_err(|e| error!("Error occurred stopping sound: {e}"))
    }

    /// Pause in place. The source stays bound.
    pub fn pause<B: AudioBackend>(&mut self, audio: &mut AudioSystem<B>) -> Result<(), AudioError> {
        let Some(source) = self.source else {
            let e = AudioError::NotBound { operation: "pause" };
            error!("{e}");
            return Err(e);
        };
        audio.backend_mut().pause_source(source);
        drain_error(audio.backend_mut(), "pausing sound")
            .inspect_err(|e| error!("Error occurred pausing sound: {e}"))
    }

    /// Push pitch, gain, position, velocity and looping to the bound source
    /// without restarting it. Does nothing while unbound.
    pub fn apply<B: AudioBackend>(&self, audio: &mut AudioSystem<B>) -> Result<(), AudioError> {
        let Some(source) = self.source else {
            return Ok(());
        };
        let params = self.params();
        apply_playback_params(audio.backend_mut(), source, &params);
        drain_error(audio.backend_mut(), "updating sound parameters")
            .inspect_err(|e| error!("Error occurred updating sound: {e}"))
    }

    /// Stop the bound source and return it to the pool. The buffer is kept.
    pub fn destroy<B: AudioBackend>(mut self, audio: &mut AudioSystem<B>) {
        if let Some(source) = self.source.take() {
            audio.backend_mut().stop_source(source);
            audio.release_source(source);
        }
    }
}

impl Drop for Sound {
    fn drop(&mut self) {
        if let (Some(source), Some(queue)) = (self.source.take(), &self.drop_queue) {
            debug!("Sound dropped while bound to {source}, returning it to the pool");
            queue.lock().push(source);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wavepool_core::MemorySource;

    use super::*;
    use crate::backend::SoftwareBackend;
    use crate::config::AudioConfig;
    use crate::wav::{encode_wav, PcmFormat};

    /// One second of mono 8-bit silence at 1 kHz.
    fn clip(name: &str) -> MemorySource {
        MemorySource::new(encode_wav(PcmFormat::Mono8, 1_000, &[128u8; 1_000]), name)
    }

    fn system() -> AudioSystem<SoftwareBackend> {
        AudioSystem::init(SoftwareBackend::new(), AudioConfig::default())
    }

    #[test]
    fn play_binds_and_plays() {
        let mut audio = system();
        let mut sound = Sound::load(&mut audio, &clip("click.wav")).unwrap();
        assert_eq!(sound.state(&mut audio), SoundState::Unbound);

        sound.play(&mut audio, true).unwrap();
        assert_eq!(sound.state(&mut audio), SoundState::Playing);
        assert_eq!(audio.bound_sources(), 1);
        sound.destroy(&mut audio);
    }

    #[test]
    fn parameters_reach_the_source() {
        let mut audio = system();
        let buffer = audio.create_buffer(&clip("shared.wav")).unwrap();
        let mut sound = Sound::new(buffer);
        sound.pitch = 0.5;
        sound.gain = 0.8;
        sound.position = Vec3::new(0.0, 1.0, 0.0);
        sound.looping = true;
        sound.play(&mut audio, false).unwrap();

        let source = sound.source().unwrap();
        let applied = audio.backend().source(source).unwrap();
        assert_eq!(applied.buffer, Some(buffer));
        assert_eq!(applied.pitch, 0.5);
        assert_eq!(applied.gain, 0.8);
        assert_eq!(applied.position, Vec3::new(0.0, 1.0, 0.0));
        assert!(applied.looping);
        sound.destroy(&mut audio);
    }

    #[test]
    fn overlapping_play_uses_a_second_source() {
        let mut audio = system();
        let mut sound = Sound::load(&mut audio, &clip("laser.wav")).unwrap();

        sound.play(&mut audio, true).unwrap();
        let first = sound.source().unwrap();
        sound.play(&mut audio, true).unwrap();
        let second = sound.source().unwrap();

        assert_ne!(first, second);
        assert_eq!(audio.backend_mut().source_state(first), SourceState::Playing);
        assert_eq!(audio.backend_mut().source_state(second), SourceState::Playing);

        // Stopping the sound only stops the instance it is bound to.
        sound.stop(&mut audio).unwrap();
        assert_eq!(audio.backend_mut().source_state(second), SourceState::Stopped);
        assert_eq!(audio.backend_mut().source_state(first), SourceState::Playing);

        // The first instance is still independently stoppable.
        audio.backend_mut().stop_source(first);
        assert_eq!(audio.backend_mut().source_state(first), SourceState::Stopped);
    }

    #[test]
    fn replay_without_overlap_restarts_on_same_source() {
        let mut audio = system();
        let mut sound = Sound::load(&mut audio, &clip("step.wav")).unwrap();
        sound.play(&mut audio, false).unwrap();
        let source = sound.source().unwrap();
        audio.backend_mut().advance(Duration::from_millis(400));

        sound.play(&mut audio, false).unwrap();
        assert_eq!(sound.source(), Some(source));
        assert_eq!(audio.backend().source(source).unwrap().offset, 0.0);
        assert_eq!(audio.backend().created_sources().len(), 1);
        sound.destroy(&mut audio);
    }

    #[test]
    fn finished_sound_replays_on_its_source() {
        let mut audio = system();
        let mut sound = Sound::load(&mut audio, &clip("bell.wav")).unwrap();
        sound.play(&mut audio, true).unwrap();
        let source = sound.source().unwrap();

        audio.backend_mut().advance(Duration::from_secs(2));
        assert_eq!(sound.state(&mut audio), SoundState::Idle);

        sound.play(&mut audio, true).unwrap();
        assert_eq!(sound.source(), Some(source));
        assert_eq!(sound.state(&mut audio), SoundState::Playing);
        sound.destroy(&mut audio);
    }

    #[test]
    fn pause_keeps_the_source() {
        let mut audio = system();
        let mut sound = Sound::load(&mut audio, &clip("hum.wav")).unwrap();
        sound.play(&mut audio, true).unwrap();
        let source = sound.source();

        sound.pause(&mut audio).unwrap();
        assert_eq!(sound.state(&mut audio), SoundState::Paused);
        assert_eq!(sound.source(), source);
        assert_eq!(audio.pooled_sources(), 0);

        sound.play(&mut audio, true).unwrap();
        assert_eq!(sound.state(&mut audio), SoundState::Playing);
        assert_eq!(sound.source(), source);
        sound.destroy(&mut audio);
    }

    #[test]
    fn stop_returns_source_to_pool() {
        let mut audio = system();
        let mut sound = Sound::load(&mut audio, &clip("door.wav")).unwrap();
        sound.play(&mut audio, true).unwrap();
        sound.stop(&mut audio).unwrap();

        assert_eq!(sound.state(&mut audio), SoundState::Unbound);
        assert_eq!(audio.pooled_sources(), 1);
        assert_eq!(audio.bound_sources(), 0);
    }

    #[test]
    fn stop_and_pause_while_unbound_are_errors() {
        let mut audio = system();
        let mut sound = Sound::load(&mut audio, &clip("idle.wav")).unwrap();
        assert!(matches!(
            sound.stop(&mut audio),
            Err(AudioError::NotBound { operation: "stop" })
        ));
        assert!(matches!(
            sound.pause(&mut audio),
            Err(AudioError::NotBound { operation: "pause" })
        ));
        assert_eq!(sound.state(&mut audio), SoundState::Unbound);
    }

    #[test]
    fn destroying_a_playing_sound_recycles_its_source() {
        let mut audio = system();
        let buffer = audio.create_buffer(&clip("shared.wav")).unwrap();
        let mut first = Sound::new(buffer);
        first.play(&mut audio, true).unwrap();
        let source = first.source().unwrap();

        first.destroy(&mut audio);
        assert_eq!(audio.backend_mut().source_state(source), SourceState::Stopped);
        assert_eq!(audio.pooled_sources(), 1);

        let mut second = Sound::new(buffer);
        second.play(&mut audio, true).unwrap();
        assert_eq!(second.source(), Some(source));
        assert_eq!(audio.backend().created_sources().len(), 1);
        second.destroy(&mut audio);
    }

    #[test]
    fn dropped_sound_hands_back_its_source() {
        let mut audio = system();
        let buffer = audio.create_buffer(&clip("loop.wav")).unwrap();
        let mut first = Sound::new(buffer);
        first.looping = true;
        first.play(&mut audio, true).unwrap();
        let source = first.source().unwrap();

        drop(first);
        assert_eq!(audio.bound_sources(), 0);
        assert_eq!(audio.pooled_sources(), 1);
        assert_eq!(audio.playing_sources(), 0);
        assert_eq!(audio.backend_mut().source_state(source), SourceState::Stopped);

        let mut second = Sound::new(buffer);
        second.play(&mut audio, true).unwrap();
        assert_eq!(second.source(), Some(source));
        assert_eq!(audio.backend().created_sources().len(), 1);
        second.destroy(&mut audio);
    }

    #[test]
    fn apply_updates_a_live_source() {
        let mut audio = system();
        let mut sound = Sound::load(&mut audio, &clip("engine.wav")).unwrap();
        sound.play(&mut audio, true).unwrap();

        sound.gain = 0.1;
        sound.position = Vec3::new(-1.0, 0.0, 0.0);
        sound.apply(&mut audio).unwrap();

        let applied = audio.backend().source(sound.source().unwrap()).unwrap();
        assert_eq!(applied.gain, 0.1);
        assert_eq!(applied.position, Vec3::new(-1.0, 0.0, 0.0));
        assert_eq!(applied.state, SourceState::Playing);
        sound.destroy(&mut audio);
    }

    #[test]
    fn shutdown_deletes_everything_exactly_once() {
        let mut audio = system();
        let shared = audio.create_buffer(&clip("mono.wav")).unwrap();
        let mut owned = Sound::load(&mut audio, &clip("stereo.wav")).unwrap();
        let mut also_owned = Sound::load(&mut audio, &clip("other.wav")).unwrap();
        let mut positional = Sound::new(shared);

        owned.play(&mut audio, true).unwrap();
        owned.play(&mut audio, true).unwrap();
        also_owned.play(&mut audio, true).unwrap();
        positional.play(&mut audio, true).unwrap();
        positional.stop(&mut audio).unwrap();

        owned.destroy(&mut audio);
        positional.destroy(&mut audio);
        // `also_owned` is still bound when the system goes down.
        let report = audio.shutdown();

        let backend = audio.backend();
        let mut created_sources = backend.created_sources().to_vec();
        let mut deleted_sources = backend.deleted_sources().to_vec();
        created_sources.sort();
        deleted_sources.sort();
        assert_eq!(created_sources, deleted_sources);
        assert_eq!(report.sources_deleted, created_sources.len());

        // Tracked buffers are deleted; the caller-owned one is not.
        assert_eq!(report.buffers_deleted, 2);
        assert_eq!(backend.deleted_buffers().len(), 2);
        assert!(!backend.deleted_buffers().contains(&shared));
        assert_eq!(backend.live_buffers(), 1);
        assert_eq!(backend.live_sources(), 0);
    }
}
