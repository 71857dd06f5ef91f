use std::collections::{HashSet, VecDeque};

use glam::Vec3;
use tracing::{debug, warn};

use crate::backend::{drain_error, generation_failed, AudioBackend, BufferId, SourceId};
use crate::error::AudioError;

/// Everything applied to a source when it is handed to a sound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceParams {
    pub buffer: BufferId,
    pub pitch: f32,
    pub gain: f32,
    pub position: Vec3,
    pub velocity: Vec3,
    pub looping: bool,
}

/// Recycles playback channels.
///
/// Released sources are queued in release order. Acquisition takes the first
/// queued source that is initial or stopped, so a source released while
/// still playing is skipped until it finishes. Only when no queued source is
/// free is a new one generated.
#[derive(Debug, Default)]
pub struct SourcePool {
    released: VecDeque<SourceId>,
    outstanding: HashSet<SourceId>,
}

impl SourcePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out a free source configured with `params`.
    pub fn acquire<B: AudioBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        params: &SourceParams,
    ) -> Result<SourceId, AudioError> {
        drain_error(backend, "before getting source")?;

        let free = self
            .released
            .iter()
            .position(|&s| backend.source_state(s).is_reusable());
        let reused = free.and_then(|index| self.released.remove(index));

        let source = match reused {
            Some(source) => {
                debug!("Reusing {source}");
                source
            }
            None => {
                let source = backend
                    .gen_source()
                    .ok_or_else(|| generation_failed(backend, "generating source"))?;
                debug!("Created {source}");
                source
            }
        };

        backend.set_source_buffer(source, Some(params.buffer));
        apply_playback_params(backend, source, params);
        if let Err(e) = drain_error(backend, "setting source parameters") {
            // Keep the name so it is reused or deleted later.
            self.released.push_back(source);
            return Err(e);
        }

        self.outstanding.insert(source);
        Ok(source)
    }

    /// Return a source to the back of the queue. The native source is kept.
    pub fn release(&mut self, source: SourceId) {
        if self.released.contains(&source) {
            warn!("{source} released twice, ignoring");
            return;
        }
        self.outstanding.remove(&source);
        self.released.push_back(source);
    }

    /// Queued sources, oldest release first.
    pub fn released(&self) -> impl Iterator<Item = SourceId> + '_ {
        self.released.iter().copied()
    }

    pub fn released_len(&self) -> usize {
        self.released.len()
    }

    /// Sources handed out and not yet released.
    pub fn outstanding_len(&self) -> usize {
        self.outstanding.len()
    }

    pub fn is_outstanding(&self, source: SourceId) -> bool {
        self.outstanding.contains(&source)
    }

    /// Every source the pool knows of, released or not.
    pub fn all(&self) -> impl Iterator<Item = SourceId> + '_ {
        self.released
            .iter()
            .chain(self.outstanding.iter())
            .copied()
    }

    /// Empty the pool, returning every source it knows of exactly once.
    pub fn drain(&mut self) -> Vec<SourceId> {
        let mut all: Vec<SourceId> = self.released.drain(..).collect();
        let mut outstanding: Vec<SourceId> = self.outstanding.drain().collect();
        outstanding.sort();
        all.extend(outstanding);
        all
    }
}

/// Everything but the buffer binding, which cannot change while a source plays.
pub(crate) fn apply_playback_params<B: AudioBackend + ?Sized>(
    backend: &mut B,
    source: SourceId,
    params: &SourceParams,
) {
    backend.set_source_pitch(source, params.pitch);
    backend.set_source_gain(source, params.gain);
    backend.set_source_position(source, params.position);
    backend.set_source_velocity(source, params.velocity);
    backend.set_source_looping(source, params.looping);
}

/// Buffers created on behalf of sounds, deleted together at shutdown.
#[derive(Debug, Default)]
pub struct BufferTracker {
    buffers: VecDeque<BufferId>,
}

impl BufferTracker {
    pub fn track(&mut self, buffer: BufferId) {
        if !self.buffers.contains(&buffer) {
            self.buffers.push_back(buffer);
        }
    }

    /// Stop tracking `buffer`. Returns whether it was tracked.
    pub fn untrack(&mut self, buffer: BufferId) -> bool {
        let before = self.buffers.len();
        self.buffers.retain(|&b| b != buffer);
        self.buffers.len() != before
    }

    pub fn contains(&self, buffer: BufferId) -> bool {
        self.buffers.contains(&buffer)
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn drain(&mut self) -> Vec<BufferId> {
        self.buffers.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::backend::{ErrorCode, SoftwareBackend, SourceState};
    use crate::wav::PcmFormat;

    fn ready() -> (SoftwareBackend, BufferId) {
        let mut backend = SoftwareBackend::new();
        backend.open_device().unwrap();
        backend.create_context().unwrap();
        backend.make_context_current(true).unwrap();
        let buffer = backend.gen_buffer().unwrap();
        backend.buffer_data(buffer, PcmFormat::Mono8, &[128u8; 1_000], 1_000);
        (backend, buffer)
    }

    fn params(buffer: BufferId) -> SourceParams {
        SourceParams {
            buffer,
            pitch: 1.5,
            gain: 0.25,
            position: Vec3::new(1.0, 2.0, 3.0),
            velocity: Vec3::new(0.0, 0.0, -1.0),
            looping: true,
        }
    }

    #[test]
    fn acquire_release_acquire_reuses_source() {
        let (mut backend, buffer) = ready();
        let mut pool = SourcePool::new();

        let first = pool.acquire(&mut backend, &params(buffer)).unwrap();
        pool.release(first);
        let second = pool.acquire(&mut backend, &params(buffer)).unwrap();

        assert_eq!(first, second);
        assert_eq!(backend.created_sources().len(), 1);
        assert_eq!(pool.released_len(), 0);
        assert_eq!(pool.outstanding_len(), 1);
    }

    #[test]
    fn acquisition_applies_parameters() {
        let (mut backend, buffer) = ready();
        let mut pool = SourcePool::new();
        let source = pool.acquire(&mut backend, &params(buffer)).unwrap();

        let applied = backend.source(source).unwrap();
        assert_eq!(applied.buffer, Some(buffer));
        assert_eq!(applied.pitch, 1.5);
        assert_eq!(applied.gain, 0.25);
        assert_eq!(applied.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(applied.velocity, Vec3::new(0.0, 0.0, -1.0));
        assert!(applied.looping);
    }

    #[test]
    fn playing_sources_are_skipped() {
        let (mut backend, buffer) = ready();
        let mut pool = SourcePool::new();

        let busy = pool.acquire(&mut backend, &params(buffer)).unwrap();
        backend.play_source(busy);
        pool.release(busy);

        let fresh = pool.acquire(&mut backend, &params(buffer)).unwrap();
        assert_ne!(busy, fresh);
        assert_eq!(backend.source_state(busy), SourceState::Playing);
        assert_eq!(pool.released().collect::<Vec<_>>(), vec![busy]);
    }

    #[test]
    fn first_free_source_in_release_order_wins() {
        let (mut backend, buffer) = ready();
        let mut pool = SourcePool::new();
        let once = SourceParams {
            looping: false,
            ..params(buffer)
        };

        let a = pool.acquire(&mut backend, &once).unwrap();
        let b = pool.acquire(&mut backend, &once).unwrap();
        let c = pool.acquire(&mut backend, &once).unwrap();
        backend.play_source(a);
        pool.release(a);
        pool.release(b);
        pool.release(c);

        // `a` is still playing, so `b` is the first free one.
        assert_eq!(pool.acquire(&mut backend, &once).unwrap(), b);

        // Once `a` finishes it is first in line again.
        backend.advance(Duration::from_secs(2));
        assert_eq!(pool.acquire(&mut backend, &once).unwrap(), a);
        assert_eq!(pool.acquire(&mut backend, &once).unwrap(), c);
    }

    #[test]
    fn stale_error_aborts_acquisition() {
        let (mut backend, buffer) = ready();
        let mut pool = SourcePool::new();
        backend.inject_error(ErrorCode::InvalidEnum);

        let result = pool.acquire(&mut backend, &params(buffer));
        assert!(matches!(
            result,
            Err(AudioError::Backend {
                code: ErrorCode::InvalidEnum,
                ..
            })
        ));
        assert!(backend.created_sources().is_empty());

        // The flag was drained, so the next attempt succeeds.
        assert!(pool.acquire(&mut backend, &params(buffer)).is_ok());
    }

    #[test]
    fn exhausted_backend_reports_out_of_memory() {
        let (backend, buffer) = ready();
        let mut backend = backend.with_source_limit(0);
        let mut pool = SourcePool::new();
        let result = pool.acquire(&mut backend, &params(buffer));
        assert!(matches!(
            result,
            Err(AudioError::Backend {
                code: ErrorCode::OutOfMemory,
                ..
            })
        ));
    }

    #[test]
    fn bad_parameters_keep_the_source_in_the_pool() {
        let (mut backend, buffer) = ready();
        let mut pool = SourcePool::new();
        let bad = SourceParams {
            pitch: 0.0,
            ..params(buffer)
        };
        assert!(pool.acquire(&mut backend, &bad).is_err());
        assert_eq!(pool.released_len(), 1);
        assert_eq!(pool.outstanding_len(), 0);
    }

    #[test]
    fn double_release_is_ignored() {
        let (mut backend, buffer) = ready();
        let mut pool = SourcePool::new();
        let source = pool.acquire(&mut backend, &params(buffer)).unwrap();
        pool.release(source);
        pool.release(source);
        assert_eq!(pool.drain(), vec![source]);
    }

    #[test]
    fn drain_returns_released_and_outstanding() {
        let (mut backend, buffer) = ready();
        let mut pool = SourcePool::new();
        let kept = pool.acquire(&mut backend, &params(buffer)).unwrap();
        let returned = pool.acquire(&mut backend, &params(buffer)).unwrap();
        pool.release(returned);

        assert_eq!(pool.drain(), vec![returned, kept]);
        assert_eq!(pool.released_len(), 0);
        assert_eq!(pool.outstanding_len(), 0);
    }

    #[test]
    fn tracker_deduplicates() {
        let (mut backend, _) = ready();
        let a = backend.gen_buffer().unwrap();
        let b = backend.gen_buffer().unwrap();
        let mut tracker = BufferTracker::default();
        tracker.track(a);
        tracker.track(b);
        tracker.track(a);
        assert_eq!(tracker.len(), 2);
        assert!(tracker.untrack(a));
        assert!(!tracker.untrack(a));
        assert_eq!(tracker.drain(), vec![b]);
        assert!(tracker.is_empty());
    }
}
