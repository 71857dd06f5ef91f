use std::sync::Arc;

use glam::Vec3;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};
use wavepool_core::DataSource;

use crate::backend::{
    drain_error, generation_failed, AudioBackend, BufferId, KiraBackend, SourceId, SourceState,
};
use crate::config::AudioConfig;
use crate::error::AudioError;
use crate::pool::{BufferTracker, SourceParams, SourcePool};
use crate::spatial::Listener;
use crate::wav::WavHeader;

/// Sources still bound to sounds that were dropped instead of destroyed.
pub(crate) type DropQueue = Arc<Mutex<Vec<SourceId>>>;

/// What [`AudioSystem::shutdown`] released. Only deletions the backend
/// accepted are counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub sources_deleted: usize,
    pub buffers_deleted: usize,
}

/// Owns the audio device and context, the source pool, and the buffers
/// created on behalf of sounds.
///
/// Handle calls are single-threaded: the system is not `Sync`-guarded and
/// must be driven from one thread.
pub struct AudioSystem<B: AudioBackend> {
    backend: B,
    config: AudioConfig,
    listener: Listener,
    sources: SourcePool,
    buffers: BufferTracker,
    dropped: DropQueue,
    init_error: Option<AudioError>,
    shut_down: bool,
}

impl AudioSystem<KiraBackend> {
    /// Start on the default output device with default configuration.
    pub fn with_default() -> Self {
        Self::init(KiraBackend::new(), AudioConfig::default())
    }
}

impl<B: AudioBackend> AudioSystem<B> {
    /// Open the device, create and attach a context, and place the listener.
    ///
    /// A failing step is logged and initialization carries on; resources
    /// acquired before the failure are kept. The failure is available from
    /// [`AudioSystem::init_error`], and later handle calls fail on their own.
    pub fn init(backend: B, config: AudioConfig) -> Self {
        let mut system = Self {
            backend,
            listener: config.listener,
            config,
            sources: SourcePool::new(),
            buffers: BufferTracker::default(),
            dropped: DropQueue::default(),
            init_error: None,
            shut_down: false,
        };

        match system.open() {
            Ok(()) => info!("Audio system initialized"),
            Err(e) => {
                error!("{e}");
                system.init_error = Some(e);
            }
        }

        system.apply_listener();
        system
    }

    fn open(&mut self) -> Result<(), AudioError> {
        self.backend.open_device().map_err(AudioError::DeviceOpen)?;
        self.backend
            .create_context()
            .map_err(AudioError::ContextCreate)?;
        self.backend
            .make_context_current(true)
            .map_err(AudioError::MakeCurrent)?;
        drain_error(&mut self.backend, "initializing audio")
    }

    fn apply_listener(&mut self) {
        let Listener {
            position,
            velocity,
            forward,
            up,
        } = self.listener;
        self.backend.set_listener_position(position);
        self.backend.set_listener_velocity(velocity);
        self.backend.set_listener_orientation(forward, up);
        self.backend.set_listener_gain(self.config.listener_gain());
    }

    /// The error that interrupted [`AudioSystem::init`], if any.
    pub fn init_error(&self) -> Option<&AudioError> {
        self.init_error.as_ref()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Delete every pooled source and every tracked buffer, then release the
    /// context and device. Calling it again does nothing.
    ///
    /// Sources still bound to live sounds are deleted too. Buffers created
    /// with [`AudioSystem::create_buffer`] belong to the caller and are left
    /// alone.
    pub fn shutdown(&mut self) -> ShutdownReport {
        if self.shut_down {
            return ShutdownReport::default();
        }
        self.shut_down = true;

        if let Some(code) = self.backend.take_error() {
            warn!("Pending audio error at shutdown: {code}");
        }
        self.dropped.lock().clear();

        // Sources go first so no buffer is still attached when it is deleted.
        let mut report = ShutdownReport::default();
        for source in self.sources.drain() {
            self.backend.stop_source(source);
            self.backend.delete_source(source);
            match self.backend.take_error() {
                None => report.sources_deleted += 1,
                Some(code) => warn!("Failed to delete {source}: {code}"),
            }
        }
        for buffer in self.buffers.drain() {
            self.backend.delete_buffer(buffer);
            match self.backend.take_error() {
                None => report.buffers_deleted += 1,
                Some(code) => warn!("Failed to delete {buffer}: {code}"),
            }
        }

        if let Err(e) = self.backend.make_context_current(false) {
            warn!("Failed to detach audio context: {e}");
        }
        self.backend.destroy_context();
        self.backend.close_device();
        if let Some(code) = self.backend.take_error() {
            warn!("Error while closing audio device: {code}");
        }

        info!(
            "Audio system shut down ({} sources, {} buffers deleted)",
            report.sources_deleted, report.buffers_deleted
        );
        report
    }

    // ---- Buffers ----

    /// Load a WAV asset into a new buffer owned by the caller.
    ///
    /// The caller deletes it with [`AudioSystem::destroy_buffer`]; it may be
    /// shared by any number of sounds.
    pub fn create_buffer(&mut self, data: &dyn DataSource) -> Result<BufferId, AudioError> {
        self.load_buffer(data)
            .inspect_err(|e| error!("{e} : trying to load {}", data.display_path().display()))
    }

    fn load_buffer(&mut self, data: &dyn DataSource) -> Result<BufferId, AudioError> {
        drain_error(&mut self.backend, "before loading wav")?;

        let bytes = data.bytes();
        let header = WavHeader::parse(bytes).map_err(|source| AudioError::Load {
            path: data.display_path().to_path_buf(),
            source,
        })?;

        let buffer = self
            .backend
            .gen_buffer()
            .ok_or_else(|| generation_failed(&mut self.backend, "generating buffer"))?;
        self.backend.buffer_data(
            buffer,
            header.format,
            header.samples(bytes),
            header.sample_rate,
        );
        if let Err(e) = drain_error(&mut self.backend, "uploading buffer data") {
            self.backend.delete_buffer(buffer);
            let _ = self.backend.take_error();
            return Err(e);
        }

        debug!(
            "Loaded {} as {buffer}: {:?}, {} Hz, {} bytes",
            data.display_path().display(),
            header.format,
            header.sample_rate,
            header.data_len
        );
        Ok(buffer)
    }

    /// Load a buffer that is deleted by [`AudioSystem::shutdown`].
    pub(crate) fn create_tracked_buffer(
        &mut self,
        data: &dyn DataSource,
    ) -> Result<BufferId, AudioError> {
        let buffer = self.create_buffer(data)?;
        self.buffers.track(buffer);
        Ok(buffer)
    }

    /// Delete a buffer.
    ///
    /// Pooled sources that are bound to it but not playing are unbound first.
    /// If a source is still playing it the deletion fails and a tracked
    /// buffer stays tracked.
    pub fn destroy_buffer(&mut self, buffer: BufferId) -> Result<(), AudioError> {
        self.try_destroy_buffer(buffer)
            .inspect_err(|e| error!("Failed to delete {buffer}: {e}"))
    }

    fn try_destroy_buffer(&mut self, buffer: BufferId) -> Result<(), AudioError> {
        drain_error(&mut self.backend, "before deleting buffer")?;
        self.reclaim_dropped();

        let idle: Vec<SourceId> = self
            .sources
            .released()
            .filter(|&s| {
                self.backend.source_buffer(s) == Some(buffer)
                    && self.backend.source_state(s).is_reusable()
            })
            .collect();
        for source in idle {
            self.backend.set_source_buffer(source, None);
        }
        // Unbinding is best effort; whatever is still attached fails below.
        let _ = self.backend.take_error();

        self.backend.delete_buffer(buffer);
        drain_error(&mut self.backend, "deleting buffer")?;

        if self.buffers.untrack(buffer) {
            debug!("{buffer} deleted by caller, no longer tracked");
        }
        Ok(())
    }

    /// Size in bytes of the samples held by `buffer`.
    pub fn buffer_size(&mut self, buffer: BufferId) -> Result<usize, AudioError> {
        drain_error(&mut self.backend, "before querying buffer")?;
        let size = self.backend.buffer_size(buffer);
        drain_error(&mut self.backend, "querying buffer size")?;
        Ok(size)
    }

    // ---- Sources ----

    pub(crate) fn acquire_source(&mut self, params: &SourceParams) -> Result<SourceId, AudioError> {
        self.reclaim_dropped();
        self.sources.acquire(&mut self.backend, params)
    }

    pub(crate) fn release_source(&mut self, source: SourceId) {
        self.sources.release(source);
    }

    /// Queue for sounds to hand back their source when dropped.
    pub(crate) fn drop_queue(&self) -> DropQueue {
        Arc::clone(&self.dropped)
    }

    /// Stop the sources of dropped sounds and return them to the pool.
    fn reclaim_dropped(&mut self) {
        let dropped = std::mem::take(&mut *self.dropped.lock());
        for source in dropped {
            if !self.sources.is_outstanding(source) {
                continue;
            }
            debug!("Reclaiming {source} from a dropped sound");
            self.backend.stop_source(source);
            self.sources.release(source);
        }
    }

    fn dropped_len(&self) -> usize {
        self.dropped
            .lock()
            .iter()
            .filter(|&&s| self.sources.is_outstanding(s))
            .count()
    }

    /// Number of sources waiting in the pool (playing or not), including
    /// those of dropped sounds not reclaimed yet.
    pub fn pooled_sources(&self) -> usize {
        self.sources.released_len() + self.dropped_len()
    }

    /// Number of sources currently bound to live sounds.
    pub fn bound_sources(&self) -> usize {
        self.sources.outstanding_len() - self.dropped_len()
    }

    /// Number of sources currently playing, bound or pooled. Playback
    /// completion is only observable by polling this.
    pub fn playing_sources(&mut self) -> usize {
        self.reclaim_dropped();
        self.sources
            .all()
            .filter(|&s| self.backend.source_state(s) == SourceState::Playing)
            .count()
    }

    /// Number of buffers that shutdown will delete.
    pub fn tracked_buffers(&self) -> usize {
        self.buffers.len()
    }

    // ---- Listener ----

    pub fn listener(&self) -> &Listener {
        &self.listener
    }

    pub fn set_listener_position(&mut self, position: Vec3) {
        self.listener.position = position;
        self.backend.set_listener_position(position);
    }

    pub fn set_listener_velocity(&mut self, velocity: Vec3) {
        self.listener.velocity = velocity;
        self.backend.set_listener_velocity(velocity);
    }

    pub fn set_listener_orientation(&mut self, forward: Vec3, up: Vec3) {
        self.listener.forward = forward;
        self.listener.up = up;
        self.backend.set_listener_orientation(forward, up);
    }

    /// Set the listener gain directly, bypassing the configured volumes.
    pub fn set_listener_gain(&mut self, gain: f32) {
        self.backend.set_listener_gain(gain);
    }

    /// Apply new volume settings at runtime. The listener placement is left as is.
    pub fn update_config(&mut self, config: AudioConfig) {
        self.backend.set_listener_gain(config.listener_gain());
        self.config = config;
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    // ---- Backend access ----

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

impl<B: AudioBackend> Drop for AudioSystem<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
