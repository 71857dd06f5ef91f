//! Wavepool - sample application for the wavepool sound wrapper
//!
//! Loads a stereo effect that owns its buffer and, optionally, a mono effect
//! whose buffer is shared by four positional sounds. Everything is played,
//! the program waits for playback to finish, and the audio system is shut
//! down.

mod settings;

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use glam::Vec3;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use wavepool_audio::{AudioBackend, AudioSystem, KiraBackend, SoftwareBackend, Sound};
use wavepool_core::FileSource;

use crate::settings::Settings;

/// How often playback state is polled while waiting.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Parser, Debug)]
#[command(name = "wavepool", about = "Play WAV effects through a pool of recycled sources")]
struct Cli {
    /// Stereo effect, played repeatedly with overlap.
    stereo: PathBuf,

    /// Mono effect shared by four sounds placed around the listener.
    #[arg(long)]
    mono: Option<PathBuf>,

    /// Audio backend to play through.
    #[arg(long, value_enum, default_value_t = BackendKind::Kira)]
    backend: BackendKind,

    /// Number of overlapping instances of the stereo effect.
    #[arg(long, default_value_t = 2)]
    repeat: u32,

    /// Stop waiting for playback after this many seconds.
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Write the settings in use to the settings file.
    #[arg(long)]
    save_settings: bool,

    /// Log debug output.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendKind {
    /// Default output device through kira.
    Kira,
    /// Silent simulation, advanced in step with the wall clock.
    Software,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")?;

    let settings = Settings::load();
    if cli.save_settings {
        settings.save()?;
    }
    let config = settings.audio.to_config();

    match cli.backend {
        BackendKind::Kira => {
            let audio = AudioSystem::init(KiraBackend::new(), config);
            run(audio, &cli, |_, elapsed| thread::sleep(elapsed))
        }
        BackendKind::Software => {
            let audio = AudioSystem::init(SoftwareBackend::new(), config);
            run(audio, &cli, |audio, elapsed| {
                thread::sleep(elapsed);
                audio.backend_mut().advance(elapsed);
            })
        }
    }
}

/// Trigger every sound, wait for playback to end, and tear down.
///
/// `wait` lets `elapsed` time pass for the backend.
fn run<B: AudioBackend>(
    mut audio: AudioSystem<B>,
    cli: &Cli,
    mut wait: impl FnMut(&mut AudioSystem<B>, Duration),
) -> Result<()> {
    if let Some(e) = audio.init_error() {
        warn!("Continuing without a working audio device: {e}");
    }

    // The effect owns its buffer; shutdown deletes it.
    let stereo = FileSource::open(&cli.stereo)?;
    let mut effect = Sound::load(&mut audio, &stereo).context("Failed to load stereo effect")?;

    // One shared buffer for four sounds; deleted by us below.
    let mut positional = Vec::new();
    let shared = match &cli.mono {
        Some(path) => {
            let mono = FileSource::open(path)?;
            let buffer = audio
                .create_buffer(&mono)
                .context("Failed to load mono effect")?;
            for position in [Vec3::Y, -Vec3::Y, -Vec3::X, Vec3::X] {
                let mut sound = Sound::new(buffer);
                sound.position = position;
                positional.push(sound);
            }
            Some(buffer)
        }
        None => None,
    };

    for _ in 0..cli.repeat {
        // Failures are logged where they happen; keep going like a host app would.
        let _ = effect.play(&mut audio, true);
        wait(&mut audio, Duration::from_millis(150));
    }
    for sound in &mut positional {
        let _ = sound.play(&mut audio, true);
        wait(&mut audio, Duration::from_millis(250));
    }

    let timeout = Duration::from_secs(cli.timeout);
    let mut waited = Duration::ZERO;
    loop {
        let playing = audio.playing_sources();
        if playing == 0 {
            break;
        }
        if waited >= timeout {
            warn!("{playing} source(s) still playing after {:?}", timeout);
            break;
        }
        wait(&mut audio, POLL_INTERVAL);
        waited += POLL_INTERVAL;
    }

    effect.destroy(&mut audio);
    for sound in positional {
        sound.destroy(&mut audio);
    }
    if let Some(buffer) = shared {
        let _ = audio.destroy_buffer(buffer);
    }

    let report = audio.shutdown();
    info!(
        "Done: {} source(s) and {} buffer(s) released",
        report.sources_deleted, report.buffers_deleted
    );
    Ok(())
}
