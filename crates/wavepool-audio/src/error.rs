use std::path::PathBuf;

use crate::backend::{BackendError, ErrorCode};
use crate::wav::WavError;

/// Errors that can occur in the audio system.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("Error occurred creating audio device: {0}")]
    DeviceOpen(#[source] BackendError),

    #[error("Error occurred creating audio context: {0}")]
    ContextCreate(#[source] BackendError),

    #[error("Error occurred making audio context current: {0}")]
    MakeCurrent(#[source] BackendError),

    #[error("failed to load audio file '{path}': {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: WavError,
    },

    #[error("error {operation}: {code}")]
    Backend {
        operation: &'static str,
        code: ErrorCode,
    },

    #[error("{operation} called on a sound with no source")]
    NotBound { operation: &'static str },
}
