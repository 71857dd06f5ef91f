//! Wavepool Core - Host-facing types for the wavepool sound wrapper
//!
//! This crate provides the pieces the host application hands to the sound layer:
//! - Mathematical primitives (re-exported from glam)
//! - Data sources yielding raw asset bytes along with a display path

pub mod source;

pub use glam::Vec3;
pub use source::{DataSource, FileSource, MemorySource, SourceError};
