//! Asset byte sources supplied by the host application

use std::fs;
use std::path::{Path, PathBuf};

/// Errors that can occur while opening a data source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("I/O error reading '{0}': {1}")]
    Io(PathBuf, #[source] std::io::Error),
}

/// Raw bytes of a loaded asset plus the path used when reporting problems with it.
pub trait DataSource {
    /// The complete asset contents.
    fn bytes(&self) -> &[u8];

    /// Path shown in diagnostics. Need not exist on disk.
    fn display_path(&self) -> &Path;
}

/// A data source backed by an owned byte vector
#[derive(Debug, Clone)]
pub struct MemorySource {
    bytes: Vec<u8>,
    path: PathBuf,
}

impl MemorySource {
    /// Wrap bytes that came from somewhere other than the filesystem
    /// (embedded resources, network, generated data).
    pub fn new(bytes: impl Into<Vec<u8>>, path: impl Into<PathBuf>) -> Self {
        Self {
            bytes: bytes.into(),
            path: path.into(),
        }
    }
}

impl DataSource for MemorySource {
    fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn display_path(&self) -> &Path {
        &self.path
    }
}

/// A data source read eagerly from a file on disk
#[derive(Debug, Clone)]
pub struct FileSource {
    bytes: Vec<u8>,
    path: PathBuf,
}

impl FileSource {
    /// Read the whole file into memory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();
        let bytes = fs::read(&path).map_err(|e| SourceError::Io(path.clone(), e))?;
        Ok(Self { bytes, path })
    }
}

impl DataSource for FileSource {
    fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn display_path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_source_exposes_bytes_and_path() {
        let source = MemorySource::new(vec![1u8, 2, 3], "embedded/click.wav");
        assert_eq!(source.bytes(), &[1, 2, 3]);
        assert_eq!(source.display_path(), Path::new("embedded/click.wav"));
    }

    #[test]
    fn missing_file_returns_error() {
        let result = FileSource::open("/nonexistent/definitely_missing.wav");
        match result {
            Err(SourceError::Io(path, _)) => {
                assert_eq!(path, PathBuf::from("/nonexistent/definitely_missing.wav"));
            }
            Ok(_) => panic!("expected an I/O error"),
        }
    }

    #[test]
    fn file_source_reads_whole_file() {
        let path = std::env::temp_dir().join(format!(
            "wavepool_core_source_test_{}.bin",
            std::process::id()
        ));
        fs::write(&path, b"RIFF....WAVE").unwrap();

        let source = FileSource::open(&path).unwrap();
        assert_eq!(source.bytes(), b"RIFF....WAVE");
        assert_eq!(source.display_path(), path.as_path());

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn sources_are_usable_as_trait_objects() {
        let sources: Vec<Box<dyn DataSource>> = vec![
            Box::new(MemorySource::new(vec![0u8; 4], "a.wav")),
            Box::new(MemorySource::new(vec![0u8; 8], "b.wav")),
        ];
        let total: usize = sources.iter().map(|s| s.bytes().len()).sum();
        assert_eq!(total, 12);
    }
}
