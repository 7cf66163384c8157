//! Output target allocation for chunk files

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::OutputConfig;
use crate::error::{AppError, Result};

/// Writable destination for one chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    /// 1-based chunk index this target belongs to
    pub chunk_index: u32,
    pub path: PathBuf,
}

impl OutputTarget {
    pub fn new(chunk_index: u32, path: impl Into<PathBuf>) -> Self {
        Self {
            chunk_index,
            path: path.into(),
        }
    }
}

/// Allocates the output target for each chunk as it starts
pub trait OutputAllocator: Send {
    fn allocate(&mut self, chunk_index: u32) -> Result<OutputTarget>;
}

impl<F> OutputAllocator for F
where
    F: FnMut(u32) -> Result<OutputTarget> + Send,
{
    fn allocate(&mut self, chunk_index: u32) -> Result<OutputTarget> {
        self(chunk_index)
    }
}

/// Names chunk files `{prefix}{index}.{extension}` inside one directory
#[derive(Debug, Clone)]
pub struct DirectoryAllocator {
    directory: PathBuf,
    prefix: String,
    extension: String,
}

impl DirectoryAllocator {
    pub fn new(directory: impl Into<PathBuf>, prefix: &str, extension: &str) -> Self {
        Self {
            directory: directory.into(),
            prefix: prefix.to_string(),
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    pub fn from_config(config: &OutputConfig) -> Self {
        Self::new(&config.directory, &config.file_prefix, &config.extension)
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path a given chunk index maps to
    pub fn path_for(&self, chunk_index: u32) -> PathBuf {
        let name = if self.extension.is_empty() {
            format!("{}{}", self.prefix, chunk_index)
        } else {
            format!("{}{}.{}", self.prefix, chunk_index, self.extension)
        };
        self.directory.join(name)
    }
}

impl OutputAllocator for DirectoryAllocator {
    fn allocate(&mut self, chunk_index: u32) -> Result<OutputTarget> {
        std::fs::create_dir_all(&self.directory).map_err(|e| {
            AppError::OutputTarget(format!(
                "Failed to create output directory {}: {}",
                self.directory.display(),
                e
            ))
        })?;
        let path = self.path_for(chunk_index);
        debug!("Allocated output target {} for chunk {}", path.display(), chunk_index);
        Ok(OutputTarget::new(chunk_index, path))
    }
}
