//! Configuration for spillstore
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

/// Default bound on simultaneously open backing-file handles
pub const DEFAULT_MAX_OPEN_HANDLES: usize = 10;

/// Default maximum size of one backing file (2 GiB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 2048 * 1024 * 1024;

/// Main configuration for a spillstore instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory for backing files. Required; `StorageManager::open` fails
    /// if it exists and is not a directory, or cannot be created.
    /// Internal structure:
    ///   {directory}/
    ///     └── stream_{id:06}_{seq:03}.spill   (one per stream/sequence pair)
    pub directory: PathBuf,

    // -------------------------------------------------------------------------
    // Resource Limits
    // -------------------------------------------------------------------------
    /// Max simultaneously open backing-file handles, process-wide
    pub max_open_handles: usize,

    /// Max size of one backing file before rotation (in bytes). A single
    /// batch larger than this still gets written, to a dedicated file,
    /// with a policy warning.
    pub max_file_size: u64,
}

impl Config {
    /// Create a config for the given backing directory, defaults elsewhere
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            max_open_handles: DEFAULT_MAX_OPEN_HANDLES,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }

    /// Create a new config builder rooted at the given directory
    pub fn builder(directory: impl Into<PathBuf>) -> ConfigBuilder {
        ConfigBuilder {
            config: Config::new(directory),
        }
    }
}

/// Builder for Config
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the bound on simultaneously open file handles
    pub fn max_open_handles(mut self, count: usize) -> Self {
        self.config.max_open_handles = count;
        self
    }

    /// Set the maximum backing file size (in bytes)
    pub fn max_file_size(mut self, size: u64) -> Self {
        self.config.max_file_size = size;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
