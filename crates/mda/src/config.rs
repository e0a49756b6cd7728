//! Configuration and runtime environment.
//!
//! [`MdaConfig`] holds the tunables. [`MdaEnv`] is built once from a config,
//! owns the cache directory, the checksum index and the cancellation flag,
//! and is shared by every array handle through an `Arc`.

use crate::error::Result;
use crate::materialize::CacheDir;
use crate::provenance::index::{ChecksumIndex, NoIndex};
use crate::remote::download::Interrupt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Default scalar cache chunk length (elements).
pub const DEFAULT_SCALAR_CHUNK_LEN: usize = 1_000_000;

/// Default number of elements fetched per remote request.
pub const DEFAULT_DOWNLOAD_CHUNK_SIZE: usize = 1_000_000;

/// Default number of parallel download workers.
pub const DEFAULT_DOWNLOAD_THREADS: usize = 4;

/// Default poll interval while waiting on a parallel download.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default prefix length hashed by the fast checksum.
pub const DEFAULT_FAST_CHECKSUM_BYTES: usize = 1000;

/// Environment variable overriding the cache root.
pub const TEMP_PATH_ENV: &str = "ALOPEX_MDA_TEMP_PATH";

/// Configuration for array access and materialization.
#[derive(Debug, Clone)]
pub struct MdaConfig {
    /// Root of the on-disk cache.
    pub temp_path: PathBuf,
    /// Elements held by the scalar access cache.
    pub scalar_chunk_len: usize,
    /// Elements fetched per remote request.
    pub download_chunk_size: usize,
    /// Worker threads for whole-file downloads.
    pub download_threads: usize,
    /// Interval between completion polls of a parallel download.
    pub poll_interval: Duration,
    /// Prefix length hashed by the fast checksum.
    pub fast_checksum_bytes: usize,
}

impl Default for MdaConfig {
    fn default() -> Self {
        Self {
            temp_path: std::env::temp_dir().join("alopex-mda"),
            scalar_chunk_len: DEFAULT_SCALAR_CHUNK_LEN,
            download_chunk_size: DEFAULT_DOWNLOAD_CHUNK_SIZE,
            download_threads: DEFAULT_DOWNLOAD_THREADS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            fast_checksum_bytes: DEFAULT_FAST_CHECKSUM_BYTES,
        }
    }
}

impl MdaConfig {
    /// Default configuration rooted at `temp_path`.
    pub fn with_temp_path(temp_path: impl Into<PathBuf>) -> Self {
        Self {
            temp_path: temp_path.into(),
            ..Self::default()
        }
    }

    /// Default configuration, with the cache root taken from
    /// `ALOPEX_MDA_TEMP_PATH` when set.
    pub fn from_env() -> Self {
        match std::env::var_os(TEMP_PATH_ENV) {
            Some(path) if !path.is_empty() => Self::with_temp_path(path),
            _ => Self::default(),
        }
    }
}

/// Runtime environment shared by array handles.
#[derive(Debug)]
pub struct MdaEnv {
    config: MdaConfig,
    cache: CacheDir,
    index: Box<dyn ChecksumIndex>,
    interrupt: Interrupt,
}

impl MdaEnv {
    /// Builds the environment, creating the cache root.
    ///
    /// Uses [`NoIndex`] until another index is attached with
    /// [`with_index`](Self::with_index).
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directories cannot be created.
    pub fn new(config: MdaConfig) -> Result<Self> {
        let cache = CacheDir::create(&config.temp_path)?;
        debug!("MdaEnv rooted at {:?}", cache.root());
        Ok(Self {
            config,
            cache,
            index: Box::new(NoIndex),
            interrupt: Interrupt::new(),
        })
    }

    /// Replaces the checksum index.
    pub fn with_index(mut self, index: impl ChecksumIndex + 'static) -> Self {
        self.index = Box::new(index);
        self
    }

    /// Wraps the environment for sharing between handles.
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Configuration in effect.
    pub fn config(&self) -> &MdaConfig {
        &self.config
    }

    /// Cache directory allocator.
    pub fn cache(&self) -> &CacheDir {
        &self.cache
    }

    /// Checksum index used for provenance resolution.
    pub fn index(&self) -> &dyn ChecksumIndex {
        self.index.as_ref()
    }

    /// Cancellation flag tested while waiting on long-running fetches.
    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }
}
