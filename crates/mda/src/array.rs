//! Virtual arrays: one handle over memory, local files and remote hosts.
//!
//! A [`VirtualArray`] exposes the same dimension, reshape, chunk and scalar
//! operations whatever backs it:
//!
//! - **Memory**: an owned [`Mda`]; chunk reads support arbitrary sub-blocks.
//! - **LocalFile**: an `.mda` file opened on first use; multi-dimensional
//!   chunk reads must span the leading dimensions fully.
//! - **Remote**: a [`RemoteArray`] session with the same restriction and at
//!   most three dimensions.
//!
//! Reads take `&self`. The open file, the lazily read header and the scalar
//! cache are per-handle transient state behind `RefCell`, so a handle is
//! `Send` but not `Sync`: share one across threads behind a lock, or give
//! each thread its own clone. Cloning copies the content description
//! (path, header, buffer, provenance) and resets the transient state.
//!
//! # Example
//!
//! ```rust,ignore
//! use alopex_mda::{MdaConfig, MdaEnv, VirtualArray};
//!
//! let env = MdaEnv::new(MdaConfig::from_env())?.shared();
//! let array = VirtualArray::open("/data/firings.mda", env)?;
//!
//! let block = array.read_chunk_2d(0, 100, array.n1(), 50)?;
//! let x = array.value2(2, 1000);
//! ```

use crate::chunk::{linear_range_2d, linear_range_3d, LocalFile};
use crate::config::MdaEnv;
use crate::error::{MdaError, Result};
use crate::format::{text, MdaHeader, Sample, MAX_DIMS};
use crate::materialize::materialize;
use crate::mda::{pad_dims, Mda, Mda32};
use crate::provenance::{resolve, Provenance};
use crate::remote::{ByteSource, RemoteArray};
use crate::scalar_cache::ScalarCache;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Which storage strategy backs a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Owned in-memory buffer.
    Memory,
    /// Local `.mda` file.
    LocalFile,
    /// Remotely hosted `.mda` file.
    Remote,
}

#[derive(Debug)]
enum Backend {
    Memory(Mda),
    LocalFile(LocalFile),
    Remote(RemoteArray),
}

impl Backend {
    fn kind(&self) -> BackendKind {
        match self {
            Self::Memory(_) => BackendKind::Memory,
            Self::LocalFile(_) => BackendKind::LocalFile,
            Self::Remote(_) => BackendKind::Remote,
        }
    }

    fn detached(&self) -> Self {
        match self {
            Self::Memory(mda) => Self::Memory(mda.clone()),
            Self::LocalFile(file) => Self::LocalFile(file.detached()),
            Self::Remote(remote) => Self::Remote(remote.detached()),
        }
    }

    fn dims(&mut self) -> Result<[usize; MAX_DIMS]> {
        match self {
            Self::Memory(mda) => Ok(mda.dims()),
            Self::LocalFile(file) => Ok(file.header()?.dims),
            Self::Remote(remote) => remote.dims(),
        }
    }

    fn reshape(&mut self, dims: [usize; MAX_DIMS]) -> Result<()> {
        match self {
            Self::Memory(mda) => mda.reshape(&dims),
            Self::LocalFile(file) => {
                let header = file.header_mut()?;
                let current = header.total_size();
                if dims.iter().product::<usize>() != current {
                    return Err(MdaError::ReshapeSizeMismatch {
                        current,
                        proposed: dims.to_vec(),
                    });
                }
                header.dims = dims;
                Ok(())
            }
            Self::Remote(remote) => remote.reshape(dims),
        }
    }

    /// Linear read into a zero-filled buffer. Memory copies directly.
    fn read_linear<T: Sample>(&mut self, start: i64, out: &mut [T]) -> Result<()> {
        match self {
            Self::Memory(mda) => {
                let chunk = mda.get_chunk(start, out.len());
                for (slot, &value) in out.iter_mut().zip(chunk.as_slice()) {
                    *slot = T::from_f64(value);
                }
                Ok(())
            }
            Self::LocalFile(file) => file.read_entries(start, out),
            Self::Remote(remote) => remote.read_entries(start, out),
        }
    }
}

/// Handle over a multi-dimensional numeric array.
#[derive(Debug)]
pub struct VirtualArray {
    env: Arc<MdaEnv>,
    backend: RefCell<Option<Backend>>,
    provenance: Option<Provenance>,
    reshaped: bool,
    cache: RefCell<ScalarCache>,
}

impl Clone for VirtualArray {
    fn clone(&self) -> Self {
        Self {
            env: Arc::clone(&self.env),
            backend: RefCell::new(self.backend.borrow().as_ref().map(Backend::detached)),
            provenance: self.provenance.clone(),
            reshaped: self.reshaped,
            cache: RefCell::new(ScalarCache::new(self.env.config().scalar_chunk_len)),
        }
    }
}

impl VirtualArray {
    /// Creates an empty handle with no backend.
    pub fn new(env: Arc<MdaEnv>) -> Self {
        let chunk_len = env.config().scalar_chunk_len;
        Self {
            env,
            backend: RefCell::new(None),
            provenance: None,
            reshaped: false,
            cache: RefCell::new(ScalarCache::new(chunk_len)),
        }
    }

    /// Creates a handle for a path or URL. See [`set_path`](Self::set_path).
    ///
    /// # Errors
    ///
    /// Same as [`set_path`](Self::set_path).
    pub fn open(path: impl AsRef<Path>, env: Arc<MdaEnv>) -> Result<Self> {
        let mut array = Self::new(env);
        array.set_path(path)?;
        Ok(array)
    }

    /// Adopts an in-memory array.
    pub fn from_mda(mda: Mda, env: Arc<MdaEnv>) -> Self {
        let array = Self::new(env);
        array.backend.replace(Some(Backend::Memory(mda)));
        array
    }

    /// Creates a handle from a provenance descriptor, resolving it to a
    /// local file.
    ///
    /// # Errors
    ///
    /// Returns `MdaError::ResolutionFailed` when no verified file is found.
    pub fn from_provenance(prv: Provenance, env: Arc<MdaEnv>) -> Result<Self> {
        let mut array = Self::new(env);
        array.provenance = Some(prv);
        array.resolve_attached()?;
        Ok(array)
    }

    /// Creates a Remote handle over an arbitrary byte source.
    pub fn from_remote(url: &str, source: Arc<dyn ByteSource>, env: Arc<MdaEnv>) -> Self {
        let chunk = env.config().download_chunk_size;
        let array = Self::new(env);
        array
            .backend
            .replace(Some(Backend::Remote(RemoteArray::new(url, source, chunk))));
        array
    }

    /// Points the handle at a new path, resetting all transient state.
    ///
    /// - `http://` and `https://` URLs select the Remote backend.
    /// - `.txt` and `.csv` files are parsed eagerly into the Memory backend.
    /// - `.prv` files are parsed, attached, and resolved to a local file.
    /// - Anything else selects the LocalFile backend, opened on first use.
    ///
    /// The attached provenance is kept unless a `.prv` replaces it.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed URLs, unreadable text arrays, or
    /// descriptors that cannot be parsed or resolved. The handle is left
    /// without a backend in that case.
    pub fn set_path(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.backend.replace(None);
        self.cache.borrow_mut().invalidate();
        self.reshaped = false;

        let backend = match path.to_str() {
            Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
                let remote = RemoteArray::http(url, self.env.config().download_chunk_size)
                    .inspect_err(|e| warn!("Invalid remote array {}: {}", url, e))?;
                Backend::Remote(remote)
            }
            _ if text::is_text_path(path) => {
                let mda = text::read_text(path)
                    .inspect_err(|e| warn!("Failed to load text array {:?}: {}", path, e))?;
                Backend::Memory(mda)
            }
            _ if has_extension(path, "prv") => {
                let prv = Provenance::from_file(path)
                    .inspect_err(|e| warn!("Failed to read descriptor {:?}: {}", path, e))?;
                self.provenance = Some(prv);
                return self.resolve_attached();
            }
            _ => Backend::LocalFile(LocalFile::new(path)),
        };

        debug!("Array handle set to {:?} ({:?})", path, backend.kind());
        self.backend.replace(Some(backend));
        Ok(())
    }

    fn resolve_attached(&mut self) -> Result<()> {
        let Some(prv) = &self.provenance else {
            return Err(MdaError::NoBackend);
        };
        let resolved = resolve(prv, self.env.index())?;
        self.set_path(resolved)
    }

    /// Entries fetched per request by a Remote backend.
    pub fn download_chunk_size(&self) -> Option<usize> {
        match self.backend.borrow().as_ref()? {
            Backend::Remote(remote) => Some(remote.download_chunk_size()),
            _ => None,
        }
    }

    /// Sets the entries fetched per request by a Remote backend. Other
    /// backends ignore it.
    pub fn set_download_chunk_size(&mut self, size: usize) {
        if let Some(Backend::Remote(remote)) = self.backend.get_mut().as_mut() {
            remote.set_download_chunk_size(size);
        }
    }

    /// Attaches a provenance descriptor without changing the backend.
    pub fn set_provenance(&mut self, prv: Provenance) {
        self.provenance = Some(prv);
    }

    /// Attached provenance descriptor, if any.
    pub fn provenance(&self) -> Option<&Provenance> {
        self.provenance.as_ref()
    }

    /// Runtime environment of the handle.
    pub fn env(&self) -> &Arc<MdaEnv> {
        &self.env
    }

    /// Backend kind, or `None` for an empty handle.
    pub fn backend_kind(&self) -> Option<BackendKind> {
        self.backend.borrow().as_ref().map(Backend::kind)
    }

    /// Local path or URL backing the handle. `None` for Memory and empty handles.
    pub fn path(&self) -> Option<PathBuf> {
        match self.backend.borrow().as_ref()? {
            Backend::Memory(_) => None,
            Backend::LocalFile(file) => Some(file.path().to_path_buf()),
            Backend::Remote(remote) => Some(PathBuf::from(remote.url())),
        }
    }

    /// True once the dimensions were changed after construction.
    pub fn is_reshaped(&self) -> bool {
        self.reshaped
    }

    /// All six dimensions.
    ///
    /// # Errors
    ///
    /// Returns `MdaError::NoBackend` for an empty handle, or the open error
    /// of the backend.
    pub fn dims(&self) -> Result<[usize; MAX_DIMS]> {
        match self.backend.borrow_mut().as_mut() {
            Some(backend) => backend.dims(),
            None => Err(MdaError::NoBackend),
        }
    }

    /// 1-based dimension query. `dim == 0` is 0, beyond six is 1.
    ///
    /// An unreadable array reports 0 for every dimension.
    pub fn n(&self, dim: usize) -> usize {
        match dim {
            0 => 0,
            1..=MAX_DIMS => self.dims().map(|dims| dims[dim - 1]).unwrap_or(0),
            _ => 1,
        }
    }

    /// First dimension.
    pub fn n1(&self) -> usize {
        self.n(1)
    }

    /// Second dimension.
    pub fn n2(&self) -> usize {
        self.n(2)
    }

    /// Third dimension.
    pub fn n3(&self) -> usize {
        self.n(3)
    }

    /// Product of all six dimensions, 0 when unreadable.
    pub fn total_size(&self) -> usize {
        self.dims().map(|dims| dims.iter().product()).unwrap_or(0)
    }

    /// Header of a LocalFile or Remote handle, reflecting any reshape.
    pub fn header(&self) -> Option<MdaHeader> {
        match self.backend.borrow_mut().as_mut()? {
            Backend::Memory(_) => None,
            Backend::LocalFile(file) => file.header().ok().cloned(),
            Backend::Remote(remote) => remote.header().ok().cloned(),
        }
    }

    /// Changes the dimensions in place.
    ///
    /// # Errors
    ///
    /// Returns `MdaError::ReshapeSizeMismatch` when the product differs from
    /// `total_size()`. Remote handles also reject targets with more than
    /// three dimensions. The shape is unchanged on failure.
    pub fn reshape(&mut self, dims: &[usize]) -> Result<()> {
        let padded = pad_dims(dims)?;
        let result = match self.backend.get_mut().as_mut() {
            Some(backend) => backend.reshape(padded),
            None => Err(MdaError::NoBackend),
        };
        match &result {
            Ok(()) => self.reshaped = true,
            Err(e) => warn!("Reshape to {:?} failed: {}", dims, e),
        }
        result
    }

    /// Copy reshaped to `dims`, or an unchanged copy when that fails.
    pub fn reshaped(&self, dims: &[usize]) -> Self {
        let mut copy = self.clone();
        if copy.reshape(dims).is_err() {
            return self.clone();
        }
        copy
    }

    /// Reads `size` entries starting at linear index `i`.
    ///
    /// The result always holds `size` entries; positions outside
    /// `[0, total_size())` are zero.
    ///
    /// # Errors
    ///
    /// Returns the backend open error or `MdaError::ShortRead`.
    pub fn read_chunk(&self, i: i64, size: usize) -> Result<Mda> {
        self.read_chunk_as(i, size)
    }

    /// [`read_chunk`](Self::read_chunk) keeping float32 storage at 32 bits.
    ///
    /// # Errors
    ///
    /// Same as [`read_chunk`](Self::read_chunk).
    pub fn read_chunk_f32(&self, i: i64, size: usize) -> Result<Mda32> {
        self.read_chunk_as(i, size)
    }

    /// [`read_chunk`](Self::read_chunk) into any sample type.
    ///
    /// # Errors
    ///
    /// Same as [`read_chunk`](Self::read_chunk).
    pub fn read_chunk_as<T: Sample>(&self, i: i64, size: usize) -> Result<Mda<T>> {
        let mut out = Mda::new([size, 1, 1, 1, 1, 1]);
        self.read_linear(i, out.as_mut_slice())?;
        Ok(out)
    }

    /// Reads a `size1 x size2` block at `(i1, i2)`.
    ///
    /// LocalFile and Remote handles require `i1 == 0` and `size1 == N1`.
    /// Positions outside the array are zero.
    ///
    /// # Errors
    ///
    /// Returns `MdaError::UnsupportedRangeShape` for other shapes, plus the
    /// errors of [`read_chunk`](Self::read_chunk).
    pub fn read_chunk_2d(&self, i1: i64, i2: i64, size1: usize, size2: usize) -> Result<Mda> {
        self.read_chunk_2d_as(i1, i2, size1, size2)
    }

    /// [`read_chunk_2d`](Self::read_chunk_2d) into any sample type.
    ///
    /// # Errors
    ///
    /// Same as [`read_chunk_2d`](Self::read_chunk_2d).
    pub fn read_chunk_2d_as<T: Sample>(
        &self,
        i1: i64,
        i2: i64,
        size1: usize,
        size2: usize,
    ) -> Result<Mda<T>> {
        if let Some(Backend::Memory(mda)) = self.backend.borrow().as_ref() {
            return Ok(mda.get_chunk2(i1, i2, size1, size2).cast());
        }
        let dims = self.dims()?;
        let span = linear_range_2d(&dims, (i1, i2), (size1, size2))
            .inspect_err(|e| warn!("{}", e))?;
        let mut out = Mda::new([size1, size2, 1, 1, 1, 1]);
        if let Some((start, offset, len)) = span {
            self.read_linear(start as i64, &mut out.as_mut_slice()[offset..offset + len])?;
        }
        Ok(out)
    }

    /// Reads a `size1 x size2 x size3` block at `(i1, i2, i3)`.
    ///
    /// LocalFile and Remote handles require `i1 == i2 == 0`, `size1 == N1`
    /// and `size2 == N2`. Positions outside the array are zero.
    ///
    /// # Errors
    ///
    /// Same as [`read_chunk_2d`](Self::read_chunk_2d).
    pub fn read_chunk_3d(
        &self,
        (i1, i2, i3): (i64, i64, i64),
        (size1, size2, size3): (usize, usize, usize),
    ) -> Result<Mda> {
        self.read_chunk_3d_as((i1, i2, i3), (size1, size2, size3))
    }

    /// [`read_chunk_3d`](Self::read_chunk_3d) into any sample type.
    ///
    /// # Errors
    ///
    /// Same as [`read_chunk_2d`](Self::read_chunk_2d).
    pub fn read_chunk_3d_as<T: Sample>(
        &self,
        (i1, i2, i3): (i64, i64, i64),
        (size1, size2, size3): (usize, usize, usize),
    ) -> Result<Mda<T>> {
        if let Some(Backend::Memory(mda)) = self.backend.borrow().as_ref() {
            return Ok(mda.get_chunk3(i1, i2, i3, size1, size2, size3).cast());
        }
        let dims = self.dims()?;
        let span = linear_range_3d(&dims, (i1, i2, i3), (size1, size2, size3))
            .inspect_err(|e| warn!("{}", e))?;
        let mut out = Mda::new([size1, size2, size3, 1, 1, 1]);
        if let Some((start, offset, len)) = span {
            self.read_linear(start as i64, &mut out.as_mut_slice()[offset..offset + len])?;
        }
        Ok(out)
    }

    fn read_linear<T: Sample>(&self, start: i64, out: &mut [T]) -> Result<()> {
        let mut backend = self.backend.borrow_mut();
        let Some(backend) = backend.as_mut() else {
            return Err(MdaError::NoBackend);
        };
        backend.read_linear(start, out).inspect_err(|e| {
            warn!(
                "Chunk read of {} entries at {} failed: {}",
                out.len(),
                start,
                e
            )
        })
    }

    /// Entry at linear index `i`; 0.0 when out of range or unreadable.
    ///
    /// LocalFile and Remote reads go through the scalar cache.
    pub fn value(&self, i: i64) -> f64 {
        if let Some(Backend::Memory(mda)) = self.backend.borrow().as_ref() {
            return mda.value(i);
        }
        let total = self.total_size();
        if i < 0 || i as u64 >= total as u64 {
            return 0.0;
        }
        let result = self.cache.borrow_mut().get(i as usize, total, |start, len| {
            self.read_chunk(start as i64, len).map(Mda::into_vec)
        });
        result.unwrap_or_else(|e| {
            warn!("Scalar read at {} failed: {}", i, e);
            0.0
        })
    }

    /// Entry at `(i1, i2)`; 0.0 when any index is out of range.
    pub fn value2(&self, i1: i64, i2: i64) -> f64 {
        let Ok(dims) = self.dims() else {
            return 0.0;
        };
        if !in_range(i1, dims[0]) || !in_range(i2, dims[1]) {
            return 0.0;
        }
        self.value(i1 + dims[0] as i64 * i2)
    }

    /// Entry at `(i1, i2, i3)`; 0.0 when any index is out of range.
    pub fn value3(&self, i1: i64, i2: i64, i3: i64) -> f64 {
        let Ok(dims) = self.dims() else {
            return 0.0;
        };
        if !in_range(i1, dims[0]) || !in_range(i2, dims[1]) || !in_range(i3, dims[2]) {
            return 0.0;
        }
        let (n1, n2) = (dims[0] as i64, dims[1] as i64);
        self.value(i1 + n1 * (i2 + n2 * i3))
    }

    /// Durable local path for the array.
    ///
    /// Memory content is materialized once into the cache under a checksum
    /// name; LocalFile returns its path; Remote downloads the file once into
    /// the long-term cache.
    ///
    /// # Errors
    ///
    /// Returns `MdaError::NoBackend` for an empty handle, or the
    /// materialization or download error.
    pub fn make_path(&self) -> Result<PathBuf> {
        self.make_path_with(|| {})
    }

    /// [`make_path`](Self::make_path) calling `on_poll` while a remote
    /// download is in progress.
    ///
    /// # Errors
    ///
    /// Same as [`make_path`](Self::make_path), plus `MdaError::Interrupted`.
    pub fn make_path_with<F: FnMut()>(&self, on_poll: F) -> Result<PathBuf> {
        let mut backend = self.backend.borrow_mut();
        match backend.as_mut() {
            Some(Backend::Memory(mda)) => Ok(materialize(mda, self.env.cache())?.path),
            Some(Backend::LocalFile(file)) => Ok(file.path().to_path_buf()),
            Some(Backend::Remote(remote)) => remote.make_path(
                self.env.cache(),
                self.env.config(),
                self.env.interrupt(),
                on_poll,
            ),
            None => Err(MdaError::NoBackend),
        }
    }

    /// Attached descriptor, or one derived from the materialized file.
    ///
    /// # Errors
    ///
    /// Returns the [`make_path`](Self::make_path) error, or an I/O error
    /// while hashing.
    pub fn to_provenance(&self) -> Result<Provenance> {
        if let Some(prv) = &self.provenance {
            return Ok(prv.clone());
        }
        let path = self.make_path()?;
        Provenance::for_file(&path, self.env.config().fast_checksum_bytes)
    }
}

fn in_range(i: i64, dim: usize) -> bool {
    i >= 0 && (i as u64) < dim as u64
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MdaConfig;
    use tempfile::TempDir;

    fn env(dir: &Path, chunk_len: usize) -> Arc<MdaEnv> {
        let config = MdaConfig {
            scalar_chunk_len: chunk_len,
            ..MdaConfig::with_temp_path(dir.join("cache"))
        };
        MdaEnv::new(config).unwrap().shared()
    }

    fn ramp(dims: &[usize]) -> Mda {
        let total: usize = dims.iter().product();
        Mda::from_vec(dims, (0..total).map(|i| i as f64).collect()).unwrap()
    }

    #[test]
    fn test_empty_handle() {
        let temp_dir = TempDir::new().unwrap();
        let array = VirtualArray::new(env(temp_dir.path(), 4));
        assert_eq!(array.backend_kind(), None);
        assert_eq!(array.n(1), 0);
        assert_eq!(array.n(7), 1);
        assert_eq!(array.total_size(), 0);
        assert_eq!(array.value(0), 0.0);
        assert!(matches!(array.read_chunk(0, 3), Err(MdaError::NoBackend)));
    }

    #[test]
    fn test_backend_dispatch() {
        let temp_dir = TempDir::new().unwrap();
        let env = env(temp_dir.path(), 4);

        let csv = temp_dir.path().join("a.csv");
        std::fs::write(&csv, "1,2\n3,4\n").unwrap();
        let array = VirtualArray::open(&csv, env.clone()).unwrap();
        assert_eq!(array.backend_kind(), Some(BackendKind::Memory));
        assert_eq!(array.value2(1, 0), 3.0);

        let array = VirtualArray::open(temp_dir.path().join("b.mda"), env.clone()).unwrap();
        assert_eq!(array.backend_kind(), Some(BackendKind::LocalFile));

        let array = VirtualArray::open("https://example.com/c.mda", env.clone()).unwrap();
        assert_eq!(array.backend_kind(), Some(BackendKind::Remote));
        assert_eq!(
            array.path(),
            Some(PathBuf::from("https://example.com/c.mda"))
        );

        let missing = VirtualArray::open(temp_dir.path().join("d.csv"), env);
        assert!(missing.is_err());
    }

    #[test]
    fn test_memory_reads_general_blocks() {
        let temp_dir = TempDir::new().unwrap();
        let array = VirtualArray::from_mda(ramp(&[3, 4]), env(temp_dir.path(), 4));
        let block = array.read_chunk_2d(1, 1, 2, 2).unwrap();
        assert_eq!(block.as_slice(), &[4.0, 5.0, 7.0, 8.0]);
        let block = array.read_chunk_3d((1, 0, 0), (1, 1, 2)).unwrap();
        assert_eq!(block.as_slice(), &[1.0, 0.0]);
    }

    #[test]
    fn test_local_file_requires_full_leading_span() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("x.mda");
        ramp(&[3, 4]).write64(&path).unwrap();
        let array = VirtualArray::open(&path, env(temp_dir.path(), 4)).unwrap();

        let block = array.read_chunk_2d(0, 2, 3, 3).unwrap();
        assert_eq!(
            block.as_slice(),
            &[6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 0.0, 0.0, 0.0]
        );
        assert!(matches!(
            array.read_chunk_2d(1, 0, 2, 2),
            Err(MdaError::UnsupportedRangeShape { .. })
        ));
    }

    #[test]
    fn test_reshape_sets_flag_and_keeps_total() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("x.mda");
        ramp(&[4, 6]).write64(&path).unwrap();
        let mut array = VirtualArray::open(&path, env(temp_dir.path(), 4)).unwrap();

        assert!(array.reshape(&[5, 5]).is_err());
        assert!(!array.is_reshaped());
        array.reshape(&[2, 3, 4]).unwrap();
        assert!(array.is_reshaped());
        assert_eq!(array.dims().unwrap(), [2, 3, 4, 1, 1, 1]);
        assert_eq!(array.total_size(), 24);
        assert_eq!(array.value3(1, 2, 3), 23.0);

        let flat = array.reshaped(&[24]);
        assert_eq!(flat.n1(), 24);
        let same = array.reshaped(&[7]);
        assert_eq!(same.dims().unwrap(), [2, 3, 4, 1, 1, 1]);
    }

    #[test]
    fn test_clone_resets_transient_state() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("x.mda");
        ramp(&[10]).write64(&path).unwrap();
        let mut array = VirtualArray::open(&path, env(temp_dir.path(), 4)).unwrap();
        array.reshape(&[2, 5]).unwrap();
        assert_eq!(array.value(3), 3.0);

        let copy = array.clone();
        assert_eq!(copy.cache.borrow().cached_chunk(), None);
        assert_eq!(copy.dims().unwrap(), [2, 5, 1, 1, 1, 1]);
        assert!(copy.is_reshaped());
        assert_eq!(copy.value2(1, 4), 9.0);
    }

    #[test]
    fn test_scalar_reads_use_cache() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("x.mda");
        ramp(&[10]).write64(&path).unwrap();
        let array = VirtualArray::open(&path, env(temp_dir.path(), 4)).unwrap();

        assert_eq!(array.value(5), 5.0);
        assert_eq!(array.cache.borrow().cached_chunk(), Some(1));
        assert_eq!(array.value(9), 9.0);
        assert_eq!(array.cache.borrow().cached_chunk(), Some(2));
        assert_eq!(array.value(10), 0.0);
        assert_eq!(array.value(-1), 0.0);
    }

    #[test]
    fn test_to_provenance_derived_from_materialized_file() {
        let temp_dir = TempDir::new().unwrap();
        let array = VirtualArray::from_mda(ramp(&[2, 2]), env(temp_dir.path(), 4));
        let prv = array.to_provenance().unwrap();
        let path = PathBuf::from(&prv.original_path);
        assert!(path.exists());
        assert_eq!(prv.original_size, std::fs::metadata(&path).unwrap().len());
        assert!(prv.original_fcs.starts_with("head1000-"));
    }
}
