//! Chunked byte I/O against `.mda` files.
//!
//! Requests name a logical start index (possibly negative) and a length.
//! The caller supplies a zero-filled buffer of that length; only the part of
//! the request that overlaps `[0, total)` is read, at the matching offset in
//! the buffer. Everything else stays zero.

use crate::error::{MdaError, Result};
use crate::format::{decode_into, MdaHeader, Sample};
use crate::mda::clip;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Open state of a backend resource.
///
/// `Failed` is terminal: once an open fails the failure is replayed on every
/// later call until the owner is reset.
#[derive(Debug, Default)]
pub enum OpenState<T> {
    /// Not attempted yet.
    #[default]
    Unopened,
    /// Opened successfully.
    Open(T),
    /// The first attempt failed with this reason.
    Failed(String),
}

impl<T> OpenState<T> {
    /// Returns true once an open attempt has failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Returns true while the resource is open.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open(_))
    }
}

/// Reads the part of `[start, start + out.len())` that lies inside
/// `[0, total)` into the matching slots of `out`.
///
/// `read(first, slots)` must fill `slots` with the entries starting at
/// linear index `first` and return how many it delivered.
///
/// # Errors
///
/// Returns `MdaError::ShortRead` when `read` delivers fewer entries than the
/// overlap holds, and forwards errors from `read`.
pub fn read_clipped<T, F>(total: usize, start: i64, out: &mut [T], read: F) -> Result<()>
where
    F: FnOnce(usize, &mut [T]) -> Result<usize>,
{
    let Some((first, dst, len)) = clip(start, out.len(), total) else {
        return Ok(());
    };
    let delivered = read(first, &mut out[dst..dst + len])?;
    if delivered < len {
        return Err(MdaError::ShortRead {
            expected: len,
            actual: delivered,
        });
    }
    Ok(())
}

/// Maps a 2D request onto a linear range, clipped along the trailing
/// dimension.
///
/// Only the full leading span is supported: `i1 == 0` and `size1 == n1`.
/// Returns `(source start, destination offset, length)` in entries, or
/// `None` when no column of the request lies inside `[0, n2)`.
///
/// # Errors
///
/// Returns `MdaError::UnsupportedRangeShape` for any other shape.
pub fn linear_range_2d(
    dims: &[usize],
    (i1, i2): (i64, i64),
    (size1, size2): (usize, usize),
) -> Result<Option<(usize, usize, usize)>> {
    let n1 = dims[0];
    if i1 != 0 || size1 != n1 {
        return Err(MdaError::UnsupportedRangeShape {
            offsets: vec![i1, i2],
            sizes: vec![size1, size2],
            dims: dims[..2].to_vec(),
        });
    }
    Ok(clip(i2, size2, dims[1]).map(|(src, dst, len)| (src * n1, dst * n1, len * n1)))
}

/// Maps a 3D request onto a linear range, clipped along the trailing
/// dimension.
///
/// Only the full leading span is supported: `i1 == i2 == 0`, `size1 == n1`
/// and `size2 == n2`. Returns `(source start, destination offset, length)`
/// in entries, or `None` when no plane of the request lies inside `[0, n3)`.
///
/// # Errors
///
/// Returns `MdaError::UnsupportedRangeShape` for any other shape.
pub fn linear_range_3d(
    dims: &[usize],
    (i1, i2, i3): (i64, i64, i64),
    (size1, size2, size3): (usize, usize, usize),
) -> Result<Option<(usize, usize, usize)>> {
    let (n1, n2) = (dims[0], dims[1]);
    if i1 != 0 || i2 != 0 || size1 != n1 || size2 != n2 {
        return Err(MdaError::UnsupportedRangeShape {
            offsets: vec![i1, i2, i3],
            sizes: vec![size1, size2, size3],
            dims: dims[..3].to_vec(),
        });
    }
    let plane = n1 * n2;
    Ok(clip(i3, size3, dims[2]).map(|(src, dst, len)| (src * plane, dst * plane, len * plane)))
}

/// LocalFile backend state: a path, its lazily read header and the open file.
#[derive(Debug)]
pub struct LocalFile {
    path: PathBuf,
    header: Option<MdaHeader>,
    state: OpenState<File>,
}

impl LocalFile {
    /// Attaches a path without touching the filesystem.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            header: None,
            state: OpenState::Unopened,
        }
    }

    /// Backing path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current open state.
    pub fn state(&self) -> &OpenState<File> {
        &self.state
    }

    /// Drops the open file and the cached header.
    pub fn reset(&mut self) {
        self.header = None;
        self.state = OpenState::Unopened;
    }

    /// Copy with the same path and header but no open file.
    pub fn detached(&self) -> Self {
        Self {
            path: self.path.clone(),
            header: self.header.clone(),
            state: OpenState::Unopened,
        }
    }

    fn file(&mut self) -> Result<&mut File> {
        if let OpenState::Unopened = self.state {
            self.state = match File::open(&self.path) {
                Ok(file) => {
                    debug!("Opened {:?}", self.path);
                    OpenState::Open(file)
                }
                Err(e) => {
                    warn!("Failed to open {:?}: {}", self.path, e);
                    OpenState::Failed(e.to_string())
                }
            };
        }

        match &mut self.state {
            OpenState::Open(file) => Ok(file),
            OpenState::Failed(reason) => Err(MdaError::OpenFailed {
                path: self.path.clone(),
                reason: reason.clone(),
            }),
            OpenState::Unopened => Err(MdaError::OpenFailed {
                path: self.path.clone(),
                reason: "not opened".to_string(),
            }),
        }
    }

    /// Header, read from the file on first use.
    ///
    /// # Errors
    ///
    /// Returns `MdaError::OpenFailed` if the file cannot be opened, or a
    /// header error if it is malformed.
    pub fn header(&mut self) -> Result<&MdaHeader> {
        Ok(self.header_mut()?)
    }

    /// Header for in-place reshape.
    ///
    /// # Errors
    ///
    /// Same as [`header`](Self::header).
    pub fn header_mut(&mut self) -> Result<&mut MdaHeader> {
        let header = match self.header.take() {
            Some(header) => header,
            None => {
                let file = self.file()?;
                file.seek(SeekFrom::Start(0))?;
                let header = MdaHeader::read_from(file)?;
                debug!("Read header of {:?}: {:?}", self.path, header.dims);
                header
            }
        };
        Ok(self.header.insert(header))
    }

    /// Reads `out.len()` entries starting at linear index `start` with clipping.
    ///
    /// `out` must be zero-filled by the caller.
    ///
    /// # Errors
    ///
    /// Returns `MdaError::OpenFailed`, `MdaError::ShortRead` or an I/O error.
    pub fn read_entries<T: Sample>(&mut self, start: i64, out: &mut [T]) -> Result<()> {
        let header = self.header()?.clone();
        let file = self.file()?;
        read_clipped(header.total_size(), start, out, |first, slots| {
            read_at(file, &header, first, slots)
        })
    }
}

fn read_at<T: Sample>(
    file: &mut File,
    header: &MdaHeader,
    first: usize,
    slots: &mut [T],
) -> Result<usize> {
    let want = slots.len() * header.bytes_per_entry;
    let mut bytes = vec![0u8; want];
    file.seek(SeekFrom::Start(header.byte_offset(first)))?;

    let mut filled = 0;
    while filled < want {
        match file.read(&mut bytes[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(decode_into(header.data_type, &bytes[..filled], slots))
}
