//! Remote backend session.
//!
//! A [`RemoteArray`] reads an `.mda` file hosted behind a [`ByteSource`].
//! The header is fetched on first use; entries are fetched in requests of
//! at most `download_chunk_size` entries. Remote arrays expose at most three
//! dimensions: dimensions three to six are folded into `N3`.

use crate::chunk::{read_clipped, OpenState};
use crate::config::MdaConfig;
use crate::error::{MdaError, Result};
use crate::format::header::HEADER_PREFIX_SIZE;
use crate::format::{decode_into, MdaHeader, Sample, MAX_DIMS};
use crate::materialize::{CacheDir, Lifetime};
use crate::remote::download::{download_file, DownloadOptions, Interrupt};
use crate::remote::source::{ByteSource, HttpSource};
use sha1::{Digest, Sha1};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// Session over a remotely hosted array.
#[derive(Debug)]
pub struct RemoteArray {
    url: String,
    source: Arc<dyn ByteSource>,
    header: OpenState<MdaHeader>,
    download_chunk_size: usize,
}

impl RemoteArray {
    /// Creates a session over any byte source. Nothing is fetched yet.
    pub fn new(url: impl Into<String>, source: Arc<dyn ByteSource>, download_chunk_size: usize) -> Self {
        Self {
            url: url.into(),
            source,
            header: OpenState::Unopened,
            download_chunk_size: download_chunk_size.max(1),
        }
    }

    /// Creates a session over HTTP(S).
    ///
    /// # Errors
    ///
    /// Returns `MdaError::Remote` for malformed or non-HTTP URLs.
    pub fn http(url: &str, download_chunk_size: usize) -> Result<Self> {
        let source = HttpSource::new(url)?;
        Ok(Self::new(url, Arc::new(source), download_chunk_size))
    }

    /// Source URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Entries fetched per request.
    pub fn download_chunk_size(&self) -> usize {
        self.download_chunk_size
    }

    /// Sets the entries fetched per request.
    pub fn set_download_chunk_size(&mut self, size: usize) {
        self.download_chunk_size = size.max(1);
    }

    /// Copy sharing the source and any header already fetched. A failed
    /// connection is forgotten.
    pub fn detached(&self) -> Self {
        let header = match &self.header {
            OpenState::Open(header) => OpenState::Open(header.clone()),
            _ => OpenState::Unopened,
        };
        Self {
            url: self.url.clone(),
            source: Arc::clone(&self.source),
            header,
            download_chunk_size: self.download_chunk_size,
        }
    }

    /// Header with folded dimensions, fetched on first use.
    ///
    /// # Errors
    ///
    /// Returns `MdaError::OpenFailed` if the header cannot be fetched or
    /// parsed. The failure is sticky.
    pub fn header(&mut self) -> Result<&mut MdaHeader> {
        if let OpenState::Unopened = self.header {
            self.header = match fetch_header(self.source.as_ref()) {
                Ok(header) => {
                    debug!("Connected to {}: dims {:?}", self.url, header.dims);
                    OpenState::Open(header)
                }
                Err(e) => {
                    warn!("Failed to read remote header of {}: {}", self.url, e);
                    OpenState::Failed(e.to_string())
                }
            };
        }
        match &mut self.header {
            OpenState::Open(header) => Ok(header),
            OpenState::Failed(reason) => Err(MdaError::OpenFailed {
                path: PathBuf::from(&self.url),
                reason: reason.clone(),
            }),
            OpenState::Unopened => Err(MdaError::OpenFailed {
                path: PathBuf::from(&self.url),
                reason: "not connected".to_string(),
            }),
        }
    }

    /// Folded dimensions.
    ///
    /// # Errors
    ///
    /// Same as [`header`](Self::header).
    pub fn dims(&mut self) -> Result<[usize; MAX_DIMS]> {
        Ok(self.header()?.dims)
    }

    /// Size in bytes of the whole remote file.
    ///
    /// # Errors
    ///
    /// Same as [`header`](Self::header).
    pub fn file_size(&mut self) -> Result<u64> {
        let header = self.header()?;
        Ok(header.byte_offset(header.total_size()))
    }

    /// Reshapes to a target with at most three dimensions.
    ///
    /// # Errors
    ///
    /// Returns `MdaError::Remote` for targets using dimensions four to six,
    /// `MdaError::ReshapeSizeMismatch` when the size differs.
    pub fn reshape(&mut self, dims: [usize; MAX_DIMS]) -> Result<()> {
        if dims[3..].iter().any(|&d| d != 1) {
            return Err(MdaError::Remote(format!(
                "remote arrays support at most three dimensions, got {:?}",
                dims
            )));
        }
        let header = self.header()?;
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

    /// Reads `out.len()` entries starting at linear index `start` with
    /// clipping. `out` must be zero-filled by the caller.
    ///
    /// # Errors
    ///
    /// Returns `MdaError::OpenFailed`, `MdaError::ShortRead` or an I/O error.
    pub fn read_entries<T: Sample>(&mut self, start: i64, out: &mut [T]) -> Result<()> {
        let header = self.header()?.clone();
        let source = Arc::clone(&self.source);
        let step = self.download_chunk_size;
        read_clipped(header.total_size(), start, out, |first, slots| {
            let mut delivered = 0;
            for piece in slots.chunks_mut(step) {
                let begin = first + delivered;
                let range = header.byte_offset(begin)..header.byte_offset(begin + piece.len());
                let bytes = source.read_byte_range(range)?;
                let decoded = decode_into(header.data_type, &bytes, piece);
                delivered += decoded;
                if decoded < piece.len() {
                    break;
                }
            }
            Ok(delivered)
        })
    }

    /// Downloads the whole file into the long-term cache tier, once.
    ///
    /// The local name derives from the URL. An existing file of the
    /// expected size is reused. The source must hold at least the bytes the
    /// header describes.
    ///
    /// # Errors
    ///
    /// Returns `MdaError::Interrupted` when interruption is requested while
    /// waiting, `MdaError::Remote` when the source is smaller than the header
    /// requires, or the first download error.
    pub fn make_path<F: FnMut()>(
        &mut self,
        cache: &CacheDir,
        config: &MdaConfig,
        interrupt: &Interrupt,
        on_poll: F,
    ) -> Result<PathBuf> {
        let size = self.file_size()?;
        let name = format!("{}.mda", hex::encode(Sha1::digest(self.url.as_bytes())));
        let path = cache.make_local_file(Some(&name), Lifetime::LongTerm)?;

        if std::fs::metadata(&path).map(|m| m.len() == size).unwrap_or(false) {
            debug!("Reusing download of {} at {:?}", self.url, path);
            return Ok(path);
        }

        let available = self.source.size()?;
        if available < size {
            warn!(
                "Remote {} holds {} bytes, header requires {}",
                self.url, available, size
            );
            return Err(MdaError::Remote(format!(
                "{} holds {} bytes, header requires {}",
                self.url, available, size
            )));
        }

        let options = DownloadOptions {
            concurrency: config.download_threads,
            poll_interval: config.poll_interval,
            interrupt: interrupt.clone(),
        };
        download_file(Arc::clone(&self.source), size, &path, &options, on_poll)?;
        Ok(path)
    }
}

fn fetch_header(source: &dyn ByteSource) -> Result<MdaHeader> {
    let prefix = source.read_byte_range(0..HEADER_PREFIX_SIZE as u64)?;
    if prefix.len() < HEADER_PREFIX_SIZE {
        return Err(MdaError::InvalidHeader(format!(
            "remote header truncated at {} bytes",
            prefix.len()
        )));
    }
    let mut buf4 = [0u8; 4];
    buf4.copy_from_slice(&prefix[8..12]);
    let num_dims = i32::from_le_bytes(buf4);
    let field = if num_dims < 0 { 8 } else { 4 };
    let dims_len = (num_dims.unsigned_abs() as usize).min(MAX_DIMS) * field;

    let full = source.read_byte_range(0..(HEADER_PREFIX_SIZE + dims_len) as u64)?;
    let mut header = MdaHeader::read_from(&mut Cursor::new(&full[..]))?;
    fold_dims(&mut header.dims);
    Ok(header)
}

/// Folds dimensions three to six into the third.
fn fold_dims(dims: &mut [usize; MAX_DIMS]) {
    dims[2] = dims[2..].iter().product();
    for dim in &mut dims[3..] {
        *dim = 1;
    }
}
