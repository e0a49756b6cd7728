//! Parallel whole-file download.
//!
//! The file is split into one contiguous range per worker. Workers run on a
//! rayon pool owned by a background thread and write their ranges into a
//! pre-sized temp sibling of the destination. The calling thread polls for
//! completion, so it can service `on_poll` (host event processing) and
//! honour an [`Interrupt`] between polls.
//!
//! On success the temp file is renamed into place; on failure it is removed.

use crate::error::{MdaError, Result};
use crate::materialize::temp_sibling;
use crate::remote::source::ByteSource;
use rayon::prelude::*;
use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Largest single request issued by a worker.
const PIECE_BYTES: u64 = 4 * 1024 * 1024;

/// Shared cooperative cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    /// Creates a cleared flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests interruption.
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Clears a previous request.
    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// Returns true if interruption was requested.
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Parameters of a parallel download.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Number of workers (and ranges).
    pub concurrency: usize,
    /// Interval between completion polls.
    pub poll_interval: Duration,
    /// Cancellation flag tested between polls and between worker requests.
    pub interrupt: Interrupt,
}

/// Splits `size` bytes into at most `parts` contiguous ranges.
pub fn split_ranges(size: u64, parts: usize) -> Vec<Range<u64>> {
    let parts = (parts.max(1) as u64).min(size.max(1));
    let step = size.div_ceil(parts);
    (0..parts)
        .map(|k| (k * step).min(size)..((k + 1) * step).min(size))
        .filter(|range| !range.is_empty())
        .collect()
}

/// Downloads `expected_size` bytes of `source` to `dest`.
///
/// Blocks until the download completes, calling `on_poll` every
/// `poll_interval`. When interruption is requested the wait is abandoned
/// immediately; the workers stop at their next request and clean up.
///
/// # Errors
///
/// Returns `MdaError::Interrupted` when interrupted, `MdaError::ShortRead`
/// when the source delivers fewer bytes than expected, or the first worker
/// error.
pub fn download_file<F: FnMut()>(
    source: Arc<dyn ByteSource>,
    expected_size: u64,
    dest: &Path,
    options: &DownloadOptions,
    mut on_poll: F,
) -> Result<()> {
    let tmp_path = temp_sibling(dest);
    let allocated = File::create(&tmp_path).and_then(|file| file.set_len(expected_size));
    if let Err(e) = allocated {
        discard_partial(&tmp_path);
        return Err(e.into());
    }

    let ranges = split_ranges(expected_size, options.concurrency);
    debug!(
        "Downloading {} bytes to {:?} in {} ranges",
        expected_size,
        dest,
        ranges.len()
    );

    let worker = {
        let interrupt = options.interrupt.clone();
        let concurrency = options.concurrency.max(1);
        let dest = dest.to_path_buf();
        std::thread::spawn(move || {
            let result = fetch_all(source, ranges, &tmp_path, concurrency, &interrupt)
                .and_then(|()| fs::rename(&tmp_path, &dest).map_err(MdaError::from));
            if result.is_err() {
                discard_partial(&tmp_path);
            }
            result
        })
    };

    loop {
        if worker.is_finished() {
            break;
        }
        if options.interrupt.is_requested() {
            warn!("Download to {:?} interrupted", dest);
            return Err(MdaError::Interrupted);
        }
        on_poll();
        std::thread::sleep(options.poll_interval);
    }

    match worker.join() {
        Ok(result) => result,
        Err(_) => Err(MdaError::Remote("download thread panicked".to_string())),
    }
}

fn discard_partial(tmp_path: &Path) {
    if tmp_path.exists() {
        if let Err(e) = fs::remove_file(tmp_path) {
            warn!("Failed to remove partial download {:?}: {}", tmp_path, e);
        }
    }
}

fn fetch_all(
    source: Arc<dyn ByteSource>,
    ranges: Vec<Range<u64>>,
    tmp_path: &Path,
    concurrency: usize,
    interrupt: &Interrupt,
) -> Result<()> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(concurrency)
        .build()
        .map_err(|e| MdaError::Remote(e.to_string()))?;

    pool.install(|| {
        ranges
            .into_par_iter()
            .try_for_each(|range| fetch_range(source.as_ref(), range, tmp_path, interrupt))
    })
}

fn fetch_range(
    source: &dyn ByteSource,
    range: Range<u64>,
    tmp_path: &Path,
    interrupt: &Interrupt,
) -> Result<()> {
    let mut file = OpenOptions::new().write(true).open(tmp_path)?;
    let mut offset = range.start;
    while offset < range.end {
        if interrupt.is_requested() {
            return Err(MdaError::Interrupted);
        }
        let end = (offset + PIECE_BYTES).min(range.end);
        let bytes = source.read_byte_range(offset..end).map_err(|e| {
            error!("Download of bytes {}..{} failed: {}", offset, end, e);
            MdaError::from(e)
        })?;
        let expected = (end - offset) as usize;
        if bytes.len() != expected {
            error!(
                "Download of bytes {}..{} delivered {} bytes",
                offset,
                end,
                bytes.len()
            );
            return Err(MdaError::ShortRead {
                expected,
                actual: bytes.len(),
            });
        }
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&bytes)?;
        offset = end;
    }
    file.sync_all()?;
    Ok(())
}
