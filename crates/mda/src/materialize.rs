//! Cache directory allocation and content-addressed materialization.
//!
//! The cache root holds one subdirectory per [`Lifetime`] tier. Derived
//! arrays are written under a name derived from their content checksum, so
//! identical content maps to one file and is written at most once.
//!
//! Every write follows the same durability pattern:
//! 1. Write to a uniquely named temp sibling (`<name>.<uuid>.tmp`)
//! 2. fsync the temp file
//! 3. Atomic rename to the final path
//! 4. fsync the directory (rename persistence)
//!
//! Any failure removes the temp file. Readers never observe a partially
//! written file, and two writers racing on the same content both rename a
//! complete file into place.

use crate::error::Result;
use crate::format::{DataType, Sample};
use crate::mda::Mda;
use crate::provenance::checksum::memory_checksum;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Suffix of materialized array files.
pub const MATERIALIZED_SUFFIX: &str = ".makePath.mda";

/// Retention tier of a cache file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifetime {
    /// Derived data that may be purged aggressively.
    ShortTerm,
    /// Downloads and other data worth keeping between runs.
    LongTerm,
}

impl Lifetime {
    /// Subdirectory name of the tier under the cache root.
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::ShortTerm => "tmp_short_term",
            Self::LongTerm => "tmp_long_term",
        }
    }
}

/// Cache directory allocator.
#[derive(Debug, Clone)]
pub struct CacheDir {
    root: PathBuf,
}

impl CacheDir {
    /// Creates the cache root and its tier subdirectories.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created.
    pub fn create(root: &Path) -> Result<Self> {
        for tier in [Lifetime::ShortTerm, Lifetime::LongTerm] {
            fs::create_dir_all(root.join(tier.dir_name()))?;
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Cache root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of a tier.
    pub fn tier_dir(&self, tier: Lifetime) -> PathBuf {
        self.root.join(tier.dir_name())
    }

    /// Allocates a path in the given tier.
    ///
    /// With a name the path is deterministic; without one a random name is
    /// generated. The file itself is not created.
    ///
    /// # Errors
    ///
    /// Returns an error if the tier directory cannot be created.
    pub fn make_local_file(&self, name: Option<&str>, tier: Lifetime) -> Result<PathBuf> {
        let dir = self.tier_dir(tier);
        fs::create_dir_all(&dir)?;
        let file_name = match name {
            Some(name) => name.to_string(),
            None => format!("{}.dat", Uuid::new_v4().simple()),
        };
        Ok(dir.join(file_name))
    }
}

/// Outcome of a materialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Materialized {
    /// Path of the content-addressed file.
    pub path: PathBuf,
    /// True when this call wrote the file, false when it already existed.
    pub written: bool,
}

/// Writes `mda` to its content-addressed cache file unless it already exists.
///
/// The file is named `<checksum>.makePath.mda` in the short-term tier and
/// stores float64 entries.
///
/// # Errors
///
/// Returns an error if the temp file cannot be written or renamed. The temp
/// file is removed in that case.
pub fn materialize<T: Sample>(mda: &Mda<T>, cache: &CacheDir) -> Result<Materialized> {
    let checksum = memory_checksum(mda);
    let name = format!("{}{}", checksum, MATERIALIZED_SUFFIX);
    let path = cache.make_local_file(Some(&name), Lifetime::ShortTerm)?;

    if path.exists() {
        debug!("Reusing materialized array {:?}", path);
        return Ok(Materialized {
            path,
            written: false,
        });
    }

    atomic_write(&path, |writer| mda.write_to(writer, DataType::Float64))?;
    debug!("Materialized {} entries to {:?}", mda.total_size(), path);
    Ok(Materialized {
        path,
        written: true,
    })
}

/// Writes a file through a temp sibling and an atomic rename.
///
/// # Errors
///
/// Returns the first error from `write`, the flush, the fsync or the rename.
pub fn atomic_write<F>(final_path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let tmp_path = temp_sibling(final_path);
    let result = write_and_rename(&tmp_path, final_path, write);
    if let Err(e) = &result {
        warn!("Atomic write of {:?} failed: {}", final_path, e);
        if tmp_path.exists() {
            if let Err(remove_err) = fs::remove_file(&tmp_path) {
                warn!("Failed to remove temp file {:?}: {}", tmp_path, remove_err);
            }
        }
    }
    result
}

fn write_and_rename<F>(tmp_path: &Path, final_path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    // 1. Write to temp file
    let mut writer = BufWriter::new(File::create(tmp_path)?);
    write(&mut writer)?;
    writer.flush()?;

    // 2. fsync temp file
    writer.get_ref().sync_all()?;
    drop(writer);

    // 3. Atomic rename
    fs::rename(tmp_path, final_path)?;

    // 4. fsync directory (rename persistence)
    #[cfg(unix)]
    if let Some(dir) = final_path.parent() {
        File::open(dir)?.sync_all()?;
    }

    Ok(())
}

/// Unique temp name next to `path`.
pub(crate) fn temp_sibling(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{}.{}.tmp", file_name, Uuid::new_v4().simple()))
}
