//! Provenance resolution: descriptor to verified local path.

use crate::error::{MdaError, Result};
use crate::provenance::descriptor::Provenance;
use crate::provenance::index::ChecksumIndex;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Resolves a descriptor to a local file.
///
/// 1. Ask `index` for a local-only match on checksum, fast checksum and size.
/// 2. Otherwise accept `original_path` if its size and full checksum match.
/// 3. Otherwise fail with `MdaError::ResolutionFailed`.
///
/// # Errors
///
/// Returns `MdaError::ResolutionFailed` when neither step yields a file.
pub fn resolve(prv: &Provenance, index: &dyn ChecksumIndex) -> Result<PathBuf> {
    if let Some(path) = index.locate(
        &prv.original_checksum,
        &prv.original_fcs,
        prv.original_size,
        true,
    ) {
        debug!("Checksum index located {} at {:?}", prv.original_checksum, path);
        return Ok(path);
    }

    if !prv.original_path.is_empty() {
        let hint = Path::new(&prv.original_path);
        match prv.verify_file(hint) {
            Ok(true) => {
                debug!("Using verified original path {:?}", hint);
                return Ok(hint.to_path_buf());
            }
            Ok(false) => {
                if hint.exists() {
                    warn!("Original path {:?} does not match its descriptor", hint);
                }
            }
            Err(e) => warn!("Failed to verify original path {:?}: {}", hint, e),
        }
    }

    warn!(
        "Unable to resolve provenance (checksum {}, original path {})",
        prv.original_checksum, prv.original_path
    );
    Err(MdaError::ResolutionFailed {
        original_path: prv.original_path.clone(),
    })
}
