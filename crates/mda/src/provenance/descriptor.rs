//! Provenance descriptor (`.prv` records).

use crate::error::{MdaError, Result};
use crate::materialize::atomic_write;
use crate::provenance::checksum::{file_checksum, head_checksum};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::warn;

/// Content-addressed reference to a dataset.
///
/// The path is only a hint; the checksums and size identify the content.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Provenance {
    /// Where the file was when the descriptor was made.
    #[serde(default)]
    pub original_path: String,
    /// Hex SHA-1 of the whole file.
    pub original_checksum: String,
    /// Fast checksum, `<scheme>-<hex digest>`.
    #[serde(default)]
    pub original_fcs: String,
    /// File size in bytes.
    pub original_size: u64,
}

impl Provenance {
    /// Describes an existing file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn for_file(path: &Path, fast_checksum_bytes: usize) -> Result<Self> {
        let size = std::fs::metadata(path)?.len();
        let fcs = FastChecksum::of_file(path, fast_checksum_bytes)?;
        Ok(Self {
            original_path: path.to_string_lossy().into_owned(),
            original_checksum: file_checksum(path)?,
            original_fcs: fcs.to_string(),
            original_size: size,
        })
    }

    /// Parses a descriptor from JSON.
    ///
    /// # Errors
    ///
    /// Returns `MdaError::JsonError` for malformed JSON or missing fields.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a `.prv` file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Serializes to pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns `MdaError::JsonError` if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Writes a `.prv` file through a temp sibling and rename.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        atomic_write(path, |writer| {
            std::io::Write::write_all(writer, json.as_bytes())?;
            Ok(())
        })
    }

    /// Returns true if `path` has the expected size and full checksum.
    ///
    /// # Errors
    ///
    /// Returns an error only if the checksum cannot be computed for a file of
    /// the right size.
    pub fn verify_file(&self, path: &Path) -> Result<bool> {
        let size = match std::fs::metadata(path) {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => return Ok(false),
        };
        if size != self.original_size {
            return Ok(false);
        }
        Ok(file_checksum(path)? == self.original_checksum)
    }
}

/// Fast checksum: a digest over a bounded prefix, tagged with its scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastChecksum {
    /// Scheme name, e.g. `head1000`.
    pub scheme: String,
    /// Hex digest.
    pub digest: String,
}

impl FastChecksum {
    /// Computes the `head<num_bytes>` checksum of a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn of_file(path: &Path, num_bytes: usize) -> Result<Self> {
        Ok(Self {
            scheme: format!("head{}", num_bytes),
            digest: head_checksum(path, num_bytes)?,
        })
    }

    /// Prefix length hashed by a `head<N>` scheme.
    pub fn head_len(&self) -> Option<usize> {
        self.scheme.strip_prefix("head")?.parse().ok()
    }

    /// Checks `path` against this checksum.
    ///
    /// Unknown schemes cannot be checked; they log a warning and match.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn matches(&self, path: &Path) -> Result<bool> {
        match self.head_len() {
            Some(len) => Ok(head_checksum(path, len)? == self.digest),
            None => {
                warn!("Unknown fast checksum scheme {:?}, not checking", self.scheme);
                Ok(true)
            }
        }
    }
}

impl fmt::Display for FastChecksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.scheme, self.digest)
    }
}

impl FromStr for FastChecksum {
    type Err = MdaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('-') {
            Some((scheme, digest)) if !scheme.is_empty() && !digest.is_empty() => Ok(Self {
                scheme: scheme.to_string(),
                digest: digest.to_string(),
            }),
            _ => Err(MdaError::Parse(format!("invalid fast checksum {:?}", s))),
        }
    }
}

/// Checks a file against a serialized fast checksum.
///
/// An empty `fcs` matches everything. Malformed values log a warning and match.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn matches_fast_checksum(path: &Path, fcs: &str) -> Result<bool> {
    if fcs.is_empty() {
        return Ok(true);
    }
    match fcs.parse::<FastChecksum>() {
        Ok(parsed) => parsed.matches(path),
        Err(e) => {
            warn!("{}, not checking", e);
            Ok(true)
        }
    }
}
