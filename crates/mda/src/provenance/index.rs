//! Checksum index collaborators.
//!
//! An index maps content identity (checksum, fast checksum, size) to a
//! local path. Results are candidates; callers that need certainty verify
//! them.

use crate::provenance::checksum::file_checksum;
use crate::provenance::descriptor::matches_fast_checksum;
use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};

/// Locates files by content.
pub trait ChecksumIndex: Debug + Send + Sync {
    /// Returns a path whose content matches, if one is known.
    ///
    /// With `local_only` the index must not reach out to remote hosts.
    fn locate(&self, checksum: &str, fcs: &str, size: u64, local_only: bool) -> Option<PathBuf>;
}

/// Index that knows nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIndex;

impl ChecksumIndex for NoIndex {
    fn locate(&self, _checksum: &str, _fcs: &str, _size: u64, _local_only: bool) -> Option<PathBuf> {
        None
    }
}

/// Index that scans a list of directories.
///
/// Candidates are filtered by size, then fast checksum, then full checksum,
/// so most files are never hashed in full.
#[derive(Debug, Clone, Default)]
pub struct DirectoryIndex {
    dirs: Vec<PathBuf>,
    recursive: bool,
}

impl DirectoryIndex {
    /// Scans the given directories (top level only).
    pub fn new(dirs: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            dirs: dirs.into_iter().map(Into::into).collect(),
            recursive: false,
        }
    }

    /// Also descends into subdirectories.
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    fn scan(&self, dir: &Path, checksum: &str, fcs: &str, size: u64) -> Option<PathBuf> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Skipping index directory {:?}: {}", dir, e);
                return None;
            }
        };

        let mut subdirs = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            if meta.is_dir() {
                if self.recursive {
                    subdirs.push(path);
                }
                continue;
            }
            if meta.len() != size {
                continue;
            }
            if !matches_fast_checksum(&path, fcs).unwrap_or(false) {
                continue;
            }
            match file_checksum(&path) {
                Ok(sum) if sum == checksum => return Some(path),
                Ok(_) => {}
                Err(e) => warn!("Failed to checksum {:?}: {}", path, e),
            }
        }

        subdirs
            .iter()
            .find_map(|sub| self.scan(sub, checksum, fcs, size))
    }
}

impl ChecksumIndex for DirectoryIndex {
    fn locate(&self, checksum: &str, fcs: &str, size: u64, _local_only: bool) -> Option<PathBuf> {
        self.dirs
            .iter()
            .find_map(|dir| self.scan(dir, checksum, fcs, size))
    }
}

/// Index backed by the external `prv` tool.
///
/// Runs `prv locate --checksum=<c> --fcs=<f> --size=<n> [--local-only]` and
/// accepts the trimmed stdout when it names an existing file.
#[derive(Debug, Clone)]
pub struct CommandIndex {
    program: PathBuf,
}

impl Default for CommandIndex {
    fn default() -> Self {
        Self::new("prv")
    }
}

impl CommandIndex {
    /// Uses the given executable.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn args(checksum: &str, fcs: &str, size: u64, local_only: bool) -> Vec<String> {
        let mut args = vec![
            "locate".to_string(),
            format!("--checksum={}", checksum),
            format!("--fcs={}", fcs),
            format!("--size={}", size),
        ];
        if local_only {
            args.push("--local-only".to_string());
        }
        args
    }
}

impl ChecksumIndex for CommandIndex {
    fn locate(&self, checksum: &str, fcs: &str, size: u64, local_only: bool) -> Option<PathBuf> {
        let output = match Command::new(&self.program)
            .args(Self::args(checksum, fcs, size, local_only))
            .output()
        {
            Ok(output) => output,
            Err(e) => {
                warn!("Failed to run {:?}: {}", self.program, e);
                return None;
            }
        };
        if !output.status.success() {
            debug!("{:?} locate exited with {}", self.program, output.status);
            return None;
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let located = stdout.trim();
        if located.is_empty() {
            return None;
        }
        let path = PathBuf::from(located);
        if path.is_file() {
            Some(path)
        } else {
            debug!("{:?} located non-existent file {:?}", self.program, path);
            None
        }
    }
}
