//! SHA-1 content checksums.

use crate::error::Result;
use crate::format::Sample;
use crate::mda::Mda;
use sha1::{Digest, Sha1};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

const READ_BUF_SIZE: usize = 64 * 1024;

/// Hex SHA-1 of a whole file.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn file_checksum(path: &Path) -> Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha1::new();
    let mut buf = vec![0u8; READ_BUF_SIZE];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Hex SHA-1 of the first `num_bytes` bytes of a file (the whole file when shorter).
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn head_checksum(path: &Path, num_bytes: usize) -> Result<String> {
    let mut head = Vec::with_capacity(num_bytes);
    File::open(path)?
        .take(num_bytes as u64)
        .read_to_end(&mut head)?;
    Ok(hex::encode(Sha1::digest(&head)))
}

/// Checksum identifying in-memory content: hex SHA-1 of the float64
/// little-endian entries, `-`, then the significant dims joined by `x`.
pub fn memory_checksum<T: Sample>(mda: &Mda<T>) -> String {
    let mut hasher = Sha1::new();
    for block in mda.as_slice().chunks(READ_BUF_SIZE / 8) {
        let bytes: Vec<u8> = block
            .iter()
            .flat_map(|v| v.to_f64().to_le_bytes())
            .collect();
        hasher.update(&bytes);
    }
    let dims = mda.dims()[..mda.ndims()]
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("x");
    format!("{}-{}", hex::encode(hasher.finalize()), dims)
}
