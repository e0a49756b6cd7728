//! `.mda` header record.

use crate::error::{MdaError, Result};
use crate::format::DataType;
use std::io::{Read, Write};

/// Number of dimensions tracked for every array. Unused trailing dims are 1.
pub const MAX_DIMS: usize = 6;

/// Size of the fixed part of the header (type code, entry size, dim count).
pub const HEADER_PREFIX_SIZE: usize = 12;

/// Decoded `.mda` header.
///
/// `dims` always has six entries. Reshaping a file-backed array rewrites
/// `dims` in place; `header_size` keeps pointing at the stored entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MdaHeader {
    /// Stored element type.
    pub data_type: DataType,
    /// Bytes per stored entry.
    pub bytes_per_entry: usize,
    /// Offset of the first entry from file start.
    pub header_size: u64,
    /// Dimensions, first varying fastest.
    pub dims: [usize; MAX_DIMS],
}

impl MdaHeader {
    /// Creates a header for writing an array of the given type and dims.
    pub fn new(data_type: DataType, dims: [usize; MAX_DIMS]) -> Self {
        let stored = stored_dim_count(&dims);
        let field = if uses_wide_dims(&dims) { 8 } else { 4 };
        Self {
            data_type,
            bytes_per_entry: data_type.bytes_per_entry(),
            header_size: (HEADER_PREFIX_SIZE + stored * field) as u64,
            dims,
        }
    }

    /// Product of all six dimensions.
    pub fn total_size(&self) -> usize {
        self.dims.iter().product()
    }

    /// Byte offset of linear entry `index`.
    pub fn byte_offset(&self, index: usize) -> u64 {
        self.header_size + (self.bytes_per_entry as u64) * index as u64
    }

    /// Writes the header using little-endian byte order.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let stored = stored_dim_count(&self.dims);
        let wide = uses_wide_dims(&self.dims);

        // Type code (4 bytes)
        writer.write_all(&self.data_type.code().to_le_bytes())?;
        // Bytes per entry (4 bytes)
        writer.write_all(&(self.bytes_per_entry as i32).to_le_bytes())?;
        // Num dims (4 bytes), negated for 64-bit dimension fields
        let num_dims = if wide { -(stored as i32) } else { stored as i32 };
        writer.write_all(&num_dims.to_le_bytes())?;
        // Dims
        for &dim in &self.dims[..stored] {
            if wide {
                writer.write_all(&(dim as i64).to_le_bytes())?;
            } else {
                writer.write_all(&(dim as i32).to_le_bytes())?;
            }
        }

        Ok(())
    }

    /// Reads a header using little-endian byte order.
    ///
    /// # Errors
    ///
    /// Returns `MdaError::UnsupportedDataType` for unknown type codes and
    /// `MdaError::InvalidHeader` for inconsistent entry sizes or dimensions.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; HEADER_PREFIX_SIZE];
        reader.read_exact(&mut buf)?;

        // Type code (4 bytes)
        let data_type = DataType::from_code(read_i32(&buf[0..4]))?;

        // Bytes per entry (4 bytes)
        let bytes_per_entry = read_i32(&buf[4..8]);
        if bytes_per_entry != data_type.bytes_per_entry() as i32 {
            return Err(MdaError::InvalidHeader(format!(
                "{} bytes per entry for {:?}",
                bytes_per_entry, data_type
            )));
        }

        // Num dims (4 bytes)
        let raw_num_dims = read_i32(&buf[8..12]);
        let wide = raw_num_dims < 0;
        let num_dims = raw_num_dims.unsigned_abs() as usize;
        if num_dims == 0 || num_dims > MAX_DIMS {
            return Err(MdaError::InvalidHeader(format!(
                "{} dimensions",
                raw_num_dims
            )));
        }

        let mut dims = [1usize; MAX_DIMS];
        for dim in dims.iter_mut().take(num_dims) {
            let value = if wide {
                let mut buf8 = [0u8; 8];
                reader.read_exact(&mut buf8)?;
                i64::from_le_bytes(buf8)
            } else {
                let mut buf4 = [0u8; 4];
                reader.read_exact(&mut buf4)?;
                i32::from_le_bytes(buf4) as i64
            };
            if value < 0 {
                return Err(MdaError::InvalidHeader(format!("negative dimension {}", value)));
            }
            *dim = value as usize;
        }

        let field = if wide { 8 } else { 4 };
        Ok(Self {
            data_type,
            bytes_per_entry: bytes_per_entry as usize,
            header_size: (HEADER_PREFIX_SIZE + num_dims * field) as u64,
            dims,
        })
    }
}

/// Number of dimension fields a writer emits: up to the last non-1 dim, at least 2.
pub fn stored_dim_count(dims: &[usize; MAX_DIMS]) -> usize {
    let last = dims.iter().rposition(|&d| d != 1).map_or(0, |i| i + 1);
    last.max(2)
}

fn uses_wide_dims(dims: &[usize; MAX_DIMS]) -> bool {
    dims.iter().any(|&d| d > i32::MAX as usize)
}

fn read_i32(bytes: &[u8]) -> i32 {
    let mut buf4 = [0u8; 4];
    buf4.copy_from_slice(bytes);
    i32::from_le_bytes(buf4)
}
