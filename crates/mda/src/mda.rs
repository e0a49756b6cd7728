//! Owned in-memory arrays.
//!
//! [`Mda`] is the payload of the Memory backend and the result type of every
//! chunk read. It always tracks six dimensions (unused trailing dims are 1)
//! and stores entries first-dimension-fastest, matching the file layout.

use crate::error::{MdaError, Result};
use crate::format::{self, DataType, MdaHeader, Sample, MAX_DIMS};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Owned six-dimensional array of samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Mda<T: Sample = f64> {
    dims: [usize; MAX_DIMS],
    data: Vec<T>,
}

/// Array whose whole pipeline is 32-bit.
pub type Mda32 = Mda<f32>;

impl<T: Sample> Default for Mda<T> {
    fn default() -> Self {
        Self {
            dims: [1; MAX_DIMS],
            data: vec![T::default()],
        }
    }
}

/// Pads up to six dimensions with trailing 1s.
///
/// # Errors
///
/// Returns `MdaError::InvalidHeader` when more than six non-1 dimensions are given.
pub fn pad_dims(dims: &[usize]) -> Result<[usize; MAX_DIMS]> {
    if dims.len() > MAX_DIMS && dims[MAX_DIMS..].iter().any(|&d| d != 1) {
        return Err(MdaError::InvalidHeader(format!(
            "{} dimensions exceed the maximum of {}",
            dims.len(),
            MAX_DIMS
        )));
    }
    let mut padded = [1usize; MAX_DIMS];
    for (slot, &dim) in padded.iter_mut().zip(dims) {
        *slot = dim;
    }
    Ok(padded)
}

impl<T: Sample> Mda<T> {
    /// Allocates a zero-filled array with the given six dimensions.
    pub fn new(dims: [usize; MAX_DIMS]) -> Self {
        let total = dims.iter().product();
        Self {
            dims,
            data: vec![T::default(); total],
        }
    }

    /// Allocates a zero-filled array from up to six dimensions.
    pub fn zeros(dims: &[usize]) -> Result<Self> {
        Ok(Self::new(pad_dims(dims)?))
    }

    /// Wraps an existing buffer.
    ///
    /// # Errors
    ///
    /// Returns `MdaError::ReshapeSizeMismatch` if `data.len()` differs from
    /// the product of `dims`.
    pub fn from_vec(dims: &[usize], data: Vec<T>) -> Result<Self> {
        let padded = pad_dims(dims)?;
        let total: usize = padded.iter().product();
        if total != data.len() {
            return Err(MdaError::ReshapeSizeMismatch {
                current: data.len(),
                proposed: dims.to_vec(),
            });
        }
        Ok(Self { dims: padded, data })
    }

    /// All six dimensions.
    pub fn dims(&self) -> [usize; MAX_DIMS] {
        self.dims
    }

    /// 1-based dimension query. `dim == 0` is 0, beyond six is 1.
    pub fn n(&self, dim: usize) -> usize {
        match dim {
            0 => 0,
            1..=MAX_DIMS => self.dims[dim - 1],
            _ => 1,
        }
    }

    /// First dimension.
    pub fn n1(&self) -> usize {
        self.dims[0]
    }

    /// Second dimension.
    pub fn n2(&self) -> usize {
        self.dims[1]
    }

    /// Third dimension.
    pub fn n3(&self) -> usize {
        self.dims[2]
    }

    /// Number of significant dimensions (at least 2).
    pub fn ndims(&self) -> usize {
        format::header::stored_dim_count(&self.dims)
    }

    /// Total number of entries.
    pub fn total_size(&self) -> usize {
        self.data.len()
    }

    /// Entries in storage order.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Mutable entries in storage order.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Consumes the array, returning its entries.
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// Entry at linear index `i`, or zero when out of range.
    pub fn value(&self, i: i64) -> T {
        if i < 0 {
            return T::default();
        }
        self.data.get(i as usize).copied().unwrap_or_default()
    }

    /// Entry at `(i1, i2)`, or zero when any index is out of range.
    pub fn value2(&self, i1: i64, i2: i64) -> T {
        match self.linear2(i1, i2) {
            Some(i) => self.data[i],
            None => T::default(),
        }
    }

    /// Entry at `(i1, i2, i3)`, or zero when any index is out of range.
    pub fn value3(&self, i1: i64, i2: i64, i3: i64) -> T {
        match self.linear3(i1, i2, i3) {
            Some(i) => self.data[i],
            None => T::default(),
        }
    }

    /// Sets the entry at linear index `i`. Out-of-range writes are ignored.
    pub fn set_value(&mut self, value: T, i: i64) {
        if i >= 0 {
            if let Some(slot) = self.data.get_mut(i as usize) {
                *slot = value;
            }
        }
    }

    /// Sets the entry at `(i1, i2)`. Out-of-range writes are ignored.
    pub fn set_value2(&mut self, value: T, i1: i64, i2: i64) {
        if let Some(i) = self.linear2(i1, i2) {
            self.data[i] = value;
        }
    }

    /// Sets the entry at `(i1, i2, i3)`. Out-of-range writes are ignored.
    pub fn set_value3(&mut self, value: T, i1: i64, i2: i64, i3: i64) {
        if let Some(i) = self.linear3(i1, i2, i3) {
            self.data[i] = value;
        }
    }

    fn linear2(&self, i1: i64, i2: i64) -> Option<usize> {
        let i1 = index_in(i1, self.dims[0])?;
        let i2 = index_in(i2, self.dims[1])?;
        Some(i1 + self.dims[0] * i2)
    }

    fn linear3(&self, i1: i64, i2: i64, i3: i64) -> Option<usize> {
        let i1 = index_in(i1, self.dims[0])?;
        let i2 = index_in(i2, self.dims[1])?;
        let i3 = index_in(i3, self.dims[2])?;
        Some(i1 + self.dims[0] * (i2 + self.dims[1] * i3))
    }

    /// Changes the dimensions without touching the entries.
    ///
    /// # Errors
    ///
    /// Returns `MdaError::ReshapeSizeMismatch` and leaves the array untouched
    /// when the new dims do not multiply to `total_size()`.
    pub fn reshape(&mut self, dims: &[usize]) -> Result<()> {
        let padded = pad_dims(dims)?;
        if padded.iter().product::<usize>() != self.data.len() {
            return Err(MdaError::ReshapeSizeMismatch {
                current: self.data.len(),
                proposed: dims.to_vec(),
            });
        }
        self.dims = padded;
        Ok(())
    }

    /// Copies `size` entries starting at linear index `i` into a new
    /// `size x 1` array. Positions outside the array are zero.
    pub fn get_chunk(&self, i: i64, size: usize) -> Mda<T> {
        let mut chunk = Mda::new([size, 1, 1, 1, 1, 1]);
        if let Some((src, dst, len)) = clip(i, size, self.data.len()) {
            chunk.data[dst..dst + len].copy_from_slice(&self.data[src..src + len]);
        }
        chunk
    }

    /// Copies a `size1 x size2` block starting at `(i1, i2)`. Positions
    /// outside the array are zero.
    pub fn get_chunk2(&self, i1: i64, i2: i64, size1: usize, size2: usize) -> Mda<T> {
        let mut chunk = Mda::new([size1, size2, 1, 1, 1, 1]);
        let Some((src1, dst1, len1)) = clip(i1, size1, self.dims[0]) else {
            return chunk;
        };
        for j2 in 0..size2 {
            let Some(k2) = index_in(i2 + j2 as i64, self.dims[1]) else {
                continue;
            };
            let src = src1 + self.dims[0] * k2;
            let dst = dst1 + size1 * j2;
            chunk.data[dst..dst + len1].copy_from_slice(&self.data[src..src + len1]);
        }
        chunk
    }

    /// Copies a `size1 x size2 x size3` block starting at `(i1, i2, i3)`.
    /// Positions outside the array are zero.
    pub fn get_chunk3(
        &self,
        i1: i64,
        i2: i64,
        i3: i64,
        size1: usize,
        size2: usize,
        size3: usize,
    ) -> Mda<T> {
        let mut chunk = Mda::new([size1, size2, size3, 1, 1, 1]);
        let Some((src1, dst1, len1)) = clip(i1, size1, self.dims[0]) else {
            return chunk;
        };
        for j3 in 0..size3 {
            let Some(k3) = index_in(i3 + j3 as i64, self.dims[2]) else {
                continue;
            };
            for j2 in 0..size2 {
                let Some(k2) = index_in(i2 + j2 as i64, self.dims[1]) else {
                    continue;
                };
                let src = src1 + self.dims[0] * (k2 + self.dims[1] * k3);
                let dst = dst1 + size1 * (j2 + size2 * j3);
                chunk.data[dst..dst + len1].copy_from_slice(&self.data[src..src + len1]);
            }
        }
        chunk
    }

    /// Converts every entry to another sample type.
    pub fn cast<U: Sample>(&self) -> Mda<U> {
        Mda {
            dims: self.dims,
            data: self.data.iter().map(|v| U::from_f64(v.to_f64())).collect(),
        }
    }

    /// Reads a whole array from an `.mda`, `.txt` or `.csv` file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or holds fewer
    /// entries than its header declares.
    pub fn read(path: &Path) -> Result<Self> {
        if format::text::is_text_path(path) {
            return Ok(format::text::read_text(path)?.cast());
        }

        let mut reader = BufReader::new(File::open(path)?);
        let header = MdaHeader::read_from(&mut reader)?;
        let total = header.total_size();
        let mut bytes = Vec::with_capacity(total * header.bytes_per_entry);
        reader.read_to_end(&mut bytes)?;

        let mut data = vec![T::default(); total];
        let decoded = format::decode_into(header.data_type, &bytes, &mut data);
        if decoded != total {
            return Err(MdaError::ShortRead {
                expected: total,
                actual: decoded,
            });
        }
        Ok(Self {
            dims: header.dims,
            data,
        })
    }

    /// Writes the array to `path` with the given stored type.
    ///
    /// Storing into a narrower type than `T` is lossy.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written.
    pub fn write(&self, path: &Path, data_type: DataType) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        self.write_to(&mut writer, data_type)?;
        writer.flush()?;
        Ok(())
    }

    /// Writes header and entries to any writer.
    pub fn write_to<W: Write>(&self, writer: &mut W, data_type: DataType) -> Result<()> {
        MdaHeader::new(data_type, self.dims).write_to(writer)?;
        let mut bytes = Vec::new();
        for block in self.data.chunks(64 * 1024) {
            bytes.clear();
            format::encode_into(data_type, block, &mut bytes);
            writer.write_all(&bytes)?;
        }
        Ok(())
    }

    /// Writes the array as float64 entries.
    pub fn write64(&self, path: &Path) -> Result<()> {
        self.write(path, DataType::Float64)
    }

    /// Writes the array as float32 entries.
    pub fn write32(&self, path: &Path) -> Result<()> {
        self.write(path, DataType::Float32)
    }
}

fn index_in(i: i64, dim: usize) -> Option<usize> {
    if i < 0 || i as u64 >= dim as u64 {
        None
    } else {
        Some(i as usize)
    }
}

/// Clips the request `[start, start + size)` against `[0, len)`.
///
/// Returns `(source offset, destination offset, length)` for the overlap,
/// or `None` when nothing overlaps.
pub(crate) fn clip(start: i64, size: usize, len: usize) -> Option<(usize, usize, usize)> {
    let first = start.max(0);
    let end = start.saturating_add(size as i64).min(len as i64);
    if end <= first {
        return None;
    }
    Some((first as usize, (first - start) as usize, (end - first) as usize))
}
