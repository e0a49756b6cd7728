//! Conversion between stored entries and caller-visible samples.
//!
//! Integer types and float64 pass through `f64`; float32 passes through
//! `f32` so the 32-bit pipeline keeps its precision. Narrowing on either
//! side (f64 storage read as `f32`, or any float written to an integer
//! type) is lossy by contract: integer targets truncate toward zero and
//! saturate at the type bounds.

use crate::format::DataType;
use std::fmt::Debug;

/// Caller-visible numeric element type.
pub trait Sample: Copy + Default + PartialEq + PartialOrd + Debug + Send + Sync + 'static {
    /// Converts from `f64`.
    fn from_f64(value: f64) -> Self;
    /// Converts from `f32`.
    fn from_f32(value: f32) -> Self;
    /// Widens to `f64`.
    fn to_f64(self) -> f64;
    /// Converts to `f32`.
    fn to_f32(self) -> f32;
}

impl Sample for f64 {
    fn from_f64(value: f64) -> Self {
        value
    }

    fn from_f32(value: f32) -> Self {
        value as f64
    }

    fn to_f64(self) -> f64 {
        self
    }

    fn to_f32(self) -> f32 {
        self as f32
    }
}

impl Sample for f32 {
    fn from_f64(value: f64) -> Self {
        value as f32
    }

    fn from_f32(value: f32) -> Self {
        value
    }

    fn to_f64(self) -> f64 {
        self as f64
    }

    fn to_f32(self) -> f32 {
        self
    }
}

/// Decodes stored entries from `bytes` into `out`.
///
/// Returns the number of complete entries decoded, which is the smaller of
/// `out.len()` and the number of whole entries in `bytes`.
pub fn decode_into<T: Sample>(data_type: DataType, bytes: &[u8], out: &mut [T]) -> usize {
    let width = data_type.bytes_per_entry();
    let count = out.len().min(bytes.len() / width);
    let entries = bytes.chunks_exact(width).take(count);

    match data_type {
        DataType::Byte => {
            for (slot, raw) in out.iter_mut().zip(entries) {
                *slot = T::from_f64(raw[0] as f64);
            }
        }
        DataType::Int16 => {
            for (slot, raw) in out.iter_mut().zip(entries) {
                *slot = T::from_f64(i16::from_le_bytes([raw[0], raw[1]]) as f64);
            }
        }
        DataType::UInt16 => {
            for (slot, raw) in out.iter_mut().zip(entries) {
                *slot = T::from_f64(u16::from_le_bytes([raw[0], raw[1]]) as f64);
            }
        }
        DataType::Int32 => {
            for (slot, raw) in out.iter_mut().zip(entries) {
                *slot = T::from_f64(i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as f64);
            }
        }
        DataType::UInt32 => {
            for (slot, raw) in out.iter_mut().zip(entries) {
                *slot = T::from_f64(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as f64);
            }
        }
        DataType::Float32 => {
            for (slot, raw) in out.iter_mut().zip(entries) {
                *slot = T::from_f32(f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]));
            }
        }
        DataType::Float64 => {
            for (slot, raw) in out.iter_mut().zip(entries) {
                let mut buf8 = [0u8; 8];
                buf8.copy_from_slice(raw);
                *slot = T::from_f64(f64::from_le_bytes(buf8));
            }
        }
    }

    count
}

/// Appends `values` encoded as `data_type` entries to `out`.
pub fn encode_into<T: Sample>(data_type: DataType, values: &[T], out: &mut Vec<u8>) {
    out.reserve(values.len() * data_type.bytes_per_entry());
    for &value in values {
        match data_type {
            DataType::Byte => out.push(value.to_f64() as u8),
            DataType::Int16 => out.extend_from_slice(&(value.to_f64() as i16).to_le_bytes()),
            DataType::UInt16 => out.extend_from_slice(&(value.to_f64() as u16).to_le_bytes()),
            DataType::Int32 => out.extend_from_slice(&(value.to_f64() as i32).to_le_bytes()),
            DataType::UInt32 => out.extend_from_slice(&(value.to_f64() as u32).to_le_bytes()),
            DataType::Float32 => out.extend_from_slice(&value.to_f32().to_le_bytes()),
            DataType::Float64 => out.extend_from_slice(&value.to_f64().to_le_bytes()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float64_exact() {
        let values = [0.1f64, -2.5e300, std::f64::consts::PI];
        let mut bytes = Vec::new();
        encode_into(DataType::Float64, &values, &mut bytes);
        assert_eq!(bytes.len(), 24);

        let mut out = [0.0f64; 3];
        assert_eq!(decode_into(DataType::Float64, &bytes, &mut out), 3);
        assert_eq!(out, values);
    }

    #[test]
    fn test_float32_preserved_on_32bit_path() {
        let values = [0.1f32, 1.0e-7, 12345.678];
        let mut bytes = Vec::new();
        encode_into(DataType::Float32, &values, &mut bytes);

        let mut out = [0.0f32; 3];
        decode_into(DataType::Float32, &bytes, &mut out);
        assert_eq!(out, values);

        let mut wide = [0.0f64; 3];
        decode_into(DataType::Float32, &bytes, &mut wide);
        for (w, v) in wide.iter().zip(values.iter()) {
            assert_eq!(*w, *v as f64);
        }
    }

    #[test]
    fn test_integer_truncation_and_saturation() {
        let values = [1.9f64, -1.9, 70000.0, -5.0];
        let mut bytes = Vec::new();
        encode_into(DataType::Int16, &values, &mut bytes);

        let mut out = [0.0f64; 4];
        decode_into(DataType::Int16, &bytes, &mut out);
        assert_eq!(out, [1.0, -1.0, i16::MAX as f64, -5.0]);

        bytes.clear();
        encode_into(DataType::Byte, &[300.0f64, -3.0, 7.2], &mut bytes);
        let mut out = [0.0f64; 3];
        decode_into(DataType::Byte, &bytes, &mut out);
        assert_eq!(out, [255.0, 0.0, 7.0]);
    }

    #[test]
    fn test_decode_partial_bytes() {
        let mut bytes = Vec::new();
        encode_into(DataType::UInt32, &[1.0f64, 2.0, 3.0], &mut bytes);
        bytes.truncate(10);

        let mut out = [0.0f64; 3];
        assert_eq!(decode_into(DataType::UInt32, &bytes, &mut out), 2);
        assert_eq!(out, [1.0, 2.0, 0.0]);
    }
}
