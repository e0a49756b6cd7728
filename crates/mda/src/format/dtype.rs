//! Stored element types.

use crate::error::{MdaError, Result};

/// Element type of the entries stored in an `.mda` file.
///
/// The discriminant is the on-disk type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum DataType {
    /// Unsigned 8-bit integer.
    Byte = -2,
    /// 32-bit IEEE float.
    Float32 = -3,
    /// Signed 16-bit integer.
    Int16 = -4,
    /// Signed 32-bit integer.
    Int32 = -5,
    /// Unsigned 16-bit integer.
    UInt16 = -6,
    /// 64-bit IEEE float.
    #[default]
    Float64 = -7,
    /// Unsigned 32-bit integer.
    UInt32 = -8,
}

impl DataType {
    /// Creates a DataType from its on-disk code.
    ///
    /// # Errors
    ///
    /// Returns `MdaError::UnsupportedDataType` for complex (`-1`) and unknown codes.
    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            -2 => Ok(Self::Byte),
            -3 => Ok(Self::Float32),
            -4 => Ok(Self::Int16),
            -5 => Ok(Self::Int32),
            -6 => Ok(Self::UInt16),
            -7 => Ok(Self::Float64),
            -8 => Ok(Self::UInt32),
            other => Err(MdaError::UnsupportedDataType(other)),
        }
    }

    /// Returns the on-disk code.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Size of one stored entry in bytes.
    pub fn bytes_per_entry(self) -> usize {
        match self {
            Self::Byte => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Float32 | Self::Int32 | Self::UInt32 => 4,
            Self::Float64 => 8,
        }
    }
}
