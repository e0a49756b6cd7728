//! `.mda` array file format.
//!
//! ## File Structure
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Header (12 + num_dims * 4 bytes, or * 8 with 64-bit dims)   │
//! │  - Type code: i32 (negative, see DataType)                   │
//! │  - Bytes per entry: i32                                      │
//! │  - Num dims: i32 (negative => dimension fields are i64)      │
//! │  - Dims: [i32 | i64; |num_dims|]                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Entries                                                     │
//! │  - Row-major, first dimension varying fastest                │
//! │  - Entry k lives at header_size + bytes_per_entry * k        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! All fields are little-endian. Readers expose every stored type through
//! the [`Sample`] trait, so callers see a uniform numeric type.

pub mod codec;
pub mod dtype;
pub mod header;
pub mod text;

pub use codec::{decode_into, encode_into, Sample};
pub use dtype::DataType;
pub use header::{MdaHeader, MAX_DIMS};
