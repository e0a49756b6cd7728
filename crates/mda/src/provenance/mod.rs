//! Provenance: content-addressed dataset references.
//!
//! A [`Provenance`] descriptor names a file by its checksum, fast checksum
//! and size, with the original path as a hint. [`resolve`] turns it into a
//! verified local path using a [`ChecksumIndex`] and, failing that, the hint.

pub mod checksum;
pub mod descriptor;
pub mod index;
pub mod resolver;

pub use descriptor::{matches_fast_checksum, FastChecksum, Provenance};
pub use index::{ChecksumIndex, CommandIndex, DirectoryIndex, NoIndex};
pub use resolver::resolve;
