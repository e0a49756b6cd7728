//! Alopex MDA - Virtual Multi-Dimensional Arrays
//!
//! This crate reads large multi-dimensional numeric arrays through one
//! handle, whether they live in memory, in a local `.mda` file, or on a
//! remote host, and resolves content-addressed dataset descriptors to
//! verified local files.
//!
//! # Components
//!
//! - [`VirtualArray`]: backend-polymorphic array handle
//! - [`Mda`]: owned in-memory array, also the result of every chunk read
//! - [`format`]: `.mda` header and element codec, text arrays
//! - [`Provenance`] / [`provenance::resolve`]: checksum-based trust protocol
//! - [`materialize()`]: content-addressed, write-once cache files
//! - [`RemoteArray`] / [`remote::download_file`]: HTTP range reads and
//!   parallel whole-file download
//!
//! # Example
//!
//! ```rust,ignore
//! use alopex_mda::{Mda, MdaConfig, MdaEnv, VirtualArray};
//!
//! // Compute the runtime environment once and share it
//! let env = MdaEnv::new(MdaConfig::from_env())?.shared();
//!
//! // Local files are opened lazily
//! let raw = VirtualArray::open("/data/raw.mda", env.clone())?;
//! let clip = raw.read_chunk_2d(0, 1000, raw.n1(), 500)?;
//!
//! // In-memory results get a durable, checksum-named path
//! let derived = VirtualArray::from_mda(clip, env.clone());
//! let path = derived.make_path()?;
//!
//! // Descriptors resolve through the checksum index, then the path hint
//! let prv = derived.to_provenance()?;
//! let again = VirtualArray::from_provenance(prv, env)?;
//! ```

#![deny(missing_docs)]

pub mod array;
pub mod chunk;
pub mod config;
pub mod error;
pub mod format;
pub mod materialize;
pub mod mda;
pub mod provenance;
pub mod remote;
pub mod scalar_cache;

pub use array::{BackendKind, VirtualArray};
pub use config::{MdaConfig, MdaEnv};
pub use error::{MdaError, Result};
pub use format::{DataType, MdaHeader, Sample};
pub use materialize::{materialize, CacheDir, Lifetime, Materialized};
pub use mda::{Mda, Mda32};
pub use provenance::{ChecksumIndex, CommandIndex, DirectoryIndex, NoIndex, Provenance};
pub use remote::{ByteSource, HttpSource, Interrupt, RemoteArray};
