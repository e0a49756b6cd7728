//! Remote backend: byte sources, the array session and parallel download.

pub mod download;
pub mod session;
pub mod source;

pub use download::{download_file, DownloadOptions, Interrupt};
pub use session::RemoteArray;
pub use source::{ByteSource, HttpSource};
