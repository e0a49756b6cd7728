//! Positional byte sources for the Remote backend.

use crate::error::{MdaError, Result};
use bytes::Bytes;
use reqwest::blocking::{Client, Response};
use reqwest::header::{CONTENT_LENGTH, RANGE};
use reqwest::StatusCode;
use std::fmt::Debug;
use std::io;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Number of attempts made for each HTTP request.
pub const HTTP_ATTEMPTS: u64 = 3;

/// A source supporting blocking positional reads.
///
/// Implementations must be shareable across the worker threads of a
/// parallel download.
pub trait ByteSource: Debug + Send + Sync {
    /// Reads the bytes in `range`.
    ///
    /// A range extending past the end of the source yields only the bytes
    /// that exist, so callers detect short reads by length.
    fn read_byte_range(&self, range: Range<u64>) -> io::Result<Bytes>;

    /// Total number of bytes readable.
    fn size(&self) -> io::Result<u64>;
}

impl ByteSource for Bytes {
    fn read_byte_range(&self, range: Range<u64>) -> io::Result<Bytes> {
        let len = self.len() as u64;
        let start = range.start.min(len) as usize;
        let end = range.end.min(len).max(range.start.min(len)) as usize;
        Ok(self.slice(start..end))
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.len() as u64)
    }
}

impl<T: ByteSource + ?Sized> ByteSource for Arc<T> {
    fn read_byte_range(&self, range: Range<u64>) -> io::Result<Bytes> {
        T::read_byte_range(self, range)
    }

    fn size(&self) -> io::Result<u64> {
        T::size(self)
    }
}

/// HTTP(S) source using `Range` requests.
#[derive(Debug, Clone)]
pub struct HttpSource {
    url: Url,
    client: Client,
}

impl HttpSource {
    /// Creates a source for an `http://` or `https://` URL.
    ///
    /// # Errors
    ///
    /// Returns `MdaError::Remote` for malformed URLs or other schemes, and
    /// `MdaError::Http` if the client cannot be built.
    pub fn new(url: &str) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| MdaError::Remote(format!("{url}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(MdaError::Remote(format!("unsupported scheme in {url}")));
        }
        Ok(Self {
            url,
            client: Client::builder().build()?,
        })
    }

    /// Target URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    fn send_with_retry<F>(&self, make_req: F) -> io::Result<Response>
    where
        F: Fn() -> reqwest::Result<Response>,
    {
        let mut last_err = None;
        for attempt in 1..=HTTP_ATTEMPTS {
            match make_req().and_then(|r| r.error_for_status()) {
                Ok(response) => return Ok(response),
                Err(e) => {
                    warn!("Request to {} errored with {e}, attempt {attempt}", self.url);
                    last_err = Some(e);
                }
            }
            if attempt < HTTP_ATTEMPTS {
                // Very basic backoff
                std::thread::sleep(Duration::from_secs(attempt));
            }
        }
        Err(io::Error::other(format!(
            "exhausted retry attempts for {}: {}",
            self.url,
            last_err.map(|e| e.to_string()).unwrap_or_default()
        )))
    }
}

impl ByteSource for HttpSource {
    fn read_byte_range(&self, range: Range<u64>) -> io::Result<Bytes> {
        if range.is_empty() {
            return Ok(Bytes::new());
        }
        let range_header = format!("bytes={}-{}", range.start, range.end - 1);
        debug!("GET {} {}", self.url, range_header);
        let response = self.send_with_retry(|| {
            self.client
                .get(self.url.clone())
                .header(RANGE, range_header.as_str())
                .send()
        })?;

        let status = response.status();
        let body = response.bytes().map_err(io::Error::other)?;
        if status == StatusCode::PARTIAL_CONTENT {
            return Ok(body);
        }

        // Server ignored the range and sent the whole body.
        let len = body.len() as u64;
        let start = range.start.min(len) as usize;
        let end = range.end.min(len).max(start as u64) as usize;
        Ok(body.slice(start..end))
    }

    fn size(&self) -> io::Result<u64> {
        let response = self.send_with_retry(|| self.client.head(self.url.clone()).send())?;
        response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok())
            .ok_or_else(|| io::Error::other(format!("no content length for {}", self.url)))
    }
}
