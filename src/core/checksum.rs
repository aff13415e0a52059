/*!
 * Streaming checksum calculation for hashing while storing
 */

use pin_project::pin_project;
use sha2::{Digest, Sha256};
use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

/// SHA-256 digest and byte count of a fully consumed stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentDigest {
    /// Raw SHA-256 bytes
    pub sha256: [u8; 32],

    /// Number of bytes hashed
    pub length: u64,
}

impl ContentDigest {
    /// Lowercase hex encoding of the digest (64 chars)
    pub fn to_hex(&self) -> String {
        hex::encode(self.sha256)
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Streaming hasher that calculates checksum incrementally
#[derive(Clone, Default)]
pub struct StreamingHasher {
    hasher: Sha256,
    bytes: u64,
}

impl StreamingHasher {
    /// Create a new streaming hasher
    pub fn new() -> Self {
        Self::default()
    }

    /// Update the hash with new data
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.bytes += data.len() as u64;
    }

    /// Bytes fed in so far
    pub fn bytes_processed(&self) -> u64 {
        self.bytes
    }

    /// Finalize and return the digest
    pub fn finalize(self) -> ContentDigest {
        ContentDigest {
            sha256: self.hasher.finalize().into(),
            length: self.bytes,
        }
    }
}

/// Hash a small in-memory buffer
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Reader that hashes every byte it passes through
///
/// The digest is only meaningful once the inner reader has reported end of
/// stream; see [`HashingReader::is_exhausted`].
#[pin_project]
pub struct HashingReader<R> {
    #[pin]
    inner: R,
    hasher: StreamingHasher,
    exhausted: bool,
}

impl<R: AsyncRead> HashingReader<R> {
    /// Wrap a reader
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: StreamingHasher::new(),
            exhausted: false,
        }
    }

    /// Bytes read through the wrapper so far
    pub fn bytes_read(&self) -> u64 {
        self.hasher.bytes_processed()
    }

    /// True once the inner reader returned end of stream
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Digest of everything read
    ///
    /// Calling this before the stream is exhausted is a logic error: the
    /// result covers only the bytes seen so far.
    pub fn finalize(self) -> ContentDigest {
        debug_assert!(self.exhausted, "HashingReader finalized before end of stream");
        self.hasher.finalize()
    }

    /// Recover the wrapped reader
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: AsyncRead> AsyncRead for HashingReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.project();
        let filled_before = buf.filled().len();
        let had_capacity = buf.remaining() > 0;

        ready!(this.inner.poll_read(cx, buf))?;

        let new_bytes = &buf.filled()[filled_before..];
        if new_bytes.is_empty() && had_capacity {
            *this.exhausted = true;
        }
        this.hasher.update(new_bytes);

        Poll::Ready(Ok(()))
    }
}
