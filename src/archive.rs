/*!
 * Streaming zip export of stored files
 */

use crate::backend::Backend;
use crate::dataset::DatasetVersion;
use crate::error::Result;
use async_zip::base::write::ZipFileWriter;
use async_zip::{Compression, ZipDateTime, ZipEntryBuilder};
use chrono::{DateTime, Utc};
use futures::io::AsyncWriteExt;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tracing::{debug, info, instrument};

/// Compression method for archive entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveCompression {
    /// Deflate (smaller archives)
    #[default]
    Deflate,

    /// No compression (cheaper for already compressed data)
    Stored,
}

impl From<ArchiveCompression> for Compression {
    fn from(compression: ArchiveCompression) -> Self {
        match compression {
            ArchiveCompression::Deflate => Compression::Deflate,
            ArchiveCompression::Stored => Compression::Stored,
        }
    }
}

/// Outcome of a zip export
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZipSummary {
    /// Entries written to the archive
    pub entries_written: usize,

    /// Requested paths that no longer exist
    pub entries_skipped: usize,

    /// Uncompressed bytes copied into entries
    pub bytes_written: u64,
}

/// Streams stored files into a zip archive
///
/// Entries are written with data descriptors, so neither entry sizes nor
/// the archive size are computed up front, and no entry is buffered whole.
pub struct ZipAssembler {
    backend: Arc<dyn Backend>,
    compression: ArchiveCompression,
}

impl ZipAssembler {
    pub fn new(backend: Arc<dyn Backend>, compression: ArchiveCompression) -> Self {
        Self {
            backend,
            compression,
        }
    }

    /// Write one entry per existing path, in order, then the central directory
    ///
    /// Missing paths are skipped. Any other failure returns immediately and
    /// leaves `output` holding a truncated archive.
    #[instrument(skip(self, paths, output), fields(dataset = %version, requested = paths.len()))]
    pub async fn write_zip<W>(
        &self,
        version: &DatasetVersion,
        paths: &[String],
        output: W,
    ) -> Result<ZipSummary>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let mut writer = ZipFileWriter::with_tokio(output);
        let mut summary = ZipSummary::default();

        for path in paths {
            let data = match self.backend.read(version, path).await {
                Ok(data) => data,
                Err(e) if e.is_not_found() => {
                    debug!(%path, "skipping missing file");
                    summary.entries_skipped += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let mut builder = ZipEntryBuilder::new(path.clone().into(), self.compression.into());
            if let Some(modified) = data.metadata.modified {
                let modified = DateTime::<Utc>::from(modified);
                builder = builder.last_modification_date(ZipDateTime::from_chrono(&modified));
            }

            let mut entry = writer.write_entry_stream(builder).await?;
            let mut stream = data.stream;
            while let Some(chunk) = stream.try_next().await? {
                entry.write_all(&chunk).await?;
                summary.bytes_written += chunk.len() as u64;
            }
            entry.close().await?;

            summary.entries_written += 1;
        }

        let mut output = writer.close().await?.into_inner();
        tokio::io::AsyncWriteExt::flush(&mut output).await?;

        info!(
            entries = summary.entries_written,
            skipped = summary.entries_skipped,
            bytes = summary.bytes_written,
            "zip archive written"
        );
        Ok(summary)
    }
}
