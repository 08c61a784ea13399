//! Async drain of the event log into a text file

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{info, instrument, warn};

use crate::error::StorageError;
use crate::export::format::format_event;
use crate::export::reader::LogReader;

/// Records read per batch while dumping
const DUMP_BATCH: usize = 4096;

/// Outcome of a file dump
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpSummary {
    /// File written
    pub path: PathBuf,
    /// Lines written
    pub written: usize,
    /// Ordinal gaps seen while reading
    pub discontinuities: u64,
    /// Records cleared when the reader closed
    pub cleared: usize,
    /// Records appended during the dump and cleared without being written
    pub unread: usize,
}

/// Drain `reader` into `path`, one line per event, then close the reader
///
/// The file is created or truncated. A draining reader resets the log only
/// after every line has been flushed; on an I/O error the reader is
/// abandoned so the records stay in the log.
#[instrument(skip(reader, path), fields(path = %path.as_ref().display(), mode = ?reader.mode()))]
pub async fn dump_to_file(
    mut reader: LogReader,
    path: impl AsRef<Path>,
) -> Result<DumpSummary, StorageError> {
    let path = path.as_ref().to_path_buf();

    let written = match write_all(&mut reader, &path).await {
        Ok(written) => written,
        Err(e) => {
            warn!(error = %e, "Event dump failed, keeping records in the log");
            reader.abandon();
            return Err(e);
        }
    };

    let discontinuities = reader.discontinuities();
    let (cleared, unread) = close_reader(reader).await?;

    info!(
        written = written,
        discontinuities = discontinuities,
        cleared = cleared,
        "Event dump complete"
    );

    Ok(DumpSummary {
        path,
        written,
        discontinuities,
        cleared,
        unread,
    })
}

/// Close the reader off the async executor, returning `(cleared, unread)`
///
/// Closing a draining reader resets the log, which waits for an in-flight
/// append.
async fn close_reader(reader: LogReader) -> Result<(usize, usize), StorageError> {
    let read = reader.position();
    let cleared = tokio::task::spawn_blocking(move || reader.close())
        .await
        .map_err(|e| StorageError::Io(format!("reader close task failed: {e}")))?;

    let unread = cleared.saturating_sub(read);
    if unread > 0 {
        warn!(
            cleared = cleared,
            unread = unread,
            "Records appended during the dump were cleared without being written"
        );
    }
    Ok((cleared, unread))
}

async fn write_all(reader: &mut LogReader, path: &Path) -> Result<usize, StorageError> {
    let file = File::create(path).await?;
    let mut writer = BufWriter::new(file);
    let mut written = 0;
    let mut chunk = String::new();

    loop {
        let page = reader.next_page(DUMP_BATCH);
        if page.is_empty() {
            break;
        }

        chunk.clear();
        for event in &page {
            chunk.push_str(&format_event(event));
            chunk.push('\n');
        }
        writer.write_all(chunk.as_bytes()).await?;
        written += page.len();
    }

    writer.flush().await?;
    Ok(written)
}
