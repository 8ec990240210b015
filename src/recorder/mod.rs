//! NDJSON recorder: one serialized envelope (or raw payload) per line.

pub mod replayer;

pub use replayer::Replayer;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::MockError;
use crate::event::Event;

/// Records are flushed to disk every this many writes to bound data
/// loss on crash.
pub const FLUSH_EVERY: u64 = 100;

/// Append-only newline-delimited event writer
pub struct Recorder {
    writer: Mutex<BufWriter<File>>,
    count: AtomicU64,
}

impl Recorder {
    /// Create (or truncate) the recording file.
    pub fn create(path: &Path) -> Result<Self, MockError> {
        let file = File::create(path).map_err(|e| {
            MockError::Recording(format!(
                "failed to create recording file {}: {e}",
                path.display()
            ))
        })?;

        Ok(Recorder {
            writer: Mutex::new(BufWriter::new(file)),
            count: AtomicU64::new(0),
        })
    }

    /// Write one envelope as a JSON line.
    pub fn record(&self, event: &Event) -> Result<(), MockError> {
        let line = serde_json::to_vec(event)?;
        self.write_line(&line)
    }

    /// Write one pre-serialized payload as a line. Used by vendor
    /// pass-through recordings.
    pub fn record_raw(&self, payload: &[u8]) -> Result<(), MockError> {
        self.write_line(payload)
    }

    fn write_line(&self, payload: &[u8]) -> Result<(), MockError> {
        let mut writer = self.writer.lock().unwrap();
        writer.write_all(payload)?;
        writer.write_all(b"\n")?;

        let written = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        if written % FLUSH_EVERY == 0 {
            writer.flush()?;
        }
        Ok(())
    }

    /// Number of records written so far.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Consume events from a subscription until it closes or the token
    /// fires; `on_each` observes the running count.
    pub async fn record_from_stream(
        &self,
        cancel: CancellationToken,
        mut events: mpsc::Receiver<Event>,
        mut on_each: impl FnMut(u64),
    ) -> Result<(), MockError> {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => {
                    let Some(event) = event else { break };
                    self.record(&event)?;
                    on_each(self.count());
                }
            }
        }
        self.flush()?;
        debug!(records = self.count(), "recording stream closed");
        Ok(())
    }

    /// Force buffered records to disk.
    pub fn flush(&self) -> Result<(), MockError> {
        self.writer.lock().unwrap().flush()?;
        Ok(())
    }

    /// Flush and release the file.
    pub fn close(&self) -> Result<(), MockError> {
        self.flush()
    }
}
