use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::protocol;

/// Append-only destination for data records.
///
/// Records arrive verbatim from the device; every append is flushed so a
/// crash mid-session loses at most the in-flight line. `close` is
/// idempotent; after it, no further writes are possible.
pub trait RecordSink: Send {
    fn append(&mut self, record: &str) -> io::Result<()>;
    fn close(&mut self) -> io::Result<()>;
}

/// File-backed sink: fixed header line, then one record per line.
pub struct CsvSink {
    writer: Option<BufWriter<File>>,
}

impl CsvSink {
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);
        writer.write_all(protocol::CSV_HEADER.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(Self {
            writer: Some(writer),
        })
    }
}

impl RecordSink for CsvSink {
    fn append(&mut self, record: &str) -> io::Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "sink is closed"))?;
        writer.write_all(record.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()
    }

    fn close(&mut self) -> io::Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }
}

impl Drop for CsvSink {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
