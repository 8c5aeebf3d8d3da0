use super::row_stream::Record;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;
use std::io::{self, Write};

/// The metadata envelope written ahead of an archive's records.
///
/// Field order is the on-disk order.
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveHeader<'a> {
    pub database: &'a str,
    pub schema: &'a str,
    pub table: &'a str,
    pub columns: &'a [String],
    pub backup_timestamp: &'a str,
}

/// Writes one archive document into a gzip stream, one record at a time.
///
/// The document is only well formed once [`ArchiveWriter::finish`] has run. Dropping the writer
/// early leaves a truncated stream behind.
#[derive(Debug)]
pub struct ArchiveWriter<W: Write> {
    buffer: Vec<u8>,
    encoder: GzEncoder<W>,
    row_count: u64,
}

impl<W: Write> ArchiveWriter<W> {
    /// Start a document on `writer` and emit everything up to the opening of the `data` array.
    pub fn begin(writer: W, header: &ArchiveHeader<'_>) -> io::Result<Self> {
        let mut buffer = serde_json::to_vec(header)?;

        // reopen the header object to append the records array
        let _ = buffer.pop();
        buffer.extend_from_slice(b",\"data\":[");

        let mut encoder = GzEncoder::new(writer, Compression::default());
        encoder.write_all(&buffer)?;
        buffer.clear();

        Ok(Self {
            buffer,
            encoder,
            row_count: 0,
        })
    }

    #[must_use]
    pub const fn row_count(&self) -> u64 {
        self.row_count
    }

    pub fn write_record(&mut self, record: &Record) -> io::Result<()> {
        if self.row_count > 0 {
            self.buffer.push(b',');
        }

        serde_json::to_writer(&mut self.buffer, record)?;
        self.encoder.write_all(&self.buffer)?;
        self.buffer.clear();
        self.row_count += 1;
        Ok(())
    }

    /// Close the array and the document, flush the compressor and hand back the inner writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.encoder.write_all(b"]}")?;
        self.encoder.finish()
    }
}
