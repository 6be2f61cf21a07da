use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use serde::Serialize;

use crate::dataset::{Dataset, Row};
use crate::error::Result;
use crate::value::Value;

/// Read a CSV file with a header row into a dataset of inferred values.
pub fn read_csv(path: &Path) -> Result<Dataset> {
    let file = File::open(path)?;
    read_csv_from(file)
}

/// Read CSV data from any reader. Ragged rows are padded with nulls.
pub fn read_csv_from<R: Read>(reader: R) -> Result<Dataset> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let columns: Vec<String> = reader
        .headers()?
        .iter()
        .map(|name| name.trim().to_string())
        .collect();
    let mut dataset = Dataset::new(columns);

    for record in reader.records() {
        let record = record?;
        let values = record.iter().map(Value::infer).collect();
        dataset.push_row(Row::new(values));
    }

    Ok(dataset)
}

/// Write a dataset as CSV, returning the number of bytes written.
pub fn write_csv(path: &Path, dataset: &Dataset) -> Result<u64> {
    let writer = BufWriter::new(File::create(path)?);
    let counting = CountingWriter::new(writer);
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(counting);

    writer.write_record(dataset.columns())?;
    for row in dataset.rows() {
        writer.write_record(row.values().iter().map(Value::to_csv_field))?;
    }

    writer.flush()?;
    let counting = writer
        .into_inner()
        .map_err(|err| std::io::Error::other(err.to_string()))?;
    Ok(counting.bytes_written())
}

/// Serialize typed records through CSV and read them back as a dataset.
pub fn records_to_dataset<T: Serialize>(records: &[T]) -> Result<Dataset> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for record in records {
        writer.serialize(record)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| std::io::Error::other(err.to_string()))?;
    if bytes.is_empty() {
        return Ok(Dataset::default());
    }
    read_csv_from(bytes.as_slice())
}

struct CountingWriter<W: Write> {
    inner: W,
    bytes: u64,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, bytes: 0 }
    }

    fn bytes_written(&self) -> u64 {
        self.bytes
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let size = self.inner.write(buf)?;
        self.bytes = self.bytes.saturating_add(size as u64);
        Ok(size)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
