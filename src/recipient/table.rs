//! Table module.
//!
//! This module contains the recipient table, its delimited text
//! representation and the pending set computation.

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    collections::HashSet,
    fs,
    io::{self, Read, Write},
    path::{Path, PathBuf},
    result,
};
use thiserror::Error;

use super::{Outcome, Row, Status, RESERVED_FIELDS};

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot read recipient table {1}")]
    ReadTableError(#[source] io::Error, PathBuf),
    #[error("cannot read recipient table")]
    ReadCsvError(#[source] io::Error),
    #[error("cannot parse recipient table")]
    ParseCsvError(#[source] csv::Error),
    #[error("cannot write recipient table")]
    WriteCsvError(#[source] csv::Error),
    #[error("cannot flush recipient table")]
    FlushCsvError(#[source] io::Error),
    #[error("cannot write recipient table {1}")]
    WriteTableError(#[source] io::Error, PathBuf),
    #[error("cannot find row {0}: table has {1} rows")]
    FindRowError(usize, usize),
    #[error("cannot update row {0}: it has already been sent")]
    UpdateSentRowError(usize),
}

pub type Result<T> = result::Result<T, Error>;

/// Represents the recipient table: ordered headers and rows.
#[derive(Debug, Default, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    /// Builds a table from rows. Headers follow the order in which
    /// fields are first seen, and reserved fields are added when
    /// missing.
    pub fn from_rows<I: IntoIterator<Item = Row>>(rows: I) -> Self {
        let rows: Vec<Row> = rows.into_iter().collect();
        let mut headers: Vec<String> = Vec::new();
        for row in &rows {
            let mut names: Vec<&str> = row.names().collect();
            names.sort_unstable();
            for name in names {
                if !headers.iter().any(|header| header == name) {
                    headers.push(name.to_owned());
                }
            }
        }
        Self::new(headers, rows)
    }

    pub fn new(mut headers: Vec<String>, mut rows: Vec<Row>) -> Self {
        for name in RESERVED_FIELDS {
            if !headers.iter().any(|header| header == name) {
                headers.push(name.to_owned());
            }
        }

        for row in rows.iter_mut() {
            for header in &headers {
                if !row.contains(header) {
                    row.set(header, "");
                }
            }
            row.init_reserved_fields();
        }

        Self { headers, rows }
    }

    /// Reads a table from delimited text. UTF-8 is tried first, then
    /// Windows-1252.
    pub fn from_csv_bytes(bytes: &[u8]) -> Result<Self> {
        trace!(">> read recipient table");

        let text: Cow<str> = match std::str::from_utf8(bytes) {
            Ok(text) => Cow::Borrowed(text),
            Err(err) => {
                warn!("recipient table is not valid utf-8, reading it as windows-1252: {}", err);
                encoding_rs::WINDOWS_1252.decode_without_bom_handling(bytes).0
            }
        };
        let text = text.trim_start_matches('\u{feff}');

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(text.as_bytes());

        let headers = dedup_headers(
            reader
                .headers()
                .map_err(Error::ParseCsvError)?
                .iter()
                .map(ToOwned::to_owned)
                .collect(),
        );
        debug!("recipient table headers: {:?}", headers);

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(Error::ParseCsvError)?;
            let row: Row = headers
                .iter()
                .enumerate()
                .map(|(i, header)| (header, record.get(i).unwrap_or_default()))
                .collect();
            rows.push(row);
        }
        debug!("recipient table rows: {}", rows.len());

        trace!("<< read recipient table");
        Ok(Self::new(headers, rows))
    }

    pub fn from_csv_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(Error::ReadCsvError)?;
        Self::from_csv_bytes(&bytes)
    }

    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|err| Error::ReadTableError(err, path.to_owned()))?;
        Self::from_csv_bytes(&bytes)
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        writer
            .write_record(&self.headers)
            .map_err(Error::WriteCsvError)?;
        for row in &self.rows {
            writer
                .write_record(
                    self.headers
                        .iter()
                        .map(|header| row.get(header).unwrap_or_default()),
                )
                .map_err(Error::WriteCsvError)?;
        }
        writer.flush().map_err(Error::FlushCsvError)
    }

    pub fn to_csv_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.write_csv(&mut bytes)?;
        Ok(bytes)
    }

    pub fn write_csv_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.to_csv_bytes()?;
        fs::write(path, bytes).map_err(|err| Error::WriteTableError(err, path.to_owned()))
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn count(&self, status: Status) -> usize {
        self.rows.iter().filter(|row| row.status() == status).count()
    }

    /// Gets the indices of the rows not sent yet, in table order.
    pub fn pending_rows(&self) -> Vec<usize> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.status() != Status::Sent)
            .map(|(index, _)| index)
            .collect()
    }

    /// Writes the outcome of a dispatch attempt to the given row. The
    /// status and the correlation fields change together, and a sent
    /// row cannot be updated anymore.
    pub fn record(&mut self, index: usize, outcome: &Outcome) -> Result<()> {
        let len = self.rows.len();
        let row = self
            .rows
            .get_mut(index)
            .ok_or(Error::FindRowError(index, len))?;

        if row.status() == Status::Sent {
            return Err(Error::UpdateSentRowError(index));
        }

        row.apply(outcome);
        debug!("row {} is now {:?}", index, outcome.status());
        Ok(())
    }
}

/// Gets the indices of the rows not sent yet, in table order.
pub fn pending_rows(table: &Table) -> Vec<usize> {
    table.pending_rows()
}

/// Suffixes duplicated headers with `.1`, `.2`… so that every field
/// stays addressable.
fn dedup_headers(headers: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    headers
        .into_iter()
        .map(|header| {
            let mut name = header.clone();
            let mut count = 0;
            while !seen.insert(name.clone()) {
                count += 1;
                name = format!("{}.{}", header, count);
            }
            name
        })
        .collect()
}
