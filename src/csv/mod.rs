//! Line-oriented CSV shard reader.
//!
//! Shards are plain text with a mandatory exact header line followed by
//! seven comma-separated integer fields per record. A malformed record
//! fails with an error but leaves the reader usable: the caller counts
//! the error and keeps reading. A malformed or missing header is fatal.

pub mod scan;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::Result;
use crate::errinput;

/// The mandatory first line of every shard.
pub const CSV_HEADER: &str = "date,time,area,residence,age,gender,population";

/// One validated CSV record.
///
/// The residence/age/gender fields carry the sentinel `-1` in the
/// supported flavor and are not keys; population is the cell value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
    /// Calendar date as concatenated decimal `YYYYMMDD`.
    pub date: u32,
    /// Wall-clock time as concatenated decimal `HHMM`.
    pub time: u16,
    /// Mesh key.
    pub area: u64,
    pub residence: i32,
    pub age: i32,
    pub gender: i32,
    /// Cell value.
    pub population: i32,
}

pub struct CsvReader {
    reader: BufReader<File>,
    line: String,
    line_number: u64,
    header_validated: bool,
    fatal: bool,
}

impl CsvReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Ok(Self {
            reader: BufReader::new(file),
            line: String::new(),
            line_number: 0,
            header_validated: false,
            fatal: false,
        })
    }

    /// Current line number, for diagnostics.
    pub fn line_number(&self) -> u64 {
        self.line_number
    }

    /// True once the reader has hit a fatal condition (bad header or
    /// I/O failure). Record-level parse errors are not fatal.
    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    /// Read the next record. `Ok(None)` signals end of file; `Err` on a
    /// malformed record leaves the reader positioned at the next line.
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        if self.fatal {
            return errinput!("csv reader previously failed");
        }
        if !self.header_validated {
            self.validate_header()?;
        }

        match self.read_line()? {
            None => Ok(None),
            Some(()) => {
                let line = trimmed(&self.line);
                match scan::parse_record(line).or_else(|| scan::parse_record_scalar(line)) {
                    Some(record) => Ok(Some(record)),
                    None => errinput!("malformed record at line {}", self.line_number),
                }
            }
        }
    }

    fn validate_header(&mut self) -> Result<()> {
        if self.read_line()?.is_none() {
            self.fatal = true;
            return errinput!("missing csv header");
        }
        let line = trimmed(&self.line);
        if line != CSV_HEADER {
            self.fatal = true;
            return errinput!("bad csv header: {line:?}");
        }
        self.header_validated = true;
        Ok(())
    }

    fn read_line(&mut self) -> Result<Option<()>> {
        self.line.clear();
        let read = match self.reader.read_line(&mut self.line) {
            Ok(read) => read,
            Err(e) => {
                self.fatal = true;
                return Err(e.into());
            }
        };
        if read == 0 {
            return Ok(None);
        }
        self.line_number += 1;
        Ok(Some(()))
    }
}

fn trimmed(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}
