//! Streaming row decoder
//!
//! Reads a delimited source file one record at a time and maps each row into
//! a typed entity through [`FromRow`]. Nothing is buffered beyond the csv
//! reader's internal buffer and the current row, so memory stays flat no
//! matter how large the file is.
//!
//! # Field rules
//! - empty text is null, never zero
//! - integers are parsed base 10, floats as `f64`, dates as `YYYY-MM-DD`
//! - a malformed optional field, or one that is not UTF-8, becomes null and is
//!   counted as coerced
//! - a malformed or empty required key fails the row, and with it the stage

use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::marker::PhantomData;
use std::path::Path;
use std::str::Utf8Error;

use chrono::NaiveDate;
use tracing::debug;

use crate::error::{IngestError, IngestResult};

/// Entity types that can be built from one source row
pub trait FromRow: Sized {
    /// Columns whose absence from the header makes the file unusable
    const REQUIRED_COLUMNS: &'static [&'static str];

    fn from_row(row: &Row<'_>) -> Result<Self, FieldError>;
}

/// A required field that could not be decoded
#[derive(Debug, Clone, PartialEq)]
pub struct FieldError {
    pub column: &'static str,
    pub value: String,
    pub reason: String,
}

impl FieldError {
    fn new(column: &'static str, value: &str, reason: impl ToString) -> Self {
        Self {
            column,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Header name to column index
#[derive(Debug, Clone, Default)]
pub struct Columns {
    index: HashMap<String, usize>,
}

impl Columns {
    pub fn from_headers(headers: &csv::ByteRecord) -> Self {
        let index = headers
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let name = String::from_utf8_lossy(name);
                (name.trim().trim_start_matches('\u{feff}').to_lowercase(), i)
            })
            .collect();
        Self { index }
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.index.get(column).copied()
    }

    pub fn contains(&self, column: &str) -> bool {
        self.index.contains_key(column)
    }
}

/// One data row with typed accessors
///
/// Fields are kept as bytes and checked for UTF-8 per column, so a stray
/// byte only affects the field it sits in.
pub struct Row<'a> {
    columns: &'a Columns,
    record: &'a csv::ByteRecord,
    dataset: &'a str,
    line: u64,
    coerced: Cell<u64>,
}

impl<'a> Row<'a> {
    pub fn new(
        columns: &'a Columns,
        record: &'a csv::ByteRecord,
        dataset: &'a str,
        line: u64,
    ) -> Self {
        Self {
            columns,
            record,
            dataset,
            line,
            coerced: Cell::new(0),
        }
    }

    fn bytes(&self, column: &str) -> &'a [u8] {
        self.columns
            .position(column)
            .and_then(|i| self.record.get(i))
            .unwrap_or_default()
    }

    /// Trimmed field text, empty when the column is absent
    pub fn raw(&self, column: &str) -> Result<&'a str, Utf8Error> {
        std::str::from_utf8(self.bytes(column)).map(str::trim)
    }

    /// Free text; bytes that are not UTF-8 are replaced and the field counted as coerced
    pub fn text(&self, column: &str) -> String {
        match self.raw(column) {
            Ok(value) => value.to_string(),
            Err(e) => {
                let value = self.lossy(column);
                self.coerce(column, &value, &e);
                value
            },
        }
    }

    pub fn optional_text(&self, column: &str) -> Option<String> {
        self.optional(column, |v| Ok(v.to_string()))
    }

    pub fn required_text(&self, column: &'static str) -> Result<String, FieldError> {
        self.required(column).map(str::to_string)
    }

    pub fn required_i32(&self, column: &'static str) -> Result<i32, FieldError> {
        let value = self.required(column)?;
        i32::from_str_radix(value, 10).map_err(|e| FieldError::new(column, value, e))
    }

    pub fn required_i64(&self, column: &'static str) -> Result<i64, FieldError> {
        let value = self.required(column)?;
        i64::from_str_radix(value, 10).map_err(|e| FieldError::new(column, value, e))
    }

    pub fn optional_i32(&self, column: &str) -> Option<i32> {
        self.optional(column, |v| i32::from_str_radix(v, 10).map_err(|e| e.to_string()))
    }

    pub fn optional_f64(&self, column: &str) -> Option<f64> {
        self.optional(column, |v| match v.parse::<f64>() {
            Ok(n) if n.is_finite() => Ok(n),
            Ok(_) => Err("not a finite number".to_string()),
            Err(e) => Err(e.to_string()),
        })
    }

    pub fn optional_date(&self, column: &str) -> Option<NaiveDate> {
        self.optional(column, |v| {
            // some releases carry a midnight timestamp instead of a bare date
            let date = v.split_once(' ').map_or(v, |(d, _)| d);
            NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|e| e.to_string())
        })
    }

    /// Number of fields nulled or replaced because they failed to decode
    pub fn coerced(&self) -> u64 {
        self.coerced.get()
    }

    fn lossy(&self, column: &str) -> String {
        String::from_utf8_lossy(self.bytes(column)).trim().to_string()
    }

    fn required(&self, column: &'static str) -> Result<&'a str, FieldError> {
        let value = self
            .raw(column)
            .map_err(|e| FieldError::new(column, &self.lossy(column), format!("invalid UTF-8: {e}")))?;
        if value.is_empty() {
            return Err(FieldError::new(column, value, "value is required"));
        }
        Ok(value)
    }

    fn optional<T>(&self, column: &str, parse: impl FnOnce(&str) -> Result<T, String>) -> Option<T> {
        let value = match self.raw(column) {
            Ok(value) => value,
            Err(e) => {
                self.coerce(column, &self.lossy(column), &e);
                return None;
            },
        };
        if value.is_empty() {
            return None;
        }
        match parse(value) {
            Ok(parsed) => Some(parsed),
            Err(reason) => {
                self.coerce(column, value, &reason);
                None
            },
        }
    }

    fn coerce(&self, column: &str, value: &str, reason: &dyn fmt::Display) {
        debug!(
            dataset = self.dataset,
            line = self.line,
            column,
            value,
            reason = %reason,
            "Field undecodable, storing fallback"
        );
        self.coerced.set(self.coerced.get() + 1);
    }
}

/// Lazy, finite, non-restartable sequence of typed records
pub struct RowDecoder<T, R = File> {
    dataset: String,
    columns: Columns,
    records: csv::ByteRecordsIntoIter<R>,
    limit: Option<usize>,
    decoded: usize,
    coerced: u64,
    _entity: PhantomData<fn() -> T>,
}

impl<T: FromRow> RowDecoder<T, File> {
    /// Open a source file; `.tsv` files are tab-delimited, everything else is comma-delimited
    pub fn open(dataset: impl Into<String>, path: &Path) -> IngestResult<Self> {
        let file = File::open(path).map_err(|source| IngestError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let delimiter = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("tsv") => b'\t',
            _ => b',',
        };

        Self::with_delimiter(dataset, file, delimiter)
    }
}

impl<T: FromRow, R: Read> RowDecoder<T, R> {
    /// Decode comma-delimited rows from any reader
    pub fn from_reader(dataset: impl Into<String>, reader: R) -> IngestResult<Self> {
        Self::with_delimiter(dataset, reader, b',')
    }

    fn with_delimiter(dataset: impl Into<String>, reader: R, delimiter: u8) -> IngestResult<Self> {
        let dataset = dataset.into();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .delimiter(delimiter)
            .flexible(true)
            .from_reader(reader);

        let headers = reader.byte_headers().map_err(|source| IngestError::Csv {
            dataset: dataset.clone(),
            source,
        })?;
        let columns = Columns::from_headers(headers);

        if let Some(column) = T::REQUIRED_COLUMNS
            .iter()
            .copied()
            .find(|c| !columns.contains(c))
        {
            return Err(IngestError::MissingColumn { dataset, column });
        }

        Ok(Self {
            dataset,
            columns,
            records: reader.into_byte_records(),
            limit: None,
            decoded: 0,
            coerced: 0,
            _entity: PhantomData,
        })
    }

    /// Stop after `limit` rows
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    /// Rows decoded so far, including ones that failed
    pub fn decoded(&self) -> usize {
        self.decoded
    }

    /// Optional fields nulled so far because they failed to parse
    pub fn coerced(&self) -> u64 {
        self.coerced
    }
}

impl<T: FromRow, R: Read> Iterator for RowDecoder<T, R> {
    type Item = IngestResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.limit.is_some_and(|limit| self.decoded >= limit) {
            return None;
        }

        let record = loop {
            let record = match self.records.next()? {
                Ok(record) => record,
                Err(source) => {
                    return Some(Err(IngestError::Csv {
                        dataset: self.dataset.clone(),
                        source,
                    }))
                },
            };
            // rows of bare delimiters carry no data
            if !record.iter().all(|field| field.trim_ascii().is_empty()) {
                break record;
            }
        };
        self.decoded += 1;

        let line = record
            .position()
            .map(|p| p.line())
            .unwrap_or(self.decoded as u64 + 1);
        let row = Row::new(&self.columns, &record, &self.dataset, line);
        let decoded = T::from_row(&row).map_err(|e| IngestError::Decode {
            dataset: self.dataset.clone(),
            line,
            column: e.column,
            value: e.value,
            reason: e.reason,
        });
        self.coerced += row.coerced();

        Some(decoded)
    }
}
