//! Core tabular data models.
//!
//! A stream is processed as a sequence of [`Block`]s. Every block carries the
//! stream's [`Header`] and a list of rows of strings aligned to it. Absent
//! values are encoded with [`NULL_SENTINEL`] so that a row is always a plain
//! fixed-width list of strings.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{DeidError, Result};

/// Reserved cell value standing for "absent / null / untyped".
///
/// Also the single generalization target of every quasi-identifier, so a
/// cell holding it after anonymization has been suppressed.
pub const NULL_SENTINEL: &str = "_DEIDSTREAM_NULL_";

/// One data row, positionally aligned to a [`Header`].
pub type Row = Vec<String>;

/// Ordered column names, fixed for the lifetime of a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Header {
    columns: Vec<String>,
}

impl Header {
    /// Creates a header from column names in declared order.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// Column names in order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// True if the header has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Position of a column, if present.
    pub fn index_of(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// True if the column is part of the header.
    pub fn contains(&self, column: &str) -> bool {
        self.index_of(column).is_some()
    }
}

/// A unit of work: the header plus the data rows accumulated for it.
///
/// The header is kept apart from the data rows; [`Block::table`] yields the
/// header-first view the engine contract works with. Every row has exactly
/// `header.len()` cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    header: Header,
    rows: Vec<Row>,
}

impl Block {
    /// Opens an empty block for the given header.
    pub fn new(header: Header) -> Self {
        Self {
            header,
            rows: Vec::new(),
        }
    }

    /// Builds a block from existing rows, checking their width.
    pub fn from_rows(header: Header, rows: Vec<Row>) -> Result<Self> {
        let mut block = Self::new(header);
        block.rows.reserve(rows.len());
        for row in rows {
            block.push(row)?;
        }
        Ok(block)
    }

    /// A block of `rows` rows where every cell is [`NULL_SENTINEL`].
    ///
    /// Used whenever no trustworthy anonymized output exists.
    pub fn suppressed(header: Header, rows: usize) -> Self {
        let width = header.len();
        let rows = (0..rows)
            .map(|_| vec![NULL_SENTINEL.to_string(); width])
            .collect();
        Self { header, rows }
    }

    /// Appends a data row.
    pub fn push(&mut self, row: Row) -> Result<()> {
        if row.len() != self.header.len() {
            return Err(DeidError::RowShape {
                expected: self.header.len(),
                actual: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// The block's header.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Data rows, header excluded.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Number of data rows.
    pub fn data_row_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns.
    pub fn column_count(&self) -> usize {
        self.header.len()
    }

    /// True if the block holds only the header.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Header followed by the data rows.
    pub fn table(&self) -> impl Iterator<Item = &[String]> {
        std::iter::once(self.header.columns()).chain(self.rows.iter().map(Vec::as_slice))
    }

    /// Distinct values observed in one column, sorted.
    pub fn distinct_values(&self, column: usize) -> BTreeSet<&str> {
        self.rows
            .iter()
            .filter_map(|row| row.get(column).map(String::as_str))
            .collect()
    }

    /// Consumes the block, returning its header and rows.
    pub fn into_parts(self) -> (Header, Vec<Row>) {
        (self.header, self.rows)
    }
}
