//! Batch Module
//!
//! The unit of spill I/O: an ordered run of rows with a begin-row index
//! and a per-column type descriptor.
//!
//! ## Responsibilities
//! - Model the scalar column types a federated engine produces
//! - Model cell values, including NULL
//! - Encode/decode batches to a self-contained binary blob (see `codec`)
//!
//! Row numbering is 1-based throughout: the first row of a query's result
//! set is row 1, and a batch's `begin_row` is the absolute index of its
//! first row.

pub mod codec;

/// Column types recognized by the spill store.
///
/// `Blob` and `Clob` exist so schemas can declare them, but batches with
/// LOB columns are rejected by `StorageManager::add_batch`: their content
/// is backed by live connector resources whose byte identity cannot be
/// safely persisted and re-read later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Boolean,
    Integer,
    BigInt,
    Double,
    String,
    Binary,
    Blob,
    Clob,
}

impl ColumnType {
    /// Whether this type is large-object content excluded from persistence
    pub fn is_lob(self) -> bool {
        matches!(self, ColumnType::Blob | ColumnType::Clob)
    }

    /// On-disk type tag (stable across versions of the blob format)
    pub fn tag(self) -> u8 {
        match self {
            ColumnType::Boolean => 0,
            ColumnType::Integer => 1,
            ColumnType::BigInt => 2,
            ColumnType::Double => 3,
            ColumnType::String => 4,
            ColumnType::Binary => 5,
            ColumnType::Blob => 6,
            ColumnType::Clob => 7,
        }
    }

    /// Inverse of `tag()`
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(ColumnType::Boolean),
            1 => Some(ColumnType::Integer),
            2 => Some(ColumnType::BigInt),
            3 => Some(ColumnType::Double),
            4 => Some(ColumnType::String),
            5 => Some(ColumnType::Binary),
            6 => Some(ColumnType::Blob),
            7 => Some(ColumnType::Clob),
            _ => None,
        }
    }
}

/// A single cell value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i32),
    BigInt(i64),
    Double(f64),
    String(String),
    Binary(Vec<u8>),
}

/// A bounded run of rows, the unit of read/write against the spill store
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Absolute 1-based index of the first row in this batch
    begin_row: u64,

    /// Per-column type descriptor
    columns: Vec<ColumnType>,

    /// Row data; every row has exactly `columns.len()` cells
    rows: Vec<Vec<Value>>,
}

impl Batch {
    /// Create a batch. Every row must match the column descriptor's width.
    pub fn new(begin_row: u64, columns: Vec<ColumnType>, rows: Vec<Vec<Value>>) -> Self {
        debug_assert!(rows.iter().all(|r| r.len() == columns.len()));
        Self {
            begin_row,
            columns,
            rows,
        }
    }

    /// Absolute index of the first row
    pub fn begin_row(&self) -> u64 {
        self.begin_row
    }

    /// Absolute index of the last row (equals `begin_row` for a 1-row batch)
    pub fn end_row(&self) -> u64 {
        self.begin_row + self.rows.len() as u64 - 1
    }

    /// Column type descriptor
    pub fn columns(&self) -> &[ColumnType] {
        &self.columns
    }

    /// Row data
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Whether any column is large-object content
    pub fn has_lob_columns(&self) -> bool {
        self.columns.iter().any(|c| c.is_lob())
    }
}
