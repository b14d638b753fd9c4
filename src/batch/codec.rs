//! Batch codec
//!
//! Encodes a batch to a self-contained binary blob and back. Each call is
//! pure: no dictionary or other state is shared between blobs, so
//! `decode(encode(b), b.columns()) == b` for every valid batch.
//!
//! ## Blob Format (version 1)
//!
//! ```text
//! ┌──────────┬────────────┬──────────┬──────────┬──────────┐
//! │Version(1)│BeginRow(8) │ColCnt(2) │ Tags (n) │RowCnt(4) │
//! ├──────────┴────────────┴──────────┴──────────┴──────────┤
//! │ Cells, row-major:                                       │
//! │ ┌─────────┬─────────┬───────────┐                       │
//! │ │Flag (1) │ Len (4) │  Payload  │   (len+payload only   │
//! │ └─────────┴─────────┴───────────┘    when flag = 1)     │
//! ├─────────────────────────────────────────────────────────┤
//! │ CRC32 (4) of all preceding bytes                        │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers little-endian. The blob is not self-describing on disk in
//! the sense that nothing outside it records where it starts or ends; the
//! in-memory pointer map supplies (offset, length), and the caller supplies
//! the expected column descriptor at decode time for validation.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, SpillError};

use super::{Batch, ColumnType, Value};

/// Current blob format version
pub const FORMAT_VERSION: u8 = 1;

/// Null-flag byte values
const CELL_NULL: u8 = 0;
const CELL_PRESENT: u8 = 1;

// =============================================================================
// Encoding
// =============================================================================

/// Encode a batch to a self-contained blob
///
/// Fails with `SpillError::Codec` if a cell's value does not match its
/// column's declared type.
pub fn encode(batch: &Batch) -> Result<Bytes> {
    let columns = batch.columns();

    let mut buf = BytesMut::with_capacity(64 + batch.row_count() * columns.len() * 16);
    buf.put_u8(FORMAT_VERSION);
    buf.put_u64_le(batch.begin_row());
    buf.put_u16_le(columns.len() as u16);
    for column in columns {
        buf.put_u8(column.tag());
    }
    buf.put_u32_le(batch.row_count() as u32);

    for (row_idx, row) in batch.rows().iter().enumerate() {
        if row.len() != columns.len() {
            return Err(SpillError::Codec(format!(
                "Row {} has {} cells, expected {}",
                row_idx,
                row.len(),
                columns.len()
            )));
        }
        for (column, value) in columns.iter().zip(row) {
            encode_cell(&mut buf, *column, value)?;
        }
    }

    let crc = crc32fast::hash(&buf);
    buf.put_u32_le(crc);

    Ok(buf.freeze())
}

/// Encode one cell: null flag, then a length-prefixed payload if present
fn encode_cell(buf: &mut BytesMut, column: ColumnType, value: &Value) -> Result<()> {
    if let Value::Null = value {
        buf.put_u8(CELL_NULL);
        return Ok(());
    }
    buf.put_u8(CELL_PRESENT);

    match (column, value) {
        (ColumnType::Boolean, Value::Boolean(b)) => {
            buf.put_u32_le(1);
            buf.put_u8(*b as u8);
        }
        (ColumnType::Integer, Value::Integer(i)) => {
            buf.put_u32_le(4);
            buf.put_i32_le(*i);
        }
        (ColumnType::BigInt, Value::BigInt(i)) => {
            buf.put_u32_le(8);
            buf.put_i64_le(*i);
        }
        (ColumnType::Double, Value::Double(d)) => {
            buf.put_u32_le(8);
            buf.put_f64_le(*d);
        }
        (ColumnType::String, Value::String(s)) => {
            buf.put_u32_le(s.len() as u32);
            buf.put_slice(s.as_bytes());
        }
        (ColumnType::Binary, Value::Binary(b)) => {
            buf.put_u32_le(b.len() as u32);
            buf.put_slice(b);
        }
        (column, value) => {
            return Err(SpillError::Codec(format!(
                "Value {:?} does not match column type {:?}",
                value, column
            )));
        }
    }

    Ok(())
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode a blob back into a batch
///
/// `columns` is the descriptor the caller recorded when the batch was
/// added; the blob's own tag list is validated against it.
pub fn decode(data: &[u8], columns: &[ColumnType]) -> Result<Batch> {
    // CRC trailer first: a bad checksum makes every later field suspect
    if data.len() < 4 {
        return Err(SpillError::Codec(format!(
            "Blob too short: {} bytes",
            data.len()
        )));
    }
    let (body, trailer) = data.split_at(data.len() - 4);
    let stored_crc = u32::from_le_bytes(trailer.try_into().unwrap());
    let actual_crc = crc32fast::hash(body);
    if stored_crc != actual_crc {
        return Err(SpillError::Codec(format!(
            "CRC mismatch: stored {:#010x}, computed {:#010x}",
            stored_crc, actual_crc
        )));
    }

    let mut buf = body;

    let version = read_u8(&mut buf)?;
    if version != FORMAT_VERSION {
        return Err(SpillError::Codec(format!(
            "Unsupported blob version: {}",
            version
        )));
    }

    let begin_row = read_exact(&mut buf, 8)?.get_u64_le();
    let column_count = read_exact(&mut buf, 2)?.get_u16_le() as usize;
    if column_count != columns.len() {
        return Err(SpillError::Codec(format!(
            "Blob has {} columns, descriptor has {}",
            column_count,
            columns.len()
        )));
    }

    for (idx, expected) in columns.iter().enumerate() {
        let tag = read_u8(&mut buf)?;
        let found = ColumnType::from_tag(tag)
            .ok_or_else(|| SpillError::Codec(format!("Unknown column type tag: {}", tag)))?;
        if found != *expected {
            return Err(SpillError::Codec(format!(
                "Column {} is {:?} in blob but {:?} in descriptor",
                idx, found, expected
            )));
        }
    }

    let row_count = read_exact(&mut buf, 4)?.get_u32_le() as usize;

    let mut rows = Vec::with_capacity(row_count);
    for _ in 0..row_count {
        let mut row = Vec::with_capacity(column_count);
        for column in columns {
            row.push(decode_cell(&mut buf, *column)?);
        }
        rows.push(row);
    }

    if !buf.is_empty() {
        return Err(SpillError::Codec(format!(
            "{} trailing bytes after last row",
            buf.len()
        )));
    }

    Ok(Batch::new(begin_row, columns.to_vec(), rows))
}

/// Decode one cell for the given column type
fn decode_cell(buf: &mut &[u8], column: ColumnType) -> Result<Value> {
    match read_u8(buf)? {
        CELL_NULL => return Ok(Value::Null),
        CELL_PRESENT => {}
        flag => {
            return Err(SpillError::Codec(format!("Invalid cell flag: {}", flag)));
        }
    }

    let len = read_exact(buf, 4)?.get_u32_le() as usize;
    let mut payload = read_exact(buf, len)?;

    let value = match column {
        ColumnType::Boolean => {
            expect_len(len, 1, column)?;
            Value::Boolean(payload.get_u8() != 0)
        }
        ColumnType::Integer => {
            expect_len(len, 4, column)?;
            Value::Integer(payload.get_i32_le())
        }
        ColumnType::BigInt => {
            expect_len(len, 8, column)?;
            Value::BigInt(payload.get_i64_le())
        }
        ColumnType::Double => {
            expect_len(len, 8, column)?;
            Value::Double(payload.get_f64_le())
        }
        ColumnType::String => {
            let s = std::str::from_utf8(payload)
                .map_err(|e| SpillError::Codec(format!("Invalid UTF-8 in string cell: {}", e)))?;
            Value::String(s.to_string())
        }
        ColumnType::Binary => Value::Binary(payload.to_vec()),
        ColumnType::Blob | ColumnType::Clob => {
            return Err(SpillError::Codec(format!(
                "Unexpected non-null cell in LOB column {:?}",
                column
            )));
        }
    };

    Ok(value)
}

// =============================================================================
// Bounds-checked reads
// =============================================================================

fn read_u8(buf: &mut &[u8]) -> Result<u8> {
    Ok(read_exact(buf, 1)?.get_u8())
}

/// Split `n` bytes off the front of `buf`, or fail on truncation
fn read_exact<'a>(buf: &mut &'a [u8], n: usize) -> Result<&'a [u8]> {
    if buf.len() < n {
        return Err(SpillError::Codec(format!(
            "Truncated blob: needed {} bytes, {} remain",
            n,
            buf.len()
        )));
    }
    let (head, tail) = buf.split_at(n);
    *buf = tail;
    Ok(head)
}

fn expect_len(found: usize, expected: usize, column: ColumnType) -> Result<()> {
    if found != expected {
        return Err(SpillError::Codec(format!(
            "Cell for {:?} has payload length {}, expected {}",
            column, found, expected
        )));
    }
    Ok(())
}
