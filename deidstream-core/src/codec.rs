//! Row codec.
//!
//! Converts typed inbound records into fixed-width rows of strings and
//! data rows back into output records. Both directions are pure functions.

use serde_json::{Map, Value};

use crate::models::{Block, Header, NULL_SENTINEL, Row};
use crate::record::{FieldValue, Record};

/// Marker the anonymization engine uses for a fully generalized value.
pub const ENGINE_ANY_VALUE: &str = "*";

/// Marker the anonymization engine uses for a null value.
pub const ENGINE_NULL_VALUE: &str = "NULL";

/// An output record: header column to string value or explicit null.
pub type OutputRecord = Map<String, Value>;

/// Encodes a record as a row aligned to `header`.
///
/// Fields missing from the record, null fields and untyped fields become
/// [`NULL_SENTINEL`]. Fields not present in the header are ignored.
pub fn encode(record: &Record, header: &Header) -> Row {
    header
        .columns()
        .iter()
        .map(|column| {
            record
                .get(column)
                .and_then(cell_text)
                .unwrap_or_else(|| NULL_SENTINEL.to_string())
        })
        .collect()
}

fn cell_text(value: &FieldValue) -> Option<String> {
    match value {
        FieldValue::Int(v) => Some(v.to_string()),
        FieldValue::Long(v) => Some(v.to_string()),
        FieldValue::String(v) => Some(v.clone()),
        FieldValue::Bytes(v) => Some(String::from_utf8_lossy(v).into_owned()),
        FieldValue::Float(v) => Some(v.to_string()),
        FieldValue::Double(v) => Some(v.to_string()),
        FieldValue::Boolean(v) => Some(v.to_string()),
        FieldValue::Timestamp(v) => Some(v.to_rfc3339()),
        FieldValue::Null => None,
    }
}

/// True if a cell carries no value in the output.
///
/// The engine markers are matched on the cell text alone, so an input
/// value that is literally `*` or `NULL` also comes out as null, in assess
/// mode too.
pub fn is_null_marker(cell: &str) -> bool {
    cell == NULL_SENTINEL || cell == ENGINE_ANY_VALUE || cell == ENGINE_NULL_VALUE
}

/// Decodes one data row into an output record keyed by header column.
///
/// Encoding then decoding keeps every value except the null markers, see
/// [`is_null_marker`].
pub fn decode_row(header: &Header, row: &[String]) -> OutputRecord {
    header
        .columns()
        .iter()
        .zip(row)
        .map(|(column, cell)| {
            let value = if is_null_marker(cell) {
                Value::Null
            } else {
                Value::String(cell.clone())
            };
            (column.clone(), value)
        })
        .collect()
}

/// Decodes every data row of a block, header excluded.
pub fn decode(block: &Block) -> Vec<OutputRecord> {
    block
        .rows()
        .iter()
        .map(|row| decode_row(block.header(), row))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn header() -> Header {
        Header::new(["id", "name", "score", "active", "seen", "blob"])
    }

    fn full_record() -> Record {
        Record::new()
            .with_field("id", FieldValue::Int(7))
            .with_field("name", FieldValue::String("Ann".to_string()))
            .with_field("score", FieldValue::Double(2.5))
            .with_field("active", FieldValue::Boolean(false))
            .with_field(
                "seen",
                FieldValue::Timestamp(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()),
            )
            .with_field("blob", FieldValue::Bytes(b"raw".to_vec()))
    }

    #[test]
    fn test_encode_all_types() {
        let row = encode(&full_record(), &header());
        assert_eq!(
            row,
            vec!["7", "Ann", "2.5", "false", "2024-03-01T10:00:00+00:00", "raw"]
        );
    }

    #[test]
    fn test_encode_missing_and_null_fields() {
        let record = Record::new()
            .with_field("name", FieldValue::Null)
            .with_field("unknown", FieldValue::Long(1));
        let row = encode(&record, &Header::new(["id", "name"]));
        assert_eq!(row, vec![NULL_SENTINEL, NULL_SENTINEL]);
    }

    #[test]
    fn test_encode_follows_header_order() {
        let record = Record::new()
            .with_field("b", FieldValue::Long(2))
            .with_field("a", FieldValue::Long(1));
        let row = encode(&record, &Header::new(["a", "b"]));
        assert_eq!(row, vec!["1", "2"]);
    }

    #[test]
    fn test_decode_collapses_markers() {
        let header = Header::new(["a", "b", "c", "d"]);
        let block = Block::from_rows(
            header,
            vec![vec![
                NULL_SENTINEL.to_string(),
                ENGINE_ANY_VALUE.to_string(),
                ENGINE_NULL_VALUE.to_string(),
                "x".to_string(),
            ]],
        )
        .unwrap();

        let records = decode(&block);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["a"], Value::Null);
        assert_eq!(records[0]["b"], Value::Null);
        assert_eq!(records[0]["c"], Value::Null);
        assert_eq!(records[0]["d"], Value::String("x".to_string()));
    }

    #[test]
    fn test_round_trip() {
        let header = Header::new(["id", "name", "missing"]);
        let record = Record::new()
            .with_field("id", FieldValue::Long(11))
            .with_field("name", FieldValue::String("Bo".to_string()));

        let block = Block::from_rows(header.clone(), vec![encode(&record, &header)]).unwrap();
        let decoded = decode(&block);

        assert_eq!(decoded[0]["id"], Value::String("11".to_string()));
        assert_eq!(decoded[0]["name"], Value::String("Bo".to_string()));
        assert_eq!(decoded[0]["missing"], Value::Null);
        let keys: Vec<&String> = decoded[0].keys().collect();
        assert_eq!(keys, vec!["id", "name", "missing"]);
    }

    #[test]
    fn test_decode_header_only_block() {
        let block = Block::new(Header::new(["a"]));
        assert!(decode(&block).is_empty());
    }

    #[test]
    fn test_round_trip_loses_literal_markers() {
        let header = Header::new(["grade", "note", "name"]);
        let record = Record::new()
            .with_field("grade", FieldValue::String(ENGINE_ANY_VALUE.to_string()))
            .with_field("note", FieldValue::String(ENGINE_NULL_VALUE.to_string()))
            .with_field("name", FieldValue::String("null".to_string()));

        let block = Block::from_rows(header.clone(), vec![encode(&record, &header)]).unwrap();
        let decoded = decode(&block);

        assert_eq!(decoded[0]["grade"], Value::Null);
        assert_eq!(decoded[0]["note"], Value::Null);
        // matching is case sensitive
        assert_eq!(decoded[0]["name"], Value::String("null".to_string()));
    }
}
