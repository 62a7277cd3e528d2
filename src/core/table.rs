// Table decoding: Parquet files and JSON lines into raw rows

use crate::core::constants::PARQUET_MAGIC;
use crate::core::error::{DatasetError, Result};
use crate::core::format::{RawRow, RawValue};
use bytes::Bytes;
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::Field;
use serde_json::Value;

/// Decodes a table, picking the codec from the leading magic bytes.
pub fn decode_table(data: Bytes) -> Result<Vec<RawRow>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    if data.starts_with(PARQUET_MAGIC) {
        decode_parquet(data)
    } else {
        decode_jsonl(&data)
    }
}

pub fn decode_parquet(data: Bytes) -> Result<Vec<RawRow>> {
    if data.len() < 8 || !data.ends_with(PARQUET_MAGIC) {
        let tail = data[data.len().saturating_sub(4)..].to_vec();
        return Err(DatasetError::InvalidMagic {
            expected: PARQUET_MAGIC.to_vec(),
            got: tail,
        });
    }

    let reader = SerializedFileReader::new(data)?;
    let mut rows = Vec::with_capacity(reader.metadata().file_metadata().num_rows() as usize);

    for row in reader.get_row_iter(None)? {
        let row = row?;
        let mut raw = RawRow::new();
        for (name, field) in row.get_column_iter() {
            raw.push(name, from_field(field));
        }
        rows.push(raw);
    }

    Ok(rows)
}

fn from_field(field: &Field) -> RawValue {
    match field {
        Field::Null => RawValue::Null,
        Field::Bool(v) => RawValue::Bool(*v),
        Field::Byte(v) => RawValue::Int(*v as i64),
        Field::Short(v) => RawValue::Int(*v as i64),
        Field::Int(v) => RawValue::Int(*v as i64),
        Field::Long(v) => RawValue::Int(*v),
        Field::UByte(v) => RawValue::Int(*v as i64),
        Field::UShort(v) => RawValue::Int(*v as i64),
        Field::UInt(v) => RawValue::Int(*v as i64),
        Field::ULong(v) => match i64::try_from(*v) {
            Ok(v) => RawValue::Int(v),
            Err(_) => RawValue::Float(*v as f64),
        },
        Field::Float(v) => RawValue::Float(*v as f64),
        Field::Double(v) => RawValue::Float(*v),
        Field::Str(v) => RawValue::Str(v.clone()),
        Field::ListInternal(list) => RawValue::List(list.elements().iter().map(from_field).collect()),
        _ => RawValue::Null,
    }
}

pub fn decode_jsonl(data: &[u8]) -> Result<Vec<RawRow>> {
    let text = std::str::from_utf8(data)
        .map_err(|e| DatasetError::ParseError(format!("table is not UTF-8: {}", e)))?;

    let mut rows = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(line)?;
        let object = value.as_object().ok_or_else(|| {
            DatasetError::ParseError(format!("line {} is not a JSON object", line_no + 1))
        })?;

        let mut raw = RawRow::new();
        for (name, cell) in object {
            raw.push(name, from_json(cell));
        }
        rows.push(raw);
    }

    Ok(rows)
}

fn from_json(value: &Value) -> RawValue {
    match value {
        Value::Null => RawValue::Null,
        Value::Bool(v) => RawValue::Bool(*v),
        Value::Number(n) => match n.as_i64() {
            Some(v) => RawValue::Int(v),
            None => RawValue::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => RawValue::Str(s.clone()),
        Value::Array(items) => RawValue::List(items.iter().map(from_json).collect()),
        Value::Object(_) => RawValue::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parquet::data_type::{FloatType, Int64Type};
    use parquet::file::properties::WriterProperties;
    use parquet::file::writer::SerializedFileWriter;
    use parquet::schema::parser::parse_message_type;
    use std::sync::Arc;

    const FRAME_SCHEMA: &str = "
        message frame {
            REQUIRED INT64 index;
            REQUIRED group action (LIST) {
                REPEATED group list {
                    REQUIRED FLOAT element;
                }
            }
        }
    ";

    /// Two frames: index 7 and 8 with two-element float actions.
    fn frame_file() -> Bytes {
        let schema = Arc::new(parse_message_type(FRAME_SCHEMA).unwrap());
        let props = Arc::new(WriterProperties::builder().build());
        let mut buffer: Vec<u8> = Vec::new();
        let mut writer = SerializedFileWriter::new(&mut buffer, schema, props).unwrap();
        let mut row_group = writer.next_row_group().unwrap();

        let mut column = row_group.next_column().unwrap().unwrap();
        column
            .typed::<Int64Type>()
            .write_batch(&[7, 8], None, None)
            .unwrap();
        column.close().unwrap();

        let mut column = row_group.next_column().unwrap().unwrap();
        column
            .typed::<FloatType>()
            .write_batch(&[1.0, 2.0, 3.0, 4.0], Some(&[1, 1, 1, 1]), Some(&[0, 1, 0, 1]))
            .unwrap();
        column.close().unwrap();

        row_group.close().unwrap();
        writer.close().unwrap();
        Bytes::from(buffer)
    }

    #[test]
    fn test_decode_parquet_rows() {
        let rows = decode_table(frame_file()).unwrap();
        let action = |a: f64, b: f64| RawValue::List(vec![RawValue::Float(a), RawValue::Float(b)]);
        assert_eq!(
            rows,
            vec![
                RawRow::new()
                    .with("index", RawValue::Int(7))
                    .with("action", action(1.0, 2.0)),
                RawRow::new()
                    .with("index", RawValue::Int(8))
                    .with("action", action(3.0, 4.0)),
            ]
        );
    }

    #[test]
    fn test_decode_jsonl_keeps_column_order() {
        let data = b"{\"b\": 1, \"a\": 2.5, \"c\": \"3\", \"v\": [1, 2]}\n\n{\"b\": 2}\n";
        let rows = decode_jsonl(data).unwrap();
        assert_eq!(rows.len(), 2);
        let names: Vec<&str> = rows[0].columns.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c", "v"]);
        assert_eq!(rows[0].get("a"), Some(&RawValue::Float(2.5)));
        assert_eq!(
            rows[0].get("v"),
            Some(&RawValue::List(vec![RawValue::Int(1), RawValue::Int(2)]))
        );
    }

    #[test]
    fn test_decode_table_dispatches_on_magic() {
        let rows = decode_table(Bytes::from_static(b"{\"x\": 1}\n")).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(decode_table(Bytes::new()).unwrap().is_empty());

        let err = decode_table(Bytes::from_static(b"PAR1garbage")).unwrap_err();
        assert!(matches!(err, DatasetError::InvalidMagic { .. }));
    }
}
