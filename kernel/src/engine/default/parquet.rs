//! Default checkpoint codec: decodes parquet checkpoint files into JSON action rows

use bytes::Bytes;
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::{Field, Row};
use serde_json::{Map, Number, Value};
use tracing::debug;

use crate::{CheckpointHandler, DeltaResult, FileMeta};

/// Reads parquet checkpoints row by row. Each row becomes one JSON object keyed by the
/// top-level action columns, so it can be decoded exactly like a commit line.
#[derive(Debug, Default, Clone, Copy)]
pub struct ParquetCheckpointHandler;

impl CheckpointHandler for ParquetCheckpointHandler {
    fn read_checkpoint(&self, file: &FileMeta, data: Bytes) -> DeltaResult<Vec<Value>> {
        let reader = SerializedFileReader::new(data)?;
        let num_rows = reader.metadata().file_metadata().num_rows();
        debug!(location = %file.location, num_rows, "decoding parquet checkpoint");
        reader
            .get_row_iter(None)?
            .map(|row| Ok(row_to_json(&row?)))
            .collect()
    }
}

fn row_to_json(row: &Row) -> Value {
    let map: Map<String, Value> = row
        .get_column_iter()
        .filter(|(_, field)| !matches!(field, Field::Null))
        .map(|(name, field)| (name.clone(), field_to_json(field)))
        .collect();
    Value::Object(map)
}

fn field_to_json(field: &Field) -> Value {
    match field {
        Field::Null => Value::Null,
        Field::Bool(b) => Value::Bool(*b),
        Field::Byte(n) => Value::from(*n),
        Field::Short(n) => Value::from(*n),
        Field::Int(n) => Value::from(*n),
        Field::Long(n) => Value::from(*n),
        Field::UByte(n) => Value::from(*n),
        Field::UShort(n) => Value::from(*n),
        Field::UInt(n) => Value::from(*n),
        Field::ULong(n) => Value::from(*n),
        Field::Float(n) => Number::from_f64(f64::from(*n)).map_or(Value::Null, Value::Number),
        Field::Double(n) => Number::from_f64(*n).map_or(Value::Null, Value::Number),
        Field::Str(s) => Value::String(s.clone()),
        // epoch based values keep their raw integer, the way they are written to commit files
        Field::Date(days) => Value::from(*days),
        Field::TimestampMillis(ts) => Value::from(*ts),
        Field::TimestampMicros(ts) => Value::from(*ts),
        Field::Group(row) => row_to_json(row),
        Field::ListInternal(list) => Value::Array(list.elements().iter().map(field_to_json).collect()),
        Field::MapInternal(map) => {
            let entries = map
                .entries()
                .iter()
                .map(|(key, value)| (map_key(key), field_to_json(value)))
                .collect();
            Value::Object(entries)
        }
        other => Value::String(other.to_string()),
    }
}

// Display would quote string keys
fn map_key(key: &Field) -> String {
    match key {
        Field::Str(s) => s.clone(),
        other => other.to_string(),
    }
}
