use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::schema::{ColumnSchema, IdSequence, ResolvedSchema};
use crate::transform::path::{leaf_value, lookup_leaf};
use crate::types::{Cell, DataType, PendingRow, TableRow};

/// Column name carrying listener event ids.
pub const EVENT_ID_COLUMN: &str = "EventId";

/// Raw record keys checked for an event id when no mapped column carries it.
const EVENT_ID_KEYS: [&str; 2] = ["EventId", "eventId"];

const NAIVE_DATETIME_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
];

/// Rows produced from one raw payload.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformedBatch {
    pub rows: Vec<PendingRow>,
    /// Largest event id seen in the payload, when event ids are tracked.
    pub max_event_id: Option<u64>,
}

impl TransformedBatch {
    pub fn processed(&self) -> usize {
        self.rows.len()
    }

    /// Consumes the batch, keeping only the row values.
    pub fn into_table_rows(self) -> Vec<TableRow> {
        self.rows.into_iter().map(|pending| pending.row).collect()
    }
}

/// Converts raw listener or API records into rows matching a [`ResolvedSchema`].
///
/// A malformed field never fails the record: it is staged as null and the record still counts as
/// processed.
#[derive(Debug)]
pub struct RowTransformer<'a> {
    schema: &'a ResolvedSchema,
    sequence: IdSequence,
    track_event_ids: bool,
    event_id_position: Option<usize>,
}

impl<'a> RowTransformer<'a> {
    /// Creates a transformer; `track_event_ids` enables watermark extraction for tables fed by a
    /// listener.
    pub fn new(schema: &'a ResolvedSchema, track_event_ids: bool) -> Self {
        Self {
            schema,
            sequence: IdSequence::new(),
            track_event_ids,
            event_id_position: schema.position(EVENT_ID_COLUMN),
        }
    }

    /// Transforms a payload that is either an array of records or a single record.
    ///
    /// A `null` payload is an empty batch.
    pub fn transform_payload(mut self, payload: &Value) -> TransformedBatch {
        let records: &[Value] = match payload {
            Value::Array(items) => items,
            Value::Null => &[],
            single => std::slice::from_ref(single),
        };

        let mut batch = TransformedBatch {
            rows: Vec::with_capacity(records.len()),
            max_event_id: None,
        };

        for record in records {
            let row = self.transform_record(record);
            if self.track_event_ids
                && let Some(event_id) = self.event_id(record, &row)
            {
                batch.max_event_id = batch.max_event_id.max(Some(event_id));
            }

            batch.rows.push(PendingRow {
                provisional_id: self.sequence.next_id(),
                row,
            });
        }

        batch
    }

    fn transform_record(&self, record: &Value) -> TableRow {
        let values = self
            .schema
            .columns
            .iter()
            .map(|column| match lookup_leaf(record, column.source_path.as_slice()) {
                Some(leaf) => convert_leaf(leaf, column),
                None => Cell::Null,
            })
            .collect();

        TableRow::new(values)
    }

    fn event_id(&self, record: &Value, row: &TableRow) -> Option<u64> {
        if let Some(position) = self.event_id_position {
            return row.values.get(position).and_then(Cell::as_event_id);
        }

        let Value::Object(map) = record else {
            return None;
        };
        EVENT_ID_KEYS
            .iter()
            .find_map(|key| map.get(*key))
            .and_then(leaf_value)
            .and_then(json_event_id)
    }
}

fn json_event_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Converts a scalar leaf into a cell of the column's type, yielding null when it does not fit.
pub fn convert_leaf(leaf: &Value, column: &ColumnSchema) -> Cell {
    let cell = match column.data_type {
        DataType::Text | DataType::Geographic => to_text(leaf).map(Cell::String),
        DataType::Integer => to_i64(leaf)
            .filter(|value| i32::try_from(*value).is_ok())
            .map(Cell::I64),
        DataType::BigInteger => to_i64(leaf).map(Cell::I64),
        DataType::Decimal => to_decimal(leaf).map(Cell::Numeric),
        DataType::Float => to_f64(leaf).map(Cell::F64),
        DataType::Boolean => to_bool(leaf).map(Cell::Bool),
        DataType::DateTime => to_timestamp(leaf).map(Cell::TimestampTz),
        DataType::Guid => leaf
            .as_str()
            .and_then(|text| Uuid::parse_str(text.trim()).ok())
            .map(Cell::Uuid),
    };

    let cell = cell.filter(|cell| fits_length(cell, column.max_length));
    match cell {
        Some(cell) => cell,
        None => {
            debug!(column = %column.name, value = %leaf, "staging unconvertible value as null");
            Cell::Null
        }
    }
}

fn fits_length(cell: &Cell, max_length: Option<u32>) -> bool {
    match (cell, max_length) {
        (Cell::String(text), Some(max)) => text.chars().count() <= max as usize,
        _ => true,
    }
}

fn to_text(leaf: &Value) -> Option<String> {
    match leaf {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn to_i64(leaf: &Value) -> Option<i64> {
    match leaf {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|value| value.fract() == 0.0 && value.abs() < i64::MAX as f64)
                .map(|value| value as i64)
        }),
        Value::String(text) => text.trim().parse().ok(),
        Value::Bool(flag) => Some(i64::from(*flag)),
        _ => None,
    }
}

fn to_f64(leaf: &Value) -> Option<f64> {
    match leaf {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

fn to_decimal(leaf: &Value) -> Option<BigDecimal> {
    match leaf {
        Value::Number(number) => BigDecimal::from_str(&number.to_string()).ok(),
        Value::String(text) => BigDecimal::from_str(text.trim()).ok(),
        _ => None,
    }
}

fn to_bool(leaf: &Value) -> Option<bool> {
    match leaf {
        Value::Bool(flag) => Some(*flag),
        Value::Number(number) => match number.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(text) => match text.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Parses RFC 3339 timestamps, naive timestamps (taken as UTC) and plain dates.
fn to_timestamp(leaf: &Value) -> Option<DateTime<Utc>> {
    let text = leaf.as_str()?.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Some(parsed.and_utc());
        }
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|datetime| datetime.and_utc())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;
    use crate::schema::resolve_schema;
    use crate::test_utils::{column, key_column, table};
    use crate::types::{OperationKind, TableType};

    fn bristol_schema() -> ResolvedSchema {
        let descriptor = table(
            TableType::CampaignUniqueKeys,
            vec![key_column("id", DataType::Integer), column("addr.city", DataType::Text)],
        );
        resolve_schema(&descriptor, OperationKind::Add).unwrap()
    }

    #[test]
    fn transforms_nested_wrapped_values() {
        let schema = bristol_schema();
        let payload = json!([{"id": {"Value": 1}, "addr": {"city": {"Value": "Bristol"}}}]);

        let batch = RowTransformer::new(&schema, false).transform_payload(&payload);

        assert_eq!(batch.processed(), 1);
        assert_eq!(batch.rows[0].provisional_id, -1);
        assert_eq!(
            batch.rows[0].row.values,
            vec![Cell::I64(1), Cell::String("Bristol".to_owned())]
        );
        assert_eq!(batch.max_event_id, None);
    }

    #[test]
    fn single_object_is_a_one_item_batch() {
        let schema = bristol_schema();
        let batch = RowTransformer::new(&schema, false).transform_payload(&json!({"id": 4}));

        assert_eq!(batch.processed(), 1);
        assert_eq!(batch.rows[0].row.values, vec![Cell::I64(4), Cell::Null]);
    }

    #[test]
    fn malformed_fields_become_null_but_rows_still_count() {
        let schema = bristol_schema();
        let payload = json!([
            {"id": {"Value": "not a number"}, "addr": "flat"},
            {"addr": {"city": {"Value": ["x"]}}}
        ]);

        let batch = RowTransformer::new(&schema, false).transform_payload(&payload);

        assert_eq!(batch.processed(), 2);
        assert!(batch.rows.iter().all(|r| r.row.values.iter().all(Cell::is_null)));
        assert_eq!(batch.rows[1].provisional_id, -2);
    }

    #[test]
    fn tracks_highest_event_id_from_records() {
        let schema = bristol_schema();
        let payload = json!([
            {"id": 1, "EventId": 41},
            {"id": 2, "eventId": {"Value": "45"}},
            {"id": 3, "EventId": 43}
        ]);

        let tracked = RowTransformer::new(&schema, true).transform_payload(&payload);
        assert_eq!(tracked.max_event_id, Some(45));

        let untracked = RowTransformer::new(&schema, false).transform_payload(&payload);
        assert_eq!(untracked.max_event_id, None);
    }

    #[test]
    fn mapped_event_id_column_takes_precedence() {
        let descriptor = table(
            TableType::Analysis,
            vec![key_column("eventData.EventId", DataType::BigInteger)],
        );
        let schema = resolve_schema(&descriptor, OperationKind::Add).unwrap();
        let payload = json!([{"eventData": {"EventId": 9}, "EventId": 100}]);

        let batch = RowTransformer::new(&schema, true).transform_payload(&payload);
        assert_eq!(batch.max_event_id, Some(9));
    }

    #[test]
    fn over_length_text_is_null() {
        let mut descriptor = table(TableType::Analysis, vec![column("code", DataType::Text)]);
        descriptor.field_mappings[0].source.length = Some(3);
        let schema = resolve_schema(&descriptor, OperationKind::Add).unwrap();

        assert_eq!(
            convert_leaf(&json!("abc"), &schema.columns[0]),
            Cell::String("abc".to_owned())
        );
        assert_eq!(convert_leaf(&json!("abcd"), &schema.columns[0]), Cell::Null);
    }

    #[test]
    fn converts_typed_leaves() {
        let descriptor = table(
            TableType::Analysis,
            vec![
                column("when", DataType::DateTime),
                column("flag", DataType::Boolean),
                column("small", DataType::Integer),
                column("id", DataType::Guid),
                column("amount", DataType::Decimal),
            ],
        );
        let schema = resolve_schema(&descriptor, OperationKind::Add).unwrap();
        let [when, flag, small, id, amount] = &schema.columns[..] else {
            panic!("unexpected column count");
        };

        assert_eq!(
            convert_leaf(&json!("2024-03-01T10:00:00"), when),
            Cell::TimestampTz(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap())
        );
        assert_eq!(convert_leaf(&json!("no"), flag), Cell::Bool(false));
        assert_eq!(convert_leaf(&json!(3_000_000_000_i64), small), Cell::Null);
        assert_eq!(
            convert_leaf(&json!("67e55044-10b1-426f-9247-bb680e5fe0c8"), id),
            Cell::Uuid(Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap())
        );
        assert_eq!(
            convert_leaf(&json!("12.50"), amount),
            Cell::Numeric(BigDecimal::from_str("12.50").unwrap())
        );
    }
}
