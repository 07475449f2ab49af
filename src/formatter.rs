use crate::error::FormatError;
use crate::report::RawEntry;
use crate::warehouse::schema::{Cell, RowCells};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

/// Fields projected from every raw entry, in output order.
pub const SOURCE_FIELDS: [&str; 8] = [
    "id",
    "project",
    "description",
    "tags",
    "start",
    "end",
    "updated",
    "dur",
];
pub const TAG_COLUMNS: usize = 3;

const NAIVE_TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

#[derive(Debug, Clone, PartialEq)]
pub struct TimeEntryRow {
    pub id: i64,
    pub project: Option<String>,
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub second: i64,
    pub minute: f64,
    pub hour: f64,
    pub tag1: Option<String>,
    pub tag2: Option<String>,
    pub tag3: Option<String>,
}

impl TimeEntryRow {
    pub fn cells(&self) -> RowCells {
        vec![
            ("id", Cell::Integer(Some(self.id))),
            ("project", Cell::String(self.project.clone())),
            ("description", Cell::String(self.description.clone())),
            ("start", Cell::Timestamp(Some(self.start))),
            ("end", Cell::Timestamp(Some(self.end))),
            ("updated", Cell::Timestamp(Some(self.updated))),
            ("second", Cell::Integer(Some(self.second))),
            ("minute", Cell::Float(Some(self.minute))),
            ("hour", Cell::Float(Some(self.hour))),
            ("tag1", Cell::String(self.tag1.clone())),
            ("tag2", Cell::String(self.tag2.clone())),
            ("tag3", Cell::String(self.tag3.clone())),
        ]
    }

    pub fn timestamp(&self, column: &str) -> Option<DateTime<Utc>> {
        match column {
            "start" => Some(self.start),
            "end" => Some(self.end),
            "updated" => Some(self.updated),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Durations {
    pub second: i64,
    pub minute: f64,
    pub hour: f64,
}

/// `second` truncates toward zero; `minute` and `hour` derive from the unrounded seconds.
pub fn durations_from_millis(millis: f64) -> Durations {
    let seconds = millis / 1000.0;
    let minutes = seconds / 60.0;

    Durations {
        second: seconds.trunc() as i64,
        minute: minutes,
        hour: minutes / 60.0,
    }
}

/// Positional split of a tag list; tags past the third are dropped.
pub fn tag_columns(tags: &[Option<String>]) -> [Option<String>; TAG_COLUMNS] {
    std::array::from_fn(|index| tags.get(index).cloned().flatten())
}

/// An empty report carries none of [`SOURCE_FIELDS`] and is a shape error, not zero rows.
pub fn format_entries(entries: &[RawEntry]) -> Result<Vec<TimeEntryRow>, FormatError> {
    if entries.is_empty() {
        return Err(FormatError::EmptyReport);
    }

    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| format_entry(index, entry))
        .collect()
}

fn format_entry(index: usize, entry: &RawEntry) -> Result<TimeEntryRow, FormatError> {
    if let Some(field) = SOURCE_FIELDS
        .iter()
        .copied()
        .find(|field| !entry.contains_key(*field))
    {
        return Err(FormatError::MissingField { index, field });
    }

    let durations = durations_from_millis(parse_millis(index, &entry["dur"])?);
    let [tag1, tag2, tag3] = tag_columns(&parse_tags(index, &entry["tags"])?);

    Ok(TimeEntryRow {
        id: parse_id(index, &entry["id"])?,
        project: parse_text(index, "project", &entry["project"])?,
        description: parse_text(index, "description", &entry["description"])?,
        start: parse_timestamp(index, "start", &entry["start"])?,
        end: parse_timestamp(index, "end", &entry["end"])?,
        updated: parse_timestamp(index, "updated", &entry["updated"])?,
        second: durations.second,
        minute: durations.minute,
        hour: durations.hour,
        tag1,
        tag2,
        tag3,
    })
}

fn invalid(index: usize, field: &'static str, value: &Value) -> FormatError {
    FormatError::InvalidValue {
        index,
        field,
        value: value.to_string(),
    }
}

fn parse_id(index: usize, value: &Value) -> Result<i64, FormatError> {
    let parsed = match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|float| float.fract() == 0.0 && float.abs() < i64::MAX as f64)
                .map(|float| float as i64)
        }),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    };

    parsed.ok_or_else(|| invalid(index, "id", value))
}

fn parse_text(
    index: usize,
    field: &'static str,
    value: &Value,
) -> Result<Option<String>, FormatError> {
    match value {
        Value::Null => Ok(None),
        Value::String(text) => Ok(Some(text.clone())),
        Value::Number(number) => Ok(Some(number.to_string())),
        Value::Bool(flag) => Ok(Some(flag.to_string())),
        _ => Err(invalid(index, field, value)),
    }
}

fn parse_tags(index: usize, value: &Value) -> Result<Vec<Option<String>>, FormatError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .iter()
            .map(|item| parse_text(index, "tags", item))
            .collect(),
        _ => Err(invalid(index, "tags", value)),
    }
}

fn parse_millis(index: usize, value: &Value) -> Result<f64, FormatError> {
    value
        .as_f64()
        .filter(|millis| millis.is_finite())
        .ok_or_else(|| invalid(index, "dur", value))
}

fn parse_timestamp(
    index: usize,
    field: &'static str,
    value: &Value,
) -> Result<DateTime<Utc>, FormatError> {
    let text = value.as_str().ok_or_else(|| invalid(index, field, value))?;

    parse_timestamp_str(text).ok_or_else(|| FormatError::InvalidTimestamp {
        index,
        field,
        value: text.to_string(),
    })
}

/// RFC 3339 with offset, or a naive ISO-like timestamp read as UTC.
pub fn parse_timestamp_str(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();

    DateTime::parse_from_rfc3339(text)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NAIVE_TIMESTAMP_FORMATS.iter().find_map(|format| {
                NaiveDateTime::parse_from_str(text, format)
                    .ok()
                    .map(|naive| naive.and_utc())
            })
        })
}

#[cfg(test)]
mod tests {
    use super::{durations_from_millis, format_entries, parse_timestamp_str, tag_columns};
    use crate::error::FormatError;
    use crate::report::RawEntry;
    use chrono::{TimeZone, Utc};
    use serde_json::{Value, json};

    fn entry(value: Value) -> RawEntry {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn sample(tags: Value) -> RawEntry {
        entry(json!({
            "id": 1234567890,
            "pid": 42,
            "project": "Writing",
            "description": null,
            "tags": tags,
            "start": "2024-03-04T09:00:00+09:00",
            "end": "2024-03-04T10:30:00+09:00",
            "updated": "2024-03-04T10:31:02+09:00",
            "dur": 5_400_000,
            "user": "someone",
        }))
    }

    #[test]
    fn converts_duration_linearly() {
        for millis in [0.0, 1.0, 999.0, 61_500.0, 5_400_000.0, 86_399_999.0] {
            let durations = durations_from_millis(millis);
            assert!((durations.hour - millis / 3_600_000.0).abs() < 1e-12);
            assert!((durations.minute - millis / 60_000.0).abs() < 1e-9);
            assert_eq!(durations.second, (millis / 1000.0).trunc() as i64);
        }
    }

    #[test]
    fn splits_tags_positionally() {
        let tag = |value: &str| Some(value.to_string());

        assert_eq!(tag_columns(&[]), [None, None, None]);
        assert_eq!(tag_columns(&[tag("a")]), [tag("a"), None, None]);
        assert_eq!(
            tag_columns(&[tag("a"), tag("b"), tag("c"), tag("d"), tag("e")]),
            [tag("a"), tag("b"), tag("c")]
        );
        assert_eq!(
            tag_columns(&[tag("a"), None, tag("c")]),
            [tag("a"), None, tag("c")]
        );
    }

    #[test]
    fn formats_entry_into_row() {
        let rows = format_entries(&[sample(json!(["deep", "focus", "writing", "extra"]))])
            .expect("formatted");
        let row = &rows[0];

        assert_eq!(row.id, 1_234_567_890);
        assert_eq!(row.project.as_deref(), Some("Writing"));
        assert_eq!(row.description, None);
        assert_eq!(row.start, Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap());
        assert_eq!(row.second, 5400);
        assert!((row.minute - 90.0).abs() < f64::EPSILON);
        assert!((row.hour - 1.5).abs() < f64::EPSILON);
        assert_eq!(row.tag1.as_deref(), Some("deep"));
        assert_eq!(row.tag3.as_deref(), Some("writing"));
    }

    #[test]
    fn null_tags_leave_tag_columns_empty() {
        let rows = format_entries(&[sample(Value::Null)]).expect("formatted");
        assert_eq!(rows[0].tag1, None);
        assert_eq!(rows[0].tag2, None);
        assert_eq!(rows[0].tag3, None);
    }

    #[test]
    fn missing_duration_is_a_shape_error() {
        let mut raw = sample(json!([]));
        raw.remove("dur");

        let error = format_entries(&[raw]).expect_err("dur is required");
        assert!(matches!(
            error,
            FormatError::MissingField { index: 0, field: "dur" }
        ));
    }

    #[test]
    fn null_duration_is_rejected() {
        let mut raw = sample(json!([]));
        raw.insert("dur".to_string(), Value::Null);

        assert!(matches!(
            format_entries(&[raw]),
            Err(FormatError::InvalidValue { field: "dur", .. })
        ));
    }

    #[test]
    fn non_numeric_id_fails_cast() {
        let mut raw = sample(json!([]));
        raw.insert("id".to_string(), json!("abc"));

        assert!(matches!(
            format_entries(&[raw]),
            Err(FormatError::InvalidValue { field: "id", .. })
        ));
    }

    #[test]
    fn numeric_string_id_is_accepted() {
        let mut raw = sample(json!([]));
        raw.insert("id".to_string(), json!("987"));

        let rows = format_entries(&[raw]).expect("formatted");
        assert_eq!(rows[0].id, 987);
    }

    #[test]
    fn unparsable_timestamp_is_reported() {
        let mut raw = sample(json!([]));
        raw.insert("end".to_string(), json!("yesterday"));

        assert!(matches!(
            format_entries(&[raw]),
            Err(FormatError::InvalidTimestamp { field: "end", .. })
        ));
    }

    #[test]
    fn naive_timestamps_are_read_as_utc() {
        let parsed = parse_timestamp_str("2024-03-10T23:59:59").expect("parsed");
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 3, 10, 23, 59, 59).unwrap());
    }

    #[test]
    fn empty_report_is_a_shape_error() {
        assert!(matches!(format_entries(&[]), Err(FormatError::EmptyReport)));
    }
}
