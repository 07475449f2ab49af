use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub const DEFAULT_PARTITION_FIELD: &str = "start";
const MAX_CLUSTERING_FIELDS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldType {
    Integer,
    Float,
    String,
    Timestamp,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Float => "FLOAT",
            Self::String => "STRING",
            Self::Timestamp => "TIMESTAMP",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldMode {
    Required,
    Nullable,
}

impl FieldMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Required => "REQUIRED",
            Self::Nullable => "NULLABLE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub mode: FieldMode,
}

impl FieldSchema {
    pub fn new(name: &str, field_type: FieldType, mode: FieldMode) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            mode,
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "name": self.name,
            "type": self.field_type.as_str(),
            "mode": self.mode.as_str(),
        })
    }
}

pub fn default_schema() -> Vec<FieldSchema> {
    use FieldMode::{Nullable, Required};
    use FieldType::{Float, Integer, String, Timestamp};

    vec![
        FieldSchema::new("id", Integer, Required),
        FieldSchema::new("project", String, Nullable),
        FieldSchema::new("description", String, Nullable),
        FieldSchema::new("start", Timestamp, Required),
        FieldSchema::new("end", Timestamp, Required),
        FieldSchema::new("updated", Timestamp, Required),
        FieldSchema::new("second", Integer, Required),
        FieldSchema::new("minute", Float, Required),
        FieldSchema::new("hour", Float, Required),
        FieldSchema::new("tag1", String, Nullable),
        FieldSchema::new("tag2", String, Nullable),
        FieldSchema::new("tag3", String, Nullable),
    ]
}

pub fn default_clustering_fields() -> Vec<String> {
    ["project", "tag1", "tag2", "tag3"]
        .into_iter()
        .map(ToOwned::to_owned)
        .collect()
}

/// One typed value of a row, `None` meaning SQL NULL.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Integer(Option<i64>),
    Float(Option<f64>),
    String(Option<String>),
    Timestamp(Option<DateTime<Utc>>),
}

impl Cell {
    pub fn field_type(&self) -> FieldType {
        match self {
            Self::Integer(_) => FieldType::Integer,
            Self::Float(_) => FieldType::Float,
            Self::String(_) => FieldType::String,
            Self::Timestamp(_) => FieldType::Timestamp,
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            Self::Integer(value) => value.is_none(),
            Self::Float(value) => value.is_none(),
            Self::String(value) => value.is_none(),
            Self::Timestamp(value) => value.is_none(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Integer(value) => json!(value),
            Self::Float(value) => json!(value),
            Self::String(value) => json!(value),
            Self::Timestamp(value) => json!(
                value.map(|timestamp| timestamp.format("%Y-%m-%d %H:%M:%S%.6f UTC").to_string())
            ),
        }
    }
}

pub type RowCells = Vec<(&'static str, Cell)>;

/// Schema plus the physical layout hints of the target table.
#[derive(Debug, Clone)]
pub struct TableSpec {
    pub schema: Vec<FieldSchema>,
    pub time_partitioning_field: Option<String>,
    pub clustering_fields: Vec<String>,
}

impl TableSpec {
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.schema.iter().find(|field| field.name == name)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema.is_empty() {
            bail!("table schema must declare at least one column");
        }

        if let Some(duplicate) = self.schema.iter().enumerate().find_map(|(index, field)| {
            self.schema[..index]
                .iter()
                .any(|earlier| earlier.name == field.name)
                .then_some(&field.name)
        }) {
            bail!("table schema declares column `{duplicate}` more than once");
        }

        if let Some(partition) = &self.time_partitioning_field {
            match self.field(partition) {
                Some(field) if field.field_type == FieldType::Timestamp => {}
                Some(_) => bail!("partition column `{partition}` must be a TIMESTAMP"),
                None => bail!("partition column `{partition}` is not in the schema"),
            }
        }

        if self.clustering_fields.len() > MAX_CLUSTERING_FIELDS {
            bail!(
                "at most {MAX_CLUSTERING_FIELDS} clustering columns are supported, got {}",
                self.clustering_fields.len()
            );
        }

        if let Some(missing) = self
            .clustering_fields
            .iter()
            .find(|name| self.field(name).is_none())
        {
            bail!("clustering column `{missing}` is not in the schema");
        }

        Ok(())
    }

    /// Checks one row against the declared schema before it is loaded.
    pub fn validate_row(&self, row: &RowCells) -> Result<()> {
        if let Some((name, _)) = row.iter().find(|(name, _)| self.field(name).is_none()) {
            bail!("row has column `{name}` which is not in the table schema");
        }

        self.schema.iter().try_for_each(|field| {
            match row.iter().find(|(name, _)| *name == field.name) {
                Some((_, cell)) if cell.field_type() != field.field_type => bail!(
                    "column `{}` expects {} but row holds {}",
                    field.name,
                    field.field_type.as_str(),
                    cell.field_type().as_str()
                ),
                Some((_, cell)) if cell.is_null() && field.mode == FieldMode::Required => {
                    bail!("column `{}` is REQUIRED but row holds NULL", field.name)
                }
                None if field.mode == FieldMode::Required => {
                    bail!("column `{}` is REQUIRED but missing from row", field.name)
                }
                _ => Ok(()),
            }
        })
    }
}
