use crate::formatter::TimeEntryRow;
use crate::warehouse::schema::{Cell, FieldMode, FieldType, TableSpec};
use crate::warehouse::{ReplaceOutcome, TableStatus, TimestampRange, Warehouse, WindowReplacer};
use anyhow::{Context, Result, bail};
use regex::Regex;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, params, params_from_iter};
use std::fs;
use std::path::Path;
use tracing::info;

/// Local warehouse backed by one SQLite table. Timestamps are UTC microseconds.
pub struct SqliteWarehouse {
    conn: Connection,
    table: String,
    spec: TableSpec,
}

impl SqliteWarehouse {
    pub fn open(path: &Path, table: &str, spec: TableSpec) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create warehouse directory: {}", parent.display())
            })?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite warehouse: {}", path.display()))?;

        Self::from_connection(conn, table, spec)
    }

    pub fn from_connection(conn: Connection, table: &str, spec: TableSpec) -> Result<Self> {
        validate_table_name(table)?;
        spec.validate()?;

        Ok(Self {
            conn,
            table: table.to_string(),
            spec,
        })
    }

    fn table_exists(&self) -> Result<bool> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![&self.table],
                |row| row.get(0),
            )
            .context("Failed to look up warehouse table")?;

        Ok(count > 0)
    }

    fn create_statements(&self) -> Vec<String> {
        let columns = self
            .spec
            .schema
            .iter()
            .map(|field| {
                let not_null = match field.mode {
                    FieldMode::Required => " NOT NULL",
                    FieldMode::Nullable => "",
                };
                format!("  {} {}{}", quote(&field.name), sql_type(field.field_type), not_null)
            })
            .collect::<Vec<_>>()
            .join(",\n");

        let mut statements = vec![format!(
            "CREATE TABLE {} (\n{}\n)",
            quote(&self.table),
            columns
        )];

        if let Some(partition) = &self.spec.time_partitioning_field {
            statements.push(format!(
                "CREATE INDEX {} ON {}({})",
                quote(&format!("idx_{}_partition", self.table)),
                quote(&self.table),
                quote(partition)
            ));
        }

        if !self.spec.clustering_fields.is_empty() {
            statements.push(format!(
                "CREATE INDEX {} ON {}({})",
                quote(&format!("idx_{}_cluster", self.table)),
                quote(&self.table),
                self.spec
                    .clustering_fields
                    .iter()
                    .map(|name| quote(name))
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }

        statements
    }

    fn timestamp_column(&self, column: &str) -> Result<()> {
        match self.spec.field(column) {
            Some(field) if field.field_type == FieldType::Timestamp => Ok(()),
            Some(_) => bail!("column `{column}` is not a TIMESTAMP"),
            None => bail!("column `{column}` is not in the table schema"),
        }
    }

    fn delete_in(&self, conn: &Connection, range: &TimestampRange, column: &str) -> Result<u64> {
        self.timestamp_column(column)?;
        let (start, end) = range.utc_bounds()?;

        let deleted = conn
            .execute(
                &format!(
                    "DELETE FROM {table} WHERE {col} >= ?1 AND {col} <= ?2",
                    table = quote(&self.table),
                    col = quote(column)
                ),
                params![start.timestamp_micros(), end.timestamp_micros()],
            )
            .context("Failed to delete warehouse rows")?;

        Ok(deleted as u64)
    }

    fn insert_in(&self, conn: &Connection, rows: &[TimeEntryRow]) -> Result<u64> {
        let columns = self
            .spec
            .schema
            .iter()
            .map(|field| quote(&field.name))
            .collect::<Vec<_>>();
        let placeholders = (1..=columns.len())
            .map(|index| format!("?{index}"))
            .collect::<Vec<_>>();

        let mut statement = conn
            .prepare(&format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote(&self.table),
                columns.join(", "),
                placeholders.join(", ")
            ))
            .context("Failed to prepare warehouse insert")?;

        rows.iter().try_for_each(|row| {
            let cells = row.cells();
            self.spec.validate_row(&cells)?;

            let values = self.spec.schema.iter().map(|field| {
                cells
                    .iter()
                    .find(|(name, _)| *name == field.name)
                    .map(|(_, cell)| sql_value(cell))
                    .unwrap_or(SqlValue::Null)
            });

            statement
                .execute(params_from_iter(values))
                .with_context(|| format!("Failed to insert warehouse row {}", row.id))
                .map(|_| ())
        })?;

        Ok(rows.len() as u64)
    }
}

impl Warehouse for SqliteWarehouse {
    fn ensure_table(&self) -> Result<TableStatus> {
        if self.table_exists()? {
            info!(table = %self.table, "table already exists");
            return Ok(TableStatus::AlreadyExists);
        }

        let transaction = self
            .conn
            .unchecked_transaction()
            .context("Failed to start transaction")?;
        self.create_statements().iter().try_for_each(|statement| {
            transaction
                .execute(statement, [])
                .context("Failed to create warehouse table")
                .map(|_| ())
        })?;
        transaction
            .commit()
            .context("Failed to commit warehouse table")?;

        info!(table = %self.table, "table is created");
        Ok(TableStatus::Created)
    }

    fn delete_rows(&self, range: &TimestampRange, column: &str) -> Result<u64> {
        self.delete_in(&self.conn, range, column)
    }

    fn append_rows(&self, rows: &[TimeEntryRow]) -> Result<u64> {
        let transaction = self
            .conn
            .unchecked_transaction()
            .context("Failed to start transaction")?;
        let inserted = self.insert_in(&transaction, rows)?;
        transaction
            .commit()
            .context("Failed to commit warehouse rows")?;

        Ok(inserted)
    }
}

/// Delete and insert share one transaction, so a failed run leaves the window untouched.
impl WindowReplacer for SqliteWarehouse {
    fn replace_window(
        &self,
        rows: &[TimeEntryRow],
        range: &TimestampRange,
        column: &str,
    ) -> Result<ReplaceOutcome> {
        let transaction = self
            .conn
            .unchecked_transaction()
            .context("Failed to start transaction")?;

        let deleted = self.delete_in(&transaction, range, column)?;
        let inserted = self.insert_in(&transaction, rows)?;

        transaction
            .commit()
            .context("Failed to commit replaced window")?;

        info!(
            table = %self.table,
            from = %range.start_text(),
            to = %range.end_text(),
            deleted,
            inserted,
            "replaced window"
        );

        Ok(ReplaceOutcome { deleted, inserted })
    }
}

pub fn validate_table_name(name: &str) -> Result<()> {
    let pattern = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").context("Invalid table name pattern")?;
    if !pattern.is_match(name) {
        bail!("Invalid SQLite table name: {name}");
    }
    Ok(())
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn sql_type(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::Integer | FieldType::Timestamp => "INTEGER",
        FieldType::Float => "REAL",
        FieldType::String => "TEXT",
    }
}

fn sql_value(cell: &Cell) -> SqlValue {
    match cell {
        Cell::Integer(Some(value)) => SqlValue::Integer(*value),
        Cell::Float(Some(value)) => SqlValue::Real(*value),
        Cell::String(Some(value)) => SqlValue::Text(value.clone()),
        Cell::Timestamp(Some(value)) => SqlValue::Integer(value.timestamp_micros()),
        _ => SqlValue::Null,
    }
}
