//! SQLite implementation of `RecordStore`.
//!
//! Queries are rendered to parameterized SQL. Identifiers come exclusively
//! from the table catalogue; values are always bound as parameters.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use serde_json::Value;

use super::query::{escape_like, Filter, Query, Row, Selection};
use super::schema::{Column, ColumnKind, Table, DEPENDENT_TABLES};
use super::sqlite::{open_database, open_memory_database, UNICODE_LOWER};
use super::store::{Procedure, RecordStore};
use super::DatabaseError;

/// `RecordStore` over a single SQLite connection.
pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
}

impl SqliteRecordStore {
    fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Open (and migrate) the database file at `path`.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        Ok(Self::new(open_database(path)?))
    }

    /// Fresh migrated in-memory database.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Ok(Self::new(open_memory_database()?))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)
    }

    fn soft_delete_patient(conn: &Connection, args: &Row) -> Result<Value, DatabaseError> {
        let patient_id = arg_str(args, "patient_id")?;
        let user_id = arg_str(args, "user_id")?;
        let backup = arg_object(args, "backup")?;
        let patient_patch = arg_object(args, "patient_patch")?;
        let audit_entry = arg_object(args, "audit_entry")?;

        let tx = conn.unchecked_transaction()?;

        let updated = update_rows(
            &tx,
            Table::Patients,
            &[
                Filter::eq("id", patient_id.clone()),
                Filter::eq("user_id", user_id.clone()),
                Filter::NullOrFalse("is_deleted"),
            ],
            patient_patch.clone(),
        )?;
        if updated == 0 {
            // Dropping the transaction rolls it back.
            return Err(DatabaseError::NotFound {
                entity_type: "patient".into(),
                id: patient_id,
            });
        }

        let stored_backup = insert_row(&tx, Table::DeletedPatientsBackup, backup)?;

        for table in DEPENDENT_TABLES {
            update_rows(
                &tx,
                table,
                &[
                    Filter::eq("patient_id", patient_id.clone()),
                    Filter::eq("user_id", user_id.clone()),
                ],
                patient_patch.clone(),
            )?;
        }

        insert_row(&tx, Table::PatientAuditLog, audit_entry)?;
        tx.commit()?;

        Ok(Value::Object(stored_backup))
    }
}

impl RecordStore for SqliteRecordStore {
    fn select(&self, query: &Query) -> Result<Selection, DatabaseError> {
        let conn = self.lock()?;
        select_rows(&conn, query)
    }

    fn insert(&self, table: Table, row: Row) -> Result<Row, DatabaseError> {
        let conn = self.lock()?;
        insert_row(&conn, table, row)
    }

    fn update(&self, table: Table, filters: &[Filter], patch: Row) -> Result<usize, DatabaseError> {
        let conn = self.lock()?;
        update_rows(&conn, table, filters, patch)
    }

    fn delete(&self, table: Table, filters: &[Filter]) -> Result<usize, DatabaseError> {
        let conn = self.lock()?;
        delete_rows(&conn, table, filters)
    }

    fn supports_procedure(&self, procedure: Procedure) -> bool {
        matches!(procedure, Procedure::SoftDeletePatient)
    }

    fn call_procedure(&self, procedure: Procedure, args: Row) -> Result<Value, DatabaseError> {
        let conn = self.lock()?;
        match procedure {
            Procedure::SoftDeletePatient => Self::soft_delete_patient(&conn, &args),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// SQL rendering
// ═══════════════════════════════════════════════════════════

/// Accumulates WHERE clauses and their positional parameters.
struct SqlBuilder {
    table: Table,
    clauses: Vec<String>,
    params: Vec<SqlValue>,
}

impl SqlBuilder {
    fn new(table: Table) -> Self {
        Self {
            table,
            clauses: Vec::new(),
            params: Vec::new(),
        }
    }

    fn bind(&mut self, value: SqlValue) -> String {
        self.params.push(value);
        format!("?{}", self.params.len())
    }

    fn bind_json(&mut self, column: &Column, value: &Value) -> Result<String, DatabaseError> {
        let sql = to_sql_value(self.table, column, value)?;
        Ok(self.bind(sql))
    }

    fn add_filter(&mut self, filter: &Filter) -> Result<(), DatabaseError> {
        let clause = match filter {
            Filter::Eq(name, value) => {
                let col = checked_column(self.table, name)?;
                if value.is_null() {
                    format!("{} IS NULL", col.name)
                } else {
                    format!("{} = {}", col.name, self.bind_json(col, value)?)
                }
            }
            Filter::Neq(name, value) => {
                let col = checked_column(self.table, name)?;
                if value.is_null() {
                    format!("{} IS NOT NULL", col.name)
                } else {
                    format!("({0} IS NULL OR {0} <> {1})", col.name, self.bind_json(col, value)?)
                }
            }
            Filter::NullOrFalse(name) => {
                let col = checked_column(self.table, name)?;
                format!("({0} IS NULL OR {0} = 0)", col.name)
            }
            Filter::Gte(name, value) => self.comparison(name, ">=", value)?,
            Filter::Lte(name, value) => self.comparison(name, "<=", value)?,
            Filter::In(name, values) => {
                let col = checked_column(self.table, name)?;
                if values.is_empty() {
                    "0".to_string()
                } else {
                    let placeholders = values
                        .iter()
                        .map(|v| self.bind_json(col, v))
                        .collect::<Result<Vec<_>, _>>()?;
                    format!("{} IN ({})", col.name, placeholders.join(", "))
                }
            }
            Filter::ContainsAny(names, term) => {
                let cols = names
                    .iter()
                    .map(|n| checked_column(self.table, n))
                    .collect::<Result<Vec<_>, _>>()?;
                let pattern = format!("%{}%", escape_like(&term.to_lowercase()));
                let placeholder = self.bind(SqlValue::Text(pattern));
                let parts = cols
                    .iter()
                    .map(|c| format!("{UNICODE_LOWER}({}) LIKE {placeholder} ESCAPE '\\'", c.name))
                    .collect::<Vec<_>>();
                format!("({})", parts.join(" OR "))
            }
        };
        self.clauses.push(clause);
        Ok(())
    }

    fn comparison(&mut self, name: &str, op: &str, value: &Value) -> Result<String, DatabaseError> {
        let col = checked_column(self.table, name)?;
        Ok(format!("{} {op} {}", col.name, self.bind_json(col, value)?))
    }

    fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }
}

fn checked_column(table: Table, name: &str) -> Result<&'static Column, DatabaseError> {
    table.column(name).ok_or_else(|| DatabaseError::UnknownColumn {
        table: table.as_str(),
        column: name.to_string(),
    })
}

fn select_list(table: Table) -> String {
    table
        .columns()
        .iter()
        .map(|c| c.name)
        .collect::<Vec<_>>()
        .join(", ")
}

fn to_sql_value(table: Table, column: &Column, value: &Value) -> Result<SqlValue, DatabaseError> {
    let invalid = |reason: &str| DatabaseError::InvalidValue {
        table: table.as_str(),
        column: column.name,
        reason: reason.to_string(),
    };
    match (column.kind, value) {
        (_, Value::Null) => Ok(SqlValue::Null),
        (ColumnKind::Json, v) => Ok(SqlValue::Text(serde_json::to_string(v)?)),
        (ColumnKind::Bool, Value::Bool(b)) => Ok(SqlValue::Integer(i64::from(*b))),
        (ColumnKind::Bool, _) => Err(invalid("expected a boolean")),
        (ColumnKind::Text, Value::String(s)) => Ok(SqlValue::Text(s.clone())),
        (ColumnKind::Text, _) => Err(invalid("expected a string")),
    }
}

fn read_row(table: Table, row: &rusqlite::Row) -> Result<Row, DatabaseError> {
    let mut out = Row::new();
    for (idx, col) in table.columns().iter().enumerate() {
        let value = match col.kind {
            ColumnKind::Text => row
                .get::<_, Option<String>>(idx)?
                .map(Value::String)
                .unwrap_or(Value::Null),
            ColumnKind::Bool => row
                .get::<_, Option<i64>>(idx)?
                .map(|n| Value::Bool(n != 0))
                .unwrap_or(Value::Null),
            ColumnKind::Json => match row.get::<_, Option<String>>(idx)? {
                Some(raw) => serde_json::from_str(&raw)?,
                None => Value::Null,
            },
        };
        out.insert(col.name.to_string(), value);
    }
    Ok(out)
}

fn select_rows(conn: &Connection, query: &Query) -> Result<Selection, DatabaseError> {
    let table = query.table;
    let mut builder = SqlBuilder::new(table);
    for filter in &query.filters {
        builder.add_filter(filter)?;
    }
    let where_sql = builder.where_sql();

    let count = if query.count {
        let sql = format!("SELECT COUNT(*) FROM {table}{where_sql}");
        let total: i64 = conn.query_row(&sql, params_from_iter(builder.params.iter()), |row| {
            row.get(0)
        })?;
        Some(total.max(0) as u64)
    } else {
        None
    };

    let mut order_parts = Vec::with_capacity(query.order.len() + 1);
    for order in &query.order {
        let col = checked_column(table, order.column)?;
        let direction = if order.ascending { "ASC" } else { "DESC" };
        order_parts.push(format!("{} {direction}", col.name));
    }
    // Insertion order breaks ties, in the direction of the primary sort.
    let primary_ascending = query.order.first().map_or(true, |o| o.ascending);
    order_parts.push(if primary_ascending { "rowid ASC" } else { "rowid DESC" }.to_string());

    let mut sql = format!(
        "SELECT {} FROM {table}{where_sql} ORDER BY {}",
        select_list(table),
        order_parts.join(", ")
    );
    if let Some(window) = query.window {
        let limit = builder.bind(SqlValue::Integer(window_param(table, "limit", window.limit)?));
        let offset = builder.bind(SqlValue::Integer(window_param(table, "offset", window.offset)?));
        sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}"));
    }

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(builder.params.iter()))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(read_row(table, row)?);
    }

    Ok(Selection { rows: out, count })
}

/// SQLite reads a negative LIMIT as "no limit", so out-of-range values are refused.
fn window_param(table: Table, column: &'static str, value: u64) -> Result<i64, DatabaseError> {
    i64::try_from(value).map_err(|_| DatabaseError::InvalidValue {
        table: table.as_str(),
        column,
        reason: format!("{value} exceeds the largest SQLite integer"),
    })
}

fn insert_row(conn: &Connection, table: Table, row: Row) -> Result<Row, DatabaseError> {
    let mut builder = SqlBuilder::new(table);
    let mut names = Vec::with_capacity(row.len());
    let mut placeholders = Vec::with_capacity(row.len());
    for (name, value) in &row {
        let col = checked_column(table, name)?;
        names.push(col.name);
        placeholders.push(builder.bind_json(col, value)?);
    }

    let sql = format!(
        "INSERT INTO {table} ({}) VALUES ({})",
        names.join(", "),
        placeholders.join(", ")
    );
    conn.execute(&sql, params_from_iter(builder.params.iter()))?;

    let id = row.get("id").cloned().unwrap_or(Value::Null);
    let stored = select_rows(conn, &Query::table(table).filter(Filter::Eq("id", id.clone())))?;
    stored
        .rows
        .into_iter()
        .next()
        .ok_or_else(|| DatabaseError::NotFound {
            entity_type: table.as_str().into(),
            id: id.as_str().unwrap_or_default().to_string(),
        })
}

fn update_rows(
    conn: &Connection,
    table: Table,
    filters: &[Filter],
    patch: Row,
) -> Result<usize, DatabaseError> {
    if filters.is_empty() {
        return Err(DatabaseError::UnfilteredMutation("update", table.as_str()));
    }
    if patch.is_empty() {
        return Ok(0);
    }

    let mut builder = SqlBuilder::new(table);
    let mut assignments = Vec::with_capacity(patch.len());
    for (name, value) in &patch {
        let col = checked_column(table, name)?;
        assignments.push(format!("{} = {}", col.name, builder.bind_json(col, value)?));
    }
    for filter in filters {
        builder.add_filter(filter)?;
    }

    let sql = format!(
        "UPDATE {table} SET {}{}",
        assignments.join(", "),
        builder.where_sql()
    );
    Ok(conn.execute(&sql, params_from_iter(builder.params.iter()))?)
}

fn delete_rows(conn: &Connection, table: Table, filters: &[Filter]) -> Result<usize, DatabaseError> {
    if filters.is_empty() {
        return Err(DatabaseError::UnfilteredMutation("delete", table.as_str()));
    }
    let mut builder = SqlBuilder::new(table);
    for filter in filters {
        builder.add_filter(filter)?;
    }
    let sql = format!("DELETE FROM {table}{}", builder.where_sql());
    Ok(conn.execute(&sql, params_from_iter(builder.params.iter()))?)
}

fn arg_str(args: &Row, key: &'static str) -> Result<String, DatabaseError> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(DatabaseError::InvalidValue {
            table: "procedure",
            column: key,
            reason: "missing string argument".into(),
        })
}

fn arg_object(args: &Row, key: &'static str) -> Result<Row, DatabaseError> {
    args.get(key)
        .and_then(Value::as_object)
        .cloned()
        .ok_or(DatabaseError::InvalidValue {
            table: "procedure",
            column: key,
            reason: "missing object argument".into(),
        })
}
