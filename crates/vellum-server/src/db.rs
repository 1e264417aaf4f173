//! SQLite persistence.
//!
//! One shared connection backs both registration tables and the content
//! repository handed to extension hooks. Operations are short statements
//! behind a mutex; concurrent write pressure on the admin API is low
//! enough that connection pooling would buy nothing here.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{params, params_from_iter, Connection};
use serde_json::{Map, Value};
use tracing::info;
use vellum_core::extension_system::store::{ContentRepository, RegistrationStore, StoreError};
use vellum_core::extension_system::ExtensionKind;
use vellum_core::RegistrationRecord;
use vellum_core::extension_system::NewRegistration;

use crate::error::ServerError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS vellum_plugins (
    slug TEXT PRIMARY KEY,
    name TEXT,
    version TEXT,
    description TEXT,
    author TEXT,
    is_active INTEGER NOT NULL DEFAULT 0,
    settings TEXT,
    manifest TEXT,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS vellum_themes (
    slug TEXT PRIMARY KEY,
    name TEXT,
    version TEXT,
    description TEXT,
    author TEXT,
    is_active INTEGER NOT NULL DEFAULT 0,
    settings TEXT,
    manifest TEXT,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
";

/// Open (or create) the server database and apply the schema.
pub fn open_database(path: &Path) -> Result<Arc<Mutex<Connection>>, ServerError> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch(SCHEMA)?;
    info!("database ready at {}", path.display());
    Ok(Arc::new(Mutex::new(conn)))
}

#[cfg(test)]
pub fn open_in_memory() -> Result<Arc<Mutex<Connection>>, ServerError> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch(SCHEMA)?;
    Ok(Arc::new(Mutex::new(conn)))
}

fn backend(err: rusqlite::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn lock(conn: &Arc<Mutex<Connection>>) -> MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(|e| e.into_inner())
}

/// SQLite-backed registration table for one extension kind.
pub struct SqliteRegistrationStore {
    conn: Arc<Mutex<Connection>>,
    table: &'static str,
}

impl SqliteRegistrationStore {
    pub fn new(conn: Arc<Mutex<Connection>>, kind: ExtensionKind) -> Self {
        let table = match kind {
            ExtensionKind::Plugin => "vellum_plugins",
            ExtensionKind::Theme => "vellum_themes",
        };
        Self { conn, table }
    }

    fn select_sql(&self, where_clause: &str) -> String {
        format!(
            "SELECT slug, name, version, description, author, is_active, settings, manifest, \
             created_at, updated_at FROM {} {} ORDER BY rowid",
            self.table, where_clause
        )
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<RegistrationRecord> {
    let settings_raw: Option<String> = row.get(6)?;
    let manifest_raw: Option<String> = row.get(7)?;
    Ok(RegistrationRecord {
        slug: row.get(0)?,
        name: row.get(1)?,
        version: row.get(2)?,
        description: row.get(3)?,
        author: row.get(4)?,
        is_active: row.get::<_, i64>(5)? != 0,
        settings: parse_json_column(settings_raw),
        manifest: parse_json_column(manifest_raw),
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn parse_json_column(raw: Option<String>) -> Value {
    raw.as_deref()
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or(Value::Null)
}

#[async_trait]
impl RegistrationStore for SqliteRegistrationStore {
    async fn all(&self) -> Result<Vec<RegistrationRecord>, StoreError> {
        let conn = lock(&self.conn);
        let mut stmt = conn.prepare(&self.select_sql("")).map_err(backend)?;
        let rows = stmt
            .query_map([], row_to_record)
            .map_err(backend)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(backend)?;
        Ok(rows)
    }

    async fn get(&self, slug: &str) -> Result<Option<RegistrationRecord>, StoreError> {
        let conn = lock(&self.conn);
        let mut stmt = conn
            .prepare(&self.select_sql("WHERE slug = ?1"))
            .map_err(backend)?;
        let mut rows = stmt
            .query_map(params![slug], row_to_record)
            .map_err(backend)?;
        rows.next().transpose().map_err(backend)
    }

    async fn get_active(&self) -> Result<Option<RegistrationRecord>, StoreError> {
        let conn = lock(&self.conn);
        let mut stmt = conn
            .prepare(&self.select_sql("WHERE is_active = 1"))
            .map_err(backend)?;
        let mut rows = stmt.query_map([], row_to_record).map_err(backend)?;
        rows.next().transpose().map_err(backend)
    }

    async fn upsert(&self, registration: NewRegistration) -> Result<(), StoreError> {
        let settings = registration.initial_settings.to_string();
        let manifest = registration.manifest.to_string();
        let conn = lock(&self.conn);
        // is_active and settings are only written on first insert; an
        // upgrade never resets user state.
        let sql = format!(
            "INSERT INTO {} (slug, name, version, description, author, is_active, settings, manifest) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
             ON CONFLICT(slug) DO UPDATE SET \
               name = excluded.name, \
               version = excluded.version, \
               description = excluded.description, \
               author = excluded.author, \
               manifest = excluded.manifest, \
               updated_at = CURRENT_TIMESTAMP",
            self.table
        );
        conn.execute(
            &sql,
            params![
                registration.slug,
                registration.name,
                registration.version,
                registration.description,
                registration.author,
                registration.initial_active as i64,
                settings,
                manifest,
            ],
        )
        .map_err(backend)?;
        Ok(())
    }

    async fn set_active(&self, slug: &str, active: bool) -> Result<(), StoreError> {
        let conn = lock(&self.conn);
        let sql = format!(
            "UPDATE {} SET is_active = ?1, updated_at = CURRENT_TIMESTAMP WHERE slug = ?2",
            self.table
        );
        let changed = conn
            .execute(&sql, params![active as i64, slug])
            .map_err(backend)?;
        if changed == 0 {
            return Err(StoreError::MissingRecord(slug.to_string()));
        }
        Ok(())
    }

    async fn activate_exclusive(&self, slug: &str) -> Result<(), StoreError> {
        let mut conn = lock(&self.conn);
        let tx = conn.transaction().map_err(backend)?;
        let exists: i64 = tx
            .query_row(
                &format!("SELECT COUNT(*) FROM {} WHERE slug = ?1", self.table),
                params![slug],
                |row| row.get(0),
            )
            .map_err(backend)?;
        if exists == 0 {
            return Err(StoreError::MissingRecord(slug.to_string()));
        }
        tx.execute(
            &format!(
                "UPDATE {} SET is_active = (slug = ?1), updated_at = CURRENT_TIMESTAMP",
                self.table
            ),
            params![slug],
        )
        .map_err(backend)?;
        tx.commit().map_err(backend)?;
        Ok(())
    }

    async fn set_settings(&self, slug: &str, settings: &Value) -> Result<(), StoreError> {
        let conn = lock(&self.conn);
        let sql = format!(
            "UPDATE {} SET settings = ?1, updated_at = CURRENT_TIMESTAMP WHERE slug = ?2",
            self.table
        );
        let changed = conn
            .execute(&sql, params![settings.to_string(), slug])
            .map_err(backend)?;
        if changed == 0 {
            return Err(StoreError::MissingRecord(slug.to_string()));
        }
        Ok(())
    }

    async fn remove(&self, slug: &str) -> Result<(), StoreError> {
        let conn = lock(&self.conn);
        conn.execute(
            &format!("DELETE FROM {} WHERE slug = ?1", self.table),
            params![slug],
        )
        .map_err(backend)?;
        Ok(())
    }

    async fn is_active(&self, slug: &str) -> Result<bool, StoreError> {
        let conn = lock(&self.conn);
        let active: Option<i64> = conn
            .query_row(
                &format!("SELECT is_active FROM {} WHERE slug = ?1", self.table),
                params![slug],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
            .map_err(backend)?;
        Ok(active.unwrap_or(0) != 0)
    }
}

/// SQLite content repository handed to extension hooks.
pub struct SqliteContentRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteContentRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }
}

fn bind_value(value: &Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as SqlValue;
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(*b as i64),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlValue::Integer(i)
            } else {
                SqlValue::Real(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => SqlValue::Text(s.clone()),
        // Structured values are stored as JSON text.
        other => SqlValue::Text(other.to_string()),
    }
}

fn column_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
    }
}

impl ContentRepository for SqliteContentRepository {
    fn run(&self, sql: &str, params: &[Value]) -> Result<u64, StoreError> {
        let conn = lock(&self.conn);
        let changed = conn
            .execute(sql, params_from_iter(params.iter().map(bind_value)))
            .map_err(backend)?;
        Ok(changed as u64)
    }

    fn get(&self, sql: &str, params: &[Value]) -> Result<Option<Value>, StoreError> {
        Ok(self.all(sql, params)?.into_iter().next())
    }

    fn all(&self, sql: &str, params: &[Value]) -> Result<Vec<Value>, StoreError> {
        let conn = lock(&self.conn);
        let mut stmt = conn.prepare(sql).map_err(backend)?;
        let column_names: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(|n| n.to_string())
            .collect();
        let mut rows = stmt
            .query(params_from_iter(params.iter().map(bind_value)))
            .map_err(backend)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(backend)? {
            let mut object = Map::new();
            for (index, name) in column_names.iter().enumerate() {
                let value = row.get_ref(index).map_err(backend)?;
                object.insert(name.clone(), column_value(value));
            }
            out.push(Value::Object(object));
        }
        Ok(out)
    }
}
