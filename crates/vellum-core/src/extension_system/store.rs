//! Persistence collaborators.
//!
//! The extension system does not own a database. It talks to two seams:
//! [`RegistrationStore`], the registration table / settings store for one
//! extension kind, and [`ContentRepository`], the shared relational store
//! handed to extension install/uninstall hooks. Both ship with in-memory
//! implementations used by tests and lightweight embedders; the server
//! crate provides SQLite-backed ones.

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::extension_system::record::{NewRegistration, RegistrationRecord};

/// Errors from a persistence collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("no registration for slug '{0}'")]
    MissingRecord(String),
}

/// Registration table for a single extension kind.
///
/// One implementation instance per kind; the trait itself is
/// kind-agnostic.
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    /// All registration records, in insertion order.
    async fn all(&self) -> Result<Vec<RegistrationRecord>, StoreError>;

    /// Look up one record by slug.
    async fn get(&self, slug: &str) -> Result<Option<RegistrationRecord>, StoreError>;

    /// The single active record, if any. Meaningful for themes; for
    /// plugins it returns an arbitrary active one.
    async fn get_active(&self) -> Result<Option<RegistrationRecord>, StoreError>;

    /// Insert or update a registration. On conflict the cached metadata
    /// and manifest snapshot are replaced but `is_active` and `settings`
    /// are preserved.
    async fn upsert(&self, registration: NewRegistration) -> Result<(), StoreError>;

    /// Flip the active flag for one slug.
    async fn set_active(&self, slug: &str, active: bool) -> Result<(), StoreError>;

    /// Activate one slug and deactivate every other record, as one
    /// logical operation (no externally observable intermediate state).
    async fn activate_exclusive(&self, slug: &str) -> Result<(), StoreError>;

    /// Replace the persisted settings override verbatim.
    async fn set_settings(&self, slug: &str, settings: &Value) -> Result<(), StoreError>;

    /// Remove a registration record.
    async fn remove(&self, slug: &str) -> Result<(), StoreError>;

    /// Fresh read of the active flag; the route bridge calls this on
    /// every dispatched request.
    async fn is_active(&self, slug: &str) -> Result<bool, StoreError>;
}

/// The shared relational store passed to extension hooks.
///
/// Synchronous by design: hooks reach it through a C callback and the
/// production backend (SQLite) is synchronous anyway.
pub trait ContentRepository: Send + Sync {
    /// Execute a statement; returns the affected row count.
    fn run(&self, sql: &str, params: &[Value]) -> Result<u64, StoreError>;

    /// Fetch the first row as a JSON object, if any.
    fn get(&self, sql: &str, params: &[Value]) -> Result<Option<Value>, StoreError>;

    /// Fetch all rows as JSON objects.
    fn all(&self, sql: &str, params: &[Value]) -> Result<Vec<Value>, StoreError>;
}

/// In-memory registration store.
#[derive(Debug, Default)]
pub struct MemoryRegistrationStore {
    // Vec keeps insertion order for `all`, mirroring rowid ordering.
    records: StdMutex<Vec<RegistrationRecord>>,
}

impl MemoryRegistrationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<RegistrationRecord>> {
        // Lock poisoning only happens if a test panicked mid-mutation.
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl RegistrationStore for MemoryRegistrationStore {
    async fn all(&self) -> Result<Vec<RegistrationRecord>, StoreError> {
        Ok(self.lock().clone())
    }

    async fn get(&self, slug: &str) -> Result<Option<RegistrationRecord>, StoreError> {
        Ok(self.lock().iter().find(|r| r.slug == slug).cloned())
    }

    async fn get_active(&self) -> Result<Option<RegistrationRecord>, StoreError> {
        Ok(self.lock().iter().find(|r| r.is_active).cloned())
    }

    async fn upsert(&self, registration: NewRegistration) -> Result<(), StoreError> {
        let mut records = self.lock();
        if let Some(existing) = records.iter_mut().find(|r| r.slug == registration.slug) {
            existing.name = Some(registration.name);
            existing.version = Some(registration.version);
            existing.description = Some(registration.description);
            existing.author = registration.author;
            existing.manifest = registration.manifest;
            // is_active and settings deliberately untouched.
        } else {
            records.push(RegistrationRecord {
                slug: registration.slug,
                name: Some(registration.name),
                version: Some(registration.version),
                description: Some(registration.description),
                author: registration.author,
                is_active: registration.initial_active,
                settings: registration.initial_settings,
                manifest: registration.manifest,
                created_at: None,
                updated_at: None,
            });
        }
        Ok(())
    }

    async fn set_active(&self, slug: &str, active: bool) -> Result<(), StoreError> {
        let mut records = self.lock();
        let record = records
            .iter_mut()
            .find(|r| r.slug == slug)
            .ok_or_else(|| StoreError::MissingRecord(slug.to_string()))?;
        record.is_active = active;
        Ok(())
    }

    async fn activate_exclusive(&self, slug: &str) -> Result<(), StoreError> {
        let mut records = self.lock();
        if !records.iter().any(|r| r.slug == slug) {
            return Err(StoreError::MissingRecord(slug.to_string()));
        }
        for record in records.iter_mut() {
            record.is_active = record.slug == slug;
        }
        Ok(())
    }

    async fn set_settings(&self, slug: &str, settings: &Value) -> Result<(), StoreError> {
        let mut records = self.lock();
        let record = records
            .iter_mut()
            .find(|r| r.slug == slug)
            .ok_or_else(|| StoreError::MissingRecord(slug.to_string()))?;
        record.settings = settings.clone();
        Ok(())
    }

    async fn remove(&self, slug: &str) -> Result<(), StoreError> {
        self.lock().retain(|r| r.slug != slug);
        Ok(())
    }

    async fn is_active(&self, slug: &str) -> Result<bool, StoreError> {
        Ok(self
            .lock()
            .iter()
            .any(|r| r.slug == slug && r.is_active))
    }
}

/// In-memory content repository: records executed statements and serves
/// canned rows. Enough for hook tests; not a SQL engine.
#[derive(Debug, Default)]
pub struct MemoryContentRepository {
    executed: StdMutex<Vec<String>>,
    canned_rows: StdMutex<HashMap<String, Vec<Value>>>,
}

impl MemoryContentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Statements executed through `run`, in order.
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Preload rows returned for an exact SQL string.
    pub fn put_rows(&self, sql: &str, rows: Vec<Value>) {
        self.canned_rows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(sql.to_string(), rows);
    }
}

impl ContentRepository for MemoryContentRepository {
    fn run(&self, sql: &str, _params: &[Value]) -> Result<u64, StoreError> {
        self.executed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(sql.to_string());
        Ok(0)
    }

    fn get(&self, sql: &str, params: &[Value]) -> Result<Option<Value>, StoreError> {
        Ok(self.all(sql, params)?.into_iter().next())
    }

    fn all(&self, sql: &str, _params: &[Value]) -> Result<Vec<Value>, StoreError> {
        Ok(self
            .canned_rows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(sql)
            .cloned()
            .unwrap_or_default())
    }
}
