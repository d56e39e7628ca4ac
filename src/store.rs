//! Document store collaborator.
//!
//! The assistant only reads. `SqliteStore` keeps every collection in one
//! `documents` table with the scope columns pulled out of the JSON payload so
//! tenant, owner and shared-with lookups stay indexable.

use std::{
    fs,
    path::Path,
    sync::{Arc, Mutex},
};

use anyhow::Context;
use async_trait::async_trait;
use rusqlite::{params, params_from_iter, types::Value as SqlValue, Connection};
use serde::Deserialize;
use serde_json::Value;
use tokio::task;
use tracing::{info, warn};

use crate::{error::StoreError, models::CandidateRecord};

const USERS_COLLECTION: &str = "users";

const SCHEMA: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    CREATE TABLE IF NOT EXISTS documents (
        collection TEXT NOT NULL,
        id TEXT NOT NULL,
        company TEXT,
        owner_id TEXT,
        shared_with_json TEXT NOT NULL DEFAULT '[]',
        updated_at TEXT NOT NULL DEFAULT '',
        data_json TEXT NOT NULL,
        PRIMARY KEY (collection, id)
    );
    CREATE INDEX IF NOT EXISTS idx_documents_company ON documents(collection, company);
    CREATE INDEX IF NOT EXISTS idx_documents_owner ON documents(collection, owner_id);
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Tenant(String),
    Owner(String),
    SharedWith(String),
    Unscoped,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Newest first, at most `limit` records.
    async fn find_by_scope(
        &self,
        collection: &str,
        scope: &Scope,
        limit: usize,
    ) -> Result<Vec<CandidateRecord>, StoreError>;

    /// The tenant (company name) the user belongs to, if known.
    async fn company_of(&self, user_id: &str) -> Result<Option<String>, StoreError>;
}

/// A document as written by fixtures and the seed file. Scope columns fall
/// back to the matching payload keys when not given explicitly.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedDocument {
    pub collection: String,
    pub id: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub shared_with: Vec<String>,
    pub data: Value,
}

impl SeedDocument {
    fn payload_str(&self, key: &str) -> Option<String> {
        self.data.get(key).and_then(Value::as_str).map(ToString::to_string)
    }

    fn company(&self) -> Option<String> {
        self.company.clone().or_else(|| self.payload_str("company"))
    }

    fn owner_id(&self) -> Option<String> {
        self.owner_id
            .clone()
            .or_else(|| self.payload_str("ownerId"))
            .or_else(|| self.payload_str("userId"))
    }

    fn shared_with(&self) -> Vec<String> {
        if !self.shared_with.is_empty() {
            return self.shared_with.clone();
        }
        self.data
            .get("sharedWith")
            .and_then(Value::as_array)
            .map(|ids| {
                ids.iter()
                    .filter_map(Value::as_str)
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = self.conn.clone();
        task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&mut guard)
        })
        .await?
    }

    pub async fn upsert_many(&self, docs: Vec<SeedDocument>) -> Result<usize, StoreError> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            for doc in &docs {
                let updated_at = CandidateRecord::new(doc.id.clone(), doc.data.clone())
                    .sort_date()
                    .to_string();
                let shared_with_json =
                    serde_json::to_string(&doc.shared_with()).map_err(|source| {
                        StoreError::Decode {
                            id: doc.id.clone(),
                            source,
                        }
                    })?;
                tx.execute(
                    "INSERT INTO documents(collection,id,company,owner_id,shared_with_json,updated_at,data_json)
                     VALUES(?1,?2,?3,?4,?5,?6,?7)
                     ON CONFLICT(collection,id) DO UPDATE SET
                        company=excluded.company,
                        owner_id=excluded.owner_id,
                        shared_with_json=excluded.shared_with_json,
                        updated_at=excluded.updated_at,
                        data_json=excluded.data_json",
                    params![
                        doc.collection,
                        doc.id,
                        doc.company(),
                        doc.owner_id(),
                        shared_with_json,
                        updated_at,
                        doc.data.to_string(),
                    ],
                )?;
            }
            tx.commit()?;
            Ok(docs.len())
        })
        .await
    }

    /// Loads a JSON array of `SeedDocument`s.
    pub async fn seed_from_file(&self, path: &Path) -> anyhow::Result<usize> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed reading seed file {}", path.display()))?;
        let docs: Vec<SeedDocument> = serde_json::from_str(&raw)
            .with_context(|| format!("Failed parsing seed file {}", path.display()))?;
        let count = self
            .upsert_many(docs)
            .await
            .with_context(|| format!("Failed seeding from {}", path.display()))?;
        info!(path = %path.display(), documents = count, "Seeded document store");
        Ok(count)
    }
}

fn scope_clause(scope: &Scope) -> (&'static str, Option<String>) {
    match scope {
        Scope::Tenant(company) => ("AND company = ?", Some(company.clone())),
        Scope::Owner(user_id) => ("AND owner_id = ?", Some(user_id.clone())),
        Scope::SharedWith(user_id) => (
            "AND EXISTS (SELECT 1 FROM json_each(documents.shared_with_json) WHERE json_each.value = ?)",
            Some(user_id.clone()),
        ),
        Scope::Unscoped => ("", None),
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn find_by_scope(
        &self,
        collection: &str,
        scope: &Scope,
        limit: usize,
    ) -> Result<Vec<CandidateRecord>, StoreError> {
        let (clause, scope_value) = scope_clause(scope);
        let sql = format!(
            "SELECT id, data_json FROM documents WHERE collection = ? {clause} ORDER BY updated_at DESC, id ASC LIMIT ?"
        );
        let mut args = vec![SqlValue::Text(collection.to_string())];
        args.extend(scope_value.map(SqlValue::Text));
        args.push(SqlValue::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));

        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(args), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;

            let mut records = Vec::new();
            for row in rows {
                let (id, data_json) = row?;
                match serde_json::from_str::<Value>(&data_json) {
                    Ok(data) => records.push(CandidateRecord::new(id, data)),
                    Err(source) => {
                        let err = StoreError::Decode { id, source };
                        warn!("Skipping stored record: {err}");
                    }
                }
            }
            Ok(records)
        })
        .await
    }

    async fn company_of(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt =
                conn.prepare("SELECT company, data_json FROM documents WHERE collection = ?1 AND id = ?2")?;
            let mut rows = stmt.query(params![USERS_COLLECTION, user_id])?;
            let Some(row) = rows.next()? else {
                return Ok(None);
            };
            let company: Option<String> = row.get(0)?;
            let data_json: String = row.get(1)?;
            let data: Value = serde_json::from_str(&data_json).map_err(|source| {
                StoreError::Decode {
                    id: user_id.clone(),
                    source,
                }
            })?;
            Ok(data
                .get("companyName")
                .and_then(Value::as_str)
                .map(ToString::to_string)
                .or(company)
                .filter(|name| !name.trim().is_empty()))
        })
        .await
    }
}
