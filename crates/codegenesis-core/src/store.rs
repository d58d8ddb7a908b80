//! Persistence collaborator: owner-scoped CRUD over named record collections.
//!
//! The gateway never talks to a database directly: it builds a [`Query`] and
//! hands it to a [`RecordStore`]. Production uses the PostgREST-backed store
//! in `codegenesis-providers`; tests and local runs use [`MemoryStore`].

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{CodeGenesisError, Result};

/// Named record collections (tables).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Projects,
    ProjectFiles,
    ProjectChats,
    ChatMessages,
    AgentConversations,
    AgentMessages,
    Profiles,
    EncryptedApiKeys,
    ModelPreferences,
}

impl Collection {
    pub fn table(&self) -> &'static str {
        match self {
            Collection::Projects => "projects",
            Collection::ProjectFiles => "project_files",
            Collection::ProjectChats => "project_chats",
            Collection::ChatMessages => "chat_messages",
            Collection::AgentConversations => "agent_conversations",
            Collection::AgentMessages => "agent_messages",
            Collection::Profiles => "profiles",
            Collection::EncryptedApiKeys => "encrypted_api_keys",
            Collection::ModelPreferences => "model_preferences",
        }
    }

    /// Whether the backing table generates a UUID `id` on insert.
    fn generates_id(&self) -> bool {
        !matches!(self, Collection::Profiles | Collection::ModelPreferences)
    }

    /// Whether the backing table defaults `created_at` on insert.
    fn stamps_created_at(&self) -> bool {
        !matches!(
            self,
            Collection::Profiles | Collection::ModelPreferences | Collection::ProjectFiles
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Lt,
}

#[derive(Debug, Clone)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: Value,
}

#[derive(Debug, Clone)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// Row filter + ordering, modelled on PostgREST query parameters.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            column: column.to_string(),
            op: FilterOp::Eq,
            value: value.into(),
        });
        self
    }

    pub fn lt(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            column: column.to_string(),
            op: FilterOp::Lt,
            value: value.into(),
        });
        self
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some(Order {
            column: column.to_string(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Evaluate the filters against one record.
    pub fn matches(&self, record: &Value) -> bool {
        self.filters.iter().all(|f| {
            let Some(field) = record.get(&f.column) else {
                return false;
            };
            match f.op {
                FilterOp::Eq => compare_values(field, &f.value) == Some(Ordering::Equal),
                FilterOp::Lt => compare_values(field, &f.value) == Some(Ordering::Less),
            }
        })
    }
}

/// Compare two JSON scalars: timestamps chronologically, numbers numerically,
/// everything else by string/bool equality.
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => {
            match (x.parse::<DateTime<Utc>>(), y.parse::<DateTime<Utc>>()) {
                (Ok(dx), Ok(dy)) => Some(dx.cmp(&dy)),
                _ => Some(x.cmp(y)),
            }
        }
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// Remote-CRUD contract of the persistence collaborator.
///
/// Every operation is scoped by the filters in the [`Query`]; callers are
/// responsible for including the ownership column.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn select(&self, collection: Collection, query: &Query) -> Result<Vec<Value>>;

    async fn select_one(&self, collection: Collection, query: &Query) -> Result<Option<Value>> {
        let q = query.clone().limit(1);
        Ok(self.select(collection, &q).await?.into_iter().next())
    }

    /// Insert one record and return it as stored.
    async fn insert(&self, collection: Collection, record: Value) -> Result<Value>;

    /// Merge `patch` into every matching record; returns the updated records.
    async fn update(
        &self,
        collection: Collection,
        query: &Query,
        patch: Value,
    ) -> Result<Vec<Value>>;

    /// Insert, or merge into the record whose `on_conflict` columns match.
    async fn upsert(
        &self,
        collection: Collection,
        record: Value,
        on_conflict: &[&str],
    ) -> Result<Value>;

    /// Delete matching records; returns how many were removed.
    async fn delete(&self, collection: Collection, query: &Query) -> Result<u64>;

    async fn count(&self, collection: Collection, query: &Query) -> Result<u64> {
        Ok(self.select(collection, query).await?.len() as u64)
    }
}

/// Decode a stored record into a typed value.
pub fn decode<T: DeserializeOwned>(record: Value) -> Result<T> {
    serde_json::from_value(record).map_err(CodeGenesisError::from)
}

pub fn decode_all<T: DeserializeOwned>(records: Vec<Value>) -> Result<Vec<T>> {
    records.into_iter().map(decode).collect()
}

fn as_object(record: Value) -> Result<Map<String, Value>> {
    match record {
        Value::Object(map) => Ok(map),
        other => Err(CodeGenesisError::InvalidInput(format!(
            "record must be a JSON object, got {other}"
        ))),
    }
}

/// Primary keys are unique, as in the backing database (SQLSTATE 23505).
fn ensure_unique_id(
    collection: Collection,
    rows: &[Map<String, Value>],
    row: &Map<String, Value>,
) -> Result<()> {
    let Some(id) = row.get("id") else {
        return Ok(());
    };
    if rows.iter().any(|r| r.get("id") == Some(id)) {
        return Err(CodeGenesisError::store(
            "23505",
            format!(
                "duplicate key value violates unique constraint \"{}_pkey\"",
                collection.table()
            ),
        ));
    }
    Ok(())
}

/// In-process record store used for tests and local development.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<Collection, Vec<Map<String, Value>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn fill_defaults(collection: Collection, row: &mut Map<String, Value>) {
        if collection.generates_id() && !row.contains_key("id") {
            row.insert("id".into(), Value::String(uuid::Uuid::new_v4().to_string()));
        }
        if collection.stamps_created_at() && !row.contains_key("created_at") {
            row.insert("created_at".into(), Value::String(Utc::now().to_rfc3339()));
        }
        if collection == Collection::Projects && !row.contains_key("updated_at") {
            row.insert("updated_at".into(), Value::String(Utc::now().to_rfc3339()));
        }
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn select(&self, collection: Collection, query: &Query) -> Result<Vec<Value>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Value> = tables
            .get(&collection)
            .map(|rows| {
                rows.iter()
                    .map(|r| Value::Object(r.clone()))
                    .filter(|r| query.matches(r))
                    .collect()
            })
            .unwrap_or_default();

        if let Some(order) = &query.order {
            rows.sort_by(|a, b| {
                let ord = match (a.get(&order.column), b.get(&order.column)) {
                    (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                };
                if order.ascending { ord } else { ord.reverse() }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn insert(&self, collection: Collection, record: Value) -> Result<Value> {
        let mut row = as_object(record)?;
        Self::fill_defaults(collection, &mut row);
        let mut tables = self.tables.write().await;
        let rows = tables.entry(collection).or_default();
        ensure_unique_id(collection, rows, &row)?;
        let stored = Value::Object(row.clone());
        rows.push(row);
        debug!(table = collection.table(), "Inserted record");
        Ok(stored)
    }

    async fn update(
        &self,
        collection: Collection,
        query: &Query,
        patch: Value,
    ) -> Result<Vec<Value>> {
        let patch = as_object(patch)?;
        let mut tables = self.tables.write().await;
        let mut updated = Vec::new();
        if let Some(rows) = tables.get_mut(&collection) {
            for row in rows.iter_mut() {
                if query.matches(&Value::Object(row.clone())) {
                    for (k, v) in &patch {
                        row.insert(k.clone(), v.clone());
                    }
                    updated.push(Value::Object(row.clone()));
                }
            }
        }
        Ok(updated)
    }

    async fn upsert(
        &self,
        collection: Collection,
        record: Value,
        on_conflict: &[&str],
    ) -> Result<Value> {
        let incoming = as_object(record)?;
        let mut key = Query::new();
        for column in on_conflict {
            let value = incoming.get(*column).cloned().ok_or_else(|| {
                CodeGenesisError::InvalidInput(format!("upsert missing conflict column '{column}'"))
            })?;
            key = key.eq(column, value);
        }

        let mut tables = self.tables.write().await;
        let rows = tables.entry(collection).or_default();
        if let Some(row) = rows
            .iter_mut()
            .find(|r| key.matches(&Value::Object((*r).clone())))
        {
            for (k, v) in incoming {
                row.insert(k, v);
            }
            return Ok(Value::Object(row.clone()));
        }

        let mut row = incoming;
        Self::fill_defaults(collection, &mut row);
        ensure_unique_id(collection, rows, &row)?;
        rows.push(row.clone());
        Ok(Value::Object(row))
    }

    async fn delete(&self, collection: Collection, query: &Query) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let Some(rows) = tables.get_mut(&collection) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|r| !query.matches(&Value::Object(r.clone())));
        let removed = (before - rows.len()) as u64;
        debug!(table = collection.table(), removed, "Deleted records");
        Ok(removed)
    }
}
