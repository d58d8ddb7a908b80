//! PostgREST-backed [`RecordStore`] (Supabase).

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde_json::Value;
use tracing::{debug, warn};

use codegenesis_core::config::SupabaseConfig;
use codegenesis_core::error::{CodeGenesisError, Result};
use codegenesis_core::store::{Collection, FilterOp, Query, RecordStore};

pub struct SupabaseStore {
    base_url: String,
    service_key: String,
    client: reqwest::Client,
}

impl SupabaseStore {
    pub fn new(base_url: &str, service_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &SupabaseConfig) -> Result<Self> {
        let key = config.resolve_service_key().ok_or_else(|| {
            CodeGenesisError::Config("supabase.service_key is not configured".into())
        })?;
        Ok(Self::new(&config.url, key))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/rest/v1/{path}", self.base_url))
            .header("apikey", &self.service_key)
            .header("authorization", format!("Bearer {}", self.service_key))
    }

    fn table(&self, method: Method, collection: Collection, query: &Query) -> RequestBuilder {
        self.request(method, collection.table())
            .query(&query_params(query))
    }
}

/// Render a [`Query`] as PostgREST query parameters.
pub fn query_params(query: &Query) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = query
        .filters
        .iter()
        .map(|f| {
            let op = match f.op {
                FilterOp::Eq => "eq",
                FilterOp::Lt => "lt",
            };
            (f.column.clone(), format!("{op}.{}", scalar(&f.value)))
        })
        .collect();
    if let Some(order) = &query.order {
        let dir = if order.ascending { "asc" } else { "desc" };
        params.push(("order".into(), format!("{}.{dir}", order.column)));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".into(), limit.to_string()));
    }
    params
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".into(),
        other => other.to_string(),
    }
}

/// Total row count from a `Content-Range: 0-24/3573` (or `*/0`) header.
pub fn parse_content_range(header: &str) -> Option<u64> {
    header.rsplit_once('/')?.1.trim().parse().ok()
}

fn transport_error(e: reqwest::Error) -> CodeGenesisError {
    CodeGenesisError::store("transport", e.to_string())
}

/// Map a non-success PostgREST response to `Store { code, message }`.
async fn check(response: Response) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let err = store_error(status.as_u16(), &body);
    warn!(%status, error = %err, "PostgREST request failed");
    Err(err)
}

pub fn store_error(status: u16, body: &str) -> CodeGenesisError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let field = |name: &str| {
        parsed
            .as_ref()
            .and_then(|v| v.get(name))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    CodeGenesisError::store(
        field("code").unwrap_or_else(|| status.to_string()),
        field("message").unwrap_or_else(|| body.to_string()),
    )
}

async fn rows(response: Response) -> Result<Vec<Value>> {
    let response = check(response).await?;
    let value: Value = response.json().await.map_err(transport_error)?;
    Ok(match value {
        Value::Array(rows) => rows,
        Value::Null => Vec::new(),
        other => vec![other],
    })
}

fn first(rows: Vec<Value>, collection: Collection) -> Result<Value> {
    rows.into_iter().next().ok_or_else(|| {
        CodeGenesisError::store("empty", format!("{} returned no row", collection.table()))
    })
}

#[async_trait]
impl RecordStore for SupabaseStore {
    async fn select(&self, collection: Collection, query: &Query) -> Result<Vec<Value>> {
        debug!(table = collection.table(), filters = query.filters.len(), "PostgREST select");
        let response = self
            .table(Method::GET, collection, query)
            .query(&[("select", "*")])
            .send()
            .await
            .map_err(transport_error)?;
        rows(response).await
    }

    async fn insert(&self, collection: Collection, record: Value) -> Result<Value> {
        let response = self
            .request(Method::POST, collection.table())
            .header("prefer", "return=representation")
            .json(&record)
            .send()
            .await
            .map_err(transport_error)?;
        first(rows(response).await?, collection)
    }

    async fn update(
        &self,
        collection: Collection,
        query: &Query,
        patch: Value,
    ) -> Result<Vec<Value>> {
        let response = self
            .table(Method::PATCH, collection, query)
            .header("prefer", "return=representation")
            .json(&patch)
            .send()
            .await
            .map_err(transport_error)?;
        rows(response).await
    }

    async fn upsert(
        &self,
        collection: Collection,
        record: Value,
        on_conflict: &[&str],
    ) -> Result<Value> {
        let response = self
            .request(Method::POST, collection.table())
            .query(&[("on_conflict", on_conflict.join(","))])
            .header("prefer", "resolution=merge-duplicates,return=representation")
            .json(&record)
            .send()
            .await
            .map_err(transport_error)?;
        first(rows(response).await?, collection)
    }

    async fn delete(&self, collection: Collection, query: &Query) -> Result<u64> {
        let response = self
            .table(Method::DELETE, collection, query)
            .header("prefer", "return=representation")
            .send()
            .await
            .map_err(transport_error)?;
        Ok(rows(response).await?.len() as u64)
    }

    async fn count(&self, collection: Collection, query: &Query) -> Result<u64> {
        let response = self
            .table(Method::HEAD, collection, query)
            .header("prefer", "count=exact")
            .send()
            .await
            .map_err(transport_error)?;
        let response = check(response).await?;
        response
            .headers()
            .get("content-range")
            .and_then(|h| h.to_str().ok())
            .and_then(parse_content_range)
            .ok_or_else(|| CodeGenesisError::store("count", "missing Content-Range header"))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::extract::{Path, Query as AxumQuery};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;

    use super::*;

    #[test]
    fn test_query_params() {
        let q = Query::new()
            .eq("user_id", "u1")
            .eq("is_archived", false)
            .lt("expires_at", "2024-01-01T00:00:00Z")
            .order("created_at", false)
            .limit(10);
        assert_eq!(
            query_params(&q),
            vec![
                ("user_id".to_string(), "eq.u1".to_string()),
                ("is_archived".to_string(), "eq.false".to_string()),
                ("expires_at".to_string(), "lt.2024-01-01T00:00:00Z".to_string()),
                ("order".to_string(), "created_at.desc".to_string()),
                ("limit".to_string(), "10".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_content_range() {
        assert_eq!(parse_content_range("0-24/3573"), Some(3573));
        assert_eq!(parse_content_range("*/0"), Some(0));
        assert_eq!(parse_content_range("garbage"), None);
    }

    #[test]
    fn test_store_error_mapping() {
        let err = store_error(409, r#"{"code":"23505","message":"duplicate key"}"#);
        match err {
            CodeGenesisError::Store { code, message } => {
                assert_eq!(code, "23505");
                assert_eq!(message, "duplicate key");
            }
            other => panic!("unexpected {other:?}"),
        }
        match store_error(502, "bad gateway") {
            CodeGenesisError::Store { code, message } => {
                assert_eq!(code, "502");
                assert_eq!(message, "bad gateway");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_from_config_requires_key() {
        let cfg = SupabaseConfig {
            url: "https://x.supabase.co/".into(),
            service_key: None,
            service_key_env: None,
        };
        assert!(SupabaseStore::from_config(&cfg).is_err());

        let cfg = SupabaseConfig {
            service_key: Some("k".into()),
            ..cfg
        };
        let store = SupabaseStore::from_config(&cfg).unwrap();
        assert_eq!(store.base_url(), "https://x.supabase.co");
    }

    async fn fake_postgrest(
        Path(table): Path<String>,
        AxumQuery(params): AxumQuery<HashMap<String, String>>,
        headers: HeaderMap,
    ) -> (StatusCode, Json<Value>) {
        if headers.get("apikey").and_then(|v| v.to_str().ok()) != Some("service") {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({"code": "PGRST301", "message": "bad key"})),
            );
        }
        (
            StatusCode::OK,
            Json(json!([{"table": table, "user_id": params.get("user_id")}])),
        )
    }

    #[tokio::test]
    async fn test_select_against_fake_postgrest() {
        let app = Router::new().route("/rest/v1/{table}", get(fake_postgrest));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let store = SupabaseStore::new(&format!("http://{addr}"), "service");
        let rows = store
            .select(Collection::Projects, &Query::new().eq("user_id", "u1"))
            .await
            .unwrap();
        assert_eq!(rows, vec![json!({"table": "projects", "user_id": "eq.u1"})]);

        let bad = SupabaseStore::new(&format!("http://{addr}"), "wrong");
        let err = bad
            .select(Collection::Projects, &Query::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CodeGenesisError::Store { ref code, .. } if code == "PGRST301"));
    }
}
