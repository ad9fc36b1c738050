//! Backing-store boundary: row lookups against the managed database service.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Map, Value};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row as SqlRow;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info_span, Instrument};

pub const CRATE_NAME: &str = "wfm-storage";

/// One backend row as a JSON object keyed by column name.
pub type Row = Map<String, Value>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid identifier {0:?}")]
    InvalidIdentifier(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("could not decode backend row: {0}")]
    Decode(String),
    #[error("store is shut down")]
    Closed,
}

/// Point and fuzzy row queries against named tables.
#[async_trait]
pub trait RowStore: Send + Sync {
    fn backend(&self) -> &'static str;

    /// First row whose `column` equals `value`, compared as text.
    async fn find_one(&self, table: &str, column: &str, value: &str)
        -> Result<Option<Row>, StoreError>;

    /// Rows whose `column` contains `needle`, case-insensitively, capped at `limit`.
    async fn find_like(
        &self,
        table: &str,
        column: &str,
        needle: &str,
        limit: usize,
    ) -> Result<Vec<Row>, StoreError>;
}

/// Table and column names are interpolated into queries, so only plain identifiers pass.
pub fn validate_identifier(ident: &str) -> Result<&str, StoreError> {
    let mut chars = ident.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(ident)
    } else {
        Err(StoreError::InvalidIdentifier(ident.to_string()))
    }
}

pub fn escape_like(needle: &str) -> String {
    let mut out = String::with_capacity(needle.len());
    for ch in needle.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// `%needle%` with LIKE metacharacters escaped.
pub fn like_pattern(needle: &str) -> String {
    format!("%{}%", escape_like(needle))
}

fn value_to_row(value: Value) -> Result<Row, StoreError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Decode(format!("expected object, got {other}"))),
    }
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[derive(Debug, Clone)]
pub struct PgRowStore {
    pool: PgPool,
}

impl PgRowStore {
    /// Builds the pool without opening a connection; the first query connects.
    pub fn connect_lazy(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_lazy(database_url)?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl RowStore for PgRowStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn find_one(
        &self,
        table: &str,
        column: &str,
        value: &str,
    ) -> Result<Option<Row>, StoreError> {
        let sql = format!(
            "SELECT row_to_json(t)::jsonb AS row FROM {} t WHERE t.{}::text = $1 LIMIT 1",
            validate_identifier(table)?,
            validate_identifier(column)?
        );
        debug!(table, column, value, "postgres point query");
        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let json: Value = row.try_get("row")?;
                value_to_row(json).map(Some)
            }
            None => Ok(None),
        }
    }

    async fn find_like(
        &self,
        table: &str,
        column: &str,
        needle: &str,
        limit: usize,
    ) -> Result<Vec<Row>, StoreError> {
        let sql = format!(
            "SELECT row_to_json(t)::jsonb AS row FROM {} t WHERE t.{}::text ILIKE $1 LIMIT $2",
            validate_identifier(table)?,
            validate_identifier(column)?
        );
        debug!(table, column, needle, limit, "postgres fuzzy query");
        let rows = sqlx::query(&sql)
            .bind(like_pattern(needle))
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let json: Value = row.try_get("row")?;
            out.push(value_to_row(json)?);
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt_index as u32).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        delay.min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct RestStoreConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub max_concurrency: usize,
    pub backoff: BackoffPolicy,
}

impl RestStoreConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            timeout: Duration::from_secs(20),
            user_agent: None,
            max_concurrency: 8,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Row store over the managed service's PostgREST-style HTTP interface.
#[derive(Debug)]
pub struct RestRowStore {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    limit: Arc<Semaphore>,
    backoff: BackoffPolicy,
}

impl RestRowStore {
    pub fn new(config: RestStoreConfig) -> Result<Self, StoreError> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        Ok(Self {
            client: builder.build()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
            limit: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            backoff: config.backoff,
        })
    }

    pub fn table_url(&self, table: &str) -> Result<String, StoreError> {
        Ok(format!("{}/rest/v1/{}", self.base_url, validate_identifier(table)?))
    }

    fn request(&self, url: &str, params: &[(String, String)]) -> reqwest::RequestBuilder {
        let mut req = self.client.get(url).query(params);
        if let Some(key) = &self.api_key {
            req = req.header("apikey", key).bearer_auth(key);
        }
        req
    }

    async fn get_rows(
        &self,
        table: &str,
        params: Vec<(String, String)>,
    ) -> Result<Vec<Row>, StoreError> {
        let url = self.table_url(table)?;
        let _permit = self.limit.acquire().await.map_err(|_| StoreError::Closed)?;

        let span = info_span!("rest_query", table, url = %url);
        self.fetch_with_retry(&url, &params).instrument(span).await
    }

    async fn fetch_with_retry(
        &self,
        url: &str,
        params: &[(String, String)],
    ) -> Result<Vec<Row>, StoreError> {
        let mut attempt = 0;
        loop {
            match self.request(url, params).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let body: Value = resp.json().await?;
                        return match body {
                            Value::Array(items) => items.into_iter().map(value_to_row).collect(),
                            other => Err(StoreError::Decode(format!(
                                "expected array of rows, got {other}"
                            ))),
                        };
                    }
                    if classify_status(status) == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(StoreError::HttpStatus {
                        status: status.as_u16(),
                        url: resp.url().to_string(),
                    });
                }
                Err(err) => {
                    if classify_reqwest_error(&err) == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(StoreError::Request(err));
                }
            }
        }
    }
}

/// PostgREST `ilike` filter value. `*` is its wildcard; `%` and `_` are
/// escaped so the needle matches literally, as it does in `like_pattern`.
pub fn rest_ilike_filter(needle: &str) -> String {
    format!("ilike.*{}*", escape_like(&needle.replace('*', "")))
}

#[async_trait]
impl RowStore for RestRowStore {
    fn backend(&self) -> &'static str {
        "rest"
    }

    async fn find_one(
        &self,
        table: &str,
        column: &str,
        value: &str,
    ) -> Result<Option<Row>, StoreError> {
        let column = validate_identifier(column)?;
        let params = vec![
            ("select".to_string(), "*".to_string()),
            (column.to_string(), format!("eq.{value}")),
            ("limit".to_string(), "1".to_string()),
        ];
        Ok(self.get_rows(table, params).await?.into_iter().next())
    }

    async fn find_like(
        &self,
        table: &str,
        column: &str,
        needle: &str,
        limit: usize,
    ) -> Result<Vec<Row>, StoreError> {
        let column = validate_identifier(column)?;
        let params = vec![
            ("select".to_string(), "*".to_string()),
            (column.to_string(), rest_ilike_filter(needle)),
            ("limit".to_string(), limit.to_string()),
        ];
        self.get_rows(table, params).await
    }
}

/// Tables of rows held in memory; local development and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryRowStore {
    tables: HashMap<String, Vec<Row>>,
}

impl MemoryRowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: &str, rows: Vec<Value>) -> Result<Self, StoreError> {
        let rows = rows
            .into_iter()
            .map(value_to_row)
            .collect::<Result<Vec<_>, _>>()?;
        self.tables.insert(validate_identifier(table)?.to_string(), rows);
        Ok(self)
    }
}

#[async_trait]
impl RowStore for MemoryRowStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn find_one(
        &self,
        table: &str,
        column: &str,
        value: &str,
    ) -> Result<Option<Row>, StoreError> {
        let Some(rows) = self.tables.get(validate_identifier(table)?) else {
            return Ok(None);
        };
        Ok(rows
            .iter()
            .find(|row| row.get(column).and_then(value_as_text).as_deref() == Some(value))
            .cloned())
    }

    async fn find_like(
        &self,
        table: &str,
        column: &str,
        needle: &str,
        limit: usize,
    ) -> Result<Vec<Row>, StoreError> {
        let Some(rows) = self.tables.get(validate_identifier(table)?) else {
            return Ok(Vec::new());
        };
        let needle = needle.to_lowercase();
        Ok(rows
            .iter()
            .filter(|row| {
                row.get(column)
                    .and_then(value_as_text)
                    .is_some_and(|text| text.to_lowercase().contains(&needle))
            })
            .take(limit)
            .cloned()
            .collect())
    }
}
