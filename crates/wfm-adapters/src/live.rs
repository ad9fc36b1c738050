//! Provider backed by the managed database service.
//!
//! Backend tables do not mirror the legacy list columns, so rows are mapped
//! here column by column, with defaults for columns the backend lacks. Sites
//! and relocations have no backing table yet and always come back empty.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};
use wfm_core::{
    Client, ClientStatus, LocalId, Order, OrderStatus, RecordMeta, Relocation, Replacement,
    ReplacementReason, ReplacementStatus, Site, Worker, WorkerStatus,
};
use wfm_storage::{Row, RowStore};

use crate::mapper::parse_date_lenient;
use crate::DataProvider;

/// Maximum rows a live search returns.
pub const LIVE_SEARCH_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    pub table: &'static str,
    pub key_column: &'static str,
    pub search_column: &'static str,
}

pub const CLIENTS_TABLE: TableSpec = TableSpec {
    table: "clients",
    key_column: "sp_id",
    search_column: "name",
};

pub const WORKERS_TABLE: TableSpec = TableSpec {
    table: "members",
    key_column: "sp_id",
    search_column: "full_name",
};

pub const ORDERS_TABLE: TableSpec = TableSpec {
    table: "orders",
    key_column: "sp_id",
    search_column: "code",
};

pub const REPLACEMENTS_TABLE: TableSpec = TableSpec {
    table: "replacements",
    key_column: "sp_id",
    search_column: "code",
};

fn row_value<'a>(row: &'a Row, keys: &[&str]) -> Option<&'a JsonValue> {
    keys.iter()
        .filter_map(|key| row.get(*key))
        .find(|value| !value.is_null())
}

fn row_str(row: &Row, keys: &[&str]) -> Option<String> {
    match row_value(row, keys)? {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn row_i64(row: &Row, keys: &[&str]) -> Option<i64> {
    match row_value(row, keys)? {
        JsonValue::Number(n) => n.as_i64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn row_date(row: &Row, keys: &[&str]) -> Option<NaiveDate> {
    row_str(row, keys).as_deref().and_then(parse_date_lenient)
}

fn row_timestamp(row: &Row, keys: &[&str]) -> Option<DateTime<Utc>> {
    let text = row_str(row, keys)?;
    DateTime::parse_from_rfc3339(&text)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// `None` when the row carries no usable external id. Rows without a stored
/// local id get one derived from `table` and the external id.
fn row_meta(row: &Row, table: &str) -> Option<RecordMeta> {
    let sp_id = row_i64(row, &["sp_id"])?;
    Some(RecordMeta {
        id: row_str(row, &["local_id", "id"])
            .as_deref()
            .and_then(LocalId::parse)
            .unwrap_or_else(|| LocalId::derived(table, sp_id)),
        sp_id,
        sp_created: row_timestamp(row, &["created_at", "sp_created"]),
        sp_modified: row_timestamp(row, &["updated_at", "sp_modified"]),
    })
}

pub fn client_from_row(row: &Row) -> Option<Client> {
    Some(Client {
        meta: row_meta(row, CLIENTS_TABLE.table)?,
        name: row_str(row, &["name"]).unwrap_or_default(),
        company: row_str(row, &["company", "group_name"]).unwrap_or_default(),
        industry: row_str(row, &["industry"]).unwrap_or_default(),
        // most deployments have no status column
        status: row_str(row, &["status"])
            .as_deref()
            .and_then(ClientStatus::parse_label)
            .unwrap_or(ClientStatus::Active),
        tax_id: row_str(row, &["tax_id", "cif"]),
        email: row_str(row, &["email"]),
        phone: row_str(row, &["phone"]),
    })
}

pub fn worker_from_row(row: &Row) -> Option<Worker> {
    Some(Worker {
        meta: row_meta(row, WORKERS_TABLE.table)?,
        name: row_str(row, &["full_name", "name"]).unwrap_or_default(),
        document_number: row_str(row, &["document_number", "dni"]).unwrap_or_default(),
        nationality: row_str(row, &["nationality"]),
        category: row_str(row, &["position", "category"]),
        status: WorkerStatus::Available,
        email: row_str(row, &["email"]),
        phone: row_str(row, &["phone"]),
    })
}

pub fn order_from_row(row: &Row) -> Option<Order> {
    Some(Order {
        meta: row_meta(row, ORDERS_TABLE.table)?,
        code: row_str(row, &["code"]).unwrap_or_default(),
        client_sp_id: row_i64(row, &["client_sp_id"]),
        site_sp_id: row_i64(row, &["site_sp_id"]),
        start_date: row_date(row, &["start_date"]),
        estimated_end_date: row_date(row, &["end_date", "estimated_end_date"]),
        status: OrderStatus::Open,
        salesperson_email: row_str(row, &["salesperson_email"]),
    })
}

pub fn replacement_from_row(row: &Row) -> Option<Replacement> {
    Some(Replacement {
        meta: row_meta(row, REPLACEMENTS_TABLE.table)?,
        code: row_str(row, &["code"]).unwrap_or_default(),
        client_sp_id: row_i64(row, &["client_sp_id"]),
        order_sp_id: row_i64(row, &["order_sp_id"]),
        worker_out_sp_id: row_i64(row, &["worker_out_sp_id"]),
        worker_in_sp_id: row_i64(row, &["worker_in_sp_id"]),
        reason: row_str(row, &["reason"])
            .as_deref()
            .and_then(ReplacementReason::parse_label)
            .unwrap_or_default(),
        request_date: row_date(row, &["request_date"]),
        status: row_str(row, &["status"])
            .as_deref()
            .and_then(ReplacementStatus::parse_label)
            .unwrap_or_default(),
    })
}

pub struct LiveProvider {
    store: Arc<dyn RowStore>,
}

impl LiveProvider {
    pub fn new(store: Arc<dyn RowStore>) -> Self {
        Self { store }
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    async fn lookup<T>(
        &self,
        spec: TableSpec,
        sp_id: i64,
        map: fn(&Row) -> Option<T>,
    ) -> Option<T> {
        match self
            .store
            .find_one(spec.table, spec.key_column, &sp_id.to_string())
            .await
        {
            Ok(Some(row)) => {
                let mapped = map(&row);
                if mapped.is_none() {
                    warn!(table = spec.table, sp_id, "backend row has no usable sp_id");
                }
                mapped
            }
            Ok(None) => {
                debug!(table = spec.table, sp_id, "no backend row");
                None
            }
            Err(err) => {
                warn!(table = spec.table, sp_id, error = %err, "backend lookup failed; treating as not found");
                None
            }
        }
    }

    async fn search<T>(&self, spec: TableSpec, query: &str, map: fn(&Row) -> Option<T>) -> Vec<T> {
        match self
            .store
            .find_like(spec.table, spec.search_column, query.trim(), LIVE_SEARCH_LIMIT)
            .await
        {
            Ok(rows) => rows.iter().filter_map(map).collect(),
            Err(err) => {
                warn!(table = spec.table, query, error = %err, "backend search failed; returning no rows");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl DataProvider for LiveProvider {
    fn name(&self) -> &'static str {
        "live"
    }

    async fn get_client(&self, sp_id: i64) -> Option<Client> {
        self.lookup(CLIENTS_TABLE, sp_id, client_from_row).await
    }

    async fn search_clients(&self, query: &str) -> Vec<Client> {
        self.search(CLIENTS_TABLE, query, client_from_row).await
    }

    async fn get_worker(&self, sp_id: i64) -> Option<Worker> {
        self.lookup(WORKERS_TABLE, sp_id, worker_from_row).await
    }

    async fn search_workers(&self, query: &str) -> Vec<Worker> {
        self.search(WORKERS_TABLE, query, worker_from_row).await
    }

    async fn get_site(&self, sp_id: i64) -> Option<Site> {
        debug!(sp_id, "sites have no backing table");
        None
    }

    async fn search_sites(&self, _query: &str) -> Vec<Site> {
        Vec::new()
    }

    async fn get_order(&self, sp_id: i64) -> Option<Order> {
        self.lookup(ORDERS_TABLE, sp_id, order_from_row).await
    }

    async fn search_orders(&self, query: &str) -> Vec<Order> {
        self.search(ORDERS_TABLE, query, order_from_row).await
    }

    async fn get_replacement(&self, sp_id: i64) -> Option<Replacement> {
        self.lookup(REPLACEMENTS_TABLE, sp_id, replacement_from_row).await
    }

    async fn search_replacements(&self, query: &str) -> Vec<Replacement> {
        self.search(REPLACEMENTS_TABLE, query, replacement_from_row).await
    }

    async fn get_relocation(&self, sp_id: i64) -> Option<Relocation> {
        debug!(sp_id, "relocations have no backing table");
        None
    }

    async fn search_relocations(&self, _query: &str) -> Vec<Relocation> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wfm_storage::{MemoryRowStore, StoreError};

    fn store() -> MemoryRowStore {
        MemoryRowStore::new()
            .with_table(
                "clients",
                vec![
                    json!({"sp_id": 10, "name": "Stocco", "company": "Kotrik Rosas", "email": "obras@stocco.example"}),
                    json!({"sp_id": 20, "name": "Wiseowe", "company": "Grupo Wiseowe", "status": "Inactivo"}),
                ],
            )
            .unwrap()
            .with_table(
                "members",
                vec![json!({
                    "sp_id": "103",
                    "local_id": "0b8f2d8e-55a1-4c43-a7a4-5f0c7f1c9a03",
                    "full_name": "Carla Nunez",
                    "dni": "Z1122334C",
                    "position": "Gruista",
                    "created_at": "2023-09-15T07:00:00Z"
                })],
            )
            .unwrap()
            .with_table(
                "orders",
                vec![json!({
                    "sp_id": 5001,
                    "code": "PED-NORTE-01",
                    "client_sp_id": 10,
                    "site_sp_id": 301,
                    "start_date": "2024-03-04",
                    "end_date": "2024-12-20T00:00:00+00:00"
                })],
            )
            .unwrap()
            .with_table(
                "replacements",
                vec![
                    json!({"sp_id": 7002, "code": "REE-NORTE-02", "client_sp_id": 10, "order_sp_id": 5001,
                           "worker_out_sp_id": 103, "worker_in_sp_id": null, "reason": "Baja Médica",
                           "request_date": "2024-07-22", "status": "Pendiente"}),
                    json!({"code": "REE-ORPHAN"}),
                ],
            )
            .unwrap()
    }

    fn provider() -> LiveProvider {
        LiveProvider::new(Arc::new(store()))
    }

    /// Fails every query and counts how often it was asked.
    #[derive(Default)]
    struct FailingStore {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RowStore for FailingStore {
        fn backend(&self) -> &'static str {
            "failing"
        }

        async fn find_one(
            &self,
            _table: &str,
            _column: &str,
            _value: &str,
        ) -> Result<Option<Row>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::HttpStatus {
                status: 503,
                url: "http://backend.test".into(),
            })
        }

        async fn find_like(
            &self,
            _table: &str,
            _column: &str,
            _needle: &str,
            _limit: usize,
        ) -> Result<Vec<Row>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Decode("boom".into()))
        }
    }

    #[tokio::test]
    async fn point_lookups_map_backend_columns() {
        let p = provider();
        let client = p.get_client(10).await.unwrap();
        assert_eq!(client.meta.sp_id, 10);
        assert_eq!(client.company, "Kotrik Rosas");
        assert_eq!(client.status, ClientStatus::Active);
        assert_eq!(p.get_client(20).await.unwrap().status, ClientStatus::Inactive);

        let worker = p.get_worker(103).await.unwrap();
        assert_eq!(worker.name, "Carla Nunez");
        assert_eq!(worker.document_number, "Z1122334C");
        assert_eq!(worker.category.as_deref(), Some("Gruista"));
        assert_eq!(worker.status, WorkerStatus::Available);
        assert_eq!(worker.meta.id.to_string(), "0b8f2d8e-55a1-4c43-a7a4-5f0c7f1c9a03");
        assert!(worker.meta.sp_created.is_some());

        let order = p.get_order(5001).await.unwrap();
        assert_eq!(order.site_sp_id, Some(301));
        assert_eq!(order.estimated_end_date, NaiveDate::from_ymd_opt(2024, 12, 20));
        assert_eq!(order.status, OrderStatus::Open);

        let replacement = p.get_replacement(7002).await.unwrap();
        assert_eq!(replacement.worker_in_sp_id, None);
        assert_eq!(replacement.reason, ReplacementReason::MedicalLeave);
        assert_eq!(replacement.status, ReplacementStatus::Pending);
    }

    #[tokio::test]
    async fn rows_without_local_id_keep_the_same_id_across_lookups() {
        let p = provider();
        let first = p.get_client(10).await.unwrap().meta.id;
        assert_eq!(p.get_client(10).await.unwrap().meta.id, first);
        assert_eq!(p.search_clients("stocco").await[0].meta.id, first);
        assert_eq!(first, LocalId::derived("clients", 10));
        assert_ne!(p.get_client(20).await.unwrap().meta.id, first);
        assert_ne!(p.get_order(5001).await.unwrap().meta.id, LocalId::derived("clients", 5001));
    }

    #[tokio::test]
    async fn missing_rows_are_absent() {
        let p = provider();
        assert!(p.get_client(30).await.is_none());
        assert!(p.get_order(1).await.is_none());
    }

    #[tokio::test]
    async fn search_matches_one_column_and_skips_rows_without_key() {
        let p = provider();
        let clients = p.search_clients("stoc").await;
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].name, "Stocco");

        // company is not the live search column
        assert!(p.search_clients("kotrik").await.is_empty());

        let replacements = p.search_replacements("ree-").await;
        assert_eq!(replacements.len(), 1);
        assert_eq!(replacements[0].code, "REE-NORTE-02");
    }

    #[tokio::test]
    async fn sites_and_relocations_are_unsupported_and_never_hit_the_store() {
        let failing = Arc::new(FailingStore::default());
        let p = LiveProvider::new(failing.clone());
        assert!(p.get_site(301).await.is_none());
        assert!(p.search_sites("").await.is_empty());
        assert!(p.get_relocation(9001).await.is_none());
        assert!(p.search_relocations("tra").await.is_empty());
        assert_eq!(failing.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn backend_errors_collapse_to_absent_and_empty() {
        let failing = Arc::new(FailingStore::default());
        let p = LiveProvider::new(failing.clone());
        assert!(p.get_client(10).await.is_none());
        assert!(p.get_worker(103).await.is_none());
        assert!(p.search_orders("ped").await.is_empty());
        assert!(p.search_replacements("").await.is_empty());
        assert_eq!(failing.calls.load(Ordering::SeqCst), 4);
        assert_eq!(p.backend(), "failing");
    }
}
