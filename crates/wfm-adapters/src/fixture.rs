//! In-memory provider over legacy fixture rows with simulated latency.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::debug;
use wfm_core::{Client, LocalId, Order, Relocation, Replacement, Site, Worker};

use crate::mapper::{
    RawClientRow, RawOrderRow, RawRelocationRow, RawReplacementRow, RawRow, RawSiteRow,
    RawWorkerRow,
};
use crate::DataProvider;

const CLIENTS_JSON: &str = include_str!("../../../fixtures/clients.json");
const WORKERS_JSON: &str = include_str!("../../../fixtures/workers.json");
const SITES_JSON: &str = include_str!("../../../fixtures/sites.json");
const ORDERS_JSON: &str = include_str!("../../../fixtures/orders.json");
const REPLACEMENTS_JSON: &str = include_str!("../../../fixtures/replacements.json");
const RELOCATIONS_JSON: &str = include_str!("../../../fixtures/relocations.json");

/// Fields a free-text fixture search matches against.
pub trait Searchable {
    fn search_fields(&self) -> Vec<String>;
}

impl Searchable for RawClientRow {
    fn search_fields(&self) -> Vec<String> {
        [&self.title, &self.company].into_iter().flatten().cloned().collect()
    }
}

impl Searchable for RawWorkerRow {
    fn search_fields(&self) -> Vec<String> {
        [&self.full_name, &self.document_number]
            .into_iter()
            .flatten()
            .cloned()
            .collect()
    }
}

impl Searchable for RawSiteRow {
    fn search_fields(&self) -> Vec<String> {
        [&self.code, &self.title, &self.location]
            .into_iter()
            .flatten()
            .cloned()
            .collect()
    }
}

impl Searchable for RawOrderRow {
    fn search_fields(&self) -> Vec<String> {
        let mut fields = vec![self.sp_id.to_string()];
        fields.extend(self.code.clone());
        fields
    }
}

impl Searchable for RawReplacementRow {
    fn search_fields(&self) -> Vec<String> {
        let mut fields = vec![self.sp_id.to_string()];
        fields.extend(self.code.clone());
        fields
    }
}

impl Searchable for RawRelocationRow {
    fn search_fields(&self) -> Vec<String> {
        let mut fields = vec![self.sp_id.to_string()];
        fields.extend(self.code.clone());
        fields.extend(self.reason.clone());
        fields
    }
}

/// Legacy rows per entity type, in fixture order.
#[derive(Debug, Clone, Default)]
pub struct FixtureSet {
    pub clients: Vec<RawClientRow>,
    pub workers: Vec<RawWorkerRow>,
    pub sites: Vec<RawSiteRow>,
    pub orders: Vec<RawOrderRow>,
    pub replacements: Vec<RawReplacementRow>,
    pub relocations: Vec<RawRelocationRow>,
}

impl FixtureSet {
    /// Fixtures compiled into the crate from the workspace `fixtures/` directory.
    pub fn builtin() -> Result<Self> {
        let mut set = Self {
            clients: parse_rows(CLIENTS_JSON, "clients.json")?,
            workers: parse_rows(WORKERS_JSON, "workers.json")?,
            sites: parse_rows(SITES_JSON, "sites.json")?,
            orders: parse_rows(ORDERS_JSON, "orders.json")?,
            replacements: parse_rows(REPLACEMENTS_JSON, "replacements.json")?,
            relocations: parse_rows(RELOCATIONS_JSON, "relocations.json")?,
        };
        set.assign_local_ids();
        Ok(set)
    }

    /// Loads `clients.json`, `workers.json`, ... from `dir`.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut set = Self {
            clients: read_rows(&dir.join("clients.json"))?,
            workers: read_rows(&dir.join("workers.json"))?,
            sites: read_rows(&dir.join("sites.json"))?,
            orders: read_rows(&dir.join("orders.json"))?,
            replacements: read_rows(&dir.join("replacements.json"))?,
            relocations: read_rows(&dir.join("relocations.json"))?,
        };
        set.assign_local_ids();
        Ok(set)
    }

    /// Rows without a `LocalId` get one here, once, so repeated lookups agree.
    fn assign_local_ids(&mut self) {
        fn stamp<R: RawRow>(rows: &mut [R]) {
            for row in rows {
                row.local_id_mut().get_or_insert_with(LocalId::issue);
            }
        }
        stamp(&mut self.clients);
        stamp(&mut self.workers);
        stamp(&mut self.sites);
        stamp(&mut self.orders);
        stamp(&mut self.replacements);
        stamp(&mut self.relocations);
    }
}

fn parse_rows<R: RawRow>(text: &str, name: &str) -> Result<Vec<R>> {
    let values: Vec<JsonValue> =
        serde_json::from_str(text).with_context(|| format!("parsing {name}"))?;
    values
        .into_iter()
        .enumerate()
        .map(|(idx, value)| R::from_json(value).with_context(|| format!("{name} row {idx}")))
        .collect()
}

fn read_rows<R: RawRow>(path: &Path) -> Result<Vec<R>> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    parse_rows(&text, &path.display().to_string())
}

/// Simulated backend delay. Searches default to a longer pause than point lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyProfile {
    pub lookup: Duration,
    pub search: Duration,
}

impl Default for LatencyProfile {
    fn default() -> Self {
        Self {
            lookup: Duration::from_millis(100),
            search: Duration::from_millis(300),
        }
    }
}

impl LatencyProfile {
    pub fn none() -> Self {
        Self {
            lookup: Duration::ZERO,
            search: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FixtureProvider {
    fixtures: Arc<FixtureSet>,
    latency: LatencyProfile,
}

impl FixtureProvider {
    pub fn new(fixtures: FixtureSet) -> Self {
        Self {
            fixtures: Arc::new(fixtures),
            latency: LatencyProfile::default(),
        }
    }

    pub fn builtin() -> Result<Self> {
        Ok(Self::new(FixtureSet::builtin()?))
    }

    /// Same fixtures, different delays. Cheap enough to do per call.
    pub fn with_latency(&self, latency: LatencyProfile) -> Self {
        Self {
            fixtures: Arc::clone(&self.fixtures),
            latency,
        }
    }

    pub fn latency(&self) -> LatencyProfile {
        self.latency
    }

    async fn pause(delay: Duration) {
        if delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(delay).await;
        }
    }

    async fn lookup<R: RawRow>(&self, rows: &[R], sp_id: i64) -> Option<R::Entity> {
        Self::pause(self.latency.lookup).await;
        let found = rows.iter().find(|row| row.sp_id() == sp_id);
        debug!(kind = %R::KIND, sp_id, found = found.is_some(), "fixture lookup");
        found.map(RawRow::to_entity)
    }

    async fn search<R: RawRow + Searchable>(&self, rows: &[R], query: &str) -> Vec<R::Entity> {
        Self::pause(self.latency.search).await;
        let needle = query.trim().to_lowercase();
        let hits = rows
            .iter()
            .filter(|row| {
                needle.is_empty()
                    || row
                        .search_fields()
                        .iter()
                        .any(|field| field.to_lowercase().contains(&needle))
            })
            .map(RawRow::to_entity)
            .collect::<Vec<_>>();
        debug!(kind = %R::KIND, query, hits = hits.len(), "fixture search");
        hits
    }
}

#[async_trait]
impl DataProvider for FixtureProvider {
    fn name(&self) -> &'static str {
        "fixture"
    }

    async fn get_client(&self, sp_id: i64) -> Option<Client> {
        self.lookup(&self.fixtures.clients, sp_id).await
    }

    async fn search_clients(&self, query: &str) -> Vec<Client> {
        self.search(&self.fixtures.clients, query).await
    }

    async fn get_worker(&self, sp_id: i64) -> Option<Worker> {
        self.lookup(&self.fixtures.workers, sp_id).await
    }

    async fn search_workers(&self, query: &str) -> Vec<Worker> {
        self.search(&self.fixtures.workers, query).await
    }

    async fn get_site(&self, sp_id: i64) -> Option<Site> {
        self.lookup(&self.fixtures.sites, sp_id).await
    }

    async fn search_sites(&self, query: &str) -> Vec<Site> {
        self.search(&self.fixtures.sites, query).await
    }

    async fn get_order(&self, sp_id: i64) -> Option<Order> {
        self.lookup(&self.fixtures.orders, sp_id).await
    }

    async fn search_orders(&self, query: &str) -> Vec<Order> {
        self.search(&self.fixtures.orders, query).await
    }

    async fn get_replacement(&self, sp_id: i64) -> Option<Replacement> {
        self.lookup(&self.fixtures.replacements, sp_id).await
    }

    async fn search_replacements(&self, query: &str) -> Vec<Replacement> {
        self.search(&self.fixtures.replacements, query).await
    }

    async fn get_relocation(&self, sp_id: i64) -> Option<Relocation> {
        self.lookup(&self.fixtures.relocations, sp_id).await
    }

    async fn search_relocations(&self, query: &str) -> Vec<Relocation> {
        self.search(&self.fixtures.relocations, query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;
    use wfm_core::{ClientStatus, Entity, WorkerStatus};

    fn provider() -> FixtureProvider {
        FixtureProvider::builtin()
            .expect("builtin fixtures")
            .with_latency(LatencyProfile::none())
    }

    fn names<T: Entity>(items: &[T]) -> Vec<String> {
        items.iter().map(Entity::label).collect()
    }

    #[tokio::test]
    async fn client_search_matches_company_in_fixture_order() {
        let hits = provider().search_clients("kotrik").await;
        assert_eq!(names(&hits), vec!["Stocco", "Luminous"]);
        assert_eq!(hits[0].meta.sp_id, 10);
        assert_eq!(hits[1].meta.sp_id, 30);
        assert_eq!(hits[1].status, ClientStatus::Inactive);
    }

    #[tokio::test]
    async fn empty_query_returns_every_record() {
        let p = provider();
        assert_eq!(p.search_clients("").await.len(), 3);
        assert_eq!(p.search_workers("   ").await.len(), 4);
        assert_eq!(p.search_sites("").await.len(), 3);
        assert_eq!(p.search_orders("").await.len(), 3);
        assert_eq!(p.search_replacements("").await.len(), 3);
        assert_eq!(p.search_relocations("").await.len(), 2);
    }

    #[tokio::test]
    async fn search_is_case_insensitive_over_curated_fields() {
        let p = provider();
        assert_eq!(names(&p.search_clients("WISE").await), vec!["Wiseowe"]);
        // industry is not a searchable client field
        assert!(p.search_clients("energy").await.is_empty());

        let by_document = p.search_workers("z1122").await;
        assert_eq!(names(&by_document), vec!["Carla Nunez"]);

        let by_location = p.search_sites("valencia").await;
        assert_eq!(by_location.len(), 1);
        assert_eq!(by_location[0].code, "OB-302");

        let by_reason = p.search_relocations("FASE").await;
        assert_eq!(names(&by_reason), vec!["TRA-0902"]);
    }

    #[tokio::test]
    async fn order_search_matches_stringified_external_id() {
        let p = provider();
        assert_eq!(p.search_orders("500").await.len(), 3);
        let one = p.search_orders("5002").await;
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].code, "PED-SUR-02");
        assert_eq!(names(&p.search_replacements("7003").await), vec!["REE-SOLAR-03"]);
    }

    #[tokio::test]
    async fn lookups_return_matching_external_id_or_none() {
        let p = provider();
        for sp_id in [10, 20, 30] {
            assert_eq!(p.get_client(sp_id).await.unwrap().meta.sp_id, sp_id);
        }
        let worker = p.get_worker(103).await.unwrap();
        assert_eq!(worker.status, WorkerStatus::MedicalLeave);
        assert_eq!(p.get_site(302).await.unwrap().meta.sp_id, 302);
        assert_eq!(p.get_order(5001).await.unwrap().site_sp_id, Some(301));
        assert_eq!(p.get_relocation(9002).await.unwrap().destination_site_sp_id, Some(301));

        assert!(p.get_client(11).await.is_none());
        assert!(p.get_worker(-1).await.is_none());
        assert!(p.get_relocation(7002).await.is_none());
    }

    #[tokio::test]
    async fn replacement_7002_has_no_incoming_worker() {
        let replacement = provider().get_replacement(7002).await.unwrap();
        assert_eq!(replacement.worker_out_sp_id, Some(103));
        assert_eq!(replacement.worker_in_sp_id, None);
    }

    #[tokio::test]
    async fn local_ids_are_stable_across_lookups() {
        let p = provider();
        let first = p.get_client(20).await.unwrap();
        let second = p.get_client(20).await.unwrap();
        assert_eq!(first.meta.id, second.meta.id);

        let stocco = p.get_client(10).await.unwrap();
        assert_eq!(
            stocco.meta.id.to_string(),
            "3f6c2a4e-8d1b-4c5a-9e2f-1a7b3c9d0e10"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn default_latency_makes_search_slower_than_lookup() {
        let p = FixtureProvider::builtin().unwrap();
        assert_eq!(p.latency(), LatencyProfile::default());

        let start = Instant::now();
        p.get_order(5001).await;
        let lookup = start.elapsed();

        let start = Instant::now();
        p.search_orders("ped").await;
        let search = start.elapsed();

        assert!(lookup >= Duration::from_millis(100));
        assert!(search >= Duration::from_millis(300));
        assert!(search > lookup);
    }

    #[test]
    fn load_dir_reports_missing_files_and_bad_rows() {
        let dir = tempfile::tempdir().unwrap();
        let err = FixtureSet::load_dir(dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains("clients.json"));

        for name in [
            "workers.json",
            "sites.json",
            "orders.json",
            "replacements.json",
            "relocations.json",
        ] {
            fs::write(dir.path().join(name), "[]").unwrap();
        }
        fs::write(dir.path().join("clients.json"), r#"[{"Title": "missing id"}]"#).unwrap();
        let err = FixtureSet::load_dir(dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains("row 0"));

        fs::write(dir.path().join("clients.json"), r#"[{"ID": "1", "Title": "ok"}]"#).unwrap();
        fs::write(
            dir.path().join("orders.json"),
            r#"[{"ID": 5001, "ClientLookupId": "1", "SiteLookupId": "n/a"}]"#,
        )
        .unwrap();
        let set = FixtureSet::load_dir(dir.path()).unwrap();
        assert_eq!(set.clients.len(), 1);
        assert_eq!(set.clients[0].sp_id, 1);
        assert_eq!(set.orders[0].client_lookup_id, Some(1));
        assert_eq!(set.orders[0].site_lookup_id, None);
    }
}
