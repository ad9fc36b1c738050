//! Data provider contract plus its fixture-first and live-backend implementations.

use async_trait::async_trait;
use wfm_core::{Client, Order, Relocation, Replacement, Site, Worker};

pub mod fixture;
pub mod live;
pub mod mapper;

pub use fixture::{FixtureProvider, FixtureSet, LatencyProfile};
pub use live::LiveProvider;
pub use mapper::{MappingError, RawRow};

pub const CRATE_NAME: &str = "wfm-adapters";

/// Read-only lookups per entity type, keyed by external id.
///
/// "Not found" and "backend failed" both come back as `None` (or an empty
/// list). Implementations log the difference; callers never see it.
#[async_trait]
pub trait DataProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn get_client(&self, sp_id: i64) -> Option<Client>;
    async fn search_clients(&self, query: &str) -> Vec<Client>;

    async fn get_worker(&self, sp_id: i64) -> Option<Worker>;
    async fn search_workers(&self, query: &str) -> Vec<Worker>;

    async fn get_site(&self, sp_id: i64) -> Option<Site>;
    async fn search_sites(&self, query: &str) -> Vec<Site>;

    async fn get_order(&self, sp_id: i64) -> Option<Order>;
    async fn search_orders(&self, query: &str) -> Vec<Order>;

    async fn get_replacement(&self, sp_id: i64) -> Option<Replacement>;
    async fn search_replacements(&self, query: &str) -> Vec<Replacement>;

    async fn get_relocation(&self, sp_id: i64) -> Option<Relocation>;
    async fn search_relocations(&self, query: &str) -> Vec<Relocation>;
}
