use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;
use wfm_adapters::{DataProvider, FixtureProvider, FixtureSet, LiveProvider};
use wfm_core::{Client, Order, Relocation, Replacement, Site, Worker};
use wfm_storage::{PgRowStore, RestRowStore, RestStoreConfig, RowStore};

use crate::config::{BackendKind, IntegrationConfig, ProviderKind};

const PG_MAX_CONNECTIONS: u32 = 5;

/// Single entry point to staffing data. Holds one provider for its whole lifetime.
#[derive(Clone)]
pub struct Integration {
    provider: Arc<dyn DataProvider>,
}

impl fmt::Debug for Integration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Integration")
            .field("provider", &self.provider.name())
            .finish()
    }
}

impl Integration {
    pub fn new(provider: Arc<dyn DataProvider>) -> Self {
        Self { provider }
    }

    /// Builtin fixtures with the default simulated latency.
    pub fn fixture() -> Result<Self> {
        Ok(Self::new(Arc::new(FixtureProvider::builtin()?)))
    }

    /// Must be called inside a tokio runtime when the Postgres backend is selected.
    pub fn from_config(config: &IntegrationConfig) -> Result<Self> {
        let provider: Arc<dyn DataProvider> = match config.provider {
            ProviderKind::Fixture => {
                let fixtures = match &config.fixtures_dir {
                    Some(dir) => FixtureSet::load_dir(dir)?,
                    None => FixtureSet::builtin()?,
                };
                Arc::new(FixtureProvider::new(fixtures).with_latency(config.latency))
            }
            ProviderKind::Live => Arc::new(LiveProvider::new(build_store(config)?)),
        };

        info!(
            provider = provider.name(),
            backend = config.backend.as_str(),
            "integration ready"
        );
        Ok(Self::new(provider))
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub async fn get_client(&self, sp_id: i64) -> Option<Client> {
        self.provider.get_client(sp_id).await
    }

    pub async fn search_clients(&self, query: &str) -> Vec<Client> {
        self.provider.search_clients(query).await
    }

    pub async fn get_worker(&self, sp_id: i64) -> Option<Worker> {
        self.provider.get_worker(sp_id).await
    }

    pub async fn search_workers(&self, query: &str) -> Vec<Worker> {
        self.provider.search_workers(query).await
    }

    pub async fn get_site(&self, sp_id: i64) -> Option<Site> {
        self.provider.get_site(sp_id).await
    }

    pub async fn search_sites(&self, query: &str) -> Vec<Site> {
        self.provider.search_sites(query).await
    }

    pub async fn get_order(&self, sp_id: i64) -> Option<Order> {
        self.provider.get_order(sp_id).await
    }

    pub async fn search_orders(&self, query: &str) -> Vec<Order> {
        self.provider.search_orders(query).await
    }

    pub async fn get_replacement(&self, sp_id: i64) -> Option<Replacement> {
        self.provider.get_replacement(sp_id).await
    }

    pub async fn search_replacements(&self, query: &str) -> Vec<Replacement> {
        self.provider.search_replacements(query).await
    }

    pub async fn get_relocation(&self, sp_id: i64) -> Option<Relocation> {
        self.provider.get_relocation(sp_id).await
    }

    pub async fn search_relocations(&self, query: &str) -> Vec<Relocation> {
        self.provider.search_relocations(query).await
    }
}

fn build_store(config: &IntegrationConfig) -> Result<Arc<dyn RowStore>> {
    match config.backend {
        BackendKind::Postgres => {
            let store = PgRowStore::connect_lazy(&config.database_url, PG_MAX_CONNECTIONS)
                .context("configuring postgres row store")?;
            Ok(Arc::new(store))
        }
        BackendKind::Rest => {
            let base_url = config
                .rest_url
                .clone()
                .context("WFM_REST_URL is required for the REST backend")?;
            let mut rest = RestStoreConfig::new(base_url);
            rest.api_key = config.rest_key.clone();
            rest.timeout = Duration::from_secs(config.http_timeout_secs);
            rest.user_agent = Some(format!("wfm/{}", env!("CARGO_PKG_VERSION")));
            let store = RestRowStore::new(rest).context("building REST row store")?;
            Ok(Arc::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use wfm_adapters::LatencyProfile;

    use super::*;

    fn quiet_fixture() -> Integration {
        let provider = FixtureProvider::builtin()
            .unwrap()
            .with_latency(LatencyProfile::none());
        Integration::new(Arc::new(provider))
    }

    #[tokio::test]
    async fn forwards_to_the_fixture_provider() {
        let integration = quiet_fixture();
        assert_eq!(integration.provider_name(), "fixture");
        let client = integration.get_client(10).await.unwrap();
        assert_eq!(client.name, "Stocco");
        assert!(integration.get_worker(999).await.is_none());
        assert_eq!(integration.search_orders("norte").await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn builtin_fixture_simulates_lookup_latency() {
        let integration = Integration::fixture().unwrap();
        let started = tokio::time::Instant::now();
        assert_eq!(integration.get_worker(103).await.unwrap().name, "Carla Nunez");
        let elapsed = started.elapsed();
        assert!(elapsed >= std::time::Duration::from_millis(100), "{elapsed:?}");
        assert!(elapsed < std::time::Duration::from_millis(300), "{elapsed:?}");
    }

    #[tokio::test]
    async fn clones_share_the_provider() {
        let integration = quiet_fixture();
        let copy = integration.clone();
        let a = integration.get_order(5001).await.unwrap();
        let b = copy.get_order(5001).await.unwrap();
        assert_eq!(a.meta.id, b.meta.id);
    }

    #[tokio::test]
    async fn config_selects_fixture_provider() {
        let mut config = IntegrationConfig::default();
        config.latency = LatencyProfile::none();
        let integration = Integration::from_config(&config).unwrap();
        assert_eq!(integration.provider_name(), "fixture");
        assert!(integration.get_site(301).await.is_some());
    }

    #[tokio::test]
    async fn config_selects_live_provider() {
        let config = IntegrationConfig {
            provider: ProviderKind::Live,
            backend: BackendKind::Rest,
            rest_url: Some("http://127.0.0.1:9".into()),
            ..IntegrationConfig::default()
        };
        let integration = Integration::from_config(&config).unwrap();
        assert_eq!(integration.provider_name(), "live");
        assert!(integration.get_site(301).await.is_none());
        assert!(integration.search_relocations("TRA").await.is_empty());
    }

    #[test]
    fn missing_fixture_dir_is_an_error() {
        let config = IntegrationConfig {
            fixtures_dir: Some("/definitely/not/here".into()),
            ..IntegrationConfig::default()
        };
        assert!(Integration::from_config(&config).is_err());
    }
}
