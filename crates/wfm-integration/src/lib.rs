//! Facade, context snapshots and unified search over a single data provider.

pub mod config;
pub mod context;
pub mod facade;
pub mod search;

pub use config::{BackendKind, ConfigError, IntegrationConfig, ProviderKind};
pub use context::{
    build_context, build_context_from_order, build_context_from_relocation,
    build_context_from_replacement, ContextKind, IncidentContext, RelatedRecord,
};
pub use facade::Integration;
pub use search::{unified_search, HitKind, SearchHit};

pub const CRATE_NAME: &str = "wfm-integration";
