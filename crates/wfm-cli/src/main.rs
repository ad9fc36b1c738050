use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wfm_core::EntityKind;
use wfm_integration::{build_context, unified_search, ContextKind, Integration, IntegrationConfig};

#[derive(Debug, Parser)]
#[command(name = "wfm")]
#[command(about = "Workforce staffing integration command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve the JSON API on WFM_WEB_PORT.
    Serve,
    /// Fetch one record by its external id.
    Get { entity: String, sp_id: i64 },
    /// Free-text search within one entity type.
    Search {
        entity: String,
        #[arg(default_value = "")]
        query: String,
    },
    /// Build the incident snapshot for a replacement, relocation or order.
    Context { kind: String, sp_id: i64 },
    /// Search orders, replacements and relocations at once.
    Find { query: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = IntegrationConfig::from_env().context("reading WFM_* configuration")?;
    debug!(provider = config.provider.as_str(), "configuration loaded");

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => wfm_web::serve(&config).await?,
        Commands::Get { entity, sp_id } => {
            let integration = Integration::from_config(&config)?;
            get(&integration, parse_entity(&entity)?, sp_id).await?;
        }
        Commands::Search { entity, query } => {
            let integration = Integration::from_config(&config)?;
            search(&integration, parse_entity(&entity)?, &query).await?;
        }
        Commands::Context { kind, sp_id } => {
            let kind = ContextKind::parse(&kind)
                .ok_or_else(|| anyhow!("no context for {kind:?} (replacement, relocation or order)"))?;
            let integration = Integration::from_config(&config)?;
            let context = build_context(&integration, kind, sp_id).await;
            if context.is_missing() {
                bail!("{}", context.origin.label);
            }
            print_json(&context)?;
        }
        Commands::Find { query } => {
            let integration = Integration::from_config(&config)?;
            print_json(&unified_search(&integration, &query).await)?;
        }
    }

    Ok(())
}

/// Logs go to stderr so stdout stays pure JSON. `RUST_LOG` overrides the
/// `wfm=info` default; `WFM_LOG_JSON=1` switches to JSON lines.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "wfm=info".into());
    let json = std::env::var("WFM_LOG_JSON")
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .json(),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .compact(),
            )
            .init();
    }
}

fn parse_entity(input: &str) -> Result<EntityKind> {
    EntityKind::parse(input).ok_or_else(|| anyhow!("unknown entity {input:?}"))
}

async fn get(integration: &Integration, kind: EntityKind, sp_id: i64) -> Result<()> {
    match kind {
        EntityKind::Client => print_found(kind, sp_id, integration.get_client(sp_id).await),
        EntityKind::Worker => print_found(kind, sp_id, integration.get_worker(sp_id).await),
        EntityKind::Site => print_found(kind, sp_id, integration.get_site(sp_id).await),
        EntityKind::Order => print_found(kind, sp_id, integration.get_order(sp_id).await),
        EntityKind::Replacement => {
            print_found(kind, sp_id, integration.get_replacement(sp_id).await)
        }
        EntityKind::Relocation => {
            print_found(kind, sp_id, integration.get_relocation(sp_id).await)
        }
    }
}

async fn search(integration: &Integration, kind: EntityKind, query: &str) -> Result<()> {
    match kind {
        EntityKind::Client => print_json(&integration.search_clients(query).await),
        EntityKind::Worker => print_json(&integration.search_workers(query).await),
        EntityKind::Site => print_json(&integration.search_sites(query).await),
        EntityKind::Order => print_json(&integration.search_orders(query).await),
        EntityKind::Replacement => print_json(&integration.search_replacements(query).await),
        EntityKind::Relocation => print_json(&integration.search_relocations(query).await),
    }
}

fn print_found<T: Serialize>(kind: EntityKind, sp_id: i64, found: Option<T>) -> Result<()> {
    match found {
        Some(entity) => print_json(&entity),
        None => bail!("{} {} not found", kind.display_name(), sp_id),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_subcommands() {
        let cli = Cli::try_parse_from(["wfm", "get", "workers", "103"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Get { ref entity, sp_id: 103 }) if entity == "workers"
        ));

        let cli = Cli::try_parse_from(["wfm", "search", "orders"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Search { ref query, .. }) if query.is_empty()));

        assert!(Cli::try_parse_from(["wfm", "context", "replacement", "abc"]).is_err());
    }

    #[test]
    fn entity_names_are_checked() {
        assert_eq!(parse_entity("sites").unwrap(), EntityKind::Site);
        assert!(parse_entity("invoices").is_err());
    }
}
