//! Incident snapshots: a root record plus every related record that resolves.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;
use wfm_core::{Client, CrossLink, Entity, EntityKind, Order, Site, Worker};

use crate::facade::Integration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextKind {
    Replacement,
    Relocation,
    Order,
}

impl ContextKind {
    pub const ALL: [ContextKind; 3] = [Self::Replacement, Self::Relocation, Self::Order];

    pub fn entity_kind(&self) -> EntityKind {
        match self {
            Self::Replacement => EntityKind::Replacement,
            Self::Relocation => EntityKind::Relocation,
            Self::Order => EntityKind::Order,
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        let kind = EntityKind::parse(input)?;
        Self::ALL.into_iter().find(|k| k.entity_kind() == kind)
    }
}

/// A related record, reduced to what an incident view shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelatedRecord {
    pub link: CrossLink,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl RelatedRecord {
    fn client(client: &Client) -> Self {
        Self {
            link: client.cross_link(),
            name: client.name.clone(),
            email: client.email.clone(),
            phone: client.phone.clone(),
            detail: Some(client.company.clone()).filter(|c| !c.is_empty()),
        }
    }

    fn worker(worker: &Worker) -> Self {
        Self {
            link: worker.cross_link(),
            name: worker.name.clone(),
            email: worker.email.clone(),
            phone: worker.phone.clone(),
            detail: worker.category.clone(),
        }
    }

    fn order(order: &Order) -> Self {
        Self {
            link: order.cross_link(),
            name: order.code.clone(),
            email: order.salesperson_email.clone(),
            phone: None,
            detail: Some(order.status.to_string()),
        }
    }

    fn site(site: &Site) -> Self {
        Self {
            link: site.cross_link(),
            name: site.name.clone(),
            email: None,
            phone: None,
            detail: site.location.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncidentContext {
    pub kind: ContextKind,
    pub origin: CrossLink,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<RelatedRecord>,
    /// The order ("pedido" on the legacy screens) the incident belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<RelatedRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<RelatedRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_site: Option<RelatedRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker: Option<RelatedRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_new: Option<RelatedRecord>,
}

impl IncidentContext {
    fn rooted(kind: ContextKind, origin: CrossLink) -> Self {
        Self {
            kind,
            origin,
            status: None,
            date: None,
            client: None,
            order: None,
            site: None,
            destination_site: None,
            worker: None,
            worker_new: None,
        }
    }

    fn not_found(kind: ContextKind, sp_id: i64) -> Self {
        Self::rooted(kind, CrossLink::not_found(kind.entity_kind(), sp_id))
    }

    /// True when the root record itself could not be fetched.
    pub fn is_missing(&self) -> bool {
        self.status.is_none() && self.origin.label.ends_with("Not Found")
    }

    pub fn related(&self) -> impl Iterator<Item = &RelatedRecord> {
        [
            &self.client,
            &self.order,
            &self.site,
            &self.destination_site,
            &self.worker,
            &self.worker_new,
        ]
        .into_iter()
        .flatten()
    }
}

pub async fn build_context(
    integration: &Integration,
    kind: ContextKind,
    sp_id: i64,
) -> IncidentContext {
    match kind {
        ContextKind::Replacement => build_context_from_replacement(integration, sp_id).await,
        ContextKind::Relocation => build_context_from_relocation(integration, sp_id).await,
        ContextKind::Order => build_context_from_order(integration, sp_id).await,
    }
}

pub async fn build_context_from_replacement(
    integration: &Integration,
    sp_id: i64,
) -> IncidentContext {
    let Some(replacement) = integration.get_replacement(sp_id).await else {
        debug!(sp_id, "replacement not found");
        return IncidentContext::not_found(ContextKind::Replacement, sp_id);
    };

    let mut context = IncidentContext::rooted(ContextKind::Replacement, replacement.cross_link());
    context.status = Some(replacement.status.to_string());
    context.date = replacement.request_date;

    let order = fetch_order(integration, replacement.order_sp_id).await;
    let order_ref = |pick: fn(&Order) -> Option<i64>| order.as_ref().and_then(pick);

    context.client = resolve_client(
        integration,
        replacement.client_sp_id.or(order_ref(|o| o.client_sp_id)),
    )
    .await;
    context.site = resolve_site(integration, order_ref(|o| o.site_sp_id)).await;
    context.worker = resolve_worker(integration, replacement.worker_out_sp_id).await;
    context.worker_new = resolve_worker(integration, replacement.worker_in_sp_id).await;
    context.order = order.as_ref().map(RelatedRecord::order);
    context
}

pub async fn build_context_from_relocation(
    integration: &Integration,
    sp_id: i64,
) -> IncidentContext {
    let Some(relocation) = integration.get_relocation(sp_id).await else {
        debug!(sp_id, "relocation not found");
        return IncidentContext::not_found(ContextKind::Relocation, sp_id);
    };

    let mut context = IncidentContext::rooted(ContextKind::Relocation, relocation.cross_link());
    context.status = Some(relocation.status.to_string());
    context.date = relocation.movement_date;

    let order = fetch_order(integration, relocation.order_sp_id).await;
    let order_ref = |pick: fn(&Order) -> Option<i64>| order.as_ref().and_then(pick);

    context.client = resolve_client(
        integration,
        relocation.client_sp_id.or(order_ref(|o| o.client_sp_id)),
    )
    .await;
    context.site = resolve_site(
        integration,
        relocation.origin_site_sp_id.or(order_ref(|o| o.site_sp_id)),
    )
    .await;
    context.destination_site = resolve_site(integration, relocation.destination_site_sp_id).await;
    context.worker = resolve_worker(integration, relocation.worker_sp_id).await;
    context.order = order.as_ref().map(RelatedRecord::order);
    context
}

pub async fn build_context_from_order(integration: &Integration, sp_id: i64) -> IncidentContext {
    let Some(order) = integration.get_order(sp_id).await else {
        debug!(sp_id, "order not found");
        return IncidentContext::not_found(ContextKind::Order, sp_id);
    };

    let mut context = IncidentContext::rooted(ContextKind::Order, order.cross_link());
    context.status = Some(order.status.to_string());
    context.date = order.start_date;
    context.client = resolve_client(integration, order.client_sp_id).await;
    context.site = resolve_site(integration, order.site_sp_id).await;
    context
}

async fn fetch_order(integration: &Integration, sp_id: Option<i64>) -> Option<Order> {
    let sp_id = sp_id?;
    let order = integration.get_order(sp_id).await;
    if order.is_none() {
        debug!(sp_id, "order reference did not resolve");
    }
    order
}

async fn resolve_client(integration: &Integration, sp_id: Option<i64>) -> Option<RelatedRecord> {
    let client = integration.get_client(sp_id?).await;
    client.as_ref().map(RelatedRecord::client)
}

async fn resolve_site(integration: &Integration, sp_id: Option<i64>) -> Option<RelatedRecord> {
    let site = integration.get_site(sp_id?).await;
    site.as_ref().map(RelatedRecord::site)
}

async fn resolve_worker(integration: &Integration, sp_id: Option<i64>) -> Option<RelatedRecord> {
    let worker = integration.get_worker(sp_id?).await;
    worker.as_ref().map(RelatedRecord::worker)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use wfm_adapters::{FixtureProvider, FixtureSet, LatencyProfile};

    use super::*;

    fn integration() -> Integration {
        let provider = FixtureProvider::builtin()
            .unwrap()
            .with_latency(LatencyProfile::none());
        Integration::new(Arc::new(provider))
    }

    #[tokio::test]
    async fn pending_replacement_has_no_incoming_worker() {
        let context = build_context_from_replacement(&integration(), 7002).await;
        assert_eq!(context.origin.label, "REE-NORTE-02");
        assert_eq!(context.origin.table, "Reemplazos");
        assert_eq!(context.status.as_deref(), Some("Pending"));
        assert_eq!(context.client.as_ref().unwrap().name, "Stocco");
        assert_eq!(context.order.as_ref().unwrap().name, "PED-NORTE-01");
        assert_eq!(context.site.as_ref().unwrap().link.label, "OB-301 - Torre Norte");
        assert_eq!(context.worker.as_ref().unwrap().name, "Carla Nunez");
        assert!(context.worker_new.is_none());

        let value = serde_json::to_value(&context).unwrap();
        let object = value.as_object().unwrap();
        assert!(!object.contains_key("worker_new"));
        assert!(!object.contains_key("destination_site"));
        assert!(!object.contains_key("pedido"));
        assert_eq!(value["kind"], "replacement");
        assert_eq!(value["order"]["name"], "PED-NORTE-01");
    }

    #[tokio::test]
    async fn replacement_client_falls_back_to_order() {
        let mut fixtures = FixtureSet::builtin().unwrap();
        for row in &mut fixtures.replacements {
            row.client_lookup_id = None;
        }
        let provider = FixtureProvider::new(fixtures).with_latency(LatencyProfile::none());
        let integration = Integration::new(Arc::new(provider));

        let context = build_context_from_replacement(&integration, 7001).await;
        let client = context.client.expect("client from order 5002");
        assert_eq!(client.link.sp_id, 20);
        assert_eq!(client.name, "Wiseowe");
        assert_eq!(context.worker_new.unwrap().link.sp_id, 104);
    }

    #[tokio::test]
    async fn dangling_references_are_omitted() {
        let mut fixtures = FixtureSet::builtin().unwrap();
        for row in &mut fixtures.relocations {
            row.destination_site_lookup_id = Some(399);
            row.worker_lookup_id = None;
        }
        let provider = FixtureProvider::new(fixtures).with_latency(LatencyProfile::none());
        let integration = Integration::new(Arc::new(provider));

        let context = build_context_from_relocation(&integration, 9002).await;
        assert!(context.destination_site.is_none());
        assert!(context.worker.is_none());
        assert_eq!(context.site.unwrap().link.sp_id, 303);
    }

    #[tokio::test]
    async fn missing_root_yields_empty_snapshot() {
        let context = build_context_from_replacement(&integration(), 7999).await;
        assert!(context.is_missing());
        assert!(context.origin.label.contains("Not Found"));
        assert!(context.origin.label.contains("7999"));
        assert_eq!(context.related().count(), 0);
    }

    #[tokio::test]
    async fn relocation_resolves_both_sites() {
        let context = build_context_from_relocation(&integration(), 9001).await;
        assert_eq!(context.site.as_ref().unwrap().link.sp_id, 301);
        assert_eq!(context.destination_site.as_ref().unwrap().link.sp_id, 302);
        assert_eq!(context.worker.as_ref().unwrap().link.sp_id, 101);
        assert_eq!(context.related().count(), 5);
        assert!(!context.is_missing());
    }

    #[tokio::test]
    async fn order_context_has_client_and_site_only() {
        let context = build_context(&integration(), ContextKind::Order, 5003).await;
        assert_eq!(context.client.as_ref().unwrap().name, "Luminous");
        assert_eq!(context.site.as_ref().unwrap().link.sp_id, 303);
        assert_eq!(context.related().count(), 2);
    }

    #[test]
    fn context_kind_parses_entity_names() {
        assert_eq!(ContextKind::parse("replacements"), Some(ContextKind::Replacement));
        assert_eq!(ContextKind::parse("Order"), Some(ContextKind::Order));
        assert_eq!(ContextKind::parse("client"), None);
    }
}
