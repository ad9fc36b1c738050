//! One query across orders, replacements and relocations.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;
use wfm_core::{Order, Relocation, Replacement};

use crate::facade::Integration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HitKind {
    Order,
    Replacement,
    Relocation,
}

impl HitKind {
    /// Label the legacy screens use for this kind of record.
    pub fn legacy_label(&self) -> &'static str {
        match self {
            Self::Order => "Pedido",
            Self::Replacement => "Reemplazo",
            Self::Relocation => "Traslado",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub kind: HitKind,
    pub kind_label: &'static str,
    pub sp_id: i64,
    pub code: String,
    pub status: String,
    pub description: String,
    pub date: Option<NaiveDate>,
}

impl SearchHit {
    fn new(kind: HitKind, sp_id: i64, code: &str, status: String) -> Self {
        Self {
            kind,
            kind_label: kind.legacy_label(),
            sp_id,
            code: code.to_string(),
            status,
            description: code.to_string(),
            date: None,
        }
    }

    fn order(order: &Order, client_name: Option<&str>) -> Self {
        let mut hit = Self::new(
            HitKind::Order,
            order.meta.sp_id,
            &order.code,
            order.status.to_string(),
        );
        if let Some(name) = client_name.filter(|n| !n.is_empty()) {
            hit.description = format!("{} - {}", order.code, name);
        }
        hit.date = order.start_date;
        hit
    }

    fn replacement(replacement: &Replacement) -> Self {
        let mut hit = Self::new(
            HitKind::Replacement,
            replacement.meta.sp_id,
            &replacement.code,
            replacement.status.to_string(),
        );
        hit.description = format!("{} - {}", replacement.code, replacement.reason);
        hit.date = replacement.request_date;
        hit
    }

    fn relocation(relocation: &Relocation) -> Self {
        let mut hit = Self::new(
            HitKind::Relocation,
            relocation.meta.sp_id,
            &relocation.code,
            relocation.status.to_string(),
        );
        if let Some(reason) = relocation.reason.as_deref().filter(|r| !r.is_empty()) {
            hit.description = format!("{} - {}", relocation.code, reason);
        }
        hit.date = relocation.movement_date;
        hit
    }
}

/// Runs the three searches concurrently, then enriches order hits with the
/// client name one lookup at a time. Newest first; undated hits go last.
pub async fn unified_search(integration: &Integration, query: &str) -> Vec<SearchHit> {
    let (orders, replacements, relocations) = tokio::join!(
        integration.search_orders(query),
        integration.search_replacements(query),
        integration.search_relocations(query),
    );

    let mut hits = Vec::with_capacity(orders.len() + replacements.len() + relocations.len());
    for order in &orders {
        let client_name = match order.client_sp_id {
            Some(sp_id) => integration.get_client(sp_id).await.map(|c| c.name),
            None => None,
        };
        hits.push(SearchHit::order(order, client_name.as_deref()));
    }
    hits.extend(replacements.iter().map(SearchHit::replacement));
    hits.extend(relocations.iter().map(SearchHit::relocation));

    sort_newest_first(&mut hits);
    debug!(query, hits = hits.len(), "unified search");
    hits
}

fn sort_newest_first(hits: &mut [SearchHit]) {
    // Stable, and `None < Some(_)`, so reversing the comparison puts undated hits last.
    hits.sort_by(|a, b| b.date.cmp(&a.date));
}
