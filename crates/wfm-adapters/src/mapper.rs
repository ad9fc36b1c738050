//! Field mapping between legacy list rows and typed entities.
//!
//! Each entity has a raw row type mirroring the legacy column names. `ID` is
//! the only required column; everything else may be missing and maps to an
//! absent (or default) value. Ids and lookup ids are read from numbers or
//! numeric strings, and a lookup id that is neither counts as unset. Unknown
//! columns are ignored; any other known column holding the wrong JSON type
//! rejects the whole row.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use wfm_core::{
    Client, ClientStatus, EntityKind, LocalId, Order, OrderStatus, RecordMeta, Relocation,
    RelocationStatus, Replacement, ReplacementReason, ReplacementStatus, Site, SiteStatus, Worker,
    WorkerStatus,
};

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("malformed {kind} row: {source}")]
    Shape {
        kind: EntityKind,
        #[source]
        source: serde_json::Error,
    },
}

/// A legacy row shape paired with the entity it maps to.
pub trait RawRow: Serialize + DeserializeOwned + Clone + Send + Sync {
    type Entity: Send;

    const KIND: EntityKind;

    fn sp_id(&self) -> i64;

    fn local_id_mut(&mut self) -> &mut Option<LocalId>;

    fn to_entity(&self) -> Self::Entity;

    fn from_entity(entity: &Self::Entity) -> Self;

    /// Validate an arbitrary key bag against this row's schema.
    fn from_json(value: JsonValue) -> Result<Self, MappingError> {
        serde_json::from_value(value).map_err(|source| MappingError::Shape {
            kind: Self::KIND,
            source,
        })
    }
}

/// Accepts `2024-03-04` as well as full timestamps such as `2024-03-04T00:00:00Z`.
pub fn parse_date_lenient(input: &str) -> Option<NaiveDate> {
    let trimmed = input.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(ts.with_timezone(&Utc).date_naive());
    }
    trimmed
        .get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

mod legacy_date {
    use chrono::NaiveDate;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &Option<NaiveDate>, ser: S) -> Result<S::Ok, S::Error> {
        match date {
            Some(date) => ser.serialize_str(&date.format("%Y-%m-%d").to_string()),
            None => ser.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Option<NaiveDate>, D::Error> {
        let raw: Option<String> = Option::deserialize(de)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(text) => super::parse_date_lenient(text)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("unrecognized date {text:?}"))),
        }
    }
}

mod legacy_id {
    use serde::{de::Error, Deserialize, Deserializer};
    use serde_json::Value;

    fn as_id(value: &Value) -> Option<i64> {
        match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn required<'de, D: Deserializer<'de>>(de: D) -> Result<i64, D::Error> {
        let value = Value::deserialize(de)?;
        as_id(&value).ok_or_else(|| D::Error::custom(format!("expected an integer id, got {value}")))
    }

    pub fn lookup<'de, D: Deserializer<'de>>(de: D) -> Result<Option<i64>, D::Error> {
        let value = Option::<Value>::deserialize(de)?;
        Ok(value.as_ref().and_then(as_id))
    }
}

fn meta_from(
    sp_id: i64,
    local_id: Option<LocalId>,
    created: Option<DateTime<Utc>>,
    modified: Option<DateTime<Utc>>,
) -> RecordMeta {
    RecordMeta {
        id: local_id.unwrap_or_else(LocalId::issue),
        sp_id,
        sp_created: created,
        sp_modified: modified,
    }
}

fn text(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawClientRow {
    #[serde(rename = "ID", deserialize_with = "legacy_id::required")]
    pub sp_id: i64,
    pub local_id: Option<LocalId>,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub title: Option<String>,
    pub company: Option<String>,
    pub industry: Option<String>,
    pub status: Option<String>,
    pub tax_id: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawWorkerRow {
    #[serde(rename = "ID", deserialize_with = "legacy_id::required")]
    pub sp_id: i64,
    pub local_id: Option<LocalId>,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    #[serde(rename = "Full_x0020_Name")]
    pub full_name: Option<String>,
    pub document_number: Option<String>,
    pub nationality: Option<String>,
    pub category: Option<String>,
    pub status: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawSiteRow {
    #[serde(rename = "ID", deserialize_with = "legacy_id::required")]
    pub sp_id: i64,
    pub local_id: Option<LocalId>,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub code: Option<String>,
    pub title: Option<String>,
    #[serde(default, deserialize_with = "legacy_id::lookup")]
    pub client_lookup_id: Option<i64>,
    pub location: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawOrderRow {
    #[serde(rename = "ID", deserialize_with = "legacy_id::required")]
    pub sp_id: i64,
    pub local_id: Option<LocalId>,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub code: Option<String>,
    #[serde(default, deserialize_with = "legacy_id::lookup")]
    pub client_lookup_id: Option<i64>,
    #[serde(default, deserialize_with = "legacy_id::lookup")]
    pub site_lookup_id: Option<i64>,
    #[serde(default, with = "legacy_date")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, with = "legacy_date")]
    pub estimated_end_date: Option<NaiveDate>,
    pub status: Option<String>,
    pub salesperson_email: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawReplacementRow {
    #[serde(rename = "ID", deserialize_with = "legacy_id::required")]
    pub sp_id: i64,
    pub local_id: Option<LocalId>,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub code: Option<String>,
    #[serde(default, deserialize_with = "legacy_id::lookup")]
    pub client_lookup_id: Option<i64>,
    #[serde(default, deserialize_with = "legacy_id::lookup")]
    pub order_lookup_id: Option<i64>,
    #[serde(default, deserialize_with = "legacy_id::lookup")]
    pub worker_out_lookup_id: Option<i64>,
    #[serde(default, deserialize_with = "legacy_id::lookup")]
    pub worker_in_lookup_id: Option<i64>,
    pub reason: Option<String>,
    #[serde(default, with = "legacy_date")]
    pub request_date: Option<NaiveDate>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawRelocationRow {
    #[serde(rename = "ID", deserialize_with = "legacy_id::required")]
    pub sp_id: i64,
    pub local_id: Option<LocalId>,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub code: Option<String>,
    #[serde(default, deserialize_with = "legacy_id::lookup")]
    pub client_lookup_id: Option<i64>,
    #[serde(default, deserialize_with = "legacy_id::lookup")]
    pub order_lookup_id: Option<i64>,
    #[serde(default, deserialize_with = "legacy_id::lookup")]
    pub worker_lookup_id: Option<i64>,
    #[serde(default, deserialize_with = "legacy_id::lookup")]
    pub origin_site_lookup_id: Option<i64>,
    #[serde(default, deserialize_with = "legacy_id::lookup")]
    pub destination_site_lookup_id: Option<i64>,
    #[serde(default, with = "legacy_date")]
    pub movement_date: Option<NaiveDate>,
    pub reason: Option<String>,
    pub status: Option<String>,
}

pub fn map_client(raw: &RawClientRow) -> Client {
    Client {
        meta: meta_from(raw.sp_id, raw.local_id, raw.created, raw.modified),
        name: text(&raw.title),
        company: text(&raw.company),
        industry: text(&raw.industry),
        status: raw
            .status
            .as_deref()
            .and_then(ClientStatus::parse_label)
            .unwrap_or_default(),
        tax_id: raw.tax_id.clone(),
        email: raw.email.clone(),
        phone: raw.phone.clone(),
    }
}

pub fn client_to_raw(client: &Client) -> RawClientRow {
    RawClientRow {
        sp_id: client.meta.sp_id,
        local_id: Some(client.meta.id),
        created: client.meta.sp_created,
        modified: client.meta.sp_modified,
        title: Some(client.name.clone()),
        company: Some(client.company.clone()),
        industry: Some(client.industry.clone()),
        status: Some(client.status.as_str().to_string()),
        tax_id: client.tax_id.clone(),
        email: client.email.clone(),
        phone: client.phone.clone(),
    }
}

pub fn map_worker(raw: &RawWorkerRow) -> Worker {
    Worker {
        meta: meta_from(raw.sp_id, raw.local_id, raw.created, raw.modified),
        name: text(&raw.full_name),
        document_number: text(&raw.document_number),
        nationality: raw.nationality.clone(),
        category: raw.category.clone(),
        status: raw
            .status
            .as_deref()
            .and_then(WorkerStatus::parse_label)
            .unwrap_or_default(),
        email: raw.email.clone(),
        phone: raw.phone.clone(),
    }
}

pub fn worker_to_raw(worker: &Worker) -> RawWorkerRow {
    RawWorkerRow {
        sp_id: worker.meta.sp_id,
        local_id: Some(worker.meta.id),
        created: worker.meta.sp_created,
        modified: worker.meta.sp_modified,
        full_name: Some(worker.name.clone()),
        document_number: Some(worker.document_number.clone()),
        nationality: worker.nationality.clone(),
        category: worker.category.clone(),
        status: Some(worker.status.as_str().to_string()),
        email: worker.email.clone(),
        phone: worker.phone.clone(),
    }
}

pub fn map_site(raw: &RawSiteRow) -> Site {
    Site {
        meta: meta_from(raw.sp_id, raw.local_id, raw.created, raw.modified),
        code: text(&raw.code),
        name: text(&raw.title),
        client_sp_id: raw.client_lookup_id,
        location: raw.location.clone(),
        status: raw
            .status
            .as_deref()
            .and_then(SiteStatus::parse_label)
            .unwrap_or_default(),
    }
}

pub fn site_to_raw(site: &Site) -> RawSiteRow {
    RawSiteRow {
        sp_id: site.meta.sp_id,
        local_id: Some(site.meta.id),
        created: site.meta.sp_created,
        modified: site.meta.sp_modified,
        code: Some(site.code.clone()),
        title: Some(site.name.clone()),
        client_lookup_id: site.client_sp_id,
        location: site.location.clone(),
        status: Some(site.status.as_str().to_string()),
    }
}

pub fn map_order(raw: &RawOrderRow) -> Order {
    Order {
        meta: meta_from(raw.sp_id, raw.local_id, raw.created, raw.modified),
        code: text(&raw.code),
        client_sp_id: raw.client_lookup_id,
        site_sp_id: raw.site_lookup_id,
        start_date: raw.start_date,
        estimated_end_date: raw.estimated_end_date,
        status: raw
            .status
            .as_deref()
            .and_then(OrderStatus::parse_label)
            .unwrap_or_default(),
        salesperson_email: raw.salesperson_email.clone(),
    }
}

pub fn order_to_raw(order: &Order) -> RawOrderRow {
    RawOrderRow {
        sp_id: order.meta.sp_id,
        local_id: Some(order.meta.id),
        created: order.meta.sp_created,
        modified: order.meta.sp_modified,
        code: Some(order.code.clone()),
        client_lookup_id: order.client_sp_id,
        site_lookup_id: order.site_sp_id,
        start_date: order.start_date,
        estimated_end_date: order.estimated_end_date,
        status: Some(order.status.as_str().to_string()),
        salesperson_email: order.salesperson_email.clone(),
    }
}

pub fn map_replacement(raw: &RawReplacementRow) -> Replacement {
    Replacement {
        meta: meta_from(raw.sp_id, raw.local_id, raw.created, raw.modified),
        code: text(&raw.code),
        client_sp_id: raw.client_lookup_id,
        order_sp_id: raw.order_lookup_id,
        worker_out_sp_id: raw.worker_out_lookup_id,
        worker_in_sp_id: raw.worker_in_lookup_id,
        reason: raw
            .reason
            .as_deref()
            .and_then(ReplacementReason::parse_label)
            .unwrap_or_default(),
        request_date: raw.request_date,
        status: raw
            .status
            .as_deref()
            .and_then(ReplacementStatus::parse_label)
            .unwrap_or_default(),
    }
}

pub fn replacement_to_raw(replacement: &Replacement) -> RawReplacementRow {
    RawReplacementRow {
        sp_id: replacement.meta.sp_id,
        local_id: Some(replacement.meta.id),
        created: replacement.meta.sp_created,
        modified: replacement.meta.sp_modified,
        code: Some(replacement.code.clone()),
        client_lookup_id: replacement.client_sp_id,
        order_lookup_id: replacement.order_sp_id,
        worker_out_lookup_id: replacement.worker_out_sp_id,
        worker_in_lookup_id: replacement.worker_in_sp_id,
        reason: Some(replacement.reason.as_str().to_string()),
        request_date: replacement.request_date,
        status: Some(replacement.status.as_str().to_string()),
    }
}

pub fn map_relocation(raw: &RawRelocationRow) -> Relocation {
    Relocation {
        meta: meta_from(raw.sp_id, raw.local_id, raw.created, raw.modified),
        code: text(&raw.code),
        client_sp_id: raw.client_lookup_id,
        order_sp_id: raw.order_lookup_id,
        worker_sp_id: raw.worker_lookup_id,
        origin_site_sp_id: raw.origin_site_lookup_id,
        destination_site_sp_id: raw.destination_site_lookup_id,
        movement_date: raw.movement_date,
        reason: raw.reason.clone(),
        status: raw
            .status
            .as_deref()
            .and_then(RelocationStatus::parse_label)
            .unwrap_or_default(),
    }
}

pub fn relocation_to_raw(relocation: &Relocation) -> RawRelocationRow {
    RawRelocationRow {
        sp_id: relocation.meta.sp_id,
        local_id: Some(relocation.meta.id),
        created: relocation.meta.sp_created,
        modified: relocation.meta.sp_modified,
        code: Some(relocation.code.clone()),
        client_lookup_id: relocation.client_sp_id,
        order_lookup_id: relocation.order_sp_id,
        worker_lookup_id: relocation.worker_sp_id,
        origin_site_lookup_id: relocation.origin_site_sp_id,
        destination_site_lookup_id: relocation.destination_site_sp_id,
        movement_date: relocation.movement_date,
        reason: relocation.reason.clone(),
        status: Some(relocation.status.as_str().to_string()),
    }
}

macro_rules! impl_raw_row {
    ($raw:ty, $entity:ty, $kind:expr, $map:path, $to_raw:path) => {
        impl RawRow for $raw {
            type Entity = $entity;

            const KIND: EntityKind = $kind;

            fn sp_id(&self) -> i64 {
                self.sp_id
            }

            fn local_id_mut(&mut self) -> &mut Option<LocalId> {
                &mut self.local_id
            }

            fn to_entity(&self) -> $entity {
                $map(self)
            }

            fn from_entity(entity: &$entity) -> Self {
                $to_raw(entity)
            }
        }
    };
}

impl_raw_row!(RawClientRow, Client, EntityKind::Client, map_client, client_to_raw);
impl_raw_row!(RawWorkerRow, Worker, EntityKind::Worker, map_worker, worker_to_raw);
impl_raw_row!(RawSiteRow, Site, EntityKind::Site, map_site, site_to_raw);
impl_raw_row!(RawOrderRow, Order, EntityKind::Order, map_order, order_to_raw);
impl_raw_row!(
    RawReplacementRow,
    Replacement,
    EntityKind::Replacement,
    map_replacement,
    replacement_to_raw
);
impl_raw_row!(
    RawRelocationRow,
    Relocation,
    EntityKind::Relocation,
    map_relocation,
    relocation_to_raw
);
