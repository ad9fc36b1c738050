//! Core domain model for the workforce staffing integration layer.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const CRATE_NAME: &str = "wfm-core";

/// Identifier local to this application, stable regardless of the external system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalId(Uuid);

impl LocalId {
    /// Mint a fresh identifier for a record with no stored local id.
    pub fn issue() -> Self {
        Self(Uuid::new_v4())
    }

    /// Name-based id for a backend row that carries no local id of its own.
    /// The same `(scope, sp_id)` always yields the same id.
    pub fn derived(scope: &str, sp_id: i64) -> Self {
        Self(Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("{scope}:{sp_id}").as_bytes()))
    }

    pub fn parse(input: &str) -> Option<Self> {
        Uuid::parse_str(input.trim()).ok().map(Self)
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Shape shared by every entity: local id plus the mirrored external key and timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMeta {
    pub id: LocalId,
    pub sp_id: i64,
    pub sp_created: Option<DateTime<Utc>>,
    pub sp_modified: Option<DateTime<Utc>>,
}

impl RecordMeta {
    pub fn new(sp_id: i64) -> Self {
        Self {
            id: LocalId::issue(),
            sp_id,
            sp_created: None,
            sp_modified: None,
        }
    }
}

/// Lowercase and strip everything but letters/digits so "In Progress", "in_progress"
/// and "InProgress" compare equal.
fn normalize_label(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

macro_rules! labeled_enum {
    (
        $(#[$meta:meta])*
        $name:ident, default = $default:ident,
        { $($variant:ident $(| $alias:literal)*),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl Default for $name {
            fn default() -> Self {
                Self::$default
            }
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$(Self::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => stringify!($variant)),+
                }
            }

            /// Accepts the canonical label or one of the legacy labels used by the
            /// system of record, ignoring case, spaces and punctuation.
            pub fn parse_label(input: &str) -> Option<Self> {
                let key = normalize_label(input);
                if key.is_empty() {
                    return None;
                }
                $(
                    if key == normalize_label(stringify!($variant))
                        $(|| key == normalize_label($alias))*
                    {
                        return Some(Self::$variant);
                    }
                )+
                None
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

labeled_enum! {
    ClientStatus, default = Active,
    { Active | "Activo", Inactive | "Inactivo" }
}

labeled_enum! {
    WorkerStatus, default = Available,
    {
        Available | "Disponible",
        Allocated | "Asignado",
        MedicalLeave | "Baja Médica" | "Licencia Médica",
        Vacation | "Vacaciones",
        Inactive | "Inactivo",
    }
}

labeled_enum! {
    SiteStatus, default = InProgress,
    { InProgress | "En Curso", Completed | "Finalizada", Paused | "Pausada" }
}

labeled_enum! {
    OrderStatus, default = Open,
    {
        Draft | "Borrador",
        Open | "Abierto",
        InExecution | "En Ejecución",
        Closed | "Cerrado",
        Cancelled | "Canceled" | "Cancelado",
    }
}

labeled_enum! {
    ReplacementReason, default = Other,
    {
        MedicalLeave | "Baja Médica" | "Licencia Médica",
        Performance | "Rendimiento",
        Abandonment | "Abandono",
        ContractEnd | "Fin de Contrato",
        Other | "Otro",
    }
}

labeled_enum! {
    ReplacementStatus, default = Pending,
    {
        Pending | "Pendiente",
        UnderReview | "En Revisión",
        Approved | "Aprobado",
        Rejected | "Rechazado",
        Completed | "Completado",
    }
}

labeled_enum! {
    RelocationStatus, default = Planned,
    { Planned | "Planificado", InTransit | "En Tránsito", Completed | "Completado" }
}

/// System a cross-link points back into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceSystem {
    SharePoint,
}

/// Typed reference to a record in its system of origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossLink {
    pub source: SourceSystem,
    pub table: String,
    pub sp_id: i64,
    pub label: String,
}

impl CrossLink {
    pub fn new(table: impl Into<String>, sp_id: i64, label: impl Into<String>) -> Self {
        Self {
            source: SourceSystem::SharePoint,
            table: table.into(),
            sp_id,
            label: label.into(),
        }
    }

    pub fn not_found(kind: EntityKind, sp_id: i64) -> Self {
        Self::new(
            kind.table(),
            sp_id,
            format!("{} {} Not Found", kind.display_name(), sp_id),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Client,
    Worker,
    Site,
    Order,
    Replacement,
    Relocation,
}

impl EntityKind {
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Client,
        EntityKind::Worker,
        EntityKind::Site,
        EntityKind::Order,
        EntityKind::Replacement,
        EntityKind::Relocation,
    ];

    /// List name in the legacy system of record.
    pub fn table(&self) -> &'static str {
        match self {
            Self::Client => "Clientes",
            Self::Worker => "Trabajadores",
            Self::Site => "Obras",
            Self::Order => "Pedidos",
            Self::Replacement => "Reemplazos",
            Self::Relocation => "Traslados",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Client => "Client",
            Self::Worker => "Worker",
            Self::Site => "Site",
            Self::Order => "Order",
            Self::Replacement => "Replacement",
            Self::Relocation => "Relocation",
        }
    }

    pub fn plural(&self) -> &'static str {
        match self {
            Self::Client => "clients",
            Self::Worker => "workers",
            Self::Site => "sites",
            Self::Order => "orders",
            Self::Replacement => "replacements",
            Self::Relocation => "relocations",
        }
    }

    /// Parses singular or plural English names, case-insensitively.
    pub fn parse(input: &str) -> Option<Self> {
        let key = input.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|kind| {
            key == kind.plural() || key == kind.display_name().to_ascii_lowercase()
        })
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Uniform access to the pieces every entity carries.
pub trait Entity {
    const KIND: EntityKind;

    fn meta(&self) -> &RecordMeta;

    /// Short human label used in cross-links.
    fn label(&self) -> String;

    fn sp_id(&self) -> i64 {
        self.meta().sp_id
    }

    fn cross_link(&self) -> CrossLink {
        CrossLink::new(Self::KIND.table(), self.sp_id(), self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub name: String,
    pub company: String,
    pub industry: String,
    pub status: ClientStatus,
    pub tax_id: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worker {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub name: String,
    pub document_number: String,
    pub nationality: Option<String>,
    pub category: Option<String>,
    pub status: WorkerStatus,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub code: String,
    pub name: String,
    pub client_sp_id: Option<i64>,
    pub location: Option<String>,
    pub status: SiteStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub code: String,
    pub client_sp_id: Option<i64>,
    pub site_sp_id: Option<i64>,
    pub start_date: Option<NaiveDate>,
    pub estimated_end_date: Option<NaiveDate>,
    pub status: OrderStatus,
    pub salesperson_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replacement {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub code: String,
    pub client_sp_id: Option<i64>,
    pub order_sp_id: Option<i64>,
    pub worker_out_sp_id: Option<i64>,
    /// `None` until an incoming worker has been assigned.
    pub worker_in_sp_id: Option<i64>,
    pub reason: ReplacementReason,
    pub request_date: Option<NaiveDate>,
    pub status: ReplacementStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relocation {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub code: String,
    pub client_sp_id: Option<i64>,
    pub order_sp_id: Option<i64>,
    pub worker_sp_id: Option<i64>,
    pub origin_site_sp_id: Option<i64>,
    pub destination_site_sp_id: Option<i64>,
    pub movement_date: Option<NaiveDate>,
    pub reason: Option<String>,
    pub status: RelocationStatus,
}

impl Entity for Client {
    const KIND: EntityKind = EntityKind::Client;

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn label(&self) -> String {
        self.name.clone()
    }
}

impl Entity for Worker {
    const KIND: EntityKind = EntityKind::Worker;

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn label(&self) -> String {
        self.name.clone()
    }
}

impl Entity for Site {
    const KIND: EntityKind = EntityKind::Site;

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn label(&self) -> String {
        match (self.code.is_empty(), self.name.is_empty()) {
            (false, false) => format!("{} - {}", self.code, self.name),
            (true, _) => self.name.clone(),
            (false, true) => self.code.clone(),
        }
    }
}

impl Entity for Order {
    const KIND: EntityKind = EntityKind::Order;

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn label(&self) -> String {
        self.code.clone()
    }
}

impl Entity for Replacement {
    const KIND: EntityKind = EntityKind::Replacement;

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn label(&self) -> String {
        self.code.clone()
    }
}

impl Entity for Relocation {
    const KIND: EntityKind = EntityKind::Relocation;

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn label(&self) -> String {
        self.code.clone()
    }
}
