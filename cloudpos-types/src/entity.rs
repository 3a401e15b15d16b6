//! Typed records for the entity tables that take part in sync.
//!
//! Every synced table carries domain columns plus the same four sync
//! attributes (`local_updated_at`, `remote_updated_at`, `is_deleted` and
//! `created_at`). The domain half is a per-entity fields struct; the sync half
//! is [`SyncMeta`]. [`Record`] glues the two together.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{EntityId, Error, Result, Timestamp};

/// The entity types tracked by the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Category,
    Product,
    Customer,
}

impl EntityType {
    /// All entity types in dependency order (categories before the products
    /// that reference them).
    pub const ALL: [EntityType; 3] = [EntityType::Category, EntityType::Product, EntityType::Customer];

    /// Singular tag stored in the outbox (`"product"`).
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            EntityType::Category => "category",
            EntityType::Product => "product",
            EntityType::Customer => "customer",
        }
    }

    /// Table name, identical locally and remotely (`"products"`).
    #[must_use]
    pub const fn table(&self) -> &'static str {
        match self {
            EntityType::Category => "categories",
            EntityType::Product => "products",
            EntityType::Customer => "customers",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "category" | "categories" => Ok(EntityType::Category),
            "product" | "products" => Ok(EntityType::Product),
            "customer" | "customers" => Ok(EntityType::Customer),
            other => Err(Error::Validation(format!("unknown entity type: {other}"))),
        }
    }
}

/// Reads an explicit JSON `null` as the type's default, for nullable remote
/// columns that map to non-optional fields.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Domain columns of a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductFields {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub stock_quantity: i64,
    #[serde(default)]
    pub category_id: Option<EntityId>,
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub production_date: Option<NaiveDate>,
    #[serde(default)]
    pub expiration_date: Option<NaiveDate>,
}

impl ProductFields {
    /// A product with only the required columns set.
    pub fn new(name: impl Into<String>, price: f64, stock_quantity: i64) -> Self {
        Self {
            name: name.into(),
            description: None,
            price,
            stock_quantity,
            category_id: None,
            barcode: None,
            sku: None,
            production_date: None,
            expiration_date: None,
        }
    }
}

/// Domain columns of a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryFields {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl CategoryFields {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }
}

/// Domain columns of a customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerFields {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_debt: f64,
}

impl CustomerFields {
    pub fn new(name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phone: phone.into(),
            email: None,
            address: None,
            total_debt: 0.0,
        }
    }
}

/// Implemented by every per-entity fields struct.
///
/// Ties a fields type to its [`EntityType`] and to its variant of
/// [`OutboxPayload`], and validates the values before they reach storage.
pub trait EntityFields: Clone + Sized + Send + 'static {
    /// The entity type these fields belong to.
    const ENTITY: EntityType;

    /// Checks domain invariants.
    fn validate(&self) -> Result<()>;

    /// Wraps the fields in their payload variant.
    fn into_payload(self) -> OutboxPayload;

    /// Extracts the fields from a payload of the matching variant.
    fn from_payload(payload: OutboxPayload) -> Option<Self>;

    /// Display name, used for ordering listings.
    fn name(&self) -> &str;
}

fn require_name(entity: EntityType, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::Validation(format!("{entity} name must not be empty")));
    }
    Ok(())
}

fn require_amount(entity: EntityType, field: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(Error::Validation(format!(
            "{entity} {field} must be a non-negative number, got {value}"
        )));
    }
    Ok(())
}

impl EntityFields for ProductFields {
    const ENTITY: EntityType = EntityType::Product;

    fn validate(&self) -> Result<()> {
        require_name(Self::ENTITY, &self.name)?;
        require_amount(Self::ENTITY, "price", self.price)?;
        if self.stock_quantity < 0 {
            return Err(Error::Validation(format!(
                "product stock_quantity must not be negative, got {}",
                self.stock_quantity
            )));
        }
        if let (Some(produced), Some(expires)) = (self.production_date, self.expiration_date) {
            if expires < produced {
                return Err(Error::Validation(
                    "product expiration_date is before production_date".into(),
                ));
            }
        }
        Ok(())
    }

    fn into_payload(self) -> OutboxPayload {
        OutboxPayload::Product(self)
    }

    fn from_payload(payload: OutboxPayload) -> Option<Self> {
        match payload {
            OutboxPayload::Product(fields) => Some(fields),
            _ => None,
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl EntityFields for CategoryFields {
    const ENTITY: EntityType = EntityType::Category;

    fn validate(&self) -> Result<()> {
        require_name(Self::ENTITY, &self.name)
    }

    fn into_payload(self) -> OutboxPayload {
        OutboxPayload::Category(self)
    }

    fn from_payload(payload: OutboxPayload) -> Option<Self> {
        match payload {
            OutboxPayload::Category(fields) => Some(fields),
            _ => None,
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl EntityFields for CustomerFields {
    const ENTITY: EntityType = EntityType::Customer;

    fn validate(&self) -> Result<()> {
        require_name(Self::ENTITY, &self.name)?;
        if self.phone.trim().is_empty() {
            return Err(Error::Validation("customer phone must not be empty".into()));
        }
        require_amount(Self::ENTITY, "total_debt", self.total_debt)
    }

    fn into_payload(self) -> OutboxPayload {
        OutboxPayload::Customer(self)
    }

    fn from_payload(payload: OutboxPayload) -> Option<Self> {
        match payload {
            OutboxPayload::Customer(fields) => Some(fields),
            _ => None,
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Sync bookkeeping shared by every entity table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMeta {
    pub created_at: Timestamp,
    /// Most recent local mutation (or the remote version that replaced it).
    pub local_updated_at: Timestamp,
    /// Last time the remote store is known to have accepted this row.
    pub remote_updated_at: Option<Timestamp>,
    /// Tombstone flag.
    pub is_deleted: bool,
}

/// A full row of an entity table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<F> {
    pub id: EntityId,
    #[serde(flatten)]
    pub fields: F,
    #[serde(flatten)]
    pub meta: SyncMeta,
}

/// Kind of mutation recorded in the outbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxOp {
    Upsert,
    Delete,
}

impl OutboxOp {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            OutboxOp::Upsert => "upsert",
            OutboxOp::Delete => "delete",
        }
    }
}

impl fmt::Display for OutboxOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutboxOp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "upsert" => Ok(OutboxOp::Upsert),
            "delete" => Ok(OutboxOp::Delete),
            other => Err(Error::Validation(format!("unknown outbox op: {other}"))),
        }
    }
}

/// Entity fields tagged with their entity type.
///
/// Carried by outbox entries (the row as of the mutation) and by remote rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity", content = "fields", rename_all = "snake_case")]
pub enum OutboxPayload {
    Category(CategoryFields),
    Product(ProductFields),
    Customer(CustomerFields),
}

impl OutboxPayload {
    /// The entity type of the wrapped fields.
    #[must_use]
    pub const fn entity_type(&self) -> EntityType {
        match self {
            OutboxPayload::Category(_) => EntityType::Category,
            OutboxPayload::Product(_) => EntityType::Product,
            OutboxPayload::Customer(_) => EntityType::Customer,
        }
    }

    /// Validates the wrapped fields.
    pub fn validate(&self) -> Result<()> {
        match self {
            OutboxPayload::Category(fields) => fields.validate(),
            OutboxPayload::Product(fields) => fields.validate(),
            OutboxPayload::Customer(fields) => fields.validate(),
        }
    }

    /// The wrapped fields as a flat JSON object (no tag).
    pub fn fields_json(&self) -> Result<serde_json::Map<String, serde_json::Value>> {
        let value = match self {
            OutboxPayload::Category(fields) => serde_json::to_value(fields)?,
            OutboxPayload::Product(fields) => serde_json::to_value(fields)?,
            OutboxPayload::Customer(fields) => serde_json::to_value(fields)?,
        };
        match value {
            serde_json::Value::Object(map) => Ok(map),
            other => Err(Error::Validation(format!("fields did not serialize to an object: {other}"))),
        }
    }

    /// Decodes untagged fields for the given entity type. Unknown keys are ignored.
    pub fn from_fields_json(entity_type: EntityType, value: serde_json::Value) -> Result<Self> {
        Ok(match entity_type {
            EntityType::Category => OutboxPayload::Category(serde_json::from_value(value)?),
            EntityType::Product => OutboxPayload::Product(serde_json::from_value(value)?),
            EntityType::Customer => OutboxPayload::Customer(serde_json::from_value(value)?),
        })
    }
}
