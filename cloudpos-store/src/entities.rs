//! Entity tables: local mutations and the merge primitives used by sync.
//!
//! Every local mutation writes the row and appends its outbox entry in one
//! transaction. Deletes are soft: the row stays as a tombstone so the delete
//! can be pushed and so a stale remote copy cannot resurrect it.

use crate::error::{StorageError, StorageResult};
use crate::outbox::Outbox;
use crate::store::LocalStore;
use cloudpos_types::{
    CategoryFields, CustomerFields, EntityFields, EntityId, EntityType, OutboxOp, OutboxPayload,
    ProductFields, Record, RemoteRow, SyncMeta, Timestamp,
};
use rusqlite::types::{Type, Value};
use rusqlite::{Connection, OptionalExtension, Row, params_from_iter};
use serde::Serialize;
use std::str::FromStr;
use tracing::{debug, trace};

const META_COLUMNS: [&str; 4] = ["created_at", "local_updated_at", "remote_updated_at", "is_deleted"];

/// Reads a text column and parses it with `FromStr`.
pub(crate) fn parse_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Like [`parse_col`] but `NULL` maps to `None`.
pub(crate) fn parse_opt_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        s.parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn opt_text<T: ToString>(value: Option<&T>) -> Value {
    value.map_or(Value::Null, |v| Value::Text(v.to_string()))
}

/// Column mapping for a fields struct.
///
/// `COLUMNS` lists the domain columns in the order `to_values` produces
/// them and `from_row_at` reads them.
pub trait TableFields: EntityFields {
    const COLUMNS: &'static [&'static str];

    fn to_values(&self) -> Vec<Value>;

    fn from_row_at(row: &Row<'_>, offset: usize) -> rusqlite::Result<Self>;
}

impl TableFields for CategoryFields {
    const COLUMNS: &'static [&'static str] = &["name", "description"];

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.name.clone()),
            opt_text(self.description.as_ref()),
        ]
    }

    fn from_row_at(row: &Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            name: row.get(offset)?,
            description: row.get(offset + 1)?,
        })
    }
}

impl TableFields for ProductFields {
    const COLUMNS: &'static [&'static str] = &[
        "name",
        "description",
        "price",
        "stock_quantity",
        "category_id",
        "barcode",
        "sku",
        "production_date",
        "expiration_date",
    ];

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.name.clone()),
            opt_text(self.description.as_ref()),
            Value::Real(self.price),
            Value::Integer(self.stock_quantity),
            opt_text(self.category_id.as_ref()),
            opt_text(self.barcode.as_ref()),
            opt_text(self.sku.as_ref()),
            opt_text(self.production_date.as_ref()),
            opt_text(self.expiration_date.as_ref()),
        ]
    }

    fn from_row_at(row: &Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            name: row.get(offset)?,
            description: row.get(offset + 1)?,
            price: row.get(offset + 2)?,
            stock_quantity: row.get(offset + 3)?,
            category_id: parse_opt_col(row, offset + 4)?,
            barcode: row.get(offset + 5)?,
            sku: row.get(offset + 6)?,
            production_date: parse_opt_col(row, offset + 7)?,
            expiration_date: parse_opt_col(row, offset + 8)?,
        })
    }
}

impl TableFields for CustomerFields {
    const COLUMNS: &'static [&'static str] = &["name", "phone", "email", "address", "total_debt"];

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.name.clone()),
            Value::Text(self.phone.clone()),
            opt_text(self.email.as_ref()),
            opt_text(self.address.as_ref()),
            Value::Real(self.total_debt),
        ]
    }

    fn from_row_at(row: &Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            name: row.get(offset)?,
            phone: row.get(offset + 1)?,
            email: row.get(offset + 2)?,
            address: row.get(offset + 3)?,
            total_debt: row.get(offset + 4)?,
        })
    }
}

fn select_columns<F: TableFields>(prefix: &str) -> String {
    std::iter::once("id")
        .chain(F::COLUMNS.iter().copied())
        .chain(META_COLUMNS)
        .map(|c| format!("{prefix}{c}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn record_from_row<F: TableFields>(row: &Row<'_>) -> rusqlite::Result<Record<F>> {
    let n = F::COLUMNS.len();
    Ok(Record {
        id: parse_col(row, 0)?,
        fields: F::from_row_at(row, 1)?,
        meta: SyncMeta {
            created_at: parse_col(row, n + 1)?,
            local_updated_at: parse_col(row, n + 2)?,
            remote_updated_at: parse_opt_col(row, n + 3)?,
            is_deleted: row.get(n + 4)?,
        },
    })
}

fn select_record<F: TableFields>(conn: &Connection, id: EntityId) -> StorageResult<Option<Record<F>>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE id = ?1",
        select_columns::<F>(""),
        F::ENTITY.table()
    );
    Ok(conn
        .query_row(&sql, [id.to_string()], record_from_row::<F>)
        .optional()?)
}

/// Inserts a full row. With `replace` set, an existing row with the same id
/// is overwritten in place (its `created_at` is kept).
fn write_record<F: TableFields>(
    conn: &Connection,
    id: EntityId,
    fields: &F,
    meta: &SyncMeta,
    replace: bool,
) -> StorageResult<()> {
    let columns: Vec<&str> = std::iter::once("id")
        .chain(F::COLUMNS.iter().copied())
        .chain(META_COLUMNS)
        .collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        F::ENTITY.table(),
        columns.join(", "),
        placeholders.join(", ")
    );
    if replace {
        let updates: Vec<String> = F::COLUMNS
            .iter()
            .chain(&["local_updated_at", "remote_updated_at", "is_deleted"])
            .map(|c| format!("{c} = excluded.{c}"))
            .collect();
        sql.push_str(&format!(" ON CONFLICT(id) DO UPDATE SET {}", updates.join(", ")));
    }

    let mut values = Vec::with_capacity(columns.len());
    values.push(Value::Text(id.to_string()));
    values.extend(fields.to_values());
    values.push(Value::Text(meta.created_at.to_rfc3339()));
    values.push(Value::Text(meta.local_updated_at.to_rfc3339()));
    values.push(opt_text(meta.remote_updated_at.as_ref()));
    values.push(Value::Integer(i64::from(meta.is_deleted)));

    conn.execute(&sql, params_from_iter(values))?;
    Ok(())
}

fn live_record<F: TableFields>(conn: &Connection, id: EntityId) -> StorageResult<Record<F>> {
    select_record::<F>(conn, id)?
        .filter(|record| !record.meta.is_deleted)
        .ok_or_else(|| StorageError::NotFound(format!("{} {}", F::ENTITY, id)))
}

/// A live product joined with its category's name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductListing {
    #[serde(flatten)]
    pub product: Record<ProductFields>,
    /// `None` when the product has no category or the category is gone.
    pub category_name: Option<String>,
}

/// Typed access to the entity tables.
#[derive(Debug, Clone)]
pub struct EntityStore {
    store: LocalStore,
}

impl EntityStore {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    /// Inserts a new row and queues its upsert.
    pub fn create<F: TableFields>(&self, fields: F) -> StorageResult<Record<F>> {
        fields.validate()?;
        let now = Timestamp::now();
        let record = Record {
            id: EntityId::new(),
            fields,
            meta: SyncMeta {
                created_at: now,
                local_updated_at: now,
                remote_updated_at: None,
                is_deleted: false,
            },
        };

        self.store.transaction(|tx| {
            write_record(tx, record.id, &record.fields, &record.meta, false)?;
            Outbox::enqueue(
                tx,
                OutboxOp::Upsert,
                record.id,
                &record.fields.clone().into_payload(),
                now,
            )?;
            Ok(())
        })?;
        debug!("Created {} {}", F::ENTITY, record.id);
        Ok(record)
    }

    /// Replaces the fields of a live row and queues its upsert.
    ///
    /// The new `local_updated_at` is strictly greater than the previous one
    /// even if the wall clock went backwards.
    pub fn update<F: TableFields>(&self, id: EntityId, fields: F) -> StorageResult<Record<F>> {
        fields.validate()?;
        let record = self.store.transaction(|tx| {
            let existing = live_record::<F>(tx, id)?;
            let at = existing.meta.local_updated_at.tick();

            let assignments: Vec<String> = F::COLUMNS
                .iter()
                .enumerate()
                .map(|(i, c)| format!("{c} = ?{}", i + 1))
                .collect();
            let n = F::COLUMNS.len();
            let sql = format!(
                "UPDATE {} SET {}, local_updated_at = ?{} WHERE id = ?{}",
                F::ENTITY.table(),
                assignments.join(", "),
                n + 1,
                n + 2
            );
            let mut values = fields.to_values();
            values.push(Value::Text(at.to_rfc3339()));
            values.push(Value::Text(id.to_string()));
            tx.execute(&sql, params_from_iter(values))?;

            Outbox::enqueue(tx, OutboxOp::Upsert, id, &fields.clone().into_payload(), at)?;
            Ok(Record {
                id,
                fields,
                meta: SyncMeta {
                    local_updated_at: at,
                    ..existing.meta
                },
            })
        })?;
        debug!("Updated {} {}", F::ENTITY, id);
        Ok(record)
    }

    /// Tombstones a live row and queues its delete.
    pub fn delete<F: TableFields>(&self, id: EntityId) -> StorageResult<()> {
        self.store.transaction(|tx| {
            let existing = live_record::<F>(tx, id)?;
            let at = existing.meta.local_updated_at.tick();
            tx.execute(
                &format!(
                    "UPDATE {} SET is_deleted = 1, local_updated_at = ?1 WHERE id = ?2",
                    F::ENTITY.table()
                ),
                [at.to_rfc3339(), id.to_string()],
            )?;
            Outbox::enqueue(tx, OutboxOp::Delete, id, &existing.fields.into_payload(), at)?;
            Ok(())
        })?;
        debug!("Deleted {} {}", F::ENTITY, id);
        Ok(())
    }

    /// Fetches a row by id, tombstones included.
    pub fn get<F: TableFields>(&self, id: EntityId) -> StorageResult<Option<Record<F>>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = ?1",
            select_columns::<F>(""),
            F::ENTITY.table()
        );
        Ok(self
            .store
            .query_map(&sql, [id.to_string()], record_from_row::<F>)?
            .into_iter()
            .next())
    }

    /// All live rows ordered by name.
    pub fn list<F: TableFields>(&self) -> StorageResult<Vec<Record<F>>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE is_deleted = 0 ORDER BY name COLLATE NOCASE, id",
            select_columns::<F>(""),
            F::ENTITY.table()
        );
        self.store.query_map(&sql, [], record_from_row::<F>)
    }

    /// Live products with the name of their (live) category.
    pub fn products_with_category(&self) -> StorageResult<Vec<ProductListing>> {
        let name_idx = ProductFields::COLUMNS.len() + META_COLUMNS.len() + 1;
        let sql = format!(
            "SELECT {}, c.name FROM products p
             LEFT JOIN categories c ON c.id = p.category_id AND c.is_deleted = 0
             WHERE p.is_deleted = 0
             ORDER BY p.name COLLATE NOCASE, p.id",
            select_columns::<ProductFields>("p.")
        );
        self.store.query_map(&sql, [], |row| {
            Ok(ProductListing {
                product: record_from_row(row)?,
                category_name: row.get(name_idx)?,
            })
        })
    }

    /// The underlying store handle.
    pub fn store(&self) -> &LocalStore {
        &self.store
    }
}

/// `local_updated_at` of a row, or `None` if the row does not exist.
pub fn local_updated_at(
    conn: &Connection,
    entity_type: EntityType,
    id: EntityId,
) -> StorageResult<Option<Timestamp>> {
    let sql = format!(
        "SELECT local_updated_at FROM {} WHERE id = ?1",
        entity_type.table()
    );
    Ok(conn
        .query_row(&sql, [id.to_string()], |row| parse_col::<Timestamp>(row, 0))
        .optional()?)
}

/// Writes a remote row that won the merge, tombstone flag included.
///
/// Both `local_updated_at` and `remote_updated_at` become the remote
/// `updated_at`, so applying the same row again changes nothing. No outbox
/// entry is created.
pub fn apply_remote(conn: &Connection, row: &RemoteRow) -> StorageResult<()> {
    let updated_at = row.updated_at.ok_or_else(|| {
        StorageError::InvalidData(format!(
            "remote {} {} has no updated_at",
            row.entity_type(),
            row.id
        ))
    })?;
    row.payload.validate()?;

    let meta = SyncMeta {
        created_at: row.created_at.unwrap_or(updated_at),
        local_updated_at: updated_at,
        remote_updated_at: Some(updated_at),
        is_deleted: row.is_deleted,
    };
    match &row.payload {
        OutboxPayload::Category(fields) => write_record(conn, row.id, fields, &meta, true)?,
        OutboxPayload::Product(fields) => write_record(conn, row.id, fields, &meta, true)?,
        OutboxPayload::Customer(fields) => write_record(conn, row.id, fields, &meta, true)?,
    }
    trace!("Applied remote {} {}", row.entity_type(), row.id);
    Ok(())
}

/// Records that the remote accepted the row at `at`. Returns rows touched.
pub fn mark_pushed(
    conn: &Connection,
    entity_type: EntityType,
    id: EntityId,
    at: Timestamp,
) -> StorageResult<usize> {
    let sql = format!(
        "UPDATE {} SET remote_updated_at = ?1 WHERE id = ?2",
        entity_type.table()
    );
    Ok(conn.execute(&sql, [at.to_rfc3339(), id.to_string()])?)
}
