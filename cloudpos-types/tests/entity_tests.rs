use cloudpos_types::{
    CategoryFields, CustomerFields, EntityFields, EntityId, EntityType, OutboxOp, OutboxPayload,
    ProductFields, RemoteRow, Timestamp,
};
use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use serde_json::json;

// ── EntityType ───────────────────────────────────────────────────

#[test]
fn entity_type_names() {
    assert_eq!(EntityType::Product.as_str(), "product");
    assert_eq!(EntityType::Product.table(), "products");
    assert_eq!(EntityType::Category.table(), "categories");
    assert_eq!(EntityType::Customer.to_string(), "customer");
}

#[test]
fn entity_type_parses_singular_and_table_names() {
    assert_eq!("product".parse::<EntityType>().unwrap(), EntityType::Product);
    assert_eq!("customers".parse::<EntityType>().unwrap(), EntityType::Customer);
    assert!("sales".parse::<EntityType>().is_err());
}

#[test]
fn categories_come_before_products() {
    let all = EntityType::ALL;
    let cat = all.iter().position(|t| *t == EntityType::Category).unwrap();
    let prod = all.iter().position(|t| *t == EntityType::Product).unwrap();
    assert!(cat < prod);
}

#[test]
fn outbox_op_roundtrip() {
    for op in [OutboxOp::Upsert, OutboxOp::Delete] {
        assert_eq!(op.as_str().parse::<OutboxOp>().unwrap(), op);
    }
    assert!("truncate".parse::<OutboxOp>().is_err());
}

// ── Validation ───────────────────────────────────────────────────

#[test]
fn valid_product_passes() {
    let product = ProductFields::new("Espresso", 2.5, 10);
    assert!(product.validate().is_ok());
}

#[test]
fn product_rejects_blank_name() {
    assert!(ProductFields::new("   ", 1.0, 1).validate().is_err());
}

#[test]
fn product_rejects_negative_or_nan_price() {
    assert!(ProductFields::new("Tea", -0.5, 1).validate().is_err());
    assert!(ProductFields::new("Tea", f64::NAN, 1).validate().is_err());
}

#[test]
fn product_rejects_negative_stock() {
    assert!(ProductFields::new("Tea", 1.0, -1).validate().is_err());
}

#[test]
fn product_rejects_expiry_before_production() {
    let mut product = ProductFields::new("Milk", 1.2, 4);
    product.production_date = NaiveDate::from_ymd_opt(2024, 5, 10);
    product.expiration_date = NaiveDate::from_ymd_opt(2024, 5, 1);
    assert!(product.validate().is_err());
}

#[test]
fn customer_requires_phone() {
    assert!(CustomerFields::new("Ana", "").validate().is_err());
    assert!(CustomerFields::new("Ana", "+34 600 000 000").validate().is_ok());
}

#[test]
fn category_requires_name() {
    assert!(CategoryFields::new("").validate().is_err());
    assert!(CategoryFields::new("Drinks").validate().is_ok());
}

// ── Payload ──────────────────────────────────────────────────────

#[test]
fn payload_is_tagged_by_entity() {
    let payload = ProductFields::new("Espresso", 2.5, 10).into_payload();
    assert_eq!(payload.entity_type(), EntityType::Product);

    let json = serde_json::to_value(&payload).unwrap();
    assert_eq!(json["entity"], "product");
    assert_eq!(json["fields"]["name"], "Espresso");
}

#[test]
fn from_payload_checks_variant() {
    let payload = CategoryFields::new("Drinks").into_payload();
    assert!(ProductFields::from_payload(payload.clone()).is_none());
    assert_eq!(CategoryFields::from_payload(payload).unwrap().name, "Drinks");
}

#[test]
fn fields_json_is_untagged_object() {
    let payload = OutboxPayload::Customer(CustomerFields::new("Ana", "555"));
    let map = payload.fields_json().unwrap();
    assert_eq!(map["name"], "Ana");
    assert!(!map.contains_key("entity"));
}

// ── RemoteRow ────────────────────────────────────────────────────

#[test]
fn remote_row_from_postgrest_json() {
    let id = EntityId::new();
    let row = RemoteRow::from_json(
        EntityType::Product,
        json!({
            "id": id.to_string(),
            "name": "Latte",
            "price": 3.2,
            "stock_quantity": 5,
            "created_at": "2024-05-01T09:00:00+00:00",
            "updated_at": "2024-05-01T10:00:00.250+00:00",
            "is_deleted": true,
            "owner_id": "ignored"
        }),
    )
    .unwrap();

    assert_eq!(row.id, id);
    assert!(row.is_deleted);
    assert_eq!(row.updated_at, Some(Timestamp::parse_rfc3339("2024-05-01T10:00:00.250Z").unwrap()));
    match row.payload {
        OutboxPayload::Product(fields) => {
            assert_eq!(fields.name, "Latte");
            assert_eq!(fields.stock_quantity, 5);
        }
        other => panic!("expected product, got {other:?}"),
    }
}

#[test]
fn remote_row_defaults_missing_sync_columns() {
    let row = RemoteRow::from_json(
        EntityType::Category,
        json!({ "id": EntityId::new().to_string(), "name": "Snacks", "is_deleted": null }),
    )
    .unwrap();
    assert!(!row.is_deleted);
    assert!(row.updated_at.is_none());
    assert!(row.created_at.is_none());
}

#[test]
fn remote_row_reads_null_numeric_columns_as_zero() {
    let product = RemoteRow::from_json(
        EntityType::Product,
        json!({
            "id": EntityId::new().to_string(),
            "name": "Bread",
            "price": 2.5,
            "stock_quantity": null,
            "barcode": null,
            "updated_at": "2024-05-01T10:00:00Z"
        }),
    )
    .unwrap();
    match product.payload {
        OutboxPayload::Product(fields) => {
            assert_eq!(fields.stock_quantity, 0);
            assert!(fields.barcode.is_none());
        }
        other => panic!("expected product, got {other:?}"),
    }

    let customer = RemoteRow::from_json(
        EntityType::Customer,
        json!({
            "id": EntityId::new().to_string(),
            "name": "Ana",
            "phone": "555",
            "total_debt": null
        }),
    )
    .unwrap();
    match customer.payload {
        OutboxPayload::Customer(fields) => assert_eq!(fields.total_debt, 0.0),
        other => panic!("expected customer, got {other:?}"),
    }
}

#[test]
fn remote_row_still_requires_price() {
    let result = RemoteRow::from_json(
        EntityType::Product,
        json!({ "id": EntityId::new().to_string(), "name": "Bread", "price": null }),
    );
    assert!(result.is_err());
}

#[test]
fn remote_row_rejects_missing_id() {
    assert!(RemoteRow::from_json(EntityType::Category, json!({ "name": "x" })).is_err());
}
