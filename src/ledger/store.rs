//! Ledger primitives over Postgres. Every function takes the connection of an
//! open transaction; callers commit once both the lot and its record are
//! written. Lots are locked with `FOR UPDATE` before any read-modify-write.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgConnection;

use super::{apply_delta, issue, DuplicateGuard, LotKey, OperationType};
use crate::{
    error::{AppError, AppResult},
    models::{NewRecord, Record, ShenzhenRecord, Stock},
    utils::generate_unique_id,
};

/// Which movement log a duplicate check looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Journal {
    Main,
    Shenzhen,
}

impl Journal {
    fn table(self) -> &'static str {
        match self {
            Journal::Main => "records",
            Journal::Shenzhen => "shenzhen_records",
        }
    }
}

const LOT_MATCH: &str = r#"
    merchant_id = $1
    AND product_id = $2
    AND box_spec = $3
    AND batch_number IS NOT DISTINCT FROM $4
    AND location IS NOT DISTINCT FROM $5
    AND expiry_date IS NOT DISTINCT FROM $6
"#;

pub async fn product_exists(
    conn: &mut PgConnection,
    merchant_id: i32,
    product_id: &str,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM products WHERE id = $1 AND merchant_id = $2)",
    )
    .bind(product_id)
    .bind(merchant_id)
    .fetch_one(conn)
    .await
}

pub async fn ensure_product(
    conn: &mut PgConnection,
    merchant_id: i32,
    product_id: &str,
) -> AppResult<()> {
    if product_exists(conn, merchant_id, product_id).await? {
        Ok(())
    } else {
        Err(AppError::not_found(format!("product {} not found", product_id)))
    }
}

/// Rejects a movement repeating one logged within the guard's window.
pub async fn guard_duplicate(
    conn: &mut PgConnection,
    guard: &DuplicateGuard,
    journal: Journal,
    merchant_id: i32,
    product_id: &str,
    op: OperationType,
    quantity: i32,
) -> AppResult<()> {
    let sql = format!(
        "SELECT MAX(date) FROM {} \
         WHERE merchant_id = $1 AND product_id = $2 AND operation_type = $3 AND quantity = $4",
        journal.table()
    );
    let last_seen = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(&sql)
        .bind(merchant_id)
        .bind(product_id)
        .bind(op)
        .bind(quantity)
        .fetch_one(conn)
        .await?;

    guard.check(last_seen, Utc::now()).map_err(|e| {
        log::warn!(
            "duplicate {} submission for product {} (quantity {})",
            op.label(),
            product_id,
            quantity
        );
        AppError::from(e)
    })
}

/// Locks the lot matching `key` exactly. With `in_stock_only`, lots at zero
/// are treated as absent.
pub async fn lock_lot(
    conn: &mut PgConnection,
    merchant_id: i32,
    key: &LotKey,
    in_stock_only: bool,
) -> Result<Option<Stock>, sqlx::Error> {
    let sql = format!(
        "SELECT * FROM stocks WHERE {}{} FOR UPDATE",
        LOT_MATCH,
        if in_stock_only { " AND quantity > 0" } else { "" }
    );
    sqlx::query_as::<_, Stock>(&sql)
        .bind(merchant_id)
        .bind(&key.product_id)
        .bind(&key.box_spec)
        .bind(&key.batch_number)
        .bind(&key.location)
        .bind(key.expiry_date)
        .fetch_optional(conn)
        .await
}

/// Adds `quantity` to the lot, creating it when missing. A given unit price
/// replaces the stored one.
pub async fn upsert_lot(
    conn: &mut PgConnection,
    merchant_id: i32,
    key: &LotKey,
    quantity: i32,
    unit_price: Option<Decimal>,
) -> Result<Stock, sqlx::Error> {
    sqlx::query_as::<_, Stock>(
        r#"
        INSERT INTO stocks (merchant_id, product_id, box_spec, batch_number, location, expiry_date, quantity, unit_price)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT ON CONSTRAINT stocks_lot_key
        DO UPDATE SET
            quantity = stocks.quantity + EXCLUDED.quantity,
            unit_price = COALESCE(EXCLUDED.unit_price, stocks.unit_price)
        RETURNING *
        "#,
    )
    .bind(merchant_id)
    .bind(&key.product_id)
    .bind(&key.box_spec)
    .bind(&key.batch_number)
    .bind(&key.location)
    .bind(key.expiry_date)
    .bind(quantity)
    .bind(unit_price)
    .fetch_one(conn)
    .await
}

async fn set_quantity(
    conn: &mut PgConnection,
    stock_id: i32,
    quantity: i32,
) -> Result<Stock, sqlx::Error> {
    sqlx::query_as::<_, Stock>("UPDATE stocks SET quantity = $2 WHERE id = $1 RETURNING *")
        .bind(stock_id)
        .bind(quantity)
        .fetch_one(conn)
        .await
}

/// Takes `quantity` out of an in-stock lot matching `key` exactly.
pub async fn take_from_lot(
    conn: &mut PgConnection,
    merchant_id: i32,
    key: &LotKey,
    quantity: i32,
) -> AppResult<Stock> {
    let lot = lock_lot(conn, merchant_id, key, true)
        .await?
        .ok_or_else(|| AppError::not_found("no stock matches this product, box spec and lot"))?;

    let remaining = issue(lot.quantity, quantity)?;
    Ok(set_quantity(conn, lot.id, remaining).await?)
}

/// Applies a signed change to the lot matching `key`. A missing lot is
/// created only when `create_missing` is set and the change is positive.
pub async fn adjust_lot(
    conn: &mut PgConnection,
    merchant_id: i32,
    key: &LotKey,
    delta: i32,
    create_missing: bool,
    unit_price: Option<Decimal>,
) -> AppResult<Stock> {
    match lock_lot(conn, merchant_id, key, false).await? {
        Some(lot) => {
            let next = apply_delta(lot.quantity, delta)?;
            Ok(set_quantity(conn, lot.id, next).await?)
        }
        None if create_missing && delta > 0 => {
            Ok(upsert_lot(conn, merchant_id, key, delta, unit_price).await?)
        }
        None => Err(AppError::not_found("no stock row matches this record")),
    }
}

pub async fn insert_record(
    conn: &mut PgConnection,
    record: &NewRecord,
) -> Result<Record, sqlx::Error> {
    let now = Utc::now();
    sqlx::query_as::<_, Record>(
        r#"
        INSERT INTO records (
            id, product_id, operation_type, quantity, date, reason,
            box_spec, batch_number, expiry_date, location, unit_price,
            merchant_id, operator_id
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        RETURNING *
        "#,
    )
    .bind(generate_unique_id(now))
    .bind(&record.lot.product_id)
    .bind(record.operation_type)
    .bind(record.quantity)
    .bind(now)
    .bind(&record.reason)
    .bind(&record.lot.box_spec)
    .bind(&record.lot.batch_number)
    .bind(record.lot.expiry_date)
    .bind(&record.lot.location)
    .bind(record.unit_price)
    .bind(record.merchant_id)
    .bind(record.operator_id)
    .fetch_one(conn)
    .await
}

pub async fn insert_shenzhen_record(
    conn: &mut PgConnection,
    record: &NewRecord,
) -> Result<ShenzhenRecord, sqlx::Error> {
    let now = Utc::now();
    sqlx::query_as::<_, ShenzhenRecord>(
        r#"
        INSERT INTO shenzhen_records (
            id, product_id, operation_type, quantity, date,
            box_spec, batch_number, expiry_date, reason, merchant_id, operator_id
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING *
        "#,
    )
    .bind(generate_unique_id(now))
    .bind(&record.lot.product_id)
    .bind(record.operation_type)
    .bind(record.quantity)
    .bind(now)
    .bind(&record.lot.box_spec)
    .bind(&record.lot.batch_number)
    .bind(record.lot.expiry_date)
    .bind(&record.reason)
    .bind(record.merchant_id)
    .bind(record.operator_id)
    .fetch_one(conn)
    .await
}

pub async fn lock_record(
    conn: &mut PgConnection,
    merchant_id: i32,
    record_id: &str,
) -> AppResult<Record> {
    sqlx::query_as::<_, Record>(
        "SELECT * FROM records WHERE id = $1 AND merchant_id = $2 FOR UPDATE",
    )
    .bind(record_id)
    .bind(merchant_id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| AppError::not_found(format!("record {} not found", record_id)))
}

/// New values for an edited record; the lot fields replace the old ones.
#[derive(Debug, Clone)]
pub struct RecordUpdate {
    pub quantity: i32,
    pub reason: String,
    pub lot: LotKey,
}

pub async fn update_record(
    conn: &mut PgConnection,
    record_id: &str,
    update: &RecordUpdate,
) -> Result<Record, sqlx::Error> {
    sqlx::query_as::<_, Record>(
        r#"
        UPDATE records
        SET quantity = $2, reason = $3, box_spec = $4, batch_number = $5, expiry_date = $6
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(record_id)
    .bind(update.quantity)
    .bind(&update.reason)
    .bind(&update.lot.box_spec)
    .bind(&update.lot.batch_number)
    .bind(update.lot.expiry_date)
    .fetch_one(conn)
    .await
}

pub async fn delete_record(conn: &mut PgConnection, record_id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM records WHERE id = $1")
        .bind(record_id)
        .execute(conn)
        .await?;
    Ok(())
}
