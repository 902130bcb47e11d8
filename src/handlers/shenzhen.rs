use axum::extract::{Query, State};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    extract::Json,
    ledger::{
        blank_to_none, parse_date, parse_optional_date, parse_quantity, store, store::Journal,
        LotKey, OperationType, SHENZHEN_LOCATION,
    },
    middleware::CurrentUser,
    models::{Capability, NewRecord, ShenzhenRecordView, StockSummary, StockView},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct ProductFilter {
    product_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ShenzhenIncomingRequest {
    product_id: String,
    box_spec: String,
    quantity: Value,
    batch_number: Option<String>,
    expiry_date: String,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ShenzhenOutgoingRequest {
    product_id: Option<String>,
    box_spec: Option<String>,
    quantity: Option<Value>,
    batch_number: Option<String>,
    expiry_date: Option<String>,
    outgoing_reason: Option<String>,
}

impl ShenzhenOutgoingRequest {
    fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("product_id", self.product_id.is_none()),
            ("box_spec", self.box_spec.is_none()),
            ("quantity", self.quantity.is_none()),
            ("outgoing_reason", self.outgoing_reason.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, missing)| missing.then_some(name))
        .collect()
    }
}

fn shenzhen_lot(
    product_id: String,
    box_spec: String,
    batch_number: Option<String>,
    expiry_date: Option<NaiveDate>,
) -> LotKey {
    LotKey {
        product_id,
        box_spec,
        batch_number: blank_to_none(batch_number),
        location: Some(SHENZHEN_LOCATION.to_string()),
        expiry_date,
    }
}

/// Shenzhen lots still holding stock.
pub async fn shenzhen_stock(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(filter): Query<ProductFilter>,
) -> AppResult<Json<Vec<StockView>>> {
    user.require(Capability::StockView)?;
    let merchant_id = user.merchant_id()?;

    let stock = sqlx::query_as::<_, StockView>(
        r#"
        SELECT s.id, s.product_id, p.name, p.category, p.supplier, p.unit,
               s.box_spec, s.quantity, s.batch_number, s.expiry_date, s.in_transit,
               s.daily_consumption, s.location, s.unit_price, s.shenzhen_stock,
               s.merchant_id, m.name AS merchant_name
        FROM stocks s
        JOIN products p ON p.id = s.product_id AND p.merchant_id = s.merchant_id
        JOIN merchants m ON m.id = s.merchant_id
        WHERE s.merchant_id = $1 AND s.location = $2 AND s.quantity > 0
          AND ($3::TEXT IS NULL OR s.product_id = $3)
        ORDER BY s.product_id, s.expiry_date
        "#,
    )
    .bind(merchant_id)
    .bind(SHENZHEN_LOCATION)
    .bind(filter.product_id.filter(|p| !p.is_empty()))
    .fetch_all(&state.db)
    .await?;

    Ok(Json(stock))
}

pub async fn shenzhen_records(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(filter): Query<ProductFilter>,
) -> AppResult<Json<Vec<ShenzhenRecordView>>> {
    user.require(Capability::RecordsView)?;
    let merchant_id = user.merchant_id()?;

    let records = sqlx::query_as::<_, ShenzhenRecordView>(
        r#"
        SELECT r.id, r.product_id, r.operation_type, r.quantity, r.date, r.box_spec,
               r.batch_number, r.expiry_date, r.reason, u.username AS operator
        FROM shenzhen_records r
        LEFT JOIN users u ON u.id = r.operator_id
        WHERE r.merchant_id = $1 AND ($2::TEXT IS NULL OR r.product_id = $2)
        ORDER BY r.date DESC
        "#,
    )
    .bind(merchant_id)
    .bind(filter.product_id.filter(|p| !p.is_empty()))
    .fetch_all(&state.db)
    .await?;

    Ok(Json(records))
}

pub async fn shenzhen_incoming(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<ShenzhenIncomingRequest>,
) -> AppResult<Json<Value>> {
    user.require(Capability::IncomingOperate)?;
    let merchant_id = user.merchant_id()?;

    let quantity = parse_quantity(&req.quantity)?;
    let expiry_date = parse_date(&req.expiry_date)?;

    let mut tx = state.db.begin().await?;
    store::ensure_product(&mut tx, merchant_id, &req.product_id).await?;
    store::guard_duplicate(
        &mut tx,
        &state.duplicate_guard(),
        Journal::Shenzhen,
        merchant_id,
        &req.product_id,
        OperationType::Inbound,
        quantity,
    )
    .await?;

    let lot = shenzhen_lot(req.product_id, req.box_spec, req.batch_number, Some(expiry_date));
    let stock = store::upsert_lot(&mut tx, merchant_id, &lot, quantity, None).await?;
    let record = store::insert_shenzhen_record(
        &mut tx,
        &NewRecord {
            operation_type: OperationType::Inbound,
            quantity,
            reason: req.reason.unwrap_or_default(),
            lot,
            unit_price: None,
            merchant_id,
            operator_id: Some(user.id),
        },
    )
    .await?;

    tx.commit().await?;

    log::info!(
        "shenzhen inbound {} x{} into stock {} (record {}, merchant {}, by {})",
        record.product_id, quantity, stock.id, record.id, merchant_id, user.username
    );

    Ok(Json(json!({
        "success": true,
        "message": "shenzhen inbound recorded",
        "stock": StockSummary::from(&stock),
        "record": record,
    })))
}

pub async fn shenzhen_outgoing(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<ShenzhenOutgoingRequest>,
) -> AppResult<Json<Value>> {
    user.require(Capability::OutgoingOperate)?;

    let missing = req.missing_fields();
    let (Some(product_id), Some(box_spec), Some(quantity), Some(reason)) =
        (req.product_id, req.box_spec, req.quantity, req.outgoing_reason)
    else {
        return Err(AppError::MissingFields(missing));
    };

    let merchant_id = user.merchant_id()?;
    let quantity = parse_quantity(&quantity)?;
    let expiry_date = parse_optional_date(req.expiry_date.as_deref())?;

    let mut tx = state.db.begin().await?;
    store::guard_duplicate(
        &mut tx,
        &state.duplicate_guard(),
        Journal::Shenzhen,
        merchant_id,
        &product_id,
        OperationType::Outbound,
        quantity,
    )
    .await?;

    let requested = shenzhen_lot(product_id, box_spec, req.batch_number, expiry_date);
    let stock = store::take_from_lot(&mut tx, merchant_id, &requested, quantity).await?;
    let record = store::insert_shenzhen_record(
        &mut tx,
        &NewRecord {
            operation_type: OperationType::Outbound,
            quantity,
            reason,
            lot: stock.lot_key(),
            unit_price: stock.unit_price,
            merchant_id,
            operator_id: Some(user.id),
        },
    )
    .await?;

    tx.commit().await?;

    log::info!(
        "shenzhen outbound {} x{} from stock {} leaving {} (record {}, merchant {}, by {})",
        record.product_id, quantity, stock.id, stock.quantity, record.id, merchant_id, user.username
    );

    Ok(Json(json!({
        "success": true,
        "message": "shenzhen outbound recorded",
        "stock": StockSummary::from(&stock),
        "record": record,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shenzhen_lots_live_at_the_shenzhen_location() {
        let lot = shenzhen_lot("P1".into(), "24".into(), Some("".into()), None);
        assert_eq!(lot.location.as_deref(), Some(SHENZHEN_LOCATION));
        assert_eq!(lot.batch_number, None);
    }

    #[test]
    fn shenzhen_outgoing_requires_a_reason() {
        let req: ShenzhenOutgoingRequest = serde_json::from_value(json!({
            "product_id": "P1",
            "box_spec": "24",
            "quantity": 3,
        }))
        .unwrap();
        assert_eq!(req.missing_fields(), vec!["outgoing_reason"]);
    }
}
