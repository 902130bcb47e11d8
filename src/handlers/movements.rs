use axum::extract::State;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    extract::Json,
    ledger::{blank_to_none, parse_date, parse_optional_date, parse_quantity, store, store::Journal, LotKey, OperationType},
    middleware::CurrentUser,
    models::{Capability, NewRecord, StockSummary},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct IncomingRequest {
    product_id: Option<String>,
    box_spec: Option<String>,
    quantity: Option<Value>,
    batch_number: Option<String>,
    incoming_reason: Option<String>,
    expiry_date: Option<String>,
    location: Option<String>,
    unit_price: Option<Decimal>,
}

impl IncomingRequest {
    fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("product_id", self.product_id.is_none()),
            ("box_spec", self.box_spec.is_none()),
            ("quantity", self.quantity.is_none()),
            ("batch_number", self.batch_number.is_none()),
            ("incoming_reason", self.incoming_reason.is_none()),
            ("expiry_date", self.expiry_date.is_none()),
            ("location", self.location.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, missing)| missing.then_some(name))
        .collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct OutgoingRequest {
    product_id: Option<String>,
    box_spec: Option<String>,
    quantity: Option<Value>,
    batch_number: Option<String>,
    location: Option<String>,
    expiry_date: Option<String>,
    outgoing_reason: Option<String>,
}

impl OutgoingRequest {
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

/// Receives stock into a lot and logs an inbound record, atomically.
pub async fn incoming(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<IncomingRequest>,
) -> AppResult<Json<Value>> {
    user.require(Capability::IncomingOperate)?;

    let missing = req.missing_fields();
    let (
        Some(product_id),
        Some(box_spec),
        Some(quantity),
        Some(batch_number),
        Some(reason),
        Some(expiry_date),
        Some(location),
    ) = (
        req.product_id,
        req.box_spec,
        req.quantity,
        req.batch_number,
        req.incoming_reason,
        req.expiry_date,
        req.location,
    )
    else {
        return Err(AppError::MissingFields(missing));
    };

    let merchant_id = user.merchant_id()?;
    let mut tx = state.db.begin().await?;

    store::ensure_product(&mut tx, merchant_id, &product_id).await?;
    let expiry_date = parse_date(&expiry_date)?;
    let quantity = parse_quantity(&quantity)?;

    store::guard_duplicate(
        &mut tx,
        &state.duplicate_guard(),
        Journal::Main,
        merchant_id,
        &product_id,
        OperationType::Inbound,
        quantity,
    )
    .await?;

    let lot = LotKey {
        product_id,
        box_spec,
        batch_number: blank_to_none(Some(batch_number)),
        location: blank_to_none(Some(location)),
        expiry_date: Some(expiry_date),
    };

    let stock = store::upsert_lot(&mut tx, merchant_id, &lot, quantity, req.unit_price).await?;
    let record = store::insert_record(
        &mut tx,
        &NewRecord {
            operation_type: OperationType::Inbound,
            quantity,
            reason,
            lot,
            unit_price: req.unit_price,
            merchant_id,
            operator_id: Some(user.id),
        },
    )
    .await?;

    tx.commit().await?;

    log::info!(
        "inbound {} x{} into stock {} (record {}, merchant {}, by {})",
        record.product_id, quantity, stock.id, record.id, merchant_id, user.username
    );

    Ok(Json(json!({
        "success": true,
        "message": "inbound recorded",
        "stock": stock,
        "record": record,
    })))
}

/// Issues stock from one exactly-matching lot and logs an outbound record.
pub async fn outgoing(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<OutgoingRequest>,
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
        Journal::Main,
        merchant_id,
        &product_id,
        OperationType::Outbound,
        quantity,
    )
    .await?;

    // Absent filters match lots where the field is absent, not any lot.
    let requested = LotKey {
        product_id,
        box_spec,
        batch_number: blank_to_none(req.batch_number),
        location: blank_to_none(req.location),
        expiry_date,
    };

    let stock = store::take_from_lot(&mut tx, merchant_id, &requested, quantity).await?;

    // The record describes the lot actually issued from.
    let record = store::insert_record(
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
        "outbound {} x{} from stock {} leaving {} (record {}, merchant {}, by {})",
        record.product_id, quantity, stock.id, stock.quantity, record.id, merchant_id, user.username
    );

    Ok(Json(json!({
        "success": true,
        "error": false,
        "message": "outbound recorded",
        "stock": StockSummary::from(&stock),
        "record": record,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incoming_reports_every_missing_field() {
        let req: IncomingRequest = serde_json::from_value(json!({
            "product_id": "P1",
            "quantity": 10,
            "box_spec": "24",
        }))
        .unwrap();
        assert_eq!(
            req.missing_fields(),
            vec!["batch_number", "incoming_reason", "expiry_date", "location"]
        );
    }

    #[test]
    fn outgoing_only_requires_product_spec_quantity_and_reason() {
        let req: OutgoingRequest = serde_json::from_value(json!({
            "product_id": "P1",
            "box_spec": "24",
            "quantity": "4",
            "outgoing_reason": "sale",
        }))
        .unwrap();
        assert!(req.missing_fields().is_empty());
        assert!(req.batch_number.is_none());
    }
}
