use axum::extract::{Path, Query, State};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    extract::Json,
    ledger::{parse_optional_date, parse_quantity, plan_edit, reversal, store, store::RecordUpdate, EditPlan, OperationType},
    middleware::CurrentUser,
    models::{Capability, RecordRow, RecordView},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct RecordFilters {
    product_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRecordRequest {
    record_id: Option<String>,
    quantity: Option<Value>,
    reason: Option<String>,
    box_spec: Option<String>,
    batch_number: Option<String>,
    expiry_date: Option<String>,
}

pub async fn list_records(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(filters): Query<RecordFilters>,
) -> AppResult<Json<Vec<RecordView>>> {
    user.require(Capability::RecordsView)?;
    let merchant_id = user.merchant_id()?;

    let rows = sqlx::query_as::<_, RecordRow>(
        r#"
        SELECT r.*, p.name AS product_name, u.username AS operator
        FROM records r
        JOIN products p ON p.id = r.product_id AND p.merchant_id = r.merchant_id
        LEFT JOIN users u ON u.id = r.operator_id
        WHERE r.merchant_id = $1 AND ($2::TEXT IS NULL OR r.product_id = $2)
        ORDER BY r.date DESC
        "#,
    )
    .bind(merchant_id)
    .bind(filters.product_id.filter(|p| !p.is_empty()))
    .fetch_all(&state.db)
    .await?;

    Ok(Json(rows.into_iter().map(RecordView::from).collect()))
}

/// Edit of a movement record. The lot it moved is adjusted by the
/// change in the record's effect, in the same transaction.
pub async fn update_record(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<UpdateRecordRequest>,
) -> AppResult<Json<Value>> {
    user.require(Capability::RecordEdit)?;
    let merchant_id = user.merchant_id()?;

    let record_id = req
        .record_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::validation("record_id is required"))?;

    let mut tx = state.db.begin().await?;
    let record = store::lock_record(&mut tx, merchant_id, &record_id).await?;

    let old_key = record.lot_key();
    let mut new_key = old_key.clone();
    if let Some(box_spec) = req.box_spec.filter(|s| !s.is_empty()) {
        new_key.box_spec = box_spec;
    }
    if let Some(batch_number) = req.batch_number.filter(|s| !s.is_empty()) {
        new_key.batch_number = Some(batch_number);
    }
    if let Some(expiry_date) = parse_optional_date(req.expiry_date.as_deref())? {
        new_key.expiry_date = Some(expiry_date);
    }

    let update = RecordUpdate {
        quantity: req.quantity.as_ref().map(parse_quantity).transpose()?.unwrap_or(record.quantity),
        reason: req.reason.unwrap_or_else(|| record.reason.clone()),
        lot: new_key,
    };

    let op = record.operation_type;
    match plan_edit(op, &old_key, record.quantity, &update.lot, update.quantity)? {
        EditPlan::SameLot { delta } => {
            store::adjust_lot(&mut tx, merchant_id, &old_key, delta, false, None).await?;
        }
        EditPlan::MoveLot { reverse, apply } => {
            store::adjust_lot(&mut tx, merchant_id, &old_key, reverse, false, None).await?;
            match op {
                OperationType::Inbound => {
                    store::adjust_lot(&mut tx, merchant_id, &update.lot, apply, true, record.unit_price)
                        .await?;
                }
                OperationType::Outbound => {
                    store::take_from_lot(&mut tx, merchant_id, &update.lot, update.quantity).await?;
                }
            }
        }
    }

    let updated = store::update_record(&mut tx, &record.id, &update).await?;
    tx.commit().await?;

    log::info!(
        "record {} edited by {}: quantity {} -> {}",
        updated.id, user.username, record.quantity, updated.quantity
    );

    Ok(Json(json!({
        "success": true,
        "message": "record updated",
        "record": updated,
    })))
}

/// Delete of a movement record; its effect on the lot is undone.
/// Deleting an outbound record recreates the lot if it no longer exists.
pub async fn delete_record(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(record_id): Path<String>,
) -> AppResult<Json<Value>> {
    user.require(Capability::RecordEdit)?;
    let merchant_id = user.merchant_id()?;

    let mut tx = state.db.begin().await?;
    let record = store::lock_record(&mut tx, merchant_id, &record_id).await?;

    let delta = reversal(record.operation_type, record.quantity);
    let stock = store::adjust_lot(
        &mut tx,
        merchant_id,
        &record.lot_key(),
        delta,
        record.operation_type == OperationType::Outbound,
        record.unit_price,
    )
    .await?;

    store::delete_record(&mut tx, &record.id).await?;
    tx.commit().await?;

    log::info!(
        "record {} deleted by {}; stock {} now {}",
        record.id, user.username, stock.id, stock.quantity
    );

    Ok(Json(json!({
        "success": true,
        "message": "record deleted",
        "stock": stock,
    })))
}
