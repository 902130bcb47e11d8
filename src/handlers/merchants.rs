use axum::extract::{Path, State};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    extract::Json,
    middleware::CurrentUser,
    models::{CreateMerchant, Merchant, SwitchMerchant},
    state::AppState,
};

pub async fn list_merchants(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> AppResult<Json<Vec<Merchant>>> {
    let merchants = sqlx::query_as::<_, Merchant>("SELECT * FROM merchants ORDER BY id")
        .fetch_all(&state.db)
        .await?;

    Ok(Json(merchants))
}

pub async fn create_merchant(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<CreateMerchant>,
) -> AppResult<Json<Value>> {
    user.require_admin()?;

    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::validation("merchant name is required"));
    }

    let merchant = sqlx::query_as::<_, Merchant>(
        "INSERT INTO merchants (name) VALUES ($1) ON CONFLICT (name) DO NOTHING RETURNING *",
    )
    .bind(name)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::Conflict(format!("merchant {} already exists", name)))?;

    log::info!("merchant {} ({}) created by {}", merchant.name, merchant.id, user.username);

    Ok(Json(json!({
        "success": true,
        "message": "merchant created",
        "merchant": merchant,
    })))
}

/// Deletes a merchant together with its products, lots and records.
pub async fn delete_merchant(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(merchant_id): Path<i32>,
) -> AppResult<Json<Value>> {
    user.require_admin()?;

    if user.current_merchant_id == Some(merchant_id) {
        return Err(AppError::validation(
            "cannot delete the merchant you are currently working in",
        ));
    }

    let deleted = sqlx::query("DELETE FROM merchants WHERE id = $1")
        .bind(merchant_id)
        .execute(&state.db)
        .await?
        .rows_affected();

    if deleted == 0 {
        return Err(AppError::not_found(format!("merchant {} not found", merchant_id)));
    }

    log::info!("merchant {} deleted by {}", merchant_id, user.username);

    Ok(Json(json!({
        "success": true,
        "message": "merchant deleted",
    })))
}

pub async fn switch_merchant(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<SwitchMerchant>,
) -> AppResult<Json<Value>> {
    let merchant = sqlx::query_as::<_, Merchant>("SELECT * FROM merchants WHERE id = $1")
        .bind(req.merchant_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::not_found(format!("merchant {} not found", req.merchant_id)))?;

    sqlx::query("UPDATE users SET current_merchant_id = $1 WHERE id = $2")
        .bind(merchant.id)
        .bind(user.id)
        .execute(&state.db)
        .await?;

    log::info!("{} switched to merchant {}", user.username, merchant.id);

    Ok(Json(json!({
        "success": true,
        "message": format!("switched to {}", merchant.name),
        "merchant": merchant,
    })))
}

/// The caller's working merchant. Without one, the first merchant is chosen
/// and remembered.
pub async fn current_merchant(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Value>> {
    if let Some(merchant_id) = user.current_merchant_id {
        let merchant = sqlx::query_as::<_, Merchant>("SELECT * FROM merchants WHERE id = $1")
            .bind(merchant_id)
            .fetch_optional(&state.db)
            .await?;
        if let Some(merchant) = merchant {
            return Ok(Json(json!({ "success": true, "merchant": merchant })));
        }
    }

    let first = sqlx::query_as::<_, Merchant>("SELECT * FROM merchants ORDER BY id LIMIT 1")
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::not_found("no merchants exist yet"))?;

    sqlx::query("UPDATE users SET current_merchant_id = $1 WHERE id = $2")
        .bind(first.id)
        .bind(user.id)
        .execute(&state.db)
        .await?;

    Ok(Json(json!({ "success": true, "merchant": first })))
}
