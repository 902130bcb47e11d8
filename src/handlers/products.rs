use axum::extract::{Path, State};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    extract::Json,
    ledger::store,
    middleware::CurrentUser,
    models::{Capability, CreateProduct, Product, UpdateProduct},
    state::AppState,
};

pub async fn list_products(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<Product>>> {
    // Movement forms need the catalog too.
    user.require_any(&[
        Capability::ProductManage,
        Capability::StockView,
        Capability::IncomingOperate,
        Capability::OutgoingOperate,
    ])?;
    let merchant_id = user.merchant_id()?;

    let products = sqlx::query_as::<_, Product>(
        "SELECT * FROM products WHERE merchant_id = $1 ORDER BY id",
    )
    .bind(merchant_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(products))
}

pub async fn create_product(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<CreateProduct>,
) -> AppResult<Json<Value>> {
    user.require(Capability::ProductManage)?;
    let merchant_id = user.merchant_id()?;

    if req.id.trim().is_empty() || req.name.trim().is_empty() {
        return Err(AppError::validation("product code and name are required"));
    }

    let product = sqlx::query_as::<_, Product>(
        r#"
        INSERT INTO products (id, name, category, supplier, unit, merchant_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (id) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(req.id.trim())
    .bind(req.name.trim())
    .bind(&req.category)
    .bind(&req.supplier)
    .bind(&req.unit)
    .bind(merchant_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::Conflict(format!("product code {} is already in use", req.id.trim())))?;

    log::info!("product {} created for merchant {} by {}", product.id, merchant_id, user.username);

    Ok(Json(json!({
        "success": true,
        "message": "product created",
        "product": product,
    })))
}

/// Partial update. Changing the code renames it on the product's lots and
/// records too (foreign keys cascade on update).
pub async fn update_product(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(product_id): Path<String>,
    Json(req): Json<UpdateProduct>,
) -> AppResult<Json<Value>> {
    user.require(Capability::ProductManage)?;
    let merchant_id = user.merchant_id()?;

    let new_id = req.id.as_deref().map(str::trim).filter(|id| !id.is_empty());

    let mut tx = state.db.begin().await?;
    store::ensure_product(&mut tx, merchant_id, &product_id).await?;

    if let Some(new_id) = new_id.filter(|id| *id != product_id) {
        let taken = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM products WHERE id = $1)")
            .bind(new_id)
            .fetch_one(&mut *tx)
            .await?;
        if taken {
            return Err(AppError::Conflict(format!("product code {} is already in use", new_id)));
        }
    }

    let product = sqlx::query_as::<_, Product>(
        r#"
        UPDATE products SET
            id = COALESCE($3, id),
            name = COALESCE($4, name),
            category = COALESCE($5, category),
            supplier = COALESCE($6, supplier),
            unit = COALESCE($7, unit)
        WHERE id = $1 AND merchant_id = $2
        RETURNING *
        "#,
    )
    .bind(&product_id)
    .bind(merchant_id)
    .bind(new_id)
    .bind(req.name.as_deref().map(str::trim).filter(|n| !n.is_empty()))
    .bind(&req.category)
    .bind(&req.supplier)
    .bind(&req.unit)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    if product.id != product_id {
        log::info!("product {} renamed to {} by {}", product_id, product.id, user.username);
    }

    Ok(Json(json!({
        "success": true,
        "message": "product updated",
        "product": product,
    })))
}

/// Deletes a product with all of its lots and records.
pub async fn delete_product(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(product_id): Path<String>,
) -> AppResult<Json<Value>> {
    user.require(Capability::ProductManage)?;
    let merchant_id = user.merchant_id()?;

    let deleted = sqlx::query("DELETE FROM products WHERE id = $1 AND merchant_id = $2")
        .bind(&product_id)
        .bind(merchant_id)
        .execute(&state.db)
        .await?
        .rows_affected();

    if deleted == 0 {
        return Err(AppError::not_found(format!("product {} not found", product_id)));
    }

    log::info!("product {} deleted by {}", product_id, user.username);

    Ok(Json(json!({
        "success": true,
        "message": "product deleted",
    })))
}
