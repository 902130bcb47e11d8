use axum::extract::State;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    extract::Json,
    ledger::{blank_to_none, check_relocation, parse_optional_date, parse_quantity, store, LotKey},
    middleware::CurrentUser,
    models::{Capability, StockView},
    state::AppState,
};

const STOCK_VIEW_SELECT: &str = r#"
    SELECT s.id, s.product_id, p.name, p.category, p.supplier, p.unit,
           s.box_spec, s.quantity, s.batch_number, s.expiry_date, s.in_transit,
           s.daily_consumption, s.location, s.unit_price, s.shenzhen_stock,
           s.merchant_id, m.name AS merchant_name
    FROM stocks s
    JOIN products p ON p.id = s.product_id AND p.merchant_id = s.merchant_id
    JOIN merchants m ON m.id = s.merchant_id
"#;

#[derive(Debug, Deserialize)]
pub struct StockFieldsRequest {
    product_id: String,
    in_transit: Option<i32>,
    daily_consumption: Option<f64>,
    shenzhen_stock: Option<i32>,
}

impl StockFieldsRequest {
    fn has_updates(&self) -> bool {
        self.in_transit.is_some() || self.daily_consumption.is_some() || self.shenzhen_stock.is_some()
    }
}

#[derive(Debug, Deserialize)]
pub struct RelocateRequest {
    product_id: String,
    box_spec: String,
    batch_number: Option<String>,
    expiry_date: Option<String>,
    from_location: String,
    to_location: String,
    quantity: Value,
}

impl RelocateRequest {
    /// Trimmed source and destination; both must be non-blank.
    fn locations(&self) -> AppResult<(String, String)> {
        let from = blank_to_none(Some(self.from_location.clone()));
        let to = blank_to_none(Some(self.to_location.clone()));
        match (from, to) {
            (Some(from), Some(to)) => Ok((from, to)),
            (from, to) => Err(AppError::MissingFields(
                [("from_location", from.is_none()), ("to_location", to.is_none())]
                    .into_iter()
                    .filter_map(|(name, missing)| missing.then_some(name))
                    .collect(),
            )),
        }
    }
}

/// All lots of the current merchant, zero-quantity lots included.
pub async fn list_stock(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<StockView>>> {
    user.require(Capability::StockView)?;
    let merchant_id = user.merchant_id()?;

    let stock = sqlx::query_as::<_, StockView>(&format!(
        "{} WHERE s.merchant_id = $1 ORDER BY s.product_id, s.location, s.expiry_date",
        STOCK_VIEW_SELECT
    ))
    .bind(merchant_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(stock))
}

pub async fn all_merchants_stock(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<StockView>>> {
    user.require(Capability::LocationQuery)?;

    let stock = sqlx::query_as::<_, StockView>(&format!(
        "{} ORDER BY s.merchant_id, s.product_id, s.location",
        STOCK_VIEW_SELECT
    ))
    .fetch_all(&state.db)
    .await?;

    Ok(Json(stock))
}

/// Locations currently holding stock for the merchant.
pub async fn list_locations(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<String>>> {
    user.require(Capability::LocationQuery)?;
    let merchant_id = user.merchant_id()?;

    let mut locations = sqlx::query_scalar::<_, String>(
        r#"
        SELECT DISTINCT location FROM stocks
        WHERE merchant_id = $1 AND quantity > 0 AND location IS NOT NULL AND location <> ''
        "#,
    )
    .bind(merchant_id)
    .fetch_all(&state.db)
    .await?;

    locations.sort_by(|a, b| location_order(a).cmp(&location_order(b)));
    Ok(Json(locations))
}

/// Sorts "A2" before "A10": letter prefix, then the first number.
fn location_order(location: &str) -> (String, u32, String) {
    let letters: String = location
        .chars()
        .skip_while(|c| !c.is_ascii_alphabetic())
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    let number = location
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect::<String>()
        .parse()
        .unwrap_or(0);
    (letters, number, location.to_string())
}

/// Sets planning fields on every lot of a product, whatever its location
/// or batch. Not a ledger movement.
pub async fn update_stock_fields(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<StockFieldsRequest>,
) -> AppResult<Json<Value>> {
    user.require(Capability::ProductManage)?;
    let merchant_id = user.merchant_id()?;

    if !req.has_updates() {
        return Err(AppError::validation("no fields to update"));
    }

    let updated = sqlx::query(
        r#"
        UPDATE stocks SET
            in_transit = COALESCE($3, in_transit),
            daily_consumption = COALESCE($4, daily_consumption),
            shenzhen_stock = COALESCE($5, shenzhen_stock)
        WHERE product_id = $1 AND merchant_id = $2
        "#,
    )
    .bind(&req.product_id)
    .bind(merchant_id)
    .bind(req.in_transit)
    .bind(req.daily_consumption)
    .bind(req.shenzhen_stock)
    .execute(&state.db)
    .await?
    .rows_affected();

    if updated == 0 {
        return Err(AppError::not_found(format!(
            "no stock found for product {}",
            req.product_id
        )));
    }

    Ok(Json(json!({
        "success": true,
        "message": "stock updated",
        "updated": updated,
    })))
}

/// Moves quantity between two locations of the same lot. No record is
/// written for relocations.
pub async fn relocate(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<RelocateRequest>,
) -> AppResult<Json<Value>> {
    user.require(Capability::OutgoingOperate)?;
    let merchant_id = user.merchant_id()?;

    let (from_location, to_location) = req.locations()?;
    let quantity = parse_quantity(&req.quantity)?;
    check_relocation(&from_location, &to_location, quantity)?;

    let source_key = LotKey {
        product_id: req.product_id,
        box_spec: req.box_spec,
        batch_number: blank_to_none(req.batch_number),
        location: Some(from_location),
        expiry_date: parse_optional_date(req.expiry_date.as_deref())?,
    };
    let destination_key = LotKey {
        location: Some(to_location),
        ..source_key.clone()
    };

    let mut tx = state.db.begin().await?;
    let source = store::take_from_lot(&mut tx, merchant_id, &source_key, quantity).await?;
    let destination =
        store::upsert_lot(&mut tx, merchant_id, &destination_key, quantity, source.unit_price).await?;
    tx.commit().await?;

    log::info!(
        "relocated {} x{} from stock {} to stock {} (merchant {}, by {})",
        source.product_id, quantity, source.id, destination.id, merchant_id, user.username
    );

    Ok(Json(json!({
        "success": true,
        "message": "stock relocated",
        "source": source,
        "destination": destination,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locations_sort_by_letter_then_number() {
        let mut locations = vec!["B1", "A10", "A2", "Shenzhen", "A1"];
        locations.sort_by(|a, b| location_order(a).cmp(&location_order(b)));
        assert_eq!(locations, vec!["A1", "A2", "A10", "B1", "Shenzhen"]);
    }

    fn relocation(from: &str, to: &str) -> RelocateRequest {
        serde_json::from_value(json!({
            "product_id": "P1",
            "box_spec": "24",
            "from_location": from,
            "to_location": to,
            "quantity": 2,
        }))
        .unwrap()
    }

    #[test]
    fn relocation_locations_are_trimmed() {
        let (from, to) = relocation(" A1", "B2 ").locations().unwrap();
        assert_eq!((from.as_str(), to.as_str()), ("A1", "B2"));

        // Padding alone must not make a location look different.
        let (from, to) = relocation(" A1", "A1").locations().unwrap();
        assert!(matches!(
            check_relocation(&from, &to, 2),
            Err(crate::ledger::LedgerError::SameLocation)
        ));
    }

    #[test]
    fn blank_relocation_locations_are_missing_fields() {
        let err = relocation("A1", "  ").locations().unwrap_err();
        assert!(matches!(err, AppError::MissingFields(ref f) if f == &vec!["to_location"]));
    }

    #[tokio::test]
    async fn incomplete_relocation_body_is_a_validation_error() {
        use axum::{body::Body, extract::FromRequest, http::{header, Request}};

        let request = Request::post("/api/stock/relocate")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"product_id":"P1","box_spec":"24","from_location":"A1","quantity":2}"#))
            .unwrap();
        let err = Json::<RelocateRequest>::from_request(request, &()).await.unwrap_err();

        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
        assert!(matches!(err, AppError::Validation(ref m) if m.contains("to_location")));
    }

    #[test]
    fn stock_field_update_needs_at_least_one_field() {
        let empty: StockFieldsRequest =
            serde_json::from_value(json!({ "product_id": "P1" })).unwrap();
        assert!(!empty.has_updates());

        let some: StockFieldsRequest =
            serde_json::from_value(json!({ "product_id": "P1", "in_transit": 3 })).unwrap();
        assert!(some.has_updates());
    }
}
