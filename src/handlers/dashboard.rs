use axum::{extract::State, response::Json};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use sqlx::FromRow;

use crate::{
    error::AppResult,
    ledger::OperationType,
    middleware::CurrentUser,
    models::Capability,
    state::AppState,
};

/// Lots expiring within this many days are flagged.
const EXPIRY_HORIZON_DAYS: i32 = 360;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlowTotals {
    pub inbound: i64,
    pub outbound: i64,
}

impl FlowTotals {
    fn from_rows(rows: &[(OperationType, i64)]) -> Self {
        rows.iter().fold(Self::default(), |mut totals, (op, boxes)| {
            match op {
                OperationType::Inbound => totals.inbound += boxes,
                OperationType::Outbound => totals.outbound += boxes,
            }
            totals
        })
    }
}

#[derive(Debug, Serialize, FromRow)]
pub struct ExpiringLot {
    pub id: i32,
    pub product_id: String,
    pub name: String,
    pub box_spec: String,
    pub quantity: i32,
    pub batch_number: Option<String>,
    pub expiry_date: NaiveDate,
    pub location: Option<String>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct LocationUsage {
    pub location: String,
    pub lots: i64,
    pub boxes: i64,
}

/// Start of the UTC day containing `now`.
fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
        .unwrap_or(now)
}

async fn flow_since(state: &AppState, merchant_id: i32, since: DateTime<Utc>) -> AppResult<FlowTotals> {
    let rows = sqlx::query_as::<_, (OperationType, i64)>(
        r#"
        SELECT operation_type, COALESCE(SUM(quantity), 0)::BIGINT
        FROM records
        WHERE merchant_id = $1 AND date >= $2
        GROUP BY operation_type
        "#,
    )
    .bind(merchant_id)
    .bind(since)
    .fetch_all(&state.db)
    .await?;

    Ok(FlowTotals::from_rows(&rows))
}

pub async fn dashboard(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Value>> {
    user.require(Capability::StockView)?;
    let merchant_id = user.merchant_id()?;

    let now = Utc::now();
    let today = flow_since(&state, merchant_id, start_of_day(now)).await?;
    let last_7_days = flow_since(&state, merchant_id, now - Duration::days(7)).await?;
    let last_30_days = flow_since(&state, merchant_id, now - Duration::days(30)).await?;

    let expiring = sqlx::query_as::<_, ExpiringLot>(
        r#"
        SELECT s.id, s.product_id, p.name, s.box_spec, s.quantity, s.batch_number,
               s.expiry_date, s.location
        FROM stocks s
        JOIN products p ON p.id = s.product_id AND p.merchant_id = s.merchant_id
        WHERE s.merchant_id = $1 AND s.quantity > 0
          AND s.expiry_date IS NOT NULL
          AND s.expiry_date <= CURRENT_DATE + $2
        ORDER BY s.expiry_date
        "#,
    )
    .bind(merchant_id)
    .bind(EXPIRY_HORIZON_DAYS)
    .fetch_all(&state.db)
    .await?;

    let locations = sqlx::query_as::<_, LocationUsage>(
        r#"
        SELECT location, COUNT(*) AS lots, SUM(quantity)::BIGINT AS boxes
        FROM stocks
        WHERE merchant_id = $1 AND quantity > 0 AND location IS NOT NULL AND location <> ''
        GROUP BY location
        ORDER BY location
        "#,
    )
    .bind(merchant_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(json!({
        "success": true,
        "flow": {
            "today": today,
            "last_7_days": last_7_days,
            "last_30_days": last_30_days,
        },
        "expiring": expiring,
        "occupied_locations": locations.len(),
        "locations": locations,
    })))
}
