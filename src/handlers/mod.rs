pub mod auth;
pub mod dashboard;
pub mod merchants;
pub mod movements;
pub mod products;
pub mod records;
pub mod shenzhen;
pub mod stock;
pub mod users;

use axum::{http::StatusCode, response::Json};
use serde_json::{json, Value};

pub async fn not_found() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "success": false,
            "error": true,
            "message": "resource not found",
        })),
    )
}
