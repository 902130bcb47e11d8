use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Merchant {
    pub id: i32,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateMerchant {
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SwitchMerchant {
    pub merchant_id: i32,
}
