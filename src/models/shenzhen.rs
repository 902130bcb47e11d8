use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use chrono::{DateTime, NaiveDate, Utc};

use crate::ledger::OperationType;

/// Movement at the Shenzhen site. Kept apart from `Record` so Shenzhen flow
/// does not show up in the main warehouse ledger.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ShenzhenRecord {
    pub id: String,
    pub product_id: String,
    pub operation_type: OperationType,
    pub quantity: i32,
    pub date: DateTime<Utc>,
    pub box_spec: String,
    pub batch_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub reason: Option<String>,
    pub merchant_id: i32,
    pub operator_id: Option<i32>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct ShenzhenRecordView {
    pub id: String,
    pub product_id: String,
    pub operation_type: OperationType,
    pub quantity: i32,
    pub date: DateTime<Utc>,
    pub box_spec: String,
    pub batch_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub reason: Option<String>,
    pub operator: Option<String>,
}
