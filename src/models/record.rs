use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::ledger::{box_spec_units, LotKey, OperationType};

/// One inbound or outbound movement. The lot it moved is stored as typed
/// columns, so edits and deletes find the lot without parsing text.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Record {
    pub id: String,
    pub product_id: String,
    pub operation_type: OperationType,
    pub quantity: i32,
    pub date: DateTime<Utc>,
    pub reason: String,
    pub box_spec: String,
    pub batch_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub location: Option<String>,
    pub unit_price: Option<Decimal>,
    pub merchant_id: i32,
    pub operator_id: Option<i32>,
}

impl Record {
    pub fn lot_key(&self) -> LotKey {
        LotKey {
            product_id: self.product_id.clone(),
            box_spec: self.box_spec.clone(),
            batch_number: self.batch_number.clone(),
            location: self.location.clone(),
            expiry_date: self.expiry_date,
        }
    }

    pub fn summary(&self) -> String {
        summarize(
            self.operation_type,
            &self.reason,
            &self.box_spec,
            self.batch_number.as_deref(),
            self.expiry_date,
            self.location.as_deref(),
            self.unit_price,
        )
    }
}

/// Fields for a record about to be written.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub operation_type: OperationType,
    pub quantity: i32,
    pub reason: String,
    pub lot: LotKey,
    pub unit_price: Option<Decimal>,
    pub merchant_id: i32,
    pub operator_id: Option<i32>,
}

/// Record joined with product name and operator, as listed to clients.
#[derive(Debug, Clone, FromRow)]
pub struct RecordRow {
    #[sqlx(flatten)]
    pub record: Record,
    pub product_name: String,
    pub operator: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RecordView {
    pub id: String,
    pub product_id: String,
    pub product_name: String,
    pub operation_type: OperationType,
    pub quantity: i32,
    pub date: DateTime<Utc>,
    pub reason: String,
    pub location: Option<String>,
    pub box_spec: String,
    pub batch_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub operator: String,
    pub unit_price: Option<Decimal>,
    pub total: f64,
    pub additional_info: String,
}

impl From<RecordRow> for RecordView {
    fn from(row: RecordRow) -> Self {
        let additional_info = row.record.summary();
        let r = row.record;
        Self {
            total: f64::from(r.quantity) * box_spec_units(&r.box_spec),
            additional_info,
            id: r.id,
            product_id: r.product_id,
            product_name: row.product_name,
            operation_type: r.operation_type,
            quantity: r.quantity,
            date: r.date,
            reason: r.reason,
            location: r.location,
            box_spec: r.box_spec,
            batch_number: r.batch_number,
            expiry_date: r.expiry_date,
            operator: row.operator.unwrap_or_else(|| "unknown".to_string()),
            unit_price: r.unit_price,
        }
    }
}

/// Human-readable one-line description of a movement, for listings only.
pub fn summarize(
    op: OperationType,
    reason: &str,
    box_spec: &str,
    batch_number: Option<&str>,
    expiry_date: Option<NaiveDate>,
    location: Option<&str>,
    unit_price: Option<Decimal>,
) -> String {
    let none = "-";
    let expiry = expiry_date
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| none.to_string());
    let price = unit_price
        .map(|p| p.to_string())
        .unwrap_or_else(|| none.to_string());
    format!(
        "{} reason: {}, box spec: {}, batch: {}, expiry: {}, location: {}, unit price: {}",
        op.label(),
        reason,
        box_spec,
        batch_number.unwrap_or(none),
        expiry,
        location.unwrap_or(none),
        price,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(op: OperationType, box_spec: &str) -> Record {
        Record {
            id: "20250101120000000001".into(),
            product_id: "P1".into(),
            operation_type: op,
            quantity: 4,
            date: Utc::now(),
            reason: "sale, urgent".into(),
            box_spec: box_spec.into(),
            batch_number: Some("B1".into()),
            expiry_date: NaiveDate::from_ymd_opt(2025, 12, 31),
            location: Some("A1".into()),
            unit_price: None,
            merchant_id: 1,
            operator_id: None,
        }
    }

    #[test]
    fn lot_key_comes_from_typed_columns() {
        // A reason containing ", " used to corrupt text-encoded metadata.
        let key = record(OperationType::Outbound, "24").lot_key();
        assert_eq!(key.box_spec, "24");
        assert_eq!(key.batch_number.as_deref(), Some("B1"));
        assert_eq!(key.location.as_deref(), Some("A1"));
    }

    #[test]
    fn view_computes_total_units() {
        let view = RecordView::from(RecordRow {
            record: record(OperationType::Inbound, "24"),
            product_name: "Widget".into(),
            operator: None,
        });
        assert_eq!(view.total, 96.0);
        assert_eq!(view.operator, "unknown");
        assert!(view.additional_info.starts_with("入库 reason: sale, urgent"));
        assert!(view.additional_info.ends_with("unit price: -"));
    }
}
