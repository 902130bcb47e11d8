use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::ledger::LotKey;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Stock {
    pub id: i32,
    pub product_id: String,
    pub box_spec: String,
    pub quantity: i32,
    pub batch_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub location: Option<String>,
    pub merchant_id: i32,
    pub unit_price: Option<Decimal>,
    pub in_transit: Option<i32>,
    pub daily_consumption: Option<f64>,
    pub shenzhen_stock: i32,
}

impl Stock {
    pub fn lot_key(&self) -> LotKey {
        LotKey {
            product_id: self.product_id.clone(),
            box_spec: self.box_spec.clone(),
            batch_number: self.batch_number.clone(),
            location: self.location.clone(),
            expiry_date: self.expiry_date,
        }
    }
}

/// Stock row joined with its product, as listed to clients.
#[derive(Debug, Serialize, FromRow)]
pub struct StockView {
    pub id: i32,
    pub product_id: String,
    pub name: String,
    pub category: Option<String>,
    pub supplier: Option<String>,
    pub unit: Option<String>,
    pub box_spec: String,
    pub quantity: i32,
    pub batch_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub in_transit: Option<i32>,
    pub daily_consumption: Option<f64>,
    pub location: Option<String>,
    pub unit_price: Option<Decimal>,
    pub shenzhen_stock: i32,
    pub merchant_id: i32,
    pub merchant_name: String,
}

/// Post-movement lot summary returned by outbound calls.
#[derive(Debug, Serialize)]
pub struct StockSummary {
    pub product_id: String,
    pub quantity: i32,
    pub batch_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub location: Option<String>,
}

impl From<&Stock> for StockSummary {
    fn from(stock: &Stock) -> Self {
        Self {
            product_id: stock.product_id.clone(),
            quantity: stock.quantity,
            batch_number: stock.batch_number.clone(),
            expiry_date: stock.expiry_date,
            location: stock.location.clone(),
        }
    }
}
