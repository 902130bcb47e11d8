use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A stockable item. `id` is the external product code, unique per merchant.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub category: Option<String>,
    pub supplier: Option<String>,
    pub unit: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateProduct {
    pub id: String,
    pub name: String,
    pub category: Option<String>,
    pub supplier: Option<String>,
    pub unit: Option<String>,
}

/// Partial update; a new `id` renames the product code everywhere it is used.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateProduct {
    pub id: Option<String>,
    pub name: Option<String>,
    pub category: Option<String>,
    pub supplier: Option<String>,
    pub unit: Option<String>,
}
