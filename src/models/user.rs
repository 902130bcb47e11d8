use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i32,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub last_login: Option<DateTime<Utc>>,
    pub current_merchant_id: Option<i32>,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateUser {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub is_admin: bool,
    /// Permission ids to grant.
    #[serde(default)]
    pub permissions: Vec<i32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateUserPermissions {
    pub permissions: Vec<i32>,
    pub is_admin: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i32,
    pub username: String,
    pub is_admin: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub permissions: Vec<PermissionRef>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PermissionRef {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
}
