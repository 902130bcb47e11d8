pub mod auth;
pub mod ids;

pub use auth::{create_token, hash_password, verify_password, verify_token, TokenError};
pub use ids::generate_unique_id;
