pub mod merchant;
pub mod permission;
pub mod product;
pub mod record;
pub mod shenzhen;
pub mod stock;
pub mod user;

pub use merchant::{CreateMerchant, Merchant, SwitchMerchant};
pub use permission::{Capability, Permission};
pub use product::{CreateProduct, Product, UpdateProduct};
pub use record::{NewRecord, Record, RecordRow, RecordView};
pub use shenzhen::{ShenzhenRecord, ShenzhenRecordView};
pub use stock::{Stock, StockSummary, StockView};
pub use user::{CreateUser, LoginRequest, PermissionRef, UpdateUserPermissions, User, UserResponse};
