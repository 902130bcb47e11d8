use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Permission {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Named capabilities a handler can demand. Admins hold all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    ProductManage,
    IncomingOperate,
    OutgoingOperate,
    RecordsView,
    StockView,
    UserManage,
    LocationQuery,
    RecordEdit,
}

impl Capability {
    pub const ALL: [Capability; 8] = [
        Capability::ProductManage,
        Capability::IncomingOperate,
        Capability::OutgoingOperate,
        Capability::RecordsView,
        Capability::StockView,
        Capability::UserManage,
        Capability::LocationQuery,
        Capability::RecordEdit,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Capability::ProductManage => "product_manage",
            Capability::IncomingOperate => "incoming_operate",
            Capability::OutgoingOperate => "outgoing_operate",
            Capability::RecordsView => "records_view",
            Capability::StockView => "stock_view",
            Capability::UserManage => "user_manage",
            Capability::LocationQuery => "location_query",
            Capability::RecordEdit => "record_edit",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Capability::ProductManage => "Manage products",
            Capability::IncomingOperate => "Record inbound stock",
            Capability::OutgoingOperate => "Record outbound stock and relocations",
            Capability::RecordsView => "View movement records",
            Capability::StockView => "View stock",
            Capability::UserManage => "Manage users and permissions",
            Capability::LocationQuery => "Query stock by location",
            Capability::RecordEdit => "Edit movement records",
        }
    }
}
