use std::sync::Arc;

use axum::extract::FromRef;

use crate::{config::Config, database::Database, ledger::DuplicateGuard};

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(db: Database, config: Config) -> Self {
        Self {
            db,
            config: Arc::new(config),
        }
    }

    pub fn duplicate_guard(&self) -> DuplicateGuard {
        DuplicateGuard::new(self.config.duplicate_window_secs)
    }
}

impl FromRef<AppState> for Database {
    fn from_ref(state: &AppState) -> Self {
        state.db.clone()
    }
}

impl FromRef<AppState> for Arc<Config> {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
