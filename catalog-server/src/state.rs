//! Shared process state handed to every route handler.

use std::sync::Arc;

use catalog_core::config::CatalogConfig;
use sea_orm::DatabaseConnection;

#[derive(Clone)]
pub struct AppState(Arc<Inner>);

struct Inner {
	db: DatabaseConnection,
	config: CatalogConfig,
}

impl AppState {
	pub fn new(db: DatabaseConnection, config: CatalogConfig) -> Self {
		Self(Arc::new(Inner { db, config }))
	}

	pub fn db(&self) -> &DatabaseConnection {
		&self.0.db
	}

	pub fn config(&self) -> &CatalogConfig {
		&self.0.config
	}
}
