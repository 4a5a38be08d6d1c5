//! Database bootstrap for the catalog.

pub mod entities;
pub mod migration;

use std::path::Path;
use std::time::Duration;

use sea_orm::{ConnectOptions, Database as SeaDatabase, DatabaseConnection, DbErr, Statement};
use sea_orm_migration::MigratorTrait;
use tracing::info;

/// Owns the SQLite connection pool and exposes the raw `DatabaseConnection`
/// to the rest of the crate.
pub struct Database {
	conn: DatabaseConnection,
}

impl Database {
	/// Open (creating if absent) the database file at `path` and run pending migrations.
	pub async fn connect(path: &Path) -> Result<Self, DbErr> {
		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent)
				.map_err(|e| DbErr::Custom(format!("failed to create database directory: {e}")))?;
		}

		let db_url = format!("sqlite://{}?mode=rwc", path.display());
		let mut opt = ConnectOptions::new(db_url);
		opt.max_connections(10)
			.min_connections(1)
			.connect_timeout(Duration::from_secs(8))
			.idle_timeout(Duration::from_secs(8))
			.sqlx_logging(false);

		let conn = SeaDatabase::connect(opt).await?;
		apply_pragmas(&conn).await;

		let db = Self { conn };
		db.migrate().await?;
		info!(path = %path.display(), "catalog database ready");
		Ok(db)
	}

	/// Open an in-memory database, for tests.
    #[allow(dead_code)]
	pub async fn connect_in_memory() -> Result<Self, DbErr> {
		let conn = SeaDatabase::connect("sqlite::memory:").await?;
		let db = Self { conn };
		db.migrate().await?;
		Ok(db)
	}

	async fn migrate(&self) -> Result<(), DbErr> {
		migration::Migrator::up(&self.conn, None).await
	}

	pub fn conn(&self) -> &DatabaseConnection {
		&self.conn
	}
}

async fn apply_pragmas(conn: &DatabaseConnection) {
	use sea_orm::ConnectionTrait;
	for pragma in [
		"PRAGMA journal_mode=WAL",
		"PRAGMA synchronous=NORMAL",
		"PRAGMA temp_store=MEMORY",
		"PRAGMA foreign_keys=ON",
	] {
		if let Err(e) = conn
			.execute(Statement::from_string(
				sea_orm::DatabaseBackend::Sqlite,
				pragma,
			))
			.await
		{
			tracing::warn!(%pragma, error = %e, "failed to apply sqlite pragma");
		}
	}
}
