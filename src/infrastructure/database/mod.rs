//! Database infrastructure: connection setup and the typed [`Index`] API over it.

use sea_orm::ConnectionTrait;
use sea_orm::{ConnectOptions, Database as SeaDatabase, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub mod entities;
pub mod index;
pub mod migration;

pub use index::Index;

/// Wraps a pooled SeaORM connection to the index's single SQLite file.
pub struct Database {
	conn: DatabaseConnection,
}

const PRAGMAS: &[&str] = &[
	"PRAGMA foreign_keys = ON",
	"PRAGMA journal_mode = WAL",
	"PRAGMA synchronous = NORMAL",
	"PRAGMA temp_store = MEMORY",
	"PRAGMA cache_size = -20000",
	"PRAGMA mmap_size = 67108864",
	"PRAGMA busy_timeout = 5000",
];

async fn apply_pragmas(conn: &DatabaseConnection) -> Result<(), DbErr> {
	use sea_orm::Statement;
	for pragma in PRAGMAS {
		conn.execute(Statement::from_string(sea_orm::DatabaseBackend::Sqlite, *pragma))
			.await?;
	}
	Ok(())
}

fn connect_options(db_url: String) -> ConnectOptions {
	let mut opt = ConnectOptions::new(db_url);
	opt.max_connections(10)
		.min_connections(5)
		.connect_timeout(Duration::from_secs(8))
		.idle_timeout(Duration::from_secs(8))
		.max_lifetime(Duration::from_secs(8))
		.sqlx_logging(false);
	opt
}

impl Database {
	/// Create a new database file at `path`, running migrations immediately.
	pub async fn create(path: &Path) -> Result<Self, DbErr> {
		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent)
				.map_err(|e| DbErr::Custom(format!("failed to create directory: {e}")))?;
		}

		let db_url = format!("sqlite://{}?mode=rwc", path.display());
		let conn = SeaDatabase::connect(connect_options(db_url)).await?;
		apply_pragmas(&conn).await?;

		info!(?path, "created sync index");
		let db = Self { conn };
		db.migrate().await?;
		Ok(db)
	}

	/// Open an existing database file at `path`.
	pub async fn open(path: &Path) -> Result<Self, DbErr> {
		if !path.exists() {
			return Err(DbErr::Custom(format!("index does not exist: {}", path.display())));
		}

		let db_url = format!("sqlite://{}", path.display());
		let conn = SeaDatabase::connect(connect_options(db_url)).await?;
		apply_pragmas(&conn).await?;

		info!(?path, "opened sync index");
		let db = Self { conn };
		db.migrate().await?;
		Ok(db)
	}

	/// Open at `path` if it exists, otherwise create it.
	pub async fn open_or_create(path: &Path) -> Result<Self, DbErr> {
		if path.exists() {
			Self::open(path).await
		} else {
			Self::create(path).await
		}
	}

	async fn migrate(&self) -> Result<(), DbErr> {
		migration::Migrator::up(&self.conn, None).await?;
		Ok(())
	}

	pub fn conn(&self) -> &DatabaseConnection {
		&self.conn
	}
}
