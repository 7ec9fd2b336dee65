use std::path::Path;
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;

pub type SqlitePool = Pool<SqliteConnectionManager>;
pub type SqliteConnection = PooledConnection<SqliteConnectionManager>;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

pub type DbResult<T> = Result<T, DbError>;

/// Local store for API sessions. Table methods live in `db::tables`.
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub fn new(database_url: &str) -> DbResult<Self> {
        let pool = if database_url == ":memory:" {
            // every in-memory connection is its own database, so keep exactly one
            Pool::builder()
                .max_size(1)
                .build(SqliteConnectionManager::memory())?
        } else {
            // Create parent directory if it doesn't exist
            if let Some(parent) = Path::new(database_url).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).ok();
                }
            }

            let manager = SqliteConnectionManager::file(database_url).with_init(|c| {
                c.pragma_update(None, "journal_mode", "WAL")?;
                c.pragma_update(None, "busy_timeout", 3000i64)?;
                Ok(())
            });
            Pool::builder()
                .max_size(8)
                .connection_timeout(Duration::from_secs(10))
                .build(manager)?
        };

        let db = Self { pool };
        db.init()?;
        log::info!("[DB] Opened auth database at {}", database_url);
        Ok(db)
    }

    pub(crate) fn conn(&self) -> DbResult<SqliteConnection> {
        Ok(self.pool.get()?)
    }

    fn init(&self) -> DbResult<()> {
        let conn = self.conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS sessions (
                token TEXT PRIMARY KEY,
                username TEXT NOT NULL,
                roles TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                expires_at TEXT
            )",
            [],
        )?;

        Ok(())
    }
}
