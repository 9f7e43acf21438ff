//! SQLite-backed cache store at `<cache_dir>/cache.db`.

use super::store::CacheStore;
use super::CacheError;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at `path`
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self, CacheError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|source| CacheError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(path.as_ref())?;
        Self::with_connection(conn)
    }

    /// In-memory database (tests)
    pub fn open_in_memory() -> Result<Self, CacheError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, CacheError> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                key TEXT PRIMARY KEY,
                data BLOB NOT NULL
            )
            "#,
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, CacheError> {
        self.conn
            .lock()
            .map_err(|e| CacheError::Backend(format!("Lock error: {}", e)))
    }
}

impl CacheStore for SqliteStore {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let conn = self.lock()?;
        let data = conn
            .query_row(
                "SELECT data FROM cache_entries WHERE key = ?1",
                params![key],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(data)
    }

    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), CacheError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO cache_entries (key, data) VALUES (?1, ?2)",
            params![key, bytes],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, CacheError> {
        let conn = self.lock()?;
        let removed = conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
        Ok(removed > 0)
    }

    fn keys(&self) -> Result<Vec<String>, CacheError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT key FROM cache_entries ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }
}
