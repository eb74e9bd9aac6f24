use std::path::Path;
use std::sync::{Arc, Mutex};
use rusqlite::{Connection, OpenFlags};
use crate::{Result, TablescopeError};

/// A rusqlite connection whose queries run on tokio's blocking pool.
#[derive(Clone)]
pub struct SqliteClientWrapper {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteClientWrapper {
    /// Opens an existing database file read-only.
    pub async fn open(path: &str) -> Result<Self> {
        let owned_path = path.to_string();
        let connection = tokio::task::spawn_blocking(move || {
            if !owned_path.starts_with("file:") && !Path::new(&owned_path).exists() {
                return Err(TablescopeError::Connectivity(format!("database file `{}` does not exist", owned_path)));
            }

            Connection::open_with_flags(
                &owned_path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .map_err(|e| TablescopeError::Connectivity(format!("could not open `{}`: {}", owned_path, e)))
        })
        .await??;

        Ok(Self::from_connection(connection))
    }

    pub fn from_connection(connection: Connection) -> Self {
        Self {
            connection: Arc::new(Mutex::new(connection)),
        }
    }

    /// Runs a query, mapping every row with [`FromSqliteRow`].
    pub async fn get_results<T>(&self, sql: &'static str, params: Vec<String>) -> Result<Vec<T>>
    where
        T: FromSqliteRow + Send + 'static,
    {
        let connection = Arc::clone(&self.connection);

        tokio::task::spawn_blocking(move || {
            let connection = connection
                .lock()
                .map_err(|_| TablescopeError::Connectivity("the sqlite connection was poisoned by a panic".to_string()))?;

            let with_query = |source: rusqlite::Error| TablescopeError::SqliteErrorWithQuery {
                query: sql.to_string(),
                source,
            };

            let mut statement = connection.prepare_cached(sql).map_err(with_query)?;
            let rows = statement
                .query_map(rusqlite::params_from_iter(params.iter()), |row| T::from_row(row))
                .map_err(with_query)?;

            let mut output = Vec::new();
            for row in rows {
                output.push(row.map_err(with_query)?);
            }

            Ok(output)
        })
        .await?
    }
}

pub trait FromSqliteRow: Sized {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self>;
}

impl<T1: rusqlite::types::FromSql> FromSqliteRow for (T1,) {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok((row.get(0)?,))
    }
}
