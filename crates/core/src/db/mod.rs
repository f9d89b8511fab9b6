//! SQLite connection management with pragma configuration.
//!
//! Both the cache and the emissions record store live in SQLite files opened
//! through here. Every connection gets the same pragmas (WAL mode) and runs
//! the full migration set, so the two stores may share one file.

pub mod migrations;

use crate::Error;
use std::path::Path;
use tokio_rusqlite::Connection;

const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA temp_store=MEMORY;
     PRAGMA foreign_keys=ON;";

/// Open a database at the specified path.
///
/// Creates the file if it doesn't exist, applies performance pragmas,
/// and runs any pending migrations.
pub async fn open(path: impl AsRef<Path>) -> Result<Connection, Error> {
    let conn = Connection::open(path).await.map_err(|e| Error::Database(e.into()))?;
    prepare(&conn).await?;
    Ok(conn)
}

/// Open an in-memory database with the same configuration as file-based ones.
pub async fn open_in_memory() -> Result<Connection, Error> {
    let conn = Connection::open_in_memory()
        .await
        .map_err(|e| Error::Database(e.into()))?;
    prepare(&conn).await?;
    Ok(conn)
}

async fn prepare(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| {
        conn.execute_batch(PRAGMAS)?;
        Ok(())
    })
    .await
    .map_err(Error::Database)?;

    migrations::run(conn).await
}
