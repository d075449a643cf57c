//! Durable home of the journey session.
//!
//! # Responsibility
//! - Hand the session repository a configured SQLite connection.
//! - Bring the `session_state` schema up to the version this build expects.
//!
//! # Invariants
//! - The schema version lives in `PRAGMA user_version`.
//! - A file written by a newer build is refused, never downgraded.
//! - No session key is read or written on a connection that failed to open.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub mod migrations;
mod open;

pub use migrations::{schema_version, SCHEMA_VERSION};
pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

/// Reasons a session database cannot be used.
#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// The directory meant to hold the session file could not be created.
    Directory {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The file carries a schema from a newer build.
    SchemaTooNew { stored: u32, supported: u32 },
}

impl DbError {
    /// Stable code for `error_code=` log fields.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Sqlite(_) => "db_sqlite",
            Self::Directory { .. } => "db_directory",
            Self::SchemaTooNew { .. } => "db_schema_too_new",
        }
    }
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Directory { path, source } => {
                write!(f, "cannot create session directory `{}`: {source}", path.display())
            }
            Self::SchemaTooNew { stored, supported } => write!(
                f,
                "session file uses schema {stored}; this build understands up to {supported}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Directory { source, .. } => Some(source),
            Self::SchemaTooNew { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
