//! Session store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist and restore the local journey session across restarts.
//! - Keep SQL details inside the core persistence boundary.
//!
//! # Invariants
//! - `save` writes journey id, status and identity in one transaction.
//! - `clear` removes all three keys in one transaction.
//! - Read paths reject inconsistent persisted state instead of masking it.

use crate::db::{open_db, open_db_in_memory, DbError};
use crate::model::session::{
    Identity, JourneyId, JourneyStatus, Session, SessionValidationError,
};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

const KEY_JOURNEY_ID: &str = "journey_id";
const KEY_JOURNEY_STATUS: &str = "journey_status";
const KEY_IDENTITY: &str = "identity";

pub type RepoResult<T> = Result<T, RepoError>;

/// Generic repository error for session persistence.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    Validation(SessionValidationError),
    Serialization(serde_json::Error),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Validation(err) => write!(f, "invalid persisted session: {err}"),
            Self::Serialization(err) => write!(f, "session serialization failed: {err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted session data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::Serialization(err) => Some(err),
            Self::InvalidData(_) => None,
        }
    }
}

impl RepoError {
    /// Whether the error means the storage medium itself is unusable.
    pub fn is_storage_failure(&self) -> bool {
        matches!(self, Self::Db(_))
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<SessionValidationError> for RepoError {
    fn from(value: SessionValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}

/// Persistence contract for the local journey session.
pub trait SessionStore: Send {
    fn load(&self) -> RepoResult<Option<Session>>;
    fn save(&mut self, session: &Session) -> RepoResult<()>;
    fn clear(&mut self) -> RepoResult<()>;
}

/// In-process store with no durability.
#[derive(Debug, Default, Clone)]
pub struct MemorySessionStore {
    session: Option<Session>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> RepoResult<Option<Session>> {
        Ok(self.session.clone())
    }

    fn save(&mut self, session: &Session) -> RepoResult<()> {
        session.validate()?;
        self.session = Some(session.clone());
        Ok(())
    }

    fn clear(&mut self) -> RepoResult<()> {
        self.session = None;
        Ok(())
    }
}

/// SQLite-backed session store.
pub struct SqliteSessionStore {
    conn: Connection,
}

impl SqliteSessionStore {
    /// Wraps a connection that already has migrations applied.
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Opens (or creates) the session database at `path`.
    pub fn open(path: impl AsRef<Path>) -> RepoResult<Self> {
        Ok(Self::new(open_db(path)?))
    }

    pub fn open_in_memory() -> RepoResult<Self> {
        Ok(Self::new(open_db_in_memory()?))
    }

    fn read_key(&self, key: &str) -> RepoResult<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM session_state WHERE key = ?1;",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }
}

impl SessionStore for SqliteSessionStore {
    fn load(&self) -> RepoResult<Option<Session>> {
        let Some(raw_status) = self.read_key(KEY_JOURNEY_STATUS)? else {
            return Ok(None);
        };
        let status = JourneyStatus::parse(raw_status.as_str())
            .ok_or_else(|| RepoError::InvalidData(format!("unknown journey_status `{raw_status}`")))?;
        let journey_id = self.read_key(KEY_JOURNEY_ID)?.map(JourneyId::new);
        let identity = match self.read_key(KEY_IDENTITY)? {
            Some(raw) => Some(serde_json::from_str::<Identity>(raw.as_str())?),
            None => None,
        };

        let session = Session::new(journey_id, status, identity);
        session.validate()?;
        Ok(Some(session))
    }

    fn save(&mut self, session: &Session) -> RepoResult<()> {
        session.validate()?;
        let identity_json = session
            .identity
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let tx = self.conn.transaction()?;
        upsert_key(&tx, KEY_JOURNEY_STATUS, Some(session.status.as_str()))?;
        upsert_key(
            &tx,
            KEY_JOURNEY_ID,
            session.journey_id.as_ref().map(JourneyId::as_str),
        )?;
        upsert_key(&tx, KEY_IDENTITY, identity_json.as_deref())?;
        tx.commit()?;
        Ok(())
    }

    fn clear(&mut self) -> RepoResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM session_state WHERE key IN (?1, ?2, ?3);",
            params![KEY_JOURNEY_ID, KEY_JOURNEY_STATUS, KEY_IDENTITY],
        )?;
        tx.commit()?;
        Ok(())
    }
}

fn upsert_key(tx: &Transaction<'_>, key: &str, value: Option<&str>) -> RepoResult<()> {
    match value {
        Some(value) => {
            tx.execute(
                "INSERT INTO session_state (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = (strftime('%s', 'now') * 1000);",
                params![key, value],
            )?;
        }
        None => {
            tx.execute("DELETE FROM session_state WHERE key = ?1;", params![key])?;
        }
    }
    Ok(())
}
