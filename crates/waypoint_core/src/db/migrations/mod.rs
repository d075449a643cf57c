//! Session schema steps.
//!
//! # Responsibility
//! - List the DDL steps that build the `session_state` table.
//! - Run the steps a connection is missing, all in one transaction.
//!
//! # Invariants
//! - Step versions are contiguous from 1 up to `SCHEMA_VERSION`.
//! - `PRAGMA user_version` moves with each step inside the same transaction.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

/// Schema version written by this build.
pub const SCHEMA_VERSION: u32 = 1;

struct SchemaStep {
    version: u32,
    label: &'static str,
    ddl: &'static str,
}

const SCHEMA_STEPS: &[SchemaStep] = &[SchemaStep {
    version: 1,
    label: "session_state",
    ddl: include_str!("0001_session_state.sql"),
}];

/// Reads the schema version recorded in `conn`.
pub fn schema_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?)
}

/// Brings `conn` up to `SCHEMA_VERSION`.
///
/// Returns the version the connection had before any step ran.
///
/// # Errors
/// - `SchemaTooNew` when the file is ahead of this build.
/// - `Sqlite` when a step fails; no partial step is kept.
pub fn upgrade(conn: &mut Connection) -> DbResult<u32> {
    let stored = schema_version(conn)?;
    if stored > SCHEMA_VERSION {
        return Err(DbError::SchemaTooNew {
            stored,
            supported: SCHEMA_VERSION,
        });
    }

    let pending = SCHEMA_STEPS
        .iter()
        .filter(|step| step.version > stored)
        .collect::<Vec<_>>();
    if pending.is_empty() {
        return Ok(stored);
    }

    let tx = conn.transaction()?;
    for step in &pending {
        tx.execute_batch(step.ddl)?;
        tx.pragma_update(None, "user_version", step.version)?;
        info!(
            "event=db_migrate module=db status=ok version={} step={}",
            step.version, step.label
        );
    }
    tx.commit()?;
    Ok(stored)
}

#[cfg(test)]
mod tests {
    use super::{schema_version, upgrade, SCHEMA_STEPS, SCHEMA_VERSION};
    use rusqlite::Connection;

    #[test]
    fn steps_are_contiguous_and_end_at_schema_version() {
        for (index, step) in SCHEMA_STEPS.iter().enumerate() {
            assert_eq!(step.version as usize, index + 1, "step {}", step.label);
        }
        assert_eq!(SCHEMA_STEPS.last().map(|step| step.version), Some(SCHEMA_VERSION));
    }

    #[test]
    fn upgrade_reports_the_previous_version_and_is_repeatable() {
        let mut conn = Connection::open_in_memory().unwrap();

        assert_eq!(upgrade(&mut conn).unwrap(), 0);
        assert_eq!(schema_version(&conn).unwrap(), SCHEMA_VERSION);
        assert_eq!(upgrade(&mut conn).unwrap(), SCHEMA_VERSION);

        let columns = conn
            .prepare("SELECT name FROM pragma_table_info('session_state') ORDER BY cid;")
            .unwrap()
            .query_map([], |row| row.get::<_, String>(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(columns, vec!["key", "value", "updated_at"]);
    }
}
