//! Versioned schema steps for the roster tables.
//!
//! Each step is one SQL script tagged with a version and a short name.
//! All pending steps run in a single transaction; `PRAGMA user_version`
//! records the last step that committed.

use crate::db::{DbError, DbResult};
use log::{debug, error, info};
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "member_team",
    sql: include_str!("0001_init.sql"),
}];

/// Schema version this build creates and expects.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Brings `conn` up to [`latest_version`]. Returns how many steps ran.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<usize> {
    run_pending(conn, MIGRATIONS)
}

/// Schema version recorded in `PRAGMA user_version`; `0` for a fresh file.
pub fn current_user_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?)
}

fn run_pending(conn: &mut Connection, steps: &[Migration]) -> DbResult<usize> {
    let from_version = current_user_version(conn)?;
    let target = steps.last().map_or(0, |step| step.version);
    if from_version > target {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: from_version,
            latest_supported: target,
        });
    }

    let pending: Vec<&Migration> = steps
        .iter()
        .filter(|step| step.version > from_version)
        .collect();
    if pending.is_empty() {
        return Ok(0);
    }

    let tx = conn.transaction()?;
    for step in &pending {
        let applied = tx.execute_batch(step.sql).and_then(|()| {
            tx.execute_batch(&format!("PRAGMA user_version = {};", step.version))
        });
        if let Err(source) = applied {
            error!(
                "event=db_migrate module=db status=error version={} name={} error={source}",
                step.version, step.name
            );
            return Err(DbError::Migration {
                version: step.version,
                name: step.name,
                source,
            });
        }
        debug!(
            "event=db_migrate_step module=db status=ok version={} name={}",
            step.version, step.name
        );
    }
    tx.commit()?;

    info!(
        "event=db_migrate module=db status=ok from_version={from_version} to_version={target} steps={}",
        pending.len()
    );
    Ok(pending.len())
}
