// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Database Schema Migration Framework
//!
//! Versioned schema migrations for the SQLite store. The runner tracks
//! applied versions in a `schema_version` table and applies pending
//! migrations in order within a single transaction.

use rusqlite::Connection;

use super::StorageError;

/// A single schema migration step.
pub struct Migration {
    /// Monotonically increasing version number (starting at 1).
    pub version: u32,
    /// Human-readable name for this migration.
    pub name: &'static str,
    /// SQL executed for this step.
    pub sql: &'static str,
}

/// All migrations for the content store, in order.
pub fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        name: "create_kv",
        sql: "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY NOT NULL,
                value BLOB NOT NULL
            );",
    }]
}

/// Runs schema migrations against a database connection.
pub struct MigrationRunner;

impl MigrationRunner {
    /// Runs all pending migrations in a transaction.
    ///
    /// Fails with [`StorageError::UnsupportedSchema`] if the database was
    /// written by a newer build.
    pub fn run(conn: &mut Connection, migrations: &[Migration]) -> Result<(), StorageError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            );",
        )?;

        let current = Self::current_version(conn)?;
        let latest = migrations.iter().map(|m| m.version).max().unwrap_or(0);
        if current > latest {
            return Err(StorageError::UnsupportedSchema {
                found: current,
                supported: latest,
            });
        }

        let pending: Vec<&Migration> = migrations.iter().filter(|m| m.version > current).collect();
        if pending.is_empty() {
            return Ok(());
        }

        let tx = conn.transaction()?;
        for migration in pending {
            tracing::debug!(
                version = migration.version,
                name = migration.name,
                "applying schema migration"
            );
            tx.execute_batch(migration.sql)?;
            tx.execute(
                "INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![migration.version, crate::now_millis() as i64],
            )?;
        }
        tx.commit()?;

        Ok(())
    }

    /// Returns the highest applied migration version (0 for a fresh database).
    pub fn current_version(conn: &Connection) -> Result<u32, StorageError> {
        let version: Option<u32> =
            conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })?;
        Ok(version.unwrap_or(0))
    }
}
