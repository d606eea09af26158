//! SQLite persistence for fraud cases.
//!
//! RULE: Only this module talks to the database.
//! The alert store calls CaseStore methods; it never executes SQL.

mod fraud_case;

pub use fraud_case::{CaseFilter, CaseRiskLevel, CaseStatus, EntityType, FraudCase};

use crate::error::WatchResult;
use rusqlite::Connection;

pub struct CaseStore {
    conn: Connection,
}

impl CaseStore {
    /// Open (or create) the case database at `path`.
    pub fn open(path: &str) -> WatchResult<Self> {
        let conn = Connection::open(path)?;
        // WAL mode: readers do not block the writer.
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests and when no path is
    /// configured).
    pub fn in_memory() -> WatchResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    /// Open per config and apply migrations.
    pub fn open_configured(path: Option<&str>) -> WatchResult<Self> {
        let store = match path {
            Some(p) => Self::open(p)?,
            None => Self::in_memory()?,
        };
        store.migrate()?;
        Ok(store)
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> WatchResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_fraud_cases.sql"))?;
        Ok(())
    }
}
