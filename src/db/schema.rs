//! SQL DDL for initializing the database schema.
//! Every statement is "if not exists" so any context may run it at startup, any number of times.

/// SQLite schema includes:
/// - `patients` table (one registered patient per row, newest listed first)
pub const SQLITE_INIT: &str = r#"
-- ---------------------------------------------------------------------------
-- Registered patients
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS patients (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    name TEXT NOT NULL,
    age INTEGER NOT NULL,
    gender TEXT NOT NULL,
    address TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')) -- RFC3339
);

CREATE INDEX IF NOT EXISTS idx_patients_created_at ON patients(created_at);
"#;
