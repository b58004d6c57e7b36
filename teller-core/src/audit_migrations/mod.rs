//! Audit database migrations - embedded SQL files
//!
//! Same layout as the ledger migrations, applied to audit.duckdb.

/// All audit migrations, embedded at compile time.
/// Format: (filename, sql_content)
pub const AUDIT_MIGRATIONS: &[(&str, &str)] = &[
    ("000_migrations.sql", include_str!("000_migrations.sql")),
    (
        "001_initial_schema.sql",
        include_str!("001_initial_schema.sql"),
    ),
];
