//! Schema migration. A single idempotent `CREATE TABLE IF NOT EXISTS` set,
//! run once at `CatalogueStore::open`. If this core ever grows a second
//! migration, append it here behind the same call site rather than
//! branching on a schema-version column — at this scope a migrations table
//! would be ceremony with nothing to track.

use rusqlite::Connection;

pub fn run_migrations(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS functions (
            namespace               TEXT NOT NULL,
            name                    TEXT NOT NULL,
            description             TEXT NOT NULL,
            original_code           TEXT NOT NULL,
            artifact                TEXT NOT NULL,
            is_bundled              INTEGER NOT NULL,
            bundle_error            TEXT,
            version                 INTEGER NOT NULL,
            enabled                 INTEGER NOT NULL,
            allow_net               INTEGER NOT NULL,
            allow_env               INTEGER NOT NULL,
            allow_read              INTEGER NOT NULL,
            allow_write             INTEGER NOT NULL,
            allow_unauthenticated   INTEGER NOT NULL,
            is_public               INTEGER NOT NULL,
            timeout_seconds         INTEGER NOT NULL,
            memory_limit_mb         INTEGER,
            cron_schedule           TEXT,
            cors_allow_origin       TEXT,
            cors_allow_methods      TEXT,
            cors_allow_headers      TEXT,
            cors_expose_headers     TEXT,
            cors_max_age_seconds    INTEGER,
            source                  TEXT NOT NULL,
            created_at              INTEGER NOT NULL,
            updated_at              INTEGER NOT NULL,
            created_by              TEXT,
            PRIMARY KEY (namespace, name)
        );

        CREATE TABLE IF NOT EXISTS supporting_files (
            namespace       TEXT NOT NULL,
            function_name   TEXT NOT NULL,
            path            TEXT NOT NULL,
            content         TEXT NOT NULL,
            PRIMARY KEY (namespace, function_name, path),
            FOREIGN KEY (namespace, function_name)
                REFERENCES functions (namespace, name) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS shared_modules (
            path     TEXT PRIMARY KEY,
            content  TEXT NOT NULL,
            version  INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS executions (
            id              TEXT PRIMARY KEY,
            namespace       TEXT NOT NULL,
            function_name   TEXT NOT NULL,
            trigger         TEXT NOT NULL,
            status          TEXT NOT NULL,
            http_status     INTEGER,
            duration_ms     INTEGER,
            result          TEXT,
            aggregate_logs  TEXT,
            error_message   TEXT,
            started_at      INTEGER NOT NULL,
            completed_at    INTEGER,
            FOREIGN KEY (namespace, function_name)
                REFERENCES functions (namespace, name) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS executions_by_function
            ON executions (namespace, function_name, started_at DESC);

        CREATE TABLE IF NOT EXISTS execution_log_lines (
            execution_id  TEXT NOT NULL,
            line_number   INTEGER NOT NULL,
            level         TEXT NOT NULL,
            message       TEXT NOT NULL,
            timestamp     INTEGER NOT NULL,
            PRIMARY KEY (execution_id, line_number),
            FOREIGN KEY (execution_id) REFERENCES executions (id) ON DELETE CASCADE
        );
        "#,
    )
}
